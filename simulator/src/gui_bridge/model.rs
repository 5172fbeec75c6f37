use chrono::NaiveDate;
use dsdcore::processing::DsdRecord;
use serde::Serialize;

/// Latest derived records exposed to plotting clients.
#[derive(Debug, Clone, Serialize, Default)]
pub struct VisualizationModel {
    pub site: String,
    pub date: Option<NaiveDate>,
    pub records: Vec<DsdRecord>,
    pub notes: Vec<String>,
}
