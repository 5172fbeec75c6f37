use anyhow::Context;
use chrono::NaiveDate;
use dsdcore::processing::DsdRecord;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Column order of the text report. The 32 density columns follow `sigma_m`.
pub const TEXT_COLUMNS: [&str; 12] = [
    "date", "time", "ndrops", "conc", "lwc", "z", "dbz", "rainrate", "accum", "dmax", "dm",
    "sigma_m",
];

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{:.4}", value)
    }
}

/// One space-delimited line per record.
pub fn format_line(record: &DsdRecord) -> String {
    let mut fields = vec![record.start.format("%Y-%m-%d %H:%M:%S").to_string()];
    for value in [
        record.drop_count,
        record.concentration.total,
        record.lwc.total,
        record.reflectivity.total,
        record.dbz,
        record.rain_rate.total,
        record.accumulation.total,
        record.dmax,
        record.dm,
        record.sigma_m,
    ] {
        fields.push(format_value(value));
    }
    fields.extend(record.density.per_bin.iter().map(|&v| format_value(v)));
    fields.join(" ")
}

pub fn write_text<W: Write>(records: &[DsdRecord], mut out: W) -> anyhow::Result<()> {
    writeln!(out, "# {} n(D)[0..31]", TEXT_COLUMNS.join(" "))?;
    for record in records {
        writeln!(out, "{}", format_line(record))?;
    }
    Ok(())
}

pub fn write_json<W: Write>(records: &[DsdRecord], out: W) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(out, records)?;
    Ok(())
}

/// Writes `{site}_{yyyymmdd}_dsd.txt` (and `.json` when asked) under `dir`.
pub fn write_reports(
    dir: &Path,
    site: &str,
    date: NaiveDate,
    records: &[DsdRecord],
    json: bool,
) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("creating report directory {}", dir.display()))?;
    let stem = format!("{}_{}_dsd", site, date.format("%Y%m%d"));

    let text_path = dir.join(format!("{}.txt", stem));
    let file = File::create(&text_path)
        .with_context(|| format!("creating report {}", text_path.display()))?;
    let mut writer = BufWriter::new(file);
    write_text(records, &mut writer)?;
    writer.flush()?;
    let mut written = vec![text_path];

    if json {
        let json_path = dir.join(format!("{}.json", stem));
        let file = File::create(&json_path)
            .with_context(|| format!("creating report {}", json_path.display()))?;
        write_json(records, BufWriter::new(file))?;
        written.push(json_path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn start() -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2015, 11, 12)
            .unwrap()
            .and_hms_opt(3, 4, 0)
            .unwrap()
    }

    #[test]
    fn missing_record_line_keeps_field_count() {
        let line = format_line(&DsdRecord::missing(start()));
        let fields: Vec<&str> = line.split(' ').collect();
        assert_eq!(fields.len(), TEXT_COLUMNS.len() + 32);
        assert_eq!(fields[0], "2015-11-12");
        assert_eq!(fields[1], "03:04:00");
        assert!(fields[2..].iter().all(|&f| f == "nan"));
    }

    #[test]
    fn reports_land_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![DsdRecord::missing(start())];
        let date = start().date();
        let written = write_reports(dir.path(), "apu04", date, &records, true).unwrap();
        assert_eq!(written.len(), 2);

        let text = fs::read_to_string(&written[0]).unwrap();
        assert!(text.starts_with("# date time ndrops"));
        assert_eq!(text.lines().count(), 2);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&written[1]).unwrap()).unwrap();
        assert!(json[0]["dbz"].is_null());
    }
}
