use ndarray::Array2;

use crate::calibration::CalibrationTable;
use crate::math::matrix::MatrixHelper;
use crate::prelude::{PipelineError, PipelineResult, BIN_COUNT};
use crate::telegram::RawSample;

/// Inclusive range of diameter bins forced to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinExclusion {
    pub first: usize,
    pub last: usize,
}

impl BinExclusion {
    pub fn from_range(range: Option<[usize; 2]>) -> PipelineResult<Option<Self>> {
        match range {
            None => Ok(None),
            Some([first, last]) if first <= last && last < BIN_COUNT => {
                Ok(Some(Self { first, last }))
            }
            Some([first, last]) => Err(PipelineError::InvalidBinRange(first, last)),
        }
    }
}

/// Conditional filter applied to each telegram before aggregation.
pub struct ConditionalFilter<'a> {
    calib: &'a CalibrationTable,
    exclusion: Option<BinExclusion>,
}

impl<'a> ConditionalFilter<'a> {
    pub fn new(calib: &'a CalibrationTable, exclusion: Option<BinExclusion>) -> Self {
        Self { calib, exclusion }
    }

    /// Masks the sample with the acceptance table for its phase, then zeroes
    /// the excluded diameter bins.
    pub fn apply(&self, sample: &RawSample) -> Array2<f64> {
        let mask = self.calib.mask_for(sample.phase());
        let mut filtered = MatrixHelper::apply_mask(sample.counts(), mask.view());
        if let Some(exclusion) = self.exclusion {
            MatrixHelper::zero_columns(&mut filtered, exclusion.first, exclusion.last);
        }
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::MATRIX_CELLS;
    use crate::telegram::FieldOutcome;
    use chrono::NaiveDate;

    fn uniform_sample(wxcode: i32) -> RawSample {
        let timestamp = NaiveDate::from_ymd_opt(2016, 1, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        RawSample::new(
            timestamp,
            FieldOutcome::Parsed(wxcode),
            FieldOutcome::Parsed(1.0),
            FieldOutcome::Parsed(0),
            vec![1; MATRIX_CELLS],
        )
        .unwrap()
    }

    #[test]
    fn exclusion_range_validation() {
        assert_eq!(BinExclusion::from_range(None), Ok(None));
        assert!(BinExclusion::from_range(Some([0, 31])).unwrap().is_some());
        assert_eq!(
            BinExclusion::from_range(Some([3, 2])),
            Err(PipelineError::InvalidBinRange(3, 2))
        );
        assert!(BinExclusion::from_range(Some([30, 32])).is_err());
    }

    #[test]
    fn filter_uses_phase_mask() {
        let calib = CalibrationTable::parsivel();
        let filter = ConditionalFilter::new(&calib, None);
        let rain = filter.apply(&uniform_sample(61));
        let snow = filter.apply(&uniform_sample(71));
        assert_eq!(rain, *calib.mask_for(crate::telegram::Phase::Liquid));
        assert_eq!(snow, *calib.mask_for(crate::telegram::Phase::Frozen));
    }

    #[test]
    fn excluded_columns_are_zero_and_others_untouched() {
        let calib = CalibrationTable::parsivel();
        let exclusion = BinExclusion::from_range(Some([4, 9])).unwrap();
        let plain = ConditionalFilter::new(&calib, None).apply(&uniform_sample(71));
        let cut = ConditionalFilter::new(&calib, exclusion).apply(&uniform_sample(71));
        for v in 0..BIN_COUNT {
            for d in 0..BIN_COUNT {
                if (4..=9).contains(&d) {
                    assert_eq!(cut[[v, d]], 0.0);
                } else {
                    assert_eq!(cut[[v, d]], plain[[v, d]]);
                }
            }
        }
    }
}
