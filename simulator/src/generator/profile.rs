use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use dsdcore::prelude::{BIN_COUNT, MATRIX_CELLS};
use dsdcore::telegram::{FieldOutcome, RawSample};
use dsdcore::CalibrationTable;
use rand::distributions::{Distribution, WeightedIndex};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Configuration for generating synthetic Parsivel telegrams.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub start: NaiveDateTime,
    pub minutes: u32,
    pub wxcode: i32,
    pub temperature: f64,
    /// Mean number of drops per telegram.
    pub drops_per_telegram: u32,
    /// Exponential slope of the drop-size spectrum (mm^-1).
    pub slope: f64,
    /// Probability that a telegram is lost.
    pub dropout: f64,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2015, 11, 12)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            minutes: 60,
            wxcode: 61,
            temperature: 6.5,
            drops_per_telegram: 40,
            slope: 2.5,
            dropout: 0.0,
            seed: 0,
        }
    }
}

impl GeneratorConfig {
    /// `minutes` of telegrams starting at midnight of `date`.
    pub fn for_day(date: NaiveDate, minutes: u32, seed: u64) -> Self {
        Self {
            start: date.and_time(NaiveTime::default()),
            minutes,
            seed,
            ..Default::default()
        }
    }

    fn telegram_count(&self) -> usize {
        self.minutes as usize * 6
    }
}

/// Places drops on the theoretical fall-speed curve with an exponential
/// (Marshall-Palmer shaped) size spectrum, one telegram every 10 s.
pub fn build_telegrams(
    config: &GeneratorConfig,
    calib: &CalibrationTable,
) -> anyhow::Result<Vec<RawSample>> {
    let weights: Vec<f64> = calib
        .diameter_mm
        .iter()
        .map(|d| (-config.slope * d).exp())
        .collect();
    let sizes = WeightedIndex::new(&weights).context("building drop-size distribution")?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut telegrams = Vec::with_capacity(config.telegram_count());

    for index in 0..config.telegram_count() {
        if config.dropout > 0.0 && rng.gen_bool(config.dropout.min(1.0)) {
            continue;
        }
        let mut counts = vec![0u32; MATRIX_CELLS];
        let drops = rng.gen_range(0..=config.drops_per_telegram.saturating_mul(2));
        for _ in 0..drops {
            let d = sizes.sample(&mut rng);
            let centre = calib.velocity_bin_for_fall_speed(d) as i64;
            let jittered = (centre + rng.gen_range(-1..=1)).clamp(0, BIN_COUNT as i64 - 1) as usize;
            let v = if calib.within_tolerance(d, calib.velocity_measured[jittered]) {
                jittered
            } else {
                centre as usize
            };
            counts[v * BIN_COUNT + d] += 1;
        }
        let timestamp = config.start + Duration::seconds(10 * index as i64);
        let sample = RawSample::new(
            timestamp,
            FieldOutcome::Parsed(config.wxcode),
            FieldOutcome::Parsed(config.temperature + rng.gen_range(-0.2..0.2)),
            FieldOutcome::Parsed(0),
            counts,
        )?;
        telegrams.push(sample);
    }

    Ok(telegrams)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_builds_expected_telegram_count() {
        let calib = CalibrationTable::parsivel();
        let config = GeneratorConfig {
            minutes: 4,
            ..Default::default()
        };
        let telegrams = build_telegrams(&config, &calib).unwrap();
        assert_eq!(telegrams.len(), 24);
        assert_eq!(telegrams[1].timestamp - telegrams[0].timestamp, Duration::seconds(10));
        assert!(telegrams.iter().any(|t| t.total_drops() > 0));
    }

    #[test]
    fn generator_is_deterministic_and_honours_dropout() {
        let calib = CalibrationTable::parsivel();
        let config = GeneratorConfig {
            minutes: 10,
            dropout: 0.3,
            seed: 13,
            ..Default::default()
        };
        let first = build_telegrams(&config, &calib).unwrap();
        let second = build_telegrams(&config, &calib).unwrap();
        assert_eq!(first, second);
        assert!(first.len() < 60);
    }

    #[test]
    fn drops_stay_inside_fall_speed_band() {
        let calib = CalibrationTable::parsivel();
        let config = GeneratorConfig {
            minutes: 3,
            seed: 7,
            ..Default::default()
        };
        for telegram in build_telegrams(&config, &calib).unwrap() {
            for ((v, d), &count) in telegram.counts().indexed_iter() {
                if count > 0 {
                    assert!(calib.within_tolerance(d, calib.velocity_measured[v]), "v={v} d={d}");
                }
            }
        }
    }
}
