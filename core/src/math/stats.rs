use std::collections::BTreeMap;

use crate::prelude::MISSING;

pub struct StatsHelper;

impl StatsHelper {
    pub fn mean(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return MISSING;
        }
        samples.iter().sum::<f64>() / samples.len() as f64
    }

    pub fn max(values: &[i32]) -> Option<i32> {
        values.iter().copied().max()
    }

    /// Most frequent value; ties go to the smallest value.
    pub fn mode(values: &[i32]) -> Option<i32> {
        let mut tally: BTreeMap<i32, usize> = BTreeMap::new();
        for &value in values {
            *tally.entry(value).or_insert(0) += 1;
        }
        // BTreeMap iterates ascending, so the first maximum wins ties.
        let mut best: Option<(i32, usize)> = None;
        for (value, count) in tally {
            match best {
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((value, count)),
            }
        }
        best.map(|(value, _)| value)
    }
}
