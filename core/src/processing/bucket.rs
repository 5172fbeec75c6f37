use chrono::{Duration, NaiveDateTime, Timelike};

use crate::prelude::{PipelineError, PipelineResult};

/// Seconds between two instrument telegrams.
pub const TELEGRAM_SECONDS: i64 = 10;

/// Longest accepted interval, one leap year.
pub const MAX_INTERVAL_MINUTES: f64 = 366.0 * 24.0 * 60.0;

/// Validated averaging interval: 30 s or a whole number of minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AveragingInterval {
    seconds: i64,
}

impl AveragingInterval {
    pub fn from_minutes(minutes: f64) -> PipelineResult<Self> {
        if minutes == 0.5 {
            return Ok(Self { seconds: 30 });
        }
        if minutes.is_finite()
            && minutes >= 1.0
            && minutes <= MAX_INTERVAL_MINUTES
            && minutes.fract() == 0.0
        {
            return Ok(Self {
                seconds: minutes as i64 * 60,
            });
        }
        Err(PipelineError::InvalidInterval(minutes))
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn minutes(&self) -> f64 {
        self.seconds as f64 / 60.0
    }

    /// Telegrams a complete bucket must contain (`interval × 6`).
    pub fn expected_count(&self) -> usize {
        (self.seconds / TELEGRAM_SECONDS) as usize
    }

    /// Start of the bucket containing `timestamp`.
    ///
    /// Boundaries are multiples of the interval since the Unix epoch, which
    /// lines up with clock time for every interval dividing a day.
    pub fn bucket_key(&self, timestamp: NaiveDateTime) -> NaiveDateTime {
        let whole = timestamp.with_nanosecond(0).unwrap_or(timestamp);
        let offset = whole.and_utc().timestamp().rem_euclid(self.seconds);
        whole - Duration::seconds(offset)
    }

    /// Every bucket start from `first` to `last`, inclusive. Both must already
    /// be bucket keys.
    pub fn boundaries(
        &self,
        first: NaiveDateTime,
        last: NaiveDateTime,
    ) -> impl Iterator<Item = NaiveDateTime> {
        let count = if last < first {
            0
        } else {
            (last - first).num_seconds() / self.seconds + 1
        };
        let seconds = self.seconds;
        (0..count).map(move |i| first + Duration::seconds(seconds * i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2016, 1, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn accepts_half_minute_and_whole_minutes_only() {
        assert_eq!(AveragingInterval::from_minutes(0.5).unwrap().seconds(), 30);
        assert_eq!(AveragingInterval::from_minutes(5.0).unwrap().expected_count(), 30);
        for bad in [0.0, -1.0, 0.25, 1.5, f64::NAN, f64::INFINITY] {
            assert!(AveragingInterval::from_minutes(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn oversized_interval_is_a_configuration_error() {
        let longest = AveragingInterval::from_minutes(MAX_INTERVAL_MINUTES).unwrap();
        assert_eq!(longest.seconds(), 366 * 24 * 3600);
        for bad in [MAX_INTERVAL_MINUTES + 1.0, 2e14, 1e18] {
            assert_eq!(
                AveragingInterval::from_minutes(bad),
                Err(PipelineError::InvalidInterval(bad))
            );
        }
    }

    #[test]
    fn bucket_key_truncates_to_interval() {
        let one = AveragingInterval::from_minutes(1.0).unwrap();
        assert_eq!(one.bucket_key(at(10, 7, 50)), at(10, 7, 0));

        let five = AveragingInterval::from_minutes(5.0).unwrap();
        assert_eq!(five.bucket_key(at(10, 7, 50)), at(10, 5, 0));

        let half = AveragingInterval::from_minutes(0.5).unwrap();
        assert_eq!(half.bucket_key(at(10, 7, 50)), at(10, 7, 30));
        assert_eq!(half.bucket_key(at(10, 7, 20)), at(10, 7, 0));
    }

    #[test]
    fn boundaries_are_inclusive_and_contiguous() {
        let two = AveragingInterval::from_minutes(2.0).unwrap();
        let keys: Vec<_> = two.boundaries(at(10, 0, 0), at(10, 6, 0)).collect();
        assert_eq!(keys, vec![at(10, 0, 0), at(10, 2, 0), at(10, 4, 0), at(10, 6, 0)]);
        assert_eq!(two.boundaries(at(10, 0, 0), at(10, 0, 0)).count(), 1);
    }
}
