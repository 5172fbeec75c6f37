use std::sync::Mutex;

/// Counters for one pipeline run.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub complete_intervals: usize,
    pub gap_intervals: usize,
    pub derived_records: usize,
    pub fallback_samples: usize,
}

#[derive(Default)]
struct Metrics {
    complete: usize,
    gaps: usize,
    derived: usize,
    fallbacks: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_complete(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.complete += 1;
        }
    }

    pub fn record_gap(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.gaps += 1;
        }
    }

    pub fn record_derived(&self, count: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.derived += count;
        }
    }

    pub fn record_fallback(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.fallbacks += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            MetricsSnapshot {
                complete_intervals: metrics.complete,
                gap_intervals: metrics.gaps,
                derived_records: metrics.derived,
                fallback_samples: metrics.fallbacks,
            }
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_counts() {
        let metrics = MetricsRecorder::new();
        metrics.record_complete();
        metrics.record_gap();
        metrics.record_gap();
        metrics.record_derived(3);
        let snap = metrics.snapshot();
        assert_eq!(snap.complete_intervals, 1);
        assert_eq!(snap.gap_intervals, 2);
        assert_eq!(snap.derived_records, 3);
        assert_eq!(snap.fallback_samples, 0);
    }
}
