/// Per-classification counters for a batch run
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics accumulated while driving snapshots through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_snapshots: usize,
    pub discovered: usize,
    pub downloaded: usize,
    pub transformed: usize,
    pub indexed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self {
            total_snapshots: 0,
            discovered: 0,
            downloaded: 0,
            transformed: 0,
            indexed: 0,
            failed: 0,
            skipped: 0,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Marks the run as finished
    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// Run duration in seconds, if finished
    pub fn duration_secs(&self) -> Option<f64> {
        self.end_time.map(|end| {
            let millis = (end - self.start_time).num_milliseconds();
            millis as f64 / 1000.0
        })
    }

    /// Fraction of snapshots that reached the indexed state, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_snapshots == 0 {
            return 0.0;
        }
        (self.indexed as f64 / self.total_snapshots as f64) * 100.0
    }
}

impl Default for ProcessingStats {
    fn default() -> Self {
        Self::new()
    }
}
