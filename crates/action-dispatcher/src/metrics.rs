use std::time::Duration;

use serde::{Deserialize, Serialize};

const MAX_RECOMMENDED_DELAY_MS: f64 = 5_000.0;

/// Running execution-time statistics (Welford's online algorithm).
#[derive(Clone, Debug, Default)]
pub struct PerformanceCounters {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub executed: u64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub std_dev_ms: f64,
    pub recommended_delay_ms: f64,
}

impl PerformanceCounters {
    pub fn record(&mut self, elapsed: Duration) {
        let sample = elapsed.as_secs_f64() * 1000.0;
        self.count += 1;
        if self.count == 1 {
            self.min = sample;
            self.max = sample;
        } else {
            self.min = self.min.min(sample);
            self.max = self.max.max(sample);
        }
        let delta = sample - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (sample - self.mean);
    }

    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    /// Mean plus two standard deviations, never below `floor`.
    pub fn recommended_delay(&self, floor: Duration) -> Duration {
        let floor_ms = floor.as_secs_f64() * 1000.0;
        let ms = (self.mean + 2.0 * self.std_dev())
            .max(floor_ms)
            .min(MAX_RECOMMENDED_DELAY_MS.max(floor_ms));
        Duration::from_secs_f64(ms / 1000.0)
    }

    pub fn snapshot(&self, floor: Duration) -> PerformanceSnapshot {
        PerformanceSnapshot {
            executed: self.count,
            avg_ms: self.mean,
            min_ms: self.min,
            max_ms: self.max,
            std_dev_ms: self.std_dev(),
            recommended_delay_ms: self.recommended_delay(floor).as_secs_f64() * 1000.0,
        }
    }
}
