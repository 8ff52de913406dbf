//! Dispatch metrics
//!
//! Series recorded through the `metrics` facade. Without an installed
//! recorder every call is a no-op.

use metrics::{counter, gauge, histogram};

/// Inbound request answered with `status`
pub fn record_request(status: u16) {
    counter!(
        "msg_out_requests_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Dispatch finished with `outcome` after `duration_ms`
pub fn record_dispatch(outcome: &'static str, duration_ms: f64) {
    counter!("msg_out_dispatch_total", "outcome" => outcome).increment(1);
    histogram!("msg_out_dispatch_duration_ms").record(duration_ms);
}

/// One post to a downstream target
pub fn record_target_post(target: &str, representation: &'static str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "msg_out_target_posts_total",
        "target" => target.to_string(),
        "representation" => representation,
        "status" => status
    )
    .increment(1);
}

/// Failure fan-out did not complete
pub fn record_compensation_failure() {
    counter!("msg_out_compensation_failures_total").increment(1);
}

/// Ledger `action` (release / fail) returned an error
pub fn record_finalizer_failure(action: &'static str) {
    counter!("msg_out_finalizer_failures_total", "action" => action).increment(1);
}

/// Jobs waiting in the dispatch queue
pub fn record_queue_depth(depth: usize) {
    gauge!("msg_out_queue_depth").set(depth as f64);
}

/// Summary of a [`RunningStats`]
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
