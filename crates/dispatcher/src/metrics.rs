//! Dispatch metrics for observability

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use observability::{RunningStats, StatsSummary};

use crate::coordinator::{DispatchOutcome, DispatchReport};

/// Pool-wide dispatch counters
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Jobs waiting in the queue
    queue_len: AtomicUsize,
    /// Jobs currently being dispatched
    in_flight: AtomicUsize,
    /// Jobs accepted by `submit`
    submitted: AtomicU64,
    /// Jobs refused by `submit`
    rejected: AtomicU64,
    released: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    compensation_failures: AtomicU64,
    finalizer_failures: AtomicU64,
    /// Dispatch duration (ms)
    duration_ms: Mutex<RunningStats>,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
        observability::record_queue_depth(len);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_in_flight(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dec_in_flight(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Jobs that finished, whatever the outcome
    pub fn completed(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
            + self.delivered.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Account a finished dispatch
    pub(crate) fn record(&self, report: &DispatchReport) {
        match report.outcome {
            DispatchOutcome::Released => self.released.fetch_add(1, Ordering::Relaxed),
            DispatchOutcome::Delivered | DispatchOutcome::ReleaseFailed => {
                self.delivered.fetch_add(1, Ordering::Relaxed)
            }
            DispatchOutcome::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
        };
        if report.compensation_failure.is_some() {
            self.compensation_failures.fetch_add(1, Ordering::Relaxed);
        }
        if report.finalizer_failure.is_some() {
            self.finalizer_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.push_duration(report.duration);
    }

    /// Account a dispatch task that died without a report
    pub(crate) fn record_aborted(&self, duration: Duration) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.push_duration(duration);
    }

    fn push_duration(&self, duration: Duration) {
        if let Ok(mut stats) = self.duration_ms.lock() {
            stats.push(duration.as_secs_f64() * 1000.0);
        }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            in_flight: self.in_flight(),
            submitted: self.submitted(),
            rejected: self.rejected(),
            released: self.released.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed(),
            compensation_failures: self.compensation_failures.load(Ordering::Relaxed),
            finalizer_failures: self.finalizer_failures.load(Ordering::Relaxed),
            duration_ms: self
                .duration_ms
                .lock()
                .map(|stats| StatsSummary::from(&*stats))
                .unwrap_or_default(),
        }
    }
}

/// Snapshot of dispatch metrics (for reporting)
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub in_flight: usize,
    pub submitted: u64,
    pub rejected: u64,
    pub released: u64,
    pub delivered: u64,
    pub failed: u64,
    pub compensation_failures: u64,
    pub finalizer_failures: u64,
    pub duration_ms: StatsSummary,
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Dispatch Summary ===")?;
        writeln!(f, "Submitted: {} (rejected: {})", self.submitted, self.rejected)?;
        writeln!(f, "Released: {}", self.released)?;
        writeln!(f, "Delivered without release: {}", self.delivered)?;
        writeln!(f, "Failed: {}", self.failed)?;
        writeln!(f, "Compensation failures: {}", self.compensation_failures)?;
        writeln!(f, "Finalizer failures: {}", self.finalizer_failures)?;
        writeln!(f, "Left in queue: {} (in flight: {})", self.queue_len, self.in_flight)?;
        write!(f, "Dispatch duration (ms): {}", self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DispatchError, DispatchStage, FinalizerAction};
    use contracts::ContractError;

    fn report(outcome: DispatchOutcome, millis: u64) -> DispatchReport {
        let mut report = DispatchReport::new();
        report.outcome = outcome;
        report.duration = Duration::from_millis(millis);
        report
    }

    #[test]
    fn test_record_counts_outcomes() {
        let metrics = DispatchMetrics::new();
        metrics.record(&report(DispatchOutcome::Released, 10));
        metrics.record(&report(DispatchOutcome::Delivered, 20));
        metrics.record(&report(DispatchOutcome::ReleaseFailed, 30));

        let mut failed = report(DispatchOutcome::Failed, 40);
        failed.compensation_failure = Some(
            DispatchError::dispatch(DispatchStage::Post, ContractError::downstream("audit", "503"))
                .into_compensation(),
        );
        failed.finalizer_failure = Some(DispatchError::finalizer(
            FinalizerAction::Fail,
            ContractError::ledger("tx-1", "timeout"),
        ));
        metrics.record(&failed);
        metrics.record_aborted(Duration::from_millis(50));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.released, 1);
        assert_eq!(snapshot.delivered, 2);
        assert_eq!(snapshot.failed, 2);
        assert_eq!(snapshot.compensation_failures, 1);
        assert_eq!(snapshot.finalizer_failures, 1);
        assert_eq!(metrics.completed(), 5);
        assert_eq!(snapshot.duration_ms.count, 5);
        assert!((snapshot.duration_ms.mean - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_in_flight_and_admission() {
        let metrics = DispatchMetrics::new();
        metrics.inc_submitted();
        metrics.inc_submitted();
        metrics.inc_rejected();
        metrics.inc_in_flight();
        metrics.inc_in_flight();
        metrics.dec_in_flight();

        assert_eq!(metrics.submitted(), 2);
        assert_eq!(metrics.rejected(), 1);
        assert_eq!(metrics.in_flight(), 1);
    }

    #[test]
    fn test_snapshot_display() {
        let metrics = DispatchMetrics::new();
        let text = metrics.snapshot().to_string();
        assert!(text.starts_with("=== Dispatch Summary ==="));
        assert!(text.contains("Dispatch duration (ms): N/A"));
    }
}
