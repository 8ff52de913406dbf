//! DispatchPool - bounded queue drained by a fixed set of workers
//!
//! The HTTP surface only sees [`DispatchQueue`]. Admission never waits: a
//! full queue refuses the job so the acknowledgement stays independent of
//! dispatch progress. Workers share one receiver and run each job in its own
//! task, so a panicking dispatch is contained and accounted as a failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};

use contracts::{
    DownstreamClientFactory, EnvelopeStorage, MessageEnvelope, RequestContext, TargetResolver,
    TransactionFinalizer,
};

use crate::coordinator::DispatchCoordinator;
use crate::error::SubmitError;
use crate::metrics::{DispatchMetrics, MetricsSnapshot};

/// One accepted message waiting for dispatch
#[derive(Debug)]
pub struct DispatchJob {
    pub context: Arc<RequestContext>,
    pub envelope: Arc<MessageEnvelope>,
    span: Span,
}

impl DispatchJob {
    pub fn new(context: RequestContext, envelope: MessageEnvelope) -> Self {
        let span = info_span!(
            "dispatch_job",
            request_id = %context.request_id,
            transaction_id = %context.transaction_id
        );
        Self {
            context: Arc::new(context),
            envelope: Arc::new(envelope),
            span,
        }
    }
}

/// Submission side of the pool
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<DispatchJob>,
    accepting: Arc<RwLock<bool>>,
    metrics: Arc<DispatchMetrics>,
}

impl DispatchQueue {
    /// Enqueue a job without waiting.
    ///
    /// # Errors
    /// - [`SubmitError::ShuttingDown`] once shutdown has started
    /// - [`SubmitError::QueueFull`] when `capacity` jobs are already waiting
    pub async fn submit(&self, job: DispatchJob) -> Result<(), SubmitError> {
        // Held across the send: shutdown cannot flip the flag mid-submit.
        let accepting = self.accepting.read().await;
        if !*accepting {
            self.metrics.inc_rejected();
            return Err(SubmitError::ShuttingDown);
        }

        if let Err(e) = self.tx.try_send(job) {
            self.metrics.inc_rejected();
            return Err(match e {
                mpsc::error::TrySendError::Full(_) => SubmitError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => SubmitError::ShuttingDown,
            });
        }

        self.metrics.inc_submitted();
        self.metrics
            .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
        Ok(())
    }

    pub async fn is_accepting(&self) -> bool {
        *self.accepting.read().await
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }
}

/// Fixed-size worker pool
pub struct DispatchPool {
    queue: DispatchQueue,
    stop_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl DispatchPool {
    /// Spawn `workers` workers over a queue of `capacity` jobs
    pub fn start<S, R, C, F>(
        coordinator: Arc<DispatchCoordinator<S, R, C, F>>,
        workers: usize,
        capacity: usize,
    ) -> Self
    where
        S: EnvelopeStorage + Send + Sync + 'static,
        R: TargetResolver + Send + Sync + 'static,
        C: DownstreamClientFactory + 'static,
        F: TransactionFinalizer + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);
        let rx = Arc::new(Mutex::new(rx));
        let metrics = Arc::new(DispatchMetrics::new());

        let workers = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&rx),
                    stop_rx.clone(),
                    Arc::clone(&coordinator),
                    Arc::clone(&metrics),
                ))
            })
            .collect::<Vec<_>>();

        info!(workers = workers.len(), capacity, "Dispatch pool started");

        Self {
            queue: DispatchQueue {
                tx,
                accepting: Arc::new(RwLock::new(true)),
                metrics,
            },
            stop_tx,
            workers,
        }
    }

    /// Handle for submitting jobs
    pub fn queue(&self) -> DispatchQueue {
        self.queue.clone()
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.queue.metrics
    }

    /// Stop accepting, drain the queue, and wait up to `grace` for the workers.
    ///
    /// Workers still running at the deadline are aborted.
    #[instrument(name = "dispatch_pool_shutdown", skip(self))]
    pub async fn shutdown(self, grace: Duration) -> MetricsSnapshot {
        *self.queue.accepting.write().await = false;
        let _ = self.stop_tx.send(true);
        info!(
            queued = self.queue.metrics.queue_len(),
            in_flight = self.queue.metrics.in_flight(),
            "Dispatch pool draining"
        );

        let deadline = Instant::now() + grace;
        for (id, mut handle) in self.workers.into_iter().enumerate() {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => debug!(worker = id, "Worker stopped"),
                Ok(Err(e)) => error!(worker = id, error = %e, "Worker task failed"),
                Err(_) => {
                    warn!(worker = id, "Shutdown grace elapsed, aborting worker");
                    handle.abort();
                }
            }
        }

        let snapshot = self.queue.metrics.snapshot();
        info!(
            completed = self.queue.metrics.completed(),
            failed = snapshot.failed,
            "Dispatch pool stopped"
        );
        snapshot
    }
}

async fn run_worker<S, R, C, F>(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<DispatchJob>>>,
    mut stop: watch::Receiver<bool>,
    coordinator: Arc<DispatchCoordinator<S, R, C, F>>,
    metrics: Arc<DispatchMetrics>,
) where
    S: EnvelopeStorage + Send + Sync + 'static,
    R: TargetResolver + Send + Sync + 'static,
    C: DownstreamClientFactory + 'static,
    F: TransactionFinalizer + Send + Sync + 'static,
{
    debug!(worker = id, "Worker started");

    while let Some((job, remaining)) = next_job(&rx, &mut stop).await {
        metrics.set_queue_len(remaining);
        metrics.inc_in_flight();

        let started = Instant::now();
        let DispatchJob {
            context,
            envelope,
            span,
        } = job;
        let task_coordinator = Arc::clone(&coordinator);
        let task = tokio::spawn(
            async move { task_coordinator.dispatch(&context, &envelope).await }
                .instrument(span.clone()),
        );

        match task.await {
            Ok(report) => metrics.record(&report),
            Err(e) => {
                span.in_scope(|| error!(worker = id, error = %e, "Dispatch task aborted"));
                metrics.record_aborted(started.elapsed());
            }
        }
        metrics.dec_in_flight();
    }

    debug!(worker = id, "Worker exiting, queue drained");
}

/// Next job plus the queue length left behind.
///
/// Once stop is signalled only already-queued jobs are returned.
async fn next_job(
    rx: &Mutex<mpsc::Receiver<DispatchJob>>,
    stop: &mut watch::Receiver<bool>,
) -> Option<(DispatchJob, usize)> {
    let mut rx = rx.lock().await;

    let job = if *stop.borrow() {
        rx.try_recv().ok()
    } else {
        tokio::select! {
            job = rx.recv() => job,
            _ = stop.changed() => rx.try_recv().ok(),
        }
    };

    job.map(|job| (job, rx.len()))
}
