//! DispatchCoordinator - background workflow for one accepted message
//!
//! Validated -> Dispatching -> Succeeded -> Finalized
//!                         \-> CompensatingFailure -> Finalized
//!
//! Release runs after the compensable section: a failed release is logged
//! and never turns into a compensation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use contracts::{
    DispatchConfig, DownstreamClientFactory, EnvelopeStorage, MappingQuery, MessageEnvelope,
    RequestContext, Settlement, StorageReference, TargetId, TargetResolver, TransactionFinalizer,
};

use crate::error::{DispatchError, DispatchStage, FinalizerAction};
use crate::fanout;

/// Settings the coordinator needs from `[dispatch]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Mapping query `source_type`
    pub source_type: String,
    /// Mapping query `source`
    pub source: String,
    /// Message types whose success releases the transaction
    pub release_message_types: HashSet<String>,
    /// Code and message reported on release
    pub settlement_code: String,
}

impl DispatchPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            source_type: config.source_type.clone(),
            source: config.source.clone(),
            release_message_types: config.release_message_types.iter().cloned().collect(),
            settlement_code: config.settlement_code.clone(),
        }
    }

    pub fn is_release_eligible(&self, message_type: &str) -> bool {
        self.release_message_types.contains(message_type)
    }
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

/// Workflow state of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Validated,
    Dispatching,
    Succeeded,
    CompensatingFailure,
    Finalized,
}

/// How a dispatch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered and released
    Released,
    /// Delivered, message type not release-eligible
    Delivered,
    /// Delivered, release call failed
    ReleaseFailed,
    /// Compensated and failed
    Failed,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Released => "released",
            Self::Delivered => "delivered",
            Self::ReleaseFailed => "release_failed",
            Self::Failed => "failed",
        }
    }
}

/// Everything that happened during one dispatch
#[derive(Debug)]
pub struct DispatchReport {
    pub outcome: DispatchOutcome,
    /// States entered, in order
    pub states: Vec<DispatchState>,
    /// Set once the upload succeeded
    pub storage_reference: Option<StorageReference>,
    /// Targets resolved for the primary message type
    pub targets: Vec<TargetId>,
    /// Targets resolved for the failure message type
    pub compensation_targets: Vec<TargetId>,
    /// Successful posts, primary and compensation
    pub posts: usize,
    /// Error that triggered compensation
    pub failure: Option<DispatchError>,
    pub compensation_failure: Option<DispatchError>,
    pub finalizer_failure: Option<DispatchError>,
    pub duration: Duration,
}

impl DispatchReport {
    pub(crate) fn new() -> Self {
        Self {
            outcome: DispatchOutcome::Failed,
            states: vec![DispatchState::Validated],
            storage_reference: None,
            targets: Vec::new(),
            compensation_targets: Vec::new(),
            posts: 0,
            failure: None,
            compensation_failure: None,
            finalizer_failure: None,
            duration: Duration::ZERO,
        }
    }

    fn enter(&mut self, state: DispatchState) {
        self.states.push(state);
    }

    pub fn state(&self) -> DispatchState {
        self.states
            .last()
            .copied()
            .unwrap_or(DispatchState::Validated)
    }
}

/// Runs the dispatch workflow against its collaborators
pub struct DispatchCoordinator<S, R, C, F> {
    storage: Arc<S>,
    resolver: Arc<R>,
    clients: Arc<C>,
    finalizer: Arc<F>,
    policy: DispatchPolicy,
}

impl<S, R, C, F> DispatchCoordinator<S, R, C, F>
where
    S: EnvelopeStorage + Send + Sync + 'static,
    R: TargetResolver + Send + Sync + 'static,
    C: DownstreamClientFactory + 'static,
    F: TransactionFinalizer + Send + Sync + 'static,
{
    pub fn new(
        storage: Arc<S>,
        resolver: Arc<R>,
        clients: Arc<C>,
        finalizer: Arc<F>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            storage,
            resolver,
            clients,
            finalizer,
            policy,
        }
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Run the whole workflow for one validated message.
    ///
    /// Never fails: every error ends up in the report and the logs.
    #[instrument(
        name = "dispatch",
        skip_all,
        fields(
            request_id = %context.request_id,
            transaction_id = %context.transaction_id,
            message_type = %envelope.message_type
        )
    )]
    pub async fn dispatch(
        &self,
        context: &RequestContext,
        envelope: &MessageEnvelope,
    ) -> DispatchReport {
        let started = Instant::now();
        let mut report = DispatchReport::new();

        report.enter(DispatchState::Dispatching);
        match self.deliver(context, envelope, &mut report).await {
            Ok(reference) => {
                report.enter(DispatchState::Succeeded);
                self.release(context, envelope, reference, &mut report).await;
            }
            Err(err) => {
                warn!(error = %err, "Dispatch failed, compensating");
                report.enter(DispatchState::CompensatingFailure);
                self.compensate(context, envelope, &mut report).await;
                error!(error = %err, "Unexpected server error: {err}");
                report.failure = Some(err);
            }
        }
        report.enter(DispatchState::Finalized);

        report.duration = started.elapsed();
        observability::record_dispatch(
            report.outcome.as_str(),
            report.duration.as_secs_f64() * 1000.0,
        );
        report
    }

    /// Persist, resolve and post to every target
    async fn deliver(
        &self,
        context: &RequestContext,
        envelope: &MessageEnvelope,
        report: &mut DispatchReport,
    ) -> Result<StorageReference, DispatchError> {
        let reference = self
            .storage
            .upload_outbound(context, envelope)
            .await
            .map_err(|e| DispatchError::dispatch(DispatchStage::Persist, e))?;
        report.storage_reference = Some(reference.clone());

        report.targets = self
            .resolve(context, envelope, &envelope.message_type)
            .await?;
        report.posts +=
            fanout::post_to_targets(&*self.clients, &report.targets, envelope, &context.headers)
                .await?;

        Ok(reference)
    }

    async fn resolve(
        &self,
        context: &RequestContext,
        envelope: &MessageEnvelope,
        message_type: &str,
    ) -> Result<Vec<TargetId>, DispatchError> {
        let query = MappingQuery {
            source_type: &self.policy.source_type,
            source: &self.policy.source,
            content_type: envelope.content_type.as_str(),
            message_type,
        };
        self.resolver
            .resolve(context, &query)
            .await
            .map_err(|e| DispatchError::dispatch(DispatchStage::Resolve, e))
    }

    async fn release(
        &self,
        context: &RequestContext,
        envelope: &MessageEnvelope,
        reference: StorageReference,
        report: &mut DispatchReport,
    ) {
        if !self.policy.is_release_eligible(&envelope.message_type) {
            info!(posts = report.posts, "Delivered, no release for this message type");
            report.outcome = DispatchOutcome::Delivered;
            return;
        }

        let settlement = Settlement {
            storage_reference: reference,
            message_version: envelope.message_version.clone(),
            response_code: self.policy.settlement_code.clone(),
            response_message: self.policy.settlement_code.clone(),
            currency: envelope.structured.currency.clone(),
            amount: envelope.structured.amount,
        };

        match self.finalizer.release(context, &settlement).await {
            Ok(()) => {
                info!(posts = report.posts, "Delivered and released");
                report.outcome = DispatchOutcome::Released;
            }
            Err(e) => {
                let err = DispatchError::finalizer(FinalizerAction::Release, e);
                error!(error = %err, "Release failed after delivery");
                observability::record_finalizer_failure(FinalizerAction::Release.as_str());
                report.finalizer_failure = Some(err);
                report.outcome = DispatchOutcome::ReleaseFailed;
            }
        }
    }

    /// Post the failure message type, then mark the transaction failed.
    ///
    /// `fail` is called even when the replay itself failed.
    async fn compensate(
        &self,
        context: &RequestContext,
        envelope: &MessageEnvelope,
        report: &mut DispatchReport,
    ) {
        match self.replay_failure(context, envelope).await {
            Ok((targets, posts)) => {
                info!(targets = targets.len(), "Failure message delivered");
                report.compensation_targets = targets;
                report.posts += posts;
            }
            Err(e) => {
                let err = e.into_compensation();
                error!(error = %err, "Compensation failed");
                observability::record_compensation_failure();
                report.compensation_failure = Some(err);
            }
        }

        if let Err(e) = self
            .finalizer
            .fail(context, report.storage_reference.as_ref())
            .await
        {
            let err = DispatchError::finalizer(FinalizerAction::Fail, e);
            error!(error = %err, "Could not mark transaction failed");
            observability::record_finalizer_failure(FinalizerAction::Fail.as_str());
            report.finalizer_failure = Some(err);
        }

        report.outcome = DispatchOutcome::Failed;
    }

    async fn replay_failure(
        &self,
        context: &RequestContext,
        envelope: &MessageEnvelope,
    ) -> Result<(Vec<TargetId>, usize), DispatchError> {
        let targets = self
            .resolve(context, envelope, &envelope.message_type_on_failure)
            .await?;
        let posts =
            fanout::post_to_targets(&*self.clients, &targets, envelope, &context.headers).await?;
        Ok((targets, posts))
    }
}
