//! Dispatcher error types

use std::fmt;

use contracts::ContractError;
use thiserror::Error;

/// Step of the workflow an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    /// Envelope upload
    Persist,
    /// Target resolution
    Resolve,
    /// Client construction
    Connect,
    /// Posting to a target
    Post,
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Persist => "persist",
            Self::Resolve => "resolve",
            Self::Connect => "connect",
            Self::Post => "post",
        })
    }
}

/// Ledger call that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerAction {
    Release,
    Fail,
}

impl FinalizerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for FinalizerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised inside a background dispatch
///
/// Never returned to the HTTP caller; consumed by compensation and logging.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Primary dispatch failed
    #[error("dispatch failed during {stage}: {source}")]
    DispatchFailure {
        stage: DispatchStage,
        #[source]
        source: ContractError,
    },

    /// Failure fan-out did not complete
    #[error("compensation failed during {stage}: {source}")]
    CompensationFailure {
        stage: DispatchStage,
        #[source]
        source: ContractError,
    },

    /// Ledger release/fail call failed
    #[error("finalizer {action} failed: {source}")]
    FinalizerFailure {
        action: FinalizerAction,
        #[source]
        source: ContractError,
    },
}

impl DispatchError {
    pub fn dispatch(stage: DispatchStage, source: ContractError) -> Self {
        Self::DispatchFailure { stage, source }
    }

    pub fn finalizer(action: FinalizerAction, source: ContractError) -> Self {
        Self::FinalizerFailure { action, source }
    }

    /// Same failure, raised while replaying the fan-out for the failure path
    pub fn into_compensation(self) -> Self {
        match self {
            Self::DispatchFailure { stage, source } => Self::CompensationFailure { stage, source },
            other => other,
        }
    }

    pub fn stage(&self) -> Option<DispatchStage> {
        match self {
            Self::DispatchFailure { stage, .. } | Self::CompensationFailure { stage, .. } => {
                Some(*stage)
            }
            Self::FinalizerFailure { .. } => None,
        }
    }
}

/// Pool admission errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Pool stopped accepting work
    #[error("dispatch pool is shutting down")]
    ShuttingDown,

    /// Every queue slot is taken
    #[error("dispatch queue is full")]
    QueueFull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_compensation_keeps_stage() {
        let err = DispatchError::dispatch(
            DispatchStage::Post,
            ContractError::downstream("rtp-out", "refused"),
        )
        .into_compensation();

        assert!(matches!(err, DispatchError::CompensationFailure { .. }));
        assert_eq!(err.stage(), Some(DispatchStage::Post));
        assert_eq!(
            err.to_string(),
            "compensation failed during post: downstream 'rtp-out' error: refused"
        );
    }
}
