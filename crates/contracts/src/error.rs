//! Layered error definitions
//!
//! Categorized by source: config / envelope / storage / mapping / downstream / ledger

use thiserror::Error;

/// Unified collaborator error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Storage Errors =====
    /// Envelope upload error
    #[error("storage error: {message}")]
    Storage { message: String },

    // ===== Mapping Errors =====
    /// Target resolution error
    #[error("mapping error: {message}")]
    Mapping { message: String },

    // ===== Downstream Errors =====
    /// No client can be built for the target
    #[error("unknown downstream target '{target}'")]
    UnknownTarget { target: String },

    /// Transport error while posting to a target
    #[error("downstream '{target}' error: {message}")]
    Downstream { target: String, message: String },

    /// Target answered with a non-2xx status
    #[error("downstream '{target}' rejected the message with status {status}")]
    DownstreamStatus { target: String, status: u16 },

    // ===== Ledger Errors =====
    /// Transaction ledger error
    #[error("ledger error for transaction '{transaction_id}': {message}")]
    Ledger {
        transaction_id: String,
        message: String,
    },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create mapping error
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping {
            message: message.into(),
        }
    }

    /// Create downstream transport error
    pub fn downstream(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Downstream {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create ledger error
    pub fn ledger(transaction_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ledger {
            transaction_id: transaction_id.into(),
            message: message.into(),
        }
    }
}

/// Envelope derivation error
///
/// Raised while turning raw bytes into a [`crate::MessageEnvelope`]. Every
/// variant means the inbound message itself is unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Neither representation rule matches the media type
    #[error("unsupported content type '{0}'")]
    UnsupportedContentType(String),

    /// Payload is not valid UTF-8 text
    #[error("payload is not valid UTF-8: {0}")]
    Encoding(String),

    /// A routing field could not be found in the payload
    #[error("missing field '{0}'")]
    MissingField(String),

    /// Payload could not be parsed
    #[error("malformed payload: {0}")]
    Malformed(String),
}
