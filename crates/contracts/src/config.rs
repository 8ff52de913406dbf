//! ServiceConfig - Config Loader output
//!
//! Describes the full service: HTTP listener, dispatch pool, mapping routes,
//! downstream targets, envelope storage and ledger endpoint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Background dispatch
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Target mapping
    #[serde(default)]
    pub mapping: MappingConfig,

    /// Downstream endpoints, keyed by target id
    #[serde(default)]
    pub targets: BTreeMap<String, TargetConfig>,

    /// Envelope archive
    #[serde(default)]
    pub storage: StorageConfig,

    /// Transaction ledger
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:8080")
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Route prefix, without trailing slash
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            base_path: default_base_path(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_base_path() -> String {
    "/msa/out".to_string()
}

/// Dispatch pool and workflow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Worker tasks consuming the queue, must be > 0
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Queued jobs before new requests are refused, must be > 0
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upper bound for draining on shutdown (seconds)
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Mapping `source_type` for outbound messages
    #[serde(default = "default_source_type")]
    pub source_type: String,

    /// Mapping `source` for outbound messages
    #[serde(default = "default_source")]
    pub source: String,

    /// Message types that trigger a ledger release on success
    #[serde(default = "default_release_message_types")]
    pub release_message_types: Vec<String>,

    /// Code and message reported on release
    #[serde(default = "default_settlement_code")]
    pub settlement_code: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            source_type: default_source_type(),
            source: default_source(),
            release_message_types: default_release_message_types(),
            settlement_code: default_settlement_code(),
        }
    }
}

fn default_workers() -> usize {
    8
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_source_type() -> String {
    "message_out".to_string()
}

fn default_source() -> String {
    "msg_out".to_string()
}

fn default_release_message_types() -> Vec<String> {
    vec!["pacs.008".to_string(), "pacs.009".to_string()]
}

fn default_settlement_code() -> String {
    crate::SETTLEMENT_ACCEPTED.to_string()
}

/// Target mapping settings
///
/// With `remote_url` set, routes are fetched from the mapping service on
/// every dispatch and `routes` is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Request timeout for the mapping service (ms)
    #[serde(default = "default_mapping_timeout_ms")]
    pub timeout_ms: u64,

    /// Static route table
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            timeout_ms: default_mapping_timeout_ms(),
            routes: Vec::new(),
        }
    }
}

fn default_mapping_timeout_ms() -> u64 {
    5_000
}

/// One static route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Media type essence (e.g., "application/xml"), `*` matches any
    pub content_type: String,

    /// Message type (e.g., "pacs.008" or "pacs.008.failed")
    pub message_type: String,

    /// Target ids, in delivery order
    pub targets: Vec<String>,
}

/// Downstream endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub url: String,

    #[serde(default = "default_target_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_target_timeout_ms() -> u64 {
    10_000
}

/// Envelope archive settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub base_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> String {
    "./storage".to_string()
}

/// Transaction ledger settings
///
/// Without `url` every transaction is accepted and outcomes are only
/// logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_ledger_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_ledger_timeout_ms(),
        }
    }
}

fn default_ledger_timeout_ms() -> u64 {
    5_000
}

impl ServiceConfig {
    /// Whether a successful dispatch of `message_type` releases the transaction
    pub fn is_release_eligible(&self, message_type: &str) -> bool {
        self.dispatch
            .release_message_types
            .iter()
            .any(|t| t == message_type)
    }

    /// Every target id referenced by a route
    pub fn routed_targets(&self) -> impl Iterator<Item = &str> {
        self.mapping
            .routes
            .iter()
            .flat_map(|route| route.targets.iter().map(String::as_str))
    }
}
