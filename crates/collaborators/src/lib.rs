//! # Collaborators
//!
//! Adapters to the external systems the dispatcher talks to.
//!
//! - `Iso20022Inspector`: envelope derivation
//! - `MappingResolver`: static route table or mapping service
//! - `HttpClientFactory`: downstream targets over HTTP
//! - `FileEnvelopeStorage`: outbound envelope archive
//! - `Ledger`: transaction ledger service or log-only fallback
//! - `RecordingClientFactory`, `MemoryStorage`, `MemoryLedger`: test doubles

pub mod http_client;
pub mod ledger;
pub mod mapping;
pub mod mock;
pub mod parser;
pub mod storage;

pub use http_client::{HttpClientFactory, HttpDownstreamClient};
pub use ledger::{Ledger, LedgerCall, LogOnlyLedger, MemoryLedger, RemoteLedger};
pub use mapping::{MappingResolver, RemoteTargetResolver, StaticTargetResolver};
pub use mock::{MockConfig, RecordedPost, RecordingClient, RecordingClientFactory};
pub use parser::Iso20022Inspector;
pub use storage::{FileEnvelopeStorage, MemoryStorage};
