//! # Contracts
//!
//! Frozen interface contracts, defining inter-crate data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Collaborators
//! Mapping store, envelope archive, transaction ledger and downstream services
//! are external. They are reached only through the traits defined here.

mod config;
mod context;
mod downstream;
mod envelope;
mod error;
mod ledger;
mod mapping;
mod parser;
mod storage;
mod target_id;

pub use config::*;
pub use context::*;
pub use downstream::*;
pub use envelope::*;
pub use error::*;
pub use ledger::*;
pub use mapping::*;
pub use parser::EnvelopeParser;
pub use storage::*;
pub use target_id::TargetId;
