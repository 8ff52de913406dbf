//! Transaction ledger interfaces
//!
//! The ledger is external; these traits cover the two things this service
//! needs from it: an existence check at admission and the final outcome.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ContractError, RequestContext, StorageReference};

/// Settlement status code reported on release
pub const SETTLEMENT_ACCEPTED: &str = "ACSC";

/// Data passed to [`TransactionFinalizer::release`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub storage_reference: StorageReference,
    pub message_version: String,
    pub response_code: String,
    pub response_message: String,
    pub currency: String,
    pub amount: Decimal,
}

/// Records the outcome of a dispatch.
///
/// Exactly one of `release` or `fail` is issued per dispatch, or neither
/// when the message type is not release-eligible.
#[trait_variant::make(TransactionFinalizer: Send)]
pub trait LocalTransactionFinalizer {
    /// Mark the transaction settled
    async fn release(
        &self,
        context: &RequestContext,
        settlement: &Settlement,
    ) -> Result<(), ContractError>;

    /// Mark the transaction failed.
    ///
    /// `storage_reference` is `None` when the envelope upload itself failed.
    async fn fail(
        &self,
        context: &RequestContext,
        storage_reference: Option<&StorageReference>,
    ) -> Result<(), ContractError>;
}

/// Admission-time existence check
#[trait_variant::make(TransactionLookup: Send)]
pub trait LocalTransactionLookup {
    async fn exists(&self, transaction_id: &str) -> Result<bool, ContractError>;
}
