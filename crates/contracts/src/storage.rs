//! EnvelopeStorage trait - outbound message archive

use crate::{ContractError, MessageEnvelope, RequestContext, StorageReference};

/// Persists the outbound envelope before any downstream call.
///
/// Uploading the same request twice must yield the same reference.
#[trait_variant::make(EnvelopeStorage: Send)]
pub trait LocalEnvelopeStorage {
    /// # Errors
    /// Returns storage error (should include the key being written)
    async fn upload_outbound(
        &self,
        context: &RequestContext,
        envelope: &MessageEnvelope,
    ) -> Result<StorageReference, ContractError>;
}
