//! Downstream client interfaces

use crate::{ContractError, ForwardHeaders, StructuredMessage, TargetId};

/// One representation of the message, borrowed from the envelope
#[derive(Debug, Clone, Copy)]
pub enum OutboundPayload<'a> {
    /// Serialized XML document
    Xml(&'a str),
    /// Structured message, serialized as JSON by the client
    Json(&'a StructuredMessage),
}

impl OutboundPayload<'_> {
    pub fn representation(&self) -> crate::Representation {
        match self {
            Self::Xml(_) => crate::Representation::Xml,
            Self::Json(_) => crate::Representation::Json,
        }
    }
}

/// Client bound to one downstream target
#[trait_variant::make(DownstreamClient: Send)]
pub trait LocalDownstreamClient {
    /// Target this client posts to
    fn target(&self) -> &TargetId;

    /// Post one representation, with the forwarded headers
    ///
    /// # Errors
    /// Transport failure or a non-success answer
    async fn post(
        &self,
        payload: OutboundPayload<'_>,
        headers: &ForwardHeaders,
    ) -> Result<(), ContractError>;
}

/// Builds a [`DownstreamClient`] for a resolved target id
pub trait DownstreamClientFactory: Send + Sync {
    type Client: DownstreamClient + Send + Sync;

    /// # Errors
    /// [`ContractError::UnknownTarget`] when the id has no configured endpoint
    fn client_for(&self, target: &TargetId) -> Result<Self::Client, ContractError>;
}
