//! TargetResolver trait - mapping store interface

use crate::{ContractError, RequestContext, TargetId};

/// Lookup key for the mapping store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingQuery<'a> {
    pub source_type: &'a str,
    pub source: &'a str,
    /// Lowercased media type essence with parameters dropped, e.g. a
    /// `Application/XML; charset=UTF-8` header is looked up as
    /// `application/xml`. Mapping stores must key routes the same way.
    pub content_type: &'a str,
    pub message_type: &'a str,
}

/// Resolves the ordered list of downstream targets for a message.
///
/// Called fresh on every dispatch; implementations must not cache results
/// across requests. Identical queries against an unchanged store return
/// identical lists.
#[trait_variant::make(TargetResolver: Send)]
pub trait LocalTargetResolver {
    /// Resolve targets, in delivery order
    ///
    /// # Errors
    /// Mapping store unreachable or returned an unusable answer
    async fn resolve(
        &self,
        context: &RequestContext,
        query: &MappingQuery<'_>,
    ) -> Result<Vec<TargetId>, ContractError>;
}
