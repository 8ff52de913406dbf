//! MessageEnvelope - parsed inbound message plus routing metadata
//!
//! The envelope is derived once, synchronously, before the request is
//! acknowledged. After hand-off it is shared read-only (`Arc`) with the
//! dispatch job.

use std::fmt;

use bytes::Bytes;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{EnvelopeError, OutboundPayload};

/// Serialized form posted to a downstream target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Representation {
    /// Serialized XML document
    Xml,
    /// Structured message as JSON
    Json,
}

impl Representation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate deciding whether a media type selects a representation
pub type MediaPredicate = fn(&str) -> bool;

/// Representation rules, evaluated independently and in this order.
///
/// A media type matching several predicates selects several
/// representations, and every one of them is posted to each target.
pub const REPRESENTATION_RULES: [(Representation, MediaPredicate); 2] = [
    (Representation::Xml, is_xml_media),
    (Representation::Json, is_json_media),
];

/// XML-like media type (`application/xml`, `text/xml`, `application/iso20022+xml`, ...)
pub fn is_xml_media(essence: &str) -> bool {
    essence.contains("xml")
}

/// JSON-like media type (`application/json`, `application/problem+json`, ...)
pub fn is_json_media(essence: &str) -> bool {
    essence.contains("json")
}

/// Media type of the inbound message and the representations it selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    essence: String,
    representations: Vec<Representation>,
}

impl ContentType {
    /// Parse a `Content-Type` header value.
    ///
    /// Parameters (`; charset=...`) are dropped and the essence is lowercased.
    ///
    /// # Errors
    /// [`EnvelopeError::UnsupportedContentType`] when no rule matches.
    pub fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        let essence = raw
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        let representations: Vec<Representation> = REPRESENTATION_RULES
            .iter()
            .filter(|(_, matches)| matches(&essence))
            .map(|(representation, _)| *representation)
            .collect();

        if representations.is_empty() {
            return Err(EnvelopeError::UnsupportedContentType(raw.to_string()));
        }

        Ok(Self {
            essence,
            representations,
        })
    }

    /// Lowercased media type without parameters
    pub fn as_str(&self) -> &str {
        &self.essence
    }

    /// Selected representations, in rule order
    pub fn representations(&self) -> &[Representation] {
        &self.representations
    }

    pub fn selects(&self, representation: Representation) -> bool {
        self.representations.contains(&representation)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.essence)
    }
}

/// Typed view of the message, sent downstream as the JSON representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredMessage {
    /// Message type (e.g. `pacs.008`)
    pub message_type: String,

    /// ISO 4217 currency code of the settlement amount
    pub currency: String,

    /// Settlement amount
    pub amount: Decimal,

    /// Message-specific fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Key of a persisted envelope, assigned by [`crate::EnvelopeStorage`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageReference(String);

impl StorageReference {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fully derived inbound message
#[derive(Debug, Clone)]
pub struct MessageEnvelope {
    /// Payload exactly as received
    pub raw_payload: Bytes,

    /// Inbound media type
    pub content_type: ContentType,

    /// Routing key for the primary fan-out
    pub message_type: String,

    /// Routing key for the failure fan-out
    pub message_type_on_failure: String,

    /// Full message version (e.g. `pacs.008.001.08`)
    pub message_version: String,

    /// Serialized XML form, present when the XML rule matched
    pub message_xml: Option<String>,

    /// Structured form
    pub structured: StructuredMessage,
}

impl MessageEnvelope {
    /// Borrow the payload for `representation`.
    ///
    /// `None` when the XML form was not derived.
    pub fn payload_for(&self, representation: Representation) -> Option<OutboundPayload<'_>> {
        match representation {
            Representation::Xml => self.message_xml.as_deref().map(OutboundPayload::Xml),
            Representation::Json => Some(OutboundPayload::Json(&self.structured)),
        }
    }

    /// File extension used when persisting the raw payload
    pub fn payload_extension(&self) -> &'static str {
        match self.content_type.representations().first() {
            Some(Representation::Xml) => "xml",
            Some(Representation::Json) => "json",
            None => "bin",
        }
    }
}
