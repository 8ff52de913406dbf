//! EnvelopeParser trait - turns raw bytes into a MessageEnvelope
//!
//! Parsing is synchronous and runs on the request path, so the trait is
//! object-safe and shared as `Arc<dyn EnvelopeParser>`.

use bytes::Bytes;

use crate::{ContentType, EnvelopeError, MessageEnvelope, Representation, StructuredMessage};

/// Message inspector
pub trait EnvelopeParser: Send + Sync {
    /// Serialized XML form of an XML payload
    fn derive_xml(&self, text: &str) -> Result<String, EnvelopeError>;

    /// Structured form of the payload
    fn derive_structured(
        &self,
        text: &str,
        content_type: &ContentType,
    ) -> Result<StructuredMessage, EnvelopeError>;

    /// Routing key for the primary fan-out
    fn derive_message_type(&self, structured: &StructuredMessage) -> Result<String, EnvelopeError>;

    /// Full message version; `message_type_header` wins when present
    fn derive_version(
        &self,
        text: &str,
        structured: &StructuredMessage,
        message_type_header: Option<&str>,
    ) -> Result<String, EnvelopeError>;

    /// Routing key for the failure fan-out
    fn failure_message_type(&self, message_type: &str) -> String {
        format!("{message_type}.failed")
    }

    /// Derive the full envelope.
    ///
    /// # Errors
    /// Any [`EnvelopeError`]; the caller answers `400`.
    fn derive_envelope(
        &self,
        raw: Bytes,
        content_type: &str,
        message_type_header: Option<&str>,
    ) -> Result<MessageEnvelope, EnvelopeError> {
        let content_type = ContentType::parse(content_type)?;
        let text =
            std::str::from_utf8(&raw).map_err(|e| EnvelopeError::Encoding(e.to_string()))?;
        if text.trim().is_empty() {
            return Err(EnvelopeError::Malformed("empty payload".into()));
        }

        let message_xml = if content_type.selects(Representation::Xml) {
            Some(self.derive_xml(text)?)
        } else {
            None
        };
        let structured = self.derive_structured(text, &content_type)?;
        let message_type = self.derive_message_type(&structured)?;
        let message_version = self.derive_version(text, &structured, message_type_header)?;
        let message_type_on_failure = self.failure_message_type(&message_type);

        Ok(MessageEnvelope {
            raw_payload: raw,
            content_type,
            message_type,
            message_type_on_failure,
            message_version,
            message_xml,
            structured,
        })
    }
}
