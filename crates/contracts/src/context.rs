//! RequestContext - per-request identity and forwarded headers
//!
//! Built once by the HTTP surface, then shared (`Arc`) into the dispatch job
//! and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header carrying the transaction the message belongs to
pub const TRANSACTION_ID_HEADER: &str = "X-Transaction-Id";

/// Optional header overriding the message version
pub const MESSAGE_TYPE_HEADER: &str = "X-Message-Type";

/// Header set on every downstream post, carrying the request id
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Headers never forwarded to downstream targets
const SKIPPED_HEADERS: [&str; 11] = [
    "host",
    "content-length",
    "content-type",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "x-request-id",
];

/// Ordered header list forwarded verbatim to every target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardHeaders(Vec<(String, String)>);

impl ForwardHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from inbound `(name, value)` pairs.
    ///
    /// Hop-by-hop, length and content-type headers are dropped; the HTTP
    /// client sets them per representation. `X-Request-Id` is replaced by `request_id`.
    pub fn from_inbound<I, K, V>(headers: I, request_id: Uuid) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut forwarded: Vec<(String, String)> = headers
            .into_iter()
            .filter(|(name, _)| {
                let name = name.as_ref();
                !SKIPPED_HEADERS
                    .iter()
                    .any(|skipped| name.eq_ignore_ascii_case(skipped))
            })
            .map(|(name, value)| (name.as_ref().to_string(), value.into()))
            .collect();
        forwarded.push((REQUEST_ID_HEADER.to_string(), request_id.to_string()));
        Self(forwarded)
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value of `name`, case-insensitive
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-request context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Generated per inbound request (UUID v4)
    pub request_id: Uuid,

    /// Non-empty value of `X-Transaction-Id`
    pub transaction_id: String,

    /// Time the request was accepted
    pub requested_at: DateTime<Utc>,

    /// Raw `Content-Type` header value
    pub content_type: Option<String>,

    /// Raw `X-Message-Type` header value
    pub message_type_header: Option<String>,

    /// Headers forwarded to every target
    pub headers: ForwardHeaders,
}

impl RequestContext {
    /// New context with a fresh request id and the current time
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), transaction_id)
    }

    /// New context for an id already handed out to the caller
    pub fn with_id(request_id: Uuid, transaction_id: impl Into<String>) -> Self {
        Self {
            request_id,
            transaction_id: transaction_id.into(),
            requested_at: Utc::now(),
            content_type: None,
            message_type_header: None,
            headers: ForwardHeaders::from_inbound(Vec::<(String, String)>::new(), request_id),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_message_type_header(mut self, value: impl Into<String>) -> Self {
        self.message_type_header = Some(value.into());
        self
    }

    pub fn with_headers(mut self, headers: ForwardHeaders) -> Self {
        self.headers = headers;
        self
    }
}
