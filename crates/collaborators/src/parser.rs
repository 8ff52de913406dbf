//! Iso20022Inspector - header-level ISO 20022 message inspector
//!
//! Reads just enough of the payload to route it: message type and version
//! from the XML namespace (or top-level JSON keys) and the settlement
//! currency/amount. It does not validate the message against its schema.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use contracts::{ContentType, EnvelopeError, EnvelopeParser, Representation, StructuredMessage};

/// `urn:iso:std:iso:20022:tech:xsd:pacs.008.001.08` -> (`pacs.008`, `pacs.008.001.08`)
static NAMESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"urn:iso:std:iso:20022:tech:xsd:(([a-z]{4}\.[0-9]{3})\.[0-9]{3}\.[0-9]{2})")
        .expect("valid namespace pattern")
});

/// First `<...Amt Ccy="EUR">12.50</...Amt>` element
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?:[A-Za-z0-9_]+:)?([A-Za-z]*Amt)\s+Ccy="([A-Z]{3})"\s*>\s*([0-9]+(?:\.[0-9]+)?)\s*<"#)
        .expect("valid amount pattern")
});

static MESSAGE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:[A-Za-z0-9_]+:)?MsgId>\s*([^<]+?)\s*<").expect("valid message id pattern")
});

/// JSON keys lifted into [`StructuredMessage`]
const MESSAGE_TYPE_KEY: &str = "message_type";
const MESSAGE_VERSION_KEY: &str = "message_version";
const CURRENCY_KEY: &str = "currency";
const AMOUNT_KEY: &str = "amount";

/// Header-level ISO 20022 inspector
#[derive(Debug, Clone, Default)]
pub struct Iso20022Inspector;

impl Iso20022Inspector {
    pub fn new() -> Self {
        Self
    }

    fn structured_from_xml(text: &str) -> Result<StructuredMessage, EnvelopeError> {
        let namespace = NAMESPACE
            .captures(text)
            .ok_or_else(|| EnvelopeError::MissingField("message_type".into()))?;
        let amount = AMOUNT
            .captures(text)
            .ok_or_else(|| EnvelopeError::MissingField("amount".into()))?;

        let mut fields = Map::new();
        fields.insert(
            MESSAGE_VERSION_KEY.into(),
            Value::String(namespace[1].to_string()),
        );
        fields.insert("amount_element".into(), Value::String(amount[1].to_string()));
        if let Some(message_id) = MESSAGE_ID.captures(text) {
            fields.insert("message_id".into(), Value::String(message_id[1].to_string()));
        }

        Ok(StructuredMessage {
            message_type: namespace[2].to_string(),
            currency: amount[2].to_string(),
            amount: parse_amount(&amount[3])?,
            fields,
        })
    }

    fn structured_from_json(text: &str) -> Result<StructuredMessage, EnvelopeError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(EnvelopeError::Malformed("expected a JSON object".into()));
        };

        let message_type = take_string(&mut fields, MESSAGE_TYPE_KEY)?;
        let currency = take_string(&mut fields, CURRENCY_KEY)?;
        let amount = match fields.remove(AMOUNT_KEY) {
            Some(Value::String(s)) => parse_amount(&s)?,
            Some(Value::Number(n)) => parse_amount(&n.to_string())?,
            Some(other) => {
                return Err(EnvelopeError::Malformed(format!(
                    "amount must be a number or string, got {other}"
                )))
            }
            None => return Err(EnvelopeError::MissingField(AMOUNT_KEY.into())),
        };

        Ok(StructuredMessage {
            message_type,
            currency,
            amount,
            fields,
        })
    }
}

impl EnvelopeParser for Iso20022Inspector {
    fn derive_xml(&self, text: &str) -> Result<String, EnvelopeError> {
        let document = text.trim_start_matches('\u{feff}').trim();
        if !document.starts_with('<') {
            return Err(EnvelopeError::Malformed("not an XML document".into()));
        }
        Ok(document.to_string())
    }

    fn derive_structured(
        &self,
        text: &str,
        content_type: &ContentType,
    ) -> Result<StructuredMessage, EnvelopeError> {
        if content_type.selects(Representation::Xml) {
            Self::structured_from_xml(text)
        } else {
            Self::structured_from_json(text)
        }
    }

    fn derive_message_type(&self, structured: &StructuredMessage) -> Result<String, EnvelopeError> {
        let message_type = structured.message_type.trim();
        if message_type.is_empty() {
            return Err(EnvelopeError::MissingField(MESSAGE_TYPE_KEY.into()));
        }
        Ok(message_type.to_string())
    }

    fn derive_version(
        &self,
        _text: &str,
        structured: &StructuredMessage,
        message_type_header: Option<&str>,
    ) -> Result<String, EnvelopeError> {
        if let Some(header) = message_type_header.map(str::trim).filter(|h| !h.is_empty()) {
            return Ok(header.to_string());
        }

        structured
            .fields
            .get(MESSAGE_VERSION_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| EnvelopeError::MissingField(MESSAGE_VERSION_KEY.into()))
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Result<String, EnvelopeError> {
    match fields.remove(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        Some(_) => Err(EnvelopeError::Malformed(format!("'{key}' must be a non-empty string"))),
        None => Err(EnvelopeError::MissingField(key.into())),
    }
}

fn parse_amount(raw: &str) -> Result<Decimal, EnvelopeError> {
    Decimal::from_str(raw.trim())
        .map_err(|e| EnvelopeError::Malformed(format!("invalid amount '{raw}': {e}")))
}
