//! Response bodies and rejections

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MISSING_BODY: &str = "Missing message body";
pub const MISSING_TRANSACTION_ID: &str = "Missing X-Transaction-Id HTTP header";
pub const INVALID_MESSAGE: &str = "Received an invalid incoming message";
pub const UNKNOWN_TRANSACTION: &str = "Could not find such transaction";
pub const SERVER_ERROR: &str = "Unexpected server error";
pub const SHUTTING_DOWN: &str = "Service is shutting down";
pub const QUEUE_FULL: &str = "Service is busy, retry later";
pub const RECEIVED: &str = "Request was received";
pub const HEALTHY: &str = "Healthy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    #[serde(rename = "OK")]
    Ok,
    Rejected,
}

/// Body of every response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub request_id: Uuid,
    pub status: ResponseStatus,
    pub message: String,
}

impl ApiResponse {
    pub fn ok(request_id: Uuid, message: &str) -> Self {
        Self {
            request_id,
            status: ResponseStatus::Ok,
            message: message.to_string(),
        }
    }
}

/// Request refused before any background work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: StatusCode,
    pub request_id: Uuid,
    pub message: &'static str,
}

impl Rejection {
    pub fn new(status: StatusCode, request_id: Uuid, message: &'static str) -> Self {
        Self {
            status,
            request_id,
            message,
        }
    }

    pub fn bad_request(request_id: Uuid, message: &'static str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, request_id, message)
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiResponse {
                request_id: self.request_id,
                status: ResponseStatus::Rejected,
                message: self.message.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        let body = ApiResponse::ok(Uuid::nil(), RECEIVED);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "OK");
        assert_eq!(json["message"], "Request was received");

        let json = serde_json::to_value(ResponseStatus::Rejected).unwrap();
        assert_eq!(json, "Rejected");
    }
}
