//! Request handlers
//!
//! `POST {base}` validates synchronously, enqueues one dispatch job and
//! answers `201` without waiting for it. A full queue is refused with `503`
//! rather than holding the response.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use tracing::{error, info, instrument, warn, Span};
use uuid::Uuid;

use contracts::{
    EnvelopeParser, ForwardHeaders, RequestContext, TransactionLookup, MESSAGE_TYPE_HEADER,
    TRANSACTION_ID_HEADER,
};
use dispatcher::{DispatchJob, DispatchQueue, SubmitError};

use crate::response::{
    ApiResponse, Rejection, HEALTHY, INVALID_MESSAGE, MISSING_BODY, MISSING_TRANSACTION_ID,
    QUEUE_FULL, RECEIVED, SERVER_ERROR, SHUTTING_DOWN, UNKNOWN_TRANSACTION,
};

/// Shared handler state
pub struct AppState<L> {
    pub parser: Arc<dyn EnvelopeParser>,
    pub lookup: Arc<L>,
    pub queue: DispatchQueue,
}

impl<L> AppState<L> {
    pub fn new(parser: Arc<dyn EnvelopeParser>, lookup: Arc<L>, queue: DispatchQueue) -> Self {
        Self {
            parser,
            lookup,
            queue,
        }
    }
}

impl<L> Clone for AppState<L> {
    fn clone(&self) -> Self {
        Self {
            parser: Arc::clone(&self.parser),
            lookup: Arc::clone(&self.lookup),
            queue: self.queue.clone(),
        }
    }
}

/// `POST {base}`
pub async fn post_message<L>(
    State(state): State<AppState<L>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    L: TransactionLookup + Send + Sync + 'static,
{
    let request_id = Uuid::new_v4();
    let response = match accept(&state, request_id, &headers, body).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(ApiResponse::ok(request_id, RECEIVED)),
        )
            .into_response(),
        Err(rejection) => rejection.into_response(),
    };

    observability::record_request(response.status().as_u16());
    response
}

/// `GET {base}/_healthy`
pub async fn health() -> Json<ApiResponse> {
    observability::record_request(StatusCode::OK.as_u16());
    Json(ApiResponse::ok(Uuid::new_v4(), HEALTHY))
}

/// Validate in order: body, transaction header, envelope, ledger; then enqueue.
#[instrument(
    name = "accept_message",
    skip(state, headers, body),
    fields(request_id = %request_id, transaction_id = tracing::field::Empty)
)]
async fn accept<L>(
    state: &AppState<L>,
    request_id: Uuid,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<(), Rejection>
where
    L: TransactionLookup + Send + Sync + 'static,
{
    if body.is_empty() {
        warn!("Rejected: {MISSING_BODY}");
        return Err(Rejection::bad_request(request_id, MISSING_BODY));
    }

    let transaction_id = header_str(headers, TRANSACTION_ID_HEADER)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            warn!("Rejected: {MISSING_TRANSACTION_ID}");
            Rejection::bad_request(request_id, MISSING_TRANSACTION_ID)
        })?;
    Span::current().record("transaction_id", transaction_id);

    let content_type = header_str(headers, CONTENT_TYPE.as_str());
    let message_type_header = header_str(headers, MESSAGE_TYPE_HEADER);

    let envelope = state
        .parser
        .derive_envelope(body, content_type.unwrap_or_default(), message_type_header)
        .map_err(|e| {
            warn!(error = %e, "Rejected: {INVALID_MESSAGE}");
            Rejection::bad_request(request_id, INVALID_MESSAGE)
        })?;

    match state.lookup.exists(transaction_id).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("Rejected: {UNKNOWN_TRANSACTION}");
            return Err(Rejection::new(
                StatusCode::NOT_FOUND,
                request_id,
                UNKNOWN_TRANSACTION,
            ));
        }
        Err(e) => {
            error!(error = %e, "Transaction lookup failed");
            return Err(Rejection::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                request_id,
                SERVER_ERROR,
            ));
        }
    }

    let mut context = RequestContext::with_id(request_id, transaction_id)
        .with_headers(ForwardHeaders::from_inbound(inbound_headers(headers), request_id));
    if let Some(content_type) = content_type {
        context = context.with_content_type(content_type);
    }
    if let Some(value) = message_type_header {
        context = context.with_message_type_header(value);
    }

    let message_type = envelope.message_type.clone();
    state
        .queue
        .submit(DispatchJob::new(context, envelope))
        .await
        .map_err(|e| {
            let message = match e {
                SubmitError::ShuttingDown => SHUTTING_DOWN,
                SubmitError::QueueFull => QUEUE_FULL,
            };
            warn!(error = %e, "Rejected: {message}");
            Rejection::new(StatusCode::SERVICE_UNAVAILABLE, request_id, message)
        })?;

    info!(message_type = %message_type, "{RECEIVED}");
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Inbound headers with a UTF-8 value
fn inbound_headers(headers: &HeaderMap) -> impl Iterator<Item = (&str, &str)> {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|value| (name.as_str(), value)))
}
