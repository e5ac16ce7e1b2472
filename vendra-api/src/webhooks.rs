use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use tracing::{error, warn};
use vendra_core::payment::WebhookEvent;

use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "vendra-signature";

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
/// Provider event ingestion. The signature is verified against the raw
/// body before anything is parsed; unsigned or mis-signed payloads are
/// rejected with 400 and logged as potential security events. Once an
/// event is dispatched the response is 200 regardless of business
/// outcome: the provider's retry semantics expect a fast ack.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        warn!("webhook rejected: missing signature header");
        return StatusCode::BAD_REQUEST;
    };

    if let Err(e) = state.verifier.verify(signature, &body) {
        warn!(error = %e, "webhook rejected: signature verification failed");
        return StatusCode::BAD_REQUEST;
    }

    // Closed event-kind enum: unknown types fail here and are rejected
    // explicitly rather than falling through.
    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "webhook rejected: unparseable payload");
            return StatusCode::BAD_REQUEST;
        }
    };

    if let Err(e) = state.settlement.handle_webhook(&event).await {
        error!(event_id = %event.id, error = %e, "webhook dispatch failed");
    }

    StatusCode::OK
}
