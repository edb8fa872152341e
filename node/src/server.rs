use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use haforward_transport::http::{FORWARD_PATH, HEALTH_PATH};
use haforward_transport::{InboundHandler, InboundOutcome};

/// HTTP status a peer's forwarder interprets for each outcome.
///
/// 409 tells the sender the entity is being applied here right now, which
/// it retries like a server error.
pub fn status_for(outcome: InboundOutcome) -> StatusCode {
    match outcome {
        InboundOutcome::Applied => StatusCode::NO_CONTENT,
        InboundOutcome::InFlight => StatusCode::CONFLICT,
        InboundOutcome::Rejected => StatusCode::BAD_REQUEST,
        InboundOutcome::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn forward_handler(
    State(handler): State<Arc<dyn InboundHandler>>,
    body: Bytes,
) -> StatusCode {
    status_for(handler.handle(&body).await)
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

/// Build the receiver router applying forwarded commands with `handler`.
pub fn build_router(handler: Arc<dyn InboundHandler>) -> Router {
    Router::new()
        .route(FORWARD_PATH, post(forward_handler))
        .route(HEALTH_PATH, get(health_handler))
        .with_state(handler)
}
