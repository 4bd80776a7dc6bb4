//! Collect endpoint.
//!
//! Body: `{ "type": "event" | "identify", "payload": { "website": ..., ... } }`.
//! The continuity token travels in `x-pulse-cache` on the way in and as
//! `cache` in the response body on the way out.

use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use collector_core::schema::validate_body_size;
use collector_core::CollectRequest;
use ingest::CollectOutcome;
use tracing::debug;

use crate::extractors::ClientContext;
use crate::response::{ApiError, BotResponse, CollectResponse};
use crate::state::AppState;

/// POST /api/send
pub async fn send_handler(
    State(state): State<AppState>,
    ClientContext(ctx): ClientContext,
    body: Bytes,
) -> Result<Response, ApiError> {
    // Check payload size before parsing
    validate_body_size(&body)?;

    let request: CollectRequest =
        serde_json::from_slice(&body).map_err(collector_core::Error::from)?;

    debug!(
        kind = request.kind(),
        payload_size = body.len(),
        "Received collect request"
    );

    match state.pipeline.collect(request, ctx).await? {
        CollectOutcome::Accepted { token, session } => Ok(Json(CollectResponse {
            cache: token,
            session,
        })
        .into_response()),
        CollectOutcome::Bot => Ok(Json(BotResponse::default()).into_response()),
    }
}
