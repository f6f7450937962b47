// GET handlers: version, live snapshot

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};

use super::{AppState, LiveQuery};
use crate::error::AggregateError;
use crate::identity::Identity;
use crate::version::{NAME, VERSION};

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// Bearer identity from the `Authorization` header; anything else is anonymous.
pub(super) fn identity_from(headers: &HeaderMap) -> Option<Identity> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(Identity::from_authorization)
}

impl IntoResponse for AggregateError {
    fn into_response(self) -> Response {
        let status = match self {
            AggregateError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// GET /api/diagrams/{id}/live: one aggregation cycle (or the caller's cached snapshot).
pub(super) async fn live_snapshot_handler(
    State(state): State<AppState>,
    Path(diagram_id): Path<String>,
    Query(query): Query<LiveQuery>,
    headers: HeaderMap,
) -> Result<Response, AggregateError> {
    let identity = identity_from(&headers);
    let snapshot = state
        .aggregator
        .aggregate(&diagram_id, identity.as_ref())
        .await?;
    let body = if query.overlays {
        snapshot
    } else {
        snapshot.without_overlays()
    };
    Ok(Json(body).into_response())
}
