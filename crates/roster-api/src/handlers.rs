//! API handlers.
//!
//! Every handler reads one `Arc<Snapshot>` from the store, so a response
//! never mixes two refresh cycles.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, error};

use roster_state::SortSpec;

use crate::ApiState;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        [(ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(ErrorBody {
            error: msg.to_string(),
        }),
    )
        .into_response()
}

/// Query parameters for the JSON export.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub sort_by: Option<String>,
    pub pretty: Option<String>,
}

impl ListQuery {
    fn is_pretty(&self) -> bool {
        matches!(self.pretty.as_deref(), Some("1" | "true"))
    }
}

/// GET /instances.json
pub async fn list_instances(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let spec = match query.sort_by.as_deref() {
        Some(raw) => match SortSpec::parse(raw) {
            Ok(spec) => spec,
            Err(e) => {
                debug!(sort_by = raw, error = %e, "rejected sort spec");
                return error_response(&e.to_string(), StatusCode::BAD_REQUEST);
            }
        },
        None => state.default_sort.clone(),
    };

    let snapshot = state.store.snapshot();
    let sorted = snapshot.sorted(&spec);
    let body = if query.is_pretty() {
        serde_json::to_string_pretty(&sorted)
    } else {
        serde_json::to_string(&sorted)
    };

    match body {
        Ok(body) => (
            [
                (CONTENT_TYPE, JSON_CONTENT_TYPE),
                (ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            ],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to render instance list");
            error_response("failed to render instance list", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /healthz
pub async fn healthz(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = state.store.snapshot();
    Json(serde_json::json!({
        "version": snapshot.version,
        "refreshed_at": snapshot.refreshed_at,
        "instances": snapshot.len(),
    }))
}
