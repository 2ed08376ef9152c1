//! roster-api — read-only HTTP surface over the published instance set.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/instances.json` | Sorted `[host, record]` pairs (`?sort_by=type,users`, `?pretty=1`) |
//! | GET | `/healthz` | Snapshot version, refresh time, and size |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use roster_state::{InstanceStore, SortSpec};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: InstanceStore,
    /// Applied when a request does not name a sort.
    pub default_sort: SortSpec,
}

/// Build the API router.
pub fn build_router(store: InstanceStore, default_sort: SortSpec) -> Router {
    let state = ApiState {
        store,
        default_sort,
    };

    Router::new()
        .route("/instances.json", get(handlers::list_instances))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
