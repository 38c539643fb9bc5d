//! Resource routes. The first path segment is a registry key (or alias) resolved per request.

use crate::handlers::resource::{create, delete as delete_handler, history, list, read, update};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/:resource", get(list).post(create))
        .route("/:resource/:id", get(read).patch(update).delete(delete_handler))
        .route("/:resource/:id/history", get(history))
        .with_state(state)
}
