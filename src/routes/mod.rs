//! Router assembly.

mod common;
mod resource;

pub use common::common_routes_with_ready;
pub use resource::resource_routes;

use crate::state::AppState;
use axum::Router;

pub const API_PREFIX: &str = "/api/v1";

/// Full application router: health/readiness/version at the root, resources under `/api/v1`.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .nest(API_PREFIX, resource_routes(state))
}
