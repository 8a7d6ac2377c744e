pub mod api;
pub mod realtime;

use axum::{Router, middleware};
use std::sync::Arc;

use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

/// Application routes with state applied
///
/// The realtime route sits behind the connection limit middleware. Global
/// layers (CORS, rate limiting, security headers) are added by the binary.
pub fn create_app_router(state: Arc<AppState>) -> Router {
    // route_layer keeps the limiter off the merged fallback
    let realtime_routes = realtime::create_realtime_router().route_layer(
        middleware::from_fn_with_state(state.clone(), connection_limit_middleware),
    );

    api::create_api_router()
        .merge(realtime_routes)
        .with_state(state)
}
