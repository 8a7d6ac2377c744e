//! Realtime WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::realtime::realtime_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the Realtime WebSocket router
///
/// # Endpoint
///
/// `GET /realtime` - WebSocket upgrade into the relay
///
/// # Protocol
///
/// Frames are the upstream realtime events. Server-side tools are executed
/// by the relay; client-directed results arrive as
/// `extension.middle_tier_tool_response` events.
///
/// # Example
///
/// ```json
/// // Client configures the session; instructions and tools are replaced server-side
/// {"type": "session.update", "session": {"turn_detection": {"type": "server_vad"}}}
///
/// // Grounding result delivered to the UI
/// {"type": "extension.middle_tier_tool_response", "previous_item_id": "item_1",
///  "tool_name": "report_grounding", "tool_result": "{...}"}
/// ```
pub fn create_realtime_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/realtime", get(realtime_handler))
        .layer(TraceLayer::new_for_http())
}
