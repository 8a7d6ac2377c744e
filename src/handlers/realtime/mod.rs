//! Realtime relay WebSocket handler
//!
//! # Protocol
//!
//! The client speaks the upstream realtime protocol directly: JSON text
//! frames in both directions. The relay adds one server event:
//!
//! - **extension.middle_tier_tool_response**: result of a client-directed
//!   tool (`previous_item_id`, `tool_name`, `tool_result`)
//!
//! Function-call events never reach the client.

mod handler;

pub use handler::realtime_handler;
