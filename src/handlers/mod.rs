//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check and telemetry endpoints
//! - `realtime` - Realtime relay WebSocket

pub mod api;
pub mod realtime;

// Re-export commonly used handlers for convenient access
pub use realtime::realtime_handler;
