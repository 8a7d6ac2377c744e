use thiserror::Error;

use crate::core::tools::ToolError;

/// Errors that end a relay session
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the upstream service failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No credential could be resolved for the upstream handshake
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Endpoint or deployment missing or malformed
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The upstream broke the function-call protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A tool target failed; the conversation cannot be resumed safely
    #[error("Tool '{name}' failed: {source}")]
    Tool {
        name: String,
        #[source]
        source: ToolError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for relay operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;
