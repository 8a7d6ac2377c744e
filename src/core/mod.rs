pub mod conversation_log;
pub mod credentials;
pub mod realtime;
pub mod search;
pub mod telemetry;
pub mod tools;

// Re-export commonly used types for convenience
pub use conversation_log::{ConversationLogger, LoggedMessage};
pub use credentials::{AuthHeader, Credential, CredentialError, TokenProvider};
pub use realtime::{
    RealtimeError, RealtimeRelay, RealtimeResult, RelayFrame, RelaySink, SessionOverrides,
    UpstreamTarget,
};
pub use search::{GroundingLookup, SearchOutcome, SearchPipeline};
pub use telemetry::TelemetryRecorder;
pub use tools::{Tool, ToolError, ToolResult, ToolResultDirection, ToolTable, ToolTarget};
