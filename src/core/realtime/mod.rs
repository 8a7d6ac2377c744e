//! Realtime middle tier.
//!
//! A client socket is paired with an upstream realtime socket. The relay sits
//! between them and:
//!
//! - writes server-side instructions, limits and the tool list over the
//!   client's `session.update`
//! - hides that configuration from the `session.created` echo
//! - executes function calls itself and hides them from the client
//! - delivers client-directed tool results as an extension event
//! - records the conversation
//!
//! All other traffic, audio included, is forwarded untouched.

mod error;
mod messages;
mod relay;
mod upstream;

pub use error::{RealtimeError, RealtimeResult};
pub use messages::{
    ClientEvent, ConversationItem, FunctionCallOutput, ItemKind, RelayCommand, ServerEvent,
    ToolResponseExtension,
};
pub use relay::{PendingToolCall, RealtimeRelay, RelayFrame, RelaySink, SessionOverrides};
pub use upstream::{CLIENT_REQUEST_ID_HEADER, UpstreamSocket, UpstreamTarget, realtime_url};
