//! Server-side tools the model can call during a realtime session.
//!
//! A [`Tool`] pairs the JSON schema advertised to the model with an executable
//! [`ToolTarget`]. Invocations produce a [`ToolResult`] whose
//! [`ToolResultDirection`] decides where the payload goes: back into the model's
//! conversation, or out-of-band to the client UI.
//!
//! # Example
//!
//! ```rust,ignore
//! use voicerag_gateway::core::tools::{Tool, ToolTable};
//!
//! let table = ToolTable::new()
//!     .with_tool(Tool::new(schemas::contact_info(), Arc::new(ContactInfoTool::new(api))));
//!
//! let result = table.dispatch("get_contact_info", serde_json::json!({})).await?;
//! println!("{}", result.to_text());
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod data_api;
pub mod knowledge;
mod registry;
pub mod schemas;

pub use data_api::DataApiClient;
pub use knowledge::{GroundingTool, SearchTool};
pub use registry::ToolTable;

/// Where a tool's output is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolResultDirection {
    /// Placed into the upstream conversation so the model can narrate it
    ToServer,
    /// Forwarded to the client as an extension message; the model gets an empty output
    ToClient,
}

/// Output of one tool invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    payload: Value,
    direction: ToolResultDirection,
}

impl ToolResult {
    pub fn new(payload: Value, direction: ToolResultDirection) -> Self {
        Self { payload, direction }
    }

    /// Result destined for the model
    pub fn to_server(payload: impl Into<Value>) -> Self {
        Self::new(payload.into(), ToolResultDirection::ToServer)
    }

    /// Result destined for the client UI only
    pub fn to_client(payload: impl Into<Value>) -> Self {
        Self::new(payload.into(), ToolResultDirection::ToClient)
    }

    pub fn direction(&self) -> ToolResultDirection {
        self.direction
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Textual form sent over the wire
    ///
    /// Strings are passed through as-is, null becomes empty and anything else is
    /// serialized as JSON.
    pub fn to_text(&self) -> String {
        match &self.payload {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors raised while executing a tool
///
/// Any of these aborts the relay session that triggered the call.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    #[error("Tool execution failed: {0}")]
    Execution(String),
}

/// Executable side of a tool
#[async_trait]
pub trait ToolTarget: Send + Sync {
    /// Run the tool with already-parsed JSON arguments
    ///
    /// Implementations treat missing or malformed arguments as absent.
    async fn invoke(&self, args: Value) -> Result<ToolResult, ToolError>;
}

/// A schema-described, executable tool
#[derive(Clone)]
pub struct Tool {
    name: String,
    schema: Value,
    target: Arc<dyn ToolTarget>,
}

impl Tool {
    /// Build a tool; the name is taken from the schema's `name` field
    pub fn new(schema: Value, target: Arc<dyn ToolTarget>) -> Self {
        let name = schema
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            name,
            schema,
            target,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub async fn invoke(&self, args: Value) -> Result<ToolResult, ToolError> {
        self.target.invoke(args).await
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool").field("name", &self.name).finish()
    }
}

/// Read an optional, non-empty string argument
pub(crate) fn string_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
