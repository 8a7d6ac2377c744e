//! Realtime event types the relay inspects or emits.
//!
//! Only the events whose handling differs from plain forwarding are modelled.
//! Everything else deserializes to the `Other` variant and is forwarded
//! byte-for-byte, so new upstream event types pass through untouched.
//! Function-call events are recognised by their `type` (and item type) before
//! the payload is decoded, so a payload that fails to decode still never
//! reaches the client.
//!
//! Server events handled by the relay:
//! - session.created - rewritten to hide the server prompt and tools
//! - response.output_item.added - suppressed for function calls
//! - conversation.item.created - suppressed for function calls and their outputs
//! - response.function_call_arguments.delta / .done - suppressed
//! - response.output_item.done - triggers tool dispatch for function calls
//! - response.done - closes the turn and strips function calls from the output
//! - response.audio_transcript.delta / response.text.delta - buffered for logging
//! - conversation.item.input_audio_transcription.delta / .completed - user transcript
//!
//! Client events handled by the relay:
//! - session.update - server overrides and the tool list are written over it

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Server Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    FunctionCall,
    FunctionCallOutput,
    #[serde(other)]
    Other,
}

/// Conversation item carried by item events
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// JSON-encoded function arguments
    #[serde(default)]
    pub arguments: Option<String>,
}

impl ConversationItem {
    pub fn is_function_call(&self) -> bool {
        self.kind == ItemKind::FunctionCall
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.created")]
    SessionCreated,

    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        #[serde(default)]
        item: Option<ConversationItem>,
    },

    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        #[serde(default)]
        previous_item_id: Option<String>,
        #[serde(default)]
        item: Option<ConversationItem>,
    },

    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta,

    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone,

    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        #[serde(default)]
        item: Option<ConversationItem>,
    },

    #[serde(rename = "response.done")]
    ResponseDone,

    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    InputTranscriptionDelta {
        #[serde(default)]
        delta: String,
    },

    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted {
        #[serde(default)]
        transcript: String,
    },

    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        #[serde(default)]
        delta: String,
    },

    #[serde(rename = "response.text.delta")]
    TextDelta {
        #[serde(default)]
        delta: String,
    },

    /// A function-call event whose payload did not decode
    #[serde(skip)]
    MalformedFunctionCall { event_type: String, reason: String },

    #[serde(other)]
    Other,
}

pub const OUTPUT_ITEM_ADDED: &str = "response.output_item.added";
pub const OUTPUT_ITEM_DONE: &str = "response.output_item.done";
pub const ITEM_CREATED: &str = "conversation.item.created";
pub const ARGUMENTS_DELTA: &str = "response.function_call_arguments.delta";
pub const ARGUMENTS_DONE: &str = "response.function_call_arguments.done";

fn item_type(message: &Value) -> Option<&str> {
    message.pointer("/item/type").and_then(Value::as_str)
}

/// Whether an event belongs to the function-call lifecycle, judged on the
/// event and item `type` strings only
pub fn is_function_call_event(event_type: &str, message: &Value) -> bool {
    match event_type {
        ARGUMENTS_DELTA | ARGUMENTS_DONE => true,
        OUTPUT_ITEM_ADDED | OUTPUT_ITEM_DONE => item_type(message) == Some("function_call"),
        ITEM_CREATED => matches!(
            item_type(message),
            Some("function_call" | "function_call_output")
        ),
        _ => false,
    }
}

impl ServerEvent {
    /// Classify a parsed message
    ///
    /// Unrecognised or malformed events are `Other`, except function-call
    /// events, which become `MalformedFunctionCall` when they do not decode.
    pub fn classify(message: &Value) -> Self {
        let Some(event_type) = message.get("type").and_then(Value::as_str) else {
            return ServerEvent::Other;
        };
        let function_call = is_function_call_event(event_type, message);

        match Self::deserialize(message) {
            Ok(event) => event,
            Err(e) if function_call => ServerEvent::MalformedFunctionCall {
                event_type: event_type.to_string(),
                reason: e.to_string(),
            },
            Err(_) => ServerEvent::Other,
        }
    }
}

// =============================================================================
// Client Events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate,

    #[serde(other)]
    Other,
}

impl ClientEvent {
    pub fn classify(message: &Value) -> Self {
        Self::deserialize(message).unwrap_or(ClientEvent::Other)
    }
}

// =============================================================================
// Messages emitted by the relay
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCallOutput {
    #[serde(rename = "type")]
    kind: &'static str,
    pub call_id: String,
    pub output: String,
}

/// Commands the relay sends upstream on its own behalf
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum RelayCommand {
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: FunctionCallOutput },

    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl RelayCommand {
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        RelayCommand::ConversationItemCreate {
            item: FunctionCallOutput {
                kind: "function_call_output",
                call_id: call_id.into(),
                output: output.into(),
            },
        }
    }
}

/// Out-of-band tool result delivered to the client UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "extension.middle_tier_tool_response")]
pub struct ToolResponseExtension {
    pub previous_item_id: Option<String>,
    pub tool_name: String,
    pub tool_result: String,
}
