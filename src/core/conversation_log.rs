//! Per-session conversation transcripts.
//!
//! Every relay session keeps an in-memory record of user transcripts, assistant
//! responses and tool calls. When a log directory is configured the record is
//! written to `<dir>/<session_id>.json` after each completed turn and when the
//! session ends. Write failures are logged and otherwise ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(100) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum LoggedMessage {
    User {
        content: String,
        timestamp: String,
    },
    Assistant {
        content: String,
        timestamp: String,
    },
    Tool {
        name: String,
        args: Value,
        response: String,
        duration_ms: f64,
        timestamp: String,
    },
}

#[derive(Debug, Clone, Serialize)]
struct ConversationRecord {
    session_id: String,
    started_at: String,
    ended_at: Option<String>,
    messages: Vec<LoggedMessage>,
}

/// Transcript sink for one relay session
#[derive(Debug)]
pub struct ConversationLogger {
    path: Option<PathBuf>,
    record: Mutex<ConversationRecord>,
}

impl ConversationLogger {
    pub fn new(dir: Option<&Path>, session_id: &str) -> Self {
        info!(session_id, "Started conversation session");
        Self {
            path: dir.map(|d| d.join(format!("{session_id}.json"))),
            record: Mutex::new(ConversationRecord {
                session_id: session_id.to_string(),
                started_at: now_rfc3339(),
                ended_at: None,
                messages: Vec::new(),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn log_user(&self, transcript: &str) {
        info!(transcript = preview(transcript), "User message");
        self.push(LoggedMessage::User {
            content: transcript.to_string(),
            timestamp: now_rfc3339(),
        });
    }

    pub fn log_assistant(&self, response: &str) {
        info!(response = preview(response), "Assistant message");
        self.push(LoggedMessage::Assistant {
            content: response.to_string(),
            timestamp: now_rfc3339(),
        });
    }

    pub fn log_tool(&self, name: &str, args: &Value, response: &str, duration: Duration) {
        debug!(tool = name, "Tool call logged");
        self.push(LoggedMessage::Tool {
            name: name.to_string(),
            args: args.clone(),
            response: response.to_string(),
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: now_rfc3339(),
        });
    }

    pub fn messages(&self) -> Vec<LoggedMessage> {
        self.record.lock().messages.clone()
    }

    fn push(&self, message: LoggedMessage) {
        self.record.lock().messages.push(message);
    }

    /// Write the current record to disk, if a directory is configured
    pub async fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let snapshot = self.record.lock().clone();
        let body = match serde_json::to_vec_pretty(&snapshot) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to serialize conversation log");
                return;
            }
        };

        if let Some(dir) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                warn!(dir = %dir.display(), error = %e, "Failed to create conversation log directory");
                return;
            }
        }
        if let Err(e) = tokio::fs::write(path, body).await {
            warn!(path = %path.display(), error = %e, "Failed to write conversation log");
        }
    }

    /// Stamp the end time and write the final record
    pub async fn finish(&self) {
        self.record.lock().ended_at = Some(now_rfc3339());
        self.persist().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_session_file_contains_all_roles() {
        let dir = TempDir::new().unwrap();
        let logger = ConversationLogger::new(Some(dir.path()), "sess-1");

        logger.log_user("Bonjour");
        logger.log_tool(
            "get_contact_info",
            &json!({}),
            r#"{"contact_info":{}}"#,
            Duration::from_millis(12),
        );
        logger.log_assistant("Voici le numéro.");
        logger.finish().await;

        let path = dir.path().join("sess-1.json");
        let record: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(record["session_id"], "sess-1");
        assert!(record["ended_at"].is_string());

        let roles: Vec<&str> = record["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "tool", "assistant"]);
        assert_eq!(record["messages"][1]["name"], "get_contact_info");
    }

    #[tokio::test]
    async fn test_without_directory_nothing_is_written() {
        let logger = ConversationLogger::new(None, "sess-2");
        logger.log_user("hello");
        logger.finish().await;

        assert!(logger.path().is_none());
        assert_eq!(logger.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        // A regular file where the directory should be
        let logger = ConversationLogger::new(Some(&blocker.join("logs")), "sess-3");
        logger.log_user("hello");
        logger.finish().await;
    }
}
