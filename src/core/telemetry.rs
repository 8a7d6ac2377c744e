//! In-process telemetry for tool and model calls.
//!
//! Every tool invocation and embedding call is emitted as a `tracing` event and
//! kept in a bounded history. `GET /api/telemetry` serves the most recent entries
//! plus aggregate statistics for the demo UI.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

/// Entries kept per kind; statistics cover every call ever recorded
const HISTORY_CAPACITY: usize = 1000;

/// Bounds applied to the requested UI window
const MIN_UI_LIMIT: usize = 10;
const MAX_UI_LIMIT: usize = 200;

/// Current time as fractional unix seconds
pub fn unix_timestamp() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1_000_000_000.0
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub args: Value,
    pub duration_ms: f64,
    pub result_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelCallRecord {
    pub model: String,
    pub operation: String,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TelemetryStats {
    pub total_tool_calls: u64,
    pub total_model_calls: u64,
    pub avg_tool_duration_ms: f64,
    pub avg_model_latency_ms: f64,
}

/// Body of `GET /api/telemetry`
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub tool_calls: Vec<ToolCallRecord>,
    pub model_calls: Vec<ModelCallRecord>,
    pub stats: TelemetryStats,
}

#[derive(Debug, Default)]
struct TelemetryInner {
    tool_calls: VecDeque<ToolCallRecord>,
    model_calls: VecDeque<ModelCallRecord>,
    total_tool_calls: u64,
    total_model_calls: u64,
    tool_duration_sum_ms: f64,
    model_latency_sum_ms: f64,
}

/// Process-wide recorder shared through `AppState`
#[derive(Debug, Default)]
pub struct TelemetryRecorder {
    inner: Mutex<TelemetryInner>,
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tool_call(
        &self,
        tool_name: &str,
        args: &Value,
        duration: Duration,
        result_size: usize,
        error: Option<String>,
    ) {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        tracing::info!(
            tool = tool_name,
            duration_ms,
            result_size,
            failed = error.is_some(),
            "tool call"
        );

        let record = ToolCallRecord {
            tool_name: tool_name.to_string(),
            args: args.clone(),
            duration_ms,
            result_size,
            error,
            timestamp: unix_timestamp(),
        };

        let mut inner = self.inner.lock();
        inner.total_tool_calls += 1;
        inner.tool_duration_sum_ms += duration_ms;
        if inner.tool_calls.len() == HISTORY_CAPACITY {
            inner.tool_calls.pop_front();
        }
        inner.tool_calls.push_back(record);
    }

    pub fn record_model_call(
        &self,
        model: &str,
        operation: &str,
        latency: Duration,
        tokens_used: Option<u64>,
    ) {
        let latency_ms = latency.as_secs_f64() * 1000.0;
        tracing::info!(model, operation, latency_ms, ?tokens_used, "model call");

        let record = ModelCallRecord {
            model: model.to_string(),
            operation: operation.to_string(),
            latency_ms,
            tokens_used,
            timestamp: unix_timestamp(),
        };

        let mut inner = self.inner.lock();
        inner.total_model_calls += 1;
        inner.model_latency_sum_ms += latency_ms;
        if inner.model_calls.len() == HISTORY_CAPACITY {
            inner.model_calls.pop_front();
        }
        inner.model_calls.push_back(record);
    }

    /// Most recent `limit` entries of each kind (clamped to 10..=200) plus totals
    pub fn snapshot(&self, limit: usize) -> TelemetrySnapshot {
        let limit = limit.clamp(MIN_UI_LIMIT, MAX_UI_LIMIT);
        let inner = self.inner.lock();

        let tail = |len: usize| len.saturating_sub(limit);
        let tool_calls = inner
            .tool_calls
            .iter()
            .skip(tail(inner.tool_calls.len()))
            .cloned()
            .collect();
        let model_calls = inner
            .model_calls
            .iter()
            .skip(tail(inner.model_calls.len()))
            .cloned()
            .collect();

        let average = |sum: f64, count: u64| if count == 0 { 0.0 } else { sum / count as f64 };

        TelemetrySnapshot {
            tool_calls,
            model_calls,
            stats: TelemetryStats {
                total_tool_calls: inner.total_tool_calls,
                total_model_calls: inner.total_model_calls,
                avg_tool_duration_ms: average(inner.tool_duration_sum_ms, inner.total_tool_calls),
                avg_model_latency_ms: average(inner.model_latency_sum_ms, inner.total_model_calls),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_snapshot() {
        let recorder = TelemetryRecorder::new();
        let snapshot = recorder.snapshot(50);

        assert!(snapshot.tool_calls.is_empty());
        assert_eq!(snapshot.stats.total_tool_calls, 0);
        assert_eq!(snapshot.stats.avg_tool_duration_ms, 0.0);
    }

    #[test]
    fn test_snapshot_returns_most_recent_within_clamped_limit() {
        let recorder = TelemetryRecorder::new();
        for i in 0..15 {
            recorder.record_tool_call(
                &format!("tool_{i}"),
                &json!({}),
                Duration::from_millis(10),
                i,
                None,
            );
        }

        // Limits below 10 are raised to 10
        let snapshot = recorder.snapshot(3);
        assert_eq!(snapshot.tool_calls.len(), 10);
        assert_eq!(snapshot.tool_calls[0].tool_name, "tool_5");
        assert_eq!(snapshot.tool_calls[9].tool_name, "tool_14");
        assert_eq!(snapshot.stats.total_tool_calls, 15);
        assert!((snapshot.stats.avg_tool_duration_ms - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_model_calls_tracked_separately() {
        let recorder = TelemetryRecorder::new();
        recorder.record_model_call("emb", "embedding_generation", Duration::from_millis(40), Some(7));

        let snapshot = recorder.snapshot(50);
        assert_eq!(snapshot.model_calls.len(), 1);
        assert_eq!(snapshot.model_calls[0].tokens_used, Some(7));
        assert_eq!(snapshot.stats.total_tool_calls, 0);
        assert_eq!(snapshot.stats.total_model_calls, 1);
    }
}
