//! `search` and `report_grounding` tools over the knowledge-base index.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::{Tool, ToolError, ToolResult, ToolTarget, schemas, string_arg};
use crate::core::search::{GroundingLookup, NO_RESULTS_MESSAGE, SearchPipeline};
use crate::core::telemetry::TelemetryRecorder;

/// Runs the search pipeline; the formatted passages go back to the model
pub struct SearchTool {
    pipeline: Arc<SearchPipeline>,
    telemetry: Arc<TelemetryRecorder>,
}

impl SearchTool {
    pub fn new(pipeline: Arc<SearchPipeline>, telemetry: Arc<TelemetryRecorder>) -> Self {
        Self {
            pipeline,
            telemetry,
        }
    }

    pub fn into_tool(self) -> Tool {
        Tool::new(schemas::search(), Arc::new(self))
    }
}

#[async_trait]
impl ToolTarget for SearchTool {
    async fn invoke(&self, args: Value) -> Result<ToolResult, ToolError> {
        let Some(query) = string_arg(&args, "query") else {
            warn!("search called without a query");
            return Ok(ToolResult::to_server(NO_RESULTS_MESSAGE));
        };
        info!(query, "Searching knowledge base");

        let outcome = self.pipeline.run(query).await;
        self.telemetry.record_tool_call(
            schemas::SEARCH,
            &args,
            outcome.elapsed,
            outcome.text.len(),
            None,
        );

        Ok(ToolResult::to_server(outcome.text))
    }
}

/// Resolves cited sources; the payload is shown to the user, never narrated
pub struct GroundingTool {
    lookup: Arc<GroundingLookup>,
    telemetry: Arc<TelemetryRecorder>,
}

impl GroundingTool {
    pub fn new(lookup: Arc<GroundingLookup>, telemetry: Arc<TelemetryRecorder>) -> Self {
        Self { lookup, telemetry }
    }

    pub fn into_tool(self) -> Tool {
        Tool::new(schemas::report_grounding(), Arc::new(self))
    }
}

#[async_trait]
impl ToolTarget for GroundingTool {
    async fn invoke(&self, args: Value) -> Result<ToolResult, ToolError> {
        let started = Instant::now();
        let payload = self.lookup.report(&args).await;

        let info = &payload["grounding_info"];
        let summary = json!({
            "sources_count": info["requested_sources"].as_u64().unwrap_or(0),
            "found_count": info["total_sources"].as_u64().unwrap_or(0),
            "confidence": info["confidence_level"].clone(),
        });
        let error = (info["status"] == "error").then(|| info["summary"].to_string());
        self.telemetry.record_tool_call(
            schemas::REPORT_GROUNDING,
            &summary,
            started.elapsed(),
            payload.to_string().len(),
            error,
        );

        Ok(ToolResult::to_client(payload))
    }
}
