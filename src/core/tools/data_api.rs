//! Lookup tools backed by the external insurance data REST API.
//!
//! Each tool issues `GET {endpoint}/api/<path>` with its non-empty string
//! arguments as query parameters and wraps the JSON body under a result key.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{error, info};

use super::{Tool, ToolError, ToolResult, ToolTarget, schemas, string_arg};
use crate::core::telemetry::TelemetryRecorder;

/// Message returned to the model when no API endpoint is configured
pub const API_NOT_CONFIGURED: &str =
    "Insurance API is not available. AZURE_API_ENDPOINT environment variable is not configured.";

/// Key under which customer call histories are surfaced to the UI
pub const CALL_HISTORY_METADATA_KEY: &str = "__CALL_HISTORY_METADATA__";

/// Static description of one lookup tool
#[derive(Debug)]
pub struct Lookup {
    pub tool: &'static str,
    /// Path below `/api/`
    pub path: &'static str,
    /// Arguments forwarded as query parameters, in order
    pub params: &'static [&'static str],
    /// Key wrapping the response body
    pub result_key: &'static str,
    /// Key of the empty placeholder sent when the API is not configured
    pub empty_key: &'static str,
    /// `true` when the empty placeholder is an object rather than an array
    pub empty_is_object: bool,
    /// Collection inside the body whose items may carry `call_history`
    pub call_history_collection: Option<&'static str>,
}

pub static POLICIES: Lookup = Lookup {
    tool: schemas::GET_POLICIES,
    path: "policies",
    params: &["policy_number", "name", "first_name", "last_name", "policy_type"],
    result_key: "policies",
    empty_key: "policies",
    empty_is_object: false,
    call_history_collection: Some("policies"),
};

pub static CLAIMS: Lookup = Lookup {
    tool: schemas::GET_CLAIMS,
    path: "claims",
    params: &[
        "claim_number",
        "policy_number",
        "holder_name",
        "first_name",
        "last_name",
        "claim_type",
    ],
    result_key: "claims",
    empty_key: "claims",
    empty_is_object: false,
    call_history_collection: Some("claims"),
};

pub static REAL_POLICIES: Lookup = Lookup {
    tool: schemas::GET_REAL_POLICIES,
    path: "realtime/policies",
    params: &["policy_type", "status", "holder_name", "first_name", "last_name"],
    result_key: "real_policies",
    empty_key: "policies",
    empty_is_object: false,
    call_history_collection: None,
};

pub static AGENCIES: Lookup = Lookup {
    tool: schemas::GET_AGENCIES,
    path: "agencies",
    params: &["city", "agent_name"],
    result_key: "agencies",
    empty_key: "agencies",
    empty_is_object: false,
    call_history_collection: None,
};

pub static CONTACT_INFO: Lookup = Lookup {
    tool: schemas::GET_CONTACT_INFO,
    path: "contact",
    params: &["service_type", "company"],
    result_key: "contact_info",
    empty_key: "contact_info",
    empty_is_object: true,
    call_history_collection: None,
};

/// Shared HTTP client for the data API
#[derive(Debug, Clone)]
pub struct DataApiClient {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl DataApiClient {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    /// GET `/api/<path>` and parse the JSON body
    pub async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ToolError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| ToolError::Execution(API_NOT_CONFIGURED.to_string()))?;
        let url = format!("{base}/api/{path}");

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|source| ToolError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ToolError::InvalidResponse {
                url,
                message: e.to_string(),
            })
    }
}

/// One REST-backed lookup tool
pub struct DataLookupTool {
    lookup: &'static Lookup,
    client: Arc<DataApiClient>,
    telemetry: Arc<TelemetryRecorder>,
}

impl DataLookupTool {
    pub fn new(
        lookup: &'static Lookup,
        client: Arc<DataApiClient>,
        telemetry: Arc<TelemetryRecorder>,
    ) -> Self {
        Self {
            lookup,
            client,
            telemetry,
        }
    }

    fn not_configured(&self) -> ToolResult {
        let empty = if self.lookup.empty_is_object {
            json!({})
        } else {
            json!([])
        };
        let mut body = Map::new();
        body.insert("error".to_string(), json!(API_NOT_CONFIGURED));
        body.insert(self.lookup.empty_key.to_string(), empty);
        ToolResult::to_server(Value::Object(body))
    }
}

#[async_trait]
impl ToolTarget for DataLookupTool {
    async fn invoke(&self, args: Value) -> Result<ToolResult, ToolError> {
        let lookup = self.lookup;
        if !self.client.is_configured() {
            error!(tool = lookup.tool, "{API_NOT_CONFIGURED}");
            return Ok(self.not_configured());
        }

        let query: Vec<(&str, &str)> = lookup
            .params
            .iter()
            .filter_map(|&param| string_arg(&args, param).map(|value| (param, value)))
            .collect();
        info!(tool = lookup.tool, filters = ?query, "Retrieving {}", lookup.result_key);

        let started = Instant::now();
        let outcome = self.client.get_json(lookup.path, &query).await;
        match &outcome {
            Ok(body) => self.telemetry.record_tool_call(
                lookup.tool,
                &args,
                started.elapsed(),
                body.to_string().len(),
                None,
            ),
            Err(e) => self.telemetry.record_tool_call(
                lookup.tool,
                &args,
                started.elapsed(),
                0,
                Some(e.to_string()),
            ),
        }
        let body = outcome?;

        let call_history = lookup
            .call_history_collection
            .and_then(|key| body.get(key))
            .and_then(Value::as_array)
            .map(|items| extract_call_history(items))
            .unwrap_or_default();

        let mut result = Map::new();
        result.insert(lookup.result_key.to_string(), body);
        if !call_history.is_empty() {
            result.insert(
                CALL_HISTORY_METADATA_KEY.to_string(),
                Value::Array(call_history),
            );
        }
        Ok(ToolResult::to_server(Value::Object(result)))
    }
}

/// Collect customer call histories for the UI popup
///
/// Items without a non-empty `call_history` are skipped.
pub fn extract_call_history(items: &[Value]) -> Vec<Value> {
    let first_str = |item: &Value, keys: &[&str]| -> Value {
        keys.iter()
            .find_map(|k| item.get(*k).filter(|v| !v.is_null()).cloned())
            .unwrap_or_else(|| json!(""))
    };

    items
        .iter()
        .filter(|item| match item.get("call_history") {
            Some(Value::Array(calls)) => !calls.is_empty(),
            Some(Value::Object(calls)) => !calls.is_empty(),
            Some(Value::String(calls)) => !calls.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        })
        .map(|item| {
            json!({
                "customer": {
                    "name": first_str(item, &["holder", "name"]),
                    "first_name": first_str(item, &["holder_first_name", "first_name"]),
                    "last_name": first_str(item, &["holder_last_name", "last_name"]),
                    "policy_number": first_str(item, &["policy_number", "policy"]),
                    "customer_id": first_str(item, &["id"]),
                },
                "call_history": item["call_history"].clone(),
            })
        })
        .collect()
}

/// All five lookup tools sharing one client
pub fn lookup_tools(client: Arc<DataApiClient>, telemetry: Arc<TelemetryRecorder>) -> Vec<Tool> {
    [
        (&POLICIES, schemas::policies()),
        (&CLAIMS, schemas::claims()),
        (&REAL_POLICIES, schemas::real_policies()),
        (&AGENCIES, schemas::agencies()),
        (&CONTACT_INFO, schemas::contact_info()),
    ]
    .into_iter()
    .map(|(lookup, schema)| {
        Tool::new(
            schema,
            Arc::new(DataLookupTool::new(lookup, client.clone(), telemetry.clone())),
        )
    })
    .collect()
}
