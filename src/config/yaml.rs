use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration; anything left out keeps
/// the value from the environment (or the default).
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8000
///
/// realtime:
///   endpoint: "https://my-aoai.openai.azure.com"
///   deployment: "gpt-4o-realtime-preview"
///   voice: "alloy"
///   transcription_language: "fr"
///   temperature: 0.6
///   system_message: "You are a helpful insurance advisor."
///
/// search:
///   endpoint: "https://my-search.search.windows.net"
///   index: "knowledge-base"
///   semantic_configuration: "default"
///   identifier_field: "chunk_id"
///   use_vector_query: true
///
/// embedding:
///   deployment: "text-embedding-3-large"
///
/// data_api:
///   endpoint: "http://localhost:8001"
///
/// logging:
///   conversation_log_dir: "/var/log/voicerag/conversations"
///   telemetry_ui_limit: 50
///
/// security:
///   cors_allowed_origins: "*"
///   max_connections_per_ip: 10
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub search: Option<SearchYaml>,
    pub embedding: Option<EmbeddingYaml>,
    pub identity: Option<IdentityYaml>,
    pub data_api: Option<DataApiYaml>,
    pub logging: Option<LoggingYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Realtime upstream and session overrides from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub model: Option<String>,
    pub system_message: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
    pub disable_audio: Option<bool>,
    pub voice: Option<String>,
    pub transcription_language: Option<String>,
    pub transcription_model: Option<String>,
}

/// Knowledge base index from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SearchYaml {
    pub endpoint: Option<String>,
    pub index: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    pub semantic_configuration: Option<String>,
    pub identifier_field: Option<String>,
    pub content_field: Option<String>,
    pub embedding_field: Option<String>,
    pub title_field: Option<String>,
    pub use_vector_query: Option<bool>,
}

/// Embedding model from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EmbeddingYaml {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
}

/// Service principal from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct IdentityYaml {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// External data API from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DataApiYaml {
    pub endpoint: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Logging sinks from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingYaml {
    pub conversation_log_dir: Option<String>,
    pub telemetry_ui_limit: Option<usize>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
    /// Maximum concurrent WebSocket connections
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig =
            serde_yaml::from_str(&contents).map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
