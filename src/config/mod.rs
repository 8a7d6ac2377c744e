//! Configuration module for the VoiceRAG gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use voicerag_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

use crate::core::realtime::SessionOverrides;

/// Default Realtime API version used when `AZURE_OPENAI_REALTIME_API_VERSION` is not set
pub const DEFAULT_REALTIME_API_VERSION: &str = "2025-04-01-preview";
/// Default search REST API version
pub const DEFAULT_SEARCH_API_VERSION: &str = "2024-07-01";
/// Default embeddings REST API version
pub const DEFAULT_EMBEDDING_API_VERSION: &str = "2024-06-01";

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Upstream realtime model settings and the server-enforced session overrides
#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    /// Base endpoint of the speech/LLM gateway (e.g. `https://my-aoai.openai.azure.com`)
    pub endpoint: Option<String>,
    /// Realtime deployment name, sent as the `deployment` query parameter
    pub deployment: Option<String>,
    /// Static API key; when `None` a bearer token is acquired per connection
    pub api_key: Option<String>,
    pub api_version: String,
    pub model: Option<String>,
    pub system_message: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
    pub disable_audio: Option<bool>,
    pub voice: Option<String>,
    /// Language hint for input transcription, `"auto"` lets the upstream detect it
    pub transcription_language: Option<String>,
    pub transcription_model: String,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            deployment: None,
            api_key: None,
            api_version: DEFAULT_REALTIME_API_VERSION.to_string(),
            model: None,
            system_message: None,
            temperature: None,
            max_tokens: None,
            disable_audio: None,
            voice: Some("alloy".to_string()),
            transcription_language: Some("auto".to_string()),
            transcription_model: "whisper-1".to_string(),
        }
    }
}

/// Knowledge base index settings
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub endpoint: Option<String>,
    pub index: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
    pub semantic_configuration: String,
    pub identifier_field: String,
    pub content_field: String,
    pub embedding_field: String,
    pub title_field: String,
    pub use_vector_query: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            index: None,
            api_key: None,
            api_version: DEFAULT_SEARCH_API_VERSION.to_string(),
            semantic_configuration: "default".to_string(),
            identifier_field: "chunk_id".to_string(),
            content_field: "chunk".to_string(),
            embedding_field: "text_vector".to_string(),
            title_field: "title".to_string(),
            use_vector_query: true,
        }
    }
}

/// Query embedding model settings
///
/// Endpoint and key fall back to the realtime ones when unset.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            deployment: None,
            api_key: None,
            api_version: DEFAULT_EMBEDDING_API_VERSION.to_string(),
        }
    }
}

/// Service principal used for bearer tokens when keys are not configured
#[derive(Debug, Clone, Default)]
pub struct IdentitySettings {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl IdentitySettings {
    /// Returns true when all three client-credential fields are present
    pub fn is_complete(&self) -> bool {
        self.tenant_id.is_some() && self.client_id.is_some() && self.client_secret.is_some()
    }
}

/// Server configuration
///
/// Contains all configuration needed to run the gateway:
/// - Server settings (host, port, TLS)
/// - Upstream realtime model and session overrides
/// - Knowledge base search and embeddings
/// - External data API used by the lookup tools
/// - Logging sinks (conversation logs, telemetry window)
/// - Security settings (CORS, rate limiting, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    pub realtime: RealtimeSettings,
    pub search: SearchSettings,
    pub embedding: EmbeddingSettings,
    pub identity: IdentitySettings,

    /// Base URL of the insurance data REST API (`AZURE_API_ENDPOINT`)
    pub data_api_endpoint: Option<String>,
    pub data_api_timeout_seconds: u64,

    /// Directory for per-session conversation JSON logs; disabled when `None`
    pub conversation_log_dir: Option<PathBuf>,
    /// Number of recent telemetry entries returned by `/api/telemetry`
    pub telemetry_ui_limit: usize,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,

    // Rate limiting configuration
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,

    // Connection limits
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            tls: None,
            realtime: RealtimeSettings::default(),
            search: SearchSettings::default(),
            embedding: EmbeddingSettings::default(),
            identity: IdentitySettings::default(),
            data_api_endpoint: None,
            data_api_timeout_seconds: 30,
            conversation_log_dir: None,
            telemetry_ui_limit: 50,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: None,
            max_connections_per_ip: 100,
        }
    }
}

/// Implement Drop to zeroize all secret fields when ServerConfig is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.realtime.api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.search.api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.embedding.api_key {
            key.zeroize();
        }
        if let Some(ref mut secret) = self.identity.client_secret {
            secret.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only
    ///
    /// Unset variables fall back to defaults. The result is validated.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded in main.rs at application startup
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;

        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Server-enforced values the relay writes over client session configuration
    pub fn session_overrides(&self) -> SessionOverrides {
        SessionOverrides {
            model: self.realtime.model.clone(),
            system_message: self.realtime.system_message.clone(),
            temperature: self.realtime.temperature,
            max_tokens: self.realtime.max_tokens,
            disable_audio: self.realtime.disable_audio,
            voice: self.realtime.voice.clone(),
            transcription_language: self.realtime.transcription_language.clone(),
            transcription_model: self.realtime.transcription_model.clone(),
        }
    }

    /// Embeddings endpoint, falling back to the realtime endpoint
    pub fn embedding_endpoint(&self) -> Option<&str> {
        self.embedding
            .endpoint
            .as_deref()
            .or(self.realtime.endpoint.as_deref())
    }

    /// Embeddings API key, falling back to the realtime key
    pub fn embedding_api_key(&self) -> Option<&str> {
        self.embedding
            .api_key
            .as_deref()
            .or(self.realtime.api_key.as_deref())
    }
}
