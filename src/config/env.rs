//! Environment variable loading.
//!
//! Variable names follow the `AZURE_*` convention of the deployment templates so
//! an existing `.env` from the provisioning scripts works unchanged.

use std::path::PathBuf;

use super::utils::{env_bool, env_parse, env_var};
use super::{ServerConfig, TlsConfig};

/// Build a configuration from defaults overlaid with environment variables
pub(crate) fn load_from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();

    // Server
    if let Some(host) = env_var("HOST") {
        config.host = host;
    }
    if let Some(port) = env_parse::<u16>("PORT")? {
        config.port = port;
    }
    config.tls = match (env_var("TLS_CERT_PATH"), env_var("TLS_KEY_PATH")) {
        (Some(cert), Some(key)) => Some(TlsConfig {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
        }),
        (None, None) => None,
        _ => return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".into()),
    };

    // Realtime upstream
    let realtime = &mut config.realtime;
    realtime.endpoint = env_var("AZURE_OPENAI_ENDPOINT");
    realtime.deployment = env_var("AZURE_OPENAI_REALTIME_DEPLOYMENT");
    realtime.api_key = env_var("AZURE_OPENAI_API_KEY");
    if let Some(version) = env_var("AZURE_OPENAI_REALTIME_API_VERSION") {
        realtime.api_version = version;
    }
    if let Some(voice) = env_var("AZURE_OPENAI_REALTIME_VOICE_CHOICE") {
        realtime.voice = Some(voice);
    }
    if let Some(language) = env_var("AZURE_OPENAI_REALTIME_TRANSCRIPTION_LANGUAGE") {
        realtime.transcription_language = Some(language);
    }
    if let Some(model) = env_var("AZURE_OPENAI_REALTIME_TRANSCRIPTION_MODEL") {
        realtime.transcription_model = model;
    }
    realtime.model = env_var("REALTIME_MODEL");
    realtime.system_message = env_var("REALTIME_SYSTEM_MESSAGE");
    realtime.temperature = env_parse::<f64>("REALTIME_TEMPERATURE")?;
    realtime.max_tokens = env_parse::<i64>("REALTIME_MAX_TOKENS")?;
    realtime.disable_audio = env_bool("REALTIME_DISABLE_AUDIO")?;

    // Knowledge base
    let search = &mut config.search;
    search.endpoint = env_var("AZURE_SEARCH_ENDPOINT");
    search.index = env_var("AZURE_SEARCH_INDEX");
    search.api_key = env_var("AZURE_SEARCH_API_KEY");
    if let Some(version) = env_var("AZURE_SEARCH_API_VERSION") {
        search.api_version = version;
    }
    if let Some(value) = env_var("AZURE_SEARCH_SEMANTIC_CONFIGURATION") {
        search.semantic_configuration = value;
    }
    if let Some(value) = env_var("AZURE_SEARCH_IDENTIFIER_FIELD") {
        search.identifier_field = value;
    }
    if let Some(value) = env_var("AZURE_SEARCH_CONTENT_FIELD") {
        search.content_field = value;
    }
    if let Some(value) = env_var("AZURE_SEARCH_EMBEDDING_FIELD") {
        search.embedding_field = value;
    }
    if let Some(value) = env_var("AZURE_SEARCH_TITLE_FIELD") {
        search.title_field = value;
    }
    if let Some(flag) = env_bool("AZURE_SEARCH_USE_VECTOR_QUERY")? {
        search.use_vector_query = flag;
    }

    // Embeddings
    config.embedding.endpoint = env_var("AZURE_OPENAI_EMBEDDING_ENDPOINT");
    config.embedding.deployment = env_var("AZURE_OPENAI_EMBEDDING_DEPLOYMENT");
    config.embedding.api_key = env_var("AZURE_OPENAI_EMBEDDING_API_KEY");

    // Identity
    config.identity.tenant_id = env_var("AZURE_TENANT_ID");
    config.identity.client_id = env_var("AZURE_CLIENT_ID");
    config.identity.client_secret = env_var("AZURE_CLIENT_SECRET");

    // Data API
    config.data_api_endpoint = env_var("AZURE_API_ENDPOINT");
    if let Some(timeout) = env_parse::<u64>("AZURE_API_TIMEOUT_SECONDS")? {
        config.data_api_timeout_seconds = timeout;
    }

    // Logging
    config.conversation_log_dir = env_var("CONVERSATION_LOG_DIR").map(PathBuf::from);
    if let Some(limit) = env_parse::<usize>("TELEMETRY_UI_LIMIT")? {
        config.telemetry_ui_limit = limit;
    }

    // Security
    config.cors_allowed_origins = env_var("CORS_ALLOWED_ORIGINS");
    if let Some(rps) = env_parse::<u32>("RATE_LIMIT_REQUESTS_PER_SECOND")? {
        config.rate_limit_requests_per_second = rps;
    }
    if let Some(burst) = env_parse::<u32>("RATE_LIMIT_BURST_SIZE")? {
        config.rate_limit_burst_size = burst;
    }
    config.max_websocket_connections = env_parse::<usize>("MAX_WEBSOCKET_CONNECTIONS")?;
    if let Some(per_ip) = env_parse::<u32>("MAX_CONNECTIONS_PER_IP")? {
        config.max_connections_per_ip = per_ip;
    }

    Ok(config)
}
