//! Merge the environment-derived configuration with YAML overrides.

use std::path::PathBuf;

use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig, env};

/// Overwrite `$target` when the YAML value is present
macro_rules! overlay {
    ($target:expr, some $value:expr) => {
        if let Some(v) = $value {
            $target = Some(v);
        }
    };
    ($target:expr, $value:expr) => {
        if let Some(v) = $value {
            $target = v;
        }
    };
}

/// Load environment configuration and apply YAML values on top
pub(crate) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = env::load_from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        overlay!(config.host, server.host);
        overlay!(config.port, server.port);
        if let Some(tls) = server.tls {
            if tls.enabled == Some(false) {
                config.tls = None;
            } else {
                match (tls.cert_path, tls.key_path) {
                    (Some(cert), Some(key)) => {
                        config.tls = Some(TlsConfig {
                            cert_path: PathBuf::from(cert),
                            key_path: PathBuf::from(key),
                        });
                    }
                    (None, None) => {}
                    _ => return Err("server.tls requires both cert_path and key_path".into()),
                }
            }
        }
    }

    if let Some(rt) = yaml.realtime {
        let target = &mut config.realtime;
        overlay!(target.endpoint, some rt.endpoint);
        overlay!(target.deployment, some rt.deployment);
        overlay!(target.api_key, some rt.api_key);
        overlay!(target.api_version, rt.api_version);
        overlay!(target.model, some rt.model);
        overlay!(target.system_message, some rt.system_message);
        overlay!(target.temperature, some rt.temperature);
        overlay!(target.max_tokens, some rt.max_tokens);
        overlay!(target.disable_audio, some rt.disable_audio);
        overlay!(target.voice, some rt.voice);
        overlay!(target.transcription_language, some rt.transcription_language);
        overlay!(target.transcription_model, rt.transcription_model);
    }

    if let Some(search) = yaml.search {
        let target = &mut config.search;
        overlay!(target.endpoint, some search.endpoint);
        overlay!(target.index, some search.index);
        overlay!(target.api_key, some search.api_key);
        overlay!(target.api_version, search.api_version);
        overlay!(target.semantic_configuration, search.semantic_configuration);
        overlay!(target.identifier_field, search.identifier_field);
        overlay!(target.content_field, search.content_field);
        overlay!(target.embedding_field, search.embedding_field);
        overlay!(target.title_field, search.title_field);
        overlay!(target.use_vector_query, search.use_vector_query);
    }

    if let Some(embedding) = yaml.embedding {
        let target = &mut config.embedding;
        overlay!(target.endpoint, some embedding.endpoint);
        overlay!(target.deployment, some embedding.deployment);
        overlay!(target.api_key, some embedding.api_key);
        overlay!(target.api_version, embedding.api_version);
    }

    if let Some(identity) = yaml.identity {
        let target = &mut config.identity;
        overlay!(target.tenant_id, some identity.tenant_id);
        overlay!(target.client_id, some identity.client_id);
        overlay!(target.client_secret, some identity.client_secret);
    }

    if let Some(data_api) = yaml.data_api {
        overlay!(config.data_api_endpoint, some data_api.endpoint);
        overlay!(config.data_api_timeout_seconds, data_api.timeout_seconds);
    }

    if let Some(logging) = yaml.logging {
        overlay!(
            config.conversation_log_dir,
            some logging.conversation_log_dir.map(PathBuf::from)
        );
        overlay!(config.telemetry_ui_limit, logging.telemetry_ui_limit);
    }

    if let Some(security) = yaml.security {
        overlay!(config.cors_allowed_origins, some security.cors_allowed_origins);
        overlay!(
            config.rate_limit_requests_per_second,
            security.rate_limit_requests_per_second
        );
        overlay!(config.rate_limit_burst_size, security.rate_limit_burst_size);
        overlay!(
            config.max_websocket_connections,
            some security.max_websocket_connections
        );
        overlay!(config.max_connections_per_ip, security.max_connections_per_ip);
    }

    Ok(config)
}
