//! Configuration validation logic.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::ServerConfig;

/// Index field names end up inside filter expressions, so keep them plain
static FIELD_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("field name pattern is valid"));

/// Validate a fully merged configuration
pub(crate) fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_tls(config)?;
    validate_temperature(config.realtime.temperature)?;
    validate_endpoint("realtime.endpoint", config.realtime.endpoint.as_deref())?;
    validate_endpoint("search.endpoint", config.search.endpoint.as_deref())?;
    validate_endpoint("embedding.endpoint", config.embedding.endpoint.as_deref())?;
    validate_endpoint("data_api.endpoint", config.data_api_endpoint.as_deref())?;
    validate_field_name("search.identifier_field", &config.search.identifier_field)?;
    validate_field_name("search.content_field", &config.search.content_field)?;
    validate_field_name("search.title_field", &config.search.title_field)?;
    validate_field_name("search.embedding_field", &config.search.embedding_field)?;
    Ok(())
}

fn validate_tls(config: &ServerConfig) -> Result<(), String> {
    if let Some(tls) = &config.tls {
        if tls.cert_path.as_os_str().is_empty() || tls.key_path.as_os_str().is_empty() {
            return Err("TLS requires both a certificate path and a key path".to_string());
        }
    }
    Ok(())
}

pub(crate) fn validate_temperature(temperature: Option<f64>) -> Result<(), String> {
    match temperature {
        Some(t) if !(0.0..=2.0).contains(&t) => Err(format!(
            "realtime temperature must be between 0.0 and 2.0, got {t}"
        )),
        _ => Ok(()),
    }
}

pub(crate) fn validate_endpoint(name: &str, endpoint: Option<&str>) -> Result<(), String> {
    let Some(endpoint) = endpoint else {
        return Ok(());
    };
    let url = Url::parse(endpoint).map_err(|e| format!("{name} is not a valid URL: {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("{name} must use http or https, got '{other}'")),
    }
}

pub(crate) fn validate_field_name(name: &str, value: &str) -> Result<(), String> {
    if FIELD_NAME.is_match(value) {
        Ok(())
    } else {
        Err(format!("{name} '{value}' is not a valid index field name"))
    }
}
