//! Upstream realtime endpoint: URL construction and the authenticated handshake.

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, handshake::client::generate_key};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::info;
use url::Url;

use super::error::{RealtimeError, RealtimeResult};
use crate::config::RealtimeSettings;
use crate::core::credentials::Credential;

/// Header correlating client and upstream requests
pub const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where and how to open the upstream socket
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    url: Url,
    credential: Credential,
}

impl UpstreamTarget {
    pub fn new(
        endpoint: &str,
        deployment: &str,
        api_version: &str,
        credential: Credential,
    ) -> RealtimeResult<Self> {
        Ok(Self {
            url: realtime_url(endpoint, deployment, api_version)?,
            credential,
        })
    }

    /// Build from settings; endpoint and deployment are required
    pub fn from_settings(
        settings: &RealtimeSettings,
        credential: Credential,
    ) -> RealtimeResult<Self> {
        let endpoint = settings.endpoint.as_deref().ok_or_else(|| {
            RealtimeError::InvalidConfiguration("realtime endpoint is not set".to_string())
        })?;
        let deployment = settings.deployment.as_deref().ok_or_else(|| {
            RealtimeError::InvalidConfiguration("realtime deployment is not set".to_string())
        })?;
        Self::new(endpoint, deployment, &settings.api_version, credential)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Open an authenticated socket, forwarding the client's request id when present
    pub async fn connect(&self, client_request_id: Option<&str>) -> RealtimeResult<UpstreamSocket> {
        let host = &self.url[url::Position::BeforeHost..url::Position::AfterPort];

        let mut request = http::Request::builder()
            .uri(self.url.as_str())
            .header("Sec-WebSocket-Key", generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host);

        let auth = self
            .credential
            .auth_header()
            .await
            .map_err(|e| RealtimeError::AuthenticationFailed(e.to_string()))?;
        if let Some(auth) = &auth {
            request = request.header(auth.name(), auth.value());
        }
        if let Some(request_id) = client_request_id {
            request = request.header(CLIENT_REQUEST_ID_HEADER, request_id);
        }

        let request = request
            .body(())
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        let (socket, _response) = connect_async(request)
            .await
            .map_err(|e: tungstenite::Error| RealtimeError::ConnectionFailed(e.to_string()))?;

        info!(host, auth = self.credential.kind(), "Connected to realtime upstream");
        Ok(socket)
    }
}

/// `{endpoint as ws(s)}/openai/realtime?api-version=..&deployment=..`
pub fn realtime_url(endpoint: &str, deployment: &str, api_version: &str) -> RealtimeResult<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| RealtimeError::InvalidConfiguration(format!("invalid endpoint {endpoint}: {e}")))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(RealtimeError::InvalidConfiguration(format!(
                "unsupported endpoint scheme: {other}"
            )));
        }
    };
    url.set_scheme(scheme).map_err(|_| {
        RealtimeError::InvalidConfiguration(format!("cannot use {scheme} for {endpoint}"))
    })?;

    let path = format!("{}/openai/realtime", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("api-version", api_version)
        .append_pair("deployment", deployment);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_endpoint_becomes_wss() {
        let url = realtime_url(
            "https://contoso.openai.azure.com/",
            "gpt-4o-realtime",
            "2025-04-01-preview",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "wss://contoso.openai.azure.com/openai/realtime?api-version=2025-04-01-preview&deployment=gpt-4o-realtime"
        );
    }

    #[test]
    fn test_http_endpoint_with_port_becomes_ws() {
        let url = realtime_url("http://127.0.0.1:9000", "dep", "v1").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://127.0.0.1:9000/openai/realtime?api-version=v1&deployment=dep"
        );
    }

    #[test]
    fn test_rejects_unsupported_scheme() {
        let err = realtime_url("ftp://example.com", "dep", "v1").unwrap_err();
        assert!(matches!(err, RealtimeError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_from_settings_requires_deployment() {
        let mut settings = RealtimeSettings::default();
        settings.endpoint = Some("https://contoso.openai.azure.com".to_string());

        let err = UpstreamTarget::from_settings(&settings, Credential::Anonymous).unwrap_err();
        assert!(err.to_string().contains("deployment"));
    }
}
