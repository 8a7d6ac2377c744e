//! Shared application state.
//!
//! Holds the configuration and the process-wide components every relay
//! session draws from: the telemetry recorder, the search pipeline, the
//! grounding lookup, the data API client and the upstream target. Tool tables
//! are built per session from these shared pieces.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::credentials::{COGNITIVE_SERVICES_SCOPE, Credential, SEARCH_SCOPE, TokenProvider};
use crate::core::realtime::{SessionOverrides, UpstreamTarget};
use crate::core::search::{
    AzureOpenAiEmbedder, AzureSearchClient, Embedder, GroundingLookup, IndexSchema, SearchIndex,
    SearchPipeline,
};
use crate::core::telemetry::TelemetryRecorder;
use crate::core::tools::data_api::lookup_tools;
use crate::core::tools::{DataApiClient, GroundingTool, SearchTool, ToolTable};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Reason a WebSocket connection was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionLimitError {
    #[error("global connection limit reached")]
    GlobalLimitReached,
    #[error("per-IP connection limit reached")]
    PerIpLimitReached,
}

/// Knowledge base components, present only when an index is configured
pub struct KnowledgeBase {
    pub pipeline: Arc<SearchPipeline>,
    pub grounding: Arc<GroundingLookup>,
}

pub struct AppState {
    pub config: ServerConfig,
    pub telemetry: Arc<TelemetryRecorder>,
    pub knowledge: Option<KnowledgeBase>,
    pub data_api: Arc<DataApiClient>,
    /// `None` when the realtime endpoint or deployment is missing
    pub upstream: Option<UpstreamTarget>,
    overrides: SessionOverrides,

    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    /// Build the shared components from configuration
    pub fn new(config: ServerConfig) -> anyhow::Result<Arc<Self>> {
        let telemetry = Arc::new(TelemetryRecorder::new());

        let identity = &config.identity;
        let token_provider = match (
            &identity.tenant_id,
            &identity.client_id,
            &identity.client_secret,
        ) {
            (Some(tenant), Some(client), Some(secret)) => Some(Arc::new(TokenProvider::new(
                tenant.clone(),
                client.clone(),
                secret.clone(),
            ))),
            _ => None,
        };

        let upstream = match (&config.realtime.endpoint, &config.realtime.deployment) {
            (Some(_), Some(_)) => {
                let credential = Credential::resolve(
                    config.realtime.api_key.as_deref(),
                    token_provider.as_ref(),
                    COGNITIVE_SERVICES_SCOPE,
                );
                Some(
                    UpstreamTarget::from_settings(&config.realtime, credential)
                        .context("invalid realtime endpoint")?,
                )
            }
            _ => {
                warn!("Realtime endpoint or deployment not configured, /realtime will refuse sessions");
                None
            }
        };

        let knowledge = Self::knowledge_base(&config, token_provider.as_ref(), &telemetry)?;

        let data_api = Arc::new(
            DataApiClient::new(
                config.data_api_endpoint.clone(),
                Duration::from_secs(config.data_api_timeout_seconds),
            )
            .context("failed to build data API client")?,
        );
        if !data_api.is_configured() {
            warn!("AZURE_API_ENDPOINT not set, data lookup tools will report the API as unavailable");
        }

        let overrides = config.session_overrides();

        Ok(Arc::new(Self {
            config,
            telemetry,
            knowledge,
            data_api,
            upstream,
            overrides,
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        }))
    }

    fn knowledge_base(
        config: &ServerConfig,
        token_provider: Option<&Arc<TokenProvider>>,
        telemetry: &Arc<TelemetryRecorder>,
    ) -> anyhow::Result<Option<KnowledgeBase>> {
        let search = &config.search;
        let (Some(endpoint), Some(index)) = (&search.endpoint, &search.index) else {
            warn!("Search endpoint or index not configured, search and grounding tools disabled");
            return Ok(None);
        };

        let credential = Credential::resolve(search.api_key.as_deref(), token_provider, SEARCH_SCOPE);
        let client: Arc<dyn SearchIndex> = Arc::new(
            AzureSearchClient::new(
                endpoint,
                index,
                &search.api_version,
                credential,
                SEARCH_TIMEOUT,
            )
            .context("failed to build search client")?,
        );

        let embedder: Option<Arc<dyn Embedder>> =
            match (config.embedding_endpoint(), &config.embedding.deployment) {
                (Some(endpoint), Some(deployment)) => {
                    let credential = Credential::resolve(
                        config.embedding_api_key(),
                        token_provider,
                        COGNITIVE_SERVICES_SCOPE,
                    );
                    Some(Arc::new(
                        AzureOpenAiEmbedder::new(
                            endpoint,
                            deployment,
                            &config.embedding.api_version,
                            credential,
                            telemetry.clone(),
                        )
                        .context("failed to build embeddings client")?,
                    ))
                }
                _ => {
                    info!("No embedding deployment configured, search runs without vector queries");
                    None
                }
            };

        let schema = IndexSchema::from(search);
        info!(index = %index, has_embedder = embedder.is_some(), "Knowledge base configured");

        Ok(Some(KnowledgeBase {
            pipeline: Arc::new(SearchPipeline::new(
                client.clone(),
                embedder,
                schema.clone(),
                search.use_vector_query,
            )),
            grounding: Arc::new(GroundingLookup::new(client, schema)),
        }))
    }

    /// Fresh tool table for one relay session
    pub fn tool_table(&self) -> ToolTable {
        let mut table = ToolTable::new();
        if let Some(kb) = &self.knowledge {
            table = table
                .with_tool(SearchTool::new(kb.pipeline.clone(), self.telemetry.clone()).into_tool())
                .with_tool(
                    GroundingTool::new(kb.grounding.clone(), self.telemetry.clone()).into_tool(),
                );
        }
        lookup_tools(self.data_api.clone(), self.telemetry.clone())
            .into_iter()
            .fold(table, ToolTable::with_tool)
    }

    pub fn session_overrides(&self) -> &SessionOverrides {
        &self.overrides
    }

    /// Reserve a WebSocket slot for `ip`
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        if let Some(max) = self.config.max_websocket_connections {
            let reserved = self
                .ws_connections
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current < max).then_some(current + 1)
                });
            if reserved.is_err() {
                return Err(ConnectionLimitError::GlobalLimitReached);
            }
        } else {
            self.ws_connections.fetch_add(1, Ordering::AcqRel);
        }

        let per_ip_limit = self.config.max_connections_per_ip;
        let mut entry = self.ip_connections.entry(ip).or_insert(0);
        if *entry >= per_ip_limit {
            drop(entry);
            self.ws_connections.fetch_sub(1, Ordering::AcqRel);
            return Err(ConnectionLimitError::PerIpLimitReached);
        }
        *entry += 1;
        Ok(())
    }

    /// Return a slot taken by [`try_acquire_connection`](Self::try_acquire_connection)
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });
        self.ip_connections.remove_if_mut(&ip, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Acquire)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|c| *c).unwrap_or(0)
    }
}
