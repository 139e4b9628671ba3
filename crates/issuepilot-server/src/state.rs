use std::sync::Arc;

use issuepilot_config::Config;
use issuepilot_mcp::{McpClient, McpStatus};
use issuepilot_pipeline::{McpToolRouter, Pipeline, ToolCatalog};
use issuepilot_provider::{OpenAiConfig, OpenAiProvider, Provider};

/// Shared server state: one provider client, one tool-provider bridge, and
/// the catalog retrieved at startup.
pub struct ServerState {
    pub provider: Arc<dyn Provider>,
    pub bridge: Arc<McpClient>,
    pub catalog: ToolCatalog,
    pub config: Config,
}

impl ServerState {
    /// Build the state and bring up the tool-provider subprocess. A bridge
    /// failure is logged and leaves the service in degraded zero-tools mode;
    /// it never prevents startup.
    pub async fn initialize(config: Config) -> Arc<Self> {
        if config
            .openai
            .api_key
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .is_empty()
        {
            tracing::warn!("no OpenAI API key configured; model calls will fail per-request");
        }

        let provider = Arc::new(OpenAiProvider::new(OpenAiConfig {
            api_key: config.openai.api_key.clone().unwrap_or_default(),
            model: config.openai.model.clone(),
            base_url: config.openai.base_url.clone(),
        }));

        let bridge = Arc::new(McpClient::new().with_timeout(config.mcp.timeout_ms));
        let catalog = match bridge
            .initialize(&config.mcp, config.github.token.as_deref())
            .await
        {
            Ok(tools) => ToolCatalog::register(tools),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "tool provider unavailable, continuing with zero tools"
                );
                ToolCatalog::empty()
            }
        };

        Arc::new(Self {
            provider,
            bridge,
            catalog,
            config,
        })
    }

    /// Assemble state around an existing provider and catalog. Used by tests
    /// and by flows that manage the bridge themselves.
    pub fn with_parts(
        provider: Arc<dyn Provider>,
        bridge: Arc<McpClient>,
        catalog: ToolCatalog,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            bridge,
            catalog,
            config,
        })
    }

    /// A pipeline wired to this state's provider, bridge and catalog.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.provider.clone(),
            Arc::new(McpToolRouter::new(self.bridge.clone())),
            self.catalog.clone(),
            self.config.pipeline.clone(),
        )
    }

    pub async fn bridge_status(&self) -> McpStatus {
        self.bridge.status().await
    }

    /// Tear down the tool-provider subprocess. Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Err(e) = self.bridge.close().await {
            tracing::warn!(error = %e, "failed to close tool provider cleanly");
        }
    }
}
