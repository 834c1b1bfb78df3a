use crate::config::PlatformsConfig;
use crate::platform::cli::{CliAdapter, CliProfile};
use crate::platform::netlify::NetlifyAdapter;
use crate::platform::types::{AdapterError, Platform, StatusReport, SubmitRequest, Submission};
use crate::platform::vercel::VercelAdapter;
use crate::store::TokenStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Contract every hosting provider integration implements
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platform this adapter deploys to
    fn platform(&self) -> Platform;

    /// Short adapter identifier used in logs
    fn adapter_name(&self) -> &'static str;

    /// Start a deployment and return the provider-assigned id
    async fn submit(&self, request: &SubmitRequest) -> Result<Submission, AdapterError>;

    /// Fetch the current provider status of a deployment
    async fn query_status(&self, deployment_id: &str) -> Result<StatusReport, AdapterError>;

    /// Ask the provider to stop a deployment
    async fn cancel(&self, deployment_id: &str) -> Result<(), AdapterError>;
}

/// Look up a deployment from the URL it is served at
#[async_trait]
pub trait DeploymentLookup: Send + Sync {
    async fn lookup_by_url(&self, url: &str) -> Result<Option<StatusReport>, AdapterError>;
}

/// Maps each platform to the adapter that serves it
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under the platform it reports, replacing any previous one
    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) -> &mut Self {
        debug!(
            "Registering {} adapter for {}",
            adapter.adapter_name(),
            adapter.platform()
        );
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn resolve(&self, platform: Platform) -> Result<Arc<dyn PlatformAdapter>, AdapterError> {
        self.adapters
            .get(&platform)
            .cloned()
            .ok_or(AdapterError::UnsupportedPlatform(platform))
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.adapters.keys().copied().collect();
        platforms.sort();
        platforms
    }

    /// Build adapters for every platform from configuration and stored credentials.
    ///
    /// Vercel and Netlify use their REST APIs when a token is available and the
    /// CLI is not preferred; every other case goes through the platform's CLI.
    pub async fn from_config(
        config: &PlatformsConfig,
        tokens: &dyn TokenStore,
    ) -> Result<Self, AdapterError> {
        let mut registry = Self::new();

        for platform in Platform::ALL {
            let token = tokens
                .get(platform)
                .await
                .map_err(|e| AdapterError::Auth(e.to_string()))?;

            let adapter: Arc<dyn PlatformAdapter> = match (platform, token) {
                (Platform::Vercel, Some(token)) => {
                    let api = Arc::new(VercelAdapter::new(
                        &config.vercel_api_url,
                        token.clone(),
                        config.request_timeout,
                    )?);
                    if config.prefer_cli {
                        Arc::new(
                            CliAdapter::new(CliProfile::for_platform(platform))
                                .with_command_timeout(config.command_timeout)
                                .with_token(token)
                                .with_lookup(api),
                        )
                    } else {
                        api
                    }
                }
                (Platform::Netlify, Some(token)) => {
                    let api = Arc::new(NetlifyAdapter::new(
                        &config.netlify_api_url,
                        token.clone(),
                        config.request_timeout,
                    )?);
                    if config.prefer_cli {
                        Arc::new(
                            CliAdapter::new(CliProfile::for_platform(platform))
                                .with_command_timeout(config.command_timeout)
                                .with_token(token)
                                .with_lookup(api),
                        )
                    } else {
                        api
                    }
                }
                (platform, token) => {
                    let mut adapter = CliAdapter::new(CliProfile::for_platform(platform))
                        .with_command_timeout(config.command_timeout);
                    if let Some(token) = token {
                        adapter = adapter.with_token(token);
                    }
                    Arc::new(adapter)
                }
            };

            info!(
                "Using {} adapter for {}",
                adapter.adapter_name(),
                platform.descriptor().display_name
            );
            registry.register(adapter);
        }

        Ok(registry)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .platforms()
            .into_iter()
            .filter_map(|platform| {
                self.adapters
                    .get(&platform)
                    .map(|adapter| format!("{}={}", platform, adapter.adapter_name()))
            })
            .collect();
        f.debug_struct("AdapterRegistry")
            .field("adapters", &names)
            .finish()
    }
}
