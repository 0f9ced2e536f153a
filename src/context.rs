/// Application context and dependency injection
use crate::{config::TailnetConfig, directory::ResolutionCache, error::TailnetResult};
use std::sync::Arc;

/// Shared services handed to every request
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<TailnetConfig>,
    pub resolver: Arc<ResolutionCache>,
}

impl AppContext {
    /// Build the context and warm the resolver from its snapshot file
    pub async fn new(config: TailnetConfig) -> TailnetResult<Self> {
        config.validate()?;

        let resolver = ResolutionCache::from_config(&config)?;
        resolver.warm_start().await;

        Ok(Self::with_resolver(config, resolver))
    }

    /// Context around an already constructed resolver
    pub fn with_resolver(config: TailnetConfig, resolver: ResolutionCache) -> Self {
        Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
        }
    }
}
