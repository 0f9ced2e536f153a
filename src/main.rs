/// Tailnet Auth server binary
use tailnet_auth::{config::TailnetConfig, context::AppContext, error::TailnetResult, server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> TailnetResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tailnet_auth=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = TailnetConfig::from_env()?;

    tracing::info!(
        mode = ?config.directory.mode,
        cache_file = %config.directory.cache_file.display(),
        "starting tailnet-auth v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Create application context (loads the persisted snapshot)
    let ctx = AppContext::new(config).await?;

    server::serve(ctx).await?;

    Ok(())
}
