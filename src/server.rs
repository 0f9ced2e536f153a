/// HTTP server setup and routing
use crate::{
    api::middleware::annotate_identity,
    context::AppContext,
    error::TailnetResult,
};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .merge(crate::api::routes())
        // Only routes above this line are annotated
        .layer(middleware::from_fn_with_state(ctx.clone(), annotate_identity))
        .route("/health", get(health_check))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

/// Health check handler
async fn health_check(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": ctx.resolver.mode(),
        "snapshot": ctx.resolver.snapshot_stats(),
    }))
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> TailnetResult<()> {
    let addr = format!("{}:{}", ctx.config.server.hostname, ctx.config.server.port);

    info!("Tailnet Auth listening on {}", addr);
    info!("   Tailnet: {}", ctx.config.directory.tailnet);
    info!("   Header prefix: {}", ctx.config.headers.prefix);

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Peer addresses are the last resort for identifying the caller
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
