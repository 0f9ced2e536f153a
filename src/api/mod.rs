/// HTTP routes served behind the identity middleware
pub mod middleware;

use crate::{context::AppContext, directory::Device};
use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::get,
    Extension, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Identity as seen by a handler downstream of the middleware
#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub headers: BTreeMap<String, String>,
    pub device: Option<Device>,
}

/// Routes that receive identity annotations
pub fn routes() -> Router<AppContext> {
    Router::new().route("/whoami", get(whoami))
}

async fn whoami(
    State(ctx): State<AppContext>,
    device: Option<Extension<Arc<Device>>>,
    headers: HeaderMap,
) -> Json<WhoAmI> {
    let prefix = ctx.config.headers.prefix.to_ascii_lowercase();

    let headers = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with(&prefix))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    Json(WhoAmI {
        headers,
        device: device.map(|Extension(device)| (*device).clone()),
    })
}
