/// Identity annotation middleware
use crate::{annotate::device_attributes, context::AppContext, directory::Device};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Address the request came from
///
/// First `X-Forwarded-For` entry, then `X-Real-IP`, then the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    if let Some(xff) = header("x-forwarded-for") {
        let first = xff.split(',').next().unwrap_or(xff).trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }

    if let Some(real_ip) = header("x-real-ip") {
        return Some(real_ip.to_string());
    }

    peer.map(|ip| ip.to_string())
}

/// Remove headers the client sent under the identity prefix
pub fn strip_identity_headers(headers: &mut HeaderMap, prefix: &str) {
    let prefix = prefix.to_ascii_lowercase();
    let forged: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with(&prefix))
        .cloned()
        .collect();

    for name in forged {
        headers.remove(&name);
    }
}

/// Set one prefixed header per device attribute
pub fn insert_identity_headers(headers: &mut HeaderMap, prefix: &str, device: &Device) {
    for (name, value) in device_attributes(device) {
        let full_name = format!("{}{}", prefix, name);
        match (
            HeaderName::from_bytes(full_name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %full_name, "skipping identity header with invalid name or value"),
        }
    }
}

/// Annotate the request with the caller's device identity
///
/// Resolution problems never fail the request; it continues without identity
/// headers. The resolved device is also stored in the request extensions.
pub async fn annotate_identity(
    State(ctx): State<AppContext>,
    mut req: Request,
    next: Next,
) -> Response {
    let prefix = ctx.config.headers.prefix.as_str();
    strip_identity_headers(req.headers_mut(), prefix);

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let Some(client_ip) = client_ip(req.headers(), peer) else {
        warn!("could not determine client IP");
        return next.run(req).await;
    };

    match ctx.resolver.resolve(&client_ip).await {
        Ok(Some(device)) => {
            insert_identity_headers(req.headers_mut(), prefix, &device);
            req.extensions_mut().insert::<Arc<Device>>(device);
        }
        Ok(None) => {
            debug!(client_ip = %client_ip, "device not found for IP even after cache refresh");
        }
        Err(e) => {
            error!(client_ip = %client_ip, error = %e, "failed to get device info");
        }
    }

    next.run(req).await
}
