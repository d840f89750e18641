//! Client identity used to key rate limits and request logs.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{Extensions, HeaderMap};

pub const FORWARDED_FOR: &str = "x-forwarded-for";
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolves the client key for a request.
///
/// With `trust_forwarded_for` set, the first (client-most) hop of
/// `X-Forwarded-For` wins. Otherwise, or when that header is absent, the
/// peer address recorded by `ConnectInfo` is used. Requests with neither
/// share the `"unknown"` key.
pub fn client_key(headers: &HeaderMap, extensions: &Extensions, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(ip) = forwarded_client(headers) {
            return ip;
        }
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    headers
        .get(FORWARDED_FOR)?
        .to_str()
        .ok()?
        .split(',')
        .map(str::trim)
        .find(|hop| !hop.is_empty())
        .map(str::to_string)
}
