use axum::http::{header::USER_AGENT, HeaderMap};
use std::net::SocketAddr;

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Client address: first hop of `X-Forwarded-For`, falling back to the peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}
