//! Request extractors.

use std::net::SocketAddr;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use collector_core::client::GeoInfo;
use ingest::CollectContext;

/// Header carrying the continuity token between requests.
pub const CACHE_HEADER: &str = "x-pulse-cache";

/// Client IP address.
///
/// X-Forwarded-For (first hop), then X-Real-IP, then the socket address.
pub fn client_ip(headers: &HeaderMap, socket: Option<SocketAddr>) -> Option<String> {
    // Take the first IP in the chain
    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    forwarded
        .or_else(|| header_str(headers, "x-real-ip").map(str::trim))
        .map(str::to_string)
        .or_else(|| socket.map(|addr| addr.ip().to_string()))
}

/// Geo hints set by the CDN in front of the collector.
pub fn geo_from_headers(headers: &HeaderMap) -> GeoInfo {
    let owned = |name: &str| header_str(headers, name).map(str::to_string);
    GeoInfo {
        country: owned("cf-ipcountry").or_else(|| owned("x-vercel-ip-country")),
        region: owned("x-vercel-ip-country-region"),
        city: owned("x-vercel-ip-city"),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Everything the pipeline needs from the HTTP request besides the body.
#[derive(Debug, Clone)]
pub struct ClientContext(pub CollectContext);

#[async_trait]
impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let socket = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let headers = &parts.headers;

        Ok(ClientContext(CollectContext {
            ip: client_ip(headers, socket),
            user_agent: header_str(headers, header::USER_AGENT.as_str()).map(str::to_string),
            geo: geo_from_headers(headers),
            token: header_str(headers, CACHE_HEADER).map(str::to_string),
        }))
    }
}
