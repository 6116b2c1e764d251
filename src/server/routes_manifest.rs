//! Manifest endpoints: the HLS rewriter and the segment relay.

use axum::{
    body::Body,
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use std::net::SocketAddr;

use super::AppContext;
use crate::error::ProxyError;
use crate::hls;
use crate::proxy;
use crate::rewrite::UrlRewriter;
use crate::token::strip_media_suffix;

const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Fetch the origin manifest, rewrite every link it contains into a
/// tokenized local URL, and return the rewritten text.
pub async fn hls_manifest(
    State(ctx): State<AppContext>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let claims = ctx.codec.redeem(strip_media_suffix(&token))?;
    ctx.check_binding(&claims, &peer, &headers)?;

    let (text, upstream_type) = proxy::fetch_text(&ctx.http, &claims.url).await?;

    let binding = ctx.client_binding(&peer, &headers);
    let base_url = ctx.base_url(&headers);
    let rewriter = UrlRewriter::new(&ctx.codec, &ctx.patterns, &base_url, &binding);
    let rewritten = hls::rewrite_manifest(&rewriter, &text)?;

    let content_type = upstream_type.unwrap_or_else(|| MANIFEST_CONTENT_TYPE.to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(rewritten))
        .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))
}

/// Relay one media segment, retrying a bounded number of times on transient
/// upstream failures.
pub async fn segment(
    State(ctx): State<AppContext>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let claims = ctx.codec.redeem(strip_media_suffix(&token))?;
    ctx.check_binding(&claims, &peer, &headers)?;

    let (attempts, delay) = ctx.segment_retry();
    let (bytes, _) = proxy::fetch_segment(&ctx.http, &claims.url, attempts, delay).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, bytes.len().to_string())
        .body(Body::from(bytes))
        .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))
}
