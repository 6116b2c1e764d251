//! Metadata endpoint: fronts the external extraction engine and tokenizes
//! every origin URL in its response before it leaves this process.

use axum::{
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::Value;
use std::net::SocketAddr;

use super::{gate, AppContext};
use crate::error::ProxyError;
use crate::rewrite::UrlRewriter;

pub async fn fetch_metadata(
    State(ctx): State<AppContext>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(content_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ProxyError> {
    // The metadata endpoint is never open to anonymous callers.
    let authorized = match &ctx.config.security.secret_key {
        Some(secret) => gate::header_str(&headers, gate::X_SECRET) == Some(secret.as_str()),
        None => false,
    };
    if !authorized {
        return Err(ProxyError::Unauthorized);
    }

    let extractor = ctx.extractor.as_ref().ok_or_else(|| {
        ProxyError::UpstreamUnavailable("extraction engine not configured".to_string())
    })?;

    let mut doc = extractor.extract(&content_id).await?;

    let binding = ctx.client_binding(&peer, &headers);
    let base_url = ctx.base_url(&headers);
    let rewriter = UrlRewriter::new(&ctx.codec, &ctx.patterns, &base_url, &binding);
    rewriter.tokenize_document(&mut doc);

    Ok(Json(doc))
}
