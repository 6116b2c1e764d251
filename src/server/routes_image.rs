//! Thumbnail endpoint: relays origin images referenced from tokenized
//! metadata documents.

use axum::{
    body::Body,
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use std::net::SocketAddr;

use super::AppContext;
use crate::error::ProxyError;
use crate::proxy;
use crate::token::strip_media_suffix;

pub async fn image(
    State(ctx): State<AppContext>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let claims = ctx.codec.redeem(strip_media_suffix(&token))?;
    ctx.check_binding(&claims, &peer, &headers)?;

    let (bytes, upstream_type) = proxy::fetch_bytes(&ctx.http, &claims.url).await?;
    let content_type = upstream_type.unwrap_or_else(|| "image/jpeg".to_string());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, bytes.len().to_string())
        .body(Body::from(bytes))
        .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))
}
