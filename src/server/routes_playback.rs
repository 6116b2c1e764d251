//! Playback endpoint: redeems a capability token and proxies the origin
//! media resource with full byte-range support.

use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap},
    response::Response,
};
use std::net::SocketAddr;

use super::AppContext;
use crate::error::ProxyError;
use crate::proxy::RangeProxy;
use crate::token::strip_media_suffix;

pub async fn playback(
    State(ctx): State<AppContext>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    let claims = ctx.codec.redeem(strip_media_suffix(&token))?;
    ctx.check_binding(&claims, &peer, &headers)?;

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());

    RangeProxy::new(&ctx.http, &claims.url)
        .serve(range, "video/mp4")
        .await
}
