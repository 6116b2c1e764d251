//! Byte-range proxying against origin resources.
//!
//! [`RangeProxy`] emulates range semantics end-to-end: a HEAD probe
//! establishes the total length, the client's `Range` header is validated
//! locally, and the upstream fetch asks for exactly the validated window.
//! Bodies are relayed as a bounded-chunk stream; nothing is buffered whole,
//! so per-request memory is proportional to chunk size, not content length.
//! A dropped client disconnects the upstream stream with it.

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use std::time::Duration;

use crate::error::ProxyError;

/// Header set a browser media element needs to discover seekability via CORS.
const EXPOSED_HEADERS: &str =
    "content-type, accept-ranges, content-length, content-range, content-encoding";

pub struct RangeProxy<'a> {
    client: &'a reqwest::Client,
    url: &'a str,
}

impl<'a> RangeProxy<'a> {
    pub fn new(client: &'a reqwest::Client, url: &'a str) -> Self {
        Self { client, url }
    }

    /// HEAD probe for the total content length. A missing header reads as 0,
    /// matching the upstream's behavior for chunked resources.
    async fn probe_length(&self) -> Result<u64, ProxyError> {
        let resp = self
            .client
            .head(self.url)
            .send()
            .await
            .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ProxyError::UpstreamNotFound);
        }

        Ok(resp
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0))
    }

    /// Serve the resource, honoring an optional single-range `Range` header.
    pub async fn serve(
        &self,
        range_header: Option<&str>,
        content_type: &str,
    ) -> Result<Response, ProxyError> {
        let total = self.probe_length().await?;

        let (start, end, status) = match range_header {
            None => (0, total.saturating_sub(1), StatusCode::OK),
            Some(raw) => {
                let (start, end) = parse_range(raw, total)?;
                (start, end, StatusCode::PARTIAL_CONTENT)
            }
        };

        // An empty-or-chunked resource probes as length 0; asking the origin
        // for bytes=0-0 there invites a 416, so a rangeless request for such
        // a resource goes upstream without a Range header at all.
        let mut request = self.client.get(self.url);
        if range_header.is_some() || total > 0 {
            request = request.header(header::RANGE, format!("bytes={start}-{end}"));
        }
        let upstream = request
            .send()
            .await
            .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))?;

        if upstream.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            return Err(ProxyError::RangeUnsatisfiable(format!(
                "Range: bytes={start}-{end}"
            )));
        }
        if !upstream.status().is_success() {
            return Err(ProxyError::UpstreamUnavailable(format!(
                "origin returned {}",
                upstream.status()
            )));
        }

        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CONTENT_ENCODING, "identity")
            .header(header::ACCESS_CONTROL_EXPOSE_HEADERS, EXPOSED_HEADERS);

        builder = if status == StatusCode::PARTIAL_CONTENT {
            builder
                .header(header::CONTENT_LENGTH, (end - start + 1).to_string())
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{total}"),
                )
        } else {
            builder.header(header::CONTENT_LENGTH, total.to_string())
        };

        builder
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))
    }
}

/// Parse a single `bytes=<start>-<end>` expression. Open-ended start and end
/// default to 0 and `total - 1`. Anything unparseable or out of bounds is a
/// range-not-satisfiable error; multi-range expressions fall out here too.
pub fn parse_range(raw: &str, total: u64) -> Result<(u64, u64), ProxyError> {
    let invalid = || ProxyError::RangeUnsatisfiable(format!("Range: {raw:?}"));

    let spec = raw.strip_prefix("bytes=").ok_or_else(invalid)?;
    let (start_s, end_s) = spec.split_once('-').ok_or_else(invalid)?;

    let start: u64 = if start_s.is_empty() {
        0
    } else {
        start_s.parse().map_err(|_| invalid())?
    };
    let end: u64 = if end_s.is_empty() {
        total.saturating_sub(1)
    } else {
        end_s.parse().map_err(|_| invalid())?
    };

    if total == 0 || start > end || end > total - 1 {
        return Err(invalid());
    }

    Ok((start, end))
}

/// Fetch a media segment with a bounded retry. Only transient upstream
/// classes (5xx, 429) and transport errors are retried; any other failure is
/// terminal on the first attempt.
pub async fn fetch_segment(
    client: &reqwest::Client,
    url: &str,
    attempts: u32,
    delay: Duration,
) -> Result<(Bytes, Option<String>), ProxyError> {
    let mut last_err = ProxyError::UpstreamUnavailable("no attempts made".to_string());

    for attempt in 0..attempts.max(1) {
        if attempt > 0 {
            tokio::time::sleep(delay).await;
        }

        match client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    let content_type = header_string(resp.headers(), header::CONTENT_TYPE);
                    let bytes = resp
                        .bytes()
                        .await
                        .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))?;
                    return Ok((bytes, content_type));
                }

                let err = ProxyError::UpstreamUnavailable(format!("origin returned {status}"));
                if !is_transient(status) {
                    return Err(err);
                }
                tracing::warn!(attempt, %status, "transient segment fetch failure");
                last_err = err;
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "segment fetch transport failure");
                last_err = ProxyError::UpstreamUnavailable(e.to_string());
            }
        }
    }

    Err(last_err)
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Fetch a whole text resource (origin manifests are small).
pub async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
) -> Result<(String, Option<String>), ProxyError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(ProxyError::UpstreamUnavailable(format!(
            "origin returned {}",
            resp.status()
        )));
    }

    let content_type = header_string(resp.headers(), header::CONTENT_TYPE);
    let text = resp
        .text()
        .await
        .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))?;
    Ok((text, content_type))
}

/// Fetch a whole binary resource (thumbnails).
pub async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
) -> Result<(Bytes, Option<String>), ProxyError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(ProxyError::UpstreamUnavailable(format!(
            "origin returned {}",
            resp.status()
        )));
    }

    let content_type = header_string(resp.headers(), header::CONTENT_TYPE);
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))?;
    Ok((bytes, content_type))
}

fn header_string(headers: &reqwest::header::HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
