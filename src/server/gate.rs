//! Request-admission gate applied to the `/v1` routes.
//!
//! Checks compose and short-circuit: a matching pre-shared secret bypasses
//! everything, otherwise the referer/origin allow-list and the request
//! signature are each enforced when enabled. All of this runs before any
//! token decryption is attempted.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::AppContext;
use crate::error::ProxyError;

pub const X_SECRET: &str = "x-secret";
pub const X_SIGN: &str = "x-sign";
pub const X_CLIENT_HOST: &str = "x-client-host";

pub async fn admission_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, ProxyError> {
    let security = &ctx.config.security;
    let headers = request.headers();

    // A caller holding the shared secret skips the browser-oriented gates.
    if let (Some(secret), Some(provided)) = (&security.secret_key, header_str(headers, X_SECRET))
    {
        if provided == secret {
            return Ok(next.run(request).await);
        }
    }

    if security.enforce_referer {
        let host = header_str(headers, "referer")
            .or_else(|| header_str(headers, "origin"))
            .and_then(url_host);

        match host {
            None => {
                tracing::warn!(path = %request.uri().path(), "blocked request without referer or origin");
                return Err(ProxyError::AdmissionDenied);
            }
            Some(host) if !host_allowed(&host, &security.allowed_hosts) => {
                tracing::warn!(path = %request.uri().path(), %host, "blocked request from disallowed referer");
                return Err(ProxyError::AdmissionDenied);
            }
            Some(_) => {}
        }
    }

    if security.enforce_signature {
        // Presence of the secret is checked at config load.
        let secret = security
            .signature_secret
            .as_deref()
            .ok_or(ProxyError::AdmissionDenied)?;
        let provided = header_str(headers, X_SIGN).ok_or_else(|| {
            tracing::warn!(path = %request.uri().path(), "blocked unsigned request");
            ProxyError::AdmissionDenied
        })?;

        let url = format!("{}{}", ctx.base_url(headers), request.uri());
        if !verify_signature(secret, &url, provided) {
            tracing::warn!(path = %request.uri().path(), "blocked request with invalid signature");
            return Err(ProxyError::AdmissionDenied);
        }
    }

    Ok(next.run(request).await)
}

/// Stamp responses with the time spent handling the request.
pub async fn process_time_middleware(request: Request, next: Next) -> Response {
    let start = std::time::Instant::now();
    let mut response = next.run(request).await;
    let elapsed = format!("{} ms", start.elapsed().as_millis());
    if let Ok(value) = header::HeaderValue::from_str(&elapsed) {
        response.headers_mut().insert("x-process-time", value);
    }
    response
}

/// Stamp responses with the identity of the node that served them.
pub async fn node_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    if let Ok(value) = header::HeaderValue::from_str(node_name()) {
        response.headers_mut().insert("x-node", value);
    }
    response
}

fn node_name() -> &'static str {
    static NODE: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    NODE.get_or_init(|| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string())
    })
}

pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn url_host(raw: &str) -> Option<String> {
    reqwest::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
}

/// Match a request host against the allow-list. `*.` entries match the bare
/// domain and any subdomain; an explicit `:port` on the candidate is ignored.
pub fn host_allowed(host: &str, allowed_hosts: &[String]) -> bool {
    let bare = host.split(':').next().unwrap_or(host);

    allowed_hosts.iter().any(|allowed| {
        if let Some(domain) = allowed.strip_prefix("*.") {
            bare == domain || bare.ends_with(&format!(".{domain}"))
        } else {
            bare == allowed
        }
    })
}

/// HMAC-SHA256 over the full request URL, hex-encoded in X-Sign.
pub fn verify_signature(secret: &str, url: &str, signature: &str) -> bool {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(url.as_bytes());

    let expected = match hex::decode(signature) {
        Ok(b) => b,
        Err(_) => return false,
    };

    mac.verify_slice(&expected).is_ok()
}

/// Sign a request URL the way [`verify_signature`] expects. Exposed for
/// trusted callers and tests.
pub fn sign_url(secret: &str, url: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(url.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
