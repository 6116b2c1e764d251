use crate::config::Config;
use crate::error::ProxyError;
use crate::extractor::{HttpExtractor, MetadataExtractor};
use crate::rewrite::RewritePatterns;
use crate::token::{TokenCodec, TokenClaims};
use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderMap, HeaderName, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod gate;
pub mod routes_image;
pub mod routes_manifest;
pub mod routes_media;
pub mod routes_playback;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Capability token codec, built once from the process key.
    pub codec: Arc<TokenCodec>,
    /// Compiled origin-URL recognition patterns.
    pub patterns: Arc<RewritePatterns>,
    /// Outbound client with a bounded timeout, reused across requests.
    pub http: reqwest::Client,
    /// Extraction engine; the metadata endpoint is disabled when unset.
    pub extractor: Option<Arc<dyn MetadataExtractor>>,
}

impl AppContext {
    /// Resolve the identity tokens are bound to: the peer address, unless a
    /// trusted front door forwarded the true client in X-Client-Host.
    pub fn client_binding(&self, peer: &SocketAddr, headers: &HeaderMap) -> String {
        if self.config.security.trust_forwarded_client {
            if let Some(forwarded) = gate::header_str(headers, gate::X_CLIENT_HOST) {
                return forwarded.to_string();
            }
        }
        peer.ip().to_string()
    }

    /// Base URL minted local links point at.
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.config.server.public_url {
            return url.trim_end_matches('/').to_string();
        }
        let host = gate::header_str(headers, "host").unwrap_or("localhost");
        format!("{}://{}", self.config.server.public_scheme, host)
    }

    /// Enforce the token's client binding against the requester.
    pub fn check_binding(
        &self,
        claims: &TokenClaims,
        peer: &SocketAddr,
        headers: &HeaderMap,
    ) -> Result<(), ProxyError> {
        if !self.config.security.validate_client_binding {
            return Ok(());
        }
        let requester = self.client_binding(peer, headers);
        if claims.client_host != requester {
            tracing::warn!(bound = %claims.client_host, %requester, "token binding mismatch");
            return Err(ProxyError::BindingMismatch);
        }
        Ok(())
    }

    pub fn segment_retry(&self) -> (u32, Duration) {
        (
            self.config.upstream.segment_retry_attempts,
            Duration::from_millis(self.config.upstream.segment_retry_delay_ms),
        )
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(gate::X_SECRET),
            HeaderName::from_static(gate::X_SIGN),
            HeaderName::from_static(gate::X_CLIENT_HOST),
        ]);

    // Merged rather than nested so the gate sees full request paths when
    // verifying URL signatures.
    let v1 = Router::new()
        .route("/v1/media/:content_id", get(routes_media::fetch_metadata))
        .route("/v1/playback/:token", get(routes_playback::playback))
        .route("/v1/manifest/hls/:token", get(routes_manifest::hls_manifest))
        .route("/v1/manifest/segment/:token", get(routes_manifest::segment))
        .route_layer(middleware::from_fn_with_state(
            ctx.clone(),
            gate::admission_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(v1)
        // Thumbnails sit outside /v1 and its admission gate; the token
        // binding check still applies.
        .route("/image/:token", get(routes_image::image))
        .layer(middleware::from_fn(gate::node_middleware))
        .layer(middleware::from_fn(gate::process_time_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Build the shared context from configuration.
pub fn build_context(config: Config) -> Result<AppContext> {
    let codec = TokenCodec::new(&config.security.crypt_key, config.security.token_ttl_secs)
        .context("invalid token key")?;
    let patterns =
        RewritePatterns::compile(&config.rewrite).context("invalid rewrite patterns")?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upstream.request_timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let extractor: Option<Arc<dyn MetadataExtractor>> = config
        .upstream
        .extractor_url
        .as_ref()
        .map(|url| Arc::new(HttpExtractor::new(http.clone(), url.clone())) as _);

    Ok(AppContext {
        config: Arc::new(config),
        codec: Arc::new(codec),
        patterns: Arc::new(patterns),
        http,
        extractor,
    })
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let ctx = build_context(config)?;
    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
