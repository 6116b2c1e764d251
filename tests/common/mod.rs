//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which builds a full [`AppContext`] from a test
//! config and starts Axum on a random loopback port. Requests arrive from
//! 127.0.0.1, so tokens minted for that binding redeem successfully.

#![allow(dead_code)]

use std::net::SocketAddr;

use streamgate::config::Config;
use streamgate::server::{build_context, create_router, AppContext};
use streamgate::token::generate_key;

pub const TEST_SECRET: &str = "test-shared-secret";

/// Loopback identity every harness request carries.
pub const LOOPBACK: &str = "127.0.0.1";

/// Test harness wrapping a fully-constructed [`AppContext`] and the bound
/// server address.
pub struct TestHarness {
    pub ctx: AppContext,
    pub addr: SocketAddr,
}

/// Default config for tests: fresh random key, shared secret set, binding
/// validation on, gates off unless a test flips them.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.security.crypt_key = generate_key();
    config.security.secret_key = Some(TEST_SECRET.to_string());
    config
}

impl TestHarness {
    /// Start an Axum server with the default test config.
    pub async fn with_server() -> Self {
        Self::with_server_config(test_config()).await
    }

    /// Start an Axum server with a custom config on a random port.
    pub async fn with_server_config(config: Config) -> Self {
        let ctx = build_context(config).expect("failed to build context");
        let app = create_router(ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .ok();
        });

        Self { ctx, addr }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Mint a token for `url` bound to the loopback identity the harness
    /// connects from.
    pub fn token_for(&self, url: &str) -> String {
        self.ctx
            .codec
            .issue(url, LOOPBACK)
            .expect("failed to issue token")
    }

    /// Mint a token bound to some other client.
    pub fn foreign_token_for(&self, url: &str) -> String {
        self.ctx
            .codec
            .issue(url, "203.0.113.9")
            .expect("failed to issue token")
    }
}
