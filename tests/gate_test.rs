//! Tests for the admission gate in front of the `/v1` routes.
//!
//! Requests use an unredeemable token on purpose: a blocked request reports
//! "request not admitted" while one that clears the gate reaches the handler
//! and fails with "invalid media token" instead.

mod common;

use common::{test_config, TestHarness, TEST_SECRET};
use streamgate::server::gate::sign_url;

async fn error_of(resp: reqwest::Response) -> String {
    let body: serde_json::Value = resp.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn referer_gate_blocks_anonymous_requests() {
    let mut config = test_config();
    config.security.enforce_referer = true;
    config.security.allowed_hosts = vec!["*.example.com".to_string()];
    let harness = TestHarness::with_server_config(config).await;

    let resp = reqwest::Client::new()
        .get(harness.url("/v1/playback/garbage"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    assert_eq!(error_of(resp).await, "request not admitted");
}

#[tokio::test]
async fn referer_gate_admits_allowed_hosts() {
    let mut config = test_config();
    config.security.enforce_referer = true;
    config.security.allowed_hosts = vec!["*.example.com".to_string()];
    let harness = TestHarness::with_server_config(config).await;

    let resp = reqwest::Client::new()
        .get(harness.url("/v1/playback/garbage"))
        .header("referer", "https://app.example.com/watch?v=1")
        .send()
        .await
        .unwrap();

    assert_eq!(error_of(resp).await, "invalid media token");
}

#[tokio::test]
async fn referer_gate_blocks_disallowed_hosts() {
    let mut config = test_config();
    config.security.enforce_referer = true;
    config.security.allowed_hosts = vec!["*.example.com".to_string()];
    let harness = TestHarness::with_server_config(config).await;

    let resp = reqwest::Client::new()
        .get(harness.url("/v1/playback/garbage"))
        .header("referer", "https://evil.test/embed")
        .send()
        .await
        .unwrap();

    assert_eq!(error_of(resp).await, "request not admitted");
}

#[tokio::test]
async fn origin_header_counts_when_referer_is_absent() {
    let mut config = test_config();
    config.security.enforce_referer = true;
    config.security.allowed_hosts = vec!["localhost".to_string()];
    let harness = TestHarness::with_server_config(config).await;

    let resp = reqwest::Client::new()
        .get(harness.url("/v1/playback/garbage"))
        .header("origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();

    assert_eq!(error_of(resp).await, "invalid media token");
}

#[tokio::test]
async fn shared_secret_bypasses_every_gate() {
    let mut config = test_config();
    config.security.enforce_referer = true;
    config.security.enforce_signature = true;
    config.security.signature_secret = Some("sigsecret".to_string());
    config.security.allowed_hosts = vec!["*.example.com".to_string()];
    let harness = TestHarness::with_server_config(config).await;

    let resp = reqwest::Client::new()
        .get(harness.url("/v1/playback/garbage"))
        .header("x-secret", TEST_SECRET)
        .send()
        .await
        .unwrap();

    assert_eq!(error_of(resp).await, "invalid media token");
}

#[tokio::test]
async fn wrong_shared_secret_does_not_bypass() {
    let mut config = test_config();
    config.security.enforce_referer = true;
    config.security.allowed_hosts = vec!["*.example.com".to_string()];
    let harness = TestHarness::with_server_config(config).await;

    let resp = reqwest::Client::new()
        .get(harness.url("/v1/playback/garbage"))
        .header("x-secret", "wrong")
        .send()
        .await
        .unwrap();

    assert_eq!(error_of(resp).await, "request not admitted");
}

#[tokio::test]
async fn signature_gate_verifies_the_request_url() {
    let mut config = test_config();
    config.security.enforce_signature = true;
    config.security.signature_secret = Some("sigsecret".to_string());
    let harness = TestHarness::with_server_config(config).await;

    let url = harness.url("/v1/playback/garbage");
    let signature = sign_url("sigsecret", &url);

    let resp = reqwest::Client::new()
        .get(&url)
        .header("x-sign", &signature)
        .send()
        .await
        .unwrap();
    assert_eq!(error_of(resp).await, "invalid media token");

    let resp = reqwest::Client::new()
        .get(&url)
        .header("x-sign", "deadbeef")
        .send()
        .await
        .unwrap();
    assert_eq!(error_of(resp).await, "request not admitted");

    let resp = reqwest::Client::new().get(&url).send().await.unwrap();
    assert_eq!(error_of(resp).await, "request not admitted");
}

#[tokio::test]
async fn health_and_image_routes_sit_outside_the_gate() {
    let mut config = test_config();
    config.security.enforce_referer = true;
    config.security.allowed_hosts = vec!["*.example.com".to_string()];
    let harness = TestHarness::with_server_config(config).await;

    let resp = reqwest::Client::new()
        .get(harness.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // No referer, yet the request reaches the handler.
    let resp = reqwest::Client::new()
        .get(harness.url("/image/garbage"))
        .send()
        .await
        .unwrap();
    assert_eq!(error_of(resp).await, "invalid media token");
}

#[tokio::test]
async fn responses_carry_the_node_header() {
    let harness = TestHarness::with_server().await;

    let resp = reqwest::Client::new()
        .get(harness.url("/health"))
        .send()
        .await
        .unwrap();

    assert!(resp.headers().contains_key("x-node"));
}

#[tokio::test]
async fn responses_carry_the_process_time_header() {
    let harness = TestHarness::with_server().await;

    let resp = reqwest::Client::new()
        .get(harness.url("/health"))
        .send()
        .await
        .unwrap();

    let stamp = resp
        .headers()
        .get("x-process-time")
        .expect("missing x-process-time")
        .to_str()
        .unwrap();
    assert!(stamp.ends_with(" ms"), "got {stamp}");
    assert!(stamp.trim_end_matches(" ms").parse::<u64>().is_ok());
}
