use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub rewrite: RewriteConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// External base URL used when minting local links. When unset, the
    /// request's Host header is combined with `public_scheme`.
    #[serde(default)]
    pub public_url: Option<String>,

    #[serde(default = "default_scheme")]
    pub public_scheme: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// Base64 (URL-safe, unpadded accepted) 32-byte token encryption key.
    /// Generate with `streamgate generate-key`.
    #[serde(default)]
    pub crypt_key: String,

    /// Pre-shared secret for the metadata endpoint and the gate bypass.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Token lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Hosts accepted by the referer/origin gate. `*.` entries match any
    /// subdomain; a trailing `:port` on the request side is ignored.
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// Compare the token's client binding against the requester.
    #[serde(default = "default_true")]
    pub validate_client_binding: bool,

    /// Require an allow-listed Referer or Origin on /v1 routes.
    #[serde(default)]
    pub enforce_referer: bool,

    /// Require an HMAC-SHA256 signature of the request URL in X-Sign.
    #[serde(default)]
    pub enforce_signature: bool,

    /// Key for the X-Sign signature check.
    #[serde(default)]
    pub signature_secret: Option<String>,

    /// Trust X-Client-Host as the true client identity. Only enable when a
    /// front-door proxy that sets the header sits in front of this service.
    #[serde(default)]
    pub trust_forwarded_client: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Bound on every outbound origin call, probe and fetch alike.
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,

    /// Total attempts for a segment fetch (first try included).
    #[serde(default = "default_retry_attempts")]
    pub segment_retry_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub segment_retry_delay_ms: u64,

    /// Base URL of the external extraction engine. The metadata endpoint is
    /// disabled when unset.
    #[serde(default)]
    pub extractor_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RewriteConfig {
    /// Regex recognizing progressive playback URLs from the origin.
    #[serde(default = "default_playback_pattern")]
    pub playback_pattern: String,

    /// Regex recognizing adaptive manifest URLs from the origin.
    #[serde(default = "default_manifest_pattern")]
    pub manifest_pattern: String,

    /// Codec family prefixes a variant must carry to survive rewriting.
    #[serde(default = "default_compatible_codecs")]
    pub compatible_codecs: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_scheme() -> String {
    "http".to_string()
}
fn default_token_ttl() -> u64 {
    3600
}
fn default_allowed_hosts() -> Vec<String> {
    vec!["localhost".to_string(), "127.0.0.1".to_string()]
}
fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    30
}
fn default_retry_attempts() -> u32 {
    2
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_playback_pattern() -> String {
    r"^https://[^/]+/videoplayback\?.+".to_string()
}
fn default_manifest_pattern() -> String {
    r"^https://[^/]+/api/manifest/hls_(?:variant|playlist)/.+".to_string()
}
fn default_compatible_codecs() -> Vec<String> {
    vec!["avc1".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            public_scheme: default_scheme(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            crypt_key: String::new(),
            secret_key: None,
            token_ttl_secs: default_token_ttl(),
            allowed_hosts: default_allowed_hosts(),
            validate_client_binding: true,
            enforce_referer: false,
            enforce_signature: false,
            signature_secret: None,
            trust_forwarded_client: false,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_timeout(),
            segment_retry_attempts: default_retry_attempts(),
            segment_retry_delay_ms: default_retry_delay(),
            extractor_url: None,
        }
    }
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            playback_pattern: default_playback_pattern(),
            manifest_pattern: default_manifest_pattern(),
            compatible_codecs: default_compatible_codecs(),
        }
    }
}
