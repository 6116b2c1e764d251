//! URL indirection over arbitrary metadata documents.
//!
//! Walks an extraction-engine response (any nested JSON tree) depth-first
//! and replaces every recognized origin URL with a tokenized local URL bound
//! to the requesting client. Unrecognized strings always pass through
//! unchanged; a field that fails to tokenize is left as-is rather than
//! breaking the document.

use regex::Regex;
use serde_json::Value;

use crate::config::RewriteConfig;
use crate::token::TokenCodec;

/// Classification of a scalar string found in a document or manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    /// Single-file progressive media.
    Playback,
    /// Adaptive manifest document.
    Manifest,
    /// Thumbnail / storyboard image.
    Image,
    /// Anything else; passed through untouched.
    Other,
}

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".gif"];

/// Compiled recognition patterns, built once at startup from [`RewriteConfig`].
pub struct RewritePatterns {
    playback: Regex,
    manifest: Regex,
    pub compatible_codecs: Vec<String>,
}

impl RewritePatterns {
    pub fn compile(config: &RewriteConfig) -> anyhow::Result<Self> {
        Ok(Self {
            playback: Regex::new(&config.playback_pattern)?,
            manifest: Regex::new(&config.manifest_pattern)?,
            compatible_codecs: config.compatible_codecs.clone(),
        })
    }

    pub fn classify(&self, url: &str) -> UrlKind {
        if self.playback.is_match(url) {
            return UrlKind::Playback;
        }
        if self.manifest.is_match(url) {
            return UrlKind::Manifest;
        }
        if is_image_url(url) {
            return UrlKind::Image;
        }
        UrlKind::Other
    }

    /// Whether a manifest child URI references a sub-manifest rather than a
    /// media segment.
    pub fn is_child_manifest(&self, uri: &str) -> bool {
        self.manifest.is_match(uri) || uri.contains("hls_playlist") || path_of(uri).ends_with(".m3u8")
    }
}

fn is_image_url(url: &str) -> bool {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return false;
    }
    let path = path_of(url).to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn path_of(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// Per-request rewriter carrying the resolved client binding and the public
/// base URL minted links point back to.
pub struct UrlRewriter<'a> {
    codec: &'a TokenCodec,
    patterns: &'a RewritePatterns,
    base_url: &'a str,
    client_host: &'a str,
}

impl<'a> UrlRewriter<'a> {
    pub fn new(
        codec: &'a TokenCodec,
        patterns: &'a RewritePatterns,
        base_url: &'a str,
        client_host: &'a str,
    ) -> Self {
        Self {
            codec,
            patterns,
            base_url,
            client_host,
        }
    }

    pub fn patterns(&self) -> &RewritePatterns {
        self.patterns
    }

    /// Replace one URL with its tokenized local form, or return it unchanged
    /// when it matches no recognized shape or the token cannot be issued.
    pub fn rewrite_url(&self, url: &str) -> String {
        let kind = self.patterns.classify(url);
        if kind == UrlKind::Other {
            return url.to_string();
        }
        match self.codec.issue(url, self.client_host) {
            Ok(token) => match kind {
                UrlKind::Playback => format!("{}/v1/playback/{}", self.base_url, token),
                UrlKind::Manifest => format!("{}/v1/manifest/hls/{}.m3u8", self.base_url, token),
                UrlKind::Image => format!("{}/image/{}", self.base_url, token),
                UrlKind::Other => unreachable!(),
            },
            Err(_) => url.to_string(),
        }
    }

    /// Tokenize a manifest child link, routing sub-manifests back through the
    /// manifest endpoint and everything else through the segment endpoint.
    pub fn rewrite_manifest_child(&self, uri: &str) -> String {
        match self.codec.issue(uri, self.client_host) {
            Ok(token) if self.patterns.is_child_manifest(uri) => {
                format!("{}/v1/manifest/hls/{}.m3u8", self.base_url, token)
            }
            Ok(token) => format!("{}/v1/manifest/segment/{}.ts", self.base_url, token),
            Err(_) => uri.to_string(),
        }
    }

    /// Walk a document tree in place, rewriting every recognized string.
    ///
    /// When an object carries a `formats` array, the last entry with an mp4
    /// video container and native HLS delivery has its `manifest_url`
    /// promoted to a top-level tokenized `manifest_url`, and the whole
    /// `formats` collection is dropped as redundant.
    pub fn tokenize_document(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                if let Some(Value::Array(formats)) = map.remove("formats") {
                    let manifest_url = formats
                        .iter()
                        .filter(|f| {
                            f.get("video_ext").and_then(Value::as_str) == Some("mp4")
                                && f.get("protocol").and_then(Value::as_str)
                                    == Some("m3u8_native")
                        })
                        .last()
                        .and_then(|f| f.get("manifest_url"))
                        .and_then(Value::as_str);
                    if let Some(url) = manifest_url {
                        map.insert(
                            "manifest_url".to_string(),
                            Value::String(self.rewrite_url(url)),
                        );
                    }
                }
                for (_key, child) in map.iter_mut() {
                    self.tokenize_document(child);
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.tokenize_document(item);
                }
            }
            Value::String(s) => {
                let rewritten = self.rewrite_url(s);
                if rewritten != *s {
                    *s = rewritten;
                }
            }
            _ => {}
        }
    }
}
