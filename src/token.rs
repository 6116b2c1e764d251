//! Capability token codec.
//!
//! A token is a small JSON claim set encrypted with AES-256-GCM under a
//! process-wide key: `nonce || ciphertext`, URL-safe base64 without padding.
//! The encoding never contains `=` or `.`, so callers can embed tokens in
//! path segments and append a fake media extension (`.m3u8`, `.ts`) for
//! client-side content-type hinting.
//!
//! Tokens are bearer capabilities: self-contained, never stored server-side,
//! and rejected once older than the configured TTL.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ProxyError;

const NONCE_LEN: usize = 12;

/// Claims carried by every token. `client_host` is the identity the token is
/// locked to; redemption by any other identity is rejected by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub url: String,
    pub client_host: String,
    #[serde(rename = "iat")]
    pub issued_at: u64,
}

/// Stateless encrypt/decrypt of [`TokenClaims`]; pure function of key+input.
pub struct TokenCodec {
    cipher: Aes256Gcm,
    ttl_secs: u64,
}

impl TokenCodec {
    pub fn new(key_b64: &str, ttl_secs: u64) -> anyhow::Result<Self> {
        let key_bytes = decode_key(key_b64)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        Ok(Self { cipher, ttl_secs })
    }

    /// Issue a token binding `url` to `client_host`, stamped with the
    /// current time.
    pub fn issue(&self, url: &str, client_host: &str) -> Result<String, ProxyError> {
        self.issue_at(url, client_host, unix_now())
    }

    pub(crate) fn issue_at(
        &self,
        url: &str,
        client_host: &str,
        issued_at: u64,
    ) -> Result<String, ProxyError> {
        let claims = TokenClaims {
            url: url.to_string(),
            client_host: client_host.to_string(),
            issued_at,
        };
        let plaintext = serde_json::to_vec(&claims).map_err(|_| ProxyError::TokenInvalid)?;

        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|_| ProxyError::TokenInvalid)?;

        let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(&nonce_bytes);
        raw.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Decrypt and validate a token. Any dotted suffix must be stripped by
    /// the caller first ([`strip_media_suffix`]); re-padded input is
    /// tolerated. All failure causes collapse to [`ProxyError::TokenInvalid`].
    pub fn redeem(&self, token: &str) -> Result<TokenClaims, ProxyError> {
        self.redeem_at(token, unix_now())
    }

    pub(crate) fn redeem_at(&self, token: &str, now: u64) -> Result<TokenClaims, ProxyError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim_end_matches('='))
            .map_err(|_| ProxyError::TokenInvalid)?;
        if raw.len() <= NONCE_LEN {
            return Err(ProxyError::TokenInvalid);
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| ProxyError::TokenInvalid)?;

        let claims: TokenClaims =
            serde_json::from_slice(&plaintext).map_err(|_| ProxyError::TokenInvalid)?;

        if now > claims.issued_at.saturating_add(self.ttl_secs) {
            return Err(ProxyError::TokenInvalid);
        }

        Ok(claims)
    }
}

/// Strip a trailing dotted media suffix (`.m3u8`, `.ts`, ...) appended after
/// the token. Token encoding itself never emits `.`, so anything after the
/// last dot is a caller-added hint.
pub fn strip_media_suffix(token: &str) -> &str {
    match token.rfind('.') {
        Some(idx) if token[idx + 1..].chars().all(|c| c.is_ascii_alphanumeric()) => &token[..idx],
        _ => token,
    }
}

/// Decode a base64 key, accepting standard or URL-safe alphabets with or
/// without padding, and require exactly 32 bytes.
pub fn decode_key(key_b64: &str) -> anyhow::Result<[u8; 32]> {
    let trimmed = key_b64.trim().trim_end_matches('=');
    let normalized: String = trimmed
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    let bytes = URL_SAFE_NO_PAD.decode(normalized.as_bytes())?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("key must decode to exactly 32 bytes"))?;
    Ok(key)
}

/// Generate a fresh random token key, URL-safe base64.
pub fn generate_key() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn codec() -> TokenCodec {
        TokenCodec::new(&generate_key(), 3600).unwrap()
    }

    #[test]
    fn round_trip() {
        let codec = codec();
        let token = codec.issue("https://origin/videoplayback?id=1", "1.2.3.4").unwrap();
        let claims = codec.redeem(&token).unwrap();
        assert_eq!(claims.url, "https://origin/videoplayback?id=1");
        assert_eq!(claims.client_host, "1.2.3.4");
    }

    #[test]
    fn token_is_path_segment_safe() {
        let codec = codec();
        let token = codec.issue("https://origin/a?b=c&d=e", "10.0.0.1").unwrap();
        assert!(!token.contains('='));
        assert!(!token.contains('.'));
        assert!(!token.contains('/'));
    }

    #[test]
    fn redeem_tolerates_repadding() {
        let codec = codec();
        let token = codec.issue("https://origin/x", "1.1.1.1").unwrap();
        let repadded = format!("{}{}", token, "=".repeat((4 - token.len() % 4) % 4));
        assert!(codec.redeem(&repadded).is_ok());
    }

    #[test]
    fn expiry_boundaries() {
        let codec = codec();
        let issued = 1_700_000_000;
        let token = codec.issue_at("https://origin/x", "1.1.1.1", issued).unwrap();
        assert!(codec.redeem_at(&token, issued + 3600 - 1).is_ok());
        assert!(codec.redeem_at(&token, issued + 3600).is_ok());
        assert_matches!(
            codec.redeem_at(&token, issued + 3601),
            Err(ProxyError::TokenInvalid)
        );
    }

    #[test]
    fn every_bit_flip_is_rejected() {
        let codec = codec();
        let token = codec.issue("https://origin/x", "1.1.1.1").unwrap();
        let raw = URL_SAFE_NO_PAD.decode(token.as_bytes()).unwrap();
        for byte in 0..raw.len() {
            for bit in 0..8 {
                let mut tampered = raw.clone();
                tampered[byte] ^= 1 << bit;
                let forged = URL_SAFE_NO_PAD.encode(&tampered);
                assert_matches!(codec.redeem(&forged), Err(ProxyError::TokenInvalid));
            }
        }
    }

    #[test]
    fn wrong_key_is_rejected() {
        let a = codec();
        let b = codec();
        let token = a.issue("https://origin/x", "1.1.1.1").unwrap();
        assert_matches!(b.redeem(&token), Err(ProxyError::TokenInvalid));
    }

    #[test]
    fn garbage_is_rejected() {
        let codec = codec();
        assert_matches!(codec.redeem(""), Err(ProxyError::TokenInvalid));
        assert_matches!(codec.redeem("not-a-token"), Err(ProxyError::TokenInvalid));
        assert_matches!(codec.redeem("%%%"), Err(ProxyError::TokenInvalid));
    }

    #[test]
    fn media_suffix_is_stripped() {
        assert_eq!(strip_media_suffix("abcDEF123.m3u8"), "abcDEF123");
        assert_eq!(strip_media_suffix("abcDEF123.ts"), "abcDEF123");
        assert_eq!(strip_media_suffix("abcDEF123"), "abcDEF123");
    }

    #[test]
    fn suffix_strip_round_trip() {
        let codec = codec();
        let token = codec.issue("https://origin/seg", "1.1.1.1").unwrap();
        let suffixed = format!("{token}.ts");
        let claims = codec.redeem(strip_media_suffix(&suffixed)).unwrap();
        assert_eq!(claims.url, "https://origin/seg");
    }

    #[test]
    fn key_decoding_accepts_both_alphabets() {
        use base64::engine::general_purpose::STANDARD;
        let key: [u8; 32] = [7u8; 32];
        assert_eq!(decode_key(&STANDARD.encode(key)).unwrap(), key);
        assert_eq!(decode_key(&URL_SAFE_NO_PAD.encode(key)).unwrap(), key);
        assert!(decode_key("short").is_err());
    }
}
