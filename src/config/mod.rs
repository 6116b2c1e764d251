mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./streamgate.toml",
        "~/.config/streamgate/config.toml",
        "/etc/streamgate/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    let mut config = Config::default();
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Environment overrides for the fields that vary per deployment or carry
/// secrets. The TOML file stays checked-in friendly.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(key) = std::env::var("STREAMGATE_CRYPT_KEY") {
        config.security.crypt_key = key;
    }
    if let Ok(secret) = std::env::var("STREAMGATE_SECRET_KEY") {
        config.security.secret_key = Some(secret);
    }
    if let Ok(secret) = std::env::var("STREAMGATE_SIGNATURE_SECRET") {
        config.security.signature_secret = Some(secret);
    }
    if let Ok(hosts) = std::env::var("STREAMGATE_ALLOWED_HOSTS") {
        config.security.allowed_hosts = hosts
            .split(',')
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();
    }
    if let Ok(url) = std::env::var("STREAMGATE_EXTRACTOR_URL") {
        config.upstream.extractor_url = Some(url);
    }
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.security.crypt_key.is_empty() {
        anyhow::bail!(
            "security.crypt_key is not set; generate one with `streamgate generate-key`"
        );
    }

    crate::token::decode_key(&config.security.crypt_key)
        .context("security.crypt_key is not a valid base64 32-byte key")?;

    regex::Regex::new(&config.rewrite.playback_pattern)
        .context("rewrite.playback_pattern is not a valid regex")?;
    regex::Regex::new(&config.rewrite.manifest_pattern)
        .context("rewrite.manifest_pattern is not a valid regex")?;

    if config.security.enforce_signature && config.security.signature_secret.is_none() {
        anyhow::bail!("security.enforce_signature requires security.signature_secret");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_fails_without_key() {
        let config = Config::default();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn config_with_key_validates() {
        let mut config = Config::default();
        config.security.crypt_key = crate::token::generate_key();
        validate_config(&config).unwrap();
    }

    #[test]
    fn signature_enforcement_requires_secret() {
        let mut config = Config::default();
        config.security.crypt_key = crate::token::generate_key();
        config.security.enforce_signature = true;
        assert!(validate_config(&config).is_err());
        config.security.signature_secret = Some("s".into());
        validate_config(&config).unwrap();
    }
}
