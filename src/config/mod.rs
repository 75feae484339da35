use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub mod model;

pub use model::{BotConfig, ReconnectConfig, ServerConfig, TranscriptConfig};

/// Environment variable that overrides `server.token` from the file.
pub const TOKEN_ENV: &str = "CRABMOD_OAUTH_TOKEN";

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crabmod")
        .join("config.toml")
}

/// Load the configuration from `path`, falling back to defaults when the
/// file does not exist. The result is normalised and ready to share.
pub fn load_config(path: &Path) -> Result<BotConfig> {
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: BotConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        config
    } else {
        debug!(path = %path.display(), "no config file, using defaults");
        BotConfig::default()
    };

    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.trim().is_empty() {
            config.server.token = token.trim().to_string();
        }
    }

    Ok(config.normalized())
}
