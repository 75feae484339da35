//! Configuration data model.
//!
//! All structs derive `Serialize`/`Deserialize` for TOML persistence.
//! Every field has a sensible default so the bot starts with an almost empty
//! file; only the channel and the credential token really need to be set.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root bot configuration. Immutable once the session starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub transcript: TranscriptConfig,
}

impl BotConfig {
    /// Canonicalise user-supplied values: the channel always carries its `#`
    /// and names are compared in lowercase on the wire.
    pub fn normalized(mut self) -> Self {
        let bare = self.server.channel.trim().trim_start_matches('#').to_lowercase();
        self.server.channel = format!("#{}", bare);
        self.server.nickname = self.server.nickname.trim().to_lowercase();
        self.moderation.moderators = self
            .moderation
            .moderators
            .iter()
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        self
    }

    /// The channel owner is the channel name without its `#`.
    pub fn owner(&self) -> &str {
        self.server.channel.trim_start_matches('#')
    }
}

/// Where and as whom to connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_nickname")]
    pub nickname: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    /// OAuth token, with or without the `oauth:` prefix.
    #[serde(default)]
    pub token: String,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            nickname: default_nickname(),
            channel: default_channel(),
            token: String::new(),
        }
    }
}

/// Periodic message posted to the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_broadcast_text")]
    pub text: String,
    /// Minutes between broadcasts. Zero disables the broadcast.
    #[serde(default = "default_broadcast_interval")]
    pub interval_minutes: u64,
}

impl BroadcastConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_minutes > 0).then(|| Duration::from_secs(self.interval_minutes * 60))
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            text: default_broadcast_text(),
            interval_minutes: default_broadcast_interval(),
        }
    }
}

/// Moderation policy and outbound pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    #[serde(default)]
    pub moderators: Vec<String>,
    #[serde(default = "default_link_suffixes")]
    pub link_suffixes: Vec<String>,
    #[serde(default = "default_min_send_interval")]
    pub min_send_interval_secs: u64,
    #[serde(default = "default_true")]
    pub announce_presence: bool,
    #[serde(default = "default_farewell")]
    pub farewell_message: String,
}

impl ModerationConfig {
    pub fn min_send_interval(&self) -> Duration {
        Duration::from_secs(self.min_send_interval_secs)
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            moderators: Vec::new(),
            link_suffixes: default_link_suffixes(),
            min_send_interval_secs: default_min_send_interval(),
            announce_presence: true,
            farewell_message: default_farewell(),
        }
    }
}

/// Dial retry policy: bounded exponential backoff with jitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    /// Give up after this many failed dials. Zero retries forever.
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            max_attempts: 0,
        }
    }
}

/// Chat transcript settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_transcript_dir")]
    pub dir: String,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_transcript_dir(),
        }
    }
}

fn default_host() -> String {
    "irc.chat.twitch.tv".to_string()
}
fn default_port() -> u16 {
    6667
}
fn default_nickname() -> String {
    "crabmod".to_string()
}
fn default_channel() -> String {
    "#crabmod".to_string()
}
fn default_true() -> bool {
    true
}
fn default_broadcast_text() -> String {
    "This is an automessage message".to_string()
}
fn default_broadcast_interval() -> u64 {
    5
}
fn default_link_suffixes() -> Vec<String> {
    [".com", ".net", ".org", ".tv", ".fm", ".gg"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_min_send_interval() -> u64 {
    3
}
fn default_farewell() -> String {
    "Shutting down bot :(".to_string()
}
fn default_base_delay() -> u64 {
    10
}
fn default_max_delay() -> u64 {
    300
}
fn default_transcript_dir() -> String {
    "~/.local/share/crabmod/logs".to_string()
}
