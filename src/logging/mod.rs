//! Chat transcript logging to disk.
//!
//! When enabled, writes the channel's chat, presence changes and the bot's
//! own messages to daily files named `<channel>_<date>.log` in the configured
//! directory (default: `~/.local/share/crabmod/logs/`).

use crate::config::TranscriptConfig;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Chat,
    Join,
    Part,
}

/// Appends transcript lines to per-day files.
///
/// File handles are cached for the lifetime of the logger. A file that cannot
/// be opened disables writing for that day with a single warning.
pub struct TranscriptLogger {
    enabled: bool,
    log_dir: PathBuf,
    channel: String,
    file_handles: HashMap<String, Option<fs::File>>,
}

impl TranscriptLogger {
    pub fn new(config: &TranscriptConfig, channel: &str) -> Self {
        Self {
            enabled: config.enabled,
            log_dir: expand_home(&config.dir),
            channel: channel.to_string(),
            file_handles: HashMap::new(),
        }
    }

    pub fn record(&mut self, kind: EntryKind, user: &str, text: &str) {
        if !self.enabled {
            return;
        }

        let now = chrono::Local::now();
        let timestamp = now.format("%H:%M:%S");
        let line = match kind {
            EntryKind::Chat => format!("[{}] <{}> {}", timestamp, user, text),
            EntryKind::Join => format!("[{}] *** {} joined", timestamp, user),
            EntryKind::Part => format!("[{}] *** {} left", timestamp, user),
        };

        // Sanitize channel for filename
        let safe_channel: String = self
            .channel
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let filename = format!("{}_{}.log", safe_channel, now.format("%Y-%m-%d"));

        let log_dir = &self.log_dir;
        let handle = self.file_handles.entry(filename.clone()).or_insert_with(|| {
            let path = log_dir.join(&filename);
            let opened = fs::create_dir_all(log_dir).and_then(|_| {
                OpenOptions::new().create(true).append(true).open(&path)
            });
            match opened {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot open transcript file");
                    None
                }
            }
        });

        if let Some(file) = handle {
            let _ = writeln!(file, "{}", line);
        }
    }
}

fn expand_home(dir: &str) -> PathBuf {
    match dir.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(dir)),
        None => PathBuf::from(dir),
    }
}
