//! Moderation policy: who may moderate, what counts as a link, and the
//! directives each action produces.

use crate::config::BotConfig;
use crate::irc::commands::strip_mention;
use std::collections::HashSet;

/// Usernames allowed to issue moderation commands, plus the channel owner.
#[derive(Debug, Clone)]
pub struct ModeratorSet {
    owner: String,
    moderators: HashSet<String>,
}

impl ModeratorSet {
    pub fn new(owner: &str, moderators: impl IntoIterator<Item = String>) -> Self {
        Self {
            owner: owner.to_lowercase(),
            moderators: moderators.into_iter().map(|m| m.to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.owner(), config.moderation.moderators.iter().cloned())
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Case-insensitive, and a leading `@` mention marker is ignored.
    pub fn is_moderator(&self, username: &str) -> bool {
        let username = strip_mention(username).to_lowercase();
        username == self.owner || self.moderators.contains(&username)
    }
}

/// Suffix-based link detector.
#[derive(Debug, Clone)]
pub struct LinkFilter {
    suffixes: Vec<String>,
}

impl LinkFilter {
    pub fn new(suffixes: impl IntoIterator<Item = String>) -> Self {
        Self {
            suffixes: suffixes
                .into_iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn contains_link(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.suffixes.iter().any(|suffix| text.contains(suffix.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    Timeout,
    Ban,
    Unban,
}

impl ModerationAction {
    /// The chat directive the server interprets.
    pub fn directive(self, target: &str) -> String {
        match self {
            ModerationAction::Timeout => format!("/timeout {}", target),
            ModerationAction::Ban => format!("/ban {}", target),
            ModerationAction::Unban => format!("/unban {}", target),
        }
    }

    pub fn confirmation(self, target: &str) -> String {
        match self {
            ModerationAction::Timeout => format!("Timed out user: {}", target),
            ModerationAction::Ban => format!("Banned user: {}", target),
            ModerationAction::Unban => format!("Unbanned user: {}", target),
        }
    }
}

/// Result of a moderation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationOutcome {
    Applied,
    /// The target is privileged; nothing was sent to the server.
    Refused,
}

pub fn refusal_message(issuer: &str, target: &str) -> String {
    format!("@{} {} is a moderator, unmod before punishing", issuer, target)
}

pub fn rejection_message(issuer: &str) -> String {
    format!("You are not a mod {}", issuer)
}
