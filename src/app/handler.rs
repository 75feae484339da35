//! Event handling: inbound protocol events, console lines and moderation.
//!
//! [`Bot`] owns the send side of the session. Every chat line it produces
//! goes through the shared [`RateLimiter`]; only keep-alive replies bypass it.

use crate::app::moderation::{
    refusal_message, rejection_message, LinkFilter, ModerationAction, ModerationOutcome, ModeratorSet,
};
use crate::config::BotConfig;
use crate::error::SessionError;
use crate::irc::codec::{self, InboundEvent};
use crate::irc::commands::{parse_command, strip_mention, Command, Origin};
use crate::irc::connection::LineWriter;
use crate::irc::limiter::RateLimiter;
use crate::logging::{EntryKind, TranscriptLogger};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, trace, warn};

/// Whether the event loop should keep running after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// What [`Bot::dispatch`] did with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The issuer is not a moderator; a rejection was sent.
    Rejected,
    Moderated(ModerationOutcome),
    Quit,
}

pub struct Bot {
    config: Arc<BotConfig>,
    moderators: ModeratorSet,
    links: LinkFilter,
    limiter: RateLimiter,
    writer: LineWriter,
    transcript: Mutex<TranscriptLogger>,
}

impl Bot {
    pub fn new(config: Arc<BotConfig>, writer: LineWriter) -> Self {
        let transcript = TranscriptLogger::new(&config.transcript, &config.server.channel);
        Self {
            moderators: ModeratorSet::from_config(&config),
            links: LinkFilter::new(config.moderation.link_suffixes.iter().cloned()),
            limiter: RateLimiter::new(config.moderation.min_send_interval()),
            config,
            writer,
            transcript: Mutex::new(transcript),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    fn record(&self, kind: EntryKind, user: &str, text: &str) {
        if let Ok(mut transcript) = self.transcript.lock() {
            transcript.record(kind, user, text);
        }
    }

    /// Rate-limited chat message to the channel.
    pub async fn say(&self, text: &str) -> Result<bool, SessionError> {
        let sent = self
            .limiter
            .send(&self.config.server.channel, text, &self.writer)
            .await?;
        if sent {
            self.record(EntryKind::Chat, &self.config.server.nickname, text);
        }
        Ok(sent)
    }

    /// Keep-alive reply. Written immediately, outside the cooldown.
    pub async fn pong(&self, token: &str) -> Result<(), SessionError> {
        trace!(token = %token, "PONG");
        self.writer.write_line(&codec::format_pong(token)).await
    }

    pub async fn broadcast(&self) -> Result<(), SessionError> {
        self.say(&self.config.broadcast.text).await.map(|_| ())
    }

    pub async fn handle_inbound(&self, event: InboundEvent) -> Result<Flow, SessionError> {
        match event {
            InboundEvent::Ping(token) => self.pong(&token).await?,
            InboundEvent::UserJoined(user) => {
                info!(user = %user, "user joined");
                self.record(EntryKind::Join, &user, "");
                if self.config.moderation.announce_presence {
                    self.say(&format!("PogChamp User Joined: {}", user)).await?;
                }
            }
            InboundEvent::UserLeft(user) => {
                info!(user = %user, "user left");
                self.record(EntryKind::Part, &user, "");
                if self.config.moderation.announce_presence {
                    self.say(&format!("BibleThump User Left: {}", user)).await?;
                }
            }
            InboundEvent::ChatLine { user, text, is_command } => {
                debug!(user = %user, text = %text, "chat");
                self.record(EntryKind::Chat, &user, &text);
                if is_command {
                    match parse_command(&text, Origin::Chat) {
                        Some(command) => {
                            self.dispatch(&user, command).await?;
                        }
                        None => debug!(user = %user, text = %text, "ignoring unknown or malformed command"),
                    }
                } else if self.links.contains_link(&text) {
                    info!(user = %user, "link posted, timing out");
                    self.timeout(&user).await?;
                }
            }
            InboundEvent::Unrecognized(raw) => trace!(line = %raw, "unrecognized line"),
        }
        Ok(Flow::Continue)
    }

    /// Handle one console line: `!quit`, a `!` command issued as the channel
    /// owner, or plain chat.
    pub async fn handle_console(&self, line: &str) -> Result<Flow, SessionError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.starts_with(codec::COMMAND_PREFIX) {
            let Some(command) = parse_command(line, Origin::Console) else {
                warn!(line = %line, "unknown or malformed console command");
                return Ok(Flow::Continue);
            };
            let owner = self.moderators.owner().to_string();
            return match self.dispatch(&owner, command).await? {
                DispatchOutcome::Quit => Ok(Flow::Quit),
                _ => Ok(Flow::Continue),
            };
        }
        self.say(line).await?;
        Ok(Flow::Continue)
    }

    /// Authorize `issuer` and carry out `command`.
    pub async fn dispatch(&self, issuer: &str, command: Command) -> Result<DispatchOutcome, SessionError> {
        if !self.moderators.is_moderator(issuer) {
            info!(issuer = %issuer, command = ?command, "rejected command from non-moderator");
            self.say(&rejection_message(issuer)).await?;
            return Ok(DispatchOutcome::Rejected);
        }

        let (outcome, target) = match command {
            Command::Timeout { target } => (self.timeout(&target).await?, target),
            Command::Ban { target } => (self.ban(&target).await?, target),
            Command::Unban { target } => (self.unban(&target).await?, target),
            Command::Quit => {
                info!(issuer = %issuer, "quit requested");
                self.say(&self.config.moderation.farewell_message).await?;
                return Ok(DispatchOutcome::Quit);
            }
        };

        if outcome == ModerationOutcome::Refused {
            self.say(&refusal_message(issuer, strip_mention(&target))).await?;
        }
        Ok(DispatchOutcome::Moderated(outcome))
    }

    pub async fn timeout(&self, target: &str) -> Result<ModerationOutcome, SessionError> {
        self.moderate(ModerationAction::Timeout, target).await
    }

    pub async fn ban(&self, target: &str) -> Result<ModerationOutcome, SessionError> {
        self.moderate(ModerationAction::Ban, target).await
    }

    pub async fn unban(&self, target: &str) -> Result<ModerationOutcome, SessionError> {
        self.moderate(ModerationAction::Unban, target).await
    }

    /// Send the directive and its confirmation, unless the target is
    /// privileged.
    async fn moderate(&self, action: ModerationAction, target: &str) -> Result<ModerationOutcome, SessionError> {
        let target = strip_mention(target);
        if self.moderators.is_moderator(target) {
            warn!(target = %target, action = ?action, "refusing to punish a moderator");
            return Ok(ModerationOutcome::Refused);
        }
        self.say(&action.directive(target)).await?;
        self.say(&action.confirmation(target)).await?;
        Ok(ModerationOutcome::Applied)
    }
}
