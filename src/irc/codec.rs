//! Line-level protocol codec.
//!
//! Turns one raw inbound line into an [`InboundEvent`] and builds the outbound
//! directives the bot writes. Parsing never fails: any line whose shape is not
//! understood becomes [`InboundEvent::Unrecognized`].
//!
//! Line terminators are not part of any value produced or consumed here; the
//! transport strips them on read and the writer appends `\r\n`.

use irc::proto::{Command, Message, Prefix};

/// A typed event built from one raw inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Keep-alive request. The token is echoed back in the reply.
    Ping(String),
    UserJoined(String),
    UserLeft(String),
    /// A chat message in the joined channel. `is_command` is set when the body
    /// starts with the command prefix and should go to the command processor.
    ChatLine {
        user: String,
        text: String,
        is_command: bool,
    },
    Unrecognized(String),
}

pub const COMMAND_PREFIX: char = '!';

const PING: &str = "PING";

/// Classify one raw line received for `channel`.
pub fn parse_line(raw: &str, channel: &str) -> InboundEvent {
    let line = raw.trim_end_matches(['\r', '\n']);

    if let Some(rest) = line.strip_prefix(PING) {
        if rest.is_empty() || rest.starts_with(' ') {
            return InboundEvent::Ping(ping_token(line));
        }
    }

    parse_user_line(line, channel).unwrap_or_else(|| InboundEvent::Unrecognized(raw.to_string()))
}

fn ping_token(line: &str) -> String {
    match line.parse::<Message>() {
        Ok(Message {
            command: Command::PING(token, _),
            ..
        }) => token,
        _ => String::new(),
    }
}

fn parse_user_line(line: &str, channel: &str) -> Option<InboundEvent> {
    let (user, message) = split_source(line)?;

    match message.command {
        Command::JOIN(target, _, _) if target.eq_ignore_ascii_case(channel) => Some(InboundEvent::UserJoined(user)),
        Command::PART(target, _) if target.eq_ignore_ascii_case(channel) => Some(InboundEvent::UserLeft(user)),
        Command::PRIVMSG(target, text) if target.eq_ignore_ascii_case(channel) => {
            let is_command = text.starts_with(COMMAND_PREFIX);
            Some(InboundEvent::ChatLine { user, text, is_command })
        }
        _ => None,
    }
}

/// Split a line into the sending user and the rest of the message.
///
/// The usual `:nick!user@host` source goes through the protocol parser. Some
/// relays send a bare `user@host` source without the leading colon; that form
/// is split by hand and only the remainder is parsed.
fn split_source(line: &str) -> Option<(String, Message)> {
    let body = strip_tags(line);
    if body.starts_with(':') {
        let message = line.parse::<Message>().ok()?;
        let user = match message.prefix {
            Some(Prefix::Nickname(ref nick, _, ref host)) if !nick.is_empty() && !host.is_empty() => nick.clone(),
            _ => return None,
        };
        return Some((user, message));
    }

    let (source, rest) = body.split_once(' ')?;
    let (identity, _host) = source.split_once('@')?;
    let nick = identity.split('!').next().unwrap_or(identity);
    if nick.is_empty() {
        return None;
    }
    Some((nick.to_string(), rest.parse::<Message>().ok()?))
}

fn strip_tags(line: &str) -> &str {
    match line.strip_prefix('@') {
        Some(tagged) => tagged.split_once(' ').map(|(_, rest)| rest).unwrap_or(""),
        None => line,
    }
}

/// Remove characters that would let chat text smuggle extra directives.
pub fn sanitize(text: &str) -> String {
    text.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

pub fn format_privmsg(channel: &str, text: &str) -> String {
    String::from(&Command::PRIVMSG(channel.to_string(), sanitize(text)))
}

/// Recover `(target, text)` from an outbound chat line.
pub fn privmsg_body(line: &str) -> Option<(String, String)> {
    match line.parse::<Message>().ok()?.command {
        Command::PRIVMSG(target, text) => Some((target, text)),
        _ => None,
    }
}

pub fn format_pong(token: &str) -> String {
    String::from(&Command::PONG(sanitize(token), None))
}

pub fn format_pass(token: &str) -> String {
    let token = if token.starts_with("oauth:") {
        token.to_string()
    } else {
        format!("oauth:{}", token)
    };
    String::from(&Command::PASS(token))
}

pub fn format_nick(nickname: &str) -> String {
    String::from(&Command::NICK(nickname.to_string()))
}

pub fn format_join(channel: &str) -> String {
    String::from(&Command::JOIN(channel.to_string(), None, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAN: &str = "#ajs94";

    fn command_of(line: &str) -> Command {
        line.parse::<Message>().unwrap().command
    }

    #[test]
    fn test_ping_carries_token() {
        assert_eq!(
            parse_line("PING :tmi.twitch.tv", CHAN),
            InboundEvent::Ping("tmi.twitch.tv".into())
        );
        assert_eq!(parse_line("PING tmi.twitch.tv\r\n", CHAN), InboundEvent::Ping("tmi.twitch.tv".into()));
        assert_eq!(parse_line("PING", CHAN), InboundEvent::Ping(String::new()));
        // Not a ping: the keyword must be a whole token.
        assert!(matches!(parse_line("PINGU x", CHAN), InboundEvent::Unrecognized(_)));
    }

    #[test]
    fn test_join_and_part() {
        assert_eq!(
            parse_line(":neonfox!neonfox@neonfox.tmi.twitch.tv JOIN #ajs94", CHAN),
            InboundEvent::UserJoined("neonfox".into())
        );
        assert_eq!(
            parse_line(":neonfox!neonfox@neonfox.tmi.twitch.tv PART #ajs94", CHAN),
            InboundEvent::UserLeft("neonfox".into())
        );
    }

    #[test]
    fn test_presence_in_other_channel_is_ignored() {
        assert!(matches!(
            parse_line(":a!a@a.tmi.twitch.tv JOIN #elsewhere", CHAN),
            InboundEvent::Unrecognized(_)
        ));
    }

    #[test]
    fn test_chat_line_and_command_flag() {
        assert_eq!(
            parse_line(":bob!bob@bob.tmi.twitch.tv PRIVMSG #ajs94 :hello there", CHAN),
            InboundEvent::ChatLine {
                user: "bob".into(),
                text: "hello there".into(),
                is_command: false,
            }
        );
        assert_eq!(
            parse_line(":bob!bob@bob.tmi.twitch.tv PRIVMSG #ajs94 :!ban eve", CHAN),
            InboundEvent::ChatLine {
                user: "bob".into(),
                text: "!ban eve".into(),
                is_command: true,
            }
        );
        // A single-word body may arrive without the trailing marker.
        assert!(matches!(
            parse_line(":bob!bob@bob.tmi.twitch.tv PRIVMSG #AJS94 hi", CHAN),
            InboundEvent::ChatLine { ref text, .. } if text == "hi"
        ));
    }

    #[test]
    fn test_bare_user_prefix() {
        assert_eq!(
            parse_line("user1@host.tmi.twitch.tv PRIVMSG #chan :check out spam.com", "#chan"),
            InboundEvent::ChatLine {
                user: "user1".into(),
                text: "check out spam.com".into(),
                is_command: false,
            }
        );
    }

    #[test]
    fn test_tagged_line() {
        let line = "@badge-info=;color=#FF0000;mod=0 :bob!bob@bob.tmi.twitch.tv PRIVMSG #ajs94 :hi";
        assert!(matches!(
            parse_line(line, CHAN),
            InboundEvent::ChatLine { ref user, .. } if user == "bob"
        ));
    }

    #[test]
    fn test_link_only_body_is_chat() {
        assert!(matches!(
            parse_line(":bob!bob@bob.tmi.twitch.tv PRIVMSG #ajs94 :.com", CHAN),
            InboundEvent::ChatLine { ref text, .. } if text == ".com"
        ));
    }

    #[test]
    fn test_wrong_shapes_are_unrecognized() {
        for line in [
            "",
            ":tmi.twitch.tv 001 crabmod :Welcome, GLHF!",
            ":bob!bob@bob.tmi.twitch.tv PRIVMSG",
            ":bob!bob@bob.tmi.twitch.tv PRIVMSG #ajs94",
            ":bob!bob@bob.tmi.twitch.tv",
            "@ PRIVMSG #ajs94 :x",
            ":crabmod.tmi.twitch.tv 353 crabmod = #ajs94 :crabmod",
        ] {
            assert!(
                matches!(parse_line(line, CHAN), InboundEvent::Unrecognized(_)),
                "expected unrecognized: {line:?}"
            );
        }
    }

    #[test]
    fn test_privmsg_loopback() {
        for text in ["hello", "", " : colon inside :", "!timeout bob", "ünïcödé", ":leading"] {
            let line = format_privmsg(CHAN, text);
            assert_eq!(privmsg_body(&line), Some((CHAN.to_string(), text.to_string())));

            let inbound = format!(":bob!bob@bob.tmi.twitch.tv {}", line);
            match parse_line(&inbound, CHAN) {
                InboundEvent::ChatLine { text: got, .. } => assert_eq!(got, text),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_outbound_strips_line_breaks() {
        let line = format_privmsg(CHAN, "hi\r\nPRIVMSG #x :injected");
        assert!(!line.contains(['\r', '\n']));
        assert_eq!(
            privmsg_body(&line),
            Some((CHAN.to_string(), "hiPRIVMSG #x :injected".to_string()))
        );
    }

    #[test]
    fn test_privmsg_body_rejects_other_commands() {
        assert_eq!(privmsg_body(&format_join(CHAN)), None);
        assert_eq!(privmsg_body(""), None);
    }

    #[test]
    fn test_handshake_directives() {
        assert_eq!(command_of(&format_pass("abc123")), Command::PASS("oauth:abc123".into()));
        assert_eq!(command_of(&format_pass("oauth:abc123")), Command::PASS("oauth:abc123".into()));
        assert_eq!(command_of(&format_nick("crabmod")), Command::NICK("crabmod".into()));
        assert_eq!(command_of(&format_join(CHAN)), Command::JOIN(CHAN.into(), None, None));
        assert_eq!(command_of(&format_pong("tmi.twitch.tv")), Command::PONG("tmi.twitch.tv".into(), None));
    }
}
