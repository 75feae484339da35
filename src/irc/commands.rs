//! Moderation command parser.
//!
//! Parses `!command target` lines into typed [`Command`] values. Lines from
//! chat may still carry the protocol's `:` trailing marker in front of the
//! `!`; console lines never do.

/// A parsed moderation command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Timeout { target: String },
    Ban { target: String },
    Unban { target: String },
    /// Shut the bot down. Only accepted from the console.
    Quit,
}

/// Where a command line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Chat,
    Console,
}

/// Drop the `@` chat uses to mention a user.
pub fn strip_mention(name: &str) -> &str {
    name.trim_start_matches('@')
}

/// Parse a command line into a [`Command`].
///
/// Returns `None` if the input is not a `!` command, names an unknown
/// keyword, or lacks its target argument. Keywords are case-insensitive. A
/// leading `@` mention marker is dropped from the target, otherwise it is
/// passed through as written. On the console any keyword starting with
/// `quit` shuts the bot down.
pub fn parse_command(input: &str, origin: Origin) -> Option<Command> {
    let input = input.trim();
    let input = input.strip_prefix(':').unwrap_or(input);
    let body = input.strip_prefix(crate::irc::codec::COMMAND_PREFIX)?;

    let mut parts = body.split_whitespace();
    let cmd = parts.next()?.to_lowercase();
    let target = parts
        .next()
        .map(strip_mention)
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string());

    match cmd.as_str() {
        "timeout" => Some(Command::Timeout { target: target? }),
        "ban" => Some(Command::Ban { target: target? }),
        "unban" => Some(Command::Unban { target: target? }),
        c if origin == Origin::Console && c.starts_with("quit") => Some(Command::Quit),
        _ => None,
    }
}
