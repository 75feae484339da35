//! Session orchestration.
//!
//! Three producer tasks (stream reader, console forwarder, broadcast timer)
//! feed one event channel. The loop in [`run_connected`] consumes it and is
//! the only place chat is sent from, apart from keep-alive replies which the
//! reader writes itself. A single [`CancellationToken`] stops everything.

use crate::app::event::AppEvent;
use crate::app::handler::{Bot, Flow};
use crate::config::BotConfig;
use crate::error::SessionError;
use crate::irc::codec::{self, InboundEvent};
use crate::irc::connection::{LineReader, SessionConnection};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// How long producer tasks get to unwind after shutdown is signalled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Running,
    Closing,
}

fn enter(state: &mut SessionState, next: SessionState) {
    debug!(from = ?*state, to = ?next, "session state");
    *state = next;
}

/// Connect, authenticate and run until quit, cancellation or a fatal error.
pub async fn run(
    config: Arc<BotConfig>,
    console: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) -> Result<(), SessionError> {
    let mut state = SessionState::Connecting;
    let conn = SessionConnection::connect(&config.server, &config.reconnect, &cancel).await?;

    enter(&mut state, SessionState::Authenticating);
    if let Err(e) = conn.authenticate(&config.server).await {
        error!(error = %e, "handshake failed");
        enter(&mut state, SessionState::Closing);
        conn.close().await;
        return Err(e);
    }

    enter(&mut state, SessionState::Running);
    run_connected(config, conn, console, cancel).await
}

/// Drive an already authenticated connection.
pub async fn run_connected(
    config: Arc<BotConfig>,
    conn: SessionConnection,
    console: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) -> Result<(), SessionError> {
    let (reader, writer) = conn.into_parts();
    let bot = Arc::new(Bot::new(config.clone(), writer.clone()));
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AppEvent>();

    let tasks: Vec<(&'static str, JoinHandle<()>)> = vec![
        (
            "reader",
            tokio::spawn(read_stream(reader, bot.clone(), event_tx.clone(), cancel.clone())),
        ),
        (
            "console",
            tokio::spawn(forward_console(console, event_tx.clone(), cancel.clone())),
        ),
        (
            "broadcast",
            tokio::spawn(broadcast_timer(config.broadcast.interval(), event_tx.clone(), cancel.clone())),
        ),
    ];
    drop(event_tx);

    let mut state = SessionState::Running;
    info!(channel = %config.server.channel, "session running");
    let result = loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            event = event_rx.recv() => event,
        };
        let Some(event) = event else { break Ok(()) };

        // Cancellation is observed between events only; a send in progress
        // runs to completion.
        match handle_event(&bot, event).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    enter(&mut state, SessionState::Closing);
    if let Err(ref e) = result {
        error!(error = %e, "session failed");
    }
    cancel.cancel();
    if writer.close().await {
        info!("connection closed");
    }
    for (name, mut task) in tasks {
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
            Ok(Ok(())) => trace!(task = name, "task stopped"),
            Ok(Err(e)) => warn!(task = name, error = %e, "task failed"),
            Err(_) => {
                warn!(task = name, "task did not stop in time, aborting");
                task.abort();
            }
        }
    }
    result
}

async fn handle_event(bot: &Bot, event: AppEvent) -> Result<Flow, SessionError> {
    match event {
        AppEvent::Inbound(event) => bot.handle_inbound(event).await,
        AppEvent::Console(line) => bot.handle_console(&line).await,
        AppEvent::Broadcast => bot.broadcast().await.map(|_| Flow::Continue),
        AppEvent::Disconnected { reason } => Err(SessionError::Disconnected(reason)),
    }
}

/// Sole reader of the connection. Answers pings in place so keep-alives are
/// never stuck behind the chat cooldown.
async fn read_stream(
    mut reader: LineReader,
    bot: Arc<Bot>,
    events: mpsc::UnboundedSender<AppEvent>,
    cancel: CancellationToken,
) {
    let channel = bot.config().server.channel.clone();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = reader.next() => next,
        };
        let reason = match next {
            Some(Ok(line)) => match codec::parse_line(&line, &channel) {
                InboundEvent::Ping(token) => match bot.pong(&token).await {
                    Ok(()) => continue,
                    Err(e) => e.to_string(),
                },
                InboundEvent::Unrecognized(raw) => {
                    trace!(line = %raw, "unrecognized line");
                    continue;
                }
                event => {
                    if events.send(AppEvent::Inbound(event)).is_err() {
                        break;
                    }
                    continue;
                }
            },
            Some(Err(e)) => e.to_string(),
            None => "connection closed by server".to_string(),
        };
        let _ = events.send(AppEvent::Disconnected { reason });
        break;
    }
    debug!("reader stopped");
}

async fn forward_console(
    mut console: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<AppEvent>,
    cancel: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = console.recv() => line,
        };
        let Some(line) = line else {
            debug!("console input closed");
            break;
        };
        if events.send(AppEvent::Console(line)).is_err() {
            break;
        }
    }
}

async fn broadcast_timer(
    period: Option<Duration>,
    events: mpsc::UnboundedSender<AppEvent>,
    cancel: CancellationToken,
) {
    let Some(period) = period else {
        debug!("auto-broadcast disabled");
        return;
    };
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if events.send(AppEvent::Broadcast).is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irc::codec::{format_pong, format_privmsg};
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio_util::codec::{FramedRead, LinesCodec};

    struct Harness {
        server_lines: FramedRead<tokio::io::ReadHalf<DuplexStream>, LinesCodec>,
        server_write: tokio::io::WriteHalf<DuplexStream>,
        console: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
        session: JoinHandle<Result<(), SessionError>>,
    }

    fn start(configure: impl FnOnce(&mut BotConfig)) -> Harness {
        let mut config = BotConfig::default();
        config.server.channel = "#ajs94".into();
        config.moderation.min_send_interval_secs = 1;
        config.broadcast.interval_minutes = 0;
        configure(&mut config);
        let config = Arc::new(config.normalized());

        let (client, server) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);
        let conn = SessionConnection::from_parts(client_read, client_write);

        let (console, console_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let session = tokio::spawn(run_connected(config, conn, console_rx, cancel.clone()));
        Harness {
            server_lines: FramedRead::new(server_read, LinesCodec::new()),
            server_write,
            console,
            cancel,
            session,
        }
    }

    fn privmsg(text: &str) -> String {
        format_privmsg("#ajs94", text)
    }

    // Generous enough to cover a one-minute broadcast under paused time.
    async fn next_line(h: &mut Harness) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(120), h.server_lines.next())
            .await
            .expect("timed out waiting for a line")
            .map(|r| r.unwrap())
    }

    #[tokio::test]
    async fn test_console_quit_sends_farewell_and_stops() {
        let mut h = start(|_| {});
        h.console.send("!quit".into()).unwrap();

        assert_eq!(next_line(&mut h).await, Some(privmsg("Shutting down bot :(")));
        // Write half shut down: the peer sees end of stream.
        assert_eq!(next_line(&mut h).await, None);

        let result = tokio::time::timeout(Duration::from_secs(5), h.session).await.unwrap();
        assert!(result.unwrap().is_ok());
        assert!(h.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_ping_gets_single_pong() {
        let mut h = start(|_| {});
        h.server_write.write_all(b"PING :tmi.twitch.tv\r\n").await.unwrap();
        assert_eq!(next_line(&mut h).await, Some(format_pong("tmi.twitch.tv")));

        h.cancel.cancel();
        assert_eq!(next_line(&mut h).await, None);
        assert!(h.session.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_chat_command_round_trip() {
        let mut h = start(|c| c.moderation.moderators = vec!["alice".into()]);
        h.server_write
            .write_all(b":alice!alice@alice.tmi.twitch.tv PRIVMSG #ajs94 :!ban eve\r\n")
            .await
            .unwrap();
        assert_eq!(next_line(&mut h).await, Some(privmsg("/ban eve")));
        assert_eq!(next_line(&mut h).await, Some(privmsg("Banned user: eve")));
        h.cancel.cancel();
        assert!(h.session.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_server_hangup_is_fatal() {
        let h = start(|_| {});
        drop(h.server_write);
        drop(h.server_lines);
        let result = tokio::time::timeout(Duration::from_secs(5), h.session).await.unwrap();
        assert!(matches!(result.unwrap(), Err(SessionError::Disconnected(_))));
        assert!(h.cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_broadcast() {
        let mut h = start(|c| {
            c.broadcast.interval_minutes = 1;
            c.broadcast.text = "follow the rules".into();
        });
        assert_eq!(next_line(&mut h).await, Some(privmsg("follow the rules")));
        assert_eq!(next_line(&mut h).await, Some(privmsg("follow the rules")));
        h.cancel.cancel();
        assert!(h.session.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_undecodable_line_does_not_end_session() {
        let mut h = start(|_| {});
        h.server_write
            .write_all(b":bob!bob@bob.tmi.twitch.tv PRIVMSG #ajs94 :caf\xe9\r\nPING :tmi.twitch.tv\r\n")
            .await
            .unwrap();
        assert_eq!(next_line(&mut h).await, Some(format_pong("tmi.twitch.tv")));

        h.cancel.cancel();
        assert_eq!(next_line(&mut h).await, None);
        assert!(h.session.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_lets_pending_send_finish() {
        let mut h = start(|_| {});
        h.console.send("one".into()).unwrap();
        h.console.send("two".into()).unwrap();
        assert_eq!(next_line(&mut h).await, Some(privmsg("one")));

        // The second send is now waiting out the cooldown.
        tokio::time::sleep(Duration::from_millis(500)).await;
        h.cancel.cancel();
        assert_eq!(next_line(&mut h).await, Some(privmsg("two")));
        assert_eq!(next_line(&mut h).await, None);
        assert!(h.session.await.unwrap().is_ok());
    }
}
