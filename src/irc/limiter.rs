//! Global outbound chat cooldown.
//!
//! Every chat send goes through one [`RateLimiter`]. A send that arrives
//! during the cooldown waits for it instead of being dropped. The state lock
//! is a fair (FIFO) tokio mutex held across wait and write, so concurrent
//! senders transmit in the order they called [`RateLimiter::send`]. The
//! connection writer lock is taken only for the write itself, leaving the
//! keep-alive path free while someone waits out the cooldown.

use crate::error::SessionError;
use crate::irc::codec;
use crate::irc::connection::LineWriter;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

pub struct RateLimiter {
    min_interval: Duration,
    last_send_at: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_send_at: Mutex::new(None),
        }
    }

    /// Send `text` as a chat message to `channel` once the cooldown allows.
    ///
    /// Blank text is ignored and leaves the cooldown untouched; the return
    /// value says whether anything was transmitted. A failed write is not
    /// retried and does not restart the cooldown.
    pub async fn send(&self, channel: &str, text: &str, sink: &LineWriter) -> Result<bool, SessionError> {
        if text.trim().is_empty() {
            return Ok(false);
        }

        let mut last = self.last_send_at.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            if Instant::now() < ready_at {
                debug!(wait = ?(ready_at - Instant::now()), "cooldown active, waiting");
                tokio::time::sleep_until(ready_at).await;
            }
        }

        sink.write_line(&codec::format_privmsg(channel, text)).await?;
        *last = Some(Instant::now());
        info!("Bot: {}", text);
        Ok(true)
    }
}
