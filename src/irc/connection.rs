//! Socket lifecycle: dial with backoff, handshake, line framing and close.

use crate::config::{ReconnectConfig, ServerConfig};
use crate::error::SessionError;
use crate::irc::codec;
use bytes::BytesMut;
use rand::RngExt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest inbound line accepted, tags included.
pub const MAX_LINE_LEN: usize = 8192;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub type LineReader = FramedRead<BoxedReader, ChatLineCodec>;

/// Newline framing for the inbound stream.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected, and a
/// line longer than `max_len` is dropped up to its terminator. Neither ends
/// the stream; only transport errors do.
#[derive(Debug)]
pub struct ChatLineCodec {
    max_len: usize,
    next_index: usize,
    discarding: bool,
}

impl ChatLineCodec {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            next_index: 0,
            discarding: false,
        }
    }

    fn finish(line: &[u8]) -> String {
        String::from_utf8_lossy(line).trim_end_matches(['\r', '\n']).to_string()
    }
}

impl Decoder for ChatLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<String>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_len {
                    if !self.discarding {
                        warn!(limit = self.max_len, "skipping over-long line");
                    }
                    self.discarding = true;
                    src.clear();
                    self.next_index = 0;
                } else {
                    self.next_index = src.len();
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if line.len() > self.max_len {
                warn!(limit = self.max_len, len = line.len(), "skipping over-long line");
                continue;
            }
            return Ok(Some(Self::finish(&line)));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<String>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if src.is_empty() || std::mem::take(&mut self.discarding) {
            src.clear();
            return Ok(None);
        }
        let rest = src.split_to(src.len());
        Ok(Some(Self::finish(&rest)))
    }
}

/// The single write path to the connection.
///
/// Each call to [`LineWriter::write_line`] holds the lock for exactly one
/// line, so concurrent writers never interleave partial directives.
#[derive(Clone)]
pub struct LineWriter {
    inner: Arc<Mutex<Option<BoxedWriter>>>,
}

impl LineWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(writer)))),
        }
    }

    /// Write `line` followed by `\r\n` and flush.
    pub async fn write_line(&self, line: &str) -> Result<(), SessionError> {
        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or(SessionError::Closed)?;
        let mut framed = String::with_capacity(line.len() + 2);
        framed.push_str(line);
        framed.push_str("\r\n");
        writer.write_all(framed.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Shut down the write half. Returns `true` only for the call that
    /// actually closed it.
    pub async fn close(&self) -> bool {
        let taken = self.inner.lock().await.take();
        match taken {
            Some(mut writer) => {
                if let Err(e) = writer.shutdown().await {
                    debug!(error = %e, "shutdown of write half failed");
                }
                true
            }
            None => false,
        }
    }
}

/// An established connection, split into its framed read half and the shared
/// writer.
pub struct SessionConnection {
    reader: LineReader,
    writer: LineWriter,
}

impl SessionConnection {
    pub fn from_parts<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        Self {
            reader: FramedRead::new(reader, ChatLineCodec::new(MAX_LINE_LEN)),
            writer: LineWriter::new(writer),
        }
    }

    /// Dial the server, retrying transient failures with bounded exponential
    /// backoff until `reconnect.max_attempts` is exhausted or `cancel` fires.
    pub async fn connect(
        server: &ServerConfig,
        reconnect: &ReconnectConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, SessionError> {
        let addr = server.address();
        let mut failures: u32 = 0;
        loop {
            info!(addr = %addr, "connecting");
            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                result = dial(&addr) => result,
            };
            let err = match attempt {
                Ok(stream) => {
                    info!(addr = %addr, "connected");
                    let (read_half, write_half) = stream.into_split();
                    return Ok(Self::from_parts(read_half, write_half));
                }
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            failures += 1;
            let delay = match backoff_delay(reconnect, failures) {
                Backoff::Retry(delay) => with_jitter(delay),
                Backoff::GiveUp => {
                    return Err(SessionError::ConnectExhausted {
                        addr,
                        attempts: failures,
                    })
                }
            };
            warn!(error = %err, attempt = failures, retry_in = ?delay, "connect failed");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Send the credential, nickname and channel-join directives, in that
    /// order. Any failed write is fatal for the session.
    pub async fn authenticate(&self, server: &ServerConfig) -> Result<(), SessionError> {
        let steps = [
            ("PASS", codec::format_pass(&server.token)),
            ("NICK", codec::format_nick(&server.nickname)),
            ("JOIN", codec::format_join(&server.channel)),
        ];
        for (step, line) in steps {
            self.writer.write_line(&line).await.map_err(|e| match e {
                SessionError::Io(source) => SessionError::Handshake { step, source },
                other => other,
            })?;
        }
        info!(channel = %server.channel, nickname = %server.nickname, "handshake sent");
        Ok(())
    }

    pub fn into_parts(self) -> (LineReader, LineWriter) {
        (self.reader, self.writer)
    }

    pub async fn close(&self) -> bool {
        self.writer.close().await
    }
}

async fn dial(addr: &str) -> Result<TcpStream, SessionError> {
    TcpStream::connect(addr)
        .await
        .map_err(|source| SessionError::Connect {
            addr: addr.to_string(),
            source,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Retry(Duration),
    GiveUp,
}

/// Delay before the next dial after `failures` consecutive failures:
/// `base * 2^(failures - 1)`, capped at `max_delay_secs`.
pub fn backoff_delay(reconnect: &ReconnectConfig, failures: u32) -> Backoff {
    if reconnect.max_attempts != 0 && failures >= reconnect.max_attempts {
        return Backoff::GiveUp;
    }
    let exponent = failures.saturating_sub(1).min(16);
    let secs = reconnect
        .base_delay_secs
        .saturating_mul(1u64 << exponent)
        .min(reconnect.max_delay_secs);
    Backoff::Retry(Duration::from_secs(secs))
}

/// Add up to a quarter of `delay` of random jitter.
fn with_jitter(delay: Duration) -> Duration {
    let spread = (delay.as_millis() / 4) as u64;
    if spread == 0 {
        return delay;
    }
    let mut rng = rand::rng();
    delay + Duration::from_millis(rng.random_range(0..=spread))
}
