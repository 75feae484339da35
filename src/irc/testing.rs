//! In-memory write sink that timestamps every line written to it.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tokio::time::Instant;

#[derive(Clone, Default)]
pub struct Recorder {
    state: Arc<Mutex<RecorderState>>,
}

#[derive(Default)]
struct RecorderState {
    partial: Vec<u8>,
    lines: Vec<(Instant, String)>,
    fail: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail with a broken pipe.
    pub fn break_pipe(&self) {
        self.state.lock().unwrap().fail = true;
    }

    pub fn lines(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .lines
            .iter()
            .map(|(_, l)| l.clone())
            .collect()
    }

    pub fn timed_lines(&self) -> Vec<(Instant, String)> {
        self.state.lock().unwrap().lines.clone()
    }
}

impl AsyncWrite for Recorder {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let mut state = self.state.lock().unwrap();
        if state.fail {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        state.partial.extend_from_slice(buf);
        while let Some(pos) = state.partial.windows(2).position(|w| w == b"\r\n") {
            let line: Vec<u8> = state.partial.drain(..pos + 2).collect();
            let text = String::from_utf8_lossy(&line[..pos]).into_owned();
            state.lines.push((Instant::now(), text));
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
