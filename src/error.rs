//! Session error taxonomy.
//!
//! Parse anomalies, malformed commands and authorization denials are not
//! errors: they are absorbed where they occur. Everything here ends the
//! session, except [`SessionError::Connect`] which the dialer retries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// A single dial attempt failed. Retried with backoff.
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gave up connecting to {addr} after {attempts} attempts")]
    ConnectExhausted { addr: String, attempts: u32 },

    #[error("handshake failed while sending {step}: {source}")]
    Handshake {
        step: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("connection i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("disconnected: {0}")]
    Disconnected(String),

    #[error("connection closed")]
    Closed,

    #[error("shutdown requested")]
    Cancelled,
}

impl SessionError {
    /// Whether the dialer may try again after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::Connect { .. })
    }
}
