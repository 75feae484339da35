//! IRC protocol layer: line codec, command parsing, connection and outbound pacing.

pub mod codec;
pub mod commands;
pub mod connection;
pub mod limiter;

#[cfg(test)]
pub mod testing;
