//! Seams to the outside world.
//!
//! The connection engine performs no network I/O itself: it consumes framed
//! byte messages from an injected transport (in production a TLS WebSocket,
//! in tests an in-memory channel pair) and reports lifecycle events to the
//! service hub.

use std::future::Future;
use std::io;

use bytes::Bytes;

/// A message-framed transport carrying SHIP frames.
///
/// WebSocket binary messages already provide the framing; any transport
/// that can ship whole byte messages works.
pub trait MessageTransport: Send {
    /// Send one framed message.
    fn send(&mut self, message: Bytes) -> impl Future<Output = io::Result<()>> + Send;

    /// Receive the next framed message. `Ok(None)` means the peer closed
    /// the transport cleanly.
    fn recv(&mut self) -> impl Future<Output = io::Result<Option<Bytes>>> + Send;

    /// Close the transport.
    fn close(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

/// Callbacks into the connection hub.
pub trait ServiceDataProvider: Send + Sync + 'static {
    /// Is this peer trusted (paired)? Consulted during the hello phase.
    fn is_remote_trusted(&self, ski: &str) -> bool;

    /// The handshake completed; SPINE traffic can flow.
    fn handle_connection_ready(&self, ski: &str);

    /// The connection is gone. `handshake_completed` tells the hub whether
    /// this was an established connection or a failed handshake.
    fn handle_connection_closed(&self, ski: &str, handshake_completed: bool);
}

/// Canonicalize a SKI: lower-case hex, no separators.
pub fn normalize_ski(ski: &str) -> String {
    ski.chars()
        .filter(|c| !matches!(c, ' ' | ':' | '-'))
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ski_normalization() {
        assert_eq!(
            normalize_ski("DF:42 9C-D1 a3"),
            "df429cd1a3".to_string()
        );
        assert_eq!(normalize_ski("abcdef"), "abcdef");
    }
}
