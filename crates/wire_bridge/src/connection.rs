//! The connection capability the engine sends through.
//!
//! Transport establishment is the embedding application's business; the
//! engine only needs something that can transmit a frame and that carries a
//! stable server id, a capability list and a measured latency.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::sync::mpsc;

#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    /// Stable identifier of the remote server
    fn server_id(&self) -> &str;

    /// Transmit one wire frame
    async fn send(&self, frame: Vec<u8>) -> Result<(), String>;

    fn capabilities(&self) -> Vec<String>;

    fn set_capabilities(&self, capabilities: Vec<String>);

    /// Last measured round-trip latency in milliseconds
    fn last_ping(&self) -> Option<u64>;

    fn set_last_ping(&self, latency_ms: u64);
}

const NO_PING: u64 = u64::MAX;

/// Mutable per-connection metadata, embeddable in [`Connection`] implementations.
#[derive(Debug)]
pub struct ConnectionState {
    capabilities: RwLock<Vec<String>>,
    last_ping: AtomicU64,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            capabilities: RwLock::new(Vec::new()),
            last_ping: AtomicU64::new(NO_PING),
        }
    }
}

impl ConnectionState {
    pub fn capabilities(&self) -> Vec<String> {
        self.capabilities
            .read()
            .map(|caps| caps.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn set_capabilities(&self, capabilities: Vec<String>) {
        match self.capabilities.write() {
            Ok(mut caps) => *caps = capabilities,
            Err(poisoned) => *poisoned.into_inner() = capabilities,
        }
    }

    pub fn last_ping(&self) -> Option<u64> {
        match self.last_ping.load(Ordering::Relaxed) {
            NO_PING => None,
            latency => Some(latency),
        }
    }

    pub fn set_last_ping(&self, latency_ms: u64) {
        self.last_ping.store(latency_ms.min(NO_PING - 1), Ordering::Relaxed);
    }
}

/// A connection that hands frames to an in-process channel.
///
/// Used for loopback wiring and tests; the receiving half is typically fed
/// into [`MessageHandler::serve`](crate::MessageHandler::serve) of the peer.
#[derive(Debug)]
pub struct ChannelConnection {
    server_id: String,
    sender: mpsc::UnboundedSender<Vec<u8>>,
    state: ConnectionState,
}

impl ChannelConnection {
    pub fn new(server_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection = Self {
            server_id: server_id.into(),
            sender,
            state: ConnectionState::default(),
        };
        (connection, receiver)
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    fn server_id(&self) -> &str {
        &self.server_id
    }

    async fn send(&self, frame: Vec<u8>) -> Result<(), String> {
        self.sender
            .send(frame)
            .map_err(|_| format!("connection {} is closed", self.server_id))
    }

    fn capabilities(&self) -> Vec<String> {
        self.state.capabilities()
    }

    fn set_capabilities(&self, capabilities: Vec<String>) {
        self.state.set_capabilities(capabilities);
    }

    fn last_ping(&self) -> Option<u64> {
        self.state.last_ping()
    }

    fn set_last_ping(&self, latency_ms: u64) {
        self.state.set_last_ping(latency_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        let state = ConnectionState::default();
        assert!(state.capabilities().is_empty());
        assert_eq!(state.last_ping(), None);

        state.set_capabilities(vec!["player_management".into()]);
        state.set_last_ping(42);
        assert_eq!(state.capabilities(), vec!["player_management".to_string()]);
        assert_eq!(state.last_ping(), Some(42));
    }

    #[tokio::test]
    async fn test_channel_connection() {
        let (connection, mut receiver) = ChannelConnection::new("lobby");
        connection.send(b"frame".to_vec()).await.unwrap();
        assert_eq!(receiver.recv().await.unwrap(), b"frame".to_vec());

        drop(receiver);
        assert!(connection.send(b"lost".to_vec()).await.is_err());
    }
}
