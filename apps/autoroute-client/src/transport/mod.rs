use async_trait::async_trait;
use autoroute_proto::{CodecError, Delivery};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub mod bridge;
pub mod mock;
pub mod websocket;

pub use bridge::{BridgeConfig, BridgeExchange, BridgeTransport, HttpExchange};
pub use mock::{MockRemote, MockTransport};
pub use websocket::{config::WebSocketConfig, WebSocketTransport};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("transport closed")]
    Closed,
    #[error("http exchange failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("undecodable delivery: {0}")]
    Codec(#[from] CodecError),
    #[error("long-poll halted: {0}")]
    PollHalted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    WebSocket,
    Bridge,
    Mock,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportKind::WebSocket => "ws",
            TransportKind::Bridge => "bridge",
            TransportKind::Mock => "mock",
        };
        f.write_str(label)
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ws" | "websocket" => Ok(TransportKind::WebSocket),
            "bridge" | "http" | "poll" => Ok(TransportKind::Bridge),
            other => Err(format!("unknown transport '{other}' (expected ws or bridge)")),
        }
    }
}

/// Identifier used to correlate log lines from one transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportId(pub u64);

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_transport_id() -> TransportId {
    TransportId(NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed))
}

/// A channel to the autorouter.
///
/// `recv` must be cancel-safe: the client driver polls it inside
/// `tokio::select!` alongside user commands.
#[async_trait]
pub trait Transport: Send {
    fn id(&self) -> TransportId;

    fn kind(&self) -> TransportKind;

    async fn send(&mut self, delivery: Delivery) -> Result<(), TransportError>;

    /// Next inbound delivery in arrival order. `None` once the transport is
    /// closed and drained.
    async fn recv(&mut self) -> Option<Result<Delivery, TransportError>>;

    /// Called once the login handshake succeeded.
    async fn on_authenticated(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Called when the client dropped back to an unauthenticated session.
    /// The transport stays open for a fresh login.
    async fn on_session_ended(&mut self) {}

    async fn close(&mut self);
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn id(&self) -> TransportId {
        (**self).id()
    }

    fn kind(&self) -> TransportKind {
        (**self).kind()
    }

    async fn send(&mut self, delivery: Delivery) -> Result<(), TransportError> {
        (**self).send(delivery).await
    }

    async fn recv(&mut self) -> Option<Result<Delivery, TransportError>> {
        (**self).recv().await
    }

    async fn on_authenticated(&mut self) -> Result<(), TransportError> {
        (**self).on_authenticated().await
    }

    async fn on_session_ended(&mut self) {
        (**self).on_session_ended().await
    }

    async fn close(&mut self) {
        (**self).close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kind_parses_cli_spellings() {
        assert_eq!("ws".parse::<TransportKind>(), Ok(TransportKind::WebSocket));
        assert_eq!("Bridge".parse::<TransportKind>(), Ok(TransportKind::Bridge));
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }

    #[test]
    fn transport_ids_are_unique() {
        let a = next_transport_id();
        let b = next_transport_id();
        assert!(b.0 > a.0);
    }
}
