//! Scripted in-memory transport for tests.

use async_trait::async_trait;
use autoroute_proto::{decode_delivery, CodecError, Delivery};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{next_transport_id, Transport, TransportError, TransportId, TransportKind};

type Inbound = Result<Delivery, TransportError>;

pub struct MockTransport {
    id: TransportId,
    sent: mpsc::UnboundedSender<Delivery>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    authenticated: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

/// The test's end of a [`MockTransport`]: plays the server.
pub struct MockRemote {
    sent: mpsc::UnboundedReceiver<Delivery>,
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    authenticated: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn pair() -> (MockTransport, MockRemote) {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let authenticated = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        (
            MockTransport {
                id: next_transport_id(),
                sent: sent_tx,
                inbound: inbound_rx,
                authenticated: authenticated.clone(),
                closed: closed.clone(),
            },
            MockRemote {
                sent: sent_rx,
                inbound: Some(inbound_tx),
                authenticated,
                closed,
            },
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Mock
    }

    async fn send(&mut self, delivery: Delivery) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent
            .send(delivery)
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }

    async fn on_authenticated(&mut self) -> Result<(), TransportError> {
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.inbound.close();
    }
}

impl MockRemote {
    pub fn push(&self, delivery: impl Into<Delivery>) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Ok(delivery.into()));
        }
    }

    /// Push raw JSON as the server would send it.
    pub fn push_json(&self, text: &str) -> Result<(), CodecError> {
        self.push(decode_delivery(text)?);
        Ok(())
    }

    pub fn fail(&self, error: TransportError) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Err(error));
        }
    }

    /// Drop the inbound side; the client sees the transport end.
    pub fn disconnect(&mut self) {
        self.inbound = None;
    }

    pub async fn next_sent(&mut self) -> Option<Delivery> {
        tokio::time::timeout(Duration::from_secs(5), self.sent.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn try_next_sent(&mut self) -> Option<Delivery> {
        self.sent.try_recv().ok()
    }

    pub fn was_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
