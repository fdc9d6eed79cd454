use async_trait::async_trait;
use autoroute_proto::{
    decode_delivery, decode_delivery_slice, encode_delivery, Delivery, WireDialect,
};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{next_transport_id, Transport, TransportError, TransportId, TransportKind};

pub mod config;
use config::WebSocketConfig;

const CLOSE_GRACE: Duration = Duration::from_secs(2);

type Inbound = Result<Delivery, TransportError>;

/// Persistent duplex channel to the autorouter's WebSocket endpoint.
pub struct WebSocketTransport {
    id: TransportId,
    dialect: WireDialect,
    outbound: mpsc::UnboundedSender<Message>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    ws_task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    pub async fn connect(config: WebSocketConfig) -> Result<Self, TransportError> {
        let id = next_transport_id();
        let url = config.endpoint();
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Connect(format!("{url}: {err}")))?;
        info!(transport = %id, url = %url, "websocket connected");

        let (tx_out, rx_out) = mpsc::unbounded_channel::<Message>();
        let (tx_in, rx_in) = mpsc::unbounded_channel::<Inbound>();
        let ws_task = tokio::spawn(handle_websocket(id, ws_stream, rx_out, tx_in));

        Ok(Self {
            id,
            dialect: config.dialect,
            outbound: tx_out,
            inbound: rx_in,
            ws_task: Some(ws_task),
        })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn send(&mut self, delivery: Delivery) -> Result<(), TransportError> {
        // The socket server reads one command per message.
        for frame in delivery.into_frames() {
            let text = encode_delivery(&Delivery::Single(frame), self.dialect);
            self.outbound
                .send(Message::Text(text))
                .map_err(|_| TransportError::Send("websocket writer has stopped".into()))?;
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        let _ = self.outbound.send(Message::Close(None));
        if let Some(mut task) = self.ws_task.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                debug!(transport = %self.id, "websocket close timed out; aborting");
                task.abort();
            }
        }
    }
}

async fn handle_websocket(
    id: TransportId,
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx_out: mpsc::UnboundedReceiver<Message>,
    tx_in: mpsc::UnboundedSender<Inbound>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx_out.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(err) = ws_sender.send(message).await {
                warn!(transport = %id, error = %err, "websocket write failed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    while let Some(message) = ws_receiver.next().await {
        let decoded = match message {
            Ok(Message::Text(text)) => decode_delivery(&text),
            Ok(Message::Binary(data)) => decode_delivery_slice(&data),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                warn!(transport = %id, error = %err, "websocket receive failed");
                break;
            }
        };
        let item = decoded.map_err(|err| {
            warn!(transport = %id, error = %err, "dropping undecodable message");
            TransportError::from(err)
        });
        if tx_in.send(item).is_err() {
            break;
        }
    }

    info!(transport = %id, "websocket disconnected");
    send_task.abort();
    let _ = send_task.await;
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(task) = self.ws_task.take() {
            task.abort();
        }
    }
}
