//! HTTP long-poll transport through the autoroute relay.
//!
//! Outbound deliveries are POSTed as JSON and whatever the relay answers is
//! queued like any other inbound delivery. Once the session is
//! authenticated a single background loop keeps exactly one bare
//! "fetch-next" request outstanding, reissuing it as soon as the previous
//! one settles. The loop exits for good when a poll fails at the HTTP level
//! or answers with a lone error frame; only a fresh login re-arms it.

use async_trait::async_trait;
use autoroute_proto::{decode_delivery_slice, encode_delivery, Delivery, WireDialect};
use reqwest::header::CONTENT_TYPE;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::{next_transport_id, Transport, TransportError, TransportId, TransportKind};

/// Header carrying the relay session identifier.
pub const SESSION_HEADER: &str = "x-autoroute-session";

type Inbound = Result<Delivery, TransportError>;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub endpoint: Url,
    pub session: String,
    pub dialect: WireDialect,
    /// Upper bound for one HTTP exchange; must exceed the relay's own
    /// receive timeout or every idle poll turns into an error.
    pub request_timeout: Duration,
}

impl BridgeConfig {
    pub fn new(endpoint: Url, session: impl Into<String>) -> Self {
        Self {
            endpoint,
            session: session.into(),
            dialect: WireDialect::Bridge,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// One request/reply round trip with the relay.
#[async_trait]
pub trait BridgeExchange: Send + Sync + 'static {
    /// `body` of `None` sends an empty request, which is how a poll asks for
    /// whatever the server has queued.
    async fn exchange(
        &self,
        body: Option<String>,
        noreply: bool,
    ) -> Result<Delivery, TransportError>;
}

pub struct HttpExchange {
    client: reqwest::Client,
    endpoint: Url,
    session: String,
}

impl HttpExchange {
    pub fn new(config: &BridgeConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            session: config.session.clone(),
        })
    }
}

#[async_trait]
impl BridgeExchange for HttpExchange {
    async fn exchange(
        &self,
        body: Option<String>,
        noreply: bool,
    ) -> Result<Delivery, TransportError> {
        let mut url = self.endpoint.clone();
        if noreply {
            url.query_pairs_mut().append_pair("noreply", "1");
        }
        let mut request = self
            .client
            .post(url)
            .header(SESSION_HEADER, self.session.as_str());
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }
        let response = request.send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Delivery::empty());
        }
        Ok(decode_delivery_slice(&bytes)?)
    }
}

struct PollLoop {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct BridgeTransport<E: BridgeExchange = HttpExchange> {
    id: TransportId,
    dialect: WireDialect,
    exchange: Arc<E>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    authenticated: bool,
    in_flight: Arc<AtomicUsize>,
    poll: Option<PollLoop>,
}

impl BridgeTransport<HttpExchange> {
    /// Build the HTTP transport and send one empty request to check the relay.
    /// Its reply, usually the server version banner, is queued for the client.
    pub async fn connect(config: BridgeConfig) -> Result<Self, TransportError> {
        let exchange = HttpExchange::new(&config)?;
        let transport = Self::with_exchange(exchange, config.dialect);
        let banner = transport
            .exchange
            .exchange(None, true)
            .await
            .map_err(|err| TransportError::Connect(format!("{}: {err}", config.endpoint)))?;
        info!(transport = %transport.id, endpoint = %config.endpoint, "relay reachable");
        transport.enqueue(banner);
        Ok(transport)
    }
}

impl<E: BridgeExchange> BridgeTransport<E> {
    pub fn with_exchange(exchange: E, dialect: WireDialect) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            id: next_transport_id(),
            dialect,
            exchange: Arc::new(exchange),
            inbound_tx,
            inbound_rx,
            authenticated: false,
            in_flight: Arc::new(AtomicUsize::new(0)),
            poll: None,
        }
    }

    /// Number of standing polls currently awaiting a reply (0 or 1).
    pub fn polls_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_polling(&self) -> bool {
        self.poll
            .as_ref()
            .map(|poll| !poll.handle.is_finished())
            .unwrap_or(false)
    }

    fn enqueue(&self, delivery: Delivery) {
        if !delivery.is_empty() {
            let _ = self.inbound_tx.send(Ok(delivery));
        }
    }

    fn spawn_poll_loop(&mut self) {
        if self.is_polling() {
            debug!(transport = %self.id, "long-poll already running");
            return;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(poll_loop(
            self.id,
            self.exchange.clone(),
            self.inbound_tx.clone(),
            stop.clone(),
            self.in_flight.clone(),
        ));
        self.poll = Some(PollLoop { stop, handle });
    }

    /// Back to request/reply mode. An outstanding poll is left to settle;
    /// no new one follows.
    fn end_polling(&mut self) {
        self.authenticated = false;
        if let Some(poll) = self.poll.take() {
            poll.stop.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl<E: BridgeExchange> Transport for BridgeTransport<E> {
    fn id(&self) -> TransportId {
        self.id
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Bridge
    }

    async fn send(&mut self, delivery: Delivery) -> Result<(), TransportError> {
        let body = encode_delivery(&delivery, self.dialect);
        let reply = self
            .exchange
            .exchange(Some(body), self.authenticated)
            .await?;
        self.enqueue(reply);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Inbound> {
        self.inbound_rx.recv().await
    }

    async fn on_authenticated(&mut self) -> Result<(), TransportError> {
        self.authenticated = true;
        self.spawn_poll_loop();
        Ok(())
    }

    async fn on_session_ended(&mut self) {
        debug!(transport = %self.id, "session ended; sends expect replies again");
        self.end_polling();
    }

    async fn close(&mut self) {
        self.end_polling();
        self.inbound_rx.close();
    }
}

async fn poll_loop<E: BridgeExchange>(
    id: TransportId,
    exchange: Arc<E>,
    tx: mpsc::UnboundedSender<Inbound>,
    stop: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
) {
    info!(transport = %id, "long-poll started");
    while !stop.load(Ordering::SeqCst) {
        let outstanding = in_flight.fetch_add(1, Ordering::SeqCst);
        debug_assert_eq!(outstanding, 0, "overlapping long-poll requests");
        let result = exchange.exchange(None, false).await;
        in_flight.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(delivery) => {
                let halt = delivery.halting_error().map(str::to_owned);
                if !delivery.is_empty() && tx.send(Ok(delivery)).is_err() {
                    break;
                }
                if let Some(error) = halt {
                    warn!(
                        transport = %id,
                        error = %error,
                        "long-poll answered with error; halting"
                    );
                    let _ = tx.send(Err(TransportError::PollHalted(error)));
                    break;
                }
            }
            Err(err) => {
                warn!(transport = %id, error = %err, "long-poll request failed; halting");
                let _ = tx.send(Err(TransportError::PollHalted(err.to_string())));
                break;
            }
        }
    }
    debug!(transport = %id, "long-poll stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoroute_proto::Frame;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Scripted {
        sends: Mutex<Vec<(String, bool)>>,
        polls: Mutex<VecDeque<Result<Delivery, TransportError>>>,
        poll_count: AtomicUsize,
        concurrent: AtomicUsize,
        max_concurrent: AtomicUsize,
    }

    #[async_trait]
    impl BridgeExchange for Arc<Scripted> {
        async fn exchange(
            &self,
            body: Option<String>,
            noreply: bool,
        ) -> Result<Delivery, TransportError> {
            if let Some(body) = body {
                self.sends.lock().unwrap().push((body, noreply));
                return Ok(Delivery::empty());
            }
            self.poll_count.fetch_add(1, Ordering::SeqCst);
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            let next = self.polls.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(TransportError::Closed))
        }
    }

    fn scripted(polls: Vec<Result<Delivery, TransportError>>) -> Arc<Scripted> {
        let script = Arc::new(Scripted::default());
        script.polls.lock().unwrap().extend(polls);
        script
    }

    #[tokio::test]
    async fn sends_switch_to_noreply_after_login() {
        let script = scripted(vec![]);
        let mut transport = BridgeTransport::with_exchange(script.clone(), WireDialect::Bridge);

        transport
            .send(Frame::command("loginstart").into())
            .await
            .unwrap();
        transport.authenticated = true;
        transport.send(Frame::command("stop").into()).await.unwrap();

        let sends = script.sends.lock().unwrap().clone();
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[0], (r#"{"cmdname":"loginstart"}"#.to_string(), false));
        assert!(sends[1].1);
        assert_eq!(script.poll_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn poll_loop_stops_on_error_frame() {
        let batch = Delivery::Batch(vec![Frame::command("fplbegin"), Frame::command("fplend")]);
        let script = scripted(vec![
            Ok(batch),
            Ok(Delivery::empty()),
            Ok(Frame::command("autoroute").with_error("session expired").into()),
            Ok(Frame::command("never").into()),
        ]);
        let mut transport = BridgeTransport::with_exchange(script.clone(), WireDialect::Bridge);
        transport.on_authenticated().await.unwrap();

        let first = transport.recv().await.unwrap().unwrap();
        assert_eq!(first.len(), 2);
        let second = transport.recv().await.unwrap().unwrap();
        assert_eq!(second.halting_error(), Some("session expired"));
        let halted = transport.recv().await.unwrap();
        assert!(matches!(halted, Err(TransportError::PollHalted(_))));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!transport.is_polling());
        assert_eq!(script.poll_count.load(Ordering::SeqCst), 3);
        assert_eq!(script.max_concurrent.load(Ordering::SeqCst), 1);
        assert_eq!(transport.polls_in_flight(), 0);
    }

    #[tokio::test]
    async fn batch_errors_do_not_halt_polling() {
        let batch = Delivery::Batch(vec![
            Frame::command("log").with_error("soft"),
            Frame::command("x"),
        ]);
        let script = scripted(vec![Ok(batch)]);
        let mut transport = BridgeTransport::with_exchange(script.clone(), WireDialect::Bridge);
        transport.on_authenticated().await.unwrap();

        assert!(transport.recv().await.unwrap().is_ok());
        // Script exhausted: the next poll fails at the request level.
        let halted = transport.recv().await.unwrap();
        assert!(matches!(halted, Err(TransportError::PollHalted(_))));
        assert_eq!(script.poll_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn ended_session_sends_expect_replies_and_relogin_repolls() {
        let script = scripted(vec![Ok(Frame::command("autoroute")
            .with_error("session expired")
            .into())]);
        let mut transport = BridgeTransport::with_exchange(script.clone(), WireDialect::Bridge);
        transport.on_authenticated().await.unwrap();
        transport.recv().await.unwrap().unwrap();
        assert!(matches!(
            transport.recv().await.unwrap(),
            Err(TransportError::PollHalted(_))
        ));

        transport.on_session_ended().await;
        assert!(!transport.is_polling());
        transport
            .send(Frame::command("loginstart").into())
            .await
            .unwrap();
        assert_eq!(
            script.sends.lock().unwrap().last().cloned(),
            Some((r#"{"cmdname":"loginstart"}"#.to_string(), false))
        );

        transport.on_authenticated().await.unwrap();
        assert!(transport.is_polling());
        // Script exhausted: the re-armed loop halts on its first poll.
        assert!(matches!(
            transport.recv().await.unwrap(),
            Err(TransportError::PollHalted(_))
        ));
        assert_eq!(script.poll_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_authentication_does_not_start_a_second_loop() {
        let script = scripted(
            (0..50)
                .map(|_| Ok(Delivery::empty()))
                .collect::<Vec<_>>(),
        );
        let mut transport = BridgeTransport::with_exchange(script.clone(), WireDialect::Bridge);
        transport.on_authenticated().await.unwrap();
        transport.on_authenticated().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(script.max_concurrent.load(Ordering::SeqCst), 1);
        transport.close().await;
    }
}
