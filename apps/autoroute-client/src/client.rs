//! Driver task that owns the client state.
//!
//! User commands arrive over an mpsc channel and inbound deliveries over the
//! transport; `tokio::select!` serializes both, so `ClientState` has exactly
//! one writer. Events go out on a broadcast channel once a whole delivery has
//! been applied.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatch::dispatch;
use crate::error::{ClientError, Result};
use crate::params::ParamEdit;
use crate::session::Credentials;
use crate::state::{ClientEvent, ClientSnapshot, ClientState, Reaction};
use crate::transport::Transport;

const COMMAND_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 256;

enum Command {
    Login(Credentials, oneshot::Sender<Result<()>>),
    Edit(ParamEdit, oneshot::Sender<Result<()>>),
    Start(oneshot::Sender<Result<()>>),
    Stop(oneshot::Sender<Result<()>>),
    Snapshot(oneshot::Sender<ClientSnapshot>),
    Close(oneshot::Sender<()>),
}

/// Cheap, cloneable handle to a running client driver.
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ClientEvent>,
}

impl ClientHandle {
    /// Spawn the driver over an already connected transport.
    pub fn spawn(transport: Box<dyn Transport>, log_capacity: usize) -> (Self, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let driver = Driver {
            state: ClientState::new(log_capacity),
            transport,
            events: event_tx.clone(),
            inbound_open: true,
        };
        let task = tokio::spawn(driver.run(command_rx));
        (
            Self {
                commands: command_tx,
                events: event_tx,
            },
            task,
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn login(&self, credentials: Credentials) -> Result<()> {
        self.request(|reply| Command::Login(credentials, reply))
            .await?
    }

    pub async fn edit(&self, edit: ParamEdit) -> Result<()> {
        self.request(|reply| Command::Edit(edit, reply)).await?
    }

    pub async fn start(&self) -> Result<()> {
        self.request(Command::Start).await?
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(Command::Stop).await?
    }

    pub async fn snapshot(&self) -> Result<ClientSnapshot> {
        self.request(Command::Snapshot).await
    }

    /// Close the transport and end the driver.
    pub async fn close(&self) -> Result<()> {
        self.request(Command::Close).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| ClientError::DriverGone)?;
        reply_rx.await.map_err(|_| ClientError::DriverGone)
    }
}

struct Driver {
    state: ClientState,
    transport: Box<dyn Transport>,
    events: broadcast::Sender<ClientEvent>,
    inbound_open: bool,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(
            transport = %self.transport.id(),
            kind = %self.transport.kind(),
            "client driver started"
        );
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Close(reply)) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("all client handles dropped");
                        self.shutdown().await;
                        break;
                    }
                },
                inbound = self.transport.recv(), if self.inbound_open => {
                    let reaction = match inbound {
                        Some(Ok(delivery)) => dispatch(&mut self.state, delivery),
                        Some(Err(err)) => {
                            warn!(error = %err, "transport error");
                            self.state.transport_failed(&err)
                        }
                        None => {
                            info!("transport closed by peer");
                            self.inbound_open = false;
                            self.state.disconnected()
                        }
                    };
                    self.apply(reaction).await;
                }
            }
        }
        info!("client driver stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Login(credentials, reply) => {
                let result = self.state.login(credentials);
                self.complete(result, reply).await;
            }
            Command::Edit(edit, reply) => {
                let result = self.state.edit(edit);
                self.complete(result, reply).await;
            }
            Command::Start(reply) => {
                let result = self.state.start();
                self.complete(result, reply).await;
            }
            Command::Stop(reply) => {
                let result = self.state.stop();
                self.complete(result, reply).await;
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.state.snapshot());
            }
            Command::Close(reply) => {
                let _ = reply.send(());
            }
        }
    }

    async fn complete(&mut self, result: Result<Reaction>, reply: oneshot::Sender<Result<()>>) {
        let outcome = match result {
            Ok(reaction) => {
                self.apply(reaction).await;
                Ok(())
            }
            Err(err) => Err(err),
        };
        let _ = reply.send(outcome);
    }

    /// Perform a reaction's I/O, then publish its events in one go.
    async fn apply(&mut self, mut reaction: Reaction) {
        if reaction.authenticated {
            if let Err(err) = self.transport.on_authenticated().await {
                warn!(error = %err, "transport rejected session start");
                absorb(&mut reaction, self.state.transport_failed(&err));
                reaction.outbound.clear();
            }
        }
        for delivery in std::mem::take(&mut reaction.outbound) {
            if let Err(err) = self.transport.send(delivery).await {
                warn!(error = %err, "send failed");
                absorb(&mut reaction, self.state.transport_failed(&err));
                break;
            }
        }
        if reaction.session_ended {
            self.transport.on_session_ended().await;
        }
        for event in reaction.events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }

    async fn shutdown(&mut self) {
        self.transport.close().await;
        if self.inbound_open {
            self.inbound_open = false;
            let reaction = self.state.disconnected();
            for event in reaction.events {
                let _ = self.events.send(event);
            }
        }
    }
}

fn absorb(reaction: &mut Reaction, failure: Reaction) {
    reaction.events.extend(failure.events);
    reaction.session_ended |= failure.session_ended;
}
