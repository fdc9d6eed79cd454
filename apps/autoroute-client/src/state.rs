//! Everything the client knows about the current session.
//!
//! `ClientState` is plain data plus pure transitions: each operation returns
//! the frames to send and the events to publish, and the driver task in
//! [`crate::client`] performs the I/O.

use autoroute_proto::command::{INIT_REQUESTS, STOP};
use autoroute_proto::{Delivery, Frame, GroupKind};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ClientError;
use crate::log::{LogBook, LogCategory, LogEntry};
use crate::params::{EditTarget, ParamEdit, Parameters};
use crate::route::{RouteAssembler, RouteCandidate};
use crate::session::{AuthMachine, AuthState, Credentials, SessionToken};
use crate::transport::TransportError;

/// Externally observable state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    AuthChanged(AuthState),
    LoginRejected(String),
    VersionReported(String),
    ParametersChanged(GroupKind),
    StartAllowed(bool),
    RouteUpdated(Arc<RouteCandidate>),
    Status(String),
    StopDisabled,
    Log(LogEntry),
    ValidationCleared,
    Disconnected,
}

/// Outcome of one state transition.
#[derive(Debug, Default)]
pub struct Reaction {
    pub outbound: Vec<Delivery>,
    pub events: Vec<ClientEvent>,
    /// The transport should be told the session is now authenticated.
    pub authenticated: bool,
    /// The session was torn down and the transport should forget it.
    pub session_ended: bool,
}

impl Reaction {
    pub(crate) fn send(&mut self, delivery: impl Into<Delivery>) {
        self.outbound.push(delivery.into());
    }

    pub(crate) fn emit(&mut self, event: ClientEvent) {
        self.events.push(event);
    }
}

/// Read-only copy of the client state for callers outside the driver.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    pub auth: AuthState,
    pub session: Option<SessionToken>,
    pub version: Option<String>,
    pub provider: Option<String>,
    pub parameters: Parameters,
    pub route: Option<Arc<RouteCandidate>>,
    pub start_allowed: bool,
    pub stop_enabled: bool,
    pub validation: Vec<LogEntry>,
    pub graph: Vec<LogEntry>,
    pub debug: Vec<LogEntry>,
    pub general: Vec<LogEntry>,
}

#[derive(Debug)]
pub struct ClientState {
    pub(crate) auth: AuthMachine,
    pub(crate) params: Parameters,
    pub(crate) route: RouteAssembler,
    pub(crate) log: LogBook,
    pub(crate) version: Option<String>,
    pub(crate) provider: Option<String>,
    pub(crate) start_allowed: bool,
    pub(crate) stop_enabled: bool,
}

impl ClientState {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            auth: AuthMachine::new(),
            params: Parameters::new(),
            route: RouteAssembler::new(),
            log: LogBook::new(log_capacity),
            version: None,
            provider: None,
            start_allowed: false,
            stop_enabled: false,
        }
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn route(&self) -> Option<Arc<RouteCandidate>> {
        self.route.current()
    }

    pub fn logs(&self, category: LogCategory) -> &std::collections::VecDeque<LogEntry> {
        self.log.entries(category)
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn stop_enabled(&self) -> bool {
        self.stop_enabled
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        let collect = |category: LogCategory| -> Vec<LogEntry> {
            self.log.entries(category).iter().cloned().collect()
        };
        ClientSnapshot {
            auth: self.auth.state(),
            session: self.auth.token(),
            version: self.version.clone(),
            provider: self.provider.clone(),
            parameters: self.params.clone(),
            route: self.route.current(),
            start_allowed: self.start_allowed,
            stop_enabled: self.stop_enabled,
            validation: collect(LogCategory::Validation),
            graph: collect(LogCategory::Graph),
            debug: collect(LogCategory::Debug),
            general: collect(LogCategory::General),
        }
    }

    pub fn login(&mut self, credentials: Credentials) -> Result<Reaction, ClientError> {
        let frame = self.auth.begin(credentials)?;
        let mut reaction = Reaction::default();
        reaction.send(frame);
        reaction.emit(ClientEvent::AuthChanged(self.auth.state()));
        Ok(reaction)
    }

    pub fn edit(&mut self, edit: ParamEdit) -> Result<Reaction, ClientError> {
        self.require_authenticated()?;
        let target = edit.target();
        let frame = self.params.apply_edit(edit);
        let mut reaction = Reaction::default();
        reaction.send(frame);
        if let EditTarget::Group(group) = target {
            reaction.emit(ClientEvent::ParametersChanged(group));
        }
        Ok(reaction)
    }

    /// Resync every group, then ask the server to start routing.
    pub fn start(&mut self) -> Result<Reaction, ClientError> {
        self.require_authenticated()?;
        if let Some(reason) = self.params.start_blocker() {
            return Err(ClientError::StartBlocked(reason));
        }
        let mut reaction = Reaction::default();
        reaction.send(Delivery::Batch(self.params.start_batch()));
        self.stop_enabled = true;
        info!(session = ?self.auth.token(), "route computation requested");
        Ok(reaction)
    }

    /// Ask the server to stop. A repeated stop is a no-op until the next
    /// start.
    pub fn stop(&mut self) -> Result<Reaction, ClientError> {
        self.require_authenticated()?;
        let mut reaction = Reaction::default();
        if self.stop_enabled {
            self.stop_enabled = false;
            reaction.send(Frame::command(STOP));
            reaction.emit(ClientEvent::StopDisabled);
        }
        Ok(reaction)
    }

    /// The transport reported a failure. Terminal ones end the session.
    pub fn transport_failed(&mut self, error: &TransportError) -> Reaction {
        let mut reaction = Reaction::default();
        let entry = self.log.error(format!("transport: {error}"));
        reaction.emit(ClientEvent::Log(entry));
        match error {
            TransportError::Closed | TransportError::PollHalted(_) | TransportError::Connect(_) => {
                self.end_session(&mut reaction)
            }
            TransportError::Codec(_) | TransportError::Http(_) | TransportError::Send(_) => {}
        }
        reaction
    }

    /// The transport is gone.
    pub fn disconnected(&mut self) -> Reaction {
        let mut reaction = Reaction::default();
        self.end_session(&mut reaction);
        reaction
    }

    pub(crate) fn require_authenticated(&self) -> Result<(), ClientError> {
        if self.auth.is_authenticated() {
            Ok(())
        } else {
            Err(ClientError::NotAuthenticated)
        }
    }

    /// Fresh per-session state and the init burst, after a successful login.
    pub(crate) fn begin_session(&mut self, reaction: &mut Reaction) {
        self.reset_session_data();
        let init = INIT_REQUESTS.iter().map(|name| Frame::init(*name)).collect();
        reaction.send(Delivery::Batch(init));
        reaction.authenticated = true;
        reaction.emit(ClientEvent::AuthChanged(AuthState::Authenticated));
    }

    pub(crate) fn recompute_start_gate(&mut self, reaction: &mut Reaction) {
        let allowed = self.params.can_start();
        if allowed != self.start_allowed {
            self.start_allowed = allowed;
            reaction.emit(ClientEvent::StartAllowed(allowed));
        }
    }

    fn end_session(&mut self, reaction: &mut Reaction) {
        let was = self.auth.state();
        if was != AuthState::Idle {
            warn!(state = ?was, "session ended");
        }
        self.auth.reset();
        self.reset_session_data();
        reaction.session_ended = true;
        reaction.emit(ClientEvent::Disconnected);
        reaction.emit(ClientEvent::AuthChanged(AuthState::Idle));
    }

    fn reset_session_data(&mut self) {
        self.params = Parameters::new();
        self.route = RouteAssembler::new();
        self.log.reset_session();
        self.start_allowed = false;
        self.stop_enabled = false;
    }
}
