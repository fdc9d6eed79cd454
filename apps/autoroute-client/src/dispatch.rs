//! Routing of inbound frames to the part of the state that owns them.

use autoroute_proto::command::{
    ATMOSPHERE, AUTOROUTE, LOG, LOGIN_CHALLENGE, LOGIN_RESULT, PRELOAD, ROUTE_BEGIN, ROUTE_END,
    ROUTE_PLAN, ROUTE_WAYPOINT,
};
use autoroute_proto::{Delivery, Frame, GroupKind};
use tracing::{debug, info};

use crate::log::LogUpdate;
use crate::session::AuthStep;
use crate::state::{ClientEvent, ClientState, Reaction};

/// Inbound frame classified by command name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// No command: server banner (`version`, `provider`) or a bare error.
    Banner,
    LoginChallenge,
    LoginResult,
    Autoroute,
    Log,
    RouteBegin,
    RouteWaypoint,
    RouteEnd,
    RoutePlan,
    Group(GroupKind),
    Atmosphere,
    Preload,
    Unknown(&'a str),
}

impl<'a> Inbound<'a> {
    pub fn classify(frame: &'a Frame) -> Self {
        let Some(name) = frame.command_name() else {
            return Inbound::Banner;
        };
        match name {
            LOGIN_CHALLENGE => Inbound::LoginChallenge,
            LOGIN_RESULT => Inbound::LoginResult,
            AUTOROUTE => Inbound::Autoroute,
            LOG => Inbound::Log,
            ROUTE_BEGIN => Inbound::RouteBegin,
            ROUTE_WAYPOINT => Inbound::RouteWaypoint,
            ROUTE_END => Inbound::RouteEnd,
            ROUTE_PLAN => Inbound::RoutePlan,
            ATMOSPHERE => Inbound::Atmosphere,
            PRELOAD => Inbound::Preload,
            other => GroupKind::from_command(other)
                .map(Inbound::Group)
                .unwrap_or(Inbound::Unknown(other)),
        }
    }

    fn is_handshake(self) -> bool {
        matches!(
            self,
            Inbound::Banner | Inbound::LoginChallenge | Inbound::LoginResult
        )
    }
}

/// Apply a whole delivery in order. Events are collected and returned
/// together so observers never see a half-applied batch.
pub fn dispatch(state: &mut ClientState, delivery: Delivery) -> Reaction {
    let mut reaction = Reaction::default();
    for frame in delivery.into_frames() {
        apply_frame(state, &frame, &mut reaction);
    }
    reaction
}

fn apply_frame(state: &mut ClientState, frame: &Frame, reaction: &mut Reaction) {
    if let Some(error) = frame.error() {
        let entry = state.log.error(error);
        reaction.emit(ClientEvent::Log(entry));
    }

    let inbound = Inbound::classify(frame);
    if !inbound.is_handshake() && !state.auth.is_authenticated() {
        debug!(command = ?frame.command_name(), "ignoring frame before login");
        return;
    }

    match inbound {
        Inbound::Banner => apply_banner(state, frame, reaction),
        Inbound::LoginChallenge => match state.auth.on_challenge(frame) {
            AuthStep::Send(login) => reaction.send(login),
            step => auth_outcome(state, step, reaction),
        },
        Inbound::LoginResult => {
            let step = state.auth.on_result(frame);
            auth_outcome(state, step, reaction);
        }
        Inbound::Autoroute => {
            let status = frame.text("status").unwrap_or_default();
            if status == "stopping" && state.stop_enabled {
                state.stop_enabled = false;
                reaction.emit(ClientEvent::StopDisabled);
            }
            if !status.is_empty() {
                reaction.emit(ClientEvent::Status(status));
            }
        }
        Inbound::Log => {
            let item = frame.text("item").unwrap_or_default();
            match state.log.record_item(&item, frame.text("text")) {
                Some(LogUpdate::Appended(entry)) => reaction.emit(ClientEvent::Log(entry)),
                Some(LogUpdate::ValidationCleared) => reaction.emit(ClientEvent::ValidationCleared),
                None => debug!(item = %item, "unknown log item ignored"),
            }
        }
        Inbound::RouteBegin => state.route.begin(),
        Inbound::RouteWaypoint => {
            state.route.waypoint(frame);
        }
        Inbound::RouteEnd => {
            let route = state.route.end(frame);
            reaction.emit(ClientEvent::RouteUpdated(route));
        }
        Inbound::RoutePlan => {
            let route = state.route.plan(frame);
            reaction.emit(ClientEvent::RouteUpdated(route));
        }
        Inbound::Group(group) => {
            state.params.apply_inbound(group, frame);
            reaction.emit(ClientEvent::ParametersChanged(group));
            state.recompute_start_gate(reaction);
        }
        Inbound::Atmosphere | Inbound::Preload => {
            debug!(command = ?frame.command_name(), "reply accepted");
        }
        Inbound::Unknown(name) => debug!(command = %name, "unknown command ignored"),
    }
}

fn apply_banner(state: &mut ClientState, frame: &Frame, reaction: &mut Reaction) {
    if let Some(provider) = frame.text("provider") {
        state.provider = Some(provider);
    }
    let Some(version) = frame.text("version").filter(|v| !v.is_empty()) else {
        return;
    };
    if state.version.is_some() {
        return;
    }
    info!(version = %version, "autorouter version");
    let entry = state.log.info(format!("Autorouter Version {version}"));
    state.version = Some(version.clone());
    reaction.emit(ClientEvent::Log(entry));
    reaction.emit(ClientEvent::VersionReported(version));
}

fn auth_outcome(state: &mut ClientState, step: AuthStep, reaction: &mut Reaction) {
    match step {
        AuthStep::Authenticated(_) => state.begin_session(reaction),
        AuthStep::Rejected(reason) => {
            let entry = state.log.error(format!("login failed: {reason}"));
            reaction.emit(ClientEvent::Log(entry));
            reaction.emit(ClientEvent::LoginRejected(reason));
            reaction.emit(ClientEvent::AuthChanged(state.auth.state()));
        }
        AuthStep::Send(frame) => reaction.send(frame),
        AuthStep::Ignored => {}
    }
}
