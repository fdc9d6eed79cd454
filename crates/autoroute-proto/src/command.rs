//! Command names shared by both ends of the conversation.

use std::fmt;
use std::str::FromStr;

pub const LOGIN_START: &str = "loginstart";
pub const LOGIN_CHALLENGE: &str = "loginchallenge";
pub const LOGIN: &str = "login";
pub const LOGIN_RESULT: &str = "loginresult";
pub const AUTOROUTE: &str = "autoroute";
pub const LOG: &str = "log";
pub const ROUTE_BEGIN: &str = "fplbegin";
pub const ROUTE_WAYPOINT: &str = "fplwpt";
pub const ROUTE_END: &str = "fplend";
pub const ROUTE_PLAN: &str = "fpl";
pub const ATMOSPHERE: &str = "atmosphere";
pub const PRELOAD: &str = "preload";
pub const AIRCRAFT: &str = "aircraft";
pub const OPTIMIZATION: &str = "optimization";
pub const START: &str = "start";
pub const STOP: &str = "stop";

/// The editable parameter groups, in the order they are synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKind {
    Departure,
    Destination,
    Enroute,
    Levels,
    Preferred,
    Tfr,
}

impl GroupKind {
    pub const ALL: [GroupKind; 6] = [
        GroupKind::Departure,
        GroupKind::Destination,
        GroupKind::Enroute,
        GroupKind::Levels,
        GroupKind::Preferred,
        GroupKind::Tfr,
    ];

    pub fn command_name(self) -> &'static str {
        match self {
            GroupKind::Departure => "departure",
            GroupKind::Destination => "destination",
            GroupKind::Enroute => "enroute",
            GroupKind::Levels => "levels",
            GroupKind::Preferred => "preferred",
            GroupKind::Tfr => "tfr",
        }
    }

    pub fn from_command(name: &str) -> Option<Self> {
        GroupKind::ALL
            .into_iter()
            .find(|group| group.command_name() == name)
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_name())
    }
}

impl FromStr for GroupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GroupKind::from_command(s).ok_or_else(|| format!("unknown parameter group: {s}"))
    }
}

/// Commands requested with `cmdseq: "init"` right after a successful login.
pub const INIT_REQUESTS: [&str; 8] = [
    "departure",
    "destination",
    "enroute",
    "levels",
    "preferred",
    "tfr",
    ATMOSPHERE,
    PRELOAD,
];
