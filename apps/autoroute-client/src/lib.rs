pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod log;
pub mod params;
pub mod route;
pub mod session;
pub mod state;
pub mod transport;

pub use client::ClientHandle;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use log::{LogBook, LogCategory, LogEntry};
pub use params::{
    AircraftTemplate, FlightRules, OptimizationTarget, ParamEdit, Parameters, Terminal,
};
pub use route::{RouteAssembler, RouteCandidate, RouteMetrics};
pub use session::{AuthState, Credentials};
pub use state::{ClientEvent, ClientSnapshot, ClientState};
pub use transport::{Transport, TransportError, TransportKind};
