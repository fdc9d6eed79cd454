use autoroute_client::{
    AircraftTemplate, FlightRules, OptimizationTarget, ParamEdit, Terminal, TransportKind,
};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "autoroute")]
#[command(about = "Drive an autorouter session from the command line")]
pub struct Cli {
    /// Transport to the autorouter: ws or bridge
    #[arg(long, env = "AUTOROUTE_TRANSPORT", default_value = "ws")]
    pub transport: TransportKind,

    /// Endpoint URL; defaults to AUTOROUTE_WS_URL or AUTOROUTE_BRIDGE_URL
    #[arg(long)]
    pub url: Option<String>,

    #[arg(long, env = "AUTOROUTE_USER")]
    pub user: String,

    #[arg(long, env = "AUTOROUTE_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Departure aerodrome ICAO code
    #[arg(long)]
    pub departure: Option<String>,

    /// Destination aerodrome ICAO code
    #[arg(long)]
    pub destination: Option<String>,

    /// Flight rules for both terminal segments: ifr or vfr (server default is ifr)
    #[arg(long)]
    pub rules: Option<FlightRules>,

    /// Standard instrument departure
    #[arg(long)]
    pub sid: Option<String>,

    /// Standard terminal arrival route
    #[arg(long)]
    pub star: Option<String>,

    /// Lowest cruise flight level
    #[arg(long)]
    pub base_level: Option<f64>,

    /// Highest cruise flight level
    #[arg(long)]
    pub top_level: Option<f64>,

    /// Aircraft template: P28R, P28A, M20P or C172
    #[arg(long)]
    pub aircraft: Option<AircraftTemplate>,

    /// Optimization target: time, fuel or preferred
    #[arg(long)]
    pub optimize: Option<OptimizationTarget>,

    /// Print route candidates and log entries as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Seconds to wait for login and for both aerodromes to resolve
    #[arg(long, default_value_t = 30)]
    pub wait_secs: u64,
}

impl Cli {
    /// Parameter edits implied by the flags, in the order they are sent.
    pub fn edits(&self) -> Vec<ParamEdit> {
        let mut edits = Vec::new();
        if let Some(icao) = &self.departure {
            edits.push(ParamEdit::Icao(Terminal::Departure, icao.clone()));
        }
        if let Some(icao) = &self.destination {
            edits.push(ParamEdit::Icao(Terminal::Destination, icao.clone()));
        }
        if let Some(rules) = self.rules {
            edits.push(ParamEdit::Rules(Terminal::Departure, rules));
            edits.push(ParamEdit::Rules(Terminal::Destination, rules));
        }
        if let Some(sid) = &self.sid {
            edits.push(ParamEdit::ProcedureIdent(Terminal::Departure, sid.clone()));
        }
        if let Some(star) = &self.star {
            edits.push(ParamEdit::ProcedureIdent(Terminal::Destination, star.clone()));
        }
        if let Some(level) = self.base_level {
            edits.push(ParamEdit::BaseLevel(level));
        }
        if let Some(level) = self.top_level {
            edits.push(ParamEdit::TopLevel(level));
        }
        if let Some(aircraft) = self.aircraft {
            edits.push(ParamEdit::Aircraft(aircraft));
        }
        if let Some(target) = self.optimize {
            edits.push(ParamEdit::Optimization(target));
        }
        edits
    }
}
