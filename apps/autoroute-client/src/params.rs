//! Local mirror of the autorouter's parameter groups.
//!
//! Inbound frames are sparse patches: only fields present on the frame are
//! copied. An `init` reply seeds a group once per session and is ignored if
//! the group was already seeded or edited locally. Every local edit yields
//! one outbound frame carrying the whole group.

use autoroute_proto::command::{AIRCRAFT, OPTIMIZATION, START};
use autoroute_proto::{Frame, GroupKind, LatLon, RawCoord};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightRules {
    Vfr,
    Ifr,
}

impl FlightRules {
    fn slot(self) -> usize {
        match self {
            FlightRules::Vfr => 0,
            FlightRules::Ifr => 1,
        }
    }
}

impl FromStr for FlightRules {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ifr" => Ok(FlightRules::Ifr),
            "vfr" => Ok(FlightRules::Vfr),
            _ => Err(format!("unknown flight rules '{s}' (ifr or vfr)")),
        }
    }
}

/// Which end of the route an aerodrome group describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Departure,
    Destination,
}

struct TerminalKeys {
    ident: &'static str,
    kind: &'static str,
    limit: &'static str,
    database: &'static str,
}

impl Terminal {
    pub fn group(self) -> GroupKind {
        match self {
            Terminal::Departure => GroupKind::Departure,
            Terminal::Destination => GroupKind::Destination,
        }
    }

    fn slot(self) -> usize {
        match self {
            Terminal::Departure => 0,
            Terminal::Destination => 1,
        }
    }

    fn keys(self) -> TerminalKeys {
        match self {
            Terminal::Departure => TerminalKeys {
                ident: "sidident",
                kind: "sidtype",
                limit: "sidlimit",
                database: "siddb",
            },
            Terminal::Destination => TerminalKeys {
                ident: "starident",
                kind: "startype",
                limit: "starlimit",
                database: "stardb",
            },
        }
    }
}

pub const DEFAULT_VFR_LIMIT: f64 = 20.0;
pub const DEFAULT_IFR_LIMIT: f64 = 40.0;

/// SID/STAR distance limits, {departure, destination} × {VFR, IFR}.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitTable {
    values: [[f64; 2]; 2],
    overridden: [[bool; 2]; 2],
}

impl Default for LimitTable {
    fn default() -> Self {
        Self {
            values: [[DEFAULT_VFR_LIMIT, DEFAULT_IFR_LIMIT]; 2],
            overridden: [[false; 2]; 2],
        }
    }
}

impl LimitTable {
    pub fn get(&self, terminal: Terminal, rules: FlightRules) -> f64 {
        self.values[terminal.slot()][rules.slot()]
    }

    pub fn is_overridden(&self, terminal: Terminal, rules: FlightRules) -> bool {
        self.overridden[terminal.slot()][rules.slot()]
    }

    /// Server-provided default; a user override for the slot wins.
    pub fn offer_default(&mut self, terminal: Terminal, rules: FlightRules, value: f64) -> bool {
        if self.is_overridden(terminal, rules) {
            return false;
        }
        self.values[terminal.slot()][rules.slot()] = value;
        true
    }

    pub fn set_user(&mut self, terminal: Terminal, rules: FlightRules, value: f64) {
        self.values[terminal.slot()][rules.slot()] = value;
        self.overridden[terminal.slot()][rules.slot()] = true;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aerodrome {
    pub icao: String,
    pub procedure_ident: String,
    pub rules: FlightRules,
    pub limit: f64,
    pub use_database: bool,
    /// ICAO code as resolved by the server.
    pub reported_icao: String,
    pub name: String,
    /// Procedure type and identifier, e.g. "SID GERSA2A".
    pub procedure: Option<String>,
    /// Raw fixed-point `"lat,lon"`.
    pub coord: Option<String>,
}

impl Aerodrome {
    fn new(terminal: Terminal, limits: &LimitTable) -> Self {
        Self {
            icao: String::new(),
            procedure_ident: String::new(),
            rules: FlightRules::Ifr,
            limit: limits.get(terminal, FlightRules::Ifr),
            use_database: false,
            reported_icao: String::new(),
            name: String::new(),
            procedure: None,
            coord: None,
        }
    }

    pub fn display_name(&self) -> String {
        match (self.reported_icao.is_empty(), self.name.is_empty()) {
            (false, false) => format!("{} {}", self.reported_icao, self.name),
            (false, true) => self.reported_icao.clone(),
            (true, _) => self.name.clone(),
        }
    }

    pub fn position(&self) -> Option<LatLon> {
        self.coord
            .as_deref()
            .and_then(RawCoord::parse)
            .map(RawCoord::to_degrees)
    }

    fn has_coord(&self) -> bool {
        self.coord.as_deref().is_some_and(|coord| !coord.is_empty())
    }

    fn apply(
        &mut self,
        terminal: Terminal,
        frame: &Frame,
        seed: bool,
        limits: &mut LimitTable,
    ) {
        let keys = terminal.keys();
        if let Some(icao) = frame.text("icao") {
            if seed {
                self.icao = icao.clone();
            }
            self.reported_icao = icao;
        }
        if let Some(name) = frame.text("name") {
            self.name = name;
        }
        if let Some(ident) = frame.text(keys.ident) {
            if let Some(kind) = frame.text(keys.kind) {
                self.procedure = Some(format!("{kind} {ident}"));
            }
            if seed {
                self.procedure_ident = ident;
            }
        }
        if let Some(coord) = frame.text("coord") {
            self.coord = Some(coord);
        }
        if frame.is_init() {
            if let Some(limit) = frame.number(keys.limit) {
                if !limits.offer_default(terminal, FlightRules::Ifr, limit) {
                    debug!(?terminal, "keeping user-set IFR limit over server default");
                }
                self.limit = limits.get(terminal, self.rules);
            }
            if seed {
                if let Some(flag) = frame.flag(keys.database) {
                    self.use_database = flag;
                }
            }
        }
    }

    fn to_frame(&self, terminal: Terminal) -> Frame {
        let keys = terminal.keys();
        let mut frame = Frame::command(terminal.group().command_name());
        if !self.icao.is_empty() {
            frame = frame.with_field("icao", self.icao.clone());
        }
        if !self.procedure_ident.is_empty() {
            frame = frame.with_field(keys.ident, self.procedure_ident.clone());
        }
        frame = match self.rules {
            FlightRules::Ifr => frame.with_field("ifr", true),
            FlightRules::Vfr => frame.with_field("vfr", true),
        };
        frame
            .with_number(keys.limit, self.limit)
            .with_field(keys.database, self.use_database)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enroute {
    pub dct_limit: f64,
    pub dct_penalty: f64,
    pub honour_airway_levels: bool,
}

impl Default for Enroute {
    fn default() -> Self {
        Self {
            dct_limit: 50.0,
            dct_penalty: 1.0,
            honour_airway_levels: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Levels {
    pub base: f64,
    pub top: f64,
}

impl Default for Levels {
    fn default() -> Self {
        Self {
            base: 50.0,
            top: 120.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Preferred {
    pub level: f64,
    pub penalty: f64,
    pub climb: f64,
    pub descent: f64,
}

impl Default for Preferred {
    fn default() -> Self {
        Self {
            level: 100.0,
            penalty: 1.1,
            climb: 10.0,
            descent: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tfr {
    /// Reported by the server; local TFR cannot be enabled without it.
    pub available: bool,
    pub enabled: bool,
    pub trace: String,
    pub disable: String,
    pub precomputed_graph: bool,
}

impl Default for Tfr {
    fn default() -> Self {
        Self {
            available: false,
            enabled: true,
            trace: String::new(),
            disable: String::new(),
            precomputed_graph: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AircraftTemplate {
    #[default]
    P28R,
    P28A,
    M20P,
    C172,
}

impl AircraftTemplate {
    pub fn template_id(self) -> &'static str {
        match self {
            AircraftTemplate::P28R => "hbpbx",
            AircraftTemplate::P28A => "hbpho",
            AircraftTemplate::M20P => "hbdhg",
            AircraftTemplate::C172 => "hbtda",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AircraftTemplate::P28R => "P28R Piper Arrow",
            AircraftTemplate::P28A => "P28A Piper Archer",
            AircraftTemplate::M20P => "M20P Mooney",
            AircraftTemplate::C172 => "C172 Cessna 172",
        }
    }
}

impl FromStr for AircraftTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "P28R" => Ok(AircraftTemplate::P28R),
            "P28A" => Ok(AircraftTemplate::P28A),
            "M20P" => Ok(AircraftTemplate::M20P),
            "C172" => Ok(AircraftTemplate::C172),
            _ => Err(format!("unknown aircraft '{s}' (P28R, P28A, M20P or C172)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizationTarget {
    #[default]
    Time,
    Fuel,
    Preferred,
}

impl OptimizationTarget {
    pub fn wire_name(self) -> &'static str {
        match self {
            OptimizationTarget::Time => "time",
            OptimizationTarget::Fuel => "fuel",
            OptimizationTarget::Preferred => "preferred",
        }
    }
}

impl fmt::Display for OptimizationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for OptimizationTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "time" => Ok(OptimizationTarget::Time),
            "fuel" => Ok(OptimizationTarget::Fuel),
            "preferred" | "preferred-level" => Ok(OptimizationTarget::Preferred),
            _ => Err(format!("unknown optimization target '{s}' (time, fuel or preferred)")),
        }
    }
}

/// One user edit.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamEdit {
    Icao(Terminal, String),
    ProcedureIdent(Terminal, String),
    Rules(Terminal, FlightRules),
    Limit(Terminal, f64),
    UseDatabase(Terminal, bool),
    DctLimit(f64),
    DctPenalty(f64),
    HonourAirwayLevels(bool),
    BaseLevel(f64),
    TopLevel(f64),
    PreferredLevel(f64),
    PreferredPenalty(f64),
    Climb(f64),
    Descent(f64),
    TfrEnabled(bool),
    TfrTrace(String),
    TfrDisable(String),
    PrecomputedGraph(bool),
    Aircraft(AircraftTemplate),
    Optimization(OptimizationTarget),
}

/// Where an edit is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Group(GroupKind),
    Aircraft,
    Optimization,
}

impl ParamEdit {
    pub fn target(&self) -> EditTarget {
        use ParamEdit::*;
        match self {
            Icao(t, _) | ProcedureIdent(t, _) | Rules(t, _) | Limit(t, _) | UseDatabase(t, _) => {
                EditTarget::Group(t.group())
            }
            DctLimit(_) | DctPenalty(_) | HonourAirwayLevels(_) => {
                EditTarget::Group(GroupKind::Enroute)
            }
            BaseLevel(_) | TopLevel(_) => EditTarget::Group(GroupKind::Levels),
            PreferredLevel(_) | PreferredPenalty(_) | Climb(_) | Descent(_) => {
                EditTarget::Group(GroupKind::Preferred)
            }
            TfrEnabled(_) | TfrTrace(_) | TfrDisable(_) | PrecomputedGraph(_) => {
                EditTarget::Group(GroupKind::Tfr)
            }
            Aircraft(_) => EditTarget::Aircraft,
            Optimization(_) => EditTarget::Optimization,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub departure: Aerodrome,
    pub destination: Aerodrome,
    pub enroute: Enroute,
    pub levels: Levels,
    pub preferred: Preferred,
    pub tfr: Tfr,
    pub aircraft: AircraftTemplate,
    pub optimization: OptimizationTarget,
    limits: LimitTable,
    initialized: [bool; 6],
}

impl Default for Parameters {
    fn default() -> Self {
        Self::new()
    }
}

impl Parameters {
    pub fn new() -> Self {
        let limits = LimitTable::default();
        Self {
            departure: Aerodrome::new(Terminal::Departure, &limits),
            destination: Aerodrome::new(Terminal::Destination, &limits),
            enroute: Enroute::default(),
            levels: Levels::default(),
            preferred: Preferred::default(),
            tfr: Tfr::default(),
            aircraft: AircraftTemplate::default(),
            optimization: OptimizationTarget::default(),
            limits,
            initialized: [false; 6],
        }
    }

    pub fn limits(&self) -> &LimitTable {
        &self.limits
    }

    pub fn is_initialized(&self, group: GroupKind) -> bool {
        self.initialized[group.index()]
    }

    pub fn aerodrome(&self, terminal: Terminal) -> &Aerodrome {
        match terminal {
            Terminal::Departure => &self.departure,
            Terminal::Destination => &self.destination,
        }
    }

    fn aerodrome_mut(&mut self, terminal: Terminal) -> &mut Aerodrome {
        match terminal {
            Terminal::Departure => &mut self.departure,
            Terminal::Destination => &mut self.destination,
        }
    }

    /// Apply an inbound frame for `group`.
    pub fn apply_inbound(&mut self, group: GroupKind, frame: &Frame) {
        let init = frame.is_init();
        let seed = !init || !self.is_initialized(group);
        if !seed {
            debug!(%group, "group already initialized; init reply keeps local values");
        }
        match group {
            GroupKind::Departure => {
                self.departure
                    .apply(Terminal::Departure, frame, seed, &mut self.limits)
            }
            GroupKind::Destination => {
                self.destination
                    .apply(Terminal::Destination, frame, seed, &mut self.limits)
            }
            GroupKind::Enroute if seed => {
                let enroute = &mut self.enroute;
                patch_number(frame, "dctlimit", &mut enroute.dct_limit);
                patch_number(frame, "dctpenalty", &mut enroute.dct_penalty);
                patch_flag(frame, "honourawylevels", &mut enroute.honour_airway_levels);
            }
            GroupKind::Levels if seed => {
                patch_number(frame, "base", &mut self.levels.base);
                patch_number(frame, "top", &mut self.levels.top);
            }
            GroupKind::Preferred if seed => {
                let preferred = &mut self.preferred;
                patch_number(frame, "level", &mut preferred.level);
                patch_number(frame, "penalty", &mut preferred.penalty);
                patch_number(frame, "climb", &mut preferred.climb);
                patch_number(frame, "descent", &mut preferred.descent);
            }
            GroupKind::Tfr => {
                if init {
                    self.tfr.available = frame.flag("available").unwrap_or(false);
                } else {
                    patch_flag(frame, "available", &mut self.tfr.available);
                }
                if seed {
                    let tfr = &mut self.tfr;
                    patch_flag(frame, "enabled", &mut tfr.enabled);
                    patch_text(frame, "trace", &mut tfr.trace);
                    patch_text(frame, "disable", &mut tfr.disable);
                    patch_flag(frame, "precompgraph", &mut tfr.precomputed_graph);
                }
            }
            GroupKind::Enroute | GroupKind::Levels | GroupKind::Preferred => {}
        }
        if init {
            self.initialized[group.index()] = true;
        }
    }

    /// Apply a local edit and return the one frame to send for it.
    pub fn apply_edit(&mut self, edit: ParamEdit) -> Frame {
        let target = edit.target();
        match edit {
            ParamEdit::Icao(t, icao) => self.aerodrome_mut(t).icao = icao.trim().to_uppercase(),
            ParamEdit::ProcedureIdent(t, ident) => {
                self.aerodrome_mut(t).procedure_ident = ident.trim().to_uppercase()
            }
            ParamEdit::Rules(t, rules) => {
                let limit = self.limits.get(t, rules);
                let aerodrome = self.aerodrome_mut(t);
                aerodrome.rules = rules;
                aerodrome.limit = limit;
            }
            ParamEdit::Limit(t, limit) => {
                let rules = self.aerodrome(t).rules;
                self.limits.set_user(t, rules, limit);
                self.aerodrome_mut(t).limit = limit;
            }
            ParamEdit::UseDatabase(t, flag) => self.aerodrome_mut(t).use_database = flag,
            ParamEdit::DctLimit(v) => self.enroute.dct_limit = v,
            ParamEdit::DctPenalty(v) => self.enroute.dct_penalty = v,
            ParamEdit::HonourAirwayLevels(v) => self.enroute.honour_airway_levels = v,
            ParamEdit::BaseLevel(v) => self.levels.base = v,
            ParamEdit::TopLevel(v) => self.levels.top = v,
            ParamEdit::PreferredLevel(v) => self.preferred.level = v,
            ParamEdit::PreferredPenalty(v) => self.preferred.penalty = v,
            ParamEdit::Climb(v) => self.preferred.climb = v,
            ParamEdit::Descent(v) => self.preferred.descent = v,
            ParamEdit::TfrEnabled(v) => self.tfr.enabled = v,
            ParamEdit::TfrTrace(v) => self.tfr.trace = v,
            ParamEdit::TfrDisable(v) => self.tfr.disable = v,
            ParamEdit::PrecomputedGraph(v) => self.tfr.precomputed_graph = v,
            ParamEdit::Aircraft(template) => self.aircraft = template,
            ParamEdit::Optimization(target) => self.optimization = target,
        }
        match target {
            EditTarget::Group(group) => {
                self.initialized[group.index()] = true;
                self.group_frame(group)
            }
            EditTarget::Aircraft => self.aircraft_frame(),
            EditTarget::Optimization => self.optimization_frame(),
        }
    }

    pub fn group_frame(&self, group: GroupKind) -> Frame {
        match group {
            GroupKind::Departure => self.departure.to_frame(Terminal::Departure),
            GroupKind::Destination => self.destination.to_frame(Terminal::Destination),
            GroupKind::Enroute => Frame::command(group.command_name())
                .with_number("dctlimit", self.enroute.dct_limit)
                .with_number("dctpenalty", self.enroute.dct_penalty)
                .with_field("honourawylevels", self.enroute.honour_airway_levels)
                .with_number("forceenrouteifr", 1.0),
            GroupKind::Levels => Frame::command(group.command_name())
                .with_number("base", self.levels.base)
                .with_number("top", self.levels.top),
            GroupKind::Preferred => Frame::command(group.command_name())
                .with_number("level", self.preferred.level)
                .with_number("penalty", self.preferred.penalty)
                .with_number("climb", self.preferred.climb)
                .with_number("descent", self.preferred.descent),
            GroupKind::Tfr => Frame::command(group.command_name())
                .with_field("enabled", self.tfr.enabled)
                .with_field("trace", self.tfr.trace.clone())
                .with_field("disable", self.tfr.disable.clone())
                .with_field("precompgraph", self.tfr.precomputed_graph),
        }
    }

    pub fn aircraft_frame(&self) -> Frame {
        Frame::command(AIRCRAFT)
            .with_field("template", self.aircraft.template_id())
            .with_field("registration", "ABCDE")
    }

    pub fn optimization_frame(&self) -> Frame {
        Frame::command(OPTIMIZATION).with_field("target", self.optimization.wire_name())
    }

    /// Full resync followed by `start`.
    pub fn start_batch(&self) -> Vec<Frame> {
        let mut frames: Vec<Frame> = GroupKind::ALL
            .into_iter()
            .map(|group| self.group_frame(group))
            .collect();
        frames.push(self.aircraft_frame());
        frames.push(self.optimization_frame());
        frames.push(Frame::command(START));
        frames
    }

    /// Both ends resolved to a named aerodrome with a position.
    pub fn start_blocker(&self) -> Option<&'static str> {
        if self.departure.display_name().chars().count() < 4 {
            Some("departure aerodrome not resolved")
        } else if self.destination.display_name().chars().count() < 4 {
            Some("destination aerodrome not resolved")
        } else if !self.departure.has_coord() {
            Some("departure position unknown")
        } else if !self.destination.has_coord() {
            Some("destination position unknown")
        } else {
            None
        }
    }

    pub fn can_start(&self) -> bool {
        self.start_blocker().is_none()
    }
}

fn patch_number(frame: &Frame, key: &str, slot: &mut f64) {
    if let Some(value) = frame.number(key) {
        *slot = value;
    }
}

fn patch_flag(frame: &Frame, key: &str, slot: &mut bool) {
    if let Some(value) = frame.flag(key) {
        *slot = value;
    }
}

fn patch_text(frame: &Frame, key: &str, slot: &mut String) {
    if let Some(value) = frame.text(key) {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn init(group: GroupKind) -> Frame {
        Frame::init(group.command_name())
    }

    fn live(group: GroupKind) -> Frame {
        Frame::command(group.command_name())
    }

    #[test]
    fn default_departure_frame() {
        let params = Parameters::new();
        let frame = params.group_frame(GroupKind::Departure);
        assert_eq!(frame.command_name(), Some("departure"));
        assert!(!frame.has("icao"));
        assert!(!frame.has("sidident"));
        assert_eq!(frame.field("ifr"), Some(&json!(true)));
        assert!(!frame.has("vfr"));
        assert_eq!(frame.field("sidlimit"), Some(&json!(40)));
        assert_eq!(frame.field("siddb"), Some(&json!(false)));
        assert!(!frame.is_init());
    }

    #[test]
    fn edit_emits_whole_group() {
        let mut params = Parameters::new();
        let frame = params.apply_edit(ParamEdit::TopLevel(180.0));
        assert_eq!(frame.command_name(), Some("levels"));
        assert_eq!(frame.field("base"), Some(&json!(50)));
        assert_eq!(frame.field("top"), Some(&json!(180)));
        assert_eq!(frame.fields().len(), 2);

        let frame = params.apply_edit(ParamEdit::DctPenalty(1.25));
        assert_eq!(frame.field("dctlimit"), Some(&json!(50)));
        assert_eq!(frame.field("dctpenalty"), Some(&json!(1.25)));
        assert_eq!(frame.field("honourawylevels"), Some(&json!(true)));
        assert_eq!(frame.field("forceenrouteifr"), Some(&json!(1)));
    }

    #[test]
    fn init_seeds_once_and_never_clobbers_edits() {
        let mut params = Parameters::new();
        let seed = init(GroupKind::Levels).with_number("base", 80.0);
        params.apply_inbound(GroupKind::Levels, &seed);
        assert_eq!(params.levels.base, 80.0);
        assert!(params.is_initialized(GroupKind::Levels));

        params.apply_edit(ParamEdit::BaseLevel(60.0));
        let seed = init(GroupKind::Levels).with_number("base", 90.0);
        params.apply_inbound(GroupKind::Levels, &seed);
        assert_eq!(params.levels.base, 60.0);

        let update = live(GroupKind::Levels).with_number("top", 150.0);
        params.apply_inbound(GroupKind::Levels, &update);
        assert_eq!(params.levels.base, 60.0);
        assert_eq!(params.levels.top, 150.0);
    }

    #[test]
    fn edit_before_init_blocks_the_snapshot() {
        let mut params = Parameters::new();
        params.apply_edit(ParamEdit::PreferredLevel(75.0));
        params.apply_inbound(
            GroupKind::Preferred,
            &init(GroupKind::Preferred)
                .with_number("level", 95.0)
                .with_number("climb", 12.0),
        );
        assert_eq!(params.preferred.level, 75.0);
        assert_eq!(params.preferred.climb, 10.0);
    }

    #[test]
    fn sparse_patch_leaves_absent_fields() {
        let mut params = Parameters::new();
        params.apply_edit(ParamEdit::Icao(Terminal::Departure, "lszh".into()));
        params.apply_inbound(
            GroupKind::Departure,
            &live(GroupKind::Departure).with_field("name", "ZURICH"),
        );
        assert_eq!(params.departure.icao, "LSZH");
        assert_eq!(params.departure.name, "ZURICH");
        assert_eq!(params.departure.display_name(), "ZURICH");

        params.apply_inbound(
            GroupKind::Departure,
            &live(GroupKind::Departure)
                .with_field("icao", "LSZH")
                .with_field("sidident", "GERSA2A")
                .with_field("sidtype", "SID"),
        );
        assert_eq!(params.departure.display_name(), "LSZH ZURICH");
        assert_eq!(params.departure.procedure.as_deref(), Some("SID GERSA2A"));
    }

    #[test]
    fn live_limit_is_not_a_default() {
        let mut params = Parameters::new();
        params.apply_inbound(
            GroupKind::Destination,
            &live(GroupKind::Destination).with_number("starlimit", 99.0),
        );
        assert_eq!(params.destination.limit, DEFAULT_IFR_LIMIT);
    }

    #[test]
    fn limit_table_follows_rules_and_overrides() {
        let mut params = Parameters::new();
        let t = Terminal::Departure;
        let seed = init(GroupKind::Departure).with_number("sidlimit", 35.0);
        params.apply_inbound(GroupKind::Departure, &seed);
        assert_eq!(params.departure.limit, 35.0);

        let frame = params.apply_edit(ParamEdit::Rules(t, FlightRules::Vfr));
        assert_eq!(params.departure.limit, DEFAULT_VFR_LIMIT);
        assert_eq!(frame.field("vfr"), Some(&json!(true)));
        assert!(!frame.has("ifr"));

        params.apply_edit(ParamEdit::Limit(t, 25.0));
        assert!(params.limits().is_overridden(t, FlightRules::Vfr));
        params.apply_edit(ParamEdit::Rules(t, FlightRules::Ifr));
        assert_eq!(params.departure.limit, 35.0);
        params.apply_edit(ParamEdit::Rules(t, FlightRules::Vfr));
        assert_eq!(params.departure.limit, 25.0);

        params.apply_edit(ParamEdit::Rules(t, FlightRules::Ifr));
        params.apply_edit(ParamEdit::Limit(t, 50.0));
        let reseed = init(GroupKind::Departure).with_number("sidlimit", 60.0);
        params.apply_inbound(GroupKind::Departure, &reseed);
        assert_eq!(params.departure.limit, 50.0);
        assert_eq!(
            params.limits().get(Terminal::Destination, FlightRules::Ifr),
            DEFAULT_IFR_LIMIT
        );
    }

    #[test]
    fn tfr_availability_is_reported() {
        let mut params = Parameters::new();
        params.apply_inbound(
            GroupKind::Tfr,
            &init(GroupKind::Tfr)
                .with_field("available", 1)
                .with_field("enabled", false)
                .with_field("trace", "R1"),
        );
        assert!(params.tfr.available);
        assert!(!params.tfr.enabled);
        assert_eq!(params.tfr.trace, "R1");

        params.apply_inbound(GroupKind::Tfr, &init(GroupKind::Tfr));
        assert!(!params.tfr.available);
        assert_eq!(params.tfr.trace, "R1");
    }

    #[test]
    fn start_gate_needs_names_and_positions() {
        let mut params = Parameters::new();
        assert!(!params.can_start());
        params.apply_inbound(
            GroupKind::Departure,
            &live(GroupKind::Departure)
                .with_field("icao", "LSZH")
                .with_field("coord", "1,2"),
        );
        params.apply_inbound(
            GroupKind::Destination,
            &live(GroupKind::Destination).with_field("name", "BRN"),
        );
        assert_eq!(params.start_blocker(), Some("destination aerodrome not resolved"));
        params.apply_inbound(
            GroupKind::Destination,
            &live(GroupKind::Destination).with_field("icao", "LSZB"),
        );
        assert_eq!(params.start_blocker(), Some("destination position unknown"));
        params.apply_inbound(
            GroupKind::Destination,
            &live(GroupKind::Destination).with_field("coord", "3,4"),
        );
        assert!(params.can_start());
    }

    #[test]
    fn start_batch_resyncs_everything_first() {
        let params = Parameters::new();
        let names: Vec<_> = params
            .start_batch()
            .iter()
            .map(|frame| frame.command_name().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            names,
            [
                "departure",
                "destination",
                "enroute",
                "levels",
                "preferred",
                "tfr",
                "aircraft",
                "optimization",
                "start"
            ]
        );
    }

    #[test]
    fn aircraft_and_optimization_settings() {
        let mut params = Parameters::new();
        let frame = params.apply_edit(ParamEdit::Aircraft("c172".parse().unwrap()));
        assert_eq!(frame.field("template"), Some(&json!("hbtda")));
        assert_eq!(frame.field("registration"), Some(&json!("ABCDE")));
        let frame = params.apply_edit(ParamEdit::Optimization("Fuel".parse().unwrap()));
        assert_eq!(frame.field("target"), Some(&json!("fuel")));
        assert!("B747".parse::<AircraftTemplate>().is_err());
        assert!(!params.is_initialized(GroupKind::Enroute));
    }
}
