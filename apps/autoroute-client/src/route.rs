//! Reassembly of streamed route candidates.
//!
//! The server streams each candidate as `fplbegin`, one `fplwpt` per
//! waypoint and a closing `fplend` with the metrics. Relay deployments send
//! the whole candidate in one `fpl` frame instead. Either way a candidate
//! only becomes visible once complete, replacing the previous one.

use autoroute_proto::{format_hms, Frame, LatLon, RawCoord};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RouteMetrics {
    /// Great-circle baseline.
    pub gc_distance: f64,
    pub min_time: f64,
    pub min_fuel: f64,
    /// Current candidate.
    pub distance: f64,
    pub time: f64,
    pub fuel: f64,
}

impl RouteMetrics {
    fn from_frame(frame: &Frame) -> Self {
        let number = |key: &str| frame.number(key).unwrap_or(0.0);
        Self {
            gc_distance: number("gcdist"),
            min_time: number("mintime"),
            min_fuel: number("minfuel"),
            distance: number("routedist"),
            time: number("routetime"),
            fuel: number("routefuel"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteCandidate {
    pub waypoints: Vec<LatLon>,
    /// Textual flight plan.
    pub plan: String,
    pub iteration: String,
    pub local_iteration: String,
    pub remote_iteration: String,
    pub metrics: RouteMetrics,
}

impl RouteCandidate {
    fn finish(waypoints: Vec<LatLon>, frame: &Frame) -> Self {
        let text = |key: &str| frame.text(key).unwrap_or_default();
        Self {
            waypoints,
            plan: text("fpl"),
            iteration: text("iteration"),
            local_iteration: text("localiteration"),
            remote_iteration: text("remoteiteration"),
            metrics: RouteMetrics::from_frame(frame),
        }
    }

    /// `iteration (local/remote)`.
    pub fn iteration_label(&self) -> String {
        format!(
            "{} ({}/{})",
            self.iteration, self.local_iteration, self.remote_iteration
        )
    }

    pub fn summary(&self) -> String {
        let m = &self.metrics;
        format!(
            "iteration {}: {:.1} nm {} {:.1} fuel (great circle {:.1} nm {} {:.1} fuel)",
            self.iteration_label(),
            m.distance,
            format_hms(m.time),
            m.fuel,
            m.gc_distance,
            format_hms(m.min_time),
            m.min_fuel,
        )
    }
}

#[derive(Debug, Default)]
struct RouteBuilder {
    waypoints: Vec<LatLon>,
}

#[derive(Debug, Default)]
pub struct RouteAssembler {
    building: Option<RouteBuilder>,
    current: Option<Arc<RouteCandidate>>,
}

impl RouteAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last completed candidate.
    pub fn current(&self) -> Option<Arc<RouteCandidate>> {
        self.current.clone()
    }

    pub fn is_building(&self) -> bool {
        self.building.is_some()
    }

    pub fn pending_waypoints(&self) -> usize {
        self.building
            .as_ref()
            .map(|builder| builder.waypoints.len())
            .unwrap_or(0)
    }

    pub fn begin(&mut self) {
        self.building = Some(RouteBuilder::default());
    }

    /// Append the frame's waypoint. Returns whether one was added.
    pub fn waypoint(&mut self, frame: &Frame) -> bool {
        let Some(raw) = frame.text("coord") else {
            return false;
        };
        let Some(coord) = RawCoord::parse(&raw) else {
            warn!(coord = %raw, "skipping malformed waypoint");
            return false;
        };
        let builder = self.building.get_or_insert_with(|| {
            debug!("waypoint without route begin; starting empty route");
            RouteBuilder::default()
        });
        builder.waypoints.push(coord.to_degrees());
        true
    }

    pub fn end(&mut self, frame: &Frame) -> Arc<RouteCandidate> {
        let waypoints = self
            .building
            .take()
            .map(|builder| builder.waypoints)
            .unwrap_or_default();
        self.publish(RouteCandidate::finish(waypoints, frame))
    }

    /// Whole candidate in one frame, waypoints in `fplan` as decimal degrees.
    pub fn plan(&mut self, frame: &Frame) -> Arc<RouteCandidate> {
        let waypoints = match frame.field("fplan") {
            Some(Value::Array(points)) => points.iter().filter_map(plan_point).collect(),
            _ => Vec::new(),
        };
        self.publish(RouteCandidate::finish(waypoints, frame))
    }

    fn publish(&mut self, candidate: RouteCandidate) -> Arc<RouteCandidate> {
        let candidate = Arc::new(candidate);
        self.current = Some(candidate.clone());
        candidate
    }
}

fn plan_point(point: &Value) -> Option<LatLon> {
    let coordinate = |key: &str| -> Option<f64> {
        match point.get(key)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    };
    match (coordinate("coordlatdeg"), coordinate("coordlondeg")) {
        (Some(lat), Some(lon)) => Some(LatLon::new(lat, lon)),
        _ => {
            warn!(%point, "skipping malformed plan point");
            None
        }
    }
}
