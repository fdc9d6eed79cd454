//! Fixed-point coordinates as streamed by the autorouter.
//!
//! Waypoints arrive as `"<lat>,<lon>"` where each component is a signed
//! integer in units of `90 / 2^30` degrees.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Degrees per raw coordinate unit.
pub const COORD_SCALE: f64 = 90.0 / (1u64 << 30) as f64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawCoord {
    pub lat: f64,
    pub lon: f64,
}

impl RawCoord {
    /// Parse the comma-separated raw pair. Returns `None` unless there are
    /// exactly two finite numeric components.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split(',');
        let lat = parts.next()?.trim().parse::<f64>().ok()?;
        let lon = parts.next()?.trim().parse::<f64>().ok()?;
        if parts.next().is_some() || !lat.is_finite() || !lon.is_finite() {
            return None;
        }
        Some(Self { lat, lon })
    }

    pub fn to_degrees(self) -> LatLon {
        LatLon {
            lat: self.lat * COORD_SCALE,
            lon: self.lon * COORD_SCALE,
        }
    }
}

/// Decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat, self.lon)
    }
}

/// Seconds as `H:MM:SS`. Fractions are truncated and negative or non-finite
/// input renders as zero.
pub fn format_hms(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.trunc() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    let secs = total % 60;
    format!("{hours}:{minutes:02}:{secs:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_turn_is_ninety_degrees() {
        let coord = RawCoord::parse("1073741824,-536870912")
            .expect("parse")
            .to_degrees();
        assert!((coord.lat - 90.0).abs() < 1e-9);
        assert!((coord.lon + 45.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_malformed_pairs() {
        assert!(RawCoord::parse("").is_none());
        assert!(RawCoord::parse("12").is_none());
        assert!(RawCoord::parse("1,2,3").is_none());
        assert!(RawCoord::parse("north,east").is_none());
        assert!(RawCoord::parse(" 5 , 6 ").is_some());
    }

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(format_hms(0.0), "0:00:00");
        assert_eq!(format_hms(3725.9), "1:02:05");
        assert_eq!(format_hms(36000.0), "10:00:00");
        assert_eq!(format_hms(-5.0), "0:00:00");
    }
}
