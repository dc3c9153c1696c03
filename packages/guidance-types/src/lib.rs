//! # guidance-types
//!
//! Shared geometry and wire types for the StraightBar guidance suite.
//!
//! These types are used by:
//! - `guidance-core`: the reference-line model and stream controller
//! - `backend`: receiving and parsing fix envelopes from positioning frontends
//! - `gps-simulator`: producing fix envelopes for development and testing
//!
//! ## Coordinate Conventions
//!
//! - **Geographic frame**: WGS-84 latitude/longitude in decimal degrees
//! - **Planar frame**: local equirectangular projection around a reference
//!   point, X = East, Y = North, meters
//! - **Line frame**: X = along the AB line (A→B direction), Y = perpendicular
//!   (the 90° counter-clockwise normal side is positive)

use serde::{Deserialize, Serialize};

// ── Geographic point ──────────────────────────────────────────────────────────

/// A captured geographic coordinate. Immutable once taken from a fix.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

// ── Planar vector ─────────────────────────────────────────────────────────────

/// 2D vector in the local planar frame (meters, X = East, Y = North).
/// Ephemeral — derived per projection call, never stored long-term.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanarVector {
    pub x: f64,
    pub y: f64,
}

impl PlanarVector {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn dot(&self, other: &PlanarVector) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn add(&self, other: &PlanarVector) -> PlanarVector {
        PlanarVector::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(&self, other: &PlanarVector) -> PlanarVector {
        PlanarVector::new(self.x - other.x, self.y - other.y)
    }

    pub fn scale(&self, s: f64) -> PlanarVector {
        PlanarVector::new(self.x * s, self.y * s)
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Unit vector in this direction, or `None` for the zero vector.
    /// Callers must decide what a missing direction means — there is no
    /// silent zero-length fallback.
    pub fn normalized(&self) -> Option<PlanarVector> {
        let n = self.norm();
        if n == 0.0 {
            None
        } else {
            Some(PlanarVector::new(self.x / n, self.y / n))
        }
    }

    /// 90° counter-clockwise rotation: (x, y) → (−y, x).
    pub fn rotated_ccw(&self) -> PlanarVector {
        PlanarVector::new(-self.y, self.x)
    }
}

// ── Fix feed wire format ──────────────────────────────────────────────────────

/// One message on the UDP fix feed: either a position fix or a fault the
/// positioning frontend wants the controller to know about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FeedMessage {
    Fix(FixEnvelope),
    Fault(FaultEnvelope),
}

/// JSON envelope for one position fix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixEnvelope {
    /// Monotonically increasing per-sender sequence number.
    /// The feed rejects out-of-order datagrams (UDP reorder/replay).
    pub seq: u64,
    /// Sender wall-clock timestamp in milliseconds (staleness filtering)
    pub epoch_ms: u64,
    pub lat: f64,
    pub lon: f64,
    /// Estimated accuracy radius in meters, when the receiver reports one
    pub accuracy_m: Option<f64>,
    /// Ground speed in m/s. Absent when the receiver cannot estimate it.
    pub speed_mps: Option<f64>,
    /// Course over ground in degrees (0 = north). Absent below walking speed.
    pub heading_deg: Option<f64>,
}

/// A fault reported by the positioning frontend itself, e.g. the device
/// denied location access or lost satellite lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultEnvelope {
    pub kind: FaultKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultKind {
    /// The user (or platform) refused location access — not retryable
    PermissionDenied,
    /// No fix available right now (no satellites, indoors, cold start)
    PositionUnavailable,
    /// Anything else the frontend wants logged
    Other,
}
