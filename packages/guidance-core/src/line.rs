//! line.rs — the AB reference line and signed lateral deviation
//!
//! The line is defined by two captured geographic points A and B. A is the
//! planar origin; B projected into A's frame gives the direction, and the
//! 90° counter-clockwise rotation of the direction gives the normal. The
//! signed deviation of a position is its projection onto that normal:
//! positive on the normal side, negative on the other. The sign convention
//! is load-bearing — the steering indicator is derived from it.
//!
//! A == B is not an error: the orientation is explicitly tagged degenerate
//! and every deviation reads zero until B moves.

use serde::{Deserialize, Serialize};

use guidance_types::{GeoPoint, PlanarVector};

use crate::geo::project;

// ── Orientation ───────────────────────────────────────────────────────────────

/// Orientation of a reference line.
///
/// `Directed` holds unit direction and unit normal (normal = direction
/// rotated 90° CCW, so the pair is always perpendicular). `Degenerate`
/// means A and B projected to the same planar point — the line exists but
/// has no orientation yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineOrientation {
    Directed {
        direction: PlanarVector,
        normal: PlanarVector,
    },
    Degenerate,
}

// ── Reference line ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceLine {
    origin: GeoPoint,
    orientation: LineOrientation,
}

impl ReferenceLine {
    /// Build the reference line from captured endpoints A and B.
    /// Recomputed from scratch whenever either endpoint changes.
    pub fn between(a: GeoPoint, b: GeoPoint) -> Self {
        let b_planar = project(b, a);
        let orientation = match b_planar.normalized() {
            Some(direction) => LineOrientation::Directed {
                direction,
                normal: direction.rotated_ccw(),
            },
            None => LineOrientation::Degenerate,
        };
        Self { origin: a, orientation }
    }

    pub fn origin(&self) -> GeoPoint {
        self.origin
    }

    pub fn orientation(&self) -> LineOrientation {
        self.orientation
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self.orientation, LineOrientation::Degenerate)
    }

    /// Signed perpendicular distance from `point` to this line, in meters.
    /// Degenerate lines report zero deviation, side 0.
    pub fn deviation(&self, point: GeoPoint) -> Deviation {
        match self.orientation {
            LineOrientation::Directed { normal, .. } => {
                let p = project(point, self.origin);
                let meters = p.dot(&normal);
                Deviation { meters, side: Side::of(meters) }
            }
            LineOrientation::Degenerate => Deviation::zero(),
        }
    }
}

// ── Deviation ─────────────────────────────────────────────────────────────────

/// Result of a deviation query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deviation {
    /// Signed lateral offset in meters (positive = normal side of A→B)
    pub meters: f64,
    pub side: Side,
}

impl Deviation {
    /// The "no signal" value: also what callers get with no line defined.
    pub fn zero() -> Self {
        Deviation { meters: 0.0, side: Side::OnLine }
    }
}

/// Which side of the AB line a position lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Left,
    OnLine,
    Right,
}

impl Side {
    /// Sign of a deviation value. Positive deviation is labeled `Right`,
    /// matching the steering arrow the presentation layer draws.
    pub fn of(meters: f64) -> Side {
        if meters > 0.0 {
            Side::Right
        } else if meters < 0.0 {
            Side::Left
        } else {
            Side::OnLine
        }
    }

    /// −1 / 0 / +1 for wire payloads.
    pub fn sign(&self) -> i8 {
        match self {
            Side::Left => -1,
            Side::OnLine => 0,
            Side::Right => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn directed(line: &ReferenceLine) -> (PlanarVector, PlanarVector) {
        match line.orientation() {
            LineOrientation::Directed { direction, normal } => (direction, normal),
            LineOrientation::Degenerate => panic!("expected a directed line"),
        }
    }

    #[test]
    fn direction_and_normal_are_unit_and_perpendicular() {
        let line = ReferenceLine::between(
            GeoPoint::new(35.0, 135.0),
            GeoPoint::new(35.0007, 135.0013),
        );
        let (dir, normal) = directed(&line);
        assert!((dir.norm() - 1.0).abs() < EPS);
        assert!((normal.norm() - 1.0).abs() < EPS);
        assert!(dir.dot(&normal).abs() < EPS);
    }

    #[test]
    fn swapping_endpoints_flips_the_sign() {
        let a = GeoPoint::new(35.0, 135.0);
        let b = GeoPoint::new(35.0, 135.001);
        let p = GeoPoint::new(35.00005, 135.0005);

        let ab = ReferenceLine::between(a, b).deviation(p);
        let ba = ReferenceLine::between(b, a).deviation(p);

        assert!(ab.meters.abs() > 1.0);
        assert!((ab.meters + ba.meters).abs() < 1e-6);
        assert_ne!(ab.side, ba.side);
    }

    #[test]
    fn eastbound_line_puts_north_point_on_positive_side() {
        // A→B heading due east at 35°N; P sits ~5.6 m north of the line.
        let a = GeoPoint::new(35.0, 135.0);
        let b = GeoPoint::new(35.0, 135.001);
        let p = GeoPoint::new(35.00005, 135.0005);

        let dev = ReferenceLine::between(a, b).deviation(p);
        let expected = 0.00005_f64.to_radians() * crate::geo::EARTH_RADIUS_M;
        assert!((dev.meters - expected).abs() < 1e-6);
        assert!(dev.meters > 5.0 && dev.meters < 6.0);
        assert_eq!(dev.side, Side::Right);
    }

    #[test]
    fn deviation_is_translation_invariant() {
        let a = GeoPoint::new(35.0, 135.0);
        let b = GeoPoint::new(35.0004, 135.0011);
        let p = GeoPoint::new(35.0003, 135.0002);
        let base = ReferenceLine::between(a, b).deviation(p).meters;

        let (dlat, dlon) = (0.0008, -0.0015);
        let shift = |g: GeoPoint| GeoPoint::new(g.lat + dlat, g.lon + dlon);
        let shifted = ReferenceLine::between(shift(a), shift(b))
            .deviation(shift(p))
            .meters;

        // The reference latitude moves slightly with the translation, so the
        // cos-scaling differs in the far decimals — centimeter tolerance.
        assert!((base - shifted).abs() < 1e-2);
    }

    #[test]
    fn coincident_endpoints_are_degenerate() {
        let a = GeoPoint::new(35.0, 135.0);
        let line = ReferenceLine::between(a, a);
        assert!(line.is_degenerate());

        let dev = line.deviation(GeoPoint::new(35.001, 135.001));
        assert_eq!(dev, Deviation::zero());
        assert_eq!(dev.side.sign(), 0);
    }

    #[test]
    fn moving_b_away_resolves_degeneracy() {
        let a = GeoPoint::new(35.0, 135.0);
        assert!(ReferenceLine::between(a, a).is_degenerate());
        let fixed = ReferenceLine::between(a, GeoPoint::new(35.0, 135.0003));
        assert!(!fixed.is_degenerate());
    }
}
