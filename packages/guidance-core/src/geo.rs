//! geo.rs — equirectangular projection between geographic and planar frames
//!
//! Flat-earth approximation: good to centimeters over the few hundred meters
//! an AB working line spans, degrading gracefully at long baselines or high
//! latitude. That degradation is a documented limitation of the whole system,
//! not an error condition — nothing here can fail.

use guidance_types::{GeoPoint, PlanarVector};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Project a geographic point into the planar frame centered on `reference`.
/// X = East, Y = North, meters. Pure and deterministic.
pub fn project(point: GeoPoint, reference: GeoPoint) -> PlanarVector {
    let x = (point.lon - reference.lon).to_radians()
        * reference.lat.to_radians().cos()
        * EARTH_RADIUS_M;
    let y = (point.lat - reference.lat).to_radians() * EARTH_RADIUS_M;
    PlanarVector::new(x, y)
}

/// Inverse of [`project`] around the same reference. Used by simulated
/// positioning sources that compute motion in planar meters.
pub fn unproject(v: PlanarVector, reference: GeoPoint) -> GeoPoint {
    let lat = reference.lat + (v.y / EARTH_RADIUS_M).to_degrees();
    let lon = reference.lon
        + (v.x / (EARTH_RADIUS_M * reference.lat.to_radians().cos())).to_degrees();
    GeoPoint::new(lat, lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_of_reference_is_origin() {
        let p = GeoPoint::new(35.0, 135.0);
        let v = project(p, p);
        assert_eq!(v, PlanarVector::zero());
    }

    #[test]
    fn one_millidegree_of_longitude_at_35n() {
        // 0.001° of longitude at 35°N ≈ 91.3 m east
        let a = GeoPoint::new(35.0, 135.0);
        let b = GeoPoint::new(35.0, 135.001);
        let v = project(b, a);
        let expected = 0.001_f64.to_radians() * 35.0_f64.to_radians().cos() * EARTH_RADIUS_M;
        assert!((v.x - expected).abs() < 1e-9);
        assert!(v.y.abs() < 1e-9);
        assert!((v.x - 91.0).abs() < 1.0);
    }

    #[test]
    fn latitude_axis_is_longitude_independent() {
        let a = GeoPoint::new(35.0, 135.0);
        let p = GeoPoint::new(35.00005, 135.0005);
        let v = project(p, a);
        let expected_y = 0.00005_f64.to_radians() * EARTH_RADIUS_M;
        assert!((v.y - expected_y).abs() < 1e-9);
        assert!(v.y > 5.0 && v.y < 6.0);
    }

    #[test]
    fn unproject_inverts_project() {
        let reference = GeoPoint::new(35.0, 135.0);
        let p = GeoPoint::new(35.0021, 134.9987);
        let round = unproject(project(p, reference), reference);
        assert!((round.lat - p.lat).abs() < 1e-9);
        assert!((round.lon - p.lon).abs() < 1e-9);
    }
}
