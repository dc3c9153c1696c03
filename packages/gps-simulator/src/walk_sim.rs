//! walk_sim.rs — vehicle traversal simulation
//!
//! Simulates a vehicle working a field along a nominal AB track:
//! - Position in a local planar frame (meters along track / cross-track)
//! - Nominal speed with a first-order lag toward the target
//! - Sinusoidal cross-track wander plus Gaussian steering noise — this is
//!   exactly the lateral error the guidance bar exists to show
//! - Heading derived from the velocity vector
//! - Accuracy radius with its own noise
//!
//! Pure math, no panics in the tick path; the fix rate and the UDP side live
//! in main.rs.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

use guidance_core::geo::unproject;
use guidance_types::{FixEnvelope, GeoPoint, PlanarVector};

// ── Config (populated from config.toml) ───────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct WalkConfig {
    pub origin_lat: f64,
    pub origin_lon: f64,
    /// Track bearing, degrees (0 = north, 90 = east)
    pub track_heading_deg: f64,
    /// Distance from A to B along the track, meters
    pub track_length_m: f64,
    pub speed_mps: f64,
    /// Peak of the sinusoidal cross-track wander, meters
    pub wander_amplitude_m: f64,
    pub wander_period_s: f64,
    /// σ of the per-tick steering noise added on top of the wander, meters
    pub cross_noise_m: f64,
    pub accuracy_base_m: f64,
    pub accuracy_noise_m: f64,
}

impl WalkConfig {
    pub fn origin(&self) -> GeoPoint {
        GeoPoint::new(self.origin_lat, self.origin_lon)
    }
}

// ── Simulation state ──────────────────────────────────────────────────────────

pub struct WalkSim {
    cfg: WalkConfig,
    /// Unit vector of the track bearing in the planar frame
    dir: PlanarVector,
    /// Distance traveled along the track, meters
    along_m: f64,
    /// Current cross-track offset, meters (positive = the AB normal side)
    cross_m: f64,
    speed_mps: f64,
    heading_deg: f64,
    wander_phase: f64,
    t_elapsed: f64,
    seq: u64,
}

impl WalkSim {
    pub fn new(cfg: &WalkConfig) -> Self {
        let bearing = cfg.track_heading_deg.to_radians();
        // Bearing 0° = north (+y), 90° = east (+x)
        let dir = PlanarVector::new(bearing.sin(), bearing.cos());
        let wander_phase = rand::thread_rng().gen_range(0.0..std::f64::consts::TAU);
        Self {
            cfg: cfg.clone(),
            dir,
            along_m: 0.0,
            cross_m: 0.0,
            speed_mps: 0.0,
            heading_deg: cfg.track_heading_deg,
            wander_phase,
            t_elapsed: 0.0,
            seq: 0,
        }
    }

    /// Start of the nominal track — where the operator should mark A.
    pub fn point_a(&self) -> GeoPoint {
        self.cfg.origin()
    }

    /// End of the nominal track — where the operator should mark B.
    pub fn point_b(&self) -> GeoPoint {
        unproject(self.dir.scale(self.cfg.track_length_m), self.cfg.origin())
    }

    pub fn along_m(&self) -> f64 {
        self.along_m
    }

    pub fn cross_m(&self) -> f64 {
        self.cross_m
    }

    /// Advance the traversal by dt seconds.
    pub fn tick(&mut self, dt: f64) {
        let mut rng = rand::thread_rng();
        self.t_elapsed += dt;

        // Smooth speed ramp (simple first-order lag)
        self.speed_mps += (self.cfg.speed_mps - self.speed_mps) * (dt * 2.0).min(1.0);
        self.along_m += self.speed_mps * dt;

        // Cross-track wander: slow sinusoid + steering noise
        let angle = std::f64::consts::TAU / self.cfg.wander_period_s;
        let noise = Normal::new(0.0, self.cfg.cross_noise_m)
            .map(|d| d.sample(&mut rng))
            .unwrap_or(0.0);
        let wander = self.cfg.wander_amplitude_m
            * (angle * self.t_elapsed + self.wander_phase).sin();
        self.cross_m = wander + noise;

        // Heading follows the velocity vector: track bearing plus the drift
        // rate of the wander sinusoid
        let cross_rate =
            self.cfg.wander_amplitude_m * angle * (angle * self.t_elapsed + self.wander_phase).cos();
        let drift = if self.speed_mps > 0.0 {
            cross_rate.atan2(self.speed_mps).to_degrees()
        } else {
            0.0
        };
        self.heading_deg = (self.cfg.track_heading_deg - drift).rem_euclid(360.0);
    }

    /// Current position in geographic coordinates.
    pub fn position(&self) -> GeoPoint {
        let normal = self.dir.rotated_ccw();
        let planar = self
            .dir
            .scale(self.along_m)
            .add(&normal.scale(self.cross_m));
        unproject(planar, self.cfg.origin())
    }

    /// Build the next fix envelope. `accuracy_factor` scales the reported
    /// radius; `include_motion` = false leaves speed/heading out entirely.
    pub fn envelope(
        &mut self,
        epoch_ms: u64,
        accuracy_factor: f64,
        include_motion: bool,
    ) -> FixEnvelope {
        let mut rng = rand::thread_rng();
        self.seq += 1;
        let p = self.position();
        let jitter = Normal::new(0.0, self.cfg.accuracy_noise_m)
            .map(|d| d.sample(&mut rng).abs())
            .unwrap_or(0.0);
        FixEnvelope {
            seq: self.seq,
            epoch_ms,
            lat: p.lat,
            lon: p.lon,
            accuracy_m: Some((self.cfg.accuracy_base_m + jitter) * accuracy_factor),
            speed_mps: include_motion.then_some(self.speed_mps),
            heading_deg: include_motion.then_some(self.heading_deg),
        }
    }
}
