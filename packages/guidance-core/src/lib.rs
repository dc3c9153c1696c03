//! # guidance-core
//!
//! AB-line lateral guidance: project live geographic fixes onto a local
//! planar frame, measure the signed perpendicular offset from a two-point
//! reference line, smooth it over time, and keep the position feed alive
//! through stalls and transient receiver failures.
//!
//! ## Architecture
//! Leaf-first:
//!   1. `geo` — stateless equirectangular projection (and its inverse)
//!   2. `line` — the AB reference line: origin, unit direction, unit normal,
//!      signed-deviation queries, explicit degenerate tagging
//!   3. `smoother` — exponential moving average over deviation samples
//!   4. `source` — the cancellable position-feed subscription abstraction
//!   5. `controller` — the owned session aggregate and its single consumer
//!      loop: per-fix intake, error classification, backoff restarts, stall
//!      watchdog, snapshot publishing
//!
//! Everything is per-session state behind one [`controller::spawn`] call;
//! multiple independent sessions can coexist (and the tests do exactly that).

pub mod config;
pub mod controller;
pub mod geo;
pub mod line;
pub mod smoother;
pub mod source;


pub use config::GuidanceConfig;
pub use controller::{Command, ControllerHandle, GuidanceController, Snapshot, StreamPhase};
pub use line::{Deviation, LineOrientation, ReferenceLine, Side};
pub use smoother::DeviationSmoother;
pub use source::{
    PositionFix, PositionSource, SourceError, SourceErrorKind, SourceEvent, Subscription,
    WatchOptions,
};
