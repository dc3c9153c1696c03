//! controller.rs — the position stream controller
//!
//! Owns everything one guidance session needs: the AB endpoints and derived
//! reference line, the deviation smoother, and the lifecycle of the position
//! feed (start/stop, transient-error backoff, stall watchdog). All of it
//! lives in a single [`GuidanceController`] aggregate consumed by one
//! [`run`] loop — every event (sample, feed error, timer, command) is
//! handled to completion before the next, so there is no locking anywhere.
//!
//! ## Lifecycle
//! - Stopped → Active on an explicit start; the backoff delay resets to its
//!   base only here.
//! - Active → Restarting on position-unavailable/timeout; a retry is
//!   scheduled at the current delay, and the delay grows ×1.5 (capped at
//!   30 s) once the retry fires. Watchdog restarts and scheduled retries
//!   never reset the delay — after a sustained outage the feed comes back
//!   without a thundering burst of requests.
//! - permission-denied goes straight to Stopped and stays there; retrying
//!   cannot succeed without user action.
//! - The watchdog force-restarts a feed that has been silent for 15 s even
//!   if the source never reported an error.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use guidance_types::GeoPoint;

use crate::config::GuidanceConfig;
use crate::line::{ReferenceLine, Side};
use crate::smoother::DeviationSmoother;
use crate::source::{
    PositionFix, PositionSource, SourceError, SourceErrorKind, SourceEvent, Subscription,
};

/// Floor on the Hz-estimate denominator: a 40 s gap reports 0.2 Hz, not an
/// absurd instantaneous rate.
const RATE_FLOOR_SECS: f64 = 5.0;

const MPS_TO_KMH: f64 = 3.6;

// ── Stream phase ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamPhase {
    Stopped,
    Active,
    Restarting,
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Mutations a presentation adapter can request. Delivered over a channel so
/// they interleave with feed events instead of racing them.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetPointA(GeoPoint),
    SetPointB(GeoPoint),
    /// Capture the last accepted fix as point A
    MarkPointA,
    /// Capture the last accepted fix as point B
    MarkPointB,
    /// Clear both endpoints and the smoothed deviation
    ClearLine,
    SetSmoothing(f64),
    SetVisualRange(f64),
    Start,
    Stop,
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Everything the presentation layer renders, published after every consumed
/// event. The stream phase is always current — a cancelled feed is never
/// shown as active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub phase: StreamPhase,
    pub point_a: Option<GeoPoint>,
    pub point_b: Option<GeoPoint>,
    pub line_defined: bool,
    pub line_degenerate: bool,
    /// Smoothed lateral deviation, meters, signed
    pub deviation_m: f64,
    /// Last raw deviation sample (debug display)
    pub raw_deviation_m: f64,
    /// Sign of the smoothed deviation: −1 | 0 | 1
    pub side: i8,
    pub speed_kmh: f64,
    pub heading_deg: Option<i32>,
    pub accuracy_m: Option<f64>,
    /// Estimated feed rate from inter-sample spacing
    pub update_hz: Option<f64>,
    pub smoothing_factor: f64,
    pub visual_range_m: f64,
    pub last_error: Option<SourceError>,
    /// Subscription identity — bumps on every (re)subscribe
    pub generation: u64,
}

// ── Controller ────────────────────────────────────────────────────────────────

/// Recovery policy for one feed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorAction {
    Ignore,
    Restart,
    Halt,
}

pub struct GuidanceController {
    config: GuidanceConfig,
    point_a: Option<GeoPoint>,
    point_b: Option<GeoPoint>,
    line: Option<ReferenceLine>,
    smoother: DeviationSmoother,
    visual_range_m: f64,
    phase: StreamPhase,
    generation: u64,
    retry_delay: Duration,
    last_activity: Option<Instant>,
    prev_accept: Option<Instant>,
    update_hz: Option<f64>,
    last_fix: Option<GeoPoint>,
    accuracy_m: Option<f64>,
    speed_kmh: f64,
    heading_deg: Option<i32>,
    raw_deviation_m: f64,
    last_error: Option<SourceError>,
}

impl GuidanceController {
    pub fn new(config: GuidanceConfig) -> Self {
        let smoother = DeviationSmoother::new(config.smoothing_factor);
        let visual_range_m = config.visual_range_m;
        let retry_delay = config.retry_base;
        Self {
            config,
            point_a: None,
            point_b: None,
            line: None,
            smoother,
            visual_range_m,
            phase: StreamPhase::Stopped,
            generation: 0,
            retry_delay,
            last_activity: None,
            prev_accept: None,
            update_hz: None,
            last_fix: None,
            accuracy_m: None,
            speed_kmh: 0.0,
            heading_deg: None,
            raw_deviation_m: 0.0,
            last_error: None,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    // ── Line mutators ─────────────────────────────────────────────────────

    pub fn set_point_a(&mut self, p: GeoPoint) {
        self.point_a = Some(p);
        self.recompute_line();
    }

    pub fn set_point_b(&mut self, p: GeoPoint) {
        self.point_b = Some(p);
        self.recompute_line();
    }

    /// Capture the last accepted fix as point A. False when no fix exists yet.
    pub fn mark_point_a(&mut self) -> bool {
        match self.last_fix {
            Some(p) => {
                self.set_point_a(p);
                true
            }
            None => false,
        }
    }

    pub fn mark_point_b(&mut self) -> bool {
        match self.last_fix {
            Some(p) => {
                self.set_point_b(p);
                true
            }
            None => false,
        }
    }

    pub fn clear_line(&mut self) {
        self.point_a = None;
        self.point_b = None;
        self.line = None;
        self.raw_deviation_m = 0.0;
        self.smoother.reset();
    }

    pub fn set_smoothing(&mut self, k: f64) {
        self.smoother.set_factor(k);
    }

    pub fn set_visual_range(&mut self, meters: f64) {
        self.visual_range_m = meters;
    }

    fn recompute_line(&mut self) {
        self.line = match (self.point_a, self.point_b) {
            (Some(a), Some(b)) => {
                let line = ReferenceLine::between(a, b);
                if line.is_degenerate() {
                    info!("AB endpoints coincide — deviation reads 0 until B moves");
                }
                Some(line)
            }
            _ => None,
        };
    }

    // ── Stream lifecycle ──────────────────────────────────────────────────

    /// Explicit external start. The only place the backoff delay resets.
    fn start(&mut self) {
        self.phase = StreamPhase::Active;
        self.retry_delay = self.config.retry_base;
        self.generation += 1;
        self.last_activity = Some(Instant::now());
    }

    fn stop(&mut self) {
        self.phase = StreamPhase::Stopped;
        self.last_activity = None;
    }

    /// A scheduled retry just fired: grow the delay for the next failure and
    /// reset the stall baseline. The delay deliberately stays grown until a
    /// full external stop/start cycle.
    fn begin_retry(&mut self) {
        self.phase = StreamPhase::Active;
        self.generation += 1;
        self.last_activity = Some(Instant::now());
        self.retry_delay = self
            .retry_delay
            .mul_f64(self.config.retry_growth)
            .min(self.config.retry_max);
    }

    /// Watchdog-forced resubscribe: new generation, fresh stall baseline,
    /// backoff untouched.
    fn note_forced_restart(&mut self) {
        self.generation += 1;
        self.last_activity = Some(Instant::now());
    }

    /// True when the stream is Active but silent past the stall threshold.
    fn watchdog_expired(&self) -> bool {
        self.phase == StreamPhase::Active
            && self
                .last_activity
                .is_some_and(|t| t.elapsed() > self.config.watchdog_stall)
    }

    // ── Event intake ──────────────────────────────────────────────────────

    /// Fold one accepted sample into the session state.
    pub(crate) fn accept_fix(&mut self, fix: PositionFix) {
        let now = Instant::now();
        if let Some(prev) = self.prev_accept {
            let dt = (now - prev).as_secs_f64();
            if dt > 0.0 {
                self.update_hz = Some(1.0 / dt.min(RATE_FLOOR_SECS));
            }
        }
        self.prev_accept = Some(now);
        self.last_activity = Some(now);

        // Optional motion fields hold their previous value when absent
        if let Some(mps) = fix.speed_mps {
            self.speed_kmh = mps * MPS_TO_KMH;
        }
        if let Some(heading) = fix.heading_deg {
            self.heading_deg = Some(heading.round() as i32);
        }
        self.accuracy_m = fix.accuracy_m;
        self.last_fix = Some(fix.point);

        if let Some(line) = &self.line {
            let dev = line.deviation(fix.point);
            self.raw_deviation_m = dev.meters;
            let smoothed = self.smoother.update(dev.meters);
            debug!(
                "fix accepted: raw={:.2}m smooth={:.2}m acc={:?}",
                dev.meters, smoothed, fix.accuracy_m
            );
        }
    }

    /// Record a feed error and decide the recovery policy.
    pub(crate) fn note_error(&mut self, err: SourceError) -> ErrorAction {
        let kind = err.kind;
        self.last_error = Some(err);
        match kind {
            SourceErrorKind::PermissionDenied => {
                self.phase = StreamPhase::Stopped;
                ErrorAction::Halt
            }
            SourceErrorKind::PositionUnavailable | SourceErrorKind::Timeout => {
                if self.phase == StreamPhase::Stopped {
                    ErrorAction::Ignore
                } else {
                    self.phase = StreamPhase::Restarting;
                    ErrorAction::Restart
                }
            }
            SourceErrorKind::Other => ErrorAction::Ignore,
        }
    }

    // ── Snapshot ──────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Snapshot {
        let smoothed = self.smoother.value();
        Snapshot {
            phase: self.phase,
            point_a: self.point_a,
            point_b: self.point_b,
            line_defined: self.line.is_some(),
            line_degenerate: self.line.map(|l| l.is_degenerate()).unwrap_or(false),
            deviation_m: smoothed,
            raw_deviation_m: self.raw_deviation_m,
            side: Side::of(smoothed).sign(),
            speed_kmh: self.speed_kmh,
            heading_deg: self.heading_deg,
            accuracy_m: self.accuracy_m,
            update_hz: self.update_hz,
            smoothing_factor: self.smoother.factor(),
            visual_range_m: self.visual_range_m,
            last_error: self.last_error.clone(),
            generation: self.generation,
        }
    }
}

// ── Consumer loop ─────────────────────────────────────────────────────────────

/// Handle to a spawned controller: a command queue in, snapshots out.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl ControllerHandle {
    pub async fn send(&self, cmd: Command) {
        if self.commands.send(cmd).await.is_err() {
            warn!("controller loop is gone — command dropped");
        }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// A fresh receiver for awaiting snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }
}

/// Spawn the consumer loop for one session and hand back its handle.
pub fn spawn(config: GuidanceConfig, source: Arc<dyn PositionSource>) -> ControllerHandle {
    let controller = GuidanceController::new(config);
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (snap_tx, snap_rx) = watch::channel(controller.snapshot());
    tokio::spawn(run(controller, source, cmd_rx, snap_tx));
    ControllerHandle { commands: cmd_tx, snapshots: snap_rx }
}

/// The single-owner event loop: commands, feed events and timers are
/// serialized here, one at a time. Holding only the *current* subscription
/// means an event from a released feed can never mutate session state.
pub async fn run(
    mut ctl: GuidanceController,
    source: Arc<dyn PositionSource>,
    mut commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<Snapshot>,
) {
    let mut subscription: Option<Subscription> = None;
    let mut retry_at: Option<Instant> = None;
    let mut watchdog = interval(ctl.config.watchdog_poll);
    watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    Command::Start => {
                        if ctl.phase() == StreamPhase::Stopped {
                            ctl.start();
                            retry_at = None;
                            subscription = Some(source.watch(&ctl.config.watch));
                            info!("position stream started (generation {})", ctl.generation());
                        }
                    }
                    Command::Stop => {
                        // Releases the feed and cancels any pending retry;
                        // late events from the old subscription are unreachable.
                        subscription = None;
                        retry_at = None;
                        ctl.stop();
                        info!("position stream stopped");
                    }
                    Command::SetPointA(p) => ctl.set_point_a(p),
                    Command::SetPointB(p) => ctl.set_point_b(p),
                    Command::MarkPointA => {
                        if !ctl.mark_point_a() {
                            warn!("no fix accepted yet — cannot mark point A");
                        }
                    }
                    Command::MarkPointB => {
                        if !ctl.mark_point_b() {
                            warn!("no fix accepted yet — cannot mark point B");
                        }
                    }
                    Command::ClearLine => ctl.clear_line(),
                    Command::SetSmoothing(k) => ctl.set_smoothing(k),
                    Command::SetVisualRange(m) => ctl.set_visual_range(m),
                }
            }
            event = next_event(&mut subscription) => {
                match event {
                    Some(SourceEvent::Fix(fix)) => ctl.accept_fix(fix),
                    Some(SourceEvent::Error(err)) => {
                        warn!("position feed error: {err}");
                        match ctl.note_error(err) {
                            ErrorAction::Restart => {
                                // One pending retry at a time; further errors
                                // from the same outage don't reschedule it.
                                if retry_at.is_none() {
                                    let delay = ctl.retry_delay();
                                    debug!("feed restart scheduled in {delay:?}");
                                    retry_at = Some(Instant::now() + delay);
                                }
                            }
                            ErrorAction::Halt => {
                                subscription = None;
                                retry_at = None;
                            }
                            ErrorAction::Ignore => {}
                        }
                    }
                    None => {
                        // Feed task ended without a final error — recover the
                        // same way as position-unavailable.
                        warn!("position feed closed unexpectedly");
                        subscription = None;
                        let err = SourceError::new(
                            SourceErrorKind::PositionUnavailable,
                            "position feed closed",
                        );
                        if ctl.note_error(err) == ErrorAction::Restart && retry_at.is_none() {
                            retry_at = Some(Instant::now() + ctl.retry_delay());
                        }
                    }
                }
            }
            _ = watchdog.tick() => {
                if ctl.watchdog_expired() {
                    warn!(
                        "watchdog: no sample for over {:?} — forcing feed restart",
                        ctl.config.watchdog_stall
                    );
                    ctl.note_forced_restart();
                    subscription = Some(source.watch(&ctl.config.watch));
                }
            }
            _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                retry_at = None;
                subscription = None;
                ctl.begin_retry();
                subscription = Some(source.watch(&ctl.config.watch));
                info!(
                    "feed restarted after backoff (generation {}, next delay {:?})",
                    ctl.generation(),
                    ctl.retry_delay()
                );
            }
        }

        let _ = snapshots.send(ctl.snapshot());
    }
}

/// Next event from the current subscription; pends forever when there is no
/// feed, so the branch simply never fires while stopped.
async fn next_event(sub: &mut Option<Subscription>) -> Option<SourceEvent> {
    match sub {
        Some(s) => s.next_event().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PositionFix;

    fn fix(lat: f64, lon: f64) -> PositionFix {
        PositionFix {
            point: GeoPoint::new(lat, lon),
            accuracy_m: Some(5.0),
            speed_mps: Some(2.0),
            heading_deg: Some(90.4),
        }
    }

    fn controller() -> GuidanceController {
        GuidanceController::new(GuidanceConfig::default())
    }

    #[test]
    fn fix_without_line_updates_telemetry_only() {
        let mut ctl = controller();
        ctl.accept_fix(fix(35.0, 135.0));

        let snap = ctl.snapshot();
        assert_eq!(snap.speed_kmh, 2.0 * 3.6);
        assert_eq!(snap.heading_deg, Some(90));
        assert_eq!(snap.accuracy_m, Some(5.0));
        // No line: deviation state untouched — "no signal", not "on the line"
        assert_eq!(snap.deviation_m, 0.0);
        assert_eq!(snap.raw_deviation_m, 0.0);
        assert_eq!(snap.side, 0);
        assert!(!snap.line_defined);
    }

    #[test]
    fn missing_motion_fields_hold_previous_values() {
        let mut ctl = controller();
        ctl.accept_fix(fix(35.0, 135.0));
        ctl.accept_fix(PositionFix {
            point: GeoPoint::new(35.0001, 135.0),
            accuracy_m: None,
            speed_mps: None,
            heading_deg: None,
        });

        let snap = ctl.snapshot();
        assert_eq!(snap.speed_kmh, 7.2);
        assert_eq!(snap.heading_deg, Some(90));
        // Accuracy tracks the fix verbatim, including its absence
        assert_eq!(snap.accuracy_m, None);
    }

    #[test]
    fn deviation_flows_through_the_smoother_once_line_exists() {
        let mut ctl = controller();
        ctl.set_point_a(GeoPoint::new(35.0, 135.0));
        ctl.set_point_b(GeoPoint::new(35.0, 135.001));

        // ~5.56 m north of an eastbound line
        let p = fix(35.00005, 135.0005);
        ctl.accept_fix(p);
        let first = ctl.snapshot();
        assert!(first.raw_deviation_m > 5.0);
        // k = 0.5 from zero: first smoothed value is half the raw one
        assert!((first.deviation_m - first.raw_deviation_m / 2.0).abs() < 1e-9);
        assert_eq!(first.side, 1);

        ctl.accept_fix(p);
        let second = ctl.snapshot();
        assert!(second.deviation_m > first.deviation_m);
    }

    #[test]
    fn clear_resets_line_and_smoothed_state() {
        let mut ctl = controller();
        ctl.set_point_a(GeoPoint::new(35.0, 135.0));
        ctl.set_point_b(GeoPoint::new(35.0, 135.001));
        ctl.accept_fix(fix(35.00005, 135.0005));
        assert!(ctl.snapshot().deviation_m != 0.0);

        ctl.clear_line();
        let snap = ctl.snapshot();
        assert!(!snap.line_defined);
        assert_eq!(snap.deviation_m, 0.0);
        assert_eq!(snap.raw_deviation_m, 0.0);
        assert_eq!(snap.point_a, None);
        assert_eq!(snap.point_b, None);
    }

    #[test]
    fn mark_requires_an_accepted_fix() {
        let mut ctl = controller();
        assert!(!ctl.mark_point_a());
        ctl.accept_fix(fix(35.0, 135.0));
        assert!(ctl.mark_point_a());
        assert_eq!(ctl.snapshot().point_a, Some(GeoPoint::new(35.0, 135.0)));
    }

    #[test]
    fn degenerate_line_is_visible_and_silent() {
        let mut ctl = controller();
        let p = GeoPoint::new(35.0, 135.0);
        ctl.set_point_a(p);
        ctl.set_point_b(p);

        ctl.accept_fix(fix(35.001, 135.001));
        let snap = ctl.snapshot();
        assert!(snap.line_defined);
        assert!(snap.line_degenerate);
        assert_eq!(snap.deviation_m, 0.0);
        assert_eq!(snap.side, 0);
    }

    #[test]
    fn permission_denied_halts_without_retry() {
        let mut ctl = controller();
        ctl.start();
        let action = ctl.note_error(SourceError::new(
            SourceErrorKind::PermissionDenied,
            "user said no",
        ));
        assert_eq!(action, ErrorAction::Halt);
        assert_eq!(ctl.phase(), StreamPhase::Stopped);
        assert!(ctl.snapshot().last_error.is_some());
    }

    #[test]
    fn transient_errors_request_restart_and_other_is_ignored() {
        let mut ctl = controller();
        ctl.start();
        assert_eq!(
            ctl.note_error(SourceError::new(SourceErrorKind::Timeout, "t")),
            ErrorAction::Restart
        );
        assert_eq!(ctl.phase(), StreamPhase::Restarting);
        assert_eq!(
            ctl.note_error(SourceError::new(SourceErrorKind::Other, "noise")),
            ErrorAction::Ignore
        );
        // An error on a stopped stream is not a restart trigger
        ctl.stop();
        assert_eq!(
            ctl.note_error(SourceError::new(SourceErrorKind::PositionUnavailable, "x")),
            ErrorAction::Ignore
        );
    }

    #[test]
    fn retry_delay_grows_and_caps() {
        let mut ctl = controller();
        ctl.start();
        assert_eq!(ctl.retry_delay(), Duration::from_millis(3000));
        ctl.begin_retry();
        assert_eq!(ctl.retry_delay(), Duration::from_millis(4500));
        ctl.begin_retry();
        assert_eq!(ctl.retry_delay(), Duration::from_millis(6750));
        for _ in 0..20 {
            ctl.begin_retry();
        }
        assert_eq!(ctl.retry_delay(), Duration::from_millis(30_000));
        // Only a full external stop/start cycle resets it
        ctl.stop();
        ctl.start();
        assert_eq!(ctl.retry_delay(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn update_rate_is_floored_over_long_gaps() {
        let mut ctl = controller();
        ctl.accept_fix(fix(35.0, 135.0));
        tokio::time::advance(Duration::from_secs(1)).await;
        ctl.accept_fix(fix(35.0, 135.0));
        let hz = ctl.snapshot().update_hz.expect("rate after two samples");
        assert!((hz - 1.0).abs() < 0.05);

        tokio::time::advance(Duration::from_secs(40)).await;
        ctl.accept_fix(fix(35.0, 135.0));
        let hz = ctl.snapshot().update_hz.expect("rate after gap");
        assert!((hz - 0.2).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_arms_only_while_active_and_stalled() {
        let mut ctl = controller();
        assert!(!ctl.watchdog_expired());
        ctl.start();
        assert!(!ctl.watchdog_expired());
        tokio::time::advance(Duration::from_secs(16)).await;
        assert!(ctl.watchdog_expired());
        ctl.note_forced_restart();
        assert!(!ctl.watchdog_expired());
        tokio::time::advance(Duration::from_secs(16)).await;
        ctl.stop();
        assert!(!ctl.watchdog_expired());
    }
}
