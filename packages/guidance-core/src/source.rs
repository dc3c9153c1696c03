//! source.rs — the positioning source abstraction
//!
//! A [`PositionSource`] hands out cancellable subscriptions to a continuous
//! stream of sample-or-error events. The controller consumes exactly one
//! subscription at a time; dropping a [`Subscription`] aborts its feed task,
//! so an event from a released feed can never reach the consumer — the
//! replacement for guarding stale callbacks by hand.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use guidance_types::{FaultKind, GeoPoint};

// ── Watch options ─────────────────────────────────────────────────────────────

/// Parameters for requesting a continuous position feed.
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    /// Ask the receiver for its best accuracy mode (more power, better fixes)
    pub high_accuracy: bool,
    /// Oldest acceptable sample age; staler fixes are dropped at the source
    pub maximum_age: Duration,
    /// How long the feed may stay silent before reporting a timeout
    pub timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age: Duration::from_secs(5),
            timeout: Duration::from_secs(20),
        }
    }
}

// ── Samples and errors ────────────────────────────────────────────────────────

/// One accepted position sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionFix {
    pub point: GeoPoint,
    /// Accuracy radius in meters, when the receiver reports one
    pub accuracy_m: Option<f64>,
    /// Ground speed in m/s; absent when the receiver cannot estimate it
    pub speed_mps: Option<f64>,
    /// Course over ground in degrees; absent below walking speed
    pub heading_deg: Option<f64>,
}

/// Categorized feed failure. The category drives the controller's recovery
/// policy; the message is kept verbatim for display.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {message}")]
pub struct SourceError {
    pub kind: SourceErrorKind,
    pub message: String,
}

impl SourceError {
    pub fn new(kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceErrorKind {
    /// Location access refused — retrying cannot help without user action
    PermissionDenied,
    /// The receiver has no fix to give (transient)
    PositionUnavailable,
    /// No sample arrived within the per-fix timeout (transient)
    Timeout,
    /// Anything else; recorded but not acted on
    Other,
}

impl std::fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceErrorKind::PermissionDenied => "PERMISSION_DENIED",
            SourceErrorKind::PositionUnavailable => "POSITION_UNAVAILABLE",
            SourceErrorKind::Timeout => "TIMEOUT",
            SourceErrorKind::Other => "OTHER",
        };
        f.write_str(s)
    }
}

impl From<FaultKind> for SourceErrorKind {
    fn from(kind: FaultKind) -> Self {
        match kind {
            FaultKind::PermissionDenied => SourceErrorKind::PermissionDenied,
            FaultKind::PositionUnavailable => SourceErrorKind::PositionUnavailable,
            FaultKind::Other => SourceErrorKind::Other,
        }
    }
}

/// What a subscription yields.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Fix(PositionFix),
    Error(SourceError),
}

// ── Source trait & subscription handle ────────────────────────────────────────

/// A positioning source: GPS receiver adapter, UDP fix feed, test script.
pub trait PositionSource: Send + Sync {
    /// Request a continuous feed. Infallible by contract — sources report
    /// setup failures as an error event on the subscription instead.
    fn watch(&self, opts: &WatchOptions) -> Subscription;
}

/// A live position feed. Dropping it cancels the feed: the producing task is
/// aborted, so no further events can arrive from it.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<SourceEvent>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Subscription backed by a spawned feed task (aborted on drop).
    pub fn with_task(events: mpsc::Receiver<SourceEvent>, task: JoinHandle<()>) -> Self {
        Self { events, task: Some(task) }
    }

    /// Subscription backed by a bare channel; the caller keeps the sender.
    pub fn from_channel(events: mpsc::Receiver<SourceEvent>) -> Self {
        Self { events, task: None }
    }

    /// Next event, or `None` once the feed has ended.
    pub async fn next_event(&mut self) -> Option<SourceEvent> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display_matches_wire_names() {
        assert_eq!(SourceErrorKind::PermissionDenied.to_string(), "PERMISSION_DENIED");
        assert_eq!(SourceErrorKind::Timeout.to_string(), "TIMEOUT");
        let err = SourceError::new(SourceErrorKind::PositionUnavailable, "no satellites");
        assert_eq!(err.to_string(), "POSITION_UNAVAILABLE: no satellites");
    }

    #[tokio::test]
    async fn dropping_a_subscription_aborts_its_task() {
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        });
        let sub = Subscription::with_task(rx, task);
        let handle = sub.task.as_ref().expect("task present").abort_handle();
        drop(sub);
        for _ in 0..100 {
            if handle.is_finished() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("feed task still running after subscription drop");
    }
}
