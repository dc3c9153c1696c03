//! # gps_feed
//!
//! UDP fix feed — receives [`FeedMessage`]s from a positioning frontend (a
//! phone bridge or the gps-simulator) and exposes them as a
//! [`PositionSource`] for the guidance controller.
//!
//! ## Architecture
//! Every `watch()` spawns its own Tokio task that:
//!   1. Binds the UDP socket (port configurable via STRAIGHTBAR_UDP_PORT)
//!   2. Receives FeedMessages (JSON envelope)
//!   3. Validates sequence numbers (UDP reorder/replay) and sample age
//!   4. Forwards fixes and sender-reported faults on the subscription channel
//!   5. Reports a TIMEOUT fault when the feed stays silent past the per-fix
//!      timeout
//!
//! Dropping the subscription aborts the task, which releases the socket —
//! that is the whole cancellation story. UDP errors never kill the task and
//! malformed datagrams are dropped with a debug log.

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use guidance_core::source::{
    PositionFix, PositionSource, SourceError, SourceErrorKind, SourceEvent, Subscription,
    WatchOptions,
};
use guidance_types::{FeedMessage, GeoPoint};

// ── Configuration ─────────────────────────────────────────────────────────────

pub struct FeedConfig {
    /// UDP bind address (default 0.0.0.0:47555)
    pub bind_addr: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        let port: u16 = std::env::var("STRAIGHTBAR_UDP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(47555);
        Self { bind_addr: format!("0.0.0.0:{port}") }
    }
}

// ── Source implementation ─────────────────────────────────────────────────────

pub struct UdpPositionSource {
    config: FeedConfig,
}

impl UdpPositionSource {
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }
}

impl PositionSource for UdpPositionSource {
    fn watch(&self, opts: &WatchOptions) -> Subscription {
        let (tx, rx) = mpsc::channel(64);
        let addr = self.config.bind_addr.clone();
        let opts = *opts;
        let task = tokio::spawn(feed_task(addr, opts, tx));
        Subscription::with_task(rx, task)
    }
}

async fn feed_task(addr: String, opts: WatchOptions, tx: mpsc::Sender<SourceEvent>) {
    let socket = match UdpSocket::bind(&addr).await {
        Ok(s) => {
            info!(
                "📡 fix feed listening on UDP {addr} (high_accuracy={}, max_age={:?})",
                opts.high_accuracy, opts.maximum_age
            );
            s
        }
        Err(e) => {
            let _ = tx
                .send(SourceEvent::Error(SourceError::new(
                    SourceErrorKind::PositionUnavailable,
                    format!("could not bind UDP {addr}: {e}"),
                )))
                .await;
            return;
        }
    };

    let mut seq = SeqGuard::new();
    let mut buf = vec![0u8; 2048];

    loop {
        let event = match tokio::time::timeout(opts.timeout, socket.recv_from(&mut buf)).await {
            Err(_) => Some(SourceEvent::Error(SourceError::new(
                SourceErrorKind::Timeout,
                format!("no datagram within {:?}", opts.timeout),
            ))),
            Ok(Err(e)) => {
                // Never crash — log and keep listening
                warn!("fix feed: UDP recv error: {e}");
                None
            }
            Ok(Ok((len, src))) => classify_datagram(&buf[..len], src, now_ms(), &opts, &mut seq),
        };

        if let Some(event) = event {
            if tx.send(event).await.is_err() {
                // Subscription released — feed cancelled
                return;
            }
        }
    }
}

/// Turn one datagram into a feed event, or nothing when it should be dropped.
fn classify_datagram(
    data: &[u8],
    src: SocketAddr,
    now_ms: u64,
    opts: &WatchOptions,
    seq: &mut SeqGuard,
) -> Option<SourceEvent> {
    let msg: FeedMessage = match serde_json::from_slice(data) {
        Ok(m) => m,
        Err(e) => {
            debug!("fix feed: malformed datagram from {src}: {e}");
            return None;
        }
    };

    match msg {
        FeedMessage::Fault(fault) => {
            Some(SourceEvent::Error(SourceError::new(fault.kind.into(), fault.message)))
        }
        FeedMessage::Fix(env) => {
            if !seq.accept(env.seq) {
                warn!("fix feed: rejected out-of-order datagram (seq {})", env.seq);
                return None;
            }
            let age_ms = now_ms.saturating_sub(env.epoch_ms);
            if age_ms > opts.maximum_age.as_millis() as u64 {
                debug!("fix feed: dropped stale fix ({age_ms} ms old)");
                return None;
            }
            Some(SourceEvent::Fix(PositionFix {
                point: GeoPoint::new(env.lat, env.lon),
                accuracy_m: env.accuracy_m,
                speed_mps: env.speed_mps,
                heading_deg: env.heading_deg,
            }))
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ── Sequence guard (reorder / replay protection) ──────────────────────────────

/// Tracks the newest sequence number seen on the feed. Duplicates and
/// datagrams arriving behind the newest one are rejected.
struct SeqGuard {
    last_seq: Option<u64>,
}

impl SeqGuard {
    fn new() -> Self {
        Self { last_seq: None }
    }

    fn accept(&mut self, seq: u64) -> bool {
        match self.last_seq {
            Some(last) if seq <= last => false,
            _ => {
                self.last_seq = Some(seq);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guidance_types::{FaultEnvelope, FaultKind, FixEnvelope};

    fn src() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    fn fix_bytes(seq: u64, epoch_ms: u64) -> Vec<u8> {
        serde_json::to_vec(&FeedMessage::Fix(FixEnvelope {
            seq,
            epoch_ms,
            lat: 35.0,
            lon: 135.0,
            accuracy_m: Some(4.0),
            speed_mps: Some(1.2),
            heading_deg: None,
        }))
        .unwrap()
    }

    #[test]
    fn valid_fix_is_forwarded() {
        let opts = WatchOptions::default();
        let mut seq = SeqGuard::new();
        let event = classify_datagram(&fix_bytes(1, 10_000), src(), 10_100, &opts, &mut seq);
        match event {
            Some(SourceEvent::Fix(fix)) => {
                assert_eq!(fix.point, GeoPoint::new(35.0, 135.0));
                assert_eq!(fix.speed_mps, Some(1.2));
                assert_eq!(fix.heading_deg, None);
            }
            other => panic!("expected a fix, got {other:?}"),
        }
    }

    #[test]
    fn malformed_datagram_is_dropped_not_fatal() {
        let opts = WatchOptions::default();
        let mut seq = SeqGuard::new();
        assert!(classify_datagram(b"not json at all", src(), 0, &opts, &mut seq).is_none());
        assert!(classify_datagram(br#"{"type":"fix"}"#, src(), 0, &opts, &mut seq).is_none());
    }

    #[test]
    fn stale_fix_is_dropped() {
        let opts = WatchOptions::default();
        let mut seq = SeqGuard::new();
        // 6 s old against a 5 s maximum age
        let event = classify_datagram(&fix_bytes(1, 10_000), src(), 16_000, &opts, &mut seq);
        assert!(event.is_none());
    }

    #[test]
    fn out_of_order_datagrams_are_rejected() {
        let opts = WatchOptions::default();
        let mut seq = SeqGuard::new();
        assert!(classify_datagram(&fix_bytes(5, 10_000), src(), 10_000, &opts, &mut seq).is_some());
        assert!(classify_datagram(&fix_bytes(5, 10_000), src(), 10_000, &opts, &mut seq).is_none());
        assert!(classify_datagram(&fix_bytes(3, 10_000), src(), 10_000, &opts, &mut seq).is_none());
        assert!(classify_datagram(&fix_bytes(6, 10_000), src(), 10_000, &opts, &mut seq).is_some());
    }

    #[test]
    fn sender_faults_map_onto_the_error_taxonomy() {
        let opts = WatchOptions::default();
        let mut seq = SeqGuard::new();
        let bytes = serde_json::to_vec(&FeedMessage::Fault(FaultEnvelope {
            kind: FaultKind::PermissionDenied,
            message: "location access refused".into(),
        }))
        .unwrap();
        match classify_datagram(&bytes, src(), 0, &opts, &mut seq) {
            Some(SourceEvent::Error(err)) => {
                assert_eq!(err.kind, SourceErrorKind::PermissionDenied);
                assert_eq!(err.message, "location access refused");
            }
            other => panic!("expected an error event, got {other:?}"),
        }
    }
}
