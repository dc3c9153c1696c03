//! udp_tx.rs — UDP transmitter for feed messages
//!
//! Sends JSON [`FeedMessage`] envelopes to the backend's fix feed.
//! Send errors are logged and skipped — the simulator never crashes because
//! the backend happens to be down.

use std::net::UdpSocket;

use tracing::{debug, warn};

use guidance_types::FeedMessage;

pub struct FixTransmitter {
    socket: UdpSocket,
    hub_addr: String,
}

impl FixTransmitter {
    pub fn new(hub_addr: &str) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self { socket, hub_addr: hub_addr.to_string() })
    }

    pub fn send(&self, msg: &FeedMessage) {
        let bytes = match serde_json::to_vec(msg) {
            Ok(b) => b,
            Err(e) => {
                warn!("UDP: serialize failed: {e}");
                return;
            }
        };

        if let Err(e) = self.socket.send_to(&bytes, &self.hub_addr) {
            warn!("UDP: send failed: {e}");
        } else if let FeedMessage::Fix(env) = msg {
            debug!("UDP → {} seq={} ({:.6}, {:.6})", self.hub_addr, env.seq, env.lat, env.lon);
        }
    }
}
