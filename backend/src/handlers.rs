//! handlers.rs — WebSocket presentation adapter
//!
//! Pushes every controller snapshot to connected clients as JSON and maps
//! inbound `{ "cmd": "...", "args": {...} }` messages onto controller
//! commands. Rendering is entirely the client's business.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde_json::Value;
use tracing::{debug, warn};

use guidance_core::controller::{Command, ControllerHandle};
use guidance_types::GeoPoint;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(handle): State<ControllerHandle>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, handle))
}

async fn handle_socket(mut socket: WebSocket, handle: ControllerHandle) {
    let mut snapshots = handle.subscribe();

    // Current state immediately on connect
    if let Ok(json) = serde_json::to_string(&handle.snapshot()) {
        if socket.send(Message::Text(json)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break; // controller loop is gone
                }
                let json = {
                    let snap = snapshots.borrow_and_update().clone();
                    serde_json::to_string(&snap).unwrap_or_default()
                };
                if socket.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(raw))) => match parse_command(&raw) {
                    Some(cmd) => handle.send(cmd).await,
                    None => warn!("ws: unknown command: {raw}"),
                },
                Some(Ok(_)) => {} // ping/pong/binary — nothing to do
                Some(Err(e)) => {
                    debug!("ws: receive error: {e}");
                    break;
                }
                None => break,
            },
        }
    }
}

/// Commands are JSON: { "cmd": "...", "args": {...} }
fn parse_command(raw: &str) -> Option<Command> {
    let v: Value = serde_json::from_str(raw).ok()?;
    match v["cmd"].as_str()? {
        "set-a" => Some(Command::SetPointA(geo_args(&v)?)),
        "set-b" => Some(Command::SetPointB(geo_args(&v)?)),
        "mark-a" => Some(Command::MarkPointA),
        "mark-b" => Some(Command::MarkPointB),
        "clear" => Some(Command::ClearLine),
        "set-smoothing" => v["args"]["k"].as_f64().map(Command::SetSmoothing),
        "set-range" => v["args"]["meters"].as_f64().map(Command::SetVisualRange),
        "start" => Some(Command::Start),
        "stop" => Some(Command::Stop),
        _ => None,
    }
}

fn geo_args(v: &Value) -> Option<GeoPoint> {
    let lat = v["args"]["lat"].as_f64()?;
    let lon = v["args"]["lon"].as_f64()?;
    Some(GeoPoint::new(lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_point_commands() {
        let cmd = parse_command(r#"{"cmd":"set-a","args":{"lat":35.0,"lon":135.0}}"#);
        assert_eq!(cmd, Some(Command::SetPointA(GeoPoint::new(35.0, 135.0))));
        assert_eq!(parse_command(r#"{"cmd":"mark-b"}"#), Some(Command::MarkPointB));
    }

    #[test]
    fn parses_tuning_and_lifecycle_commands() {
        assert_eq!(
            parse_command(r#"{"cmd":"set-smoothing","args":{"k":0.8}}"#),
            Some(Command::SetSmoothing(0.8))
        );
        assert_eq!(
            parse_command(r#"{"cmd":"set-range","args":{"meters":25.0}}"#),
            Some(Command::SetVisualRange(25.0))
        );
        assert_eq!(parse_command(r#"{"cmd":"start"}"#), Some(Command::Start));
        assert_eq!(parse_command(r#"{"cmd":"stop"}"#), Some(Command::Stop));
        assert_eq!(parse_command(r#"{"cmd":"clear"}"#), Some(Command::ClearLine));
    }

    #[test]
    fn rejects_unknown_or_incomplete_commands() {
        assert_eq!(parse_command("not json"), None);
        assert_eq!(parse_command(r#"{"cmd":"warp"}"#), None);
        assert_eq!(parse_command(r#"{"cmd":"set-a","args":{"lat":35.0}}"#), None);
        assert_eq!(parse_command(r#"{"cmd":"set-smoothing"}"#), None);
    }
}
