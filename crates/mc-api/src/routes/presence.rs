//! # Presence WebSocket
//!
//! Routes:
//! - GET /v1/presence: Upgrade to the real-time location channel
//!
//! Each socket is one viewer in the [`PresenceHub`]. Text frames from the
//! client go to [`PresenceHub::on_message`]; frames the hub queues for the
//! viewer are written back as text. The connection is removed from the hub
//! when either side closes or a write fails.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use mc_presence::{PresenceHub, Viewer};

use crate::auth::MaybeCaller;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/presence", get(presence_socket))
}

/// GET /v1/presence: WebSocket upgrade.
///
/// Inbound: `{"type": "employee_location", "email", "latitude", "longitude"}`.
/// Outbound: the same frames, relayed unchanged to every admitted viewer.
#[utoipa::path(
    get,
    path = "/v1/presence",
    responses(
        (status = 101, description = "Switched to WebSocket"),
        (status = 400, description = "Not a WebSocket upgrade request"),
    ),
    tag = "presence"
)]
pub async fn presence_socket(
    State(state): State<AppState>,
    MaybeCaller(caller): MaybeCaller,
    ws: WebSocketUpgrade,
) -> Response {
    let viewer = match caller {
        Some(caller) => Viewer::new(Some(caller.email), Some(caller.role)),
        None => Viewer::anonymous(),
    };
    let hub = state.hub.clone();
    let heartbeat = state.config.presence_heartbeat;
    ws.on_upgrade(move |socket| serve_viewer(socket, hub, viewer, heartbeat))
}

async fn serve_viewer(
    mut socket: WebSocket,
    hub: PresenceHub,
    viewer: Viewer,
    heartbeat: Option<Duration>,
) {
    let mut handle = hub.connect(viewer);
    let id = handle.id();
    let mut pings = heartbeat.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        tokio::select! {
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    hub.on_message(id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                // Pongs, client pings and binary frames carry nothing for the hub.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection = %id, error = %e, "websocket read failed");
                    break;
                }
            },
            outbound = handle.recv() => match outbound {
                Some(frame) => {
                    if let Err(e) = socket.send(Message::Text(frame.to_string().into())).await {
                        tracing::debug!(connection = %id, error = %e, "websocket write failed");
                        break;
                    }
                }
                None => break,
            },
            _ = next_ping(&mut pings) => {
                if socket.send(Message::Ping(Default::default())).await.is_err() {
                    tracing::debug!(connection = %id, "heartbeat ping failed");
                    break;
                }
            }
        }
    }

    hub.disconnect(id);
}

/// Resolves on the next heartbeat tick, or never when heartbeats are off.
async fn next_ping(pings: &mut Option<Interval>) {
    match pings {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
