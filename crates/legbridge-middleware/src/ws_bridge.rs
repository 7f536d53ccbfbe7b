//! WebSocket mirror of the event bus.
//!
//! [`WsBridge`]:
//!
//! 1. **Serves** a WebSocket endpoint where external clients receive every
//!    bus event as one JSON text frame.
//!
//! 2. **Ingests** rosbridge-style publish frames on `cmd_vel` and
//!    `body_pose` and republishes them on the bus as continuous inputs.
//!
//! Every other inbound frame is ignored.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use legbridge_types::messages::BodyPoseInput;
use legbridge_types::{BridgeError, Quaternion, Twist, Vec3};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, Message, Topic};

#[derive(Deserialize)]
struct InboundFrame {
    #[serde(default)]
    op: Option<String>,
    topic: String,
    msg: serde_json::Value,
}

#[derive(Deserialize)]
struct PoseFrame {
    #[serde(default)]
    position: Vec3,
    #[serde(default)]
    orientation: Quaternion,
}

/// Parse an inbound text frame into a bus publication.
///
/// Accepts `{"op": "publish", "topic": "cmd_vel", "msg": <Twist>}` and
/// `{"op": "publish", "topic": "body_pose", "msg": <Pose>}`; a leading `/` on
/// the topic is tolerated and `op` may be omitted.
pub fn parse_inbound(text: &str) -> Option<(Topic, Message)> {
    let frame: InboundFrame = serde_json::from_str(text).ok()?;
    if frame.op.as_deref().is_some_and(|op| op != "publish") {
        return None;
    }
    match frame.topic.trim_start_matches('/') {
        "cmd_vel" => {
            let twist: Twist = serde_json::from_value(frame.msg).ok()?;
            Some((Topic::CmdVel, Message::CmdVel(twist)))
        }
        "body_pose" => {
            let pose: PoseFrame = serde_json::from_value(frame.msg).ok()?;
            Some((
                Topic::BodyPose,
                Message::BodyPose(BodyPoseInput {
                    position_z: pose.position.z,
                    orientation: pose.orientation,
                }),
            ))
        }
        _ => None,
    }
}

/// Bridge between the internal [`EventBus`] and WebSocket clients.
#[derive(Clone)]
pub struct WsBridge {
    bus: EventBus,
}

impl WsBridge {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Bind `addr` and serve clients until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Transport`] if the TCP listener cannot be bound.
    pub async fn run_ws_server(
        self,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<(), BridgeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::transport("ws_bind", format!("{addr}: {e}")))?;
        info!(%addr, "websocket mirror listening");
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Serve clients on an already bound listener.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let bridge = self.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = bridge.handle_ws_client(stream, peer, shutdown).await {
                                error!(peer = %peer, error = %e, "ws client error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "ws accept error"),
                },
            }
        }
    }

    async fn handle_ws_client(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<(), BridgeError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| BridgeError::transport("ws_handshake", format!("{peer}: {e}")))?;
        debug!(peer = %peer, "ws client connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut rx = self.bus.subscribe_all();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
                result = rx.recv() => {
                    match result {
                        Ok(event) if event.topic.is_inbound() => {}
                        Ok(event) => {
                            let json = serde_json::to_string(&event)
                                .map_err(|e| BridgeError::Channel(e.to_string()))?;
                            if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!(peer = %peer, lagged_by = n, "ws client lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        Some(Ok(WsMessage::Text(text))) => self.handle_incoming(text.as_str()),
                        _ => {}
                    }
                }
            }
        }

        debug!(peer = %peer, "ws client disconnected");
        Ok(())
    }

    fn handle_incoming(&self, text: &str) {
        let Some((topic, message)) = parse_inbound(text) else {
            return;
        };
        if let Err(e) = self.bus.publish(topic, message) {
            warn!(topic = %topic.name(), error = %e, "dropping inbound ws message");
        }
    }
}
