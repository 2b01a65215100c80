use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::{DeviceAck, DeviceInboundMessage},
    services::{indicator_service::DeviceConnection, input_service::ButtonPress},
    state::SharedState,
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure to queue a frame for a bridge.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Writer channel closed; the connection should be dropped.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Handle the full lifecycle of a controller bridge WebSocket connection.
///
/// The first frame must identify the bridge. Afterwards press frames are fed
/// to the session queue and indicator commands flow back through the
/// [`DeviceHub`](crate::services::indicator_service::DeviceHub).
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let device_id = match DeviceInboundMessage::from_json_str(&initial_message) {
        Ok(DeviceInboundMessage::Identification { id }) => id,
        Ok(_) => {
            warn!("first message was not identification");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse or validate device message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let ack = DeviceAck {
        id: device_id.clone(),
        status: "connected".into(),
    };
    let resync = state.devices().resync_commands();
    let greeted = send_message_to_websocket(&outbound_tx, &ack).and_then(|()| {
        resync
            .iter()
            .try_for_each(|command| send_message_to_websocket(&outbound_tx, command))
    });
    if greeted.is_err() {
        info!(id = %device_id, "connection closed during greeting, terminating");
        finalize(writer_task, outbound_tx).await;
        return;
    }

    state.devices().register(DeviceConnection {
        id: device_id.clone(),
        tx: outbound_tx.clone(),
    });
    info!(id = %device_id, "controller bridge connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match DeviceInboundMessage::from_json_str(&text) {
                Ok(DeviceInboundMessage::Press { player, button }) => {
                    let press = ButtonPress {
                        player,
                        button: button.into(),
                    };
                    match state.session().press(press).await {
                        Ok(outcome) => {
                            debug!(id = %device_id, player = %player, outcome = ?outcome, "press routed");
                        }
                        Err(err) => {
                            warn!(id = %device_id, error = %err, "press could not be delivered");
                        }
                    }
                }
                Ok(DeviceInboundMessage::Identification { .. }) => {
                    warn!(id = %device_id, "ignoring duplicate identification message");
                }
                Ok(DeviceInboundMessage::Unknown) => {
                    debug!(id = %device_id, payload = %text, "ignoring unknown device message");
                }
                Err(err) => {
                    warn!(id = %device_id, error = %err, "failed to parse or validate device message");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(id = %device_id, "controller bridge closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(id = %device_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.devices().unregister(&device_id);
    info!(id = %device_id, "controller bridge disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// A payload that fails to serialize is logged and dropped; only a closed
/// writer is reported to the caller.
pub(crate) fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), SocketError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| SocketError::ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
