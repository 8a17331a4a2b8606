//! WebSocket transport for the player endpoint.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::broadcaster::StatusReporter;
use crate::commands::CommandRouter;
use crate::connections::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<CommandRouter>,
    pub registry: ConnectionRegistry,
    pub reporter: StatusReporter,
    /// Fired when the transport stops; every session closes its socket.
    pub shutdown: CancellationToken,
}

pub async fn player_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session(socket, state))
}

async fn session(socket: WebSocket, state: AppState) {
    let (guard, mut outbound) = state.registry.register();
    let id = guard.id();
    tracing::info!("connection {id} opened");

    // First status right away instead of at the next tick.
    state.reporter.report_to(guard.handle()).await;

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                if let Err(e) = sender.send(Message::Close(None)).await {
                    tracing::debug!("connection {id}: close frame not sent: {e}");
                }
                break;
            }
            Some(text) = outbound.recv() => {
                if let Err(e) = sender.send(Message::Text(text)).await {
                    tracing::warn!("connection {id}: send failed: {e}");
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("connection {id}: message received: {text:?}");
                        state.router.dispatch(&text).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        match frame {
                            Some(frame) => tracing::info!("connection {id} closed {}, reason: {}", frame.code, frame.reason),
                            None => tracing::info!("connection {id} closed"),
                        }
                        break;
                    }
                    // Pings are answered by axum; binary frames carry no commands.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("connection {id}: receive failed: {e}");
                        break;
                    }
                    None => {
                        tracing::info!("connection {id} dropped");
                        break;
                    }
                }
            }
        }
    }
    // `guard` drops here and removes the connection from the registry.
}
