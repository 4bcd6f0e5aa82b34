use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tracing::{debug, info, warn};

use crate::backend::schemas::GenerateRequestBody;
use crate::backend::state::AppState;
use crate::events::GenerateEvent;
use crate::worker::Polled;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub async fn ws_generate(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = handle_socket(state, socket).await {
            debug!("Generation socket closed early: {}", e);
        }
    })
}

/// One socket carries one generation: a request message in, progress records
/// and a final `complete` record out.
async fn handle_socket(state: Arc<AppState>, mut socket: WebSocket) -> Result<(), axum::Error> {
    let body = match tokio::time::timeout(state.request_timeout, read_request(&mut socket)).await {
        Ok(Some(Ok(body))) => body,
        Ok(Some(Err(message))) => return reject(&mut socket, message).await,
        Ok(None) => return Ok(()),
        Err(_) => {
            debug!("No generation request within {:?}", state.request_timeout);
            return reject(&mut socket, "Timed out waiting for a generation request").await;
        }
    };

    let permit = match state.gate.try_acquire() {
        Ok(permit) => permit,
        Err(e) => {
            info!("Rejected generation request: {}", e);
            return reject(&mut socket, e.to_string()).await;
        }
    };

    let request = body.into_request(&state.defaults);
    let mut run = match state.worker.submit(request, permit) {
        Ok(run) => run,
        Err(e) => {
            warn!("{}", e);
            return reject(&mut socket, e.to_string()).await;
        }
    };

    // the run keeps going if the client disconnects
    let mut connected = true;
    loop {
        match run.poll(POLL_INTERVAL).await {
            Polled::Event(event) => {
                if connected && send_event(&mut socket, &event).await.is_err() {
                    debug!("Client disconnected during generation");
                    connected = false;
                }
            }
            Polled::Idle => continue,
            Polled::Finished => break,
        }
    }

    let complete = run.finish().await;
    if !connected {
        return Ok(());
    }
    send_event(&mut socket, &complete).await?;
    socket.send(Message::Close(None)).await
}

/// The first text or binary frame, parsed. `None` when the client left
/// before sending one.
async fn read_request(socket: &mut WebSocket) -> Option<Result<GenerateRequestBody, String>> {
    while let Some(message) = socket.recv().await {
        let parsed = match message {
            Ok(Message::Text(text)) => serde_json::from_str(text.as_str()),
            Ok(Message::Binary(bytes)) => serde_json::from_slice(&bytes),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        };
        return Some(parsed.map_err(|e| format!("Invalid request: {}", e)));
    }
    None
}

/// A single `error` record, then close.
async fn reject(socket: &mut WebSocket, error: impl Into<String>) -> Result<(), axum::Error> {
    send_event(socket, &GenerateEvent::error(error)).await?;
    socket.send(Message::Close(None)).await
}

async fn send_event(socket: &mut WebSocket, event: &GenerateEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}
