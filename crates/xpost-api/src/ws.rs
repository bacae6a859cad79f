//! WebSocket progress streaming with backpressure support.
//!
//! A client opens `/ws/publish`, sends one subscribe request with its
//! session token and job ID, and receives that job's progress events until
//! the terminal event. The broadcast channel has no replay: the server
//! synthesizes the terminal event for a job that already finished, and a
//! late subscriber reads the job document for anything earlier.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use xpost_models::{JobId, ProgressEvent, WsSubscribeRequest};

use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const WS_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket publish-progress endpoint.
pub async fn ws_publish(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection();

    ws.on_upgrade(|socket| async move {
        handle_publish_socket(socket, state).await;
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    })
}

/// Send a progress event with backpressure handling.
async fn send_event(tx: &mpsc::Sender<Message>, event: &ProgressEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(_) => return false,
    };
    match tx.try_send(Message::Text(json.clone())) {
        Ok(_) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            // Channel full: block until the client drains
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(Message::Text(json)).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

async fn send_error(tx: &mpsc::Sender<Message>, message: impl Into<String>) {
    let payload = serde_json::json!({"type": "error", "error": message.into()}).to_string();
    let _ = tx.send(Message::Text(payload)).await;
}

fn event_kind(event: &ProgressEvent) -> &'static str {
    match event {
        ProgressEvent::Step { .. } => "step",
        ProgressEvent::PlatformPublished { .. } => "platform_published",
        ProgressEvent::PlatformFailed { .. } => "platform_failed",
        ProgressEvent::JobFinished { .. } => "job_finished",
    }
}

/// Handle one progress subscription.
async fn handle_publish_socket(socket: WebSocket, state: AppState) {
    let (ws_sender, mut receiver) = socket.split();

    // Bounded channel so a slow client cannot pile up events
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        ws_sender
    });

    // Wait for the subscribe request with a timeout
    let request: WsSubscribeRequest =
        match tokio::time::timeout(WS_CLIENT_TIMEOUT, receiver.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str(&text) {
                Ok(req) => req,
                Err(e) => {
                    send_error(&tx, format!("Invalid request: {}", e)).await;
                    drop(tx);
                    let _ = send_task.await;
                    return;
                }
            },
            Ok(_) | Err(_) => {
                send_error(&tx, "Expected JSON subscribe message or connection timeout").await;
                drop(tx);
                let _ = send_task.await;
                return;
            }
        };

    let user = match state.tokens.verify(&request.token) {
        Ok(u) => u,
        Err(e) => {
            send_error(&tx, format!("Authentication failed: {}", e)).await;
            drop(tx);
            let _ = send_task.await;
            return;
        }
    };

    let job_id = JobId::from_string(&request.job_id);
    info!(job_id = %job_id, owner = %user.owner_id, "WebSocket subscription started");

    // Subscribe before reading the document so no event slips between the
    // snapshot and the stream.
    let mut stream = match state.progress.subscribe(&job_id).await {
        Ok(s) => s,
        Err(e) => {
            send_error(&tx, format!("Failed to subscribe to progress: {}", e)).await;
            drop(tx);
            let _ = send_task.await;
            return;
        }
    };

    let job = match state.store.get(&job_id).await {
        Ok(job) if job.owner_id == user.owner_id => job,
        _ => {
            send_error(&tx, "Job not found").await;
            drop(tx);
            let _ = send_task.await;
            return;
        }
    };

    // Already finished: nothing will arrive on the channel, so synthesize
    // the terminal event and close.
    if job.status.is_terminal() {
        let done = ProgressEvent::job_finished(job.id.clone(), job.status);
        metrics::record_ws_message_sent(event_kind(&done));
        send_event(&tx, &done).await;
        drop(tx);
        let _ = send_task.await;
        return;
    }

    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            // Progress event from the pipeline
            event = stream.next() => {
                match event {
                    Some(event) => {
                        last_activity = Instant::now();
                        metrics::record_ws_message_sent(event_kind(&event));

                        if let ProgressEvent::JobFinished { status, .. } = &event {
                            metrics::record_job_finished(status.as_str());
                        }

                        if !send_event(&tx, &event).await {
                            warn!("WebSocket send failed, client disconnected");
                            break;
                        }

                        if event.is_terminal() {
                            break;
                        }
                    }
                    None => break, // Stream ended
                }
            }
            // Heartbeat to keep the connection alive
            _ = heartbeat.tick() => {
                if last_activity.elapsed() > WS_HEARTBEAT_INTERVAL / 2 {
                    if tx.send(Message::Ping(vec![])).await.is_err() {
                        warn!("Heartbeat failed, client disconnected");
                        break;
                    }
                }
            }
            // Client message (for pong responses)
            client_msg = receiver.next() => {
                match client_msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client closed connection");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    drop(tx);
    let _ = send_task.await;
    info!(job_id = %job_id, "WebSocket subscription ended");
}
