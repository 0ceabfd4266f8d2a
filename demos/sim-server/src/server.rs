//! Simulation server implementation.

use crate::script::{self, Episode};
use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::Deserialize;
use socialstream_core::{InboundEvent, OutboundCommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Server settings shared by every connection.
#[derive(Debug, Clone)]
pub struct Settings {
    pub token: String,
    /// Agent turns per episode.
    pub turns: usize,
    /// Delay between streamed turns.
    pub interval: Duration,
}

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

pub fn router(settings: Settings) -> Router {
    Router::new()
        .route("/scenarios", get(|| async { Json(script::scenarios()) }))
        .route("/agents", get(|| async { Json(script::agents()) }))
        .route("/models", get(|| async { Json(script::models()) }))
        .route("/ws/simulation", get(ws_handler))
        .with_state(Arc::new(settings))
}

pub async fn run(addr: SocketAddr, settings: Settings) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(settings)).await?;
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(settings): State<Arc<Settings>>,
) -> Response {
    if params.token.as_deref() != Some(settings.token.as_str()) {
        tracing::warn!("Rejected websocket with bad token");
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = simulate(socket, settings).await {
            tracing::warn!("Simulation connection error: {}", e);
        }
    })
}

async fn simulate(mut socket: WebSocket, settings: Arc<Settings>) -> anyhow::Result<()> {
    let mut episode: Option<Episode> = None;
    // `interval` panics on a zero period.
    let mut ticker = tokio::time::interval(settings.interval.max(Duration::from_millis(1)));

    tracing::debug!("Simulation client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error: {}", e);
                        break;
                    }
                };

                match OutboundCommand::decode(text.as_str()) {
                    Ok(OutboundCommand::StartSim(request)) => {
                        if episode.is_some() {
                            send_error(&mut socket, "Simulation already running").await?;
                            continue;
                        }
                        match Episode::new(&request, settings.turns) {
                            Ok(started) => {
                                tracing::info!("Starting simulation in {}", request.env_id);
                                episode = Some(started);
                                ticker.reset();
                            }
                            Err(reason) => send_error(&mut socket, &reason).await?,
                        }
                    }
                    Ok(OutboundCommand::FinishSim) => match episode.take() {
                        Some(mut current) => {
                            tracing::info!("Finishing simulation early");
                            current.finish();
                            wrap_up(&mut socket, &current).await?;
                        }
                        None => send_error(&mut socket, "No simulation running").await?,
                    },
                    Err(e) => send_error(&mut socket, &format!("Invalid message: {e}")).await?,
                }
            }

            _ = ticker.tick(), if episode.is_some() => {
                let Some(current) = episode.as_mut() else { continue };
                if let Some(turn) = current.next_turn() {
                    send(&mut socket, &InboundEvent::ServerMsg(turn)).await?;
                } else if let Some(done) = episode.take() {
                    wrap_up(&mut socket, &done).await?;
                }
            }
        }
    }

    tracing::debug!("Simulation client disconnected");
    Ok(())
}

/// Send the evaluation and `END_SIM`.
async fn wrap_up(socket: &mut WebSocket, episode: &Episode) -> anyhow::Result<()> {
    for line in episode.evaluation() {
        send(socket, &InboundEvent::ServerMsg(line)).await?;
    }
    send(socket, &InboundEvent::EndSim).await?;
    tracing::info!("Simulation ended");
    Ok(())
}

async fn send_error(socket: &mut WebSocket, content: &str) -> anyhow::Result<()> {
    let event = InboundEvent::Error {
        content: content.to_string(),
    };
    send(socket, &event).await
}

async fn send(socket: &mut WebSocket, event: &InboundEvent) -> anyhow::Result<()> {
    let frame = event.encode()?;
    socket.send(Message::Text(frame.into())).await?;
    Ok(())
}
