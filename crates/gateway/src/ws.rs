//! Client-facing WebSocket endpoint (spec §6.1).
//!
//! Flow: the client opens `/ws?token=<pre-shared-token>`, sends a
//! `connect` envelope, the gateway replies `session_ready`, then both
//! sides exchange `audio_chunk`/`transcript_*`/`agent_audio_chunk`/...
//! messages until `disconnect` or the socket closes. Every inbound
//! message is dispatched straight to the session's [`TurnController`];
//! this module owns only the transport (auth, framing, heartbeat).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use base64::Engine;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;

use voice_core::{ChannelSink, TurnController, TurnControllerConfig, TurnControllerDeps};
use voice_protocol::client::ClientMessage;
use voice_protocol::server::ServerMessage;
use voice_sessions::Session;

use crate::state::AppState;

/// Constant-time token comparison via SHA-256 digest, so the wire length
/// of the client-supplied token never leaks via timing.
fn token_eq(a: &str, b: &str) -> bool {
    let ha = Sha256::digest(a.as_bytes());
    let hb = Sha256::digest(b.as_bytes());
    ha.ct_eq(&hb).into()
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /ws` — upgrade to WebSocket, checking the pre-shared bearer
/// token (if `server.client_token` is configured; otherwise dev mode).
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    if let Some(expected) = &state.config.server.client_token {
        let provided = query.token.as_deref().unwrap_or("");
        if !token_eq(provided, expected) {
            return (
                axum::http::StatusCode::UNAUTHORIZED,
                "invalid or missing client token",
            )
                .into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    if wait_for_connect(&mut ws_stream).await.is_none() {
        tracing::warn!("client disconnected before sending connect");
        return;
    }

    let session = Arc::new(Session::new(state.config.debounce.initial_ms));
    let session_id = session.id.clone();
    state.sessions.insert(session.clone());

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(64);
    let sink: Arc<dyn voice_core::ClientSink> = Arc::new(ChannelSink::new(outbound_tx.clone()));

    let deps = TurnControllerDeps {
        session_id: session_id.clone(),
        sample_rate_hz: state.config.audio.sample_rate_hz,
        config: TurnControllerConfig::from_config(&state.config),
        stt: state.stt.clone(),
        llm: state.llm.clone(),
        tts: state.tts.clone(),
        rag: state.rag.clone(),
        store: Some(state.turn_store.clone()),
        sink,
    };

    let controller = match TurnController::new(deps).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "failed to start turn controller");
            state.sessions.remove(&session_id);
            return;
        }
    };

    let _ = outbound_tx
        .send(ServerMessage::SessionReady {
            session_id: session_id.clone(),
            timestamp: Utc::now().timestamp_millis(),
        })
        .await;

    tracing::info!(session_id = %session_id, "client connected");

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if send_ws_message(&mut ws_sink, &msg).await.is_err() {
                break;
            }
        }
    });

    let heartbeat_interval = Duration::from_secs(state.config.session.heartbeat_interval_secs);
    let heartbeat_timeout = Duration::from_secs(state.config.session.heartbeat_timeout_secs);
    let heartbeat_tx = outbound_tx.clone();
    let heartbeat_session = session.clone();
    let heartbeat = tokio::spawn(async move {
        let mut interval = tokio::time::interval(heartbeat_interval);
        loop {
            interval.tick().await;
            if heartbeat_session.is_expired(heartbeat_timeout) {
                break;
            }
            if heartbeat_tx
                .send(ServerMessage::Ping {
                    timestamp: Utc::now().timestamp_millis(),
                })
                .await
                .is_err()
            {
                break;
            }
        }
    });

    loop {
        let next = tokio::time::timeout(heartbeat_timeout, ws_stream.next()).await;
        let Ok(Some(Ok(msg))) = next else {
            break;
        };

        session.touch();
        match msg {
            Message::Text(text) => {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(client_msg) => dispatch(&controller, &session, client_msg).await,
                    Err(e) => tracing::debug!(session_id = %session_id, error = %e, "ignoring unparseable message"),
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
            _ => {}
        }
    }

    controller.on_disconnect().await;
    heartbeat.abort();
    writer.abort();
    state.sessions.remove(&session_id);
    tracing::info!(session_id = %session_id, "client disconnected");
}

async fn dispatch(controller: &Arc<TurnController>, session: &Arc<Session>, msg: ClientMessage) {
    match msg {
        ClientMessage::Connect => {}
        ClientMessage::AudioChunk { audio, .. } => {
            match base64::engine::general_purpose::STANDARD.decode(audio) {
                Ok(bytes) => controller.on_audio_frame(bytes).await,
                Err(e) => tracing::debug!(error = %e, "dropping malformed audio_chunk"),
            }
        }
        ClientMessage::Interrupt { .. } => controller.on_interrupt_message().await,
        ClientMessage::PlaybackComplete { .. } => controller.on_playback_complete().await,
        ClientMessage::UpdateSettings { patch } => {
            if let Some(ms) = patch.silence_debounce_ms {
                session.set_debounce_ms(ms);
            }
            controller.on_settings_update(patch).await;
        }
        ClientMessage::Disconnect => controller.on_disconnect().await,
        ClientMessage::Pong => {}
    }
}

async fn wait_for_connect(
    stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<()> {
    let result = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Text(text) = msg {
                if let Ok(ClientMessage::Connect) = serde_json::from_str::<ClientMessage>(&text) {
                    return Some(());
                }
            }
        }
        None
    })
    .await;

    result.unwrap_or(None)
}

async fn send_ws_message(
    sink: &mut (impl SinkExt<Message> + Unpin),
    msg: &ServerMessage,
) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    sink.send(Message::Text(json)).await.map_err(|_| ())
}
