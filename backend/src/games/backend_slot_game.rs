use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use reelhouse_shared::constants::MAX_MESSAGE_BYTES;
use reelhouse_shared::shared_slot_game::*;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::WagerError;
use crate::services::{AccountService, WagerService};

#[derive(Clone)]
pub struct SlotGameState {
    pub accounts: Arc<AccountService>,
    pub wagers: Arc<WagerService>,
}

pub fn create_router() -> Router<SlotGameState> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/login", post(login))
        .route("/api/gamestate", post(gamestate))
        .route("/api/bet", post(bet))
        .route("/api/games", get(list_games))
}

/// Answers one channel message. Failures become an `error` event naming the request.
pub async fn dispatch(state: &SlotGameState, message: ClientMessage) -> ServerMessage {
    let event = message.event();
    let reply = match message {
        ClientMessage::Login(req) => state.accounts.login(req.key).await.map(ServerMessage::Login),
        ClientMessage::Gamestate(req) => state.wagers.gamestate(&req).await.map(ServerMessage::Gamestate),
        ClientMessage::Bet(req) => state
            .wagers
            .bet(&req)
            .await
            .map(|receipt| ServerMessage::Bet(receipt.into())),
    };
    reply.unwrap_or_else(|e| {
        if e.status().is_server_error() {
            error!("{} request failed: {}", event, e);
        }
        ServerMessage::Error(e.to_error_response(Some(event)))
    })
}

fn parse_message(text: &str) -> Result<ClientMessage, WagerError> {
    if text.len() > MAX_MESSAGE_BYTES {
        return Err(WagerError::BadRequest(format!(
            "message of {} bytes exceeds {} bytes",
            text.len(),
            MAX_MESSAGE_BYTES
        )));
    }
    serde_json::from_str(text).map_err(|e| WagerError::BadRequest(e.to_string()))
}

pub async fn handle_text(state: &SlotGameState, text: &str) -> ServerMessage {
    match parse_message(text) {
        Ok(message) => dispatch(state, message).await,
        Err(e) => {
            warn!("Rejected channel message: {}", e);
            ServerMessage::Error(e.to_error_response(None))
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SlotGameState>) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_BYTES * 4)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SlotGameState) {
    let connection = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    info!("Slot channel {} opened", connection);

    // Forward replies to the socket
    let forward = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = sender.send(Message::Text(msg)).await {
                error!("WebSocket send error: {:?} - Connection will be closed", e);
                break;
            }
        }
        if let Err(e) = sender.close().await {
            warn!("Failed to close WebSocket connection gracefully: {:?}", e);
        }
    });

    // Requests on one channel are answered in order
    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let reply = handle_text(&state, &text).await;
        match serde_json::to_string(&reply) {
            Ok(json) => {
                if tx.send(json).is_err() {
                    break;
                }
            }
            Err(e) => error!("Failed to encode reply: {}", e),
        }
    }

    drop(tx);
    if let Err(e) = forward.await {
        error!("Forwarding task for channel {} failed: {}", connection, e);
    }
    info!("Slot channel {} closed", connection);
}

async fn login(
    State(state): State<SlotGameState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, WagerError> {
    Ok(Json(state.accounts.login(req.key).await?))
}

async fn gamestate(
    State(state): State<SlotGameState>,
    Json(req): Json<GamestateRequest>,
) -> Result<Json<GamestateResponse>, WagerError> {
    Ok(Json(state.wagers.gamestate(&req).await?))
}

async fn bet(
    State(state): State<SlotGameState>,
    Json(req): Json<BetRequest>,
) -> Result<Json<BetResponse>, WagerError> {
    let receipt = state.wagers.bet(&req).await?;
    Ok(Json(receipt.into()))
}

async fn list_games(State(state): State<SlotGameState>) -> Json<Vec<GameSummary>> {
    let games = state.wagers.games();
    let summaries = games
        .ids()
        .into_iter()
        .filter_map(|id| games.get(id))
        .map(|def| GameSummary::from(def.as_ref()))
        .collect();
    Json(summaries)
}
