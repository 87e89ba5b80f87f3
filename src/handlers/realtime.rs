use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::{
    auth::{verify_token, AuthUser},
    errors::ServiceError,
    notifier::hub::{customer_room, RoomMessage, OPERATORS_ROOM},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: String,
}

/// Authenticated websocket endpoint. Browsers cannot set headers on the
/// upgrade request, so the JWT arrives as a query parameter. Customers
/// join their own room; operators additionally join the store-wide room.
#[utoipa::path(
    get,
    path = "/api/realtime/ws",
    tag = "realtime",
    params(("token" = String, Query, description = "JWT bearer token")),
    responses(
        (status = 101, description = "Switching protocols"),
        (status = 401, description = "Invalid token")
    )
)]
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServiceError> {
    let claims = verify_token(&state.config.jwt_secret, &params.token)?;
    let user: AuthUser = claims.into();
    Ok(ws.on_upgrade(move |socket| session(socket, state, user)))
}

async fn session(socket: WebSocket, state: AppState, user: AuthUser) {
    let mut rooms = vec![customer_room(user.id)];
    if user.is_operator() {
        rooms.push(OPERATORS_ROOM.to_string());
    }
    debug!(user_id = %user.id, ?rooms, "websocket session opened");

    // Fan the per-room broadcast receivers into one channel for the
    // writer loop.
    let (tx, mut rx) = mpsc::channel::<RoomMessage>(64);
    let mut forwarders = Vec::with_capacity(rooms.len());
    for room in &rooms {
        let mut sub = state.hub.subscribe(room);
        let tx = tx.clone();
        forwarders.push(tokio::spawn(async move {
            loop {
                match sub.recv().await {
                    Ok(message) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "websocket session lagged behind its room");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }
    drop(tx);

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(message) = outbound else { break };
                let Ok(text) = serde_json::to_string(&message) else { continue };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(Message::Ping(payload))) => {
                        if sender.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    // Client-to-server payloads are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    for task in forwarders {
        task.abort();
    }
    debug!(user_id = %user.id, "websocket session closed");
}
