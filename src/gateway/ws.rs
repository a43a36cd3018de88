//! WebSocket attach point for the event bus
//!
//! Sockets authenticate with a signed token naming a team or an admin and
//! are subscribed to their principal's rooms: team + registered contest
//! for teams, the admin room (plus everything it asks for) for admins.
//! Delivery is best-effort; a lagging socket drops messages and resyncs by
//! re-reading current state over HTTP.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::db::repositories::TeamRepository;
use crate::error::AppError;
use crate::events::{EventMessage, Principal, Room};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: String,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let principal = match state.verifier().verify(&params.token) {
        Ok(principal) => principal,
        Err(e) => {
            tracing::debug!("websocket auth rejected: {}", e);
            return AppError::InvalidToken.into_response();
        }
    };

    // Team sessions go stale after inactivity; admins are exempt
    if let Principal::Team { team_id, .. } = principal {
        match TeamRepository::find_by_id(state.db(), &team_id).await {
            Ok(Some(team)) => {
                let timeout = state.config().jwt.session_timeout_minutes;
                if !team.is_active || team.session_stale(chrono::Utc::now(), timeout) {
                    return AppError::TokenExpired.into_response();
                }
            }
            Ok(None) => return AppError::InvalidToken.into_response(),
            Err(e) => return e.into_response(),
        }
    }

    ws.on_upgrade(move |socket| handle_socket(state, socket, principal))
}

async fn handle_socket(state: AppState, mut socket: WebSocket, principal: Principal) {
    let rooms = principal.default_rooms();

    // Fan the subscribed rooms into one channel for this socket
    let (tx, mut rx) = mpsc::channel::<EventMessage>(64);
    for room in &rooms {
        let mut receiver = state.bus().subscribe(*room);
        let tx = tx.clone();
        let room = *room;

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(room = %room, skipped, "socket lagged; messages dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
    drop(tx);

    tracing::debug!(?rooms, "websocket attached");

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(message) = outbound else { break };
                let Ok(text) = serde_json::to_string(&message) else { continue };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Inbound payloads are ignored; subscriptions are fixed
                    // by the token
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!("websocket detached");
}

/// Validate a requested extra room against the principal; used by admin
/// tooling that watches a specific contest.
pub fn authorize_join(principal: &Principal, room: Room) -> Result<Room, AppError> {
    if principal.may_join(room) {
        Ok(room)
    } else {
        Err(AppError::Forbidden("Not a member of that room".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_authorize_join_enforces_contest_binding() {
        let team_id = Uuid::new_v4();
        let contest_id = Uuid::new_v4();
        let principal = Principal::Team {
            team_id,
            contest_id,
        };

        assert!(authorize_join(&principal, Room::Contest(contest_id)).is_ok());
        assert!(authorize_join(&principal, Room::Contest(Uuid::new_v4())).is_err());
        assert!(authorize_join(&principal, Room::Admins).is_err());
    }
}
