use crate::{identity::Identity, state::AppState};
use axum::extract::ws::WebSocket;
use std::sync::Arc;

pub async fn chat_socket(socket: WebSocket, identity: Identity, state: Arc<AppState>) {
    state
        .connection_manager
        .handle_connection(socket, identity)
        .await;
}
