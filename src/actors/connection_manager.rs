use std::sync::Arc;

use axum::extract::ws::WebSocket;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::actors::chat_store::StoreHandle;
use crate::actors::presence::PresenceMessage;
use crate::actors::room_router::RouterMessage;
use crate::actors::user_session::UserSession;
use crate::config::Config;
use crate::identity::{Identity, ProfileResolver};
use crate::metrics::Metrics;

/// Turns an authenticated upgraded socket into a running session.
pub struct ConnectionManager {
    router_sender: mpsc::UnboundedSender<RouterMessage>,
    presence_sender: mpsc::UnboundedSender<PresenceMessage>,
    store: StoreHandle,
    profiles: Arc<dyn ProfileResolver>,
    config: Config,
}

impl ConnectionManager {
    pub fn new(
        router_sender: mpsc::UnboundedSender<RouterMessage>,
        presence_sender: mpsc::UnboundedSender<PresenceMessage>,
        store: StoreHandle,
        profiles: Arc<dyn ProfileResolver>,
        config: Config,
    ) -> Self {
        Self {
            router_sender,
            presence_sender,
            store,
            profiles,
            config,
        }
    }

    pub async fn handle_connection(&self, socket: WebSocket, identity: Identity) {
        info!("new connection for user {}", identity.user_id);
        Metrics::websocket_connected();

        match UserSession::new(
            socket,
            identity.clone(),
            self.router_sender.clone(),
            self.presence_sender.clone(),
            self.store.clone(),
            self.profiles.clone(),
            &self.config,
        )
        .await
        {
            Ok(session) => {
                info!("session created for {}", identity.user_id);
                session.run().await;
            }
            Err(e) => {
                error!("failed to create session for {}: {e}", identity.user_id);
            }
        }

        Metrics::websocket_disconnected();
    }
}
