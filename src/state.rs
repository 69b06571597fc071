use std::sync::Arc;

use tokio::sync::mpsc;

use crate::actors::chat_store::{ChatStore, StoreHandle};
use crate::actors::connection_manager::ConnectionManager;
use crate::actors::presence::{PresenceMessage, PresenceTracker};
use crate::actors::room_router::{RoomRouter, RouterMessage};
use crate::config::Config;
use crate::error::ChatError;
use crate::identity::{Directory, IdentityResolver, ProfileResolver};

pub struct AppState {
    pub connection_manager: Arc<ConnectionManager>,
    pub router_sender: mpsc::UnboundedSender<RouterMessage>,
    pub presence_sender: mpsc::UnboundedSender<PresenceMessage>,
    pub store: StoreHandle,
    pub identities: Arc<dyn IdentityResolver>,
    pub profiles: Arc<dyn ProfileResolver>,
    pub config: Config,
}

impl AppState {
    async fn new(
        config: Config,
        identities: Arc<dyn IdentityResolver>,
        profiles: Arc<dyn ProfileResolver>,
    ) -> Result<Self, ChatError> {
        let (router, router_sender) = RoomRouter::new(config.sweep_interval);
        let (store_actor, store_sender) = ChatStore::new(router_sender.clone());
        let store = StoreHandle::new(store_sender, config.store_timeout);
        let (presence_tracker, presence_sender) =
            PresenceTracker::new(router_sender.clone(), store.clone());

        tokio::spawn(router.run());
        tokio::spawn(store_actor.run());
        tokio::spawn(presence_tracker.run());

        let connection_manager = Arc::new(ConnectionManager::new(
            router_sender.clone(),
            presence_sender.clone(),
            store.clone(),
            profiles.clone(),
            config.clone(),
        ));

        Ok(Self {
            connection_manager,
            router_sender,
            presence_sender,
            store,
            identities,
            profiles,
            config,
        })
    }
}

pub struct AppStateBuilder {
    config: Option<Config>,
    identities: Option<Arc<dyn IdentityResolver>>,
    profiles: Option<Arc<dyn ProfileResolver>>,
}

impl Default for AppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            identities: None,
            profiles: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_identity_resolver(mut self, identities: Arc<dyn IdentityResolver>) -> Self {
        self.identities = Some(identities);
        self
    }

    pub fn with_profile_resolver(mut self, profiles: Arc<dyn ProfileResolver>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// Builds the state and spawns the actor set. An empty in-memory
    /// directory backs both resolvers unless real ones were supplied.
    pub async fn build(self) -> Result<AppState, ChatError> {
        let config = self.config.unwrap_or_default();
        let (identities, profiles) = match (self.identities, self.profiles) {
            (Some(identities), Some(profiles)) => (identities, profiles),
            (identities, profiles) => {
                let directory = Arc::new(Directory::new());
                (
                    identities.unwrap_or_else(|| directory.clone() as Arc<dyn IdentityResolver>),
                    profiles.unwrap_or_else(|| directory as Arc<dyn ProfileResolver>),
                )
            }
        };

        AppState::new(config, identities, profiles).await
    }
}
