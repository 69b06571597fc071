use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::actors::chat_store::StoreHandle;
use crate::actors::room_router::{RoomId, RouterMessage};
use crate::events::ServerEvent;
use crate::model::{TenantId, UserId};

#[derive(Debug)]
pub enum PresenceMessage {
    SetOnline {
        tenant_id: TenantId,
        user_id: UserId,
        is_online: bool,
        respond_to: Option<oneshot::Sender<()>>,
    },
    IsOnline {
        user_id: UserId,
        respond_to: oneshot::Sender<bool>,
    },
}

#[derive(Clone, Debug)]
struct PresenceState {
    is_online: bool,
    last_seen: DateTime<Utc>,
}

/// Single authority for online/offline and last-seen. Peers in the tenant
/// room are notified first; the participant-record rehydration through the
/// store is best effort and never blocks the notification.
pub struct PresenceTracker {
    receiver: mpsc::UnboundedReceiver<PresenceMessage>,
    router_sender: mpsc::UnboundedSender<RouterMessage>,
    store: StoreHandle,
    statuses: HashMap<UserId, PresenceState>,
}

impl PresenceTracker {
    pub fn new(
        router_sender: mpsc::UnboundedSender<RouterMessage>,
        store: StoreHandle,
    ) -> (Self, mpsc::UnboundedSender<PresenceMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();

        let tracker = Self {
            receiver,
            router_sender,
            store,
            statuses: HashMap::new(),
        };

        (tracker, sender)
    }

    pub async fn run(mut self) {
        info!("presence tracker started");

        while let Some(message) = self.receiver.recv().await {
            match message {
                PresenceMessage::SetOnline {
                    tenant_id,
                    user_id,
                    is_online,
                    respond_to,
                } => {
                    self.handle_set_online(tenant_id, user_id, is_online).await;
                    if let Some(respond_to) = respond_to {
                        let _ = respond_to.send(());
                    }
                }
                PresenceMessage::IsOnline {
                    user_id,
                    respond_to,
                } => {
                    let online = self
                        .statuses
                        .get(&user_id)
                        .map(|s| s.is_online)
                        .unwrap_or(false);
                    let _ = respond_to.send(online);
                }
            }
        }

        info!("presence tracker stopped");
    }

    async fn handle_set_online(&mut self, tenant_id: TenantId, user_id: UserId, is_online: bool) {
        let last_seen = Utc::now();
        self.statuses.insert(
            user_id.clone(),
            PresenceState {
                is_online,
                last_seen,
            },
        );

        // Notify first: connected peers must learn about the change even if
        // the participant-record write below fails.
        let _ = self.router_sender.send(RouterMessage::Emit {
            room: RoomId::Tenant(tenant_id),
            event: ServerEvent::UserStatusChanged {
                user_id: user_id.clone(),
                is_online,
                last_seen,
            },
        });

        if let Err(e) = self.store.set_presence(&user_id, is_online, last_seen).await {
            warn!("presence write for {user_id} failed, peers were still notified: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::actors::chat_store::{ChatStore, ParticipantSeed, StoreHandle};
    use crate::actors::room_router::{RoomRouter, RouterMessage};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn seed(user: &str) -> ParticipantSeed {
        ParticipantSeed {
            user_id: user.to_string(),
            display_name: format!("User {user}"),
            avatar: None,
            role: "member".to_string(),
        }
    }

    async fn wired() -> (
        mpsc::UnboundedSender<PresenceMessage>,
        mpsc::UnboundedSender<RouterMessage>,
        StoreHandle,
    ) {
        let (router, router_sender) = RoomRouter::new(Duration::from_secs(3600));
        tokio::spawn(router.run());

        let (store_actor, store_sender) = ChatStore::new(router_sender.clone());
        tokio::spawn(store_actor.run());
        let store = StoreHandle::new(store_sender, Duration::from_secs(1));

        let (tracker, presence_sender) = PresenceTracker::new(router_sender.clone(), store.clone());
        tokio::spawn(tracker.run());

        (presence_sender, router_sender, store)
    }

    async fn set_online(
        presence: &mpsc::UnboundedSender<PresenceMessage>,
        user: &str,
        is_online: bool,
    ) {
        let (respond_to, response) = oneshot::channel();
        presence
            .send(PresenceMessage::SetOnline {
                tenant_id: "acme".to_string(),
                user_id: user.to_string(),
                is_online,
                respond_to: Some(respond_to),
            })
            .unwrap();
        response.await.unwrap();
    }

    #[tokio::test]
    async fn set_online_patches_conversations_and_answers_queries() {
        let (presence, _router, store) = wired().await;
        let conversation = store
            .get_or_create_conversation("acme".to_string(), seed("a"), seed("b"))
            .await
            .unwrap();

        set_online(&presence, "a", true).await;

        let found = store
            .find_for_participant(&"acme".to_string(), conversation.id, &"b".to_string())
            .await
            .unwrap();
        assert!(found.participant(&"a".to_string()).unwrap().is_online);

        let (respond_to, response) = oneshot::channel();
        presence
            .send(PresenceMessage::IsOnline {
                user_id: "a".to_string(),
                respond_to,
            })
            .unwrap();
        assert!(response.await.unwrap());

        set_online(&presence, "a", false).await;
        let found = store
            .find_for_participant(&"acme".to_string(), conversation.id, &"b".to_string())
            .await
            .unwrap();
        assert!(!found.participant(&"a".to_string()).unwrap().is_online);
    }

    #[tokio::test]
    async fn status_change_is_broadcast_to_the_tenant_room() {
        let (presence, router, _store) = wired().await;

        let session_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        let (respond_to, response) = oneshot::channel();
        router
            .send(RouterMessage::RegisterSession {
                session_id,
                user_id: "peer".to_string(),
                tenant_id: "acme".to_string(),
                sender: tx,
                respond_to,
            })
            .unwrap();
        response.await.unwrap().unwrap();

        set_online(&presence, "a", true).await;

        match rx.recv().await.unwrap() {
            ServerEvent::UserStatusChanged {
                user_id, is_online, ..
            } => {
                assert_eq!(user_id, "a");
                assert!(is_online);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_user_reads_as_offline() {
        let (presence, _router, _store) = wired().await;
        let (respond_to, response) = oneshot::channel();
        presence
            .send(PresenceMessage::IsOnline {
                user_id: "ghost".to_string(),
                respond_to,
            })
            .unwrap();
        assert!(!response.await.unwrap());
    }
}
