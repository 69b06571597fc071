use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use super::messages::RoomId;
use super::router::RoomRouter;
use crate::error::ChatError;
use crate::events::ServerEvent;
use crate::model::{TenantId, UserId};

impl RoomRouter {
    pub(super) fn handle_register_session(
        &mut self,
        session_id: Uuid,
        user_id: UserId,
        tenant_id: TenantId,
        sender: mpsc::Sender<ServerEvent>,
        respond_to: oneshot::Sender<Result<(), ChatError>>,
    ) {
        // Multiple sessions per user are expected (devices/tabs); the
        // registry is keyed by session id.
        self.sessions.insert(session_id, sender);
        self.session_rooms.insert(session_id, Default::default());

        self.handle_join(session_id, RoomId::User(user_id.clone()));
        self.handle_join(session_id, RoomId::Tenant(tenant_id));

        debug!("session {session_id} registered for user {user_id}");
        let _ = respond_to.send(Ok(()));
    }

    pub(super) fn handle_unregister_session(&mut self, session_id: Uuid) {
        if self.sessions.remove(&session_id).is_none() {
            return;
        }
        if let Some(rooms) = self.session_rooms.remove(&session_id) {
            for room in rooms {
                if let Some(members) = self.rooms.get_mut(&room) {
                    members.remove(&session_id);
                    if members.is_empty() {
                        self.rooms.remove(&room);
                    }
                }
            }
        }
        debug!("session {session_id} unregistered");
    }

    pub(super) fn handle_join(&mut self, session_id: Uuid, room: RoomId) {
        if !self.sessions.contains_key(&session_id) {
            debug!("join from unknown session {session_id} ignored");
            return;
        }
        self.rooms.entry(room.clone()).or_default().insert(session_id);
        if let Some(rooms) = self.session_rooms.get_mut(&session_id) {
            rooms.insert(room.clone());
        }
        debug!("session {session_id} joined {room}");
    }

    pub(super) fn handle_leave(&mut self, session_id: Uuid, room: &RoomId) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&session_id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
        if let Some(rooms) = self.session_rooms.get_mut(&session_id) {
            rooms.remove(room);
        }
        debug!("session {session_id} left {room}");
    }

    /// Delivers to every session currently in the room. An empty room and a
    /// full or closed session channel are no-ops, never errors.
    pub(super) fn handle_emit(&mut self, room: &RoomId, event: ServerEvent) {
        let Some(members) = self.rooms.get(room) else {
            debug!("emit {} to empty room {room}", event.name());
            return;
        };

        for session_id in members {
            let Some(sender) = self.sessions.get(session_id) else {
                continue;
            };
            match sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("session {session_id} queue full in {room}, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("session {session_id} channel closed in {room}");
                }
            }
        }
    }

    /// Drops sessions whose outbound channel has closed without an explicit
    /// unregister (e.g. an aborted task).
    pub(super) fn sweep_stale_sessions(&mut self) {
        let stale: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|(_, sender)| sender.is_closed())
            .map(|(id, _)| *id)
            .collect();
        for session_id in stale {
            debug!("sweeping stale session {session_id}");
            self.handle_unregister_session(session_id);
        }
    }
}
