use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use super::messages::{RoomId, RouterMessage};
use crate::events::ServerEvent;

/// Single owner of the room membership maps. Join/leave/emit are serialized
/// through one channel, so fan-out order equals enqueue order.
pub struct RoomRouter {
    pub(super) receiver: mpsc::UnboundedReceiver<RouterMessage>,
    pub(super) sessions: HashMap<Uuid, mpsc::Sender<ServerEvent>>,
    pub(super) rooms: HashMap<RoomId, HashSet<Uuid>>,
    pub(super) session_rooms: HashMap<Uuid, HashSet<RoomId>>,
    sweep_interval: Duration,
}

impl RoomRouter {
    pub fn new(sweep_interval: Duration) -> (Self, mpsc::UnboundedSender<RouterMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();

        let router = Self {
            receiver,
            sessions: HashMap::new(),
            rooms: HashMap::new(),
            session_rooms: HashMap::new(),
            sweep_interval,
        };

        (router, sender)
    }

    pub async fn run(mut self) {
        info!("room router started");

        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        sweep.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                message = self.receiver.recv() => {
                    let Some(message) = message else { break };
                    match message {
                        RouterMessage::RegisterSession {
                            session_id,
                            user_id,
                            tenant_id,
                            sender,
                            respond_to,
                        } => {
                            self.handle_register_session(
                                session_id, user_id, tenant_id, sender, respond_to,
                            );
                        }
                        RouterMessage::UnregisterSession { session_id } => {
                            self.handle_unregister_session(session_id);
                        }
                        RouterMessage::Join { session_id, room } => {
                            self.handle_join(session_id, room);
                        }
                        RouterMessage::Leave { session_id, room } => {
                            self.handle_leave(session_id, &room);
                        }
                        RouterMessage::Emit { room, event } => {
                            self.handle_emit(&room, event);
                        }
                        RouterMessage::RoomMembers { room, respond_to } => {
                            let members = self
                                .rooms
                                .get(&room)
                                .map(|m| m.iter().copied().collect())
                                .unwrap_or_default();
                            let _ = respond_to.send(members);
                        }
                    }
                }
                _ = sweep.tick() => {
                    self.sweep_stale_sessions();
                }
            }
        }

        info!("room router stopped");
    }
}
