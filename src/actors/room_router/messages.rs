use std::fmt;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::ChatError;
use crate::events::ServerEvent;
use crate::model::{ConversationId, TenantId, UserId};

/// Logical fan-out target. A session always sits in its own user room and
/// tenant room; conversation rooms are joined when the client opens the
/// conversation view.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum RoomId {
    User(UserId),
    Conversation(ConversationId),
    Tenant(TenantId),
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::User(id) => write!(f, "user:{id}"),
            RoomId::Conversation(id) => write!(f, "conversation:{id}"),
            RoomId::Tenant(id) => write!(f, "company:{id}"),
        }
    }
}

#[derive(Debug)]
pub enum RouterMessage {
    RegisterSession {
        session_id: Uuid,
        user_id: UserId,
        tenant_id: TenantId,
        sender: mpsc::Sender<ServerEvent>,
        respond_to: oneshot::Sender<Result<(), ChatError>>,
    },
    UnregisterSession {
        session_id: Uuid,
    },
    Join {
        session_id: Uuid,
        room: RoomId,
    },
    Leave {
        session_id: Uuid,
        room: RoomId,
    },
    Emit {
        room: RoomId,
        event: ServerEvent,
    },
    RoomMembers {
        room: RoomId,
        respond_to: oneshot::Sender<Vec<Uuid>>,
    },
}
