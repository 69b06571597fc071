use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::error::ChatError;
use crate::model::{
    Conversation, ConversationId, FileMeta, LastMessage, Message, MessageId, MessageKind,
    TenantId, UserId,
};

/// Denormalized identity captured at write time for a participant entry or
/// a message's sender fields.
#[derive(Clone, Debug)]
pub struct ParticipantSeed {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar: Option<String>,
    pub role: String,
}

/// Partial update of one participant's settings; `None` leaves the field
/// untouched. Sibling participants are never written.
#[derive(Clone, Copy, Debug, Default)]
pub struct SettingsPatch {
    pub muted: Option<bool>,
    pub blocked: Option<bool>,
    pub disappearing: Option<bool>,
}

#[derive(Debug)]
pub enum StoreMessage {
    GetOrCreateConversation {
        tenant_id: TenantId,
        a: ParticipantSeed,
        b: ParticipantSeed,
        respond_to: oneshot::Sender<Result<Conversation, ChatError>>,
    },
    ListConversations {
        tenant_id: TenantId,
        user_id: UserId,
        limit: usize,
        skip: usize,
        respond_to: oneshot::Sender<Result<Vec<Conversation>, ChatError>>,
    },
    FindForParticipant {
        tenant_id: TenantId,
        conversation_id: ConversationId,
        user_id: UserId,
        respond_to: oneshot::Sender<Result<Conversation, ChatError>>,
    },
    UpdateLastMessage {
        conversation_id: ConversationId,
        snapshot: LastMessage,
        respond_to: oneshot::Sender<Result<(), ChatError>>,
    },
    UpdateParticipantSettings {
        conversation_id: ConversationId,
        user_id: UserId,
        patch: SettingsPatch,
        respond_to: oneshot::Sender<Result<Conversation, ChatError>>,
    },
    SetActive {
        conversation_id: ConversationId,
        active: bool,
        respond_to: oneshot::Sender<Result<(), ChatError>>,
    },
    ResetLastMessage {
        conversation_id: ConversationId,
        respond_to: oneshot::Sender<Result<(), ChatError>>,
    },
    AppendMessage {
        tenant_id: TenantId,
        conversation_id: ConversationId,
        sender: ParticipantSeed,
        content: String,
        kind: MessageKind,
        file: Option<FileMeta>,
        respond_to: oneshot::Sender<Result<Message, ChatError>>,
    },
    ListMessages {
        tenant_id: TenantId,
        conversation_id: ConversationId,
        user_id: UserId,
        limit: usize,
        skip: usize,
        respond_to: oneshot::Sender<Result<Vec<Message>, ChatError>>,
    },
    MarkRead {
        conversation_id: ConversationId,
        user_id: UserId,
        respond_to: oneshot::Sender<Result<Vec<MessageId>, ChatError>>,
    },
    UnreadCount {
        tenant_id: TenantId,
        user_id: UserId,
        respond_to: oneshot::Sender<Result<u64, ChatError>>,
    },
    SearchMessages {
        tenant_id: TenantId,
        term: String,
        limit: usize,
        respond_to: oneshot::Sender<Result<Vec<Message>, ChatError>>,
    },
    ClearConversation {
        conversation_id: ConversationId,
        respond_to: oneshot::Sender<Result<(), ChatError>>,
    },
    SetPresence {
        user_id: UserId,
        is_online: bool,
        last_seen: DateTime<Utc>,
        respond_to: Option<oneshot::Sender<Result<(), ChatError>>>,
    },
}
