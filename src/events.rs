use serde::{Deserialize, Serialize};

use crate::model::{
    Conversation, ConversationId, FileMeta, Message, MessageId, MessageKind, UserId,
};
use chrono::{DateTime, Utc};

fn default_page_limit() -> usize {
    50
}

fn default_search_limit() -> usize {
    20
}

/// Everything a client may send, decoded at the socket boundary into a
/// closed tagged union: `{"event": "...", "data": {...}}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    GetConversations {
        #[serde(default = "default_page_limit")]
        limit: usize,
        #[serde(default)]
        skip: usize,
    },
    GetMessages {
        conversation_id: ConversationId,
        #[serde(default = "default_page_limit")]
        limit: usize,
        #[serde(default)]
        skip: usize,
    },
    SendMessage {
        conversation_id: ConversationId,
        content: String,
        #[serde(rename = "type", default)]
        kind: MessageKind,
        #[serde(default)]
        file_data: Option<FileMeta>,
    },
    MarkMessagesRead {
        conversation_id: ConversationId,
    },
    GetUnreadCount,
    SearchChats {
        search_term: String,
        #[serde(default = "default_search_limit")]
        limit: usize,
    },
    UpdateOnlineStatus {
        is_online: bool,
    },
    StartConversation {
        target_user_id: UserId,
    },
    JoinConversation {
        conversation_id: ConversationId,
    },
    LeaveConversation {
        conversation_id: ConversationId,
    },
    Typing {
        conversation_id: ConversationId,
    },
    StopTyping {
        conversation_id: ConversationId,
    },
    MuteConversation {
        conversation_id: ConversationId,
        muted: bool,
    },
    DisappearingToggle {
        conversation_id: ConversationId,
        enabled: bool,
    },
    ClearConversation {
        conversation_id: ConversationId,
    },
    DeleteConversation {
        conversation_id: ConversationId,
    },
    BlockUser {
        conversation_id: ConversationId,
        blocked: bool,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::GetConversations { .. } => "get_conversations",
            ClientEvent::GetMessages { .. } => "get_messages",
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::MarkMessagesRead { .. } => "mark_messages_read",
            ClientEvent::GetUnreadCount => "get_unread_count",
            ClientEvent::SearchChats { .. } => "search_chats",
            ClientEvent::UpdateOnlineStatus { .. } => "update_online_status",
            ClientEvent::StartConversation { .. } => "start_conversation",
            ClientEvent::JoinConversation { .. } => "join_conversation",
            ClientEvent::LeaveConversation { .. } => "leave_conversation",
            ClientEvent::Typing { .. } => "typing",
            ClientEvent::StopTyping { .. } => "stop_typing",
            ClientEvent::MuteConversation { .. } => "mute_conversation",
            ClientEvent::DisappearingToggle { .. } => "disappearing_toggle",
            ClientEvent::ClearConversation { .. } => "clear_conversation",
            ClientEvent::DeleteConversation { .. } => "delete_conversation",
            ClientEvent::BlockUser { .. } => "block_user",
        }
    }

    /// Events that hit the store or fan out work; these pass the token
    /// bucket before they are dispatched.
    pub fn is_write_class(&self) -> bool {
        matches!(
            self,
            ClientEvent::SendMessage { .. }
                | ClientEvent::SearchChats { .. }
                | ClientEvent::StartConversation { .. }
                | ClientEvent::GetConversations { .. }
                | ClientEvent::GetMessages { .. }
        )
    }
}

/// Everything the server may push, in the same `{event, data}` envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    ConversationsList {
        conversations: Vec<Conversation>,
    },
    MessagesList {
        conversation_id: ConversationId,
        messages: Vec<Message>,
    },
    NewMessage {
        message: Message,
    },
    MessageSent {
        message: Message,
    },
    MessagesMarkedRead {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    MessagesReadBy {
        conversation_id: ConversationId,
        user_id: UserId,
        message_ids: Vec<MessageId>,
    },
    UnreadCount {
        count: u64,
    },
    SearchResults {
        messages: Vec<Message>,
    },
    ConversationStarted {
        conversation: Conversation,
    },
    JoinedConversation {
        conversation_id: ConversationId,
    },
    LeftConversation {
        conversation_id: ConversationId,
    },
    UserTyping {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    UserStoppedTyping {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    UserStatusChanged {
        user_id: UserId,
        is_online: bool,
        last_seen: DateTime<Utc>,
    },
    ConversationMuted {
        conversation_id: ConversationId,
        muted: bool,
    },
    DisappearingUpdated {
        conversation_id: ConversationId,
        enabled: bool,
    },
    ConversationCleared {
        conversation_id: ConversationId,
    },
    ConversationDeleted {
        conversation_id: ConversationId,
    },
    UserBlocked {
        conversation_id: ConversationId,
        user_id: UserId,
        blocked: bool,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ConversationsList { .. } => "conversations_list",
            ServerEvent::MessagesList { .. } => "messages_list",
            ServerEvent::NewMessage { .. } => "new_message",
            ServerEvent::MessageSent { .. } => "message_sent",
            ServerEvent::MessagesMarkedRead { .. } => "messages_marked_read",
            ServerEvent::MessagesReadBy { .. } => "messages_read_by",
            ServerEvent::UnreadCount { .. } => "unread_count",
            ServerEvent::SearchResults { .. } => "search_results",
            ServerEvent::ConversationStarted { .. } => "conversation_started",
            ServerEvent::JoinedConversation { .. } => "joined_conversation",
            ServerEvent::LeftConversation { .. } => "left_conversation",
            ServerEvent::UserTyping { .. } => "user_typing",
            ServerEvent::UserStoppedTyping { .. } => "user_stopped_typing",
            ServerEvent::UserStatusChanged { .. } => "user_status_changed",
            ServerEvent::ConversationMuted { .. } => "conversation_muted",
            ServerEvent::DisappearingUpdated { .. } => "disappearing_updated",
            ServerEvent::ConversationCleared { .. } => "conversation_cleared",
            ServerEvent::ConversationDeleted { .. } => "conversation_deleted",
            ServerEvent::UserBlocked { .. } => "user_blocked",
            ServerEvent::Error { .. } => "error",
        }
    }
}
