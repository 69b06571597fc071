use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::info;

use super::messages::StoreMessage;
use crate::actors::room_router::RouterMessage;
use crate::model::{Conversation, ConversationId, Message, TenantId, UserId};

/// Single owner of the conversation and message maps. One consumer loop
/// serializes every mutation, which is what makes `get_or_create` race-free
/// and gives each conversation a single append path: messages reach the
/// room router in seq order because the same loop appends and emits.
pub struct ChatStore {
    pub(super) receiver: mpsc::UnboundedReceiver<StoreMessage>,
    pub(super) router_sender: mpsc::UnboundedSender<RouterMessage>,
    pub(super) conversations: HashMap<ConversationId, Conversation>,
    pub(super) messages: HashMap<ConversationId, Vec<Message>>,
    /// Active 1:1 conversation per unordered (tenant, a, b) pair.
    pub(super) pair_index: HashMap<(TenantId, UserId, UserId), ConversationId>,
    /// Per-conversation logical clock; survives `clear`.
    pub(super) next_seq: HashMap<ConversationId, u64>,
}

impl ChatStore {
    pub fn new(
        router_sender: mpsc::UnboundedSender<RouterMessage>,
    ) -> (Self, mpsc::UnboundedSender<StoreMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();

        let store = Self {
            receiver,
            router_sender,
            conversations: HashMap::new(),
            messages: HashMap::new(),
            pair_index: HashMap::new(),
            next_seq: HashMap::new(),
        };

        (store, sender)
    }

    pub async fn run(mut self) {
        info!("chat store started");

        while let Some(message) = self.receiver.recv().await {
            match message {
                StoreMessage::GetOrCreateConversation {
                    tenant_id,
                    a,
                    b,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_get_or_create(tenant_id, a, b));
                }
                StoreMessage::ListConversations {
                    tenant_id,
                    user_id,
                    limit,
                    skip,
                    respond_to,
                } => {
                    let _ = respond_to
                        .send(self.handle_list_conversations(&tenant_id, &user_id, limit, skip));
                }
                StoreMessage::FindForParticipant {
                    tenant_id,
                    conversation_id,
                    user_id,
                    respond_to,
                } => {
                    let _ = respond_to.send(
                        self.handle_find_for_participant(&tenant_id, conversation_id, &user_id),
                    );
                }
                StoreMessage::UpdateLastMessage {
                    conversation_id,
                    snapshot,
                    respond_to,
                } => {
                    let _ =
                        respond_to.send(self.handle_update_last_message(conversation_id, snapshot));
                }
                StoreMessage::UpdateParticipantSettings {
                    conversation_id,
                    user_id,
                    patch,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_update_participant_settings(
                        conversation_id,
                        &user_id,
                        patch,
                    ));
                }
                StoreMessage::SetActive {
                    conversation_id,
                    active,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_set_active(conversation_id, active));
                }
                StoreMessage::ResetLastMessage {
                    conversation_id,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_reset_last_message(conversation_id));
                }
                StoreMessage::AppendMessage {
                    tenant_id,
                    conversation_id,
                    sender,
                    content,
                    kind,
                    file,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_append_message(
                        &tenant_id,
                        conversation_id,
                        sender,
                        content,
                        kind,
                        file,
                    ));
                }
                StoreMessage::ListMessages {
                    tenant_id,
                    conversation_id,
                    user_id,
                    limit,
                    skip,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_list_messages(
                        &tenant_id,
                        conversation_id,
                        &user_id,
                        limit,
                        skip,
                    ));
                }
                StoreMessage::MarkRead {
                    conversation_id,
                    user_id,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_mark_read(conversation_id, &user_id));
                }
                StoreMessage::UnreadCount {
                    tenant_id,
                    user_id,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_unread_count(&tenant_id, &user_id));
                }
                StoreMessage::SearchMessages {
                    tenant_id,
                    term,
                    limit,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_search(&tenant_id, &term, limit));
                }
                StoreMessage::ClearConversation {
                    conversation_id,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.handle_clear(conversation_id));
                }
                StoreMessage::SetPresence {
                    user_id,
                    is_online,
                    last_seen,
                    respond_to,
                } => {
                    let result = self.handle_set_presence(&user_id, is_online, last_seen);
                    if let Some(respond_to) = respond_to {
                        let _ = respond_to.send(result);
                    }
                }
            }
        }

        info!("chat store stopped");
    }
}
