use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{ParticipantSeed, SettingsPatch, StoreMessage};
use crate::error::ChatError;
use crate::metrics::Metrics;
use crate::model::{
    Conversation, ConversationId, FileMeta, LastMessage, Message, MessageId, MessageKind,
    TenantId, UserId,
};

/// Client side of the chat store actor. Every call is bounded by the
/// configured timeout and surfaces `Transient` on elapse; idempotent reads
/// get one internal retry, mutations never do.
#[derive(Clone)]
pub struct StoreHandle {
    sender: mpsc::UnboundedSender<StoreMessage>,
    timeout: Duration,
}

impl StoreHandle {
    pub fn new(sender: mpsc::UnboundedSender<StoreMessage>, timeout: Duration) -> Self {
        Self { sender, timeout }
    }

    async fn call<T>(
        &self,
        op: &'static str,
        message: StoreMessage,
        response: oneshot::Receiver<Result<T, ChatError>>,
    ) -> Result<T, ChatError> {
        let start = Instant::now();
        self.sender
            .send(message)
            .map_err(|_| ChatError::Internal("chat store is gone".to_string()))?;

        let result = match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ChatError::Internal(
                "chat store dropped the request".to_string(),
            )),
            Err(_) => Err(ChatError::Transient(format!("chat store timed out on {op}"))),
        };
        Metrics::observe_store_op(op, start.elapsed());
        result
    }

    async fn call_with_retry<T, F>(&self, op: &'static str, make: F) -> Result<T, ChatError>
    where
        F: Fn() -> (StoreMessage, oneshot::Receiver<Result<T, ChatError>>),
    {
        let (message, response) = make();
        match self.call(op, message, response).await {
            Err(ChatError::Transient(reason)) => {
                debug!("retrying {op} after transient failure: {reason}");
                let (message, response) = make();
                self.call(op, message, response).await
            }
            other => other,
        }
    }

    pub async fn get_or_create_conversation(
        &self,
        tenant_id: TenantId,
        a: ParticipantSeed,
        b: ParticipantSeed,
    ) -> Result<Conversation, ChatError> {
        let (respond_to, response) = oneshot::channel();
        self.call(
            "get_or_create_conversation",
            StoreMessage::GetOrCreateConversation {
                tenant_id,
                a,
                b,
                respond_to,
            },
            response,
        )
        .await
    }

    pub async fn list_conversations(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<Conversation>, ChatError> {
        self.call_with_retry("list_conversations", || {
            let (respond_to, response) = oneshot::channel();
            (
                StoreMessage::ListConversations {
                    tenant_id: tenant_id.clone(),
                    user_id: user_id.clone(),
                    limit,
                    skip,
                    respond_to,
                },
                response,
            )
        })
        .await
    }

    pub async fn find_for_participant(
        &self,
        tenant_id: &TenantId,
        conversation_id: ConversationId,
        user_id: &UserId,
    ) -> Result<Conversation, ChatError> {
        self.call_with_retry("find_for_participant", || {
            let (respond_to, response) = oneshot::channel();
            (
                StoreMessage::FindForParticipant {
                    tenant_id: tenant_id.clone(),
                    conversation_id,
                    user_id: user_id.clone(),
                    respond_to,
                },
                response,
            )
        })
        .await
    }

    pub async fn update_last_message(
        &self,
        conversation_id: ConversationId,
        snapshot: LastMessage,
    ) -> Result<(), ChatError> {
        let (respond_to, response) = oneshot::channel();
        self.call(
            "update_last_message",
            StoreMessage::UpdateLastMessage {
                conversation_id,
                snapshot,
                respond_to,
            },
            response,
        )
        .await
    }

    pub async fn update_participant_settings(
        &self,
        conversation_id: ConversationId,
        user_id: &UserId,
        patch: SettingsPatch,
    ) -> Result<Conversation, ChatError> {
        let (respond_to, response) = oneshot::channel();
        self.call(
            "update_participant_settings",
            StoreMessage::UpdateParticipantSettings {
                conversation_id,
                user_id: user_id.clone(),
                patch,
                respond_to,
            },
            response,
        )
        .await
    }

    pub async fn set_active(
        &self,
        conversation_id: ConversationId,
        active: bool,
    ) -> Result<(), ChatError> {
        let (respond_to, response) = oneshot::channel();
        self.call(
            "set_active",
            StoreMessage::SetActive {
                conversation_id,
                active,
                respond_to,
            },
            response,
        )
        .await
    }

    pub async fn reset_last_message(
        &self,
        conversation_id: ConversationId,
    ) -> Result<(), ChatError> {
        let (respond_to, response) = oneshot::channel();
        self.call(
            "reset_last_message",
            StoreMessage::ResetLastMessage {
                conversation_id,
                respond_to,
            },
            response,
        )
        .await
    }

    /// Never retried internally: a duplicate append is worse than a
    /// surfaced `Transient` the client can decide about.
    pub async fn append_message(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        sender: ParticipantSeed,
        content: String,
        kind: MessageKind,
        file: Option<FileMeta>,
    ) -> Result<Message, ChatError> {
        let (respond_to, response) = oneshot::channel();
        self.call(
            "append_message",
            StoreMessage::AppendMessage {
                tenant_id,
                conversation_id,
                sender,
                content,
                kind,
                file,
                respond_to,
            },
            response,
        )
        .await
    }

    pub async fn list_messages(
        &self,
        tenant_id: &TenantId,
        conversation_id: ConversationId,
        user_id: &UserId,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<Message>, ChatError> {
        self.call_with_retry("list_messages", || {
            let (respond_to, response) = oneshot::channel();
            (
                StoreMessage::ListMessages {
                    tenant_id: tenant_id.clone(),
                    conversation_id,
                    user_id: user_id.clone(),
                    limit,
                    skip,
                    respond_to,
                },
                response,
            )
        })
        .await
    }

    pub async fn mark_read(
        &self,
        conversation_id: ConversationId,
        user_id: &UserId,
    ) -> Result<Vec<MessageId>, ChatError> {
        let (respond_to, response) = oneshot::channel();
        self.call(
            "mark_read",
            StoreMessage::MarkRead {
                conversation_id,
                user_id: user_id.clone(),
                respond_to,
            },
            response,
        )
        .await
    }

    pub async fn unread_count(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<u64, ChatError> {
        self.call_with_retry("unread_count", || {
            let (respond_to, response) = oneshot::channel();
            (
                StoreMessage::UnreadCount {
                    tenant_id: tenant_id.clone(),
                    user_id: user_id.clone(),
                    respond_to,
                },
                response,
            )
        })
        .await
    }

    pub async fn search_messages(
        &self,
        tenant_id: &TenantId,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError> {
        self.call_with_retry("search_messages", || {
            let (respond_to, response) = oneshot::channel();
            (
                StoreMessage::SearchMessages {
                    tenant_id: tenant_id.clone(),
                    term: term.to_string(),
                    limit,
                    respond_to,
                },
                response,
            )
        })
        .await
    }

    pub async fn clear_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<(), ChatError> {
        let (respond_to, response) = oneshot::channel();
        self.call(
            "clear_conversation",
            StoreMessage::ClearConversation {
                conversation_id,
                respond_to,
            },
            response,
        )
        .await
    }

    pub async fn set_presence(
        &self,
        user_id: &UserId,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<(), ChatError> {
        let (respond_to, response) = oneshot::channel();
        self.call(
            "set_presence",
            StoreMessage::SetPresence {
                user_id: user_id.clone(),
                is_online,
                last_seen,
                respond_to: Some(respond_to),
            },
            response,
        )
        .await
    }
}
