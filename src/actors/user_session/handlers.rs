use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::actors::chat_store::{ParticipantSeed, SettingsPatch, StoreHandle};
use crate::actors::presence::PresenceMessage;
use crate::actors::room_router::{RoomId, RouterMessage};
use crate::error::ChatError;
use crate::events::{ClientEvent, ServerEvent};
use crate::identity::{Identity, ProfileResolver};
use crate::model::{Conversation, ConversationId, FileMeta, LastMessage, MessageKind};

const MIN_SEARCH_TERM_LEN: usize = 2;

/// Everything a handler needs, cloned per session. `reply` answers the
/// requesting session directly; broadcasts go through the router.
pub struct EventContext {
    pub session_id: Uuid,
    pub identity: Identity,
    pub router: mpsc::UnboundedSender<RouterMessage>,
    pub presence: mpsc::UnboundedSender<PresenceMessage>,
    pub store: StoreHandle,
    pub profiles: Arc<dyn ProfileResolver>,
    pub reply: mpsc::Sender<ServerEvent>,
}

impl EventContext {
    pub async fn respond(&self, event: ServerEvent) {
        if self.reply.send(event).await.is_err() {
            debug!("session {} reply channel closed", self.session_id);
        }
    }

    fn emit(&self, room: RoomId, event: ServerEvent) {
        let _ = self.router.send(RouterMessage::Emit { room, event });
    }

    fn emit_to_participants(&self, conversation: &Conversation, event: ServerEvent) {
        for participant in &conversation.participants {
            self.emit(RoomId::User(participant.user_id.clone()), event.clone());
        }
    }

    /// The conversation, iff the caller is one of its participants.
    async fn authorize(&self, conversation_id: ConversationId) -> Result<Conversation, ChatError> {
        self.store
            .find_for_participant(
                &self.identity.tenant_id,
                conversation_id,
                &self.identity.user_id,
            )
            .await
    }

    /// The caller's denormalized identity, captured for write-time
    /// snapshots.
    fn own_seed(&self) -> Result<ParticipantSeed, ChatError> {
        let profile = self.profiles.profile(&self.identity.user_id)?;
        Ok(ParticipantSeed {
            user_id: self.identity.user_id.clone(),
            display_name: profile.display_name,
            avatar: profile.avatar,
            role: self.identity.role.clone(),
        })
    }
}

pub async fn dispatch(ctx: &EventContext, event: ClientEvent) -> Result<(), ChatError> {
    match event {
        ClientEvent::GetConversations { limit, skip } => get_conversations(ctx, limit, skip).await,
        ClientEvent::GetMessages {
            conversation_id,
            limit,
            skip,
        } => get_messages(ctx, conversation_id, limit, skip).await,
        ClientEvent::SendMessage {
            conversation_id,
            content,
            kind,
            file_data,
        } => send_message(ctx, conversation_id, content, kind, file_data).await,
        ClientEvent::MarkMessagesRead { conversation_id } => {
            mark_messages_read(ctx, conversation_id).await
        }
        ClientEvent::GetUnreadCount => get_unread_count(ctx).await,
        ClientEvent::SearchChats { search_term, limit } => {
            search_chats(ctx, search_term, limit).await
        }
        ClientEvent::UpdateOnlineStatus { is_online } => update_online_status(ctx, is_online),
        ClientEvent::StartConversation { target_user_id } => {
            start_conversation(ctx, target_user_id).await
        }
        ClientEvent::JoinConversation { conversation_id } => {
            join_conversation(ctx, conversation_id).await
        }
        ClientEvent::LeaveConversation { conversation_id } => {
            leave_conversation(ctx, conversation_id).await
        }
        ClientEvent::Typing { conversation_id } => typing(ctx, conversation_id, true).await,
        ClientEvent::StopTyping { conversation_id } => typing(ctx, conversation_id, false).await,
        ClientEvent::MuteConversation {
            conversation_id,
            muted,
        } => mute_conversation(ctx, conversation_id, muted).await,
        ClientEvent::DisappearingToggle {
            conversation_id,
            enabled,
        } => disappearing_toggle(ctx, conversation_id, enabled).await,
        ClientEvent::ClearConversation { conversation_id } => {
            clear_conversation(ctx, conversation_id).await
        }
        ClientEvent::DeleteConversation { conversation_id } => {
            delete_conversation(ctx, conversation_id).await
        }
        ClientEvent::BlockUser {
            conversation_id,
            blocked,
        } => block_user(ctx, conversation_id, blocked).await,
    }
}

async fn get_conversations(ctx: &EventContext, limit: usize, skip: usize) -> Result<(), ChatError> {
    let conversations = ctx
        .store
        .list_conversations(&ctx.identity.tenant_id, &ctx.identity.user_id, limit, skip)
        .await?;
    ctx.respond(ServerEvent::ConversationsList { conversations })
        .await;
    Ok(())
}

async fn get_messages(
    ctx: &EventContext,
    conversation_id: ConversationId,
    limit: usize,
    skip: usize,
) -> Result<(), ChatError> {
    let messages = ctx
        .store
        .list_messages(
            &ctx.identity.tenant_id,
            conversation_id,
            &ctx.identity.user_id,
            limit,
            skip,
        )
        .await?;
    ctx.respond(ServerEvent::MessagesList {
        conversation_id,
        messages,
    })
    .await;
    Ok(())
}

/// Append, ack the sender, then refresh the denormalized snapshot. The
/// store fans `new_message` out to every participant's user room from its
/// own loop, so delivery order matches append order. A failed snapshot
/// update downgrades to a warning; the message itself is already durable.
async fn send_message(
    ctx: &EventContext,
    conversation_id: ConversationId,
    content: String,
    kind: MessageKind,
    file_data: Option<FileMeta>,
) -> Result<(), ChatError> {
    if content.trim().is_empty() && file_data.is_none() {
        return Err(ChatError::InvalidInput(
            "message content is required".to_string(),
        ));
    }

    let sender = ctx.own_seed()?;
    let message = ctx
        .store
        .append_message(
            ctx.identity.tenant_id.clone(),
            conversation_id,
            sender,
            content,
            kind,
            file_data,
        )
        .await?;

    ctx.respond(ServerEvent::MessageSent {
        message: message.clone(),
    })
    .await;

    if let Err(e) = ctx
        .store
        .update_last_message(conversation_id, LastMessage::of(&message))
        .await
    {
        warn!("last-message snapshot update failed for {conversation_id}: {e}");
    }
    Ok(())
}

async fn mark_messages_read(
    ctx: &EventContext,
    conversation_id: ConversationId,
) -> Result<(), ChatError> {
    let conversation = ctx.authorize(conversation_id).await?;
    let marked = ctx
        .store
        .mark_read(conversation_id, &ctx.identity.user_id)
        .await?;

    ctx.respond(ServerEvent::MessagesMarkedRead {
        conversation_id,
        user_id: ctx.identity.user_id.clone(),
    })
    .await;

    if !marked.is_empty() {
        let receipt = ServerEvent::MessagesReadBy {
            conversation_id,
            user_id: ctx.identity.user_id.clone(),
            message_ids: marked,
        };
        for participant in &conversation.participants {
            if participant.user_id != ctx.identity.user_id {
                ctx.emit(RoomId::User(participant.user_id.clone()), receipt.clone());
            }
        }
    }
    Ok(())
}

async fn get_unread_count(ctx: &EventContext) -> Result<(), ChatError> {
    let count = ctx
        .store
        .unread_count(&ctx.identity.tenant_id, &ctx.identity.user_id)
        .await?;
    ctx.respond(ServerEvent::UnreadCount { count }).await;
    Ok(())
}

async fn search_chats(
    ctx: &EventContext,
    search_term: String,
    limit: usize,
) -> Result<(), ChatError> {
    let term = search_term.trim();
    if term.chars().count() < MIN_SEARCH_TERM_LEN {
        return Err(ChatError::InvalidInput(format!(
            "search term must be at least {MIN_SEARCH_TERM_LEN} characters"
        )));
    }

    let messages = ctx
        .store
        .search_messages(&ctx.identity.tenant_id, term, limit)
        .await?;
    ctx.respond(ServerEvent::SearchResults { messages }).await;
    Ok(())
}

fn update_online_status(ctx: &EventContext, is_online: bool) -> Result<(), ChatError> {
    ctx.presence
        .send(PresenceMessage::SetOnline {
            tenant_id: ctx.identity.tenant_id.clone(),
            user_id: ctx.identity.user_id.clone(),
            is_online,
            respond_to: None,
        })
        .map_err(|_| ChatError::Internal("presence tracker is gone".to_string()))
}

async fn start_conversation(
    ctx: &EventContext,
    target_user_id: String,
) -> Result<(), ChatError> {
    if target_user_id == ctx.identity.user_id {
        return Err(ChatError::InvalidInput(
            "cannot start a conversation with yourself".to_string(),
        ));
    }

    let own = ctx.own_seed()?;
    let target_profile = ctx.profiles.profile(&target_user_id)?;
    let target = ParticipantSeed {
        user_id: target_user_id.clone(),
        display_name: target_profile.display_name,
        avatar: target_profile.avatar,
        role: "member".to_string(),
    };

    let conversation = ctx
        .store
        .get_or_create_conversation(ctx.identity.tenant_id.clone(), own, target)
        .await?;

    ctx.respond(ServerEvent::ConversationStarted {
        conversation: conversation.clone(),
    })
    .await;
    ctx.emit(
        RoomId::User(target_user_id),
        ServerEvent::ConversationStarted { conversation },
    );
    Ok(())
}

async fn join_conversation(
    ctx: &EventContext,
    conversation_id: ConversationId,
) -> Result<(), ChatError> {
    ctx.authorize(conversation_id).await?;
    let _ = ctx.router.send(RouterMessage::Join {
        session_id: ctx.session_id,
        room: RoomId::Conversation(conversation_id),
    });
    ctx.respond(ServerEvent::JoinedConversation { conversation_id })
        .await;
    Ok(())
}

async fn leave_conversation(
    ctx: &EventContext,
    conversation_id: ConversationId,
) -> Result<(), ChatError> {
    let _ = ctx.router.send(RouterMessage::Leave {
        session_id: ctx.session_id,
        room: RoomId::Conversation(conversation_id),
    });
    ctx.respond(ServerEvent::LeftConversation { conversation_id })
        .await;
    Ok(())
}

/// Typing indicators only reach sessions that have the conversation open.
async fn typing(
    ctx: &EventContext,
    conversation_id: ConversationId,
    started: bool,
) -> Result<(), ChatError> {
    ctx.authorize(conversation_id).await?;
    let event = if started {
        ServerEvent::UserTyping {
            conversation_id,
            user_id: ctx.identity.user_id.clone(),
        }
    } else {
        ServerEvent::UserStoppedTyping {
            conversation_id,
            user_id: ctx.identity.user_id.clone(),
        }
    };
    ctx.emit(RoomId::Conversation(conversation_id), event);
    Ok(())
}

async fn mute_conversation(
    ctx: &EventContext,
    conversation_id: ConversationId,
    muted: bool,
) -> Result<(), ChatError> {
    ctx.authorize(conversation_id).await?;
    ctx.store
        .update_participant_settings(
            conversation_id,
            &ctx.identity.user_id,
            SettingsPatch {
                muted: Some(muted),
                ..Default::default()
            },
        )
        .await?;
    ctx.respond(ServerEvent::ConversationMuted {
        conversation_id,
        muted,
    })
    .await;
    Ok(())
}

async fn disappearing_toggle(
    ctx: &EventContext,
    conversation_id: ConversationId,
    enabled: bool,
) -> Result<(), ChatError> {
    ctx.authorize(conversation_id).await?;
    let conversation = ctx
        .store
        .update_participant_settings(
            conversation_id,
            &ctx.identity.user_id,
            SettingsPatch {
                disappearing: Some(enabled),
                ..Default::default()
            },
        )
        .await?;
    // Both sides see the disappearing indicator flip.
    ctx.emit_to_participants(
        &conversation,
        ServerEvent::DisappearingUpdated {
            conversation_id,
            enabled,
        },
    );
    Ok(())
}

async fn clear_conversation(
    ctx: &EventContext,
    conversation_id: ConversationId,
) -> Result<(), ChatError> {
    let conversation = ctx.authorize(conversation_id).await?;
    ctx.store.clear_conversation(conversation_id).await?;
    ctx.emit_to_participants(
        &conversation,
        ServerEvent::ConversationCleared { conversation_id },
    );
    Ok(())
}

async fn delete_conversation(
    ctx: &EventContext,
    conversation_id: ConversationId,
) -> Result<(), ChatError> {
    ctx.authorize(conversation_id).await?;
    ctx.store.set_active(conversation_id, false).await?;
    ctx.respond(ServerEvent::ConversationDeleted { conversation_id })
        .await;
    Ok(())
}

async fn block_user(
    ctx: &EventContext,
    conversation_id: ConversationId,
    blocked: bool,
) -> Result<(), ChatError> {
    ctx.authorize(conversation_id).await?;
    ctx.store
        .update_participant_settings(
            conversation_id,
            &ctx.identity.user_id,
            SettingsPatch {
                blocked: Some(blocked),
                ..Default::default()
            },
        )
        .await?;
    ctx.respond(ServerEvent::UserBlocked {
        conversation_id,
        user_id: ctx.identity.user_id.clone(),
        blocked,
    })
    .await;
    Ok(())
}
