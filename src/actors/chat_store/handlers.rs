use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::actor::ChatStore;
use super::messages::{ParticipantSeed, SettingsPatch};
use crate::actors::room_router::{RoomId, RouterMessage};
use crate::error::ChatError;
use crate::events::ServerEvent;
use crate::model::{
    Conversation, ConversationId, FileMeta, LastMessage, Message, MessageId, MessageKind,
    Participant, ReadReceipt, TenantId, UserId,
};

fn pair_key(tenant_id: &TenantId, a: &UserId, b: &UserId) -> (TenantId, UserId, UserId) {
    if a <= b {
        (tenant_id.clone(), a.clone(), b.clone())
    } else {
        (tenant_id.clone(), b.clone(), a.clone())
    }
}

fn participant_from(seed: ParticipantSeed) -> Participant {
    Participant::new(seed.user_id, seed.display_name, seed.avatar, seed.role)
}

impl ChatStore {
    pub(super) fn handle_get_or_create(
        &mut self,
        tenant_id: TenantId,
        a: ParticipantSeed,
        b: ParticipantSeed,
    ) -> Result<Conversation, ChatError> {
        if a.user_id == b.user_id {
            return Err(ChatError::InvalidInput(
                "cannot start a conversation with yourself".to_string(),
            ));
        }

        let key = pair_key(&tenant_id, &a.user_id, &b.user_id);
        if let Some(id) = self.pair_index.get(&key) {
            let conversation = self
                .conversations
                .get_mut(id)
                .ok_or_else(|| ChatError::Internal("pair index points at nothing".to_string()))?;
            if !conversation.is_active {
                // The pair deleted their chat earlier; restarting it revives
                // the record so the pair invariant holds.
                conversation.is_active = true;
                conversation.updated_at = Utc::now();
            }
            return Ok(conversation.clone());
        }

        let conversation =
            Conversation::direct(tenant_id, participant_from(a), participant_from(b));
        self.pair_index.insert(key, conversation.id);
        self.conversations
            .insert(conversation.id, conversation.clone());
        debug!("created conversation {}", conversation.id);
        Ok(conversation)
    }

    pub(super) fn handle_list_conversations(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<Conversation>, ChatError> {
        let mut conversations: Vec<Conversation> = self
            .conversations
            .values()
            .filter(|c| c.is_active && &c.tenant_id == tenant_id && c.includes(user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations.into_iter().skip(skip).take(limit).collect())
    }

    /// Fails closed: a missing conversation, a different tenant, and a
    /// non-participant caller all produce the same `NotFound`.
    pub(super) fn handle_find_for_participant(
        &self,
        tenant_id: &TenantId,
        conversation_id: ConversationId,
        user_id: &UserId,
    ) -> Result<Conversation, ChatError> {
        self.conversations
            .get(&conversation_id)
            .filter(|c| &c.tenant_id == tenant_id && c.includes(user_id))
            .cloned()
            .ok_or(ChatError::NotFound)
    }

    pub(super) fn handle_update_last_message(
        &mut self,
        conversation_id: ConversationId,
        snapshot: LastMessage,
    ) -> Result<(), ChatError> {
        let conversation = self
            .conversations
            .get_mut(&conversation_id)
            .ok_or(ChatError::NotFound)?;
        conversation.last_message = Some(snapshot);
        conversation.updated_at = Utc::now();
        Ok(())
    }

    pub(super) fn handle_update_participant_settings(
        &mut self,
        conversation_id: ConversationId,
        user_id: &UserId,
        patch: SettingsPatch,
    ) -> Result<Conversation, ChatError> {
        let conversation = self
            .conversations
            .get_mut(&conversation_id)
            .ok_or(ChatError::NotFound)?;
        let participant = conversation
            .participant_mut(user_id)
            .ok_or(ChatError::NotFound)?;

        if let Some(muted) = patch.muted {
            participant.muted = muted;
        }
        if let Some(blocked) = patch.blocked {
            participant.blocked = blocked;
        }
        if let Some(disappearing) = patch.disappearing {
            participant.disappearing = disappearing;
        }
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }

    pub(super) fn handle_set_active(
        &mut self,
        conversation_id: ConversationId,
        active: bool,
    ) -> Result<(), ChatError> {
        let conversation = self
            .conversations
            .get_mut(&conversation_id)
            .ok_or(ChatError::NotFound)?;
        conversation.is_active = active;
        conversation.updated_at = Utc::now();
        Ok(())
    }

    pub(super) fn handle_reset_last_message(
        &mut self,
        conversation_id: ConversationId,
    ) -> Result<(), ChatError> {
        let conversation = self
            .conversations
            .get_mut(&conversation_id)
            .ok_or(ChatError::NotFound)?;
        conversation.last_message = None;
        Ok(())
    }

    /// Appends with the next seq and fans the message out to every
    /// participant's user room before returning. Emitting from the same
    /// loop that assigned the seq is what keeps delivery order equal to
    /// append order for all subscribers.
    pub(super) fn handle_append_message(
        &mut self,
        tenant_id: &TenantId,
        conversation_id: ConversationId,
        sender: ParticipantSeed,
        content: String,
        kind: MessageKind,
        file: Option<FileMeta>,
    ) -> Result<Message, ChatError> {
        let conversation = self
            .conversations
            .get(&conversation_id)
            .filter(|c| &c.tenant_id == tenant_id && c.includes(&sender.user_id))
            .ok_or(ChatError::NotFound)?;

        let seq = {
            let next = self.next_seq.entry(conversation_id).or_insert(0);
            *next += 1;
            *next
        };

        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            tenant_id: tenant_id.clone(),
            seq,
            sender_id: sender.user_id.clone(),
            sender_name: sender.display_name,
            sender_avatar: sender.avatar,
            content,
            kind,
            file,
            is_edited: false,
            is_deleted: false,
            reply_to: None,
            reactions: Vec::new(),
            read_by: vec![ReadReceipt {
                user_id: sender.user_id,
                read_at: now,
            }],
            created_at: now,
        };

        for participant in &conversation.participants {
            let _ = self.router_sender.send(RouterMessage::Emit {
                room: RoomId::User(participant.user_id.clone()),
                event: ServerEvent::NewMessage {
                    message: message.clone(),
                },
            });
        }

        self.messages
            .entry(conversation_id)
            .or_default()
            .push(message.clone());

        Ok(message)
    }

    /// Most recent page, returned oldest-first for chronological display.
    pub(super) fn handle_list_messages(
        &self,
        tenant_id: &TenantId,
        conversation_id: ConversationId,
        user_id: &UserId,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<Message>, ChatError> {
        self.handle_find_for_participant(tenant_id, conversation_id, user_id)?;

        let mut page: Vec<Message> = self
            .messages
            .get(&conversation_id)
            .map(|msgs| msgs.iter().rev().skip(skip).take(limit).cloned().collect())
            .unwrap_or_default();
        page.reverse();
        Ok(page)
    }

    /// Idempotent: already-marked messages are skipped, so a second call
    /// returns an empty list and changes nothing.
    pub(super) fn handle_mark_read(
        &mut self,
        conversation_id: ConversationId,
        user_id: &UserId,
    ) -> Result<Vec<MessageId>, ChatError> {
        if !self.conversations.contains_key(&conversation_id) {
            return Err(ChatError::NotFound);
        }

        let now = Utc::now();
        let mut marked = Vec::new();
        if let Some(messages) = self.messages.get_mut(&conversation_id) {
            for message in messages.iter_mut() {
                if &message.sender_id != user_id && !message.read_by_user(user_id) {
                    message.read_by.push(ReadReceipt {
                        user_id: user_id.clone(),
                        read_at: now,
                    });
                    marked.push(message.id);
                }
            }
        }
        Ok(marked)
    }

    pub(super) fn handle_unread_count(
        &self,
        tenant_id: &TenantId,
        user_id: &UserId,
    ) -> Result<u64, ChatError> {
        let mut count = 0u64;
        for conversation in self.conversations.values() {
            if !conversation.is_active
                || &conversation.tenant_id != tenant_id
                || !conversation.includes(user_id)
            {
                continue;
            }
            if let Some(messages) = self.messages.get(&conversation.id) {
                count += messages
                    .iter()
                    .filter(|m| &m.sender_id != user_id && !m.read_by_user(user_id))
                    .count() as u64;
            }
        }
        Ok(count)
    }

    pub(super) fn handle_search(
        &self,
        tenant_id: &TenantId,
        term: &str,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError> {
        let needle = term.to_lowercase();
        let mut hits: Vec<Message> = self
            .messages
            .values()
            .flatten()
            .filter(|m| &m.tenant_id == tenant_id && m.content.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.seq.cmp(&a.seq)));
        hits.truncate(limit);
        Ok(hits)
    }

    /// Messages are hard-deleted, the conversation stays (with an empty
    /// snapshot). The seq clock is kept so later appends keep increasing.
    pub(super) fn handle_clear(&mut self, conversation_id: ConversationId) -> Result<(), ChatError> {
        let conversation = self
            .conversations
            .get_mut(&conversation_id)
            .ok_or(ChatError::NotFound)?;
        self.messages.remove(&conversation_id);
        conversation.last_message = None;
        Ok(())
    }

    /// Rehydrates the user's presence into every conversation they sit in,
    /// so conversation reads need no cross-lookup.
    pub(super) fn handle_set_presence(
        &mut self,
        user_id: &UserId,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> Result<(), ChatError> {
        for conversation in self.conversations.values_mut() {
            if let Some(participant) = conversation.participant_mut(user_id) {
                participant.is_online = is_online;
                participant.last_seen = Some(last_seen);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn seed(user: &str) -> ParticipantSeed {
        ParticipantSeed {
            user_id: user.to_string(),
            display_name: format!("User {user}"),
            avatar: None,
            role: "member".to_string(),
        }
    }

    fn store() -> (ChatStore, mpsc::UnboundedReceiver<RouterMessage>) {
        let (router_sender, router_receiver) = mpsc::unbounded_channel();
        let (store, _) = ChatStore::new(router_sender);
        (store, router_receiver)
    }

    fn tenant() -> TenantId {
        "acme".to_string()
    }

    fn append(store: &mut ChatStore, conversation: ConversationId, from: &str, text: &str) -> Message {
        store
            .handle_append_message(
                &tenant(),
                conversation,
                seed(from),
                text.to_string(),
                MessageKind::Text,
                None,
            )
            .unwrap()
    }

    #[test]
    fn get_or_create_is_idempotent_and_symmetric() {
        let (mut store, _rx) = store();
        let first = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();
        let second = store
            .handle_get_or_create(tenant(), seed("b"), seed("a"))
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.conversations.len(), 1);
        assert!(first.is_active);
        assert!(first.last_message.is_none());
    }

    #[test]
    fn get_or_create_rejects_self_conversation() {
        let (mut store, _rx) = store();
        let result = store.handle_get_or_create(tenant(), seed("a"), seed("a"));
        assert!(matches!(result, Err(ChatError::InvalidInput(_))));
    }

    #[test]
    fn get_or_create_revives_a_deleted_conversation() {
        let (mut store, _rx) = store();
        let conversation = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();
        store.handle_set_active(conversation.id, false).unwrap();

        let revived = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();
        assert_eq!(revived.id, conversation.id);
        assert!(revived.is_active);
    }

    #[test]
    fn same_pair_in_different_tenants_gets_different_conversations() {
        let (mut store, _rx) = store();
        let one = store
            .handle_get_or_create("acme".to_string(), seed("a"), seed("b"))
            .unwrap();
        let two = store
            .handle_get_or_create("globex".to_string(), seed("a"), seed("b"))
            .unwrap();
        assert_ne!(one.id, two.id);
    }

    #[test]
    fn settings_patch_never_touches_the_sibling() {
        let (mut store, _rx) = store();
        let conversation = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();

        let updated = store
            .handle_update_participant_settings(
                conversation.id,
                &"a".to_string(),
                SettingsPatch {
                    blocked: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(updated.participant(&"a".to_string()).unwrap().blocked);
        let sibling = updated.participant(&"b".to_string()).unwrap();
        assert!(!sibling.blocked && !sibling.muted && !sibling.disappearing);
    }

    #[test]
    fn append_assigns_increasing_seq_and_seeds_read_by() {
        let (mut store, _rx) = store();
        let conversation = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();

        let first = append(&mut store, conversation.id, "a", "one");
        let second = append(&mut store, conversation.id, "b", "two");

        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(first.read_by.len(), 1);
        assert_eq!(first.read_by[0].user_id, "a");
    }

    #[test]
    fn append_fans_out_to_every_participant_user_room() {
        let (mut store, mut rx) = store();
        let conversation = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();
        append(&mut store, conversation.id, "a", "hi");

        let mut rooms = Vec::new();
        for _ in 0..2 {
            match rx.try_recv().unwrap() {
                RouterMessage::Emit {
                    room: RoomId::User(user),
                    event: ServerEvent::NewMessage { message },
                } => {
                    assert_eq!(message.content, "hi");
                    rooms.push(user);
                }
                other => panic!("unexpected router message: {other:?}"),
            }
        }
        rooms.sort();
        assert_eq!(rooms, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn append_fails_closed_on_unknown_tenant_or_outsider() {
        let (mut store, _rx) = store();
        let conversation = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();

        let outsider = store.handle_append_message(
            &tenant(),
            conversation.id,
            seed("mallory"),
            "hi".to_string(),
            MessageKind::Text,
            None,
        );
        assert!(matches!(outsider, Err(ChatError::NotFound)));

        let cross_tenant = store.handle_append_message(
            &"globex".to_string(),
            conversation.id,
            seed("a"),
            "hi".to_string(),
            MessageKind::Text,
            None,
        );
        assert!(matches!(cross_tenant, Err(ChatError::NotFound)));
    }

    #[test]
    fn mark_read_is_idempotent() {
        let (mut store, _rx) = store();
        let conversation = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();
        append(&mut store, conversation.id, "a", "one");
        append(&mut store, conversation.id, "a", "two");

        let first = store
            .handle_mark_read(conversation.id, &"b".to_string())
            .unwrap();
        assert_eq!(first.len(), 2);

        let second = store
            .handle_mark_read(conversation.id, &"b".to_string())
            .unwrap();
        assert!(second.is_empty());

        let messages = store
            .handle_list_messages(&tenant(), conversation.id, &"b".to_string(), 10, 0)
            .unwrap();
        for message in messages {
            assert_eq!(
                message
                    .read_by
                    .iter()
                    .filter(|r| r.user_id == "b")
                    .count(),
                1
            );
        }
    }

    #[test]
    fn unread_count_matches_and_resets_after_mark_read() {
        let (mut store, _rx) = store();
        let conversation = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();
        append(&mut store, conversation.id, "a", "one");
        append(&mut store, conversation.id, "a", "two");
        append(&mut store, conversation.id, "b", "reply");

        // b has two unread (a's messages); a has one (b's reply).
        assert_eq!(
            store.handle_unread_count(&tenant(), &"b".to_string()).unwrap(),
            2
        );
        assert_eq!(
            store.handle_unread_count(&tenant(), &"a".to_string()).unwrap(),
            1
        );

        store
            .handle_mark_read(conversation.id, &"b".to_string())
            .unwrap();
        assert_eq!(
            store.handle_unread_count(&tenant(), &"b".to_string()).unwrap(),
            0
        );
    }

    #[test]
    fn unread_count_skips_inactive_conversations() {
        let (mut store, _rx) = store();
        let conversation = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();
        append(&mut store, conversation.id, "a", "one");
        store.handle_set_active(conversation.id, false).unwrap();
        assert_eq!(
            store.handle_unread_count(&tenant(), &"b".to_string()).unwrap(),
            0
        );
    }

    #[test]
    fn clear_hard_deletes_messages_but_keeps_the_conversation() {
        let (mut store, _rx) = store();
        let conversation = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();
        for i in 0..10 {
            let message = append(&mut store, conversation.id, "a", &format!("m{i}"));
            store
                .handle_update_last_message(conversation.id, LastMessage::of(&message))
                .unwrap();
        }

        store.handle_clear(conversation.id).unwrap();

        let messages = store
            .handle_list_messages(&tenant(), conversation.id, &"a".to_string(), 50, 0)
            .unwrap();
        assert!(messages.is_empty());

        let listed = store
            .handle_list_conversations(&tenant(), &"a".to_string(), 10, 0)
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].last_message.is_none());

        // The logical clock survives the wipe.
        let next = append(&mut store, conversation.id, "a", "after");
        assert_eq!(next.seq, 11);
    }

    #[test]
    fn reset_last_message_drops_only_the_snapshot() {
        let (mut store, _rx) = store();
        let conversation = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();
        let message = append(&mut store, conversation.id, "a", "hi");
        store
            .handle_update_last_message(conversation.id, LastMessage::of(&message))
            .unwrap();

        store.handle_reset_last_message(conversation.id).unwrap();

        let listed = store
            .handle_list_conversations(&tenant(), &"a".to_string(), 10, 0)
            .unwrap();
        assert!(listed[0].last_message.is_none());
        // The log itself is untouched.
        let messages = store
            .handle_list_messages(&tenant(), conversation.id, &"a".to_string(), 10, 0)
            .unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn list_conversations_orders_by_recent_activity() {
        let (mut store, _rx) = store();
        let older = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();
        let newer = store
            .handle_get_or_create(tenant(), seed("a"), seed("c"))
            .unwrap();

        let message = append(&mut store, newer.id, "c", "bump");
        store
            .handle_update_last_message(newer.id, LastMessage::of(&message))
            .unwrap();

        let listed = store
            .handle_list_conversations(&tenant(), &"a".to_string(), 10, 0)
            .unwrap();
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(listed[1].id, older.id);

        let page = store
            .handle_list_conversations(&tenant(), &"a".to_string(), 1, 1)
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, older.id);
    }

    #[test]
    fn list_messages_pages_newest_but_returns_oldest_first() {
        let (mut store, _rx) = store();
        let conversation = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();
        for i in 0..5 {
            append(&mut store, conversation.id, "a", &format!("m{i}"));
        }

        let page = store
            .handle_list_messages(&tenant(), conversation.id, &"a".to_string(), 2, 0)
            .unwrap();
        let contents: Vec<&str> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);

        let earlier = store
            .handle_list_messages(&tenant(), conversation.id, &"a".to_string(), 2, 2)
            .unwrap();
        let contents: Vec<&str> = earlier.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m1", "m2"]);
    }

    #[test]
    fn search_is_case_insensitive_and_tenant_scoped() {
        let (mut store, _rx) = store();
        let ours = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();
        append(&mut store, ours.id, "a", "Quarterly REPORT draft");
        append(&mut store, ours.id, "b", "lunch?");

        let theirs = store
            .handle_get_or_create("globex".to_string(), seed("x"), seed("y"))
            .unwrap();
        store
            .handle_append_message(
                &"globex".to_string(),
                theirs.id,
                seed("x"),
                "report for globex".to_string(),
                MessageKind::Text,
                None,
            )
            .unwrap();

        let hits = store.handle_search(&tenant(), "report", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "Quarterly REPORT draft");
    }

    #[test]
    fn find_for_participant_fails_closed_identically() {
        let (mut store, _rx) = store();
        let conversation = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();

        let outsider =
            store.handle_find_for_participant(&tenant(), conversation.id, &"mallory".to_string());
        let cross_tenant = store.handle_find_for_participant(
            &"globex".to_string(),
            conversation.id,
            &"a".to_string(),
        );
        let missing =
            store.handle_find_for_participant(&tenant(), Uuid::new_v4(), &"a".to_string());

        for result in [outsider, cross_tenant, missing] {
            assert!(matches!(result, Err(ChatError::NotFound)));
        }
    }

    #[test]
    fn presence_patch_reaches_every_conversation_of_the_user() {
        let (mut store, _rx) = store();
        let with_b = store
            .handle_get_or_create(tenant(), seed("a"), seed("b"))
            .unwrap();
        let with_c = store
            .handle_get_or_create(tenant(), seed("a"), seed("c"))
            .unwrap();

        let now = Utc::now();
        store
            .handle_set_presence(&"a".to_string(), true, now)
            .unwrap();

        for id in [with_b.id, with_c.id] {
            let conversation = store
                .handle_find_for_participant(&tenant(), id, &"a".to_string())
                .unwrap();
            let participant = conversation.participant(&"a".to_string()).unwrap();
            assert!(participant.is_online);
            assert_eq!(participant.last_seen, Some(now));
        }

        store
            .handle_set_presence(&"a".to_string(), false, now)
            .unwrap();
        let conversation = store
            .handle_find_for_participant(&tenant(), with_b.id, &"a".to_string())
            .unwrap();
        assert!(!conversation.participant(&"a".to_string()).unwrap().is_online);
    }
}
