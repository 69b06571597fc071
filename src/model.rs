use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque ids minted by the external identity provider.
pub type UserId = String;
pub type TenantId = String;

pub type ConversationId = Uuid;
pub type MessageId = Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    File,
    Image,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub url: String,
    pub name: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: UserId,
    pub emoji: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub user_id: UserId,
    pub read_at: DateTime<Utc>,
}

/// One member of a conversation, with the per-participant settings and the
/// presence fields the tracker rehydrates on status changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar: Option<String>,
    pub role: String,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub muted: bool,
    pub blocked: bool,
    pub disappearing: bool,
}

impl Participant {
    pub fn new(user_id: UserId, display_name: String, avatar: Option<String>, role: String) -> Self {
        Self {
            user_id,
            display_name,
            avatar,
            role,
            is_online: false,
            last_seen: None,
            muted: false,
            blocked: false,
            disappearing: false,
        }
    }
}

/// Denormalized snapshot of the newest message, kept for list rendering.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub content: String,
    pub sender_id: UserId,
    pub sender_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl LastMessage {
    pub fn of(message: &Message) -> Self {
        Self {
            content: message.content.clone(),
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            timestamp: message.created_at,
            kind: message.kind,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub tenant_id: TenantId,
    pub participants: Vec<Participant>,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub group_description: Option<String>,
    pub group_avatar: Option<String>,
    pub last_message: Option<LastMessage>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn direct(tenant_id: TenantId, a: Participant, b: Participant) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            participants: vec![a, b],
            is_group: false,
            group_name: None,
            group_description: None,
            group_avatar: None,
            last_message: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn participant(&self, user_id: &UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: &UserId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| &p.user_id == user_id)
    }

    pub fn includes(&self, user_id: &UserId) -> bool {
        self.participant(user_id).is_some()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub tenant_id: TenantId,
    /// Strictly increasing within one conversation; assigned by the store.
    pub seq: u64,
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_avatar: Option<String>,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub file: Option<FileMeta>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub reply_to: Option<MessageId>,
    pub reactions: Vec<Reaction>,
    pub read_by: Vec<ReadReceipt>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn read_by_user(&self, user_id: &UserId) -> bool {
        self.read_by.iter().any(|r| &r.user_id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_message_snapshot_uses_wire_type_field() {
        let msg = Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            tenant_id: "acme".into(),
            seq: 1,
            sender_id: "u1".into(),
            sender_name: "Uma".into(),
            sender_avatar: None,
            content: "hi".into(),
            kind: MessageKind::Text,
            file: None,
            is_edited: false,
            is_deleted: false,
            reply_to: None,
            reactions: Vec::new(),
            read_by: Vec::new(),
            created_at: Utc::now(),
        };

        let snapshot = LastMessage::of(&msg);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["senderId"], "u1");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn participant_defaults_are_neutral() {
        let p = Participant::new("u1".into(), "Uma".into(), None, "member".into());
        assert!(!p.muted && !p.blocked && !p.disappearing);
        assert!(!p.is_online);
        assert!(p.last_seen.is_none());
    }
}
