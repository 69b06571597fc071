use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::model::{TenantId, UserId};

/// Verified identity attached to a connection by the external provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub role: String,
}

/// Display fields denormalized into conversations and messages at write
/// time. Historical snapshots are never re-resolved.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub display_name: String,
    pub avatar: Option<String>,
}

/// Resolves connection credentials to a verified identity, synchronously at
/// connect time.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Result<Identity, ChatError>;
}

/// Resolves a user id to display fields for denormalization.
pub trait ProfileResolver: Send + Sync {
    fn profile(&self, user_id: &UserId) -> Result<UserProfile, ChatError>;
}

/// Seed record accepted from configuration (`HUDDLE_SEED_USERS`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedUser {
    pub token: String,
    pub user_id: UserId,
    pub tenant_id: TenantId,
    #[serde(default = "default_role")]
    pub role: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

fn default_role() -> String {
    "member".to_string()
}

/// In-process implementation of both collaborator traits. Production swaps
/// a real provider in behind the same traits; tests and the dev binary
/// register users here directly.
#[derive(Default)]
pub struct Directory {
    tokens: RwLock<HashMap<String, Identity>>,
    profiles: RwLock<HashMap<UserId, UserProfile>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, seed: SeedUser) {
        let identity = Identity {
            user_id: seed.user_id.clone(),
            tenant_id: seed.tenant_id,
            role: seed.role,
        };
        let profile = UserProfile {
            display_name: seed.display_name,
            avatar: seed.avatar,
        };
        self.tokens
            .write()
            .expect("directory token lock poisoned")
            .insert(seed.token, identity);
        self.profiles
            .write()
            .expect("directory profile lock poisoned")
            .insert(seed.user_id, profile);
    }
}

impl IdentityResolver for Directory {
    fn resolve(&self, token: &str) -> Result<Identity, ChatError> {
        self.tokens
            .read()
            .expect("directory token lock poisoned")
            .get(token)
            .cloned()
            .ok_or(ChatError::Unauthenticated)
    }
}

impl ProfileResolver for Directory {
    fn profile(&self, user_id: &UserId) -> Result<UserProfile, ChatError> {
        self.profiles
            .read()
            .expect("directory profile lock poisoned")
            .get(user_id)
            .cloned()
            .ok_or_else(|| ChatError::InvalidInput(format!("unknown user {user_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(token: &str, user: &str) -> SeedUser {
        SeedUser {
            token: token.into(),
            user_id: user.into(),
            tenant_id: "acme".into(),
            role: "member".into(),
            display_name: format!("User {user}"),
            avatar: None,
        }
    }

    #[test]
    fn resolves_registered_token() {
        let dir = Directory::new();
        dir.register(seed("tok-1", "u1"));

        let identity = dir.resolve("tok-1").unwrap();
        assert_eq!(identity.user_id, "u1");
        assert_eq!(identity.tenant_id, "acme");
    }

    #[test]
    fn unknown_token_is_unauthenticated() {
        let dir = Directory::new();
        assert!(matches!(dir.resolve("nope"), Err(ChatError::Unauthenticated)));
    }

    #[test]
    fn profile_lookup_round_trips() {
        let dir = Directory::new();
        dir.register(seed("tok-1", "u1"));
        let profile = dir.profile(&"u1".to_string()).unwrap();
        assert_eq!(profile.display_name, "User u1");
    }
}
