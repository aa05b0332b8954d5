//! Identity collaborator interface
//!
//! The core does not own user records; it only looks players up when
//! the recovery sweeper validates a stuck match before refunding it.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::protocol::UserId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn get_user(&self, id: UserId) -> Option<UserProfile>;
}

/// In-memory user directory for the standalone server and tests
#[derive(Debug, Default)]
pub struct InMemoryIdentity {
    users: DashMap<UserId, UserProfile>,
}

impl InMemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: UserId, display_name: impl Into<String>) {
        self.users.insert(
            id,
            UserProfile {
                id,
                display_name: display_name.into(),
            },
        );
    }

    pub fn remove(&self, id: UserId) {
        self.users.remove(&id);
    }
}

#[async_trait]
impl IdentityService for InMemoryIdentity {
    async fn get_user(&self, id: UserId) -> Option<UserProfile> {
        self.users.get(&id).map(|u| u.clone())
    }
}
