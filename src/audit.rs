//! Audit collaborator interface
//!
//! Money movement leaves a trail. Recording is fire-and-forget from the
//! core's perspective, but implementations must not silently drop
//! entries: failures get logged at error level and never roll back the
//! settlement that produced them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::protocol::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    EscrowDebit,
    Payout,
    PlatformFee,
    Refund,
    MatchCreated,
    MatchSettled,
    ForceRefund,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: Option<UserId>,
    pub action: AuditAction,
    pub resource: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(actor: Option<UserId>, action: AuditAction, resource: impl Into<String>) -> Self {
        Self {
            actor,
            action,
            resource: resource.into(),
            details: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

/// Audit log that keeps entries in memory and mirrors them to the
/// tracing output. Used by the standalone server and tests.
#[derive(Debug, Default)]
pub struct InMemoryAudit {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    pub async fn count_of(&self, action: AuditAction) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.action == action)
            .count()
    }
}

#[async_trait]
impl AuditLog for InMemoryAudit {
    async fn record(&self, entry: AuditEntry) {
        info!(
            action = ?entry.action,
            resource = %entry.resource,
            actor = ?entry.actor,
            "audit"
        );
        self.entries.write().await.push(entry);
    }
}
