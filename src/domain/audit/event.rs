//! Audit events emitted by the account service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

/// Audited account operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    /// Account enabled or disabled
    #[serde(rename = "enable/disable")]
    ChangeValidity,
    /// Paginated account listing
    #[serde(rename = "user page query")]
    PageQuery,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChangeValidity => "enable/disable",
            Self::PageQuery => "user page query",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event handed to the audit sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<UserId>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            actor_id: None,
            target_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor_id = Some(actor.into());
        self
    }

    pub fn with_target(mut self, target: UserId) -> Self {
        self.target_id = Some(target);
        self
    }
}
