//! Audit sink that writes events to the `audit` tracing target

use async_trait::async_trait;
use tracing::info;

use crate::domain::DomainError;
use crate::domain::audit::{AuditEvent, AuditSink};

/// Emits audit events as structured log records
///
/// Route the `audit` target to a dedicated writer with an `EnvFilter`
/// directive such as `audit=info` to keep the trail separate.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), DomainError> {
        info!(
            target: "audit",
            action = %event.action,
            actor = event.actor_id.as_deref().unwrap_or("-"),
            target_id = event.target_id.map(|id| id.value()),
            timestamp = %event.timestamp.to_rfc3339(),
            "Audit event"
        );

        Ok(())
    }
}
