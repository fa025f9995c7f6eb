//! Audit sink trait

use std::fmt::Debug;

use async_trait::async_trait;

use super::event::AuditEvent;
use crate::domain::DomainError;

/// Receiver for audit events; storage of the audit trail lives behind it
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync + Debug {
    async fn record(&self, event: &AuditEvent) -> Result<(), DomainError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Sink that keeps every event in memory
    #[derive(Debug, Default)]
    pub struct RecordingAuditSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    impl RecordingAuditSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<AuditEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AuditSink for RecordingAuditSink {
        async fn record(&self, event: &AuditEvent) -> Result<(), DomainError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
}
