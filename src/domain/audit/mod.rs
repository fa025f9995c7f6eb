//! Audit domain - events describing audited account operations

mod event;
mod sink;

pub use event::{AuditAction, AuditEvent};
pub use sink::AuditSink;

#[cfg(test)]
pub use sink::MockAuditSink;
#[cfg(test)]
pub use sink::mock::RecordingAuditSink;
