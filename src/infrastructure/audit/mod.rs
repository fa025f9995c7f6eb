//! Audit infrastructure - Audit sink implementations

mod tracing_sink;

pub use tracing_sink::TracingAuditSink;
