//! Audit trail of admission and lifecycle decisions.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Decision recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Reservation admitted on existing capacity.
    Admit,
    /// Reservation admitted with a scale-out.
    Scale,
    /// Run request rejected.
    Reject,
    /// Reservation released by the client.
    Release,
    /// Stale reservation reaped.
    Reap,
    /// Node moved to `Expired`.
    Expire,
    /// Expired node returned to `Running` for another billing increment.
    Extend,
    /// Node terminated.
    Terminate,
    /// The hub requested its own termination.
    HubTerminate,
}

/// Audit event structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Reservation or node the decision concerns.
    pub subject: String,
    /// Decision taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: AuditEvent);
}

/// Audit sink shared between the controller and the lifecycle manager.
pub type SharedAuditSink = Arc<dyn AuditSink>;

/// Bounded in-memory audit sink. Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink keeping at most `max_events`.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Events with the given action, oldest first.
    pub fn events_for(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Helper to build an audit event with a fresh id.
pub fn build_audit_event(
    subject: impl Into<String>,
    action: AuditAction,
    created_at_ms: u128,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        subject: subject.into(),
        action,
        created_at_ms,
        detail,
    }
}

/// Record into an optional sink.
pub(crate) fn record(
    sink: Option<&SharedAuditSink>,
    subject: &str,
    action: AuditAction,
    now_ms: u128,
    detail: Option<String>,
) {
    if let Some(sink) = sink {
        sink.record(build_audit_event(subject, action, now_ms, detail));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_buffer_drops_oldest() {
        let sink = InMemoryAuditSink::new(2);
        for subject in ["a", "b", "c"] {
            sink.record(build_audit_event(subject, AuditAction::Admit, 0, None));
        }
        let subjects: Vec<_> = sink.events().into_iter().map(|e| e.subject).collect();
        assert_eq!(subjects, vec!["b", "c"]);
    }

    #[test]
    fn test_events_for_filters_by_action() {
        let sink = InMemoryAuditSink::new(10);
        let shared: SharedAuditSink = Arc::new(sink.clone());
        record(Some(&shared), "run", AuditAction::Admit, 1, None);
        record(Some(&shared), "i-1", AuditAction::Expire, 2, Some("headroom 6".into()));
        record(None, "ignored", AuditAction::Reap, 3, None);

        assert_eq!(sink.events().len(), 2);
        let expired = sink.events_for(AuditAction::Expire);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].subject, "i-1");
        assert_ne!(expired[0].event_id, sink.events()[0].event_id);
    }
}
