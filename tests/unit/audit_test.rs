//! Tests for audit sink

use grid_scaler::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);

    let event = build_audit_event("run-1", AuditAction::Scale, 42, Some("launched 1".to_string()));
    sink.record(event.clone());

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id, event.event_id);
    assert_eq!(events[0].subject, "run-1");
    assert_eq!(events[0].action, AuditAction::Scale);
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event("a", AuditAction::Admit, 1, None));
    sink.record(build_audit_event("b", AuditAction::Admit, 2, None));
    sink.record(build_audit_event("c", AuditAction::Release, 3, None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].subject, "b");
    assert_eq!(events[1].subject, "c");
    assert_eq!(sink.events_for(AuditAction::Release).len(), 1);
}

#[test]
fn test_audit_event_serializes_action_snake_case() {
    let event = build_audit_event("hub", AuditAction::HubTerminate, 7, None);
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["action"], "hub_terminate");
    assert_eq!(json["created_at_ms"], 7);
}
