use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

/// One structured pipeline event. Every orchestrator stage emits these.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub level: AuditLevel,
    pub category: &'static str,
    pub action: String,
    pub message: String,
    pub actor: String,
    pub resource_type: &'static str,
    pub resource_id: Option<Uuid>,
    pub metadata: Value,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(level: AuditLevel, action: &str, message: String, actor: &str) -> Self {
        Self {
            level,
            category: "backup",
            action: action.to_owned(),
            message,
            actor: actor.to_owned(),
            resource_type: "backup_record",
            resource_id: None,
            metadata: Value::Null,
            occurred_at: Utc::now(),
        }
    }

    pub fn resource(mut self, id: Uuid) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Fire-and-forget event sink. Implementations must never fail or block the
/// pipeline; there is deliberately no Result in this signature.
pub trait AuditLog: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Production sink: forwards events as structured tracing records.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, event: AuditEvent) {
        let resource_id = event
            .resource_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        match event.level {
            AuditLevel::Info => info!(
                action = %event.action,
                actor = %event.actor,
                resource_id = %resource_id,
                metadata = %event.metadata,
                "{}",
                event.message
            ),
            AuditLevel::Warning => warn!(
                action = %event.action,
                actor = %event.actor,
                resource_id = %resource_id,
                metadata = %event.metadata,
                "{}",
                event.message
            ),
            AuditLevel::Error => error!(
                action = %event.action,
                actor = %event.actor,
                resource_id = %resource_id,
                metadata = %event.metadata,
                "{}",
                event.message
            ),
        }
    }
}

/// Test sink capturing every event in order.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_with_action(&self, action: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.action == action)
            .collect()
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_log_captures_in_order() {
        let log = MemoryAuditLog::new();
        let id = Uuid::new_v4();
        log.record(AuditEvent::new(AuditLevel::Info, "backup.started", "go".to_owned(), "a").resource(id));
        log.record(
            AuditEvent::new(AuditLevel::Warning, "backup.collection_skipped", "bad".to_owned(), "a")
                .metadata(json!({"collection": "sessions"})),
        );

        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "backup.started");
        assert_eq!(events[0].resource_id, Some(id));
        assert_eq!(events[1].level, AuditLevel::Warning);
        assert_eq!(events[1].metadata["collection"], "sessions");

        assert_eq!(log.events_with_action("backup.started").len(), 1);
    }
}
