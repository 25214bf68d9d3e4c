//! Audit sinks

use tokio::sync::mpsc;
use tracing::info;

use crate::domain::knowledge::{AuditSink, KnowledgeEvent};

/// Writes each event as a structured log line
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: KnowledgeEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        info!(
            target: "kpgraph::audit",
            event_type = event.event_type_name(),
            caller = %event.caller(),
            knowledge_point_id = ?event.knowledge_point_id(),
            payload = %payload,
            "Audit event"
        );
    }
}

/// Forwards events to an unbounded channel; events are dropped once the receiver is gone
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::UnboundedSender<KnowledgeEvent>,
}

impl ChannelAuditSink {
    /// Create a sink and the receiving half of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<KnowledgeEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, event: KnowledgeEvent) {
        let _ = self.sender.send(event);
    }
}
