use crate::{
    health::LinkHealth,
    protocol::{DisplayFrame, KeyReply},
    serial::SerialFailureKind,
};
use crossbeam::channel::{self, Receiver, Sender};
use serde::Serialize;
use std::sync::Mutex;

/// Result of one key-press exchange as seen by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyOutcome {
    pub index: u8,
    pub duration_ms: u32,
    pub reply: KeyReply,
    /// Set when the exchange died on a transport fault instead of a reply.
    pub error: Option<SerialFailureKind>,
}

/// Updates pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Frame(DisplayFrame),
    Health(LinkHealth),
    Key(KeyOutcome),
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Frame(_) => "frame",
            SessionEvent::Health(_) => "health",
            SessionEvent::Key(_) => "key",
        }
    }
}

/// Fan-out of session events. Subscribers whose receiver was dropped are
/// pruned on the next publish.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
}

impl EventBus {
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    pub fn publish(&self, event: SessionEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::LinkHealth;

    #[test]
    fn every_subscriber_gets_a_copy() {
        let bus = EventBus::default();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(SessionEvent::Health(LinkHealth::default()));
        assert_eq!(a.try_recv().unwrap().kind(), "health");
        assert_eq!(b.try_recv().unwrap().kind(), "health");
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::default();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        bus.publish(SessionEvent::Health(LinkHealth::default()));
        assert_eq!(bus.subscriber_count(), 1);
        assert!(keep.try_recv().is_ok());
    }

    #[test]
    fn serializes_with_event_tag() {
        let event = SessionEvent::Key(KeyOutcome {
            index: 2,
            duration_ms: 1000,
            reply: KeyReply::Ack,
            error: None,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"key\""));
        assert!(json.contains("\"reply\":{\"kind\":\"ack\"}"));
    }
}
