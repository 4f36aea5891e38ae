// Observation events - broadcast of task lifecycle changes

use super::types::JsonObject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Started,
    Progress,
    Completed,
    Failed,
    Cancelled,
}

/// A change in a task's lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationEvent {
    pub timestamp: DateTime<Utc>,
    pub task_id: Uuid,
    pub kind: EventKind,
    pub content: String,
    #[serde(default)]
    pub metadata: JsonObject,
}

impl ObservationEvent {
    pub fn new(task_id: Uuid, kind: EventKind, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            task_id,
            kind,
            content: content.into(),
            metadata: JsonObject::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Fan-out of observation events to any number of subscribers.
///
/// Publishing never blocks; slow subscribers miss the oldest events.
pub struct EventBus {
    sender: broadcast::Sender<ObservationEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ObservationEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ObservationEvent) {
        tracing::debug!("Task {} {:?}: {}", event.task_id, event.kind, event.content);
        // An error only means nobody is listening
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let task_id = Uuid::new_v4();
        bus.publish(ObservationEvent::new(task_id, EventKind::Created, "created").with_metadata("type", "query"));

        let event = first.recv().await.unwrap();
        assert_eq!(event.task_id, task_id);
        assert_eq!(event.metadata["type"], "query");
        assert_eq!(second.recv().await.unwrap().kind, EventKind::Created);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(ObservationEvent::new(Uuid::new_v4(), EventKind::Failed, "nobody listening"));
    }
}
