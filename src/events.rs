//! Event bus: re-emits dispatcher lifecycle events (§3) to every subscriber. Built on
//! `tokio::sync::broadcast` rather than a callback list so slow subscribers can't block
//! the dispatcher; a subscriber that falls behind drops old events instead of stalling it.

use crate::ids::TaskId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventKind {
    Classified,
    Queued,
    Started,
    Completed,
    Failed,
    Retry,
    DeadLetter,
    Cancelled,
    Undo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub task_id: Option<TaskId>,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(kind: EventKind, task_id: Option<TaskId>, payload: serde_json::Value) -> Self {
        Self { kind, task_id, payload }
    }
}

/// Handle returned by `subscribe`; dropping it (or calling `unsubscribe`) stops delivery.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// No-op when there are no subscribers (`send` errors only when the channel is empty
    /// of receivers, which isn't a failure here).
    pub fn emit(&self, event: Event) {
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
    async fn subscriber_receives_emitted_events() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.emit(Event::new(EventKind::Started, None, serde_json::json!({})));

        let event = sub.recv().await.unwrap();
        assert!(matches!(event.kind, EventKind::Started));
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_a_copy() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.emit(Event::new(EventKind::Completed, None, serde_json::json!({})));

        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }
}
