//! FIFO buffer for events published while the connection is down.
//!
//! Owned exclusively by the session task, so no locking. A sender's own
//! events must reach the broker in the order they were issued even when
//! some of them were typed offline; the queue preserves that order and is
//! flushed in full on every transition to Connected before new publishes
//! are accepted.

use std::collections::VecDeque;

use crate::event::ChatEvent;

#[derive(Debug, Default)]
pub struct OutboundQueue {
    events: VecDeque<ChatEvent>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, event: ChatEvent) {
        self.events.push_back(event);
    }

    /// Take everything, oldest first. Destructive.
    pub fn drain(&mut self) -> Vec<ChatEvent> {
        self.events.drain(..).collect()
    }

    /// Pop the oldest event. Used by the flush path so a failed write can
    /// put the event back with `requeue_front` without losing order.
    pub fn pop(&mut self) -> Option<ChatEvent> {
        self.events.pop_front()
    }

    /// Put an event back at the head after a failed write.
    pub fn requeue_front(&mut self, event: ChatEvent) {
        self.events.push_front(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str) -> ChatEvent {
        ChatEvent::Message {
            sender: "Ana K".to_string(),
            content: content.to_string(),
            tenant_id: "t42".to_string(),
            member_id: 7,
            sent_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn drain_is_fifo_and_destructive() {
        let mut queue = OutboundQueue::new();
        queue.enqueue(msg("first"));
        queue.enqueue(msg("second"));
        queue.enqueue(msg("third"));
        assert_eq!(queue.len(), 3);

        let drained: Vec<_> = queue
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                ChatEvent::Message { content, .. } => Some(content),
                _ => None,
            })
            .collect();
        assert_eq!(drained, ["first", "second", "third"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn requeue_front_restores_order() {
        let mut queue = OutboundQueue::new();
        queue.enqueue(msg("a"));
        queue.enqueue(msg("b"));

        let head = queue.pop().unwrap();
        queue.requeue_front(head);

        let order: Vec<_> = queue
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                ChatEvent::Message { content, .. } => Some(content),
                _ => None,
            })
            .collect();
        assert_eq!(order, ["a", "b"]);
    }
}
