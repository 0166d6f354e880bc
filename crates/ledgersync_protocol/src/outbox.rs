//! Outgoing envelope queue.

use std::collections::VecDeque;

use crate::messages::MessageEnvelope;

/// Envelopes waiting to be uploaded.
///
/// # Invariants
///
/// - Envelopes are kept in the order they were queued
/// - Envelopes leave the queue only when acknowledged, so a failed upload is
///   resent by the next request
#[derive(Debug, Default)]
pub struct Outbox {
    entries: VecDeque<MessageEnvelope>,
}

impl Outbox {
    /// Creates an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an envelope.
    pub fn push(&mut self, envelope: MessageEnvelope) {
        self.entries.push_back(envelope);
    }

    /// Returns pending envelopes in queue order.
    pub fn pending(&self) -> impl Iterator<Item = &MessageEnvelope> {
        self.entries.iter()
    }

    /// Drops the first `count` envelopes after the server accepted them.
    pub fn acknowledge(&mut self, count: usize) {
        let count = count.min(self.entries.len());
        self.entries.drain(..count);
    }

    /// Number of pending envelopes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::LogicalTimestamp;
    use crate::messages::ChangeMessage;

    fn envelope(millis: i64) -> MessageEnvelope {
        let ts = LogicalTimestamp::new(millis, 0, "node").unwrap();
        MessageEnvelope::plain(ts, &ChangeMessage::new("notes", "n1", "note", "x")).unwrap()
    }

    #[test]
    fn keeps_queue_order() {
        let mut outbox = Outbox::new();
        outbox.push(envelope(3));
        outbox.push(envelope(1));
        let order: Vec<i64> = outbox.pending().map(|e| e.timestamp.millis()).collect();
        assert_eq!(order, vec![3, 1]);
    }

    #[test]
    fn acknowledge_removes_prefix() {
        let mut outbox = Outbox::new();
        for i in 1..=3 {
            outbox.push(envelope(i));
        }
        outbox.acknowledge(2);
        let left: Vec<i64> = outbox.pending().map(|e| e.timestamp.millis()).collect();
        assert_eq!(left, vec![3]);
    }

    #[test]
    fn acknowledge_more_than_pending() {
        let mut outbox = Outbox::new();
        outbox.push(envelope(1));
        outbox.acknowledge(10);
        assert!(outbox.is_empty());
    }
}
