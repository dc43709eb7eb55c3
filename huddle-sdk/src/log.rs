//! Append-only, ordered view of a session's events.
//!
//! Entries are kept sorted by `(sent_at, arrival_seq)`. Wall-clock
//! timestamps from different clients can disagree, so the locally-assigned
//! arrival sequence breaks ties and keeps the view stable. The protocol
//! carries no message IDs: a reconnect's at-least-once redelivery can put
//! the same message in the log twice, and that duplicate is kept visible
//! rather than guessed away.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::event::ChatEvent;

/// One logged event plus its ordering key.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub event: ChatEvent,
    /// The event's own timestamp for messages; local arrival time for
    /// presence and unknown events, which carry none.
    pub sent_at: DateTime<Utc>,
    /// Session-monotonic arrival counter; tie-breaker for equal `sent_at`.
    pub arrival_seq: u64,
}

/// Cloneable handle to the log. Readers see complete snapshots; an append
/// is never observed half-done.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<RwLock<Vec<LogEntry>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event at its ordered position. Entries are never mutated
    /// or removed afterwards.
    pub fn append(&self, event: ChatEvent, arrival_seq: u64) -> LogEntry {
        let sent_at = event.sent_at().unwrap_or_else(Utc::now);
        let entry = LogEntry {
            event,
            sent_at,
            arrival_seq,
        };
        let mut entries = self.entries.write();
        let at = entries.partition_point(|e| (e.sent_at, e.arrival_seq) <= (sent_at, arrival_seq));
        entries.insert(at, entry.clone());
        entry
    }

    /// Snapshot of the whole log, ordered by `(sent_at, arrival_seq)`.
    pub fn all(&self) -> Vec<LogEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
