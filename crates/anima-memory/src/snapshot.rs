//! Full-state export/import envelopes and the bounded event log.
//!
//! A store exports itself as a [`StoreSnapshot`]:
//!
//! ```text
//! { entries: [[id, record], ...], config, recent_events, last_maintenance_tick }
//! ```
//!
//! Secondary indices are never part of a snapshot; importing rebuilds them
//! from `entries`.

use std::collections::VecDeque;

use anima_types::{MemoryEvent, MemoryEventKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of events a store remembers about itself.
pub const EVENT_LOG_CAPACITY: usize = 100;

/// Serialisable full state of one store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot<R, C> {
    /// Primary entries in insertion order.
    pub entries: Vec<(Uuid, R)>,
    pub config: C,
    #[serde(default)]
    pub recent_events: Vec<MemoryEvent>,
    /// Tick of the last maintenance run, restored into the gate.
    #[serde(default)]
    pub last_maintenance_tick: Option<u64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// EventLog
// ─────────────────────────────────────────────────────────────────────────────

/// Ring buffer of the most recent [`MemoryEvent`]s, oldest evicted first.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<MemoryEvent>,
    capacity: usize,
}

impl EventLog {
    /// An empty log keeping at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Rebuild a log from persisted events, keeping only the newest
    /// `capacity` of them.
    pub fn from_events(events: Vec<MemoryEvent>, capacity: usize) -> Self {
        let mut log = Self::new(capacity);
        for event in events {
            log.push_event(event);
        }
        log
    }

    /// Append an event, evicting the oldest when full.
    pub fn record(&mut self, at: DateTime<Utc>, kind: MemoryEventKind, subject: Uuid, label: &str) {
        self.push_event(MemoryEvent {
            at,
            kind,
            subject,
            label: label.to_string(),
        });
    }

    fn push_event(&mut self, event: MemoryEvent) {
        if self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Up to `limit` events, newest first.
    pub fn recent(&self, limit: usize) -> Vec<MemoryEvent> {
        self.events.iter().rev().take(limit).cloned().collect()
    }

    /// All retained events, oldest first.
    pub fn to_vec(&self) -> Vec<MemoryEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(EVENT_LOG_CAPACITY)
    }
}
