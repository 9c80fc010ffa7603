//! Ring buffer for trace events.
//!
//! The engine keeps its most recent events in a fixed-size ring so a long
//! run can be traced without unbounded memory growth. Sequence numbers keep
//! counting across overwrites, so a gap at the front of [`TraceBuffer::iter`]
//! shows how much history was lost.

use super::event::{TraceEvent, TraceEventKind};
use std::collections::VecDeque;

/// Bounded, oldest-first record of engine events.
#[derive(Debug)]
pub struct TraceBuffer {
    events: VecDeque<TraceEvent>,
    capacity: usize,
    next_seq: u64,
    overwritten: u64,
}

impl TraceBuffer {
    /// Creates a buffer holding at most `capacity` events (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 0,
            overwritten: 0,
        }
    }

    /// Maximum number of retained events.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events pushed out of the ring by newer ones.
    #[must_use]
    pub const fn overwritten(&self) -> u64 {
        self.overwritten
    }

    /// Allocates the next sequence number.
    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Appends an event, evicting the oldest one when full.
    pub fn push(&mut self, event: TraceEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.overwritten += 1;
        }
        self.events.push_back(event);
    }

    /// Retained events, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TraceEvent> {
        self.events.iter()
    }

    /// Retained events of one kind, oldest first.
    pub fn of_kind(&self, kind: TraceEventKind) -> impl Iterator<Item = &TraceEvent> {
        self.events.iter().filter(move |event| event.kind == kind)
    }

    /// The most recent event.
    #[must_use]
    pub fn last(&self) -> Option<&TraceEvent> {
        self.events.back()
    }

    /// Drops every retained event. Sequence numbering continues.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl Default for TraceBuffer {
    fn default() -> Self {
        Self::new(1024)
    }
}
