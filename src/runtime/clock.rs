//! Logical (virtual) clock.
//!
//! Calls to the `Ltimer` site wait here for a number of logical ticks. The
//! clock only moves when the engine is otherwise idle: both of its queues are
//! empty and no token can run. It then jumps straight to the earliest pending
//! time and releases every call due at that time, in registration order.

use crate::types::TokenId;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Default)]
pub(crate) struct LogicalClock {
    now: u64,
    next_seq: u64,
    pending: BinaryHeap<Reverse<(u64, u64, TokenId)>>,
}

impl LogicalClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) const fn now(&self) -> u64 {
        self.now
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Registers `token` to be released at `now + delay`. Returns the due time.
    pub(crate) fn schedule(&mut self, token: TokenId, delay: u64) -> u64 {
        let due = self.now.saturating_add(delay);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(Reverse((due, seq, token)));
        due
    }

    /// Jumps to the earliest pending time and drains everything due then.
    pub(crate) fn advance(&mut self) -> Option<(u64, Vec<TokenId>)> {
        let Reverse((due, _, _)) = *self.pending.peek()?;
        let mut released = Vec::new();
        while let Some(Reverse((time, _, token))) = self.pending.peek().copied() {
            if time != due {
                break;
            }
            self.pending.pop();
            released.push(token);
        }
        self.now = due;
        Some((due, released))
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}
