//! The ready queue.
//!
//! Runnable tokens are stepped in FIFO order. A token is queued at most
//! once; scheduling an already queued token is a no-op. Dead tokens may stay
//! queued after a region cascade and are skipped by the engine when popped.

use crate::types::TokenId;
use std::collections::{HashSet, VecDeque};

/// FIFO of runnable tokens.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    queue: VecDeque<TokenId>,
    scheduled: HashSet<TokenId>,
}

impl ReadyQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queues a token. Returns false if it was already queued.
    pub fn schedule(&mut self, token: TokenId) -> bool {
        if self.scheduled.insert(token) {
            self.queue.push_back(token);
            true
        } else {
            false
        }
    }

    /// Pops the next token to step.
    pub fn pop(&mut self) -> Option<TokenId> {
        let token = self.queue.pop_front()?;
        self.scheduled.remove(&token);
        Some(token)
    }

    /// Returns true if `token` is queued.
    #[must_use]
    pub fn contains(&self, token: TokenId) -> bool {
        self.scheduled.contains(&token)
    }

    /// Drops every queued token.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.scheduled.clear();
    }
}
