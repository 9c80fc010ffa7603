//! Future cells: single-assignment slots tokens can block on.
//!
//! A cell starts unbound. The first of [`FutureCell::bind`] and
//! [`FutureCell::close`] wins and the cell never changes state again:
//!
//! ```text
//! Unbound ──bind──▶ Bound   (parked readers resume with the value)
//!    │
//!    └────close──▶ Closed  (parked readers die without a value)
//! ```
//!
//! The cell only records *which* tokens are parked. Waking or killing them is
//! the engine's job, so both transitions hand the drained waiter list back to
//! the caller.

use crate::types::{TokenId, Value};
use core::fmt;
use parking_lot::Mutex;
use smallvec::SmallVec;

/// Tokens parked on a cell.
pub type Waiters = SmallVec<[TokenId; 4]>;

/// Observable state of a [`FutureCell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    /// Nobody has written yet.
    Unbound,
    /// A value has been written.
    Bound,
    /// The producer went away without writing.
    Closed,
}

/// Result of [`FutureCell::read`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// The cell is bound; the reader continues synchronously.
    Ready(Value),
    /// The reader was parked and must stay suspended.
    Parked,
    /// The cell is closed; the reader must die.
    Closed,
}

enum CellState {
    Unbound(Waiters),
    Bound(Value),
    Closed,
}

/// A write-once value slot.
pub struct FutureCell {
    state: Mutex<CellState>,
}

impl FutureCell {
    /// Creates an unbound cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CellState::Unbound(SmallVec::new())),
        }
    }

    /// Creates a cell that is already bound to `value`.
    #[must_use]
    pub fn bound(value: Value) -> Self {
        Self {
            state: Mutex::new(CellState::Bound(value)),
        }
    }

    /// Binds the cell.
    ///
    /// Returns the parked readers when this call performed the transition,
    /// `None` when the cell was already bound or closed.
    pub fn bind(&self, value: Value) -> Option<Waiters> {
        let mut state = self.state.lock();
        match &mut *state {
            CellState::Unbound(waiters) => {
                let waiters = std::mem::take(waiters);
                *state = CellState::Bound(value);
                Some(waiters)
            }
            CellState::Bound(_) | CellState::Closed => None,
        }
    }

    /// Closes the cell.
    ///
    /// Returns the parked readers (to be killed) when this call performed the
    /// transition. A bound cell stays bound.
    pub fn close(&self) -> Option<Waiters> {
        let mut state = self.state.lock();
        match &mut *state {
            CellState::Unbound(waiters) => {
                let waiters = std::mem::take(waiters);
                *state = CellState::Closed;
                Some(waiters)
            }
            CellState::Bound(_) | CellState::Closed => None,
        }
    }

    /// Reads the cell on behalf of `reader`, parking it if unbound.
    pub fn read(&self, reader: TokenId) -> ReadOutcome {
        let mut state = self.state.lock();
        match &mut *state {
            CellState::Bound(value) => ReadOutcome::Ready(value.clone()),
            CellState::Closed => ReadOutcome::Closed,
            CellState::Unbound(waiters) => {
                waiters.push(reader);
                ReadOutcome::Parked
            }
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> FutureState {
        match &*self.state.lock() {
            CellState::Unbound(_) => FutureState::Unbound,
            CellState::Bound(_) => FutureState::Bound,
            CellState::Closed => FutureState::Closed,
        }
    }

    /// Returns the bound value, if any.
    #[must_use]
    pub fn value(&self) -> Option<Value> {
        match &*self.state.lock() {
            CellState::Bound(value) => Some(value.clone()),
            CellState::Unbound(_) | CellState::Closed => None,
        }
    }

    /// Number of parked readers.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        match &*self.state.lock() {
            CellState::Unbound(waiters) => waiters.len(),
            CellState::Bound(_) | CellState::Closed => 0,
        }
    }
}

impl Default for FutureCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FutureCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.lock() {
            CellState::Unbound(waiters) => f
                .debug_struct("FutureCell")
                .field("state", &"unbound")
                .field("waiters", &waiters.len())
                .finish(),
            CellState::Bound(value) => f
                .debug_struct("FutureCell")
                .field("state", &"bound")
                .field("value", value)
                .finish(),
            CellState::Closed => f
                .debug_struct("FutureCell")
                .field("state", &"closed")
                .finish(),
        }
    }
}
