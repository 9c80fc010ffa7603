//! The resumed queue shared between the engine thread and site threads.
//!
//! This is the only engine state foreign threads may touch. Site callbacks,
//! future binds and the logical clock all hand tokens back to the engine by
//! pushing a [`Resumption`] here; the engine admits them one per round once
//! its ready queue has drained. Pushing and the engine's sleep share a single
//! mutex and condition variable, so a push can never slip in between the
//! engine's emptiness check and its wait.

use crate::error::TokenErrorKind;
use crate::runtime::clock::LogicalClock;
use crate::types::{EngineState, TokenId, Value};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// What happened to a suspended token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ResumeKind {
    /// The site call returned a value.
    Publish(Value),
    /// The site call halted silently.
    Halt,
    /// The site call failed.
    Fail(TokenErrorKind),
    /// The future the token was parked on was bound; retry its node.
    Wake,
}

/// A message addressed to one suspended token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Resumption {
    pub(crate) token: TokenId,
    pub(crate) kind: ResumeKind,
}

impl Resumption {
    pub(crate) const fn new(token: TokenId, kind: ResumeKind) -> Self {
        Self { token, kind }
    }
}

pub(crate) struct Shared {
    resumed: Mutex<VecDeque<Resumption>>,
    wakeup: Condvar,
    clock: Mutex<LogicalClock>,
    state: AtomicU8,
    terminate: AtomicBool,
    paused: AtomicBool,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            resumed: Mutex::new(VecDeque::new()),
            wakeup: Condvar::new(),
            clock: Mutex::new(LogicalClock::new()),
            state: AtomicU8::new(EngineState::New.to_u8()),
            terminate: AtomicBool::new(false),
            paused: AtomicBool::new(false),
        }
    }

    /// Queues a resumption and wakes the engine.
    ///
    /// Returns false if the engine is already dead and the message was
    /// dropped.
    pub(crate) fn push(&self, resumption: Resumption) -> bool {
        if self.state().is_dead() {
            return false;
        }
        let mut resumed = self.resumed.lock();
        resumed.push_back(resumption);
        self.wakeup.notify_one();
        true
    }

    pub(crate) fn pop(&self) -> Option<Resumption> {
        self.resumed.lock().pop_front()
    }

    pub(crate) fn pending(&self) -> usize {
        self.resumed.lock().len()
    }

    /// Registers `token` to be released `delay` logical ticks from now.
    pub(crate) fn schedule_logical(&self, token: TokenId, delay: u64) -> bool {
        if self.state().is_dead() {
            return false;
        }
        self.clock.lock().schedule(token, delay);
        let _resumed = self.resumed.lock();
        self.wakeup.notify_one();
        true
    }

    /// Advances the logical clock to its next pending time, returning that
    /// time and the tokens released at it.
    pub(crate) fn advance_clock(&self) -> Option<(u64, Vec<TokenId>)> {
        self.clock.lock().advance()
    }

    pub(crate) fn logical_time(&self) -> u64 {
        self.clock.lock().now()
    }

    pub(crate) fn logical_pending(&self) -> usize {
        self.clock.lock().len()
    }

    /// Blocks the engine thread until a resumption arrives, a logical timer
    /// is registered, or termination is requested.
    pub(crate) fn wait(&self) {
        let mut resumed = self.resumed.lock();
        while resumed.is_empty() && !self.terminate_requested() && self.clock.lock().is_idle() {
            self.set_state(EngineState::Blocked);
            self.wakeup.wait(&mut resumed);
        }
        self.set_state(EngineState::Running);
    }

    pub(crate) fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Release);
        let _resumed = self.resumed.lock();
        self.wakeup.notify_all();
    }

    pub(crate) fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    pub(crate) fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub(crate) fn unpause(&self) {
        self.paused.store(false, Ordering::Release);
        let _resumed = self.resumed.lock();
        self.wakeup.notify_all();
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Blocks the engine thread while it is paused. Termination ends the
    /// pause.
    pub(crate) fn wait_while_paused(&self) {
        let mut resumed = self.resumed.lock();
        while self.is_paused() && !self.terminate_requested() {
            self.set_state(EngineState::Blocked);
            self.wakeup.wait(&mut resumed);
        }
        self.set_state(EngineState::Running);
    }

    pub(crate) fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    /// Drops queued resumptions and pending logical timers.
    pub(crate) fn clear(&self) {
        self.resumed.lock().clear();
        self.clock.lock().clear();
    }
}

impl core::fmt::Debug for Shared {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Shared")
            .field("state", &self.state())
            .field("pending", &self.pending())
            .field("terminate", &self.terminate_requested())
            .field("paused", &self.is_paused())
            .finish()
    }
}
