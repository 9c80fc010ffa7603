//! Token record.
//!
//! A token is one sequential thread of control walking the graph. Besides the
//! node it sits on it carries a persistent continuation stack: the frames
//! pushed by the combinators it has entered and not yet published out of.
//! Forked tokens share their common suffix of frames, so a `Sequential` frame
//! can be popped by every publication of its left side.

use crate::error::BacktraceFrame;
use crate::graph::{Binder, Location, Node};
use crate::record::FutureCell;
use crate::types::{Env, RegionId, TokenId, Value};
use core::fmt;
use std::sync::Arc;

/// Where a token resumes.
#[derive(Clone)]
pub enum Position {
    /// Evaluate this node next.
    At(Arc<Node>),
    /// Deliver the pending result to the innermost frame.
    Publishing,
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(node) => write!(f, "At({})", node.kind()),
            Self::Publishing => f.write_str("Publishing"),
        }
    }
}

/// Scheduling state of a live token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// On the ready queue (or being stepped).
    Runnable,
    /// Parked in a future's waiter list.
    OnFuture,
    /// Held by the site call boundary.
    OnCall,
    /// Held by an otherwise region until it closes.
    Held,
}

/// A continuation frame.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Continue with `right` for each publication.
    Sequential {
        /// Binding for the published value.
        binder: Binder,
        /// Continuation node.
        right: Arc<Node>,
        /// Environment at entry.
        env: Env,
    },
    /// Bind the first publication and close the pruning region.
    Prune {
        /// The source region.
        region: RegionId,
        /// Cell read by the target.
        cell: Arc<FutureCell>,
    },
    /// Record that the left side of an otherwise published.
    Otherwise {
        /// The left-side region.
        region: RegionId,
    },
    /// Exception handler scope; transparent to publications.
    Catch {
        /// Handler node.
        handler: Arc<Node>,
        /// Environment at entry.
        env: Env,
        /// Region the handler runs in.
        region: RegionId,
        /// Call chain at entry.
        callers: CallChain,
    },
    /// Return from a closure body to the caller's context.
    Return {
        /// Caller environment.
        env: Env,
        /// Caller call chain.
        callers: CallChain,
        /// Frames where the closure was defined; searched for handlers
        /// instead of the caller's frames.
        scope: Stack,
    },
}

struct StackNode {
    frame: Frame,
    rest: Stack,
}

/// Persistent continuation stack.
#[derive(Clone, Default)]
pub struct Stack(Option<Arc<StackNode>>);

impl Stack {
    /// The empty stack: publishing from it is a top-level publication.
    #[must_use]
    pub const fn new() -> Self {
        Self(None)
    }

    /// Returns a stack with `frame` on top.
    #[must_use]
    pub fn push(&self, frame: Frame) -> Self {
        Self(Some(Arc::new(StackNode {
            frame,
            rest: self.clone(),
        })))
    }

    /// The top frame and the stack below it.
    #[must_use]
    pub fn top(&self) -> Option<(&Frame, &Self)> {
        self.0.as_deref().map(|node| (&node.frame, &node.rest))
    }

    /// Returns true if no frames are pending.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Number of frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self;
        while let Some((_, rest)) = cursor.top() {
            depth += 1;
            cursor = rest;
        }
        depth
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        let mut cursor = self;
        while let Some((frame, rest)) = cursor.top() {
            list.entry(frame);
            cursor = rest;
        }
        list.finish()
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        let mut next = self.0.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.rest.0.take(),
                Err(_) => break,
            }
        }
    }
}

struct CallSite {
    callee: Arc<str>,
    location: Option<Location>,
    caller: CallChain,
}

/// The chain of closure call sites that led to a token, innermost first.
#[derive(Clone, Default)]
pub struct CallChain(Option<Arc<CallSite>>);

impl CallChain {
    /// Records a call to `callee` made at `location`.
    #[must_use]
    pub fn push(&self, callee: Arc<str>, location: Option<Location>) -> Self {
        Self(Some(Arc::new(CallSite {
            callee,
            location,
            caller: self.clone(),
        })))
    }

    /// Renders the chain as backtrace frames.
    #[must_use]
    pub fn frames(&self) -> Vec<BacktraceFrame> {
        let mut frames = Vec::new();
        let mut cursor = self.0.as_deref();
        while let Some(site) = cursor {
            frames.push(BacktraceFrame {
                callee: Arc::clone(&site.callee),
                location: site.location.clone(),
            });
            cursor = site.caller.0.as_deref();
        }
        frames
    }

    /// Number of calls in the chain.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self.0.as_deref();
        while let Some(site) = cursor {
            depth += 1;
            cursor = site.caller.0.as_deref();
        }
        depth
    }
}

impl fmt::Debug for CallChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.frames().iter().map(|frame| frame.callee.clone()))
            .finish()
    }
}

/// Internal record for a live token.
#[derive(Debug)]
pub struct TokenRecord {
    /// Identifier.
    pub id: TokenId,
    /// Owning region.
    pub region: RegionId,
    /// Where execution resumes.
    pub position: Position,
    /// Lexical environment.
    pub env: Env,
    /// Continuation frames.
    pub stack: Stack,
    /// Closure call chain, for backtraces.
    pub callers: CallChain,
    /// Innermost source position entered.
    pub location: Option<Location>,
    /// Pending result while publishing or resuming from a call.
    pub result: Option<Value>,
    /// Scheduling state.
    pub state: TokenState,
}

impl TokenRecord {
    /// Creates a root token.
    #[must_use]
    pub fn new(id: TokenId, region: RegionId, node: Arc<Node>, env: Env) -> Self {
        Self {
            id,
            region,
            position: Position::At(node),
            env,
            stack: Stack::new(),
            callers: CallChain::default(),
            location: None,
            result: None,
            state: TokenState::Runnable,
        }
    }

    /// Creates a copy of this token positioned at `node`.
    ///
    /// The copy still carries this token's id; the engine gives it its own
    /// when inserting it.
    #[must_use]
    pub fn fork(&self, node: Arc<Node>) -> Self {
        Self {
            id: self.id,
            region: self.region,
            position: Position::At(node),
            env: self.env.clone(),
            stack: self.stack.clone(),
            callers: self.callers.clone(),
            location: self.location.clone(),
            result: None,
            state: TokenState::Runnable,
        }
    }

    /// Moves to `node`.
    pub fn move_to(&mut self, node: Arc<Node>) {
        self.position = Position::At(node);
    }

    /// Sets the pending result and switches to publishing it.
    pub fn publish(&mut self, value: Value) {
        self.result = Some(value);
        self.position = Position::Publishing;
    }

    /// Backtrace from this token up through its callers.
    #[must_use]
    pub fn backtrace(&self) -> Vec<BacktraceFrame> {
        self.callers.frames()
    }
}
