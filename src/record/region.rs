//! Region record.
//!
//! A region owns tokens and child regions, forming a tree. Its inhabitant
//! count is the number of direct members; when the count drops to zero the
//! region closes, and closing removes it from its parent.
//!
//! ```text
//! Open ──(last inhabitant leaves | forced close)──▶ Closed
//! ```
//!
//! Closed is absorbing: membership changes on a closed region are ignored.

use crate::record::FutureCell;
use crate::types::{RegionId, TokenId};
use std::collections::BTreeSet;
use std::sync::Arc;

/// The state of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// Accepting members.
    Open,
    /// Terminal.
    Closed,
}

impl RegionState {
    /// Returns true if the region is terminal.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// What a region is for; decides what happens when it closes.
#[derive(Debug)]
pub enum RegionKind {
    /// The top-level region of a run. Closing it halts the engine.
    Execution,
    /// The source side of a pruning. Closing it closes the cell, which kills
    /// the parked continuation unless a value was bound first.
    Pruning {
        /// Cell the first publication is bound into.
        cell: Arc<FutureCell>,
    },
    /// The left side of an otherwise. Closing it without a publication
    /// releases the parked continuation into the right side.
    Otherwise {
        /// The parked continuation, positioned at the right branch.
        pending: Option<TokenId>,
        /// Set on the first publication from the left side.
        published: bool,
    },
}

impl RegionKind {
    /// Short tag for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Execution => "execution",
            Self::Pruning { .. } => "pruning",
            Self::Otherwise { .. } => "otherwise",
        }
    }
}

/// Result of removing a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The region is closed or the member was not present; nothing changed.
    Ignored,
    /// The member left; this many inhabitants remain.
    Remaining(usize),
    /// The last inhabitant left; the caller must close the region.
    Emptied,
}

/// Internal record for a region.
#[derive(Debug)]
pub struct RegionRecord {
    /// Identifier.
    pub id: RegionId,
    /// Parent region (None for the execution region).
    pub parent: Option<RegionId>,
    /// Role of the region.
    pub kind: RegionKind,
    /// Lifecycle state.
    pub state: RegionState,
    inhabitants: usize,
    tokens: BTreeSet<TokenId>,
    children: BTreeSet<RegionId>,
}

impl RegionRecord {
    /// Creates an open region with no inhabitants.
    #[must_use]
    pub fn new(id: RegionId, parent: Option<RegionId>, kind: RegionKind) -> Self {
        Self {
            id,
            parent,
            kind,
            state: RegionState::Open,
            inhabitants: 0,
            tokens: BTreeSet::new(),
            children: BTreeSet::new(),
        }
    }

    /// Number of direct members.
    #[must_use]
    pub const fn inhabitants(&self) -> usize {
        self.inhabitants
    }

    /// Returns true while the region accepts members.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, RegionState::Open)
    }

    /// Returns true if `token` is a direct member.
    #[must_use]
    pub fn owns_token(&self, token: TokenId) -> bool {
        self.tokens.contains(&token)
    }

    /// Returns true if `child` is a direct member.
    #[must_use]
    pub fn owns_region(&self, child: RegionId) -> bool {
        self.children.contains(&child)
    }

    /// Adds a token. Returns false if the region is closed or the token is
    /// already a member.
    pub fn add_token(&mut self, token: TokenId) -> bool {
        if !self.is_open() || !self.tokens.insert(token) {
            return false;
        }
        self.inhabitants += 1;
        true
    }

    /// Adds a child region. Returns false if the region is closed or the
    /// child is already a member.
    pub fn add_child(&mut self, child: RegionId) -> bool {
        if !self.is_open() || !self.children.insert(child) {
            return false;
        }
        self.inhabitants += 1;
        true
    }

    /// Removes a token.
    pub fn remove_token(&mut self, token: TokenId) -> Departure {
        if !self.is_open() || !self.tokens.remove(&token) {
            return Departure::Ignored;
        }
        self.depart()
    }

    /// Removes a child region.
    pub fn remove_child(&mut self, child: RegionId) -> Departure {
        if !self.is_open() || !self.children.remove(&child) {
            return Departure::Ignored;
        }
        self.depart()
    }

    fn depart(&mut self) -> Departure {
        self.inhabitants -= 1;
        if self.inhabitants == 0 {
            Departure::Emptied
        } else {
            Departure::Remaining(self.inhabitants)
        }
    }

    /// Marks the region closed.
    ///
    /// Returns true if the state changed; a second call is a no-op.
    pub fn begin_close(&mut self) -> bool {
        if self.is_open() {
            self.state = RegionState::Closed;
            true
        } else {
            false
        }
    }

    /// Takes every member out of the region for a cascading close.
    ///
    /// The inhabitant count drops to zero with them.
    pub fn take_members(&mut self) -> (Vec<TokenId>, Vec<RegionId>) {
        self.inhabitants = 0;
        let tokens = std::mem::take(&mut self.tokens).into_iter().collect();
        let children = std::mem::take(&mut self.children).into_iter().collect();
        (tokens, children)
    }
}
