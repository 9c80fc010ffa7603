//! Trace events recorded by the engine.

use crate::types::{RegionId, TokenId, Value};
use core::fmt;

/// The kind of trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEventKind {
    /// A token was stepped at a node.
    Step,
    /// A token was created.
    Fork,
    /// A token parked on a future or a site call.
    Park,
    /// A resumption was admitted from the resumed queue.
    Admit,
    /// A resumption addressed to a dead token was dropped.
    Discard,
    /// A region was created.
    RegionOpen,
    /// A region closed.
    RegionClose,
    /// A value was published at top level.
    Publish,
    /// A token died.
    Death,
    /// A site was invoked.
    Call,
    /// The logical clock advanced.
    ClockAdvance,
    /// A token failed with an error.
    Fault,
}

/// Additional data carried by a trace event.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceData {
    /// No additional data.
    None,
    /// A token and its region.
    Token {
        /// The token involved.
        token: TokenId,
        /// Its region.
        region: RegionId,
    },
    /// A token at a node.
    Node {
        /// The token involved.
        token: TokenId,
        /// Node kind.
        node: &'static str,
    },
    /// A region and its parent.
    Region {
        /// The region involved.
        region: RegionId,
        /// Its parent, if any.
        parent: Option<RegionId>,
    },
    /// A published value.
    Value(Value),
    /// Logical clock movement.
    Time {
        /// Previous logical time.
        old: u64,
        /// New logical time.
        new: u64,
    },
    /// Free-form message.
    Message(String),
}

/// One recorded engine event.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    /// Sequence number (monotonically increasing).
    pub seq: u64,
    /// Round in which the event happened.
    pub round: u64,
    /// The kind of event.
    pub kind: TraceEventKind,
    /// Additional data.
    pub data: TraceData,
}

impl TraceEvent {
    /// Creates an event.
    #[must_use]
    pub const fn new(seq: u64, round: u64, kind: TraceEventKind, data: TraceData) -> Self {
        Self {
            seq,
            round,
            kind,
            data,
        }
    }

    /// Returns the token the event is about, if any.
    #[must_use]
    pub const fn token(&self) -> Option<TokenId> {
        match &self.data {
            TraceData::Token { token, .. } | TraceData::Node { token, .. } => Some(*token),
            _ => None,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:06}] r{} {:?}", self.seq, self.round, self.kind)?;
        match &self.data {
            TraceData::None => Ok(()),
            TraceData::Token { token, region } => write!(f, " {token} in {region}"),
            TraceData::Node { token, node } => write!(f, " {token} at {node}"),
            TraceData::Region { region, parent } => match parent {
                Some(parent) => write!(f, " {region} under {parent}"),
                None => write!(f, " {region} (root)"),
            },
            TraceData::Value(value) => write!(f, " {value}"),
            TraceData::Time { old, new } => write!(f, " {old} -> {new}"),
            TraceData::Message(msg) => write!(f, " \"{msg}\""),
        }
    }
}
