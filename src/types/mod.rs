//! Core types shared across the engine.
//!
//! - [`id`]: typed arena handles for regions and tokens
//! - [`value`]: runtime values and closures
//! - [`env`]: persistent lexical environments

pub mod env;
pub mod id;
pub mod value;

pub use env::{Binding, Env};
pub use id::{RegionId, TokenId};
pub use value::{Closure, Value};

use serde::{Deserialize, Serialize};

/// Lifecycle state of an engine, as seen by host integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineState {
    /// Created but not yet started.
    New,
    /// Stepping tokens.
    Running,
    /// Idle, waiting for a site call to return.
    Blocked,
    /// The top-level region has closed.
    Dead,
}

impl EngineState {
    pub(crate) const fn to_u8(self) -> u8 {
        match self {
            Self::New => 0,
            Self::Running => 1,
            Self::Blocked => 2,
            Self::Dead => 3,
        }
    }

    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::New,
            1 => Self::Running,
            2 => Self::Blocked,
            _ => Self::Dead,
        }
    }

    /// Returns true once the run is over.
    #[must_use]
    pub const fn is_dead(self) -> bool {
        matches!(self, Self::Dead)
    }
}
