//! Internal records for the engine's arenas.

pub mod future;
pub mod region;
pub mod token;

pub use future::{FutureCell, FutureState, ReadOutcome, Waiters};
pub use region::{Departure, RegionKind, RegionRecord, RegionState};
pub use token::{CallChain, Frame, Position, Stack, TokenRecord, TokenState};
