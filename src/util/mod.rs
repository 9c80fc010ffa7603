//! Internal utilities for the engine.

pub mod arena;

pub use arena::{Arena, ArenaIndex};
