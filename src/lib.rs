//! Orc engine: a token-based concurrent execution engine for the Orc process
//! calculus.
//!
//! # Overview
//!
//! The engine takes a compiled expression graph and runs it, producing an
//! ordered (possibly empty, possibly unbounded) sequence of published values.
//! Execution is carried by *tokens*, lightweight threads of control that
//! step through the graph, and *regions*, dynamic scopes that own tokens and
//! close to quiescence.
//!
//! # Core Guarantees
//!
//! - **No orphan tokens**: every token is owned by a region; closing a region kills everything inside it, recursively, exactly once
//! - **Pruning at most one**: a pruning source delivers at most one value to its target
//! - **Single-threaded semantics**: all token and region state lives on the engine thread; sites respond from any thread through one shared queue
//! - **Round-based draining**: the ready queue drains before the next resumed token is admitted, which makes traces reproducible
//!
//! # Module Structure
//!
//! - [`graph`]: The expression graph (nodes, arguments, definitions)
//! - [`types`]: Identifiers, values, environments, engine state
//! - [`record`]: Token, region and future records
//! - [`runtime`]: The engine, its configuration and scheduler
//! - [`site`]: The site call boundary and built-in sites
//! - [`trace`]: Ring buffer of engine events for debugging
//! - [`error`]: Error types
//! - [`util`]: Internal utilities (arenas)
//!
//! # Example
//!
//! ```ignore
//! use orc_engine::graph::{Arg, Binder, Node};
//! use orc_engine::runtime::{CollectingSink, EngineBuilder};
//! use orc_engine::types::Env;
//!
//! // 1 | 2
//! let graph = Node::parallel(Node::value(1), Node::value(2));
//! let mut engine = EngineBuilder::new().build()?;
//! let mut sink = CollectingSink::new();
//! engine.run(graph, Env::new(), &mut sink)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_inception)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod error;
pub mod graph;
pub mod record;
pub mod runtime;
pub mod site;
pub mod trace;
pub mod tracing_compat;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{Error, ErrorKind, Result, TokenError, TokenErrorKind};
pub use graph::{Arg, Binder, Def, Location, Node};
pub use runtime::{
    CollectingSink, Engine, EngineBuilder, EngineConfig, EngineHandle, RunSummary, Sink,
};
pub use site::{CallHandle, Rejection, Response, Site};
pub use types::{EngineState, Env, RegionId, TokenId, Value};
