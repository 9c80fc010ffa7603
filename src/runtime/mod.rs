//! Engine state and scheduling.
//!
//! This module contains the execution machinery:
//!
//! - [`config`]: Engine configuration types
//! - [`builder`]: Engine builder
//! - [`env_config`]: Environment variable and config file loading
//! - [`engine`]: The engine, its run loop and region cascade
//! - [`scheduler`]: FIFO ready queue
//! - [`sink`]: Where publications and token errors go
//! - [`blocking_pool`]: Threads for blocking site work
//!
//! # Engine Builder
//!
//! The engine is configured with a fluent, move-based builder. Each builder
//! method consumes `self` and returns an updated builder.
//!
//! ```ignore
//! use orc_engine::runtime::{CollectingSink, EngineBuilder};
//!
//! let mut engine = EngineBuilder::new()
//!     .max_publications(10)
//!     .blocking_threads(0, 8)
//!     .build()?;
//! let mut sink = CollectingSink::new();
//! engine.run(graph, Env::new(), &mut sink)?;
//! ```
//!
//! ## Config File + Environment Overrides
//!
//! ```ignore
//! // Requires the `config-file` feature.
//! let engine = EngineBuilder::new()
//!     .with_toml_file(Path::new("config/orc.toml"))?
//!     .with_env_overrides()?
//!     .build()?;
//! ```
//!
//! # Threads
//!
//! The engine thread is whichever thread calls [`Engine::run`]. Sites may
//! respond from any thread; responses travel through a shared queue and are
//! admitted one per round once the ready queue has drained. Use an
//! [`EngineHandle`] to watch the engine's state or stop it from elsewhere.

pub mod blocking_pool;
pub mod builder;
pub(crate) mod clock;
pub mod config;
pub mod engine;
pub mod env_config;
pub(crate) mod resume;
pub mod scheduler;
pub mod sink;
mod step;

pub use blocking_pool::{BlockingPool, BlockingPoolHandle, BlockingPoolOptions, BlockingTaskHandle};
pub use builder::EngineBuilder;
pub use config::{BlockingPoolConfig, EngineConfig};
pub use engine::{Engine, EngineHandle, RunSummary};
pub use scheduler::ReadyQueue;
pub use sink::{CollectingSink, Sink};
