//! Engine trace recording.
//!
//! - [`event`]: trace events and their payloads
//! - [`buffer`]: ring buffer of recent events

pub mod buffer;
pub mod event;

pub use buffer::TraceBuffer;
pub use event::{TraceData, TraceEvent, TraceEventKind};
