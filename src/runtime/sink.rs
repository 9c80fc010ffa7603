//! Output sinks.
//!
//! The engine reports to a [`Sink`] on the engine thread, in occurrence
//! order: one `publish` per top-level publication, one `error` per
//! token-local failure, and exactly one `finished` when the top-level region
//! has closed.

use crate::error::TokenError;
use crate::types::Value;

/// Receiver of a run's results.
pub trait Sink {
    /// A value was published at top level.
    fn publish(&mut self, value: Value);

    /// A token died with an error. The run continues.
    fn error(&mut self, error: TokenError) {
        let _ = error;
    }

    /// The run is over. Called exactly once.
    fn finished(&mut self) {}
}

impl<F> Sink for F
where
    F: FnMut(Value),
{
    fn publish(&mut self, value: Value) {
        self(value);
    }
}

/// A sink that records everything, for tests and simple hosts.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CollectingSink {
    /// Published values, in order.
    pub published: Vec<Value>,
    /// Token errors, in order.
    pub errors: Vec<TokenError>,
    /// Number of `finished` calls.
    pub finished: usize,
}

impl CollectingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once `finished` has been called.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished > 0
    }
}

impl Sink for CollectingSink {
    fn publish(&mut self, value: Value) {
        self.published.push(value);
    }

    fn error(&mut self, error: TokenError) {
        self.errors.push(error);
    }

    fn finished(&mut self) {
        self.finished += 1;
    }
}

/// Events buffered by the engine during a step and flushed to the sink.
#[derive(Debug)]
pub(crate) enum SinkEvent {
    Published(Value),
    Failed(TokenError),
}

impl SinkEvent {
    pub(crate) fn deliver(self, sink: &mut dyn Sink) {
        match self {
            Self::Published(value) => sink.publish(value),
            Self::Failed(error) => sink.error(error),
        }
    }
}
