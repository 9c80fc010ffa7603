//! Error types.
//!
//! Two tiers, matching how far a failure is allowed to travel:
//!
//! - [`TokenError`]: a failure local to one token (unbound variable, bad
//!   call, site failure, uncaught exception). The token dies, the report goes
//!   to the sink, the run continues.
//! - [`Error`]: a failure of the run itself (resource exhaustion, internal
//!   invariant violation, bad configuration). These surface from
//!   [`Engine::run`](crate::runtime::Engine::run).

use crate::graph::Location;
use crate::types::{RegionId, TokenId, Value};
use core::fmt;
use std::sync::Arc;

/// The kind of engine-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The token limit was reached; the run was terminated.
    ResourceExhausted,
    /// An engine invariant was violated (a scheduler or compiler bug).
    Internal,
    /// A lifecycle operation was attempted in the wrong state.
    InvalidStateTransition,
    /// Configuration could not be parsed or applied.
    Config,
}

impl ErrorKind {
    /// Returns true for kinds that indicate a bug rather than a user
    /// program or environment problem.
    #[must_use]
    pub const fn is_bug(self) -> bool {
        matches!(self, Self::Internal | Self::InvalidStateTransition)
    }
}

/// Where an engine error happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Token being processed, if any.
    pub token: Option<TokenId>,
    /// Region involved, if any.
    pub region: Option<RegionId>,
}

/// Engine-level error.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    context: ErrorContext,
}

impl Error {
    /// Creates an error of the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            context: ErrorContext {
                token: None,
                region: None,
            },
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds a message.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Attaches the token being processed.
    #[must_use]
    pub const fn with_token(mut self, token: TokenId) -> Self {
        self.context.token = Some(token);
        self
    }

    /// Attaches the region involved.
    #[must_use]
    pub const fn with_region(mut self, region: RegionId) -> Self {
        self.context.region = Some(region);
        self
    }

    /// Adds a source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the context.
    #[must_use]
    pub const fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Token limit reached.
    #[must_use]
    pub fn resource_exhausted(limit: usize) -> Self {
        Self::new(ErrorKind::ResourceExhausted)
            .with_message(format!("token limit of {limit} reached"))
    }

    /// Engine invariant violated.
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Configuration problem.
    #[must_use]
    pub fn config(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        if let Some(token) = self.context.token {
            write!(f, " (token {token})")?;
        }
        if let Some(region) = self.context.region {
            write!(f, " (region {region})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Engine result alias.
pub type Result<T> = core::result::Result<T, Error>;

/// One entry of a token backtrace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktraceFrame {
    /// Name of the called function.
    pub callee: Arc<str>,
    /// Where the call was made.
    pub location: Option<Location>,
}

impl fmt::Display for BacktraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} at {location}", self.callee),
            None => write!(f, "{} at <unknown>", self.callee),
        }
    }
}

/// What went wrong for a single token.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenErrorKind {
    /// A variable index past the end of the environment.
    #[error("unbound variable #{index} (environment has {depth} bindings)")]
    UnboundVariable {
        /// De Bruijn index.
        index: usize,
        /// Environment size at the failure.
        depth: usize,
    },
    /// The callee of a call is not a site or closure.
    #[error("value {value} is not callable")]
    Uncallable {
        /// The offending value.
        value: Value,
    },
    /// Wrong number of arguments.
    #[error("{callee} expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        /// Callee name.
        callee: Arc<str>,
        /// Declared arity.
        expected: usize,
        /// Supplied arguments.
        actual: usize,
    },
    /// An argument of the wrong type.
    #[error("{callee} expects {expected} for argument {position}, got {actual}")]
    ArgumentType {
        /// Callee name.
        callee: Arc<str>,
        /// Zero-based argument position.
        position: usize,
        /// Expected type name.
        expected: &'static str,
        /// Actual type name.
        actual: &'static str,
    },
    /// A site reported a failure.
    #[error("site {site} failed: {message}")]
    SiteFailure {
        /// Site name.
        site: Arc<str>,
        /// Site-provided message.
        message: String,
    },
    /// A thrown value found no enclosing handler.
    #[error("uncaught exception: {value}")]
    UncaughtException {
        /// The thrown value.
        value: Value,
    },
}

/// A token-local failure report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}")]
pub struct TokenError {
    /// What went wrong.
    #[source]
    pub kind: TokenErrorKind,
    /// The token that died.
    pub token: TokenId,
    /// Innermost source position the token had entered.
    pub location: Option<Location>,
    /// Closure call sites, innermost first.
    pub backtrace: Vec<BacktraceFrame>,
}

impl TokenError {
    /// Renders the error with its location and backtrace, one line each.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        match &self.location {
            Some(location) => out.push_str(&format!("{location}: {}", self.kind)),
            None => out.push_str(&self.kind.to_string()),
        }
        for frame in &self.backtrace {
            out.push_str(&format!("\n    called from {frame}"));
        }
        out
    }
}
