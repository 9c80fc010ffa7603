//! The site call boundary.
//!
//! A [`Site`] is an external callable. The engine invokes it on the engine
//! thread with the resolved arguments and a [`CallHandle`] for the calling
//! token, then moves on; the token stays suspended until the handle responds.
//! The handle may be moved to any thread and must respond exactly once:
//!
//! - [`CallHandle::publish`]: the token continues with the value.
//! - [`CallHandle::halt`]: the token dies silently.
//! - [`CallHandle::fail`]: the token dies with a reported error.
//!
//! Dropping a handle without responding counts as a halt, so every call
//! resolves exactly once. Responses for tokens that died in the meantime
//! (their region was pruned or terminated) are discarded by the engine.

pub mod builtin;

pub use builtin::{BlockingSite, ErrorSite, FnSite, IfSite, LetSite, Ltimer, Rtimer};

use crate::error::TokenErrorKind;
use crate::runtime::blocking_pool::{BlockingPoolHandle, BlockingTaskHandle};
use crate::runtime::resume::{ResumeKind, Resumption, Shared};
use crate::tracing_compat::trace;
use crate::types::{TokenId, Value};
use core::fmt;
use std::sync::Arc;

/// An external callable invoked by `Call` nodes.
pub trait Site: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Starts a call. Must not block the engine thread for long; slow work
    /// belongs on [`CallHandle::spawn_blocking`].
    fn call(&self, args: Vec<Value>, handle: CallHandle);
}

/// How a site call ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Continue the caller with a value.
    Publish(Value),
    /// Kill the caller silently.
    Halt,
    /// Kill the caller with an error report.
    Fail(String),
}

impl From<Value> for Response {
    fn from(value: Value) -> Self {
        Self::Publish(value)
    }
}

/// An argument problem detected by a site before it does any work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Wrong number of arguments.
    Arity {
        /// Accepted count.
        expected: usize,
        /// Supplied count.
        actual: usize,
    },
    /// An argument of the wrong type.
    Type {
        /// Zero-based position.
        position: usize,
        /// Expected type name.
        expected: &'static str,
        /// Supplied type name.
        actual: &'static str,
    },
}

impl Rejection {
    /// Checks that exactly `expected` arguments were supplied.
    pub fn check_arity(args: &[Value], expected: usize) -> Result<(), Self> {
        if args.len() == expected {
            Ok(())
        } else {
            Err(Self::Arity {
                expected,
                actual: args.len(),
            })
        }
    }

    /// Reads an integer argument. A missing argument is an arity error.
    pub fn int(args: &[Value], position: usize) -> Result<i64, Self> {
        let value = args.get(position).ok_or(Self::Arity {
            expected: position + 1,
            actual: args.len(),
        })?;
        value.as_int().ok_or(Self::Type {
            position,
            expected: "integer",
            actual: value.type_name(),
        })
    }

    /// Reads a boolean argument. A missing argument is an arity error.
    pub fn bool(args: &[Value], position: usize) -> Result<bool, Self> {
        let value = args.get(position).ok_or(Self::Arity {
            expected: position + 1,
            actual: args.len(),
        })?;
        value.as_bool().ok_or(Self::Type {
            position,
            expected: "boolean",
            actual: value.type_name(),
        })
    }

    fn into_kind(self, site: Arc<str>) -> TokenErrorKind {
        match self {
            Self::Arity { expected, actual } => TokenErrorKind::ArityMismatch {
                callee: site,
                expected,
                actual,
            },
            Self::Type {
                position,
                expected,
                actual,
            } => TokenErrorKind::ArgumentType {
                callee: site,
                position,
                expected,
                actual,
            },
        }
    }
}

/// The calling token's side of a site call.
pub struct CallHandle {
    token: TokenId,
    site: Arc<str>,
    shared: Arc<Shared>,
    pool: BlockingPoolHandle,
    responded: bool,
}

impl CallHandle {
    pub(crate) fn new(
        token: TokenId,
        site: Arc<str>,
        shared: Arc<Shared>,
        pool: BlockingPoolHandle,
    ) -> Self {
        Self {
            token,
            site,
            shared,
            pool,
            responded: false,
        }
    }

    /// The suspended token.
    #[must_use]
    pub const fn token(&self) -> TokenId {
        self.token
    }

    /// Name of the called site.
    #[must_use]
    pub fn site_name(&self) -> &str {
        &self.site
    }

    /// Resumes the caller with `value`.
    pub fn publish(self, value: Value) {
        self.respond(Response::Publish(value));
    }

    /// Kills the caller silently.
    pub fn halt(self) {
        self.respond(Response::Halt);
    }

    /// Kills the caller and reports `message` as a site failure.
    pub fn fail(self, message: impl Into<String>) {
        self.respond(Response::Fail(message.into()));
    }

    /// Kills the caller with an arity or argument type error.
    pub fn reject(mut self, rejection: Rejection) {
        let kind = rejection.into_kind(Arc::clone(&self.site));
        self.send(ResumeKind::Fail(kind));
    }

    /// Delivers `response`.
    pub fn respond(mut self, response: Response) {
        let kind = match response {
            Response::Publish(value) => ResumeKind::Publish(value),
            Response::Halt => ResumeKind::Halt,
            Response::Fail(message) => ResumeKind::Fail(TokenErrorKind::SiteFailure {
                site: Arc::clone(&self.site),
                message,
            }),
        };
        self.send(kind);
    }

    /// Runs `work` on the blocking pool and responds with its result.
    pub fn spawn_blocking<F>(self, work: F) -> BlockingTaskHandle
    where
        F: FnOnce() -> Response + Send + 'static,
    {
        let pool = self.pool.clone();
        pool.spawn(move || {
            let response = work();
            self.respond(response);
        })
    }

    /// Resumes the caller with a signal after `delay` ticks of the logical
    /// clock.
    pub fn after_logical(mut self, delay: u64) {
        self.responded = true;
        if !self.shared.schedule_logical(self.token, delay) {
            trace!(token = %self.token, "logical timer dropped, engine is dead");
        }
    }

    fn send(&mut self, kind: ResumeKind) {
        self.responded = true;
        if !self.shared.push(Resumption::new(self.token, kind)) {
            trace!(token = %self.token, site = %self.site, "response dropped, engine is dead");
        }
    }
}

impl Drop for CallHandle {
    fn drop(&mut self) {
        if !self.responded {
            self.send(ResumeKind::Halt);
        }
    }
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHandle")
            .field("token", &self.token)
            .field("site", &self.site)
            .field("responded", &self.responded)
            .finish()
    }
}
