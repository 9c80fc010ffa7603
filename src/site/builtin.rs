//! Built-in sites.

use crate::site::{CallHandle, Rejection, Response, Site};
use crate::types::Value;
use std::sync::Arc;
use std::time::Duration;

/// Publishes its arguments: signal for none, the value for one, a tuple for
/// several.
#[derive(Debug, Default, Clone, Copy)]
pub struct LetSite;

impl LetSite {
    /// Collapses an argument list the way `Let` does.
    #[must_use]
    pub fn collapse(mut args: Vec<Value>) -> Value {
        match args.len() {
            0 => Value::Signal,
            1 => args.remove(0),
            _ => Value::tuple(args),
        }
    }
}

impl Site for LetSite {
    fn name(&self) -> &str {
        "Let"
    }

    fn call(&self, args: Vec<Value>, handle: CallHandle) {
        handle.publish(Self::collapse(args));
    }
}

/// Publishes a signal if its argument is true, halts if it is false.
#[derive(Debug, Default, Clone, Copy)]
pub struct IfSite;

impl Site for IfSite {
    fn name(&self) -> &str {
        "If"
    }

    fn call(&self, args: Vec<Value>, handle: CallHandle) {
        let condition = Rejection::check_arity(&args, 1).and_then(|()| Rejection::bool(&args, 0));
        match condition {
            Ok(true) => handle.publish(Value::Signal),
            Ok(false) => handle.halt(),
            Err(rejection) => handle.reject(rejection),
        }
    }
}

/// Fails with its argument as the message.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorSite;

impl Site for ErrorSite {
    fn name(&self) -> &str {
        "Error"
    }

    fn call(&self, args: Vec<Value>, handle: CallHandle) {
        let message = match args.as_slice() {
            [Value::Str(s)] => s.to_string(),
            [other] => other.to_string(),
            _ => LetSite::collapse(args).to_string(),
        };
        handle.fail(message);
    }
}

type SiteFn = dyn Fn(Vec<Value>) -> Response + Send + Sync;

/// A site backed by a synchronous closure run on the engine thread.
#[derive(Clone)]
pub struct FnSite {
    name: Arc<str>,
    f: Arc<SiteFn>,
}

impl FnSite {
    /// Wraps `f`.
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Response + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            f: Arc::new(f),
        }
    }
}

impl Site for FnSite {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: Vec<Value>, handle: CallHandle) {
        handle.respond((self.f)(args));
    }
}

impl core::fmt::Debug for FnSite {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FnSite").field("name", &self.name).finish()
    }
}

/// A site backed by a closure run on the blocking pool.
#[derive(Clone)]
pub struct BlockingSite {
    name: Arc<str>,
    f: Arc<SiteFn>,
}

impl BlockingSite {
    /// Wraps `f`.
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Response + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            f: Arc::new(f),
        }
    }
}

impl Site for BlockingSite {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: Vec<Value>, handle: CallHandle) {
        let f = Arc::clone(&self.f);
        handle.spawn_blocking(move || f(args));
    }
}

impl core::fmt::Debug for BlockingSite {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockingSite")
            .field("name", &self.name)
            .finish()
    }
}

/// Real-time timer: publishes a signal after the given number of
/// milliseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rtimer;

impl Site for Rtimer {
    fn name(&self) -> &str {
        "Rtimer"
    }

    fn call(&self, args: Vec<Value>, handle: CallHandle) {
        match delay_arg(&args) {
            Ok(millis) => {
                handle.spawn_blocking(move || {
                    std::thread::sleep(Duration::from_millis(millis));
                    Response::Publish(Value::Signal)
                });
            }
            Err(rejection) => handle.reject(rejection),
        }
    }
}

/// Logical timer: publishes a signal after the given number of logical
/// ticks. The logical clock only advances when the engine is idle.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ltimer;

impl Site for Ltimer {
    fn name(&self) -> &str {
        "Ltimer"
    }

    fn call(&self, args: Vec<Value>, handle: CallHandle) {
        match delay_arg(&args) {
            Ok(ticks) => handle.after_logical(ticks),
            Err(rejection) => handle.reject(rejection),
        }
    }
}

fn delay_arg(args: &[Value]) -> Result<u64, Rejection> {
    Rejection::check_arity(args, 1)?;
    let n = Rejection::int(args, 0)?;
    u64::try_from(n).map_err(|_| Rejection::Type {
        position: 0,
        expected: "non-negative integer",
        actual: "negative integer",
    })
}
