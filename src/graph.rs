//! The compiled expression graph the engine executes.
//!
//! Nodes are immutable and shared through `Arc`, so a graph is a DAG that
//! many tokens walk at once without locking. Variables are de Bruijn indices
//! into the token's environment; [`Binder`] names exist only for display and
//! diagnostics.
//!
//! ```text
//! Parallel(l, r)          l | r
//! Sequential(l, x, r)     l >x> r     (r sees x at index 0)
//! Pruning(t, x, s)        t <x< s     (t sees x at index 0)
//! Otherwise(l, r)         l ; r
//! Catch(b, h)             try b catch (e) h   (h sees e at index 0)
//! ```

use crate::types::Value;
use core::fmt;
use std::sync::Arc;

/// An argument position: a variable or a constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// De Bruijn index into the environment.
    Var(usize),
    /// A literal value.
    Value(Value),
}

impl Arg {
    /// Variable reference.
    #[must_use]
    pub const fn var(index: usize) -> Self {
        Self::Var(index)
    }

    /// Constant argument.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Whether a combinator binds the published value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binder {
    /// `>>` / `<<`: the value is dropped.
    Discard,
    /// `>x>` / `<x<`: the value is pushed onto the environment.
    Var(Arc<str>),
}

impl Binder {
    /// Named binder.
    #[must_use]
    pub fn var(name: &str) -> Self {
        Self::Var(Arc::from(name))
    }

    /// Returns true if the binder extends the environment.
    #[must_use]
    pub const fn binds(&self) -> bool {
        matches!(self, Self::Var(_))
    }
}

/// A source position attached by [`Node::WithLocation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Source file name.
    pub file: Arc<str>,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

impl Location {
    /// Creates a location.
    #[must_use]
    pub fn new(file: &str, line: u32, column: u32) -> Self {
        Self {
            file: Arc::from(file),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A function definition inside a [`Node::Defs`] group.
///
/// When called, the body runs in the closure's captured environment extended
/// with every definition of the group (first definition outermost) and then
/// the arguments (last argument at index 0).
#[derive(Debug)]
pub struct Def {
    /// Name used in backtraces.
    pub name: Arc<str>,
    /// Number of parameters.
    pub arity: usize,
    /// Function body.
    pub body: Arc<Node>,
}

impl Def {
    /// Creates a definition.
    #[must_use]
    pub fn new(name: &str, arity: usize, body: Arc<Node>) -> Self {
        Self {
            name: Arc::from(name),
            arity,
            body,
        }
    }
}

/// One node of the expression graph.
#[derive(Debug)]
pub enum Node {
    /// Kill the token silently.
    Stop,
    /// Publish the argument (signal for none, a tuple for several).
    Let(Vec<Arg>),
    /// Call a site or closure.
    Call {
        /// The callee.
        target: Arg,
        /// Arguments, in order.
        args: Vec<Arg>,
    },
    /// Run both sides in the same region.
    Parallel(Arc<Node>, Arc<Node>),
    /// Run `right` once for every publication of `left`.
    Sequential {
        /// Producer.
        left: Arc<Node>,
        /// Binding for each publication.
        binder: Binder,
        /// Continuation.
        right: Arc<Node>,
    },
    /// Run `target` with the first publication of `source`, then prune
    /// `source`.
    Pruning {
        /// Consumer.
        target: Arc<Node>,
        /// Binding for the first publication.
        binder: Binder,
        /// Producer, run in its own region.
        source: Arc<Node>,
    },
    /// Run `right` only if `left` halts without publishing.
    Otherwise(Arc<Node>, Arc<Node>),
    /// Raise the argument as an exception.
    Throw(Arg),
    /// Intercept exceptions raised (lexically) inside `body`.
    Catch {
        /// Protected expression.
        body: Arc<Node>,
        /// Handler; sees the exception at index 0.
        handler: Arc<Node>,
    },
    /// Bring a group of mutually recursive functions into scope.
    Defs {
        /// The group.
        defs: Arc<[Def]>,
        /// Scope of the definitions.
        body: Arc<Node>,
    },
    /// Attach a source position for diagnostics.
    WithLocation {
        /// The position.
        location: Location,
        /// The wrapped node.
        body: Arc<Node>,
    },
}

impl Node {
    /// `stop`
    #[must_use]
    pub fn stop() -> Arc<Self> {
        Arc::new(Self::Stop)
    }

    /// `let(args)`
    #[must_use]
    pub fn let_(args: Vec<Arg>) -> Arc<Self> {
        Arc::new(Self::Let(args))
    }

    /// Publishes a single constant.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Arc<Self> {
        Self::let_(vec![Arg::value(value)])
    }

    /// `target(args)`
    #[must_use]
    pub fn call(target: Arg, args: Vec<Arg>) -> Arc<Self> {
        Arc::new(Self::Call { target, args })
    }

    /// `left | right`
    #[must_use]
    pub fn parallel(left: Arc<Self>, right: Arc<Self>) -> Arc<Self> {
        Arc::new(Self::Parallel(left, right))
    }

    /// `left >binder> right`
    #[must_use]
    pub fn sequential(left: Arc<Self>, binder: Binder, right: Arc<Self>) -> Arc<Self> {
        Arc::new(Self::Sequential {
            left,
            binder,
            right,
        })
    }

    /// `target <binder< source`
    #[must_use]
    pub fn pruning(target: Arc<Self>, binder: Binder, source: Arc<Self>) -> Arc<Self> {
        Arc::new(Self::Pruning {
            target,
            binder,
            source,
        })
    }

    /// `left ; right`
    #[must_use]
    pub fn otherwise(left: Arc<Self>, right: Arc<Self>) -> Arc<Self> {
        Arc::new(Self::Otherwise(left, right))
    }

    /// `throw arg`
    #[must_use]
    pub fn throw(arg: Arg) -> Arc<Self> {
        Arc::new(Self::Throw(arg))
    }

    /// `try body catch (e) handler`
    #[must_use]
    pub fn catch(body: Arc<Self>, handler: Arc<Self>) -> Arc<Self> {
        Arc::new(Self::Catch { body, handler })
    }

    /// `def ... ; body`
    #[must_use]
    pub fn defs(defs: Vec<Def>, body: Arc<Self>) -> Arc<Self> {
        Arc::new(Self::Defs {
            defs: Arc::from(defs),
            body,
        })
    }

    /// Wraps `body` with a source position.
    #[must_use]
    pub fn located(location: Location, body: Arc<Self>) -> Arc<Self> {
        Arc::new(Self::WithLocation { location, body })
    }

    /// Short tag used in trace output.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Let(_) => "let",
            Self::Call { .. } => "call",
            Self::Parallel(..) => "parallel",
            Self::Sequential { .. } => "sequential",
            Self::Pruning { .. } => "pruning",
            Self::Otherwise(..) => "otherwise",
            Self::Throw(_) => "throw",
            Self::Catch { .. } => "catch",
            Self::Defs { .. } => "defs",
            Self::WithLocation { .. } => "located",
        }
    }
}
