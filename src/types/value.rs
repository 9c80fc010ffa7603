//! Runtime values.

use crate::graph::Def;
use crate::record::Stack;
use crate::site::Site;
use crate::types::Env;
use core::fmt;
use std::sync::Arc;

/// A value flowing through the engine: published, bound, or passed to sites.
#[derive(Clone)]
pub enum Value {
    /// The unit value published by sites that have nothing to say.
    Signal,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// An immutable string.
    Str(Arc<str>),
    /// A tuple of values; `Let` with several arguments publishes one.
    Tuple(Arc<[Value]>),
    /// An external callable.
    Site(Arc<dyn Site>),
    /// A function defined by a `Defs` node, closed over its environment.
    Closure(Arc<Closure>),
}

impl Value {
    /// Creates a string value.
    #[must_use]
    pub fn str(s: &str) -> Self {
        Self::Str(Arc::from(s))
    }

    /// Creates a tuple value.
    #[must_use]
    pub fn tuple(values: Vec<Self>) -> Self {
        Self::Tuple(Arc::from(values))
    }

    /// Wraps a site.
    #[must_use]
    pub fn site(site: impl Site + 'static) -> Self {
        Self::Site(Arc::new(site))
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the value's type, used in diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Str(_) => "string",
            Self::Tuple(_) => "tuple",
            Self::Site(_) => "site",
            Self::Closure(_) => "closure",
        }
    }

    /// Returns true for values the `Call` node can invoke.
    #[must_use]
    pub const fn is_callable(&self) -> bool {
        matches!(self, Self::Site(_) | Self::Closure(_))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Signal, Self::Signal) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Tuple(a), Self::Tuple(b)) => a == b,
            (Self::Site(a), Self::Site(b)) => Arc::ptr_eq(a, b),
            (Self::Closure(a), Self::Closure(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => f.write_str("Signal"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(n) => write!(f, "Int({n})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::Tuple(items) => f.debug_tuple("Tuple").field(items).finish(),
            Self::Site(site) => write!(f, "Site({})", site.name()),
            Self::Closure(closure) => write!(f, "Closure({})", closure.name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => f.write_str("signal"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Self::Site(site) => write!(f, "<site {}>", site.name()),
            Self::Closure(closure) => write!(f, "<closure {}>", closure.name()),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(Arc::from(s))
    }
}

/// One function of a `Defs` group, closed over the group's environment.
///
/// The group itself is not stored in `env`; it is re-materialised when the
/// closure is called, so recursive definitions never form reference cycles.
/// `scope` is the defining token's frame stack: exceptions raised in the body
/// that no handler inside the body catches continue into it.
#[derive(Debug)]
pub struct Closure {
    pub(crate) defs: Arc<[Def]>,
    pub(crate) index: usize,
    pub(crate) env: Env,
    pub(crate) scope: Stack,
}

impl Closure {
    /// The definition this closure calls.
    #[must_use]
    pub fn def(&self) -> &Def {
        &self.defs[self.index]
    }

    /// Name of the definition.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.def().name
    }

    /// Number of parameters.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.def().arity
    }
}
