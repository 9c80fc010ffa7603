//! Lexical environments.
//!
//! An environment is an immutable cons-list of bindings addressed by de
//! Bruijn index (0 is the innermost binding). Extending never mutates: forked
//! tokens share every binding they had in common at the fork.

use crate::record::FutureCell;
use crate::types::Value;
use core::fmt;
use std::sync::Arc;

/// One environment entry.
#[derive(Clone, Debug)]
pub enum Binding {
    /// An immediately available value.
    Value(Value),
    /// A future that may still be unbound (bound by a pruning).
    Future(Arc<FutureCell>),
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

struct EnvNode {
    binding: Binding,
    next: Option<Arc<EnvNode>>,
}

/// A persistent lexical environment.
#[derive(Clone, Default)]
pub struct Env {
    head: Option<Arc<EnvNode>>,
    len: usize,
}

impl Env {
    /// The empty environment.
    #[must_use]
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// Builds an environment from values, the last one innermost.
    #[must_use]
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        values
            .into_iter()
            .fold(Self::new(), |env, value| env.extend(Binding::Value(value)))
    }

    /// Returns a new environment with `binding` at index 0.
    #[must_use]
    pub fn extend(&self, binding: Binding) -> Self {
        Self {
            head: Some(Arc::new(EnvNode {
                binding,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    /// Shorthand for extending with an immediate value.
    #[must_use]
    pub fn extend_value(&self, value: Value) -> Self {
        self.extend(Binding::Value(value))
    }

    /// Looks up the binding at de Bruijn `index`.
    #[must_use]
    pub fn lookup(&self, index: usize) -> Option<&Binding> {
        self.iter().nth(index)
    }

    /// Number of bindings.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the environment has no bindings.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates from the innermost binding outwards.
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        let mut cursor = self.head.as_deref();
        std::iter::from_fn(move || {
            let node = cursor?;
            cursor = node.next.as_deref();
            Some(&node.binding)
        })
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl Drop for Env {
    // Unlink uniquely owned nodes iteratively so long chains do not recurse.
    fn drop(&mut self) {
        let mut next = self.head.take();
        while let Some(node) = next {
            match Arc::try_unwrap(node) {
                Ok(mut node) => next = node.next.take(),
                Err(_) => break,
            }
        }
    }
}
