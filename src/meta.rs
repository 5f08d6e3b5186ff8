//! Meta-variable taxonomy used to select a blueprint within a template kind.
//!
//! A boilerplate source declares a `cond<meta...>()` predicate (outside this
//! crate's scope — that's the offline builder's job) that accepts or rejects
//! a meta-tuple; the builder enumerates the Cartesian product of possible
//! values and keeps the accepted points. This module only needs to describe
//! the *closed set* those points are drawn from, and provide a stable hash
//! and equality so [`crate::blueprint::table::BlueprintTable`] can use tuples
//! as lookup keys.

use std::hash::{Hash, Hasher};

/// One of the primitive types a meta-variable can range over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimType {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Ptr,
    /// The "no value" variant, for placeholders that may be absent
    /// (e.g. an optional operand in a shape category).
    Absence,
}

/// A single value a meta-variable can take.
///
/// The three rows of spec.md §4.1's taxonomy table: `type`, `enum`, `bool`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetaValue {
    Type(PrimType),
    /// A finite closed-set choice: operator kind, operand-shape category,
    /// loop-body size category, etc. The `u16` is a small enumerant index
    /// assigned by whatever enum the front-end/builder pair agree on; this
    /// crate treats it opaquely.
    Enum(u16),
    Bool(bool),
}

/// An ordered tuple of meta-variable values selecting one specialization
/// within a template kind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetaTuple(pub Vec<MetaValue>);

impl MetaTuple {
    pub fn new(values: Vec<MetaValue>) -> Self {
        MetaTuple(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Hash for MetaTuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for v in &self.0 {
            v.hash(state);
        }
    }
}
