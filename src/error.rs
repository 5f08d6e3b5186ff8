//! Crate-wide error types.
//!
//! Per the error-handling design: resource exhaustion during materialization
//! is *not* one of these — it surfaces as `Option::None` from
//! [`crate::composer::Composer::materialize`], preserving the composition
//! for a retry. These types cover the boundaries that have a meaningful
//! recoverable outcome; invariant violations (double-populated placeholder,
//! selecting an impossible meta-tuple, a malformed LITC chain) are
//! `debug_assert!`/`assert!` failures, not `Result`s, matching the spec's
//! classification of them as programming errors.

use crate::meta::MetaTuple;
use std::fmt;

/// A template-kind identifier, opaque to the library beyond equality/hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateKind(pub u32);

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "template-kind#{}", self.0)
    }
}

/// Failure to find a blueprint for a given (kind, meta-tuple) pair.
#[derive(Debug, Clone, thiserror::Error)]
#[error("no blueprint specialized for {kind} with meta-tuple {meta:?}")]
pub struct SelectError {
    pub kind: TemplateKind,
    pub meta: MetaTuple,
}

/// Failure while laying out instances into the output code section.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LayoutError {
    /// The sum of instance sizes plus alignment padding would exceed the
    /// small-code-model bound (`spec.md` §3: "Code section total size ≤ 2 GB").
    #[error(
        "code section would be {actual} bytes, exceeding the {limit} byte small-code-model bound"
    )]
    CodeTooLarge { actual: u64, limit: u64 },
}

pub const SMALL_CODE_MODEL_LIMIT: u64 = 2 * 1024 * 1024 * 1024;
