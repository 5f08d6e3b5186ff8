//! Snippet Combinator (spec.md §4.3).
//!
//! A snippet is `(entry, tail)`: `entry` is the instance execution enters
//! at, `tail` is the instance whose placeholder 0 is still open for
//! continuation. `append` glues two snippets by filling that placeholder,
//! yielding a new snippet whose tail is the appended snippet's tail.

use crate::instance::{Instance, InstanceId};

/// Ordinal of the boilerplate-fn placeholder every tail-eligible blueprint
/// reserves for "what runs next." Fixed at 0 by convention (spec.md §4.3:
/// "populates placeholder 0 of tail").
pub const CONTINUATION_ORDINAL: u8 = 0;

/// A composable sequence of instances with one open continuation point.
#[derive(Debug, Clone, Copy)]
pub struct Snippet {
    pub entry: InstanceId,
    /// `None` means this snippet cannot be continued — its last instruction
    /// is an unconditional return (spec.md §4.3's "tail of sentinel").
    pub tail: Option<InstanceId>,
}

impl Snippet {
    /// A snippet consisting of a single instance, open for continuation.
    pub fn single(instance: InstanceId) -> Self {
        Snippet {
            entry: instance,
            tail: Some(instance),
        }
    }

    /// A single instance whose last instruction is a `ret` — cannot be
    /// continued.
    pub fn terminal(instance: InstanceId) -> Self {
        Snippet {
            entry: instance,
            tail: None,
        }
    }

    /// Glue `next` onto the end of `self` by populating placeholder 0 of
    /// `self`'s tail with `next`'s entry. Returns the combined snippet,
    /// whose tail is `next`'s tail.
    ///
    /// `instances` indexes instances by [`InstanceId`]; panics if `self`
    /// has no open tail (per the contract: callers must check `tail.is_some()`
    /// before appending, same as the teacher's combinator chains check for a
    /// terminal node before extending it).
    pub fn append(self, next: Snippet, instances: &mut [Instance]) -> Snippet {
        let tail_id = self
            .tail
            .expect("cannot append to a snippet whose tail is sentinel (ends in `ret`)");
        instances[tail_id.0 as usize].populate_bp_fnptr(CONTINUATION_ORDINAL, next.entry);
        Snippet {
            entry: self.entry,
            tail: next.tail,
        }
    }
}
