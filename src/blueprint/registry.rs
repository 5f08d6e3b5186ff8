//! Process-global, read-only boilerplate library.
//!
//! Spec.md §5: "The boilerplate library is process-global, read-only after
//! initialization, freely shared." Population is the (out-of-scope) offline
//! builder's job in the real system; here it's whatever implements
//! [`BlueprintSource`] for a given embedding (production blueprint sets, or
//! the hand-built fixtures the boundary-scenario tests register).

use crate::blueprint::table::BlueprintTable;
use crate::blueprint::Blueprint;
use crate::error::{SelectError, TemplateKind};
use crate::meta::MetaTuple;
use once_cell::sync::OnceCell;

/// Supplies the (kind, meta-tuple) → blueprint entries that populate a
/// [`Library`]. Exists purely as a seam: this crate ships no production
/// implementation (that's the offline builder, out of scope per spec.md
/// §1), only the trait and whatever fixtures tests need.
pub trait BlueprintSource {
    fn entries(&self) -> Vec<(TemplateKind, MetaTuple, &'static Blueprint)>;
}

/// The read-only, process-global catalog of blueprints.
pub struct Library {
    table: BlueprintTable<(TemplateKind, MetaTuple), &'static Blueprint>,
}

impl Library {
    fn build(source: &dyn BlueprintSource) -> Self {
        Library {
            table: BlueprintTable::build(
                source
                    .entries()
                    .into_iter()
                    .map(|(kind, meta, bp)| ((kind, meta), bp))
                    .collect(),
            ),
        }
    }

    /// `select(kind, meta_tuple) → Blueprint` from spec.md §4.1. Selecting
    /// an unmaterialized tuple is documented as a programming error; this
    /// crate surfaces it as `Result` anyway (see `SPEC_FULL.md` §4.1) so
    /// tests and debug builds can assert on it without aborting.
    pub fn select(&self, kind: TemplateKind, meta: &MetaTuple) -> Result<&'static Blueprint, SelectError> {
        self.table
            .get(&(kind, meta.clone()))
            .copied()
            .ok_or_else(|| SelectError {
                kind,
                meta: meta.clone(),
            })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

static GLOBAL: OnceCell<Library> = OnceCell::new();

/// Initialize the process-global library from `source`. Calling this more
/// than once (even with an equivalent source) is a programming error: the
/// library is meant to be built exactly once, at process start or on first
/// use by an embedder that controls its own startup sequence.
pub fn init_global(source: &dyn BlueprintSource) {
    let library = Library::build(source);
    GLOBAL
        .set(library)
        .unwrap_or_else(|_| panic!("dynspec-engine: blueprint library already initialized"));
}

/// Access the process-global library. Panics if [`init_global`] has not
/// been called — there is no sensible default catalog to fall back to.
pub fn global() -> &'static Library {
    GLOBAL
        .get()
        .expect("dynspec-engine: blueprint library accessed before init_global()")
}
