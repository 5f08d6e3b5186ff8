//! Thread-safe code cache keyed by small integer ids.
//!
//! Spec.md §5: "a program can be running while an unrelated program is being
//! composed on another thread." Once a [`crate::program::GeneratedProgram`]
//! is materialized, an embedder that wants to look it up from more than one
//! thread (e.g. a recompilation path that replaces a stale entry while other
//! threads still call through the old one) needs somewhere thread-safe to
//! park it. This mirrors the teacher's `jit::runtime::code_cache` shape — a
//! `parking_lot::RwLock`-guarded map keyed by small integer ids — adapted to
//! hold [`GeneratedProgram`] handles instead of cranelift-produced ones.
//!
//! This is deliberately separate from [`crate::blueprint::registry`]'s
//! `Library`: the library is populated once and never mutated again, so it
//! needs no lock at all (`once_cell` suffices); the code cache is expected
//! to gain and lose entries over a process's lifetime as compositions come
//! and go, which does need one.

use crate::program::GeneratedProgram;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A thread-safe map from small integer id to a shared, reference-counted
/// [`GeneratedProgram`]. Readers never block other readers; inserting or
/// evicting an entry takes the write lock only for the duration of the map
/// mutation, not for any call through the cached program.
#[derive(Default)]
pub struct CodeCache {
    entries: RwLock<FxHashMap<u32, Arc<GeneratedProgram>>>,
}

impl CodeCache {
    pub fn new() -> Self {
        CodeCache {
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    /// Insert `program` under `id`, returning the previous occupant (if
    /// any) so the caller can decide when it's safe to drop — dropping a
    /// `GeneratedProgram` while its code is still executing on another
    /// thread is undefined (spec.md §5), so callers that recompile should
    /// keep the old `Arc` alive until they know no thread is inside it.
    pub fn insert(&self, id: u32, program: GeneratedProgram) -> Option<Arc<GeneratedProgram>> {
        self.entries.write().insert(id, Arc::new(program))
    }

    /// Look up a cached program, cloning the `Arc` so the caller can call
    /// through it without holding the cache's lock.
    pub fn get(&self, id: u32) -> Option<Arc<GeneratedProgram>> {
        self.entries.read().get(&id).cloned()
    }

    /// Remove and return the entry at `id`, if present.
    pub fn remove(&self, id: u32) -> Option<Arc<GeneratedProgram>> {
        self.entries.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{Blueprint, NO_LITC};
    use crate::composer::{Composer, CompositionConfig};

    static RET_ONLY: Blueprint = Blueprint {
        name: "ret_only",
        content: &[0xC3, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90],
        addr32_fixups: &[],
        sym32_fixups: &[],
        sym64_fixups: &[],
        jmp32_offsets: &[],
        jcc32_offsets: &[],
        highest_ordinal_bp_fn: 0,
        highest_ordinal_host_fn: 0,
        highest_ordinal_constant: 0,
        last_instruction_tail_call_ord: NO_LITC,
        used_mask_bp_fn: 0,
        used_mask_host_fn: 0,
        used_mask_constant: 0,
    };

    fn make_program() -> GeneratedProgram {
        let mut composer = Composer::new(CompositionConfig::default());
        let id = composer.instantiate(&RET_ONLY);
        composer.register_entry_point("main", id);
        composer.materialize().unwrap().unwrap()
    }

    #[test]
    fn insert_then_get_round_trips() {
        let cache = CodeCache::new();
        assert!(cache.is_empty());
        let prev = cache.insert(7, make_program());
        assert!(prev.is_none());
        assert_eq!(cache.len(), 1);
        let got = cache.get(7).expect("entry should be present");
        assert!(got.entry_addr("main").is_some());
    }

    #[test]
    fn missing_id_is_none() {
        let cache = CodeCache::new();
        assert!(cache.get(999).is_none());
    }

    #[test]
    fn remove_drops_from_cache_but_caller_keeps_it_alive() {
        let cache = CodeCache::new();
        cache.insert(1, make_program());
        let kept = cache.get(1).unwrap();
        let removed = cache.remove(1).unwrap();
        assert!(Arc::ptr_eq(&kept, &removed));
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn insert_replacing_an_id_returns_the_previous_entry() {
        let cache = CodeCache::new();
        cache.insert(1, make_program());
        let prev = cache.insert(1, make_program());
        assert!(prev.is_some(), "replacing an occupied id should hand back the old entry");
        assert_eq!(cache.len(), 1);
    }
}
