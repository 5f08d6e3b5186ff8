//! The materialized, executable result of a composition.
//!
//! Mirrors the teacher's `jit::runtime::code_cache`'s ownership model: one
//! handle owns a raw executable mapping and is responsible for releasing it.
//! Here the handle is [`GeneratedProgram`] rather than a cache entry, since
//! this engine has no persistent cache — each composition produces its own
//! independent mapping.

use rustc_hash::FxHashMap;

/// An executable mapping produced by [`crate::materializer::materialize`],
/// plus the dictionary from entry-point identifier to its offset within the
/// mapping.
///
/// Spec.md §5: "The executable mapping is owned exclusively by its
/// `GeneratedProgram` handle; destruction while code runs is undefined." The
/// caller is responsible for not dropping a program while a thread is
/// executing inside it.
pub struct GeneratedProgram {
    base: *mut u8,
    mapping_len: usize,
    entry_points: FxHashMap<String, u32>,
}

/// Moving a `GeneratedProgram` to another thread to invoke its code is the
/// whole point (spec.md §5: "a program can be running while an unrelated
/// program is being composed on another thread"). The mapping itself is
/// read-only executable memory after materialization; nothing here is
/// mutated post-construction.
unsafe impl Send for GeneratedProgram {}
unsafe impl Sync for GeneratedProgram {}

impl GeneratedProgram {
    /// # Safety
    /// `base` must point at a live `R+X` anonymous mapping of `mapping_len`
    /// bytes, allocated by [`crate::materializer::materialize`]; every value
    /// in `entry_points` must be `< mapping_len`.
    pub(crate) unsafe fn new(
        base: *mut u8,
        mapping_len: usize,
        entry_points: FxHashMap<String, u32>,
    ) -> Self {
        GeneratedProgram {
            base,
            mapping_len,
            entry_points,
        }
    }

    /// Absolute runtime address of a registered entry point, or `None` if
    /// `name` was never registered via `register_entry_point`.
    pub fn entry_addr(&self, name: &str) -> Option<*const u8> {
        self.entry_points
            .get(name)
            .map(|&offset| unsafe { self.base.add(offset as usize) as *const u8 })
    }

    pub fn base(&self) -> *const u8 {
        self.base as *const u8
    }

    pub fn mapping_len(&self) -> usize {
        self.mapping_len
    }
}

impl Drop for GeneratedProgram {
    fn drop(&mut self) {
        crate::materializer::release_mapping(self.base, self.mapping_len);
    }
}

impl std::fmt::Debug for GeneratedProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedProgram")
            .field("base", &self.base)
            .field("mapping_len", &self.mapping_len)
            .field("entry_points", &self.entry_points.len())
            .finish()
    }
}
