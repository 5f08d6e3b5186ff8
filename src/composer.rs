//! The public composition API (spec.md §6's "Collaborator: AST front-end"
//! contract).
//!
//! A `Composer` is the single-threaded, strictly sequential object an AST
//! front-end drives: instantiate blueprints, wire their placeholders to
//! each other and to host callbacks/constants, register entry points, then
//! materialize the whole thing into one executable mapping.

use crate::blueprint::Blueprint;
use crate::error::LayoutError;
use crate::instance::{Instance, InstanceId};
use crate::layout;
use crate::materializer;
use crate::program::GeneratedProgram;

/// In-process knobs for one composition. Follows the teacher's
/// `JitConfig`/`PrewarmConfig` shape: a plain struct with `Default`, no
/// file or environment parsing — there is no config *file* format to
/// design (spec.md §1's non-goals exclude that), but the in-process knobs
/// a library needs are still a struct, not hardcoded constants.
#[derive(Debug, Clone)]
pub struct CompositionConfig {
    /// Override the OS-reported page size for the executable mapping.
    /// `None` queries the platform at materialization time.
    pub page_size_override: Option<usize>,
    /// Reserve capacity in the instance table up front, to avoid
    /// reallocation churn for large compositions (e.g. a sizeable AST).
    pub initial_capacity_hint: usize,
    /// Whether the materializer attempts `jmp rel32 → rel8` / `jcc rel32 →
    /// rel8` shortening. Disabling this is mainly useful for tests that
    /// want byte-for-byte predictable offsets.
    pub attempt_jump_shortening: bool,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        CompositionConfig {
            page_size_override: None,
            initial_capacity_hint: 64,
            attempt_jump_shortening: true,
        }
    }
}

/// Drives one composition from instantiation through materialization.
pub struct Composer {
    config: CompositionConfig,
    instances: Vec<Instance>,
    entry_points: Vec<(String, usize)>,
}

impl Composer {
    pub fn new(config: CompositionConfig) -> Self {
        crate::target::assert_host_supported();
        Composer {
            instances: Vec::with_capacity(config.initial_capacity_hint),
            entry_points: Vec::new(),
            config,
        }
    }

    /// Create a new instance of `blueprint`, returning the id the caller
    /// uses to address it in subsequent `populate_*`/`register_entry_point`
    /// calls.
    pub fn instantiate(&mut self, blueprint: &'static Blueprint) -> InstanceId {
        let id = InstanceId(self.instances.len() as u32);
        self.instances.push(Instance::new(id, blueprint));
        id
    }

    fn instance_mut(&mut self, id: InstanceId) -> &mut Instance {
        &mut self.instances[id.0 as usize]
    }

    pub fn populate_bp_fnptr(&mut self, instance: InstanceId, ordinal: u8, target: InstanceId) {
        self.instance_mut(instance).populate_bp_fnptr(ordinal, target);
    }

    pub fn populate_cpp_fnptr(&mut self, instance: InstanceId, ordinal: u8, host_addr: u64) {
        self.instance_mut(instance).populate_cpp_fnptr(ordinal, host_addr);
    }

    pub fn populate_constant(&mut self, instance: InstanceId, ordinal: u8, value: u64) {
        self.instance_mut(instance).populate_constant(ordinal, value);
    }

    /// Expose `entry` under `name` in the eventual [`GeneratedProgram`].
    pub fn register_entry_point(&mut self, name: impl Into<String>, entry: InstanceId) {
        self.entry_points.push((name.into(), entry.0 as usize));
    }

    /// Lay out and materialize every instance registered so far.
    ///
    /// Returns `Ok(None)` on resource exhaustion (mmap/mprotect failure —
    /// spec.md §7: the composition itself is preserved and this call may be
    /// retried). Returns `Err` only for the code-size-overflow invariant
    /// (spec.md §4.6's ≤2GB code section), which a retry cannot fix.
    pub fn materialize(mut self) -> Result<Option<GeneratedProgram>, LayoutError> {
        debug_assert!(
            self.instances.iter().all(Instance::fully_populated),
            "materialize() called with an instance missing a required placeholder"
        );
        let code_section_length = layout::layout(&mut self.instances)?;
        Ok(materializer::materialize(
            &self.instances,
            code_section_length,
            &self.entry_points,
            self.config.page_size_override,
            self.config.attempt_jump_shortening,
        ))
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::NO_LITC;

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

    #[test]
    fn instantiate_then_materialize_single_instance_round_trips() {
        let mut composer = Composer::new(CompositionConfig::default());
        let id = composer.instantiate(&RET_ONLY);
        composer.register_entry_point("main", id);
        let program = composer
            .materialize()
            .expect("layout should succeed")
            .expect("materialization should succeed under test");
        let addr = program.entry_addr("main").unwrap();
        unsafe {
            assert_eq!(*addr, 0xC3);
        }
    }

    #[test]
    fn instance_count_reflects_instantiate_calls() {
        let mut composer = Composer::new(CompositionConfig::default());
        composer.instantiate(&RET_ONLY);
        composer.instantiate(&RET_ONLY);
        assert_eq!(composer.instance_count(), 2);
    }
}
