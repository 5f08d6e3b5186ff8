//! A realization of a blueprint within one composition.
//!
//! Spec.md §3 "Instance (mutable during composition, immutable after
//! materialization)". Mirrors the two-phase lifecycle the teacher expresses
//! as two separate types (`CompiledCode` → `ExecutableCode` in
//! `jit/backend/traits.rs`); here it's one type with layout fields that
//! start unset and get filled in by [`crate::layout`].

use crate::blueprint::{Blueprint, Placeholder, PlaceholderNamespace, NO_LITC};

/// Index of an [`Instance`] within a [`crate::composer::Composer`]'s
/// instance table. Stable for the lifetime of the composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

/// What a boilerplate-function placeholder's fixup table slot holds before
/// layout has assigned every instance an address.
#[derive(Debug, Clone, Copy)]
pub enum FixupValue {
    /// Not yet populated.
    Unset,
    /// A boilerplate-fn placeholder pointing at another instance — resolved
    /// to an absolute address only once that instance has a
    /// [`Instance::relative_addr`] (i.e. after layout).
    InstanceRef(InstanceId),
    /// A literal value: for host-fn placeholders, an absolute 64-bit
    /// address; for constant placeholders, the constant itself.
    Literal(u64),
}

/// One use of a [`Blueprint`] within a composition.
pub struct Instance {
    pub id: InstanceId,
    pub blueprint: &'static Blueprint,

    /// Fixup table, length `highest_ordinal_bp_fn + highest_ordinal_host_fn
    /// + highest_ordinal_constant`, indexed by `(namespace, ordinal)` via
    /// [`Instance::fixup_index`].
    fixups: Vec<FixupValue>,

    // --- layout fields, populated by crate::layout ---
    pub relative_addr: Option<u32>,
    pub padding_required: u32,
    pub log2_alignment: u8,

    /// Ordinal of the instance chosen as this instance's LITC successor,
    /// i.e. the target of `blueprint.last_instruction_tail_call_ord`, once
    /// the composer has populated that placeholder.
    pub litc_next: Option<InstanceId>,
    /// Set when some predecessor selected this instance as *its* LITC
    /// successor.
    pub is_continuation_of_another: bool,
    /// Set during layout when the predecessor will place this instance
    /// immediately after itself, allowing the trailing tail-call to be
    /// stripped at materialization.
    pub should_strip_litc: bool,
}

impl Instance {
    pub fn new(id: InstanceId, blueprint: &'static Blueprint) -> Self {
        let n = blueprint.highest_ordinal_bp_fn as usize
            + blueprint.highest_ordinal_host_fn as usize
            + blueprint.highest_ordinal_constant as usize;
        Instance {
            id,
            blueprint,
            fixups: vec![FixupValue::Unset; n],
            relative_addr: None,
            padding_required: 0,
            log2_alignment: crate::blueprint::FN_ALIGNMENT_LOG2,
            litc_next: None,
            is_continuation_of_another: false,
            should_strip_litc: false,
        }
    }

    fn namespace_base(&self, namespace: PlaceholderNamespace) -> usize {
        match namespace {
            PlaceholderNamespace::BoilerplateFn => 0,
            PlaceholderNamespace::HostFn => self.blueprint.highest_ordinal_bp_fn as usize,
            PlaceholderNamespace::Constant => {
                self.blueprint.highest_ordinal_bp_fn as usize
                    + self.blueprint.highest_ordinal_host_fn as usize
            }
        }
    }

    fn fixup_index(&self, p: Placeholder) -> usize {
        self.namespace_base(p.namespace) + p.ordinal as usize
    }

    /// Populate a boilerplate-function placeholder with a reference to
    /// another instance in the same composition. Populating an already-
    /// populated placeholder, or one the blueprint doesn't mark as used, is
    /// a programming error (spec.md §3 invariants) — `debug_assert!`s below
    /// catch it in debug builds; release builds silently overwrite, which
    /// is no worse than the invariant being violated elsewhere.
    pub fn populate_bp_fnptr(&mut self, ordinal: u8, target: InstanceId) {
        let p = Placeholder::new(PlaceholderNamespace::BoilerplateFn, ordinal);
        self.assert_placeholder_populatable(p);
        let idx = self.fixup_index(p);
        self.fixups[idx] = FixupValue::InstanceRef(target);
        if self.blueprint.last_instruction_tail_call_ord == ordinal {
            self.litc_next = Some(target);
        }
    }

    /// Populate a host-C++-function placeholder with an absolute address.
    pub fn populate_cpp_fnptr(&mut self, ordinal: u8, host_addr: u64) {
        let p = Placeholder::new(PlaceholderNamespace::HostFn, ordinal);
        self.assert_placeholder_populatable(p);
        let idx = self.fixup_index(p);
        self.fixups[idx] = FixupValue::Literal(host_addr);
    }

    /// Populate a constant placeholder. Per spec.md §3, a 64-bit constant of
    /// value 0 is forbidden (callers must specialize on is-zero separately);
    /// constants not marked used by the blueprint are silently dropped, to
    /// tolerate dead-code elimination on the boilerplate side.
    pub fn populate_constant(&mut self, ordinal: u8, value: u64) {
        let p = Placeholder::new(PlaceholderNamespace::Constant, ordinal);
        if !self.blueprint.is_used(p) {
            return; // tolerated: boilerplate optimized this placeholder away
        }
        Blueprint::validate_constant(ordinal, value);
        let idx = self.fixup_index(p);
        debug_assert!(
            matches!(self.fixups[idx], FixupValue::Unset),
            "constant placeholder #{ordinal} populated twice"
        );
        self.fixups[idx] = FixupValue::Literal(value);
    }

    fn assert_placeholder_populatable(&self, p: Placeholder) {
        debug_assert!(
            self.blueprint.is_used(p),
            "placeholder {:?}#{} not marked used by blueprint {}",
            p.namespace,
            p.ordinal,
            self.blueprint.name
        );
        let idx = self.fixup_index(p);
        debug_assert!(
            matches!(self.fixups[idx], FixupValue::Unset),
            "placeholder {:?}#{} of blueprint {} populated twice",
            p.namespace,
            p.ordinal,
            self.blueprint.name
        );
    }

    /// True once every placeholder the blueprint marks as used has a
    /// non-`Unset` fixup value — the precondition for materialization
    /// (spec.md §3 invariants, §8 testable property).
    pub fn fully_populated(&self) -> bool {
        for namespace in [
            PlaceholderNamespace::BoilerplateFn,
            PlaceholderNamespace::HostFn,
            PlaceholderNamespace::Constant,
        ] {
            let highest = self.blueprint.highest_ordinal(namespace);
            for ordinal in 0..highest {
                let p = Placeholder::new(namespace, ordinal);
                if self.blueprint.is_used(p) {
                    let idx = self.fixup_index(p);
                    if matches!(self.fixups[idx], FixupValue::Unset) {
                        return false;
                    }
                }
            }
        }
        true
    }

    pub fn fixup_value(&self, p: Placeholder) -> FixupValue {
        self.fixups[self.fixup_index(p)]
    }

    pub fn code_size(&self) -> u32 {
        self.blueprint.code_size() as u32
    }

    pub fn has_litc(&self) -> bool {
        self.blueprint.has_litc()
    }

    pub fn litc_ordinal(&self) -> Option<u8> {
        if self.blueprint.last_instruction_tail_call_ord == NO_LITC {
            None
        } else {
            Some(self.blueprint.last_instruction_tail_call_ord)
        }
    }
}
