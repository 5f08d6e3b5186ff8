//! The boilerplate library: a read-only catalog of precompiled machine-code
//! fragments ("blueprints") plus the metadata needed to patch a copy of one
//! into an output image.
//!
//! Mirrors the shape of `CompiledCode`/`Relocation` in the teacher's
//! `jit/backend/traits.rs` — "here is a buffer of bytes plus a list of
//! places that need patching" — except nothing here was ever generated at
//! run time; every `Blueprint` is a precompiled, fixed fact handed in by the
//! (out-of-scope) offline builder.

pub mod registry;
pub mod table;

use std::fmt;

/// Which of the three disjoint placeholder namespaces an ordinal belongs to.
///
/// Spec.md DESIGN NOTES §9: "In a target language free of preprocessor
/// tricks, this becomes a single typed `Placeholder { kind, ordinal }`" —
/// this enum plus [`Placeholder`] is exactly that collapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceholderNamespace {
    /// Targets known to lie within ±2 GB; patched as signed 32-bit
    /// PC-relative direct call/jmp targets (small code model).
    BoilerplateFn,
    /// Arbitrary 64-bit addresses; patched via 64-bit absolute symbols.
    HostFn,
    /// Arbitrary primitive/pointer constants of ≤ 8 bytes. A 64-bit
    /// constant of value 0 is forbidden (see [`Blueprint::validate_constant`]).
    Constant,
}

/// A placeholder identifier: a namespace tag plus a small ordinal (≤ 63).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placeholder {
    pub namespace: PlaceholderNamespace,
    pub ordinal: u8,
}

impl Placeholder {
    pub const MAX_ORDINAL: u8 = 63;

    pub fn new(namespace: PlaceholderNamespace, ordinal: u8) -> Self {
        debug_assert!(
            ordinal <= Self::MAX_ORDINAL,
            "placeholder ordinal {ordinal} exceeds the 64-slot namespace"
        );
        Placeholder { namespace, ordinal }
    }
}

/// A fixup that subtracts this instance's own load address from a
/// PC-relative 32-bit self-reference at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addr32Fixup {
    pub offset: u32,
}

/// A fixup that adds a placeholder's runtime value (low 32 or all 64 bits)
/// to the value already present at `offset`.
///
/// `namespace` disambiguates which placeholder table `ordinal` indexes.
/// `sym32_fixups` only ever carry [`PlaceholderNamespace::BoilerplateFn`]
/// (a PC32 call/jmp relocation) or [`PlaceholderNamespace::Constant`]
/// (a 32-bit-sized constant load); `sym64_fixups` only ever carry
/// [`PlaceholderNamespace::HostFn`] or [`PlaceholderNamespace::Constant`] —
/// see spec.md §3's three disjoint namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymFixup {
    pub offset: u32,
    pub ordinal: u8,
    pub namespace: PlaceholderNamespace,
}

/// Sentinel meaning "this blueprint has no last-instruction tail call."
pub const NO_LITC: u8 = 0xFF;

/// The function/instruction alignment all blueprint content is padded to.
pub const FN_ALIGNMENT: usize = 16;
pub const FN_ALIGNMENT_LOG2: u8 = 4;
/// Largest alignment a blueprint may request (2^6 = 64 bytes).
pub const MAX_ALIGNMENT_LOG2: u8 = 6;

/// An immutable, precompiled machine-code fragment template.
///
/// See spec.md §3 "Blueprint (immutable)" for the full field-by-field
/// contract; this type is a direct transcription.
#[derive(Clone)]
pub struct Blueprint {
    /// Human-readable name, for diagnostics only (not part of the ABI).
    pub name: &'static str,
    /// Machine code, length a multiple of [`FN_ALIGNMENT`].
    pub content: &'static [u8],
    /// PC-relative 32-bit self-reference fixups.
    pub addr32_fixups: &'static [Addr32Fixup],
    /// 32-bit symbolic fixups (boilerplate-fn or constant placeholders).
    pub sym32_fixups: &'static [SymFixup],
    /// 64-bit symbolic fixups (host-fn or constant placeholders).
    pub sym64_fixups: &'static [SymFixup],
    /// Offsets of 32-bit unconditional branches eligible for 8-bit shortening.
    pub jmp32_offsets: &'static [u32],
    /// Offsets of 32-bit conditional branches eligible for 8-bit shortening.
    pub jcc32_offsets: &'static [u32],
    /// One past the highest boilerplate-fn placeholder ordinal used, or 0.
    pub highest_ordinal_bp_fn: u8,
    /// One past the highest host-fn placeholder ordinal used, or 0.
    pub highest_ordinal_host_fn: u8,
    /// One past the highest constant placeholder ordinal used, or 0.
    pub highest_ordinal_constant: u8,
    /// Ordinal of the boilerplate-fn placeholder the final instruction tail-
    /// calls through, or [`NO_LITC`] if the fragment ends with `ret`/other.
    pub last_instruction_tail_call_ord: u8,
    /// Bitmask (bit i set ⇒ ordinal i is used) for each namespace, used to
    /// assert every used placeholder of an instance gets populated.
    pub used_mask_bp_fn: u64,
    pub used_mask_host_fn: u64,
    pub used_mask_constant: u64,
}

impl fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blueprint")
            .field("name", &self.name)
            .field("code_size", &self.content.len())
            .field("litc", &self.last_instruction_tail_call_ord)
            .finish()
    }
}

impl Blueprint {
    pub fn code_size(&self) -> usize {
        self.content.len()
    }

    pub fn has_litc(&self) -> bool {
        self.last_instruction_tail_call_ord != NO_LITC
    }

    /// Per spec.md §3: a 64-bit constant of value 0 is forbidden — callers
    /// must specialize separately on is-zero to avoid collisions with
    /// "optimized-away" symbols. Checked whenever a caller populates a
    /// constant placeholder (see `Instance::populate_constant`).
    pub fn validate_constant(ordinal: u8, value: u64) {
        debug_assert!(
            value != 0,
            "constant placeholder #{ordinal} populated with forbidden value 0"
        );
    }

    pub fn used_mask(&self, namespace: PlaceholderNamespace) -> u64 {
        match namespace {
            PlaceholderNamespace::BoilerplateFn => self.used_mask_bp_fn,
            PlaceholderNamespace::HostFn => self.used_mask_host_fn,
            PlaceholderNamespace::Constant => self.used_mask_constant,
        }
    }

    pub fn highest_ordinal(&self, namespace: PlaceholderNamespace) -> u8 {
        match namespace {
            PlaceholderNamespace::BoilerplateFn => self.highest_ordinal_bp_fn,
            PlaceholderNamespace::HostFn => self.highest_ordinal_host_fn,
            PlaceholderNamespace::Constant => self.highest_ordinal_constant,
        }
    }

    pub fn is_used(&self, p: Placeholder) -> bool {
        (self.used_mask(p.namespace) >> p.ordinal) & 1 != 0
    }
}
