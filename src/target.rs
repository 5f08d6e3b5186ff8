//! Host-architecture guard.
//!
//! Spec.md §1 Non-goals: "supporting architectures other than 64-bit
//! little-endian with signed 32-bit PC-relative branching." Every blueprint
//! fixup in this crate (`addr32_fixups`, `sym32_fixups`'s PC32 relocation,
//! the `jmp`/`jcc` rel32↔rel8 shortening in `materializer.rs`) bakes in that
//! assumption. `target_lexicon` gives a cheap, dependency-light way to
//! confirm the host the composer is actually running on matches it, the
//! same way a cross-compilation-aware teacher crate would gate a
//! backend on `Triple::host()` before trusting it.

use target_lexicon::{Architecture, Endianness, PointerWidth, Triple};

/// True if `triple` is a 64-bit little-endian architecture this crate's
/// relocation model supports. Only `x86_64` is exercised by the boundary
/// scenarios, but `aarch64`/`riscv64gc` share the bit-width and endianness
/// this check cares about — the PC-relative encoding details that do
/// differ per-ISA are out of scope here (spec.md §1's non-goals) and would
/// be a property of a future, architecture-specific blueprint set, not of
/// this guard.
pub fn is_supported(triple: &Triple) -> bool {
    triple.pointer_width() == Ok(PointerWidth::U64)
        && triple.endianness() == Ok(Endianness::Little)
        && !matches!(triple.architecture, Architecture::Unknown)
}

/// Assert the process is running on a supported host architecture.
///
/// Spec.md classifies "selecting a blueprint for an impossible meta-tuple"
/// and similar discipline failures as programming errors (§7); an
/// engine composing x86-64 PC-relative blueprints on, say, a big-endian
/// 32-bit host is the same class of mistake, just caught earlier. Checked
/// once per [`crate::composer::Composer::new`] call rather than at process
/// start, since this crate has no init-time hook of its own.
pub fn assert_host_supported() {
    let host = Triple::host();
    debug_assert!(
        is_supported(&host),
        "dynspec-engine's relocation model requires a 64-bit little-endian host; got {host}"
    );
}
