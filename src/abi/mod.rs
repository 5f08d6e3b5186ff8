//! ABI / Calling Convention (spec.md §4.6).
//!
//! Two conventions meet at exactly one boundary: an internal, register-heavy
//! "GHC-like" convention used for fragment-to-fragment calls within a
//! composition, and the host's native CDECL convention used to invoke an
//! exported entry point. This module only describes the internal
//! convention's register assignment as data — no prologue/epilogue code is
//! ever emitted here, since every byte of a composed program comes from a
//! blueprint (§4.1); these constants exist so [`crate::composer::Composer`]
//! can validate a fragment's opaque-parameter count against the registers
//! the convention actually provides.

pub mod fnptr;

pub use fnptr::{CallMode, FunctionPointer};

/// A general-purpose x86-64 register, named by its 64-bit form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

/// Registers available to the internal convention, in assignment order.
/// Spec.md §4.6: "no callee-saved registers: every register is free for the
/// callee" — so this list excludes only `Rsp` (the hardware stack pointer,
/// never reassigned) and reserves `Rbp` as the dedicated frame-base
/// register addressing the current stack frame (spec.md §3's "a
/// thread-local context holds `current_stack_frame_base`"). Every other
/// register is available for arguments, opaque-parameter pins, or scratch.
pub const INTERNAL_ARG_REGS: &[Reg] = &[
    Reg::Rdi,
    Reg::Rsi,
    Reg::Rdx,
    Reg::Rcx,
    Reg::R8,
    Reg::R9,
    Reg::Rax,
    Reg::Rbx,
    Reg::R10,
    Reg::R11,
    Reg::R12,
    Reg::R13,
    Reg::R14,
    Reg::R15,
]
;

/// Register dedicated to the current stack frame's base address. Never
/// handed out by [`INTERNAL_ARG_REGS`].
pub const FRAME_BASE_REG: Reg = Reg::Rbp;

/// Number of pinnable argument/opaque-parameter slots the internal
/// convention provides.
pub fn internal_register_budget() -> usize {
    INTERNAL_ARG_REGS.len()
}

/// True if `count` opaque parameters (plus regular arguments) can all be
/// register-pinned simultaneously under the internal convention, without
/// any needing an immediate frame spill.
pub fn fits_in_registers(count: usize) -> bool {
    count <= internal_register_budget()
}
