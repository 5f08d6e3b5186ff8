//! Exception Emulation (spec.md §4.7).
//!
//! Copied-then-relocated code carries no valid unwind tables, so C++-style
//! exceptions thrown from a host callback are emulated with `setjmp`/
//! `longjmp`-style checkpoints instead of the system unwinder. A throwing
//! generated function pushes a checkpoint on entry; a throw from host code
//! stashes the exception in a thread-local slot and jumps back to the
//! nearest checkpoint; the host wrapper (`src/wrapper.rs`) observes
//! `has_exception` on return and rethrows from that slot.

use std::cell::RefCell;

/// Opaque non-local-jump buffer. Sized generously for the platform libc's
/// `jmp_buf` (glibc's `__jmp_buf_tag` is 200 bytes on x86-64; other libcs
/// are smaller), 16-byte aligned to satisfy SSE register save slots some
/// implementations tuck inside it.
#[repr(C, align(16))]
#[derive(Clone, Copy)]
pub struct JmpBuf([u8; 512]);

impl JmpBuf {
    fn zeroed() -> Self {
        JmpBuf([0u8; 512])
    }
}

extern "C" {
    #[cfg_attr(unix, link_name = "setjmp")]
    #[cfg_attr(windows, link_name = "_setjmp")]
    fn dynspec_setjmp(env: *mut JmpBuf) -> i32;
    #[cfg_attr(unix, link_name = "longjmp")]
    #[cfg_attr(windows, link_name = "longjmp")]
    fn dynspec_longjmp(env: *mut JmpBuf, val: i32) -> !;
}

/// One saved checkpoint, chained to whatever checkpoint was active before
/// it (spec.md §4.7: "the previous checkpoint is chained").
struct Checkpoint {
    buf: JmpBuf,
}

thread_local! {
    static CHECKPOINTS: RefCell<Vec<Checkpoint>> = RefCell::new(Vec::new());
    static OUTSTANDING_EXCEPTION: RefCell<Option<Box<dyn std::error::Error + Send>>> = RefCell::new(None);
}

/// Push a new checkpoint and return to the caller with `0`. If a later
/// [`throw`] unwinds back to this checkpoint, this same call site returns
/// again with a nonzero value — mirroring `setjmp`'s two-return contract.
///
/// # Safety
/// Must only be called from the prologue of a generated `throws` function,
/// immediately before that function's body runs; the returned checkpoint
/// must be popped via [`pop_checkpoint`] before the function returns
/// normally.
pub unsafe fn push_checkpoint() -> (usize, i32) {
    let mut cp = Checkpoint {
        buf: JmpBuf::zeroed(),
    };
    let rc = dynspec_setjmp(&mut cp.buf as *mut JmpBuf);
    let depth = CHECKPOINTS.with(|stack| {
        let mut stack = stack.borrow_mut();
        if rc == 0 {
            stack.push(cp);
        }
        stack.len().saturating_sub(1)
    });
    (depth, rc)
}

/// Pop the checkpoint pushed by the matching [`push_checkpoint`], on normal
/// (non-exceptional) return.
pub fn pop_checkpoint() {
    CHECKPOINTS.with(|stack| {
        stack.borrow_mut().pop();
    });
}

/// Store `exception` in the thread-local outstanding-exception slot and
/// jump back to the nearest checkpoint. Called from the CDECL boundary
/// fragment that catches a C++ exception thrown by a host callback
/// (spec.md §4.7).
///
/// # Panics
/// Panics if no checkpoint is active — per spec.md §4.7 this can only
/// happen inside a `throws` function's body, which always has one.
///
/// # Safety
/// Never returns; control transfers to the matching `push_checkpoint` call
/// site via `longjmp`. Any Rust stack frames between the throw site and
/// that call site are unwound without running their destructors, exactly
/// like the C setjmp/longjmp it wraps.
pub unsafe fn throw(exception: Box<dyn std::error::Error + Send>) -> ! {
    OUTSTANDING_EXCEPTION.with(|slot| {
        *slot.borrow_mut() = Some(exception);
    });
    let mut buf = CHECKPOINTS.with(|stack| {
        stack
            .borrow()
            .last()
            .map(|cp| cp.buf)
            .expect("throw() called with no active exception checkpoint")
    });
    dynspec_longjmp(&mut buf as *mut JmpBuf, 1)
}

/// Take the outstanding exception, clearing the slot. The host wrapper
/// calls this after observing `has_exception == true` on a throwing
/// function's return (spec.md §4.7's "contract to callers").
pub fn take_outstanding() -> Option<Box<dyn std::error::Error + Send>> {
    OUTSTANDING_EXCEPTION.with(|slot| slot.borrow_mut().take())
}

/// Asserted true on entry and exit of every host wrapper call (spec.md
/// §4.7: "the thread slot is asserted empty on entry and exit of every host
/// wrapper call").
pub fn outstanding_is_empty() -> bool {
    OUTSTANDING_EXCEPTION.with(|slot| slot.borrow().is_none())
}
