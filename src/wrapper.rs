//! External-Language Callable Wrapper (spec.md §4.8).
//!
//! Packages host-supplied arguments into a freshly allocated stack frame,
//! invokes the CDECL-boundary entry point, and surfaces a rethrown
//! exception when the generated function's `has_exception` flag comes back
//! set. A parallel, non-generated path delegates to an external tree-walk
//! interpreter when the callee's tagged function pointer says so.

use crate::abi::{CallMode, FunctionPointer};
use crate::exception;
use crate::sizeclass;
use std::error::Error;

/// External collaborator that can execute an AST node directly, for the
/// tree-walk-interpreter `CallMode` (spec.md §4.8's "parallel
/// argument-marshalling path"). This crate ships no implementation — the
/// AST front-end owns that — only the seam.
pub trait TreeWalkInterpreter {
    fn invoke(&self, ast_node: *const (), args: &[u64]) -> Result<u64, Box<dyn Error + Send>>;
}

/// A host-callable handle to one exported entry point.
pub struct CallableFn {
    entry: FunctionPointer,
    arg_count: u32,
    /// `None` for a non-throwing function; `Some(true)` reserved for
    /// forward compatibility with a richer exception ABI.
    throws: bool,
}

impl CallableFn {
    /// `entry` must be a [`CallMode::Generated`] or [`CallMode::Aot`]
    /// function pointer; use [`CallableFn::tree_walk`] to wrap a
    /// tree-walk payload instead.
    pub fn new(entry: FunctionPointer, arg_count: u32, throws: bool) -> Self {
        debug_assert!(!matches!(entry.mode(), CallMode::TreeWalk));
        CallableFn {
            entry,
            arg_count,
            throws,
        }
    }

    /// Invoke the entry point with `args`.
    ///
    /// Spec.md §4.8's invocation sequence:
    /// 1. allocate a properly sized stack frame (size from the tagged
    ///    pointer's category, or a minimal frame for AOT mode),
    /// 2. copy each argument to offset `8*(i+1)`,
    /// 3. call the CDECL trampoline with the frame pointer,
    /// 4. if `throws`, inspect `has_exception` and rethrow,
    /// 5. for non-void returns, read offset 0 as the return value.
    ///
    /// # Safety
    /// `self.entry`'s payload must point at a live, materialized,
    /// CDECL-callable entry point accepting a frame pointer in the first
    /// argument register and (if `throws`) returning a `has_exception` byte
    /// in the platform's scalar return register; `arg_count` must match
    /// what that entry point was composed to expect.
    pub unsafe fn call(&self, args: &[u64]) -> Result<u64, Box<dyn Error + Send>> {
        assert_eq!(
            args.len() as u32,
            self.arg_count,
            "CallableFn invoked with {} args, expected {}",
            args.len(),
            self.arg_count
        );
        debug_assert!(
            exception::outstanding_is_empty(),
            "outstanding exception slot not empty on wrapper entry"
        );

        let frame_size = match self.entry.mode() {
            CallMode::Generated => sizeclass::size_for_category(self.entry.category()),
            CallMode::Aot => 8 + 8 * self.arg_count,
            CallMode::TreeWalk => unreachable!("tree-walk entries use CallableFn::tree_walk"),
        };
        let mut frame = vec![0u8; frame_size as usize];
        for (i, &arg) in args.iter().enumerate() {
            let off = 8 * (i + 1);
            frame[off..off + 8].copy_from_slice(&arg.to_le_bytes());
        }
        let frame_ptr = frame.as_mut_ptr();

        let has_exception = if self.throws {
            let trampoline: unsafe extern "C" fn(*mut u8) -> u8 =
                std::mem::transmute(self.entry.payload());
            trampoline(frame_ptr) != 0
        } else {
            let trampoline: unsafe extern "C" fn(*mut u8) = std::mem::transmute(self.entry.payload());
            trampoline(frame_ptr);
            false
        };

        if has_exception {
            let exc = exception::take_outstanding()
                .expect("has_exception was set but no outstanding exception was stored");
            debug_assert!(exception::outstanding_is_empty());
            return Err(exc);
        }

        debug_assert!(exception::outstanding_is_empty());
        Ok(u64::from_le_bytes(frame[0..8].try_into().unwrap()))
    }
}

/// A callable backed by the tree-walk interpreter rather than generated
/// code (spec.md §4.8, `CallMode::TreeWalk`).
pub struct TreeWalkCallable<'a> {
    node: *const (),
    interpreter: &'a dyn TreeWalkInterpreter,
}

impl<'a> TreeWalkCallable<'a> {
    pub fn new(entry: FunctionPointer, interpreter: &'a dyn TreeWalkInterpreter) -> Self {
        assert_eq!(entry.mode(), CallMode::TreeWalk);
        TreeWalkCallable {
            node: entry.payload(),
            interpreter,
        }
    }

    pub fn call(&self, args: &[u64]) -> Result<u64, Box<dyn Error + Send>> {
        self.interpreter.invoke(self.node, args)
    }
}
