//! Tagged 64-bit function pointer (spec.md §3, §6).
//!
//! The universal callable value passed between the interpreter and
//! generated code: a 2-bit mode tag, a 1-bit `is_noexcept` flag, a 13-bit
//! stack-frame size category, and a 48-bit payload pointer (x86-64's
//! canonical address range fits comfortably in 48 bits).

use crate::sizeclass::MAX_CATEGORY;

const MODE_SHIFT: u32 = 62;
const NOEXCEPT_SHIFT: u32 = 61;
const CATEGORY_SHIFT: u32 = 48;
const CATEGORY_BITS: u32 = 13;
const CATEGORY_MASK: u64 = (1u64 << CATEGORY_BITS) - 1;
const PAYLOAD_MASK: u64 = (1u64 << 48) - 1;

/// Which of the three execution strategies a [`FunctionPointer`] dispatches
/// to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Ahead-of-time compiled code outside this engine's purview.
    Aot = 0,
    /// Composed by this engine via copy-and-patch.
    Generated = 1,
    /// Payload points at an AST node; dispatch falls back to the external
    /// tree-walk interpreter (spec.md §4.8).
    TreeWalk = 2,
}

impl CallMode {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0 => CallMode::Aot,
            1 => CallMode::Generated,
            2 => CallMode::TreeWalk,
            other => panic!("invalid function-pointer mode tag {other}"),
        }
    }
}

/// A packed 64-bit control word. Copy, so it can be passed by value the way
/// a raw function pointer would be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionPointer(u64);

impl FunctionPointer {
    /// Pack an AOT function pointer. No `is_noexcept`/category fields apply.
    pub fn aot(payload: *const ()) -> Self {
        Self::pack(CallMode::Aot, false, 0, payload)
    }

    /// Pack a generated-mode function pointer.
    ///
    /// # Panics
    /// Panics if `category` is 0 — spec.md §6: "Mode 1 requires
    /// `1 ≤ category ≤ num_categories−1`"; category 0 is reserved for modes
    /// that don't carry a generated stack frame.
    pub fn generated(payload: *const (), is_noexcept: bool, category: u16) -> Self {
        assert!(
            category >= 1 && category <= MAX_CATEGORY,
            "generated function pointer category {category} out of range [1, {MAX_CATEGORY}]"
        );
        Self::pack(CallMode::Generated, is_noexcept, category, payload)
    }

    /// Pack a tree-walk-interpreter function pointer; payload points at the
    /// AST node to interpret.
    pub fn tree_walk(ast_node: *const ()) -> Self {
        Self::pack(CallMode::TreeWalk, false, 0, ast_node)
    }

    fn pack(mode: CallMode, is_noexcept: bool, category: u16, payload: *const ()) -> Self {
        let payload_bits = payload as u64 & PAYLOAD_MASK;
        debug_assert_eq!(
            payload_bits, payload as u64,
            "payload pointer {:p} doesn't fit in 48 bits",
            payload
        );
        let mut word = (mode as u64) << MODE_SHIFT;
        if is_noexcept {
            word |= 1 << NOEXCEPT_SHIFT;
        }
        word |= (category as u64 & CATEGORY_MASK) << CATEGORY_SHIFT;
        word |= payload_bits;
        FunctionPointer(word)
    }

    pub fn mode(self) -> CallMode {
        CallMode::from_bits((self.0 >> MODE_SHIFT) & 0b11)
    }

    pub fn is_noexcept(self) -> bool {
        (self.0 >> NOEXCEPT_SHIFT) & 1 != 0
    }

    pub fn category(self) -> u16 {
        ((self.0 >> CATEGORY_SHIFT) & CATEGORY_MASK) as u16
    }

    pub fn payload(self) -> *const () {
        (self.0 & PAYLOAD_MASK) as *const ()
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_round_trips_fields() {
        let payload = 0x7f00_1234_5678usize as *const ();
        let fp = FunctionPointer::generated(payload, true, 42);
        assert_eq!(fp.mode(), CallMode::Generated);
        assert!(fp.is_noexcept());
        assert_eq!(fp.category(), 42);
        assert_eq!(fp.payload(), payload);
    }

    #[test]
    fn aot_mode_carries_no_category_or_noexcept() {
        let payload = 0x1000usize as *const ();
        let fp = FunctionPointer::aot(payload);
        assert_eq!(fp.mode(), CallMode::Aot);
        assert!(!fp.is_noexcept());
        assert_eq!(fp.category(), 0);
        assert_eq!(fp.payload(), payload);
    }

    #[test]
    fn tree_walk_mode_round_trips_ast_payload() {
        let node = 0xdead_beefusize as *const ();
        let fp = FunctionPointer::tree_walk(node);
        assert_eq!(fp.mode(), CallMode::TreeWalk);
        assert_eq!(fp.payload(), node);
    }

    #[test]
    #[should_panic]
    fn generated_category_zero_is_rejected() {
        FunctionPointer::generated(std::ptr::null(), false, 0);
    }
}
