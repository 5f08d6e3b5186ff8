//! Stack-Frame Manager (spec.md §4.2).
//!
//! During composition, hands out offsets for local variables and spill
//! slots for temporaries that need to outlive a register-clobbering call.
//! Locals are a LIFO stack (`push_local`/`pop_local`); temporaries live in
//! pinned registers until `force_spill_all` commits them to frame slots.

use crate::meta::PrimType;
use crate::sizeclass;

fn prim_size(t: PrimType) -> u32 {
    match t {
        PrimType::I8 => 1,
        PrimType::I16 => 2,
        PrimType::I32 | PrimType::F32 => 4,
        PrimType::I64 | PrimType::F64 | PrimType::Ptr => 8,
        PrimType::Absence => 0,
    }
}

/// Slots all allocate at 8-byte granularity: the internal calling
/// convention's stack frame is a dense array of 8-byte words (spec.md §3),
/// so narrower types still consume a full slot.
const SLOT_SIZE: u32 = 8;

fn slots_for(t: PrimType) -> u32 {
    let size = prim_size(t).max(1);
    (size + SLOT_SIZE - 1) / SLOT_SIZE
}

/// A pinned-register temporary, tracked on the register stack until it is
/// either popped (no spill needed) or force-spilled to a frame slot.
#[derive(Debug, Clone, Copy)]
struct PinnedTemp {
    ty: PrimType,
    spill_slot: Option<u32>,
}

/// Offsets local variables and temporary spill slots within one composed
/// function's frame. One `FrameManager` exists per entry point under
/// construction; it is discarded once the frame's `final_size()` has been
/// read and baked into the entry instance.
#[derive(Debug, Default)]
pub struct FrameManager {
    /// Bump pointer for locals, in bytes past the argument area.
    local_top: u32,
    /// History of local allocations, so `pop_local` can restore `local_top`
    /// and verify the popped type matches what was pushed.
    local_stack: Vec<(PrimType, u32)>,
    /// Register stack of currently pinned temporaries, most-recent last.
    temp_stack: Vec<PinnedTemp>,
    /// High-water mark of bytes used for spill slots; grows only, like
    /// `local_top`, since spill slots are never reused once allocated by a
    /// `force_spill_all`.
    spill_top: u32,
    high_water: u32,
}

impl FrameManager {
    /// `base` is the byte offset the first local may occupy — past the
    /// return-value slot and the argument area (spec.md §3: offsets `0..7`
    /// hold the return value, `8..(8+8*nArgs)` hold arguments).
    pub fn new(arg_count: u32) -> Self {
        let base = 8 + 8 * arg_count;
        FrameManager {
            local_top: base,
            spill_top: base,
            high_water: base,
            ..Default::default()
        }
    }

    /// Bump-allocate an aligned slot for a local of `ty`. Returns the byte
    /// offset the caller may address it at.
    pub fn push_local(&mut self, ty: PrimType) -> u32 {
        let offset = self.local_top;
        self.local_stack.push((ty, offset));
        self.local_top += slots_for(ty) * SLOT_SIZE;
        self.spill_top = self.spill_top.max(self.local_top);
        self.high_water = self.high_water.max(self.local_top).max(self.spill_top);
        offset
    }

    /// Undo the most recent `push_local`. Panics if `ty` doesn't match what
    /// was pushed — per spec.md §8's round-trip law, `push_local(T);
    /// pop_local(T)` must leave the manager exactly as it was; a mismatched
    /// type means the caller's bookkeeping is already wrong.
    pub fn pop_local(&mut self, ty: PrimType) {
        let (pushed_ty, offset) = self
            .local_stack
            .pop()
            .expect("pop_local called with no matching push_local");
        assert_eq!(
            std::mem::discriminant(&pushed_ty),
            std::mem::discriminant(&ty),
            "pop_local type mismatch: pushed {pushed_ty:?}, popped {ty:?}"
        );
        self.local_top = offset;
    }

    /// Record that a value of `ty` now lives in a pinned register at the
    /// current depth.
    pub fn push_temp(&mut self, ty: PrimType) {
        self.temp_stack.push(PinnedTemp { ty, spill_slot: None });
    }

    /// Release the most recently pushed temp. If it's still at the top of
    /// the register stack and was never evicted by a `force_spill_all`,
    /// there's nothing to reclaim from the frame ("no spill"); otherwise
    /// returns the spill slot a prior `force_spill_all` assigned it.
    pub fn pop_temp(&mut self, ty: PrimType) -> Option<u32> {
        let temp = self
            .temp_stack
            .pop()
            .expect("pop_temp called with no matching push_temp");
        assert_eq!(
            std::mem::discriminant(&temp.ty),
            std::mem::discriminant(&ty),
            "pop_temp type mismatch: pushed {:?}, popped {ty:?}",
            temp.ty
        );
        temp.spill_slot
    }

    /// Commit every currently pinned temp to a freshly allocated frame slot.
    /// Called before any internal call that clobbers all pinned registers,
    /// since the internal calling convention has no callee-saved registers
    /// (spec.md §4.6).
    pub fn force_spill_all(&mut self) {
        for temp in self.temp_stack.iter_mut() {
            if temp.spill_slot.is_none() {
                let offset = self.spill_top;
                temp.spill_slot = Some(offset);
                self.spill_top += slots_for(temp.ty) * SLOT_SIZE;
                self.high_water = self.high_water.max(self.spill_top);
            }
        }
    }

    /// The frame's high-water mark, quantized to a size-class category per
    /// spec.md §3/§6.
    pub fn final_size(&self) -> (u32, u16) {
        sizeclass::quantize_generated(self.high_water)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_local_round_trips() {
        let mut fm = FrameManager::new(0);
        let before = fm.local_top;
        let off = fm.push_local(PrimType::I64);
        assert_eq!(off, before);
        fm.pop_local(PrimType::I64);
        assert_eq!(fm.local_top, before);
    }

    #[test]
    fn push_pop_temp_with_no_spill_returns_none() {
        let mut fm = FrameManager::new(0);
        fm.push_temp(PrimType::I32);
        assert_eq!(fm.pop_temp(PrimType::I32), None);
    }

    #[test]
    fn force_spill_all_assigns_slots_read_back_by_pop_temp() {
        let mut fm = FrameManager::new(0);
        fm.push_temp(PrimType::I64);
        fm.push_temp(PrimType::F64);
        fm.force_spill_all();
        let s2 = fm.pop_temp(PrimType::F64).expect("should be spilled");
        let s1 = fm.pop_temp(PrimType::I64).expect("should be spilled");
        assert_ne!(s1, s2);
    }

    #[test]
    fn locals_and_spills_both_advance_high_water_mark() {
        let mut fm = FrameManager::new(2); // base = 8 + 16 = 24
        assert_eq!(fm.local_top, 24);
        fm.push_local(PrimType::I64);
        fm.push_temp(PrimType::I64);
        fm.force_spill_all();
        let (size, _) = fm.final_size();
        assert!(size >= fm.high_water);
    }

    #[test]
    fn arg_area_is_reserved_before_first_local() {
        let mut fm = FrameManager::new(3); // return(8) + 3 args(24) = 32
        let off = fm.push_local(PrimType::I8);
        assert_eq!(off, 32);
    }

    #[test]
    #[should_panic]
    fn pop_local_type_mismatch_panics() {
        let mut fm = FrameManager::new(0);
        fm.push_local(PrimType::I32);
        fm.pop_local(PrimType::F64);
    }
}
