//! Code-Layout Engine (spec.md §4.4).
//!
//! Assigns every instance a relative address within the output code
//! section, greedily chaining LITC (last-instruction-tail-call) successors
//! so the trailing jump can be stripped at materialization when the
//! successor lands immediately afterward.

use crate::blueprint::FN_ALIGNMENT_LOG2;
use crate::error::{LayoutError, SMALL_CODE_MODEL_LIMIT};
use crate::instance::{Instance, InstanceId};

/// Length in bytes of a `jmp rel32` instruction (`E9` + 4-byte displacement).
pub const JMP_REL32_LEN: u32 = 5;

fn align_up(value: u32, log2_align: u8) -> u32 {
    let align = 1u32 << log2_align;
    (value + align - 1) & !(align - 1)
}

/// Whether `inst`'s trailing LITC jump is a plain `jmp rel32` occupying the
/// final [`JMP_REL32_LEN`] bytes of its content — the only shape layout will
/// strip. Per `DESIGN.md`'s resolution of spec.md §9's open question: any
/// other shape (e.g. the tail call isn't literally the last instruction, or
/// isn't a listed `jmp32` site) degrades gracefully — the successor is still
/// placed contiguously, but the jump is left intact for the materializer's
/// ordinary rel32→rel8 shortening pass to handle instead.
fn can_strip(inst: &Instance) -> bool {
    if !inst.has_litc() {
        return false;
    }
    let code_size = inst.code_size();
    inst.blueprint
        .jmp32_offsets
        .iter()
        .any(|&off| off + JMP_REL32_LEN == code_size)
}

/// Walk the LITC chain rooted at `head`, placing each unplaced successor
/// immediately after its predecessor. Stops when the chain terminates (no
/// `litc_next`) or loops back onto an already-placed instance (a cycle).
fn place_chain(head: InstanceId, instances: &mut [Instance], cursor: &mut u32) {
    let align = FN_ALIGNMENT_LOG2;
    let aligned = align_up(*cursor, align);
    {
        let h = &mut instances[head.0 as usize];
        h.relative_addr = Some(aligned);
        h.padding_required = aligned - *cursor;
        h.log2_alignment = align;
    }

    let mut cur = head;
    let end;
    loop {
        let cur_addr = instances[cur.0 as usize].relative_addr.unwrap();
        let cur_size = instances[cur.0 as usize].code_size();
        let litc_next = instances[cur.0 as usize].litc_next;
        match litc_next {
            None => {
                end = cur_addr + cur_size;
                break;
            }
            Some(next) => {
                if instances[next.0 as usize].relative_addr.is_some() {
                    end = cur_addr + cur_size;
                    break;
                }
                let strip = can_strip(&instances[cur.0 as usize]);
                instances[cur.0 as usize].should_strip_litc = strip;
                let strip_len = if strip { JMP_REL32_LEN } else { 0 };
                let next_addr = cur_addr + cur_size - strip_len;

                let n = &mut instances[next.0 as usize];
                n.relative_addr = Some(next_addr);
                n.padding_required = 0;
                // Contiguous placement right after the predecessor imposes
                // no alignment of its own (next_addr is generally not a
                // multiple of FN_ALIGNMENT, e.g. after a stripped jmp); 0
                // trivially satisfies `relative_addr mod (1 << log2_alignment)
                // == 0` for any address.
                n.log2_alignment = 0;
                n.is_continuation_of_another = true;

                cur = next;
            }
        }
    }
    *cursor = end;
}

/// Lay out every instance in `instances`, in place. `instances` is indexed
/// by `InstanceId(i).0 as usize` — the composer's instance table is dense
/// and id-ordered, so registration order and vector order coincide.
///
/// Returns the total code-section length in bytes, or
/// [`LayoutError::CodeTooLarge`] if it exceeds the small-code-model limit
/// (spec.md §4.6: "all fragments live in the same code section (≤ 2 GB)").
pub fn layout(instances: &mut [Instance]) -> Result<u64, LayoutError> {
    let n = instances.len();

    // Pre-scan: mark every instance that is some predecessor's LITC
    // continuation, even if that predecessor has a higher registration
    // index (and so hasn't been visited yet) — spec.md §4.4 pass 1 skips
    // these explicitly rather than relying on "already placed".
    for i in 0..n {
        if let Some(next) = instances[i].litc_next {
            instances[next.0 as usize].is_continuation_of_another = true;
        }
    }

    let mut cursor: u32 = 0;

    // Pass 1: chain heads — anything not already placed and not someone
    // else's continuation.
    for i in 0..n {
        let id = InstanceId(i as u32);
        if instances[i].relative_addr.is_some() || instances[i].is_continuation_of_another {
            continue;
        }
        place_chain(id, instances, &mut cursor);
    }

    // Pass 2: cycles — every remaining unplaced instance was marked as a
    // continuation of another but never reached because its chain loops
    // back on itself before reaching the pre-scan's predecessor.
    for i in 0..n {
        if instances[i].relative_addr.is_none() {
            place_chain(InstanceId(i as u32), instances, &mut cursor);
        }
    }

    let total = cursor as u64;
    if total > SMALL_CODE_MODEL_LIMIT {
        return Err(LayoutError::CodeTooLarge {
            actual: total,
            limit: SMALL_CODE_MODEL_LIMIT,
        });
    }
    Ok(total)
}
