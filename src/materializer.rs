//! Materializer (spec.md §4.5).
//!
//! Allocates an anonymous executable mapping, copies each laid-out
//! instance's bytes to its assigned offset, applies fixups, strips chained
//! tail-calls, shortens branches that fit in 8 bits, invalidates the
//! instruction cache, and flips the mapping to `R+X`.

use crate::blueprint::{PlaceholderNamespace, NO_LITC};
use crate::instance::{FixupValue, Instance};
use crate::layout::JMP_REL32_LEN;
use crate::program::GeneratedProgram;
use rustc_hash::FxHashMap;

const NOP: u8 = 0x90;
const JCC_REL32_LEN: u32 = 6;

fn page_size() -> usize {
    #[cfg(unix)]
    {
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    }
    #[cfg(windows)]
    {
        use std::mem::MaybeUninit;
        unsafe {
            let mut info = MaybeUninit::<winapi::um::sysinfoapi::SYSTEM_INFO>::zeroed();
            winapi::um::sysinfoapi::GetSystemInfo(info.as_mut_ptr());
            info.assume_init().dwPageSize as usize
        }
    }
}

fn round_up_to_page(size: usize, page: usize) -> usize {
    (size + page - 1) / page * page
}

/// Allocate a private anonymous mapping of `len` bytes with `R+W`
/// protections. Returns `None` on failure (spec.md §7: resource exhaustion
/// surfaces as a null program, not a panic).
fn alloc_rw(len: usize) -> Option<*mut u8> {
    #[cfg(unix)]
    unsafe {
        let ptr = libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        );
        if ptr == libc::MAP_FAILED {
            None
        } else {
            Some(ptr as *mut u8)
        }
    }
    #[cfg(windows)]
    unsafe {
        use winapi::um::memoryapi::VirtualAlloc;
        use winapi::um::winnt::{MEM_COMMIT, MEM_RESERVE, PAGE_READWRITE};
        let ptr = VirtualAlloc(std::ptr::null_mut(), len, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE);
        if ptr.is_null() {
            None
        } else {
            Some(ptr as *mut u8)
        }
    }
}

fn protect_rx(ptr: *mut u8, len: usize) -> bool {
    #[cfg(unix)]
    unsafe {
        libc::mprotect(ptr as *mut libc::c_void, len, libc::PROT_READ | libc::PROT_EXEC) == 0
    }
    #[cfg(windows)]
    unsafe {
        use winapi::um::memoryapi::VirtualProtect;
        use winapi::um::winnt::PAGE_EXECUTE_READ;
        let mut old = 0u32;
        VirtualProtect(ptr as *mut _, len, PAGE_EXECUTE_READ, &mut old) != 0
    }
}

/// Release a mapping previously returned by [`alloc_rw`]. Called from
/// [`crate::program::GeneratedProgram`]'s `Drop`.
pub(crate) fn release_mapping(ptr: *mut u8, len: usize) {
    #[cfg(unix)]
    unsafe {
        libc::munmap(ptr as *mut libc::c_void, len);
    }
    #[cfg(windows)]
    unsafe {
        use winapi::um::memoryapi::VirtualFree;
        use winapi::um::winnt::MEM_RELEASE;
        let _ = len;
        VirtualFree(ptr as *mut _, 0, MEM_RELEASE);
    }
}

/// Invalidate the instruction cache over `[ptr, ptr+len)`.
///
/// This crate's ABI and relocation model (spec.md §4.6) are x86-64-only —
/// the internal calling convention, rel32/rel8 branch shortening, and the
/// boundary scenarios all assume that ISA. x86-64 keeps the instruction and
/// data caches coherent in hardware, so there is nothing to flush; this
/// function exists as the named step spec.md §4.5 calls for, and as the
/// seam a future non-x86-64 port would hook.
fn invalidate_icache(_ptr: *const u8, _len: usize) {}

fn resolve_fixup_u64(instances: &[Instance], value: FixupValue) -> u64 {
    match value {
        FixupValue::Literal(v) => v,
        FixupValue::InstanceRef(target) => {
            let target_inst = &instances[target.0 as usize];
            let relative = target_inst
                .relative_addr
                .expect("LITC/fixup target instance was never placed by layout");
            relative as u64 // offset; caller adds `base` to get an absolute address
        }
        FixupValue::Unset => {
            unreachable!("materializing a fixup site whose placeholder was never populated")
        }
    }
}

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}
fn write_u32_le(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
fn read_u64_le(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
}
fn write_u64_le(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Apply one instance's fixups and branch shortenings into `buf`, the whole
/// mapping's byte slice, at its already-assigned `relative_addr`.
fn materialize_instance(
    instances: &[Instance],
    idx: usize,
    base: u64,
    buf: &mut [u8],
    shorten_branches: bool,
) {
    let inst = &instances[idx];
    let bp = inst.blueprint;
    let dst_offset = inst.relative_addr.expect("instance not placed by layout") as usize;
    let dst_abs = base + dst_offset as u64;

    let strip_len = if inst.should_strip_litc { JMP_REL32_LEN } else { 0 };
    let copied_len = bp.code_size() as u32 - strip_len;

    if inst.should_strip_litc {
        debug_assert!(
            bp.jmp32_offsets
                .iter()
                .any(|&off| off + JMP_REL32_LEN == bp.code_size() as u32),
            "instance {} marked should_strip_litc but its content doesn't end in a listed jmp rel32",
            bp.name
        );
    }

    buf[dst_offset..dst_offset + copied_len as usize]
        .copy_from_slice(&bp.content[..copied_len as usize]);

    let in_copied_region = |offset: u32, width: u32| offset + width <= copied_len;

    for fixup in bp.addr32_fixups {
        if !in_copied_region(fixup.offset, 4) {
            continue; // fell within the stripped tail-call bytes
        }
        let site = dst_offset + fixup.offset as usize;
        let existing = read_u32_le(buf, site);
        let delta = 0u32.wrapping_sub(dst_abs as u32);
        write_u32_le(buf, site, existing.wrapping_add(delta));
    }

    for fixup in bp.sym32_fixups {
        if !in_copied_region(fixup.offset, 4) {
            continue;
        }
        let placeholder = crate::blueprint::Placeholder::new(fixup.namespace, fixup.ordinal);
        let value = resolve_fixup_u64(instances, inst.fixup_value(placeholder));
        let site = dst_offset + fixup.offset as usize;
        let existing = read_u32_le(buf, site);
        let addend = match fixup.namespace {
            PlaceholderNamespace::BoilerplateFn => {
                // PC32 relocation: S - P, where S is the target's absolute
                // address and P is the address immediately after this
                // 4-byte field (site_abs + 4).
                let target_abs = base + value;
                let site_abs = dst_abs + fixup.offset as u64;
                (target_abs as i64).wrapping_sub(site_abs as i64 + 4) as u32
            }
            PlaceholderNamespace::Constant => value as u32,
            PlaceholderNamespace::HostFn => {
                unreachable!("host-fn placeholders use the 64-bit symbolic channel")
            }
        };
        write_u32_le(buf, site, existing.wrapping_add(addend));
    }

    for fixup in bp.sym64_fixups {
        if !in_copied_region(fixup.offset, 8) {
            continue;
        }
        let placeholder = crate::blueprint::Placeholder::new(fixup.namespace, fixup.ordinal);
        let value = resolve_fixup_u64(instances, inst.fixup_value(placeholder));
        let site = dst_offset + fixup.offset as usize;
        let existing = read_u64_le(buf, site);
        let addend = match fixup.namespace {
            PlaceholderNamespace::HostFn => value,
            PlaceholderNamespace::Constant => value,
            PlaceholderNamespace::BoilerplateFn => {
                unreachable!("boilerplate-fn placeholders use the 32-bit PC-relative channel")
            }
        };
        write_u64_le(buf, site, existing.wrapping_add(addend));
    }

    if !shorten_branches {
        return;
    }
    for &off in bp.jmp32_offsets {
        if !in_copied_region(off, 5) {
            continue;
        }
        try_shorten_jmp(buf, dst_offset + off as usize);
    }
    for &off in bp.jcc32_offsets {
        if !in_copied_region(off, 6) {
            continue;
        }
        try_shorten_jcc(buf, dst_offset + off as usize);
    }
}

/// Rewrite a `jmp rel32` (`E9 xx xx xx xx`) at `site` to `jmp rel8`
/// (`EB xx`) if the post-fixup displacement fits in a signed 8-bit value,
/// padding the freed 3 bytes with NOPs.
fn try_shorten_jmp(buf: &mut [u8], site: usize) {
    debug_assert_eq!(buf[site], 0xE9, "jmp32 site doesn't hold E9 opcode");
    let disp32 = read_u32_le(buf, site + 1) as i32;
    // rel32's next-IP is site+5; rel8's next-IP is site+2. Both encode the
    // same target, so disp8 = disp32 + (5 - 2).
    let disp8 = disp32 as i64 + 3;
    if disp8 >= i8::MIN as i64 && disp8 <= i8::MAX as i64 {
        buf[site] = 0xEB;
        buf[site + 1] = disp8 as i8 as u8;
        for b in &mut buf[site + 2..site + 5] {
            *b = NOP;
        }
    }
}

/// Rewrite a `jcc rel32` (`0F 8x xx xx xx xx`) at `site` to `jcc rel8`
/// (`7x xx`), remapping the opcode `0F 8x → 7x`, if the post-fixup
/// displacement fits in 8 bits, padding the freed 4 bytes with NOPs.
fn try_shorten_jcc(buf: &mut [u8], site: usize) {
    debug_assert_eq!(buf[site], 0x0F, "jcc32 site doesn't hold 0F prefix");
    debug_assert_eq!(buf[site + 1] & 0xF0, 0x80, "jcc32 site's second byte isn't 8x");
    let disp32 = read_u32_le(buf, site + 2) as i32;
    // rel32's next-IP is site+6; rel8's next-IP is site+2.
    let disp8 = disp32 as i64 + 4;
    if disp8 >= i8::MIN as i64 && disp8 <= i8::MAX as i64 {
        let cc = buf[site + 1] & 0x0F;
        buf[site] = 0x70 | cc;
        buf[site + 1] = disp8 as i8 as u8;
        for b in &mut buf[site + 2..site + 6] {
            *b = NOP;
        }
    }
}

/// Materialize a laid-out composition into executable memory.
///
/// `instances` must already have `relative_addr` assigned by
/// [`crate::layout::layout`]; `entry_points` maps externally visible
/// identifiers to an index into `instances`. `page_size_override` lets a
/// [`crate::composer::CompositionConfig`] pin the mapping granularity
/// instead of querying the OS; `shorten_branches` disables the rel32→rel8
/// pass entirely when a caller wants byte-for-byte predictable offsets
/// (e.g. for a disassembly test). Returns `None` if allocation or
/// re-protection fails (spec.md §7) — the partially built mapping is
/// released before returning.
pub fn materialize(
    instances: &[Instance],
    code_section_length: u64,
    entry_points: &[(String, usize)],
    page_size_override: Option<usize>,
    shorten_branches: bool,
) -> Option<GeneratedProgram> {
    let page = page_size_override.unwrap_or_else(page_size);
    let mapping_len = round_up_to_page(code_section_length as usize, page);

    let base_ptr = match alloc_rw(mapping_len) {
        Some(p) => p,
        None => {
            log::warn!("dynspec-engine: failed to allocate {mapping_len}-byte RW mapping");
            return None;
        }
    };

    // Pre-fill with NOPs: this both satisfies "write NOP padding into the
    // gap bytes before each instance" (step 3) and the trailing bytes up to
    // the page boundary, for free.
    let buf = unsafe { std::slice::from_raw_parts_mut(base_ptr, mapping_len) };
    buf.fill(NOP);

    let base_addr = base_ptr as u64;
    for idx in 0..instances.len() {
        materialize_instance(instances, idx, base_addr, buf, shorten_branches);
    }

    invalidate_icache(base_ptr, mapping_len);

    if !protect_rx(base_ptr, mapping_len) {
        log::warn!("dynspec-engine: failed to re-protect mapping R+X");
        release_mapping(base_ptr, mapping_len);
        return None;
    }

    let mut dict = FxHashMap::default();
    for (name, instance_idx) in entry_points {
        let offset = instances[*instance_idx]
            .relative_addr
            .expect("entry point instance not placed by layout");
        dict.insert(name.clone(), offset);
    }

    Some(unsafe { GeneratedProgram::new(base_ptr, mapping_len, dict) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{Addr32Fixup, Blueprint};
    use crate::instance::InstanceId;
    use crate::layout::layout;

    #[test]
    fn shorten_jmp_rewrites_small_displacement() {
        // jmp rel32 with disp32 = -10, which after the +3 adjustment (-7)
        // fits comfortably in i8.
        let mut buf = vec![0xE9u8, 0, 0, 0, 0, 0x90, 0x90, 0x90, 0x90, 0x90];
        write_u32_le(&mut buf, 1, (-10i32) as u32);
        try_shorten_jmp(&mut buf, 0);
        assert_eq!(buf[0], 0xEB);
        assert_eq!(buf[1] as i8, -7);
        assert_eq!(&buf[2..5], &[NOP, NOP, NOP]);
    }

    #[test]
    fn shorten_jmp_leaves_large_displacement_alone() {
        let mut buf = vec![0xE9u8, 0, 0, 0, 0];
        write_u32_le(&mut buf, 1, 0x0010_0000);
        try_shorten_jmp(&mut buf, 0);
        assert_eq!(buf[0], 0xE9);
    }

    #[test]
    fn shorten_jcc_remaps_opcode_and_pads() {
        // 0F 84 (je) rel32 = -4, +4 adjustment = 0, fits in i8.
        let mut buf = vec![0x0Fu8, 0x84, 0, 0, 0, 0];
        write_u32_le(&mut buf, 2, (-4i32) as u32);
        try_shorten_jcc(&mut buf, 0);
        assert_eq!(buf[0], 0x74); // 0x70 | 0x4
        assert_eq!(buf[1] as i8, 0);
        assert_eq!(&buf[2..6], &[NOP, NOP, NOP, NOP]);
    }

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
    fn materialize_single_ret_instance_is_executable_and_addressable() {
        let mut instances = vec![Instance::new(InstanceId(0), &RET_ONLY)];
        let total = layout(&mut instances).unwrap();
        let program = materialize(&instances, total, &[("entry".to_string(), 0)], None, true)
            .expect("materialization should succeed under test");
        let addr = program.entry_addr("entry").expect("entry point registered");
        assert!(!addr.is_null());
        unsafe {
            assert_eq!(*addr, 0xC3);
        }
    }

    #[test]
    fn materialize_self_referencing_addr32_fixup_encodes_negative_base() {
        static SELF_REF: Blueprint = Blueprint {
            name: "self_ref",
            content: &[0, 0, 0, 0, 0xC3, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90, 0x90],
            addr32_fixups: &[Addr32Fixup { offset: 0 }],
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
        let mut instances = vec![Instance::new(InstanceId(0), &SELF_REF)];
        let total = layout(&mut instances).unwrap();
        let program = materialize(&instances, total, &[], None, true).unwrap();
        let base = program.base() as u64;
        let bytes = unsafe { std::slice::from_raw_parts(program.base(), 4) };
        let value = read_u32_le(bytes, 0);
        assert_eq!(value, 0u32.wrapping_sub(base as u32));
    }
}
