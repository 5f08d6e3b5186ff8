//! Stack-frame size-class quantization.
//!
//! Spec.md §6: the tagged function pointer packs a stack-frame size into a
//! 13-bit category index rather than a raw byte count, so the boilerplate
//! dispatcher can switch on a small integer instead of comparing sizes.
//! Categories are generated at build time by `build.rs` into
//! `SIZE_CLASSES`, a monotonically increasing table growing by a factor of
//! 1.1 per step (rounded to the next multiple of 8).

include!(concat!(env!("OUT_DIR"), "/size_classes.rs"));

/// Largest value a 13-bit category index can hold.
pub const MAX_CATEGORY: u16 = (1 << 13) - 1;

/// Map a requested frame size (bytes) to `(quantized_size, category)`.
///
/// `quantized_size` is the smallest entry in [`SIZE_CLASSES`] that is `>=
/// requested`; `category` is its index. Per spec.md §6, category 0 is
/// reserved (AOT/tree-walk frames do not carry a generated-mode category),
/// so generated code always gets `category >= 1`; callers that need a
/// generated-mode category should use [`quantize_generated`] instead.
///
/// # Panics
/// Panics if `requested` exceeds the largest size class — a frame that
/// large indicates a pathological composition, not a recoverable runtime
/// condition.
pub fn quantize(requested: u32) -> (u32, u16) {
    for (i, &size) in SIZE_CLASSES.iter().enumerate() {
        if size >= requested {
            return (size, i as u16);
        }
    }
    panic!(
        "requested frame size {requested} exceeds the largest size class ({})",
        SIZE_CLASSES[SIZE_CLASSES.len() - 1]
    );
}

/// Like [`quantize`], but returns a category shifted into the generated-mode
/// range (`1..=MAX_CATEGORY`), as spec.md §6's tagged-pointer payload expects.
pub fn quantize_generated(requested: u32) -> (u32, u16) {
    let (size, category) = quantize(requested);
    let category = category.saturating_add(1);
    debug_assert!(
        category <= MAX_CATEGORY,
        "size-class table has more categories than the 13-bit field can address"
    );
    (size, category)
}

/// Inverse of [`quantize_generated`]: the frame size in bytes for a
/// generated-mode category (`1..=MAX_CATEGORY`), as packed into a tagged
/// [`crate::abi::FunctionPointer`].
pub fn size_for_category(category: u16) -> u32 {
    debug_assert!(category >= 1, "generated mode category 0 is reserved");
    SIZE_CLASSES[(category - 1) as usize]
}
