use crate::{BLOCK_QUANTUM, HEADER_SIZE, QUANTUM_MASK};

/// Align downwards. Returns the greatest x with alignment `align`
/// so that x <= addr.
///
/// # Safety
///
/// `align` must be a power of 2.
pub unsafe fn align_down(n: usize, align: usize) -> usize {
    if align.is_power_of_two() {
        n & !(align - 1)
    } else if align == 0 {
        n
    } else {
        panic!("`align` must be a power of 2");
    }
}

/// Align upwards. Returns the smallest x with alignment `align`
/// so that x >= addr.
///
/// # Safety
///
/// `align` must be a power of 2.
pub unsafe fn align_up(n: usize, align: usize) -> usize {
    align_down(n + align - 1, align)
}

/// Rounds a requested payload size up to a whole block size: adds the
/// 4-byte size field, then rounds the result up to the next multiple of
/// [`BLOCK_QUANTUM`].
///
/// The result is at least `requested + 4`, a multiple of the quantum, and
/// never below [`BLOCK_QUANTUM`] itself, so the full free-block header
/// always fits. Returns `None` when the request cannot be represented in
/// the 32-bit offset space, which makes it unsatisfiable by definition.
pub fn align_block_size(requested: usize) -> Option<u32> {
    let with_header = u32::try_from(requested).ok()?.checked_add(HEADER_SIZE)?;
    with_header.checked_add((BLOCK_QUANTUM - (with_header & QUANTUM_MASK)) & QUANTUM_MASK)
}
