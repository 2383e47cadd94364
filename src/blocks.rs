//! In-band block layout and raw header access.
//!
//! Every block in the heap, free or allocated, starts with a 4-byte size
//! field holding the total block length in bytes, header included. An
//! allocated block carries nothing else; the rest is payload. A free block
//! extends the header to 20 bytes with four link fields:
//!
//! ```text
//! +---------+---------+---------+---------+---------+----------------+
//! |  SIZE   |  NEXT   |  PREV   | SMALLER | LARGER  |    content     |
//! +---------+---------+---------+---------+---------+----------------+
//! 0         4         8         12        16        20
//! ```
//!
//! NEXT/PREV thread the free blocks in increasing address order,
//! SMALLER/LARGER thread the same blocks in non-decreasing size order. A
//! link with no target holds [`NIL`].
//!
//! Blocks refer to each other by byte offset into the backing buffer, not
//! by native pointer. Offsets keep the whole structure relocatable with
//! the buffer and sidestep provenance questions when the buffer itself
//! came from another allocator. All raw header reads and writes funnel
//! through [`HeapRegion`] so the rest of the crate never touches the
//! buffer directly.

use core::ptr::NonNull;

use crate::{BLOCK_QUANTUM, HEADER_SIZE, NIL, QUANTUM_MASK};

/// Byte offset of the size field within a block header.
const SIZE_FIELD: u32 = 0;

/// One of the four link fields of a free-block header. The discriminant is
/// the field's byte offset within the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkField {
    /// Next free block in address order.
    Next = 4,
    /// Previous free block in address order.
    Prev = 8,
    /// Next free block strictly smaller in size.
    Smaller = 12,
    /// Next free block strictly larger in size.
    Larger = 16,
}

impl LinkField {
    pub(crate) const ALL: [LinkField; 4] = [
        LinkField::Next,
        LinkField::Prev,
        LinkField::Smaller,
        LinkField::Larger,
    ];
}

/// The backing heap memory region: a base address and the total heap size.
///
/// All block offsets handed to the accessors must come from the
/// allocator's own structure; the region does not validate them beyond
/// debug assertions.
pub(crate) struct HeapRegion {
    base: *mut u8,
    heap_size: u32,
}

impl HeapRegion {
    /// A region of size 0. Every allocation request against it fails.
    pub(crate) const fn empty() -> Self {
        Self {
            base: core::ptr::null_mut(),
            heap_size: 0,
        }
    }

    /// Builds a region over `heap_size` bytes starting at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `heap_size` bytes, be
    /// aligned to [`BLOCK_QUANTUM`], and not be used by anything else for
    /// as long as the region is alive.
    pub(crate) unsafe fn new(base: *mut u8, heap_size: u32) -> Self {
        debug_assert_eq!(base as usize & QUANTUM_MASK as usize, 0);
        debug_assert_eq!(heap_size & QUANTUM_MASK, 0);
        Self { base, heap_size }
    }

    /// Total size, in bytes, of the backing heap.
    pub(crate) fn heap_size(&self) -> u32 {
        self.heap_size
    }

    /// Reads the header word at the given byte offset.
    fn word(&self, offset: u32) -> u32 {
        debug_assert!(offset % 4 == 0 && offset < self.heap_size);
        unsafe { self.base.add(offset as usize).cast::<u32>().read() }
    }

    /// Writes the header word at the given byte offset.
    fn set_word(&mut self, offset: u32, value: u32) {
        debug_assert!(offset % 4 == 0 && offset < self.heap_size);
        unsafe { self.base.add(offset as usize).cast::<u32>().write(value) }
    }

    /// The total size of the block at `block`, header included.
    pub(crate) fn size_of(&self, block: u32) -> u32 {
        self.word(block + SIZE_FIELD)
    }

    /// Stamps the size field of the block at `block`.
    pub(crate) fn set_size(&mut self, block: u32, size: u32) {
        debug_assert!(size >= BLOCK_QUANTUM && size & QUANTUM_MASK == 0);
        self.set_word(block + SIZE_FIELD, size)
    }

    /// Reads one link field of the free block at `block`.
    pub(crate) fn link(&self, block: u32, field: LinkField) -> u32 {
        self.word(block + field as u32)
    }

    /// Writes one link field of the free block at `block`.
    pub(crate) fn set_link(&mut self, block: u32, field: LinkField, target: u32) {
        self.set_word(block + field as u32, target)
    }

    /// Writes one link field of the free block at `block`, treating a
    /// [`NIL`] block as a no-op. Collapses the case analysis of the list
    /// repairs: "if the neighbor exists, point it at its new neighbor"
    /// becomes a single unconditional call.
    pub(crate) fn patch(&mut self, block: u32, field: LinkField, target: u32) {
        if block != NIL {
            self.set_link(block, field, target);
        }
    }

    /// The payload pointer handed to callers for the block at `block`:
    /// the first byte after the size field.
    pub(crate) fn payload_ptr(&self, block: u32) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(self.base.add((block + HEADER_SIZE) as usize)) }
    }

    /// Recovers the block offset from a payload pointer previously
    /// returned by [`Self::payload_ptr`].
    pub(crate) fn block_of_payload(&self, ptr: NonNull<u8>) -> u32 {
        let block = (ptr.as_ptr() as usize - self.base as usize) as u32 - HEADER_SIZE;
        debug_assert_eq!(block & QUANTUM_MASK, 0);
        block
    }
}
