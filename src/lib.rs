//! A best-fit memory allocator for a single fixed memory region.
//!
//! The host hands the allocator one contiguous buffer up front; there is
//! no growth, no memory mapping and no system interaction afterwards. The
//! buffer is partitioned into variably-sized blocks and all bookkeeping
//! lives inside the buffer itself: each free block carries a 20-byte
//! header threading it onto two intrusive doubly-linked lists at once,
//! one in address order and one in size order. Allocation does a best-fit
//! descent over the size links and splits the winner; deallocation
//! re-links the block and merges it with any adjacent free neighbors, so
//! no two free blocks ever touch.
//!
//! ```text
//! +-----------+----------------+-----------+--------------------------+
//! | allocated |      free      | allocated |           free           |
//! +-----------+----------------+-----------+--------------------------+
//!       ^        ^                              ^
//!       |        +--- free_list_head            |
//!       |             (NEXT links) ------------>+
//!       +--- callers hold payload pointers
//! ```
//!
//! The allocator is single-threaded by design: a public call runs to
//! completion before the next one is admitted, and callers that want
//! shared access serialize externally. The optional `spin` feature
//! provides exactly that in the form of [`SpinLockedAllocator`], a
//! spin-locked wrapper implementing [`core::alloc::GlobalAlloc`].

#![cfg_attr(not(test), no_std)]

mod alignment;
mod blocks;
mod freelist;
pub mod memory;
mod realloc;

#[cfg(test)]
mod tests;

use core::fmt;
use core::ptr::NonNull;

use static_assertions::const_assert;

use alignment::{align_block_size, align_down, align_up};
use blocks::{HeapRegion, LinkField};

/// Byte offset of the heap within the backing buffer.
pub const HEAP_OFFSET: u32 = 0;
/// Minimum block size, and alignment granularity of block offsets and
/// block sizes.
pub const BLOCK_QUANTUM: u32 = 64;
/// `BLOCK_QUANTUM - 1`, used for alignment arithmetic.
pub const QUANTUM_MASK: u32 = BLOCK_QUANTUM - 1;
/// Sentinel offset meaning "no such block".
pub const NIL: u32 = 0xFFFF_FFFF;
/// Size of the header that precedes every payload: the 4-byte size field.
pub const HEADER_SIZE: u32 = 4;
/// Size of the full free-block header: the size field plus four links.
pub const FREE_HEADER_SIZE: u32 = 20;
/// Guaranteed alignment of the payload pointers handed out. Blocks sit on
/// quantum boundaries and payloads start right after the 4-byte size
/// field.
pub const PAYLOAD_ALIGNMENT: usize = 4;

const_assert!(BLOCK_QUANTUM.is_power_of_two());
const_assert!(BLOCK_QUANTUM >= FREE_HEADER_SIZE);
const_assert!(HEAP_OFFSET & QUANTUM_MASK == 0);

/// The single error the allocator produces: no free block can satisfy the
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("out of memory")
    }
}

/// A best-fit heap allocator over a fixed memory region.
///
/// The value bundles the backing buffer description with the free-list
/// head, so independent heaps can coexist, each owning its own region.
pub struct Allocator {
    pub(crate) heap: HeapRegion,
    /// Offset of the first free block in address order, or [`NIL`] when
    /// the heap is fully allocated.
    pub(crate) free_list_head: u32,
}

impl Allocator {
    /// Creates an empty heap allocator without any heap memory region,
    /// which will fail every allocation request.
    ///
    /// To initialize this allocator, use the `init` method.
    pub const fn empty() -> Self {
        Self {
            heap: HeapRegion::empty(),
            free_list_head: NIL,
        }
    }

    /// Checks if the heap memory region was already initialized by
    /// calling `init`.
    pub fn was_initialized(&self) -> bool {
        self.heap.heap_size() != 0
    }

    /// Initializes the heap allocator with the given memory region. The
    /// region start is aligned up and the end aligned down to
    /// [`BLOCK_QUANTUM`], and the whole aligned span becomes one free
    /// block.
    ///
    /// Calling `init` again on a heap with no live allocations simply
    /// rebuilds that state.
    ///
    /// # Safety
    ///
    /// The provided memory region must be valid and non-null, and must
    /// not be used by anything else for as long as the allocator is in
    /// use. Re-initializing while allocations are live invalidates every
    /// pointer previously handed out.
    ///
    /// If after aligning the start and end addresses, the size of the
    /// heap is 0, or the aligned size does not fit the 32-bit offset
    /// space, the function panics.
    pub unsafe fn init(&mut self, heap_start_addr: usize, heap_size: usize) {
        let aligned_heap_start_addr = align_up(heap_start_addr, BLOCK_QUANTUM as usize);
        let heap_end_addr = heap_start_addr + heap_size;
        let aligned_heap_end_addr = align_down(heap_end_addr, BLOCK_QUANTUM as usize);
        let aligned_size = aligned_heap_end_addr.saturating_sub(aligned_heap_start_addr);

        // if after aligning the start and end addresses, the heap size is 0
        if aligned_size == 0 {
            panic!("heap size is 0 after aligning heap start and end addresses");
        }

        // block offsets are 32-bit, with the all-ones value reserved
        let Ok(heap_size) = u32::try_from(aligned_size) else {
            panic!("heap size does not fit the 32-bit offset space");
        };

        self.heap = HeapRegion::new(aligned_heap_start_addr as *mut u8, heap_size);

        // create a free block for the entire heap
        self.heap.set_size(HEAP_OFFSET, heap_size);
        for field in LinkField::ALL {
            self.heap.set_link(HEAP_OFFSET, field, NIL);
        }
        self.free_list_head = HEAP_OFFSET;
    }

    /// Allocates at least `size` bytes and returns a pointer to the
    /// payload. The payload is 4-byte aligned and disjoint from every
    /// live allocation; a zero-size request still returns a valid,
    /// freeable pointer to a whole quantum block.
    ///
    /// Fails with [`AllocError`] when no free block is large enough, in
    /// which case the heap is left unchanged.
    ///
    /// # Safety
    ///
    /// The allocator must have been initialized with a valid memory
    /// region.
    pub unsafe fn alloc(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let block_size = align_block_size(size).ok_or(AllocError)?;
        let block = self.find_best_fit(block_size)?;

        if self.heap.size_of(block) == block_size {
            // exact fit, consume the whole block; its size field is
            // already correct
            self.remove_free_block(block);
        } else {
            self.split_free_block(block, block_size);
        }

        Ok(self.heap.payload_ptr(block))
    }

    /// Allocates like [`Self::alloc`] and zero-fills the entire payload
    /// region, which can be larger than `size` after rounding.
    ///
    /// # Safety
    ///
    /// The allocator must have been initialized with a valid memory
    /// region.
    pub unsafe fn alloc_zeroed(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.alloc(size)?;
        let block = self.heap.block_of_payload(ptr);

        // the payload only; the size field in front of it must survive
        memory::zero_bytes(
            ptr.as_ptr(),
            (self.heap.size_of(block) - HEADER_SIZE) as usize,
        );

        Ok(ptr)
    }

    /// Returns the allocation at `ptr` to the free pool and merges it
    /// with any adjacent free neighbors.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator and not freed
    /// since. Double frees and foreign pointers are undefined behavior.
    pub unsafe fn dealloc(&mut self, ptr: NonNull<u8>) {
        let block = self.heap.block_of_payload(ptr);
        let size = self.heap.size_of(block);

        self.insert_free_block(block, size);
        self.coalesce();
    }

    /// Zero-fills the payload at `ptr`, then frees it like
    /// [`Self::dealloc`].
    ///
    /// # Safety
    ///
    /// Same contract as [`Self::dealloc`].
    pub unsafe fn dealloc_zeroed(&mut self, ptr: NonNull<u8>) {
        let block = self.heap.block_of_payload(ptr);

        memory::zero_bytes(
            ptr.as_ptr(),
            (self.heap.size_of(block) - HEADER_SIZE) as usize,
        );

        self.dealloc(ptr);
    }
}

unsafe impl Send for Allocator {}

/// A spin locked memory allocator that can be used as the global
/// allocator.
#[cfg(feature = "spin")]
pub struct SpinLockedAllocator(spin::Mutex<Allocator>);

#[cfg(feature = "spin")]
impl SpinLockedAllocator {
    /// Creates an empty locked heap allocator without any heap memory
    /// region, which will fail every allocation request.
    ///
    /// To initialize this allocator, use the `init` method.
    pub const fn empty() -> Self {
        Self(spin::Mutex::new(Allocator::empty()))
    }

    /// Initializes the heap allocator with the given memory region.
    ///
    /// # Safety
    ///
    /// Same contract as [`Allocator::init`].
    pub unsafe fn init(&self, heap_start_addr: usize, heap_size: usize) {
        let mut allocator = self.0.lock();
        allocator.init(heap_start_addr, heap_size);
    }
}

#[cfg(feature = "spin")]
unsafe impl core::alloc::GlobalAlloc for SpinLockedAllocator {
    unsafe fn alloc(&self, layout: core::alloc::Layout) -> *mut u8 {
        // payloads sit 4 bytes past a quantum boundary; stronger
        // alignments cannot be served
        if layout.align() > PAYLOAD_ALIGNMENT {
            return core::ptr::null_mut();
        }
        let mut allocator = self.0.lock();
        match allocator.alloc(layout.size()) {
            Ok(ptr) => ptr.as_ptr(),
            Err(AllocError) => core::ptr::null_mut(),
        }
    }

    unsafe fn alloc_zeroed(&self, layout: core::alloc::Layout) -> *mut u8 {
        if layout.align() > PAYLOAD_ALIGNMENT {
            return core::ptr::null_mut();
        }
        let mut allocator = self.0.lock();
        match allocator.alloc_zeroed(layout.size()) {
            Ok(ptr) => ptr.as_ptr(),
            Err(AllocError) => core::ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: core::alloc::Layout) {
        let mut allocator = self.0.lock();
        allocator.dealloc(NonNull::new_unchecked(ptr));
    }

    unsafe fn realloc(
        &self,
        ptr: *mut u8,
        layout: core::alloc::Layout,
        new_size: usize,
    ) -> *mut u8 {
        if layout.align() > PAYLOAD_ALIGNMENT {
            return core::ptr::null_mut();
        }
        let mut allocator = self.0.lock();
        match allocator.realloc(NonNull::new_unchecked(ptr), new_size) {
            Ok(new_ptr) => new_ptr.as_ptr(),
            Err(AllocError) => core::ptr::null_mut(),
        }
    }
}
