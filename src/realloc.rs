//! Reallocation.
//!
//! Resizing reuses the allocator's own machinery: the block is freed, the
//! best fit for the new size is taken, and the payload moves between the
//! two locations. Freeing first lets the allocation see the space the old
//! block occupied (possibly coalesced with its neighbors), so a grow can
//! succeed in heaps where allocate-then-free could not.
//!
//! The round trip through the free list overwrites the first 16 payload
//! bytes with link fields, so those bytes are captured before the free
//! and restored into the new location afterwards. The rest of the payload
//! is still intact in the buffer at that point and is moved directly.

use core::ptr::{self, NonNull};

use crate::alignment::align_block_size;
use crate::blocks::LinkField::Next;
use crate::{AllocError, Allocator, FREE_HEADER_SIZE, HEADER_SIZE, NIL};

/// Number of payload bytes the free-block link fields overlay.
const LINK_AREA: usize = (FREE_HEADER_SIZE - HEADER_SIZE) as usize;

impl Allocator {
    /// Resizes the allocation at `ptr` to hold at least `new_size` bytes.
    ///
    /// When the rounded block size is unchanged the same pointer is
    /// returned and nothing happens. Otherwise the payload is preserved
    /// up to the smaller of the old and new capacities and a pointer into
    /// the new block is returned.
    ///
    /// On out-of-memory the heap and the old allocation are left exactly
    /// as they were, so `ptr` remains valid.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator and not freed
    /// since.
    pub unsafe fn realloc(
        &mut self,
        ptr: NonNull<u8>,
        new_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let block = self.heap.block_of_payload(ptr);
        let old_block_size = self.heap.size_of(block);
        let Some(new_block_size) = align_block_size(new_size) else {
            return Err(AllocError);
        };

        if new_block_size == old_block_size {
            return Ok(ptr);
        }

        // freeing the block overwrites the first 16 payload bytes with
        // link fields; capture them up front
        let mut saved = [0u8; LINK_AREA];
        ptr::copy_nonoverlapping(ptr.as_ptr(), saved.as_mut_ptr(), LINK_AREA);

        self.insert_free_block(block, old_block_size);
        self.coalesce();

        let new_block = match self.find_best_fit(new_block_size) {
            Ok(found) => found,
            Err(err) => {
                // the caller keeps the old allocation on failure
                self.reclaim_block(block, old_block_size, &saved);
                return Err(err);
            }
        };

        let total = self.heap.size_of(new_block);
        self.remove_free_block(new_block);

        // Move the payload before splitting. When the chosen block is the
        // one that absorbed a lower neighbor of the old block, the split
        // would write the remainder header inside the not-yet-copied
        // tail; with the block out of the list, copying first is safe and
        // the later header writes all land outside the new payload.
        let new_ptr = self.heap.payload_ptr(new_block);
        let tail_len = (old_block_size.min(new_block_size) - FREE_HEADER_SIZE) as usize;
        // the old and new extents may overlap; copy handles that
        ptr::copy(
            ptr.as_ptr().add(LINK_AREA),
            new_ptr.as_ptr().add(LINK_AREA),
            tail_len,
        );
        ptr::copy_nonoverlapping(saved.as_ptr(), new_ptr.as_ptr(), LINK_AREA);

        if total > new_block_size {
            self.insert_free_block(new_block + new_block_size, total - new_block_size);
        }
        self.heap.set_size(new_block, new_block_size);

        Ok(new_ptr)
    }

    /// Re-carves the allocated block at `block` out of the free block
    /// that absorbed it during a failed reallocation, restoring the heap
    /// to its pre-call state.
    ///
    /// Coalescing during the free could only merge around the freed
    /// block (no other adjacent free pair existed beforehand), so exactly
    /// one free block covers its extent; any surplus on either side goes
    /// back to the free list as the neighbors it used to be.
    unsafe fn reclaim_block(&mut self, block: u32, size: u32, saved: &[u8; LINK_AREA]) {
        let mut covering = self.free_list_head;
        loop {
            debug_assert_ne!(covering, NIL);
            let covering_size = self.heap.size_of(covering);
            if covering <= block && block < covering + covering_size {
                self.remove_free_block(covering);
                if covering < block {
                    self.insert_free_block(covering, block - covering);
                }
                let covering_end = covering + covering_size;
                let block_end = block + size;
                if block_end < covering_end {
                    self.insert_free_block(block_end, covering_end - block_end);
                }
                break;
            }
            covering = self.heap.link(covering, Next);
        }

        self.heap.set_size(block, size);
        ptr::copy_nonoverlapping(
            saved.as_ptr(),
            self.heap.payload_ptr(block).as_ptr(),
            LINK_AREA,
        );
    }
}
