//! The free-block index: one set of blocks threaded by two orderings.
//!
//! Every free block sits on two doubly-linked lists at once, using the
//! four link fields of its header. NEXT/PREV order the blocks by address,
//! SMALLER/LARGER order the same blocks by size. Three free blocks of
//! sizes 64, 192 and 128 look like this (one arrow per direction):
//!
//! ```text
//!            NEXT ->         NEXT ->
//!        +--------+      +--------+      +--------+
//!        |  64 B  |      | 192 B  |      | 128 B  |
//!        +--------+      +--------+      +--------+
//!            <- PREV         <- PREV
//!
//!   size order:  64 B  --LARGER->  128 B  --LARGER->  192 B
//!                64 B  <-SMALLER-  128 B  <-SMALLER-  192 B
//! ```
//!
//! [`Allocator::free_list_head`] is the lowest-address free block, so it
//! is an endpoint of the address list but sits at an arbitrary position
//! in the size list; the size-directed walks below start there and move
//! in whichever direction bounds the wanted size.
//!
//! Everything in this module keeps the two orderings and the size fields
//! mutually consistent; the public API in `lib.rs` is a thin layer over
//! these primitives.

use crate::blocks::LinkField::{self, Larger, Next, Prev, Smaller};
use crate::{AllocError, Allocator, NIL};

impl Allocator {
    /// Best-fit search: returns the free block of smallest size that is
    /// still at least `min_size` bytes, or fails with out-of-memory.
    ///
    /// The walk exploits the size ordering. While the current block is
    /// too small it climbs LARGER; once a fitting block is found it keeps
    /// descending SMALLER as long as the next smaller block still fits.
    /// Equal-size runs block the descent (their size is not `< min_size`),
    /// so the walk passes through them and terminates at the run's lower
    /// end. Ties may resolve to any of the equal blocks; the choice is
    /// not observable.
    pub(crate) fn find_best_fit(&self, min_size: u32) -> Result<u32, AllocError> {
        let mut current = self.free_list_head;
        if current == NIL {
            return Err(AllocError);
        }
        loop {
            if self.heap.size_of(current) < min_size {
                current = self.heap.link(current, Larger);
                if current == NIL {
                    // even the largest free block is too small
                    return Err(AllocError);
                }
            } else {
                let smaller = self.heap.link(current, Smaller);
                if smaller == NIL || self.heap.size_of(smaller) < min_size {
                    return Ok(current);
                }
                current = smaller;
            }
        }
    }

    /// Excises `block` from both orderings.
    ///
    /// The block's own header is left untouched; the caller overwrites it
    /// (by stamping an allocated size, or by re-inserting the block with
    /// fresh links).
    pub(crate) fn remove_free_block(&mut self, block: u32) {
        if block == self.free_list_head {
            self.free_list_head = self.heap.link(block, Next);
        }

        let next = self.heap.link(block, Next);
        let prev = self.heap.link(block, Prev);
        let smaller = self.heap.link(block, Smaller);
        let larger = self.heap.link(block, Larger);

        // each existing neighbor skips over the departing block
        self.heap.patch(next, Prev, prev);
        self.heap.patch(prev, Next, next);
        self.heap.patch(smaller, Larger, larger);
        self.heap.patch(larger, Smaller, smaller);
    }

    /// Writes a free block of `size` bytes at `block` and links it into
    /// both orderings.
    ///
    /// The head pointer follows the address list: it moves to `block`
    /// whenever the new block has the lowest address (or the list was
    /// empty).
    pub(crate) fn insert_free_block(&mut self, block: u32, size: u32) {
        self.heap.set_size(block, size);

        if self.free_list_head == NIL {
            for field in LinkField::ALL {
                self.heap.set_link(block, field, NIL);
            }
            self.free_list_head = block;
            return;
        }

        let (prev, next) = self.address_neighbors(block);
        let (smaller, larger) = self.size_neighbors(size);

        self.heap.set_link(block, Next, next);
        self.heap.set_link(block, Prev, prev);
        self.heap.set_link(block, Smaller, smaller);
        self.heap.set_link(block, Larger, larger);

        self.heap.patch(next, Prev, block);
        self.heap.patch(prev, Next, block);
        self.heap.patch(smaller, Larger, block);
        self.heap.patch(larger, Smaller, block);

        if block < self.free_list_head {
            self.free_list_head = block;
        }
    }

    /// Finds the (PREV, NEXT) pair the block at `block` will sit between
    /// on the address list. The list must be non-empty and must not
    /// already contain `block`.
    fn address_neighbors(&self, block: u32) -> (u32, u32) {
        if block < self.free_list_head {
            return (NIL, self.free_list_head);
        }
        let mut current = self.free_list_head;
        loop {
            let next = self.heap.link(current, Next);
            if next == NIL || next > block {
                return (current, next);
            }
            current = next;
        }
    }

    /// Finds the (SMALLER, LARGER) pair a block of `size` bytes will sit
    /// between on the size list. The walk starts at the head and moves in
    /// one direction only: towards LARGER while the head side is too
    /// small, towards SMALLER otherwise. Either neighbor may be [`NIL`].
    fn size_neighbors(&self, size: u32) -> (u32, u32) {
        let mut current = self.free_list_head;
        if self.heap.size_of(current) < size {
            loop {
                let larger = self.heap.link(current, Larger);
                if larger == NIL || self.heap.size_of(larger) >= size {
                    return (current, larger);
                }
                current = larger;
            }
        }
        loop {
            let smaller = self.heap.link(current, Smaller);
            if smaller == NIL || self.heap.size_of(smaller) < size {
                return (smaller, current);
            }
            current = smaller;
        }
    }

    /// Splits the free block at `block` into an allocated prefix of
    /// exactly `size` bytes and a free remainder.
    ///
    /// ```text
    /// before:  +--------------- free, size(B) ---------------+
    /// after:   +-- allocated, size --+-- free, size(B)-size --+
    /// ```
    ///
    /// Both sizes are quantum multiples, so the remainder is never
    /// smaller than one quantum; the exact-fit case never reaches this
    /// function.
    pub(crate) fn split_free_block(&mut self, block: u32, size: u32) {
        let total = self.heap.size_of(block);
        debug_assert!(total > size);

        self.remove_free_block(block);
        self.insert_free_block(block + size, total - size);

        // the prefix is no longer free and keeps only its size field
        self.heap.set_size(block, size);
    }

    /// Merges two address-adjacent free blocks into one spanning block at
    /// the lower address.
    fn merge_free_blocks(&mut self, first: u32, second: u32) {
        debug_assert_eq!(first + self.heap.size_of(first), second);

        let merged_size = self.heap.size_of(first) + self.heap.size_of(second);
        self.remove_free_block(second);
        self.remove_free_block(first);
        self.insert_free_block(first, merged_size);
    }

    /// Coalescing sweep: walks the address list from the head and merges
    /// every pair of blocks that touch. After a merge the sweep stays on
    /// the merged block instead of advancing, since the merge may have
    /// brought the next neighbor into contact as well. Afterwards no two
    /// free blocks are adjacent.
    pub(crate) fn coalesce(&mut self) {
        let mut current = self.free_list_head;
        while current != NIL {
            let next = self.heap.link(current, Next);
            if next != NIL && current + self.heap.size_of(current) == next {
                self.merge_free_blocks(current, next);
            } else {
                current = next;
            }
        }
    }
}
