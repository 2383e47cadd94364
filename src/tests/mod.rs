
use core::alloc::Layout;

use super::*;
use crate::blocks::LinkField;

/// A guard that initializes the allocator with a region of memory on
/// creation, and frees that memory when dropped.
///
/// The buffer is aligned to [`BLOCK_QUANTUM`], so `init` keeps its full
/// size and the block offsets asserted by the tests are exact.
pub(crate) struct AllocatorInitGuard<const MEM_SIZE: usize> {
    addr: usize,
    layout: Layout,
    pub(crate) allocator: Allocator,
}

impl<const MEM_SIZE: usize> AllocatorInitGuard<MEM_SIZE> {
    /// Creates an empty allocator init guard.
    pub(crate) const fn empty() -> Self {
        Self {
            addr: 0,
            layout: Layout::new::<u8>(),
            allocator: Allocator::empty(),
        }
    }

    /// Initializes the heap allocator and returns a guard for it.
    pub(crate) fn init(&mut self) {
        self.layout = Layout::from_size_align(MEM_SIZE, BLOCK_QUANTUM as usize).unwrap();

        self.addr = unsafe { std::alloc::alloc(self.layout) as usize };

        unsafe { self.allocator.init(self.addr, MEM_SIZE) }
    }

    /// Returns the address of the allocated heap memory region.
    pub(crate) fn addr(&self) -> usize {
        self.addr
    }
}

impl<const MEM_SIZE: usize> Drop for AllocatorInitGuard<MEM_SIZE> {
    fn drop(&mut self) {
        if self.addr != 0 {
            unsafe { std::alloc::dealloc(self.addr as *mut u8, self.layout) }
        }
    }
}

/// Walks the whole heap and both free-list orderings, asserting every
/// structural invariant that must hold between two public calls.
pub(crate) fn check_heap(allocator: &Allocator) {
    let heap_size = allocator.heap.heap_size();

    // the address-ordered list must be doubly linked, strictly
    // increasing, and must never contain two adjacent blocks
    let mut address_order = Vec::new();
    let mut prev = NIL;
    let mut current = allocator.free_list_head;
    while current != NIL {
        assert_eq!(allocator.heap.link(current, LinkField::Prev), prev);
        if prev != NIL {
            assert!(prev < current);
            assert!(prev + allocator.heap.size_of(prev) < current);
        }
        address_order.push(current);
        prev = current;
        current = allocator.heap.link(current, LinkField::Next);
    }

    // the size-ordered list must be doubly linked and non-decreasing;
    // walk it from its smallest end
    let mut size_order = Vec::new();
    if allocator.free_list_head != NIL {
        let mut smallest = allocator.free_list_head;
        loop {
            let smaller = allocator.heap.link(smallest, LinkField::Smaller);
            if smaller == NIL {
                break;
            }
            smallest = smaller;
        }

        let mut prev = NIL;
        let mut current = smallest;
        while current != NIL {
            assert_eq!(allocator.heap.link(current, LinkField::Smaller), prev);
            if prev != NIL {
                assert!(allocator.heap.size_of(prev) <= allocator.heap.size_of(current));
            }
            size_order.push(current);
            prev = current;
            current = allocator.heap.link(current, LinkField::Larger);
        }
    }

    // both orderings must enumerate the same set of blocks
    size_order.sort_unstable();
    assert_eq!(address_order, size_order);

    // the blocks must tile the heap exactly, every one a whole number of
    // quanta
    let mut offset = HEAP_OFFSET;
    while offset < heap_size {
        let size = allocator.heap.size_of(offset);
        assert!(size >= BLOCK_QUANTUM);
        assert_eq!(size & QUANTUM_MASK, 0);
        offset += size;
    }
    assert_eq!(offset, heap_size);
}

/// Asserts that the heap consists of exactly one free block spanning the
/// whole region, the state `init` creates.
pub(crate) fn assert_single_spanning_free_block(allocator: &Allocator) {
    assert_eq!(allocator.free_list_head, HEAP_OFFSET);
    assert_eq!(
        allocator.heap.size_of(HEAP_OFFSET),
        allocator.heap.heap_size()
    );
    for field in LinkField::ALL {
        assert_eq!(allocator.heap.link(HEAP_OFFSET, field), NIL);
    }
}
