use crate::slab::{SlabPool, BLOCK_ALIGN, BLOCK_SIZE, SLAB_BLOCKS};

#[test]
fn fresh_pool_is_empty() {
    let pool = SlabPool::new();
    assert_eq!(pool.live_blocks(), 0);
    assert_eq!(pool.slab_count(), 0);
    assert_eq!(pool.selfcheck(), 0);
}

#[test]
fn allocate_is_aligned() {
    let mut pool = SlabPool::new();
    for _ in 0..16 {
        let ptr = pool.allocate();
        assert_eq!(ptr.as_ptr() as usize % BLOCK_ALIGN, 0);
    }
    assert_eq!(pool.live_blocks(), 16);
    assert_eq!(pool.slab_count(), 1);
    assert_eq!(pool.selfcheck(), 0);
}

#[test]
fn freed_blocks_are_reused() {
    let mut pool = SlabPool::new();
    let a = pool.allocate();
    let b = pool.allocate();
    // SAFETY: a and b came from this pool and are not used again.
    unsafe {
        pool.deallocate(a);
        pool.deallocate(b);
    }
    assert_eq!(pool.live_blocks(), 0);
    // LIFO reuse off the free list.
    let c = pool.allocate();
    let d = pool.allocate();
    assert_eq!(c, b);
    assert_eq!(d, a);
    assert_eq!(pool.slab_count(), 1);
    assert_eq!(pool.selfcheck(), 0);
}

#[test]
fn grows_by_whole_slabs() {
    let mut pool = SlabPool::new();
    let mut blocks = Vec::new();
    for _ in 0..SLAB_BLOCKS {
        blocks.push(pool.allocate());
    }
    assert_eq!(pool.slab_count(), 1);
    blocks.push(pool.allocate());
    assert_eq!(pool.slab_count(), 2);
    assert_eq!(pool.live_blocks(), SLAB_BLOCKS + 1);
    assert_eq!(pool.selfcheck(), 0);

    for b in blocks {
        // SAFETY: every block came from this pool.
        unsafe { pool.deallocate(b) };
    }
    assert_eq!(pool.live_blocks(), 0);
    // Slabs are kept for reuse until the pool dies.
    assert_eq!(pool.slab_count(), 2);
    assert_eq!(pool.selfcheck(), 0);
}

#[test]
fn blocks_do_not_overlap_within_a_slab() {
    let mut pool = SlabPool::new();
    let mut ptrs: Vec<usize> = (0..8).map(|_| pool.allocate().as_ptr() as usize).collect();
    ptrs.sort_unstable();
    for pair in ptrs.windows(2) {
        assert!(pair[1] - pair[0] >= BLOCK_SIZE);
    }
}

#[test]
fn blocks_are_writable_end_to_end() {
    let mut pool = SlabPool::new();
    let ptr = pool.allocate();
    // SAFETY: the pool hands out BLOCK_SIZE exclusive bytes.
    unsafe {
        std::ptr::write_bytes(ptr.as_ptr(), 0x5a, BLOCK_SIZE);
        assert_eq!(*ptr.as_ptr(), 0x5a);
        assert_eq!(*ptr.as_ptr().add(BLOCK_SIZE - 1), 0x5a);
        pool.deallocate(ptr);
    }
}
