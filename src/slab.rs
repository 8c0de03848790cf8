//! Fixed-size block allocator backing [`Buffer`](crate::Buffer).
//!
//! Blocks of `BLOCK_SIZE` bytes are carved out of large slabs. Freed blocks
//! are recycled through a single-linked free list threaded through the first
//! pointer-sized bytes of the blocks themselves, so the allocator keeps no
//! per-block metadata. Slabs are returned to the system allocator only when
//! the pool itself is dropped: the hot path allocates and frees blocks at a
//! per-request rate and must stay O(1).
//!
//! A thread-local default instance serves all buffers of the thread.
//! Explicit instances can be constructed in tests.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::cell::RefCell;
use std::ptr::NonNull;

/// Size of one buffer block, a power of two.
pub const BLOCK_SIZE: usize = 16 * 1024;

/// Number of blocks preallocated per slab.
pub const SLAB_BLOCKS: usize = 256;

/// Size of one slab.
pub const SLAB_SIZE: usize = BLOCK_SIZE * SLAB_BLOCKS;

/// Block alignment: the largest power-of-two divisor of `BLOCK_SIZE`.
pub const BLOCK_ALIGN: usize = BLOCK_SIZE & BLOCK_SIZE.wrapping_neg();

/// Slab alignment. Every block inside an aligned slab is itself aligned.
pub const SLAB_ALIGN: usize = BLOCK_ALIGN;

const _: () = assert!(BLOCK_SIZE.is_power_of_two());
const _: () = assert!(BLOCK_SIZE >= std::mem::size_of::<*mut u8>());
const _: () = assert!(SLAB_BLOCKS > 1);

/// Classic mempool: slab preallocation plus a free list of recycled blocks.
///
/// Not `Send`: the pool hands out raw blocks and must stay confined to the
/// thread that owns the buffers built on top of it.
pub struct SlabPool {
    slabs: Vec<NonNull<u8>>,
    free_list: *mut u8,
    prealloc_beg: *mut u8,
    prealloc_end: *mut u8,
    live_blocks: usize,
}

impl SlabPool {
    pub fn new() -> Self {
        Self {
            slabs: Vec::new(),
            free_list: std::ptr::null_mut(),
            prealloc_beg: std::ptr::null_mut(),
            prealloc_end: std::ptr::null_mut(),
            live_blocks: 0,
        }
    }

    fn slab_layout() -> Layout {
        // Both constants are powers of two, the layout is always valid.
        match Layout::from_size_align(SLAB_SIZE, SLAB_ALIGN) {
            Ok(layout) => layout,
            Err(_) => unreachable!(),
        }
    }

    /// Hand out one `BLOCK_SIZE`-byte block, aligned to `BLOCK_ALIGN`.
    ///
    /// Never fails at the API level: exhausting system memory aborts the
    /// process through the global allocation failure handler.
    pub fn allocate(&mut self) -> NonNull<u8> {
        if self.prealloc_beg != self.prealloc_end {
            let res = self.prealloc_beg;
            // SAFETY: prealloc_beg < prealloc_end, both inside one slab.
            self.prealloc_beg = unsafe { res.add(BLOCK_SIZE) };
            self.live_blocks += 1;
            // SAFETY: res points into a live slab, never null.
            return unsafe { NonNull::new_unchecked(res) };
        }
        if !self.free_list.is_null() {
            let res = self.free_list;
            // SAFETY: a free block stores the next-free pointer in its
            // first pointer-sized bytes, written by deallocate().
            self.free_list = unsafe { res.cast::<*mut u8>().read() };
            self.live_blocks += 1;
            // SAFETY: res came off the free list and is never null.
            return unsafe { NonNull::new_unchecked(res) };
        }
        // SAFETY: slab_layout() has non-zero size.
        let slab = unsafe { alloc(Self::slab_layout()) };
        let Some(slab) = NonNull::new(slab) else {
            handle_alloc_error(Self::slab_layout());
        };
        self.slabs.push(slab);
        // SAFETY: offsets stay within the freshly allocated slab.
        unsafe {
            self.prealloc_beg = slab.as_ptr().add(BLOCK_SIZE);
            self.prealloc_end = slab.as_ptr().add(SLAB_SIZE);
        }
        self.live_blocks += 1;
        slab
    }

    /// Return a block to the free list. O(1).
    ///
    /// # Safety
    /// `ptr` must have been returned by `allocate()` on this very pool and
    /// must not be used after this call.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        #[cfg(debug_assertions)]
        // SAFETY: caller guarantees ptr owns BLOCK_SIZE bytes.
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0xab, BLOCK_SIZE);
        }
        // SAFETY: the block is dead, its first bytes are ours to reuse.
        unsafe {
            ptr.as_ptr().cast::<*mut u8>().write(self.free_list);
        }
        self.free_list = ptr.as_ptr();
        self.live_blocks -= 1;
    }

    /// Count of blocks currently handed out.
    pub fn live_blocks(&self) -> usize {
        self.live_blocks
    }

    /// Count of slabs acquired from the system allocator.
    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    /// Walk the free list and the prealloc window, checking accounting.
    /// Returns 0 when consistent.
    pub fn selfcheck(&self) -> u32 {
        let mut res = 0;
        let mut free_count = 0usize;
        let mut f = self.free_list;
        while !f.is_null() {
            // SAFETY: every free-list node stores the next pointer in place.
            f = unsafe { f.cast::<*mut u8>().read() };
            free_count += 1;
        }
        let prealloc = (self.prealloc_end as usize - self.prealloc_beg as usize) / BLOCK_SIZE;
        let total = self.slabs.len() * SLAB_BLOCKS;
        if total != free_count + prealloc + self.live_blocks {
            res |= 1;
        }
        res
    }
}

impl Default for SlabPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SlabPool {
    fn drop(&mut self) {
        for slab in self.slabs.drain(..) {
            // SAFETY: every entry was allocated with slab_layout().
            unsafe { dealloc(slab.as_ptr(), Self::slab_layout()) };
        }
    }
}

thread_local! {
    static POOL: RefCell<SlabPool> = RefCell::new(SlabPool::new());
}

/// Allocate a block from the thread-local pool.
pub(crate) fn alloc_block() -> NonNull<u8> {
    POOL.with(|p| p.borrow_mut().allocate())
}

/// Return a block to the thread-local pool.
///
/// # Safety
/// Same contract as [`SlabPool::deallocate`], against the thread-local pool.
pub(crate) unsafe fn free_block(ptr: NonNull<u8>) {
    // During thread teardown the pool may already be gone; the slabs are
    // released with it, so the block needs no individual return.
    let _ = POOL.try_with(|p| {
        // SAFETY: forwarded caller contract.
        unsafe { p.borrow_mut().deallocate(ptr) }
    });
}

/// Snapshot of the thread-local pool counters: `(live_blocks, slab_count)`.
pub fn thread_pool_stats() -> (usize, usize) {
    POOL.with(|p| {
        let p = p.borrow();
        (p.live_blocks(), p.slab_count())
    })
}
