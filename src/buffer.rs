//! Segmented zero-copy byte buffer with position-tracking cursors.
//!
//! Storage is a chain of fixed-size blocks drawn from the thread-local
//! [slab pool](crate::slab). Each block carries a monotonically increasing
//! id assigned at creation; ids strictly increase along the chain, which
//! makes a `(block id, offset)` pair a totally ordered position even though
//! blocks are scattered in memory.
//!
//! Two cursor flavours point into a buffer:
//!
//! * [`Cursor`] ("heavy") registers itself in the buffer's cursor arena and
//!   is automatically adjusted when bytes are inserted into or released
//!   from the middle of the buffer. It survives any structural mutation.
//! * [`LightCursor`] is a plain `Copy` position. It is cheaper, stays valid
//!   across appends (appends never renumber existing bytes), but is
//!   invalidated by `insert`, `release`, `drop_front` and `drop_back`.
//!
//! All position arithmetic (comparison, distance, advancing) is pure data
//! arithmetic because every block stores exactly [`Buffer::block_size`]
//! bytes.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{IoSlice, IoSliceMut};
use std::ptr::NonNull;
use std::rc::Rc;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::slab;

/// Bytes of payload per block.
const DATA: usize = slab::BLOCK_SIZE;

/// A position inside a buffer: block id plus byte offset inside the block.
///
/// Light cursors are not tracked by the buffer; any structural mutation
/// other than appending invalidates them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightCursor {
    id: u64,
    off: u32,
}

impl LightCursor {
    /// Absolute byte coordinate. Block ids grow by one per block, so this
    /// is exact and normalizes the `(id, DATA)` / `(id + 1, 0)` boundary
    /// spelling of the same position.
    #[inline]
    fn abs(self) -> u128 {
        self.id as u128 * DATA as u128 + self.off as u128
    }

    #[inline]
    fn from_abs(abs: u128) -> Self {
        Self {
            id: (abs / DATA as u128) as u64,
            off: (abs % DATA as u128) as u32,
        }
    }

    /// Advance the position by `n` bytes.
    #[inline]
    pub fn advance(&mut self, n: usize) {
        *self = Self::from_abs(self.abs() + n as u128);
    }

    /// The position `n` bytes further.
    #[inline]
    #[must_use]
    pub fn plus(self, n: usize) -> Self {
        Self::from_abs(self.abs() + n as u128)
    }

    /// Byte distance to an earlier position.
    #[inline]
    pub fn sub(self, earlier: LightCursor) -> usize {
        debug_assert!(self >= earlier);
        (self.abs() - earlier.abs()) as usize
    }
}

impl PartialEq for LightCursor {
    fn eq(&self, other: &Self) -> bool {
        self.abs() == other.abs()
    }
}

impl Eq for LightCursor {}

impl PartialOrd for LightCursor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LightCursor {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.abs().cmp(&other.abs())
    }
}

struct Slot {
    pos: LightCursor,
    generation: u32,
    occupied: bool,
}

/// Arena of registered (heavy) cursor positions. Owned by the buffer,
/// shared with cursor handles through `Rc` so handles can unregister
/// themselves on drop. Single-threaded by the crate's concurrency model.
struct CursorArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl CursorArena {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    fn register(&mut self, pos: LightCursor) -> (u32, u32) {
        if let Some(slot) = self.free.pop() {
            let s = &mut self.slots[slot as usize];
            debug_assert!(!s.occupied);
            s.pos = pos;
            s.generation = s.generation.wrapping_add(1);
            s.occupied = true;
            (slot, s.generation)
        } else {
            self.slots.push(Slot {
                pos,
                generation: 0,
                occupied: true,
            });
            ((self.slots.len() - 1) as u32, 0)
        }
    }

    fn unregister(&mut self, slot: u32, generation: u32) {
        let s = &mut self.slots[slot as usize];
        debug_assert!(s.occupied && s.generation == generation);
        s.occupied = false;
        self.free.push(slot);
    }

    fn get(&self, slot: u32, generation: u32) -> LightCursor {
        let s = &self.slots[slot as usize];
        debug_assert!(s.occupied && s.generation == generation);
        s.pos
    }

    fn set(&mut self, slot: u32, generation: u32, pos: LightCursor) {
        let s = &mut self.slots[slot as usize];
        debug_assert!(s.occupied && s.generation == generation);
        s.pos = pos;
    }

    /// Leftmost registered position, if any cursor is alive.
    fn min_pos(&self) -> Option<LightCursor> {
        self.slots
            .iter()
            .filter(|s| s.occupied)
            .map(|s| s.pos)
            .min()
    }

    /// After an insert of `n` bytes at `at`: every cursor at or past the
    /// insertion point moves forward. Cursors sharing the insertion
    /// position all move uniformly.
    fn adjust_insert(&mut self, at: LightCursor, n: usize) {
        for s in self.slots.iter_mut().filter(|s| s.occupied) {
            if s.pos >= at {
                s.pos.advance(n);
            }
        }
    }

    /// After a release of `n` bytes at `at`: cursors past the released
    /// range move back, cursors inside it are clamped to `at`.
    fn adjust_release(&mut self, at: LightCursor, n: usize) {
        for s in self.slots.iter_mut().filter(|s| s.occupied) {
            if s.pos > at {
                if s.pos.sub(at) <= n {
                    s.pos = at;
                } else {
                    s.pos = LightCursor::from_abs(s.pos.abs() - n as u128);
                }
            }
        }
    }
}

/// A buffer position that keeps itself registered in the buffer's cursor
/// arena. Automatically adjusted by `insert` and `release`; respected by
/// `flush`. Cloning registers an independent copy.
pub struct Cursor {
    arena: Rc<RefCell<CursorArena>>,
    slot: u32,
    generation: u32,
}

impl Cursor {
    /// Current position as a plain copyable value.
    #[inline]
    pub fn pos(&self) -> LightCursor {
        self.arena.borrow().get(self.slot, self.generation)
    }

    /// Move the cursor forward by `n` bytes.
    pub fn advance(&self, n: usize) {
        let mut arena = self.arena.borrow_mut();
        let mut pos = arena.get(self.slot, self.generation);
        pos.advance(n);
        arena.set(self.slot, self.generation, pos);
    }

    /// Reposition the cursor.
    pub fn set(&self, pos: LightCursor) {
        self.arena
            .borrow_mut()
            .set(self.slot, self.generation, pos);
    }

    /// Byte distance to an earlier cursor of the same buffer.
    pub fn sub(&self, earlier: &Cursor) -> usize {
        debug_assert!(Rc::ptr_eq(&self.arena, &earlier.arena));
        self.pos().sub(earlier.pos())
    }
}

impl Clone for Cursor {
    fn clone(&self) -> Self {
        let pos = self.pos();
        let (slot, generation) = self.arena.borrow_mut().register(pos);
        Self {
            arena: Rc::clone(&self.arena),
            slot,
            generation,
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        self.arena.borrow_mut().unregister(self.slot, self.generation);
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").field("pos", &self.pos()).finish()
    }
}

impl PartialEq for Cursor {
    fn eq(&self, other: &Self) -> bool {
        debug_assert!(Rc::ptr_eq(&self.arena, &other.arena));
        self.pos() == other.pos()
    }
}

impl Eq for Cursor {}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        debug_assert!(Rc::ptr_eq(&self.arena, &other.arena));
        self.pos().cmp(&other.pos())
    }
}

struct Block {
    id: u64,
    data: NonNull<u8>,
}

impl Block {
    #[inline]
    fn ptr(&self, off: usize) -> *mut u8 {
        debug_assert!(off <= DATA);
        // SAFETY: off stays within the block's DATA bytes.
        unsafe { self.data.as_ptr().add(off) }
    }
}

/// Segmented byte container. See the module docs for the cursor contract.
///
/// Not copyable; not `Send` (blocks belong to the thread-local slab pool).
pub struct Buffer {
    blocks: VecDeque<Block>,
    next_id: u64,
    begin: LightCursor,
    end: LightCursor,
    arena: Rc<RefCell<CursorArena>>,
}

impl Buffer {
    /// An empty buffer holding one pool block.
    pub fn new() -> Self {
        let block = Block {
            id: 0,
            data: slab::alloc_block(),
        };
        let origin = LightCursor { id: 0, off: 0 };
        let mut blocks = VecDeque::new();
        blocks.push_back(block);
        Self {
            blocks,
            next_id: 1,
            begin: origin,
            end: origin,
            arena: Rc::new(RefCell::new(CursorArena::new())),
        }
    }

    /// Payload bytes per block.
    pub const fn block_size() -> usize {
        DATA
    }

    #[inline]
    fn first_id(&self) -> u64 {
        self.blocks[0].id
    }

    #[inline]
    fn block(&self, id: u64) -> &Block {
        &self.blocks[(id - self.first_id()) as usize]
    }

    fn push_block(&mut self) {
        self.blocks.push_back(Block {
            id: self.next_id,
            data: slab::alloc_block(),
        });
        self.next_id += 1;
    }

    fn pop_back_block(&mut self) {
        let block = self.blocks.pop_back().expect("buffer block chain is never empty");
        // SAFETY: the block came from the thread-local pool and no position
        // can reference it after it leaves the chain.
        unsafe { slab::free_block(block.data) };
        self.next_id -= 1;
    }

    fn pop_front_block(&mut self) {
        let block = self.blocks.pop_front().expect("buffer block chain is never empty");
        // SAFETY: same as pop_back_block.
        unsafe { slab::free_block(block.data) };
    }

    /// Heavy cursor at the first byte.
    pub fn begin(&self) -> Cursor {
        self.make_cursor(self.begin)
    }

    /// Heavy cursor one past the last byte.
    pub fn end(&self) -> Cursor {
        self.make_cursor(self.end)
    }

    /// Light position of the first byte.
    #[inline]
    pub fn begin_pos(&self) -> LightCursor {
        self.begin
    }

    /// Light position one past the last byte.
    #[inline]
    pub fn end_pos(&self) -> LightCursor {
        self.end
    }

    /// Register a heavy cursor at an arbitrary position of this buffer.
    pub fn make_cursor(&self, pos: LightCursor) -> Cursor {
        debug_assert!(pos >= self.begin && pos <= self.end);
        let (slot, generation) = self.arena.borrow_mut().register(pos);
        Cursor {
            arena: Rc::clone(&self.arena),
            slot,
            generation,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Bytes currently stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.end.sub(self.begin)
    }

    /// True iff `n` bytes are available at and after `pos`.
    #[inline]
    pub fn has(&self, pos: LightCursor, n: usize) -> bool {
        pos.abs() + n as u128 <= self.end.abs()
    }

    /// Free space left in the tail block.
    #[inline]
    fn tail_room(&self) -> usize {
        DATA - self.end.off as usize
    }

    /// Append a copy of `src`. New blocks are drawn from the pool as the
    /// tail fills; the tail block is replaced eagerly when it fills
    /// exactly, so `end` always points into an existing block.
    pub fn append_bytes(&mut self, src: &[u8]) {
        let mut src = src;
        while !src.is_empty() {
            let room = self.tail_room();
            let k = src.len().min(room);
            let dst = self.block(self.end.id).ptr(self.end.off as usize);
            // SAFETY: k <= room bytes remain in the tail block; src and the
            // block never overlap.
            unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst, k) };
            src = &src[k..];
            self.end.off += k as u32;
            if self.end.off as usize == DATA {
                self.push_block();
                self.end = LightCursor {
                    id: self.end.id + 1,
                    off: 0,
                };
            }
        }
    }

    /// Append the raw bytes of a fixed-layout value.
    pub fn append<T: IntoBytes + Immutable>(&mut self, value: &T) {
        self.append_bytes(value.as_bytes());
    }

    /// Reserve `n` uninitialised bytes at the tail without copying.
    /// Used to reserve header space patched once the body is known.
    pub fn advance_back(&mut self, n: usize) {
        let mut n = n;
        while n > 0 {
            let room = self.tail_room();
            let k = n.min(room);
            n -= k;
            self.end.off += k as u32;
            if self.end.off as usize == DATA {
                self.push_block();
                self.end = LightCursor {
                    id: self.end.id + 1,
                    off: 0,
                };
            }
        }
    }

    /// Release `n` bytes from the back. Emptied blocks return to the pool.
    /// No live cursor may point into the dropped range.
    pub fn drop_back(&mut self, n: usize) {
        debug_assert!(n <= self.len());
        let new_end = LightCursor::from_abs(self.end.abs() - n as u128);
        while self.blocks.back().map(|b| b.id) > Some(new_end.id) {
            self.pop_back_block();
        }
        self.end = new_end;
        debug_assert!(self
            .arena
            .borrow()
            .slots
            .iter()
            .all(|s| !s.occupied || s.pos <= self.end));
    }

    /// Release `n` bytes from the front. Emptied blocks return to the pool.
    /// No live cursor may point into the dropped range.
    pub fn drop_front(&mut self, n: usize) {
        debug_assert!(n <= self.len());
        let new_begin = self.begin.plus(n);
        debug_assert!(self
            .arena
            .borrow()
            .min_pos()
            .map_or(true, |p| p >= new_begin));
        while self.blocks.front().map(|b| b.id) < Some(new_begin.id) {
            self.pop_front_block();
        }
        self.begin = new_begin;
    }

    /// Drop everything before the leftmost live heavy cursor, or the whole
    /// content if no cursor is registered.
    pub fn flush(&mut self) {
        let keep_from = self.arena.borrow().min_pos().unwrap_or(self.end);
        let keep_from = keep_from.min(self.end).max(self.begin);
        let n = keep_from.sub(self.begin);
        if n > 0 {
            self.drop_front(n);
        }
    }

    /// Insert `n` uninitialised bytes at `at`. Every live heavy cursor at
    /// or past `at` advances by `n`; light cursors are invalidated.
    /// `n` must not exceed the block size.
    pub fn insert(&mut self, at: LightCursor, n: usize) {
        assert!(n <= DATA, "insert size must not exceed the block size");
        debug_assert!(at >= self.begin && at <= self.end);
        if n == 0 {
            return;
        }
        let old_end = self.end;
        self.advance_back(n);
        let tail = old_end.sub(at);
        if tail > 0 {
            // Slide the suffix right, walking the chain from the tail.
            self.copy_backward(old_end, old_end.plus(n), tail);
        }
        self.arena.borrow_mut().adjust_insert(at, n);
    }

    /// Remove `n` bytes at `at`, sliding the suffix left. Cursors past the
    /// removed range move back by `n`; cursors inside it are clamped to
    /// `at`; light cursors are invalidated.
    pub fn release(&mut self, at: LightCursor, n: usize) {
        debug_assert!(at >= self.begin);
        debug_assert!(self.has(at, n));
        if n == 0 {
            return;
        }
        let tail = self.end.sub(at.plus(n));
        if tail > 0 {
            self.copy_forward(at.plus(n), at, tail);
        }
        self.arena.borrow_mut().adjust_release(at, n);
        self.drop_back(n);
    }

    /// Backward overlapping move of `len` bytes ending at `src_end` to the
    /// range ending at `dst_end`. Requires `dst_end >= src_end`.
    fn copy_backward(&mut self, src_end: LightCursor, dst_end: LightCursor, len: usize) {
        let mut remaining = len;
        let mut s = src_end.abs();
        let mut d = dst_end.abs();
        let first_id = self.first_id() as u128;
        while remaining > 0 {
            // Room from the start of the block holding the byte before the
            // current edge, so each chunk stays inside one block.
            let s_room = ((s - 1) % DATA as u128 + 1) as usize;
            let d_room = ((d - 1) % DATA as u128 + 1) as usize;
            let k = remaining.min(s_room).min(d_room);
            s -= k as u128;
            d -= k as u128;
            let s_idx = (s / DATA as u128 - first_id) as usize;
            let d_idx = (d / DATA as u128 - first_id) as usize;
            let src = self.blocks[s_idx].ptr((s % DATA as u128) as usize);
            let dst = self.blocks[d_idx].ptr((d % DATA as u128) as usize);
            // SAFETY: both ranges of k bytes lie within single live blocks;
            // ptr::copy tolerates the overlap inside one block.
            unsafe { std::ptr::copy(src, dst, k) };
            remaining -= k;
        }
    }

    /// Forward overlapping move of `len` bytes from `src_beg` to
    /// `dst_beg`. Requires `dst_beg <= src_beg`.
    fn copy_forward(&mut self, src_beg: LightCursor, dst_beg: LightCursor, len: usize) {
        let mut remaining = len;
        let mut s = src_beg.abs();
        let mut d = dst_beg.abs();
        let first_id = self.first_id() as u128;
        while remaining > 0 {
            let s_room = (DATA as u128 - s % DATA as u128) as usize;
            let d_room = (DATA as u128 - d % DATA as u128) as usize;
            let k = remaining.min(s_room).min(d_room);
            let s_idx = (s / DATA as u128 - first_id) as usize;
            let d_idx = (d / DATA as u128 - first_id) as usize;
            let src = self.blocks[s_idx].ptr((s % DATA as u128) as usize);
            let dst = self.blocks[d_idx].ptr((d % DATA as u128) as usize);
            // SAFETY: both k-byte ranges lie within single live blocks.
            unsafe { std::ptr::copy(src, dst, k) };
            s += k as u128;
            d += k as u128;
            remaining -= k;
        }
    }

    /// Copy `dst.len()` bytes starting at `pos` out of the buffer.
    pub fn read_bytes(&self, pos: LightCursor, dst: &mut [u8]) {
        debug_assert!(self.has(pos, dst.len()));
        let mut a = pos.abs();
        let first_id = self.first_id() as u128;
        let mut dst = dst;
        while !dst.is_empty() {
            let room = (DATA as u128 - a % DATA as u128) as usize;
            let k = dst.len().min(room);
            let idx = (a / DATA as u128 - first_id) as usize;
            let src = self.blocks[idx].ptr((a % DATA as u128) as usize);
            // SAFETY: k bytes fit in the block; dst is a distinct slice.
            unsafe { std::ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), k) };
            dst = &mut dst[k..];
            a += k as u128;
        }
    }

    /// Overwrite bytes starting at `pos` with `src`. The range must lie
    /// within the current content (or the reserved tail).
    pub fn write_bytes(&mut self, pos: LightCursor, src: &[u8]) {
        debug_assert!(self.has(pos, src.len()));
        let mut a = pos.abs();
        let first_id = self.first_id() as u128;
        let mut src = src;
        while !src.is_empty() {
            let room = (DATA as u128 - a % DATA as u128) as usize;
            let k = src.len().min(room);
            let idx = (a / DATA as u128 - first_id) as usize;
            let dst = self.blocks[idx].ptr((a % DATA as u128) as usize);
            // SAFETY: k bytes fit in the block; src is a distinct slice.
            unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst, k) };
            src = &src[k..];
            a += k as u128;
        }
    }

    /// Read one byte.
    #[inline]
    pub fn read_u8(&self, pos: LightCursor) -> u8 {
        debug_assert!(self.has(pos, 1));
        let a = pos.abs();
        let idx = (a / DATA as u128) as u64 - self.first_id();
        // SAFETY: the position is inside the live range.
        unsafe { *self.blocks[idx as usize].ptr((a % DATA as u128) as usize) }
    }

    /// Typed read of a fixed-layout value at `pos`.
    pub fn read_at<T: FromBytes + IntoBytes + KnownLayout>(&self, pos: LightCursor) -> T {
        let mut value = T::new_zeroed();
        self.read_bytes(pos, value.as_mut_bytes());
        value
    }

    /// Typed overwrite of a fixed-layout value at `pos`.
    pub fn write_at<T: IntoBytes + Immutable>(&mut self, pos: LightCursor, value: &T) {
        self.write_bytes(pos, value.as_bytes());
    }

    /// Fill `vecs` with up to `max` contiguous extents of `[start, end)`.
    /// Returns the number of extents written. No allocation, no copying.
    pub fn get_iov<'a>(
        &'a self,
        start: LightCursor,
        end: LightCursor,
        vecs: &mut Vec<IoSlice<'a>>,
        max: usize,
    ) -> usize {
        debug_assert!(start <= end && end <= self.end);
        let mut a = start.abs();
        let stop = end.abs();
        let first_id = self.first_id() as u128;
        let mut cnt = 0;
        while a < stop && cnt < max {
            let room = (DATA as u128 - a % DATA as u128).min(stop - a) as usize;
            let idx = (a / DATA as u128 - first_id) as usize;
            let ptr = self.blocks[idx].ptr((a % DATA as u128) as usize);
            // SAFETY: room bytes are inside one live block; the slice
            // borrows self for 'a, so the buffer cannot mutate under it.
            let slice = unsafe { std::slice::from_raw_parts(ptr, room) };
            vecs.push(IoSlice::new(slice));
            a += room as u128;
            cnt += 1;
        }
        cnt
    }

    /// Mutable scatter view of `[start, end)`, used by the reactor to read
    /// from a socket straight into reserved buffer space.
    pub(crate) fn get_iov_mut<'a>(
        &'a mut self,
        start: LightCursor,
        end: LightCursor,
        vecs: &mut Vec<IoSliceMut<'a>>,
        max: usize,
    ) -> usize {
        debug_assert!(start <= end && end <= self.end);
        let mut a = start.abs();
        let stop = end.abs();
        let first_id = self.first_id() as u128;
        let mut cnt = 0;
        while a < stop && cnt < max {
            let room = (DATA as u128 - a % DATA as u128).min(stop - a) as usize;
            let idx = (a / DATA as u128 - first_id) as usize;
            let ptr = self.blocks[idx].ptr((a % DATA as u128) as usize);
            // SAFETY: the extents of [start, end) partition disjoint block
            // ranges, so the mutable slices never alias each other, and
            // &'a mut self keeps the buffer untouchable while they live.
            let slice = unsafe { std::slice::from_raw_parts_mut(ptr, room) };
            vecs.push(IoSliceMut::new(slice));
            a += room as u128;
            cnt += 1;
        }
        cnt
    }

    /// Structural consistency check used by tests. Returns 0 when healthy.
    pub fn self_check(&self) -> u32 {
        let mut res = 0;
        let mut expected = self.first_id();
        for b in &self.blocks {
            if b.id != expected {
                res |= 1;
            }
            expected = b.id + 1;
        }
        if expected != self.next_id {
            res |= 2;
        }
        if self.begin > self.end {
            res |= 4;
        }
        if self.begin.id < self.first_id() || self.end.id >= self.next_id {
            res |= 8;
        }
        let arena = self.arena.borrow();
        for s in arena.slots.iter().filter(|s| s.occupied) {
            if s.pos < self.begin || s.pos > self.end {
                res |= 16;
            }
        }
        res
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        for block in self.blocks.drain(..) {
            // SAFETY: the buffer exclusively owns its blocks.
            unsafe { slab::free_block(block.data) };
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("blocks", &self.blocks.len())
            .field("len", &self.len())
            .finish()
    }
}
