use crate::buffer::Buffer;
use crate::slab;

fn contents(buf: &Buffer) -> Vec<u8> {
    let mut out = vec![0u8; buf.len()];
    buf.read_bytes(buf.begin_pos(), &mut out);
    out
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

const BLOCK: usize = Buffer::block_size();

#[test]
fn new_buffer_is_empty() {
    let buf = Buffer::new();
    assert!(buf.is_empty());
    assert_eq!(buf.len(), 0);
    assert_eq!(buf.begin_pos(), buf.end_pos());
    assert_eq!(buf.self_check(), 0);
}

#[test]
fn append_and_read_back() {
    let mut buf = Buffer::new();
    buf.append_bytes(b"hello world");
    assert_eq!(buf.len(), 11);
    assert_eq!(contents(&buf), b"hello world");
    assert_eq!(buf.self_check(), 0);
}

#[test]
fn append_spanning_blocks() {
    let mut buf = Buffer::new();
    let data = pattern(3 * BLOCK + 100);
    buf.append_bytes(&data);
    assert_eq!(buf.len(), data.len());
    assert_eq!(contents(&buf), data);
    assert_eq!(buf.self_check(), 0);
}

#[test]
fn cursor_trichotomy_and_distance() {
    let mut buf = Buffer::new();
    buf.append_bytes(&pattern(2 * BLOCK + 10));

    let a = buf.begin_pos();
    let b = a.plus(5);
    let c = a.plus(BLOCK + 7);

    assert!(a < b && b < c);
    assert_eq!(b.sub(a), 5);
    assert_eq!(c.sub(a), BLOCK + 7);
    assert_eq!(c.sub(b), BLOCK + 2);

    // Exactly one ordering holds for every pair.
    for (x, y) in [(a, b), (b, c), (a, c), (a, a)] {
        let count = [x < y, x == y, x > y].iter().filter(|f| **f).count();
        assert_eq!(count, 1);
    }
}

#[test]
fn cursor_block_boundary_positions_compare_equal() {
    let mut buf = Buffer::new();
    buf.append_bytes(&pattern(BLOCK + 1));
    // Stepping to the boundary byte-by-byte and jumping there directly
    // must agree.
    let mut step = buf.begin_pos();
    for _ in 0..BLOCK {
        step.advance(1);
    }
    let jump = buf.begin_pos().plus(BLOCK);
    assert_eq!(step, jump);
    assert_eq!(jump.sub(buf.begin_pos()), BLOCK);
}

#[test]
fn heavy_cursor_survives_appends() {
    let mut buf = Buffer::new();
    buf.append_bytes(b"abc");
    let c = buf.end();
    buf.append_bytes(&pattern(2 * BLOCK));
    assert_eq!(c.pos().sub(buf.begin_pos()), 3);
    let mut byte = [0u8; 1];
    buf.read_bytes(c.pos(), &mut byte);
    assert_eq!(byte[0], pattern(1)[0]);
}

#[test]
fn insert_moves_cursors_at_or_after_point() {
    let mut buf = Buffer::new();
    buf.append_bytes(b"abcdef");
    let c0 = buf.begin();
    let c2 = buf.make_cursor(buf.begin_pos().plus(2));
    let c2b = buf.make_cursor(buf.begin_pos().plus(2));
    let c4 = buf.make_cursor(buf.begin_pos().plus(4));

    let at = c2.pos();
    buf.insert(at, 3);
    buf.write_bytes(at, b"XYZ");

    assert_eq!(contents(&buf), b"abXYZcdef");
    assert_eq!(c0.pos(), buf.begin_pos());
    // Cursors sharing the insertion point move uniformly.
    assert_eq!(c2.pos().sub(buf.begin_pos()), 5);
    assert_eq!(c2b.pos().sub(buf.begin_pos()), 5);
    assert_eq!(c4.pos().sub(buf.begin_pos()), 7);
    assert_eq!(buf.self_check(), 0);
}

#[test]
fn insert_spanning_block_boundary() {
    let mut buf = Buffer::new();
    let data = pattern(BLOCK + 50);
    buf.append_bytes(&data);
    let at = buf.begin_pos().plus(BLOCK - 10);
    buf.insert(at, 20);
    buf.write_bytes(at, &[0xEE; 20]);

    let mut expected = data.clone();
    expected.splice(BLOCK - 10..BLOCK - 10, std::iter::repeat(0xEE).take(20));
    assert_eq!(contents(&buf), expected);
    assert_eq!(buf.self_check(), 0);
}

#[test]
fn release_clamps_cursors_inside_range() {
    let mut buf = Buffer::new();
    buf.append_bytes(b"abXYZcdef");
    let inside = buf.make_cursor(buf.begin_pos().plus(3));
    let past = buf.make_cursor(buf.begin_pos().plus(7));

    let at = buf.begin_pos().plus(2);
    buf.release(at, 3);

    assert_eq!(contents(&buf), b"abcdef");
    // In [at, at + n] clamps to at; beyond moves back by n.
    assert_eq!(inside.pos().sub(buf.begin_pos()), 2);
    assert_eq!(past.pos().sub(buf.begin_pos()), 4);
    assert_eq!(buf.self_check(), 0);
}

#[test]
fn release_spanning_block_boundary() {
    let mut buf = Buffer::new();
    let data = pattern(2 * BLOCK);
    buf.append_bytes(&data);
    let at = buf.begin_pos().plus(BLOCK - 25);
    buf.release(at, 50);

    let mut expected = data.clone();
    expected.drain(BLOCK - 25..BLOCK + 25);
    assert_eq!(contents(&buf), expected);
    assert_eq!(buf.self_check(), 0);
}

#[test]
fn get_iov_covers_range_exactly() {
    let mut buf = Buffer::new();
    let data = pattern(2 * BLOCK + 333);
    buf.append_bytes(&data);

    let start = buf.begin_pos().plus(100);
    let end = buf.end_pos();
    let mut vecs = Vec::new();
    let n = buf.get_iov(start, end, &mut vecs, 16);
    assert_eq!(n, vecs.len());

    let total: usize = vecs.iter().map(|v| v.len()).sum();
    assert_eq!(total, end.sub(start));

    let mut gathered = Vec::new();
    for v in &vecs {
        gathered.extend_from_slice(v);
    }
    assert_eq!(gathered, data[100..]);
}

#[test]
fn get_iov_respects_max() {
    let mut buf = Buffer::new();
    buf.append_bytes(&pattern(3 * BLOCK));
    let mut vecs = Vec::new();
    let n = buf.get_iov(buf.begin_pos(), buf.end_pos(), &mut vecs, 2);
    assert_eq!(n, 2);
}

#[test]
fn drop_front_and_back() {
    let mut buf = Buffer::new();
    let data = pattern(BLOCK + 200);
    buf.append_bytes(&data);

    buf.drop_front(BLOCK + 10);
    assert_eq!(contents(&buf), data[BLOCK + 10..]);

    buf.drop_back(100);
    assert_eq!(contents(&buf), data[BLOCK + 10..BLOCK + 100]);
    assert_eq!(buf.self_check(), 0);
}

#[test]
fn flush_respects_leftmost_cursor() {
    let mut buf = Buffer::new();
    buf.append_bytes(&pattern(BLOCK + 100));
    let keep = buf.make_cursor(buf.begin_pos().plus(BLOCK + 20));
    buf.flush();
    assert_eq!(buf.len(), 80);
    assert_eq!(keep.pos(), buf.begin_pos());
    drop(keep);

    buf.flush();
    assert!(buf.is_empty());
    assert_eq!(buf.self_check(), 0);
}

#[test]
fn reserve_then_patch() {
    let mut buf = Buffer::new();
    let at = buf.end_pos();
    buf.advance_back(5);
    buf.append_bytes(b"payload");
    buf.write_bytes(at, b"HDR45");
    assert_eq!(contents(&buf), b"HDR45payload");
}

#[test]
fn has_counts_from_position() {
    let mut buf = Buffer::new();
    buf.append_bytes(b"0123456789");
    let p = buf.begin_pos().plus(4);
    assert!(buf.has(p, 6));
    assert!(!buf.has(p, 7));
    assert!(buf.has(buf.end_pos(), 0));
    assert!(!buf.has(buf.end_pos(), 1));
}

#[test]
fn typed_read_write() {
    let mut buf = Buffer::new();
    buf.append(&0xdead_beef_u32);
    assert_eq!(buf.read_at::<u32>(buf.begin_pos()), 0xdead_beef);

    buf.write_at(buf.begin_pos(), &0x0102_0304_u32);
    assert_eq!(buf.read_at::<u32>(buf.begin_pos()), 0x0102_0304);
}

#[test]
fn blocks_return_to_pool_on_drop() {
    let (live_before, _) = slab::thread_pool_stats();
    {
        let mut buf = Buffer::new();
        buf.append_bytes(&pattern(4 * BLOCK));
        let (live_mid, _) = slab::thread_pool_stats();
        assert!(live_mid >= live_before + 4);
    }
    let (live_after, _) = slab::thread_pool_stats();
    assert_eq!(live_after, live_before);
}

#[test]
fn dropping_all_content_keeps_buffer_usable() {
    let mut buf = Buffer::new();
    buf.append_bytes(&pattern(2 * BLOCK));
    buf.drop_front(2 * BLOCK);
    assert!(buf.is_empty());
    buf.append_bytes(b"again");
    assert_eq!(contents(&buf), b"again");
    assert_eq!(buf.self_check(), 0);
}
