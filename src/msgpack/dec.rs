//! State-machine MessagePack decoder over [`Buffer`].
//!
//! The decoder dispatches on the first byte of the next object through the
//! compile-time [tag table](super::family). The head of the object (its
//! scalar value, or the length/count of its payload) is resolved first and
//! checked against the destination's advertised family set; a mismatched
//! object is skipped whole and reported as `WrongType`. The reserved tag
//! `0xc1` is always `BrokenMsgpack`.
//!
//! Partial input is reported as `NeedMore` and leaves the read position at
//! the start of the incomplete object, so a later retry resumes in place.
//!
//! Nested structure is consumed with an explicit stack of remaining-child
//! counters bounded by a configurable depth limit (default 16), keeping
//! the input-driven paths non-recursive regardless of input.

use crate::buffer::{Buffer, LightCursor};
use crate::error::DecodeError;

use super::enc::{AsArr, AsBin, AsExt, AsMap, AsStr};
use super::family::{Family, Tag, TAG_TABLE};

/// Default bound on input-driven nesting.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// The resolved head of one MessagePack object: the value itself for
/// scalars, the byte length for str/bin/ext, the child count for arr/map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MpHead {
    Nil,
    Bool(bool),
    Uint(u64),
    Int(i64),
    F32(f32),
    F64(f64),
    Str(u32),
    Bin(u32),
    Arr(u32),
    Map(u32),
    Ext(i8, u32),
}

impl MpHead {
    pub fn family(self) -> Family {
        match self {
            MpHead::Nil => Family::NIL,
            MpHead::Bool(_) => Family::BOOL,
            MpHead::Uint(_) => Family::UINT,
            MpHead::Int(_) => Family::INT,
            MpHead::F32(_) => Family::FLT,
            MpHead::F64(_) => Family::DBL,
            MpHead::Str(_) => Family::STR,
            MpHead::Bin(_) => Family::BIN,
            MpHead::Arr(_) => Family::ARR,
            MpHead::Map(_) => Family::MAP,
            MpHead::Ext(..) => Family::EXT,
        }
    }
}

/// A destination that one MessagePack object can be read into.
///
/// `FAMILIES` is the set of families the destination accepts; the decoder
/// verifies membership before calling `read_value`, so implementations see
/// only heads from their own set (unions such as `Option` re-dispatch).
pub trait Decode {
    const FAMILIES: Family;

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError>;
}

/// Cursor-carrying decoder. Borrows the buffer immutably; decoding never
/// materialises an intermediate tree.
pub struct Decoder<'b> {
    buf: &'b Buffer,
    pos: LightCursor,
    head_start: LightCursor,
    max_depth: usize,
}

impl<'b> Decoder<'b> {
    /// Decoder positioned at the first byte of the buffer.
    pub fn new(buf: &'b Buffer) -> Self {
        Self::at(buf, buf.begin_pos())
    }

    /// Decoder positioned at `pos`.
    pub fn at(buf: &'b Buffer, pos: LightCursor) -> Self {
        Self {
            buf,
            pos,
            head_start: pos,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[inline]
    pub fn pos(&self) -> LightCursor {
        self.pos
    }

    pub fn set_pos(&mut self, pos: LightCursor) {
        self.pos = pos;
        self.head_start = pos;
    }

    /// Start of the object whose head was resolved last. Used by raw-range
    /// destinations to capture the whole encoded object.
    #[inline]
    pub(crate) fn head_start(&self) -> LightCursor {
        self.head_start
    }

    /// Decode the next object into `dst`.
    ///
    /// On `NeedMore` the position is restored to where this call started.
    /// On `WrongType` the offending object has been skipped.
    pub fn decode<T: Decode + ?Sized>(&mut self, dst: &mut T) -> Result<(), DecodeError> {
        let start = self.pos;
        let res = self.decode_value(dst);
        if matches!(res, Err(DecodeError::NeedMore)) {
            self.pos = start;
        }
        res
    }

    fn decode_value<T: Decode + ?Sized>(&mut self, dst: &mut T) -> Result<(), DecodeError> {
        let head_start = self.pos;
        let head = self.read_head()?;
        if !T::FAMILIES.contains(head.family()) {
            self.skip_rest_of(head)?;
            return Err(DecodeError::WrongType {
                expected: T::FAMILIES,
                got: head.family(),
            });
        }
        self.head_start = head_start;
        dst.read_value(head, self)
    }

    /// Skip exactly one complete object, whatever its structure.
    pub fn skip(&mut self) -> Result<(), DecodeError> {
        let start = self.pos;
        let res = self.skip_many(1);
        if matches!(res, Err(DecodeError::NeedMore)) {
            self.pos = start;
        }
        res
    }

    /// Consume the payload/children of an object whose head is already
    /// resolved.
    pub fn skip_rest_of(&mut self, head: MpHead) -> Result<(), DecodeError> {
        match head {
            MpHead::Str(len) | MpHead::Bin(len) | MpHead::Ext(_, len) => {
                self.advance_checked(len as usize)
            }
            MpHead::Arr(n) => self.skip_many(n as u64),
            MpHead::Map(n) => self.skip_many(2 * n as u64),
            _ => Ok(()),
        }
    }

    /// Consume `count` complete objects using an explicit stack of
    /// remaining-child counters.
    fn skip_many(&mut self, count: u64) -> Result<(), DecodeError> {
        let mut stack: Vec<u64> = Vec::new();
        let mut current = count;
        loop {
            if current == 0 {
                match stack.pop() {
                    Some(c) => current = c,
                    None => return Ok(()),
                }
                continue;
            }
            current -= 1;
            match self.read_head()? {
                MpHead::Str(len) | MpHead::Bin(len) | MpHead::Ext(_, len) => {
                    self.advance_checked(len as usize)?;
                }
                MpHead::Arr(n) => {
                    if stack.len() >= self.max_depth {
                        return Err(DecodeError::MaxDepthReached);
                    }
                    stack.push(current);
                    current = n as u64;
                }
                MpHead::Map(n) => {
                    if stack.len() >= self.max_depth {
                        return Err(DecodeError::MaxDepthReached);
                    }
                    stack.push(current);
                    current = 2 * n as u64;
                }
                _ => {}
            }
        }
    }

    #[inline]
    fn advance_checked(&mut self, n: usize) -> Result<(), DecodeError> {
        if !self.buf.has(self.pos, n) {
            return Err(DecodeError::NeedMore);
        }
        self.pos.advance(n);
        Ok(())
    }

    fn read_uint_be(&self, pos: LightCursor, width: u8) -> u64 {
        let mut tmp = [0u8; 8];
        self.buf.read_bytes(pos, &mut tmp[..width as usize]);
        let mut v = 0u64;
        for b in &tmp[..width as usize] {
            v = (v << 8) | *b as u64;
        }
        v
    }

    /// Resolve the head of the next object, consuming its tag and any
    /// fixed-width length/value bytes (but not str/bin/ext payloads or
    /// arr/map children).
    pub(crate) fn read_head(&mut self) -> Result<MpHead, DecodeError> {
        if !self.buf.has(self.pos, 1) {
            return Err(DecodeError::NeedMore);
        }
        let tag = TAG_TABLE[self.buf.read_u8(self.pos) as usize];
        let head = match tag {
            Tag::PosFixint(v) => {
                self.pos.advance(1);
                MpHead::Uint(v as u64)
            }
            Tag::NegFixint(v) => {
                self.pos.advance(1);
                MpHead::Int(v as i64)
            }
            Tag::FixStr(len) => {
                self.pos.advance(1);
                MpHead::Str(len as u32)
            }
            Tag::FixArr(n) => {
                self.pos.advance(1);
                MpHead::Arr(n as u32)
            }
            Tag::FixMap(n) => {
                self.pos.advance(1);
                MpHead::Map(n as u32)
            }
            Tag::Nil => {
                self.pos.advance(1);
                MpHead::Nil
            }
            Tag::False => {
                self.pos.advance(1);
                MpHead::Bool(false)
            }
            Tag::True => {
                self.pos.advance(1);
                MpHead::Bool(true)
            }
            Tag::Broken => return Err(DecodeError::BrokenMsgpack),
            Tag::Uint(w) => {
                if !self.buf.has(self.pos, 1 + w as usize) {
                    return Err(DecodeError::NeedMore);
                }
                let v = self.read_uint_be(self.pos.plus(1), w);
                self.pos.advance(1 + w as usize);
                MpHead::Uint(v)
            }
            Tag::Int(w) => {
                if !self.buf.has(self.pos, 1 + w as usize) {
                    return Err(DecodeError::NeedMore);
                }
                let raw = self.read_uint_be(self.pos.plus(1), w);
                self.pos.advance(1 + w as usize);
                let v = match w {
                    1 => raw as u8 as i8 as i64,
                    2 => raw as u16 as i16 as i64,
                    4 => raw as u32 as i32 as i64,
                    _ => raw as i64,
                };
                MpHead::Int(v)
            }
            Tag::F32 => {
                if !self.buf.has(self.pos, 5) {
                    return Err(DecodeError::NeedMore);
                }
                let bits = self.read_uint_be(self.pos.plus(1), 4) as u32;
                self.pos.advance(5);
                MpHead::F32(f32::from_bits(bits))
            }
            Tag::F64 => {
                if !self.buf.has(self.pos, 9) {
                    return Err(DecodeError::NeedMore);
                }
                let bits = self.read_uint_be(self.pos.plus(1), 8);
                self.pos.advance(9);
                MpHead::F64(f64::from_bits(bits))
            }
            Tag::Str(w) => {
                if !self.buf.has(self.pos, 1 + w as usize) {
                    return Err(DecodeError::NeedMore);
                }
                let len = self.read_uint_be(self.pos.plus(1), w) as u32;
                self.pos.advance(1 + w as usize);
                MpHead::Str(len)
            }
            Tag::Bin(w) => {
                if !self.buf.has(self.pos, 1 + w as usize) {
                    return Err(DecodeError::NeedMore);
                }
                let len = self.read_uint_be(self.pos.plus(1), w) as u32;
                self.pos.advance(1 + w as usize);
                MpHead::Bin(len)
            }
            Tag::Arr(w) => {
                if !self.buf.has(self.pos, 1 + w as usize) {
                    return Err(DecodeError::NeedMore);
                }
                let n = self.read_uint_be(self.pos.plus(1), w) as u32;
                self.pos.advance(1 + w as usize);
                MpHead::Arr(n)
            }
            Tag::Map(w) => {
                if !self.buf.has(self.pos, 1 + w as usize) {
                    return Err(DecodeError::NeedMore);
                }
                let n = self.read_uint_be(self.pos.plus(1), w) as u32;
                self.pos.advance(1 + w as usize);
                MpHead::Map(n)
            }
            Tag::Ext(w) => {
                if !self.buf.has(self.pos, 1 + w as usize + 1) {
                    return Err(DecodeError::NeedMore);
                }
                let len = self.read_uint_be(self.pos.plus(1), w) as u32;
                let ext_type = self.buf.read_u8(self.pos.plus(1 + w as usize)) as i8;
                self.pos.advance(1 + w as usize + 1);
                MpHead::Ext(ext_type, len)
            }
            Tag::FixExt(len) => {
                if !self.buf.has(self.pos, 2) {
                    return Err(DecodeError::NeedMore);
                }
                let ext_type = self.buf.read_u8(self.pos.plus(1)) as i8;
                self.pos.advance(2);
                MpHead::Ext(ext_type, len as u32)
            }
        };
        Ok(head)
    }

    /// Copy out and consume `len` payload bytes.
    pub(crate) fn take_bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        if !self.buf.has(self.pos, len) {
            return Err(DecodeError::NeedMore);
        }
        let mut out = vec![0u8; len];
        self.buf.read_bytes(self.pos, &mut out);
        self.pos.advance(len);
        Ok(out)
    }

    /// Read a map key for key-matching destinations. Keys of non-key
    /// families are consumed and reported as `Other`.
    pub fn read_map_key(&mut self) -> Result<DecodedKey, DecodeError> {
        match self.read_head()? {
            MpHead::Uint(v) => Ok(DecodedKey::Uint(v)),
            MpHead::Int(v) => Ok(DecodedKey::Int(v)),
            MpHead::Str(len) => Ok(DecodedKey::Str(self.take_bytes(len as usize)?)),
            other => {
                self.skip_rest_of(other)?;
                Ok(DecodedKey::Other)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Key matching
// ---------------------------------------------------------------------------

/// An already-read map key.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedKey {
    Uint(u64),
    Int(i64),
    Str(Vec<u8>),
    Other,
}

/// A literal an incoming map key can be matched against.
pub trait MapKeyPattern {
    fn matches(&self, key: &DecodedKey) -> bool;
}

impl MapKeyPattern for &str {
    fn matches(&self, key: &DecodedKey) -> bool {
        matches!(key, DecodedKey::Str(bytes) if bytes.as_slice() == self.as_bytes())
    }
}

impl MapKeyPattern for u64 {
    fn matches(&self, key: &DecodedKey) -> bool {
        match *key {
            DecodedKey::Uint(v) => v == *self,
            DecodedKey::Int(v) => v >= 0 && v as u64 == *self,
            _ => false,
        }
    }
}

impl MapKeyPattern for i64 {
    fn matches(&self, key: &DecodedKey) -> bool {
        match *key {
            DecodedKey::Uint(v) => *self >= 0 && v == *self as u64,
            DecodedKey::Int(v) => v == *self,
            _ => false,
        }
    }
}

macro_rules! key_pattern_via {
    ($via:ty : $($t:ty),*) => {$(
        impl MapKeyPattern for $t {
            fn matches(&self, key: &DecodedKey) -> bool {
                (*self as $via).matches(key)
            }
        }
    )*};
}

key_pattern_via!(u64: u8, u16, u32);
key_pattern_via!(i64: i8, i16, i32);

// ---------------------------------------------------------------------------
// Scalar destinations
// ---------------------------------------------------------------------------

macro_rules! decode_uint {
    ($($t:ty),*) => {$(
        impl Decode for $t {
            const FAMILIES: Family = Family::UINT;

            fn read_value(&mut self, head: MpHead, _: &mut Decoder<'_>) -> Result<(), DecodeError> {
                match head {
                    MpHead::Uint(v) => match <$t>::try_from(v) {
                        Ok(v) => {
                            *self = v;
                            Ok(())
                        }
                        Err(_) => Err(DecodeError::WrongType {
                            expected: Self::FAMILIES,
                            got: Family::UINT,
                        }),
                    },
                    _ => Err(DecodeError::WrongType {
                        expected: Self::FAMILIES,
                        got: head.family(),
                    }),
                }
            }
        }
    )*};
}

decode_uint!(u8, u16, u32, u64, usize);

macro_rules! decode_int {
    ($($t:ty),*) => {$(
        impl Decode for $t {
            const FAMILIES: Family = Family::AINT;

            fn read_value(&mut self, head: MpHead, _: &mut Decoder<'_>) -> Result<(), DecodeError> {
                let wide: i64 = match head {
                    MpHead::Uint(v) => match i64::try_from(v) {
                        Ok(v) => v,
                        Err(_) => {
                            return Err(DecodeError::WrongType {
                                expected: Self::FAMILIES,
                                got: Family::UINT,
                            })
                        }
                    },
                    MpHead::Int(v) => v,
                    _ => {
                        return Err(DecodeError::WrongType {
                            expected: Self::FAMILIES,
                            got: head.family(),
                        })
                    }
                };
                match <$t>::try_from(wide) {
                    Ok(v) => {
                        *self = v;
                        Ok(())
                    }
                    Err(_) => Err(DecodeError::WrongType {
                        expected: Self::FAMILIES,
                        got: head.family(),
                    }),
                }
            }
        }
    )*};
}

decode_int!(i8, i16, i32, i64, isize);

impl Decode for bool {
    const FAMILIES: Family = Family::BOOL;

    fn read_value(&mut self, head: MpHead, _: &mut Decoder<'_>) -> Result<(), DecodeError> {
        match head {
            MpHead::Bool(v) => {
                *self = v;
                Ok(())
            }
            _ => Err(DecodeError::WrongType {
                expected: Self::FAMILIES,
                got: head.family(),
            }),
        }
    }
}

/// A float destination accepts either float width; the encoder never
/// widens, the decoder converts.
impl Decode for f32 {
    const FAMILIES: Family = Family::AFLT;

    fn read_value(&mut self, head: MpHead, _: &mut Decoder<'_>) -> Result<(), DecodeError> {
        match head {
            MpHead::F32(v) => *self = v,
            MpHead::F64(v) => *self = v as f32,
            _ => {
                return Err(DecodeError::WrongType {
                    expected: Self::FAMILIES,
                    got: head.family(),
                })
            }
        }
        Ok(())
    }
}

impl Decode for f64 {
    const FAMILIES: Family = Family::AFLT;

    fn read_value(&mut self, head: MpHead, _: &mut Decoder<'_>) -> Result<(), DecodeError> {
        match head {
            MpHead::F32(v) => *self = v as f64,
            MpHead::F64(v) => *self = v,
            _ => {
                return Err(DecodeError::WrongType {
                    expected: Self::FAMILIES,
                    got: head.family(),
                })
            }
        }
        Ok(())
    }
}

impl Decode for String {
    const FAMILIES: Family = Family::STR;

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
        let len = match head {
            MpHead::Str(len) => len,
            _ => {
                return Err(DecodeError::WrongType {
                    expected: Self::FAMILIES,
                    got: head.family(),
                })
            }
        };
        let bytes = dec.take_bytes(len as usize)?;
        if simdutf8::basic::from_utf8(&bytes).is_err() {
            return Err(DecodeError::WrongType {
                expected: Family::STR,
                got: Family::BIN,
            });
        }
        // SAFETY: validated just above.
        *self = unsafe { String::from_utf8_unchecked(bytes) };
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wrapper destinations
// ---------------------------------------------------------------------------

impl Decode for AsStr<Vec<u8>> {
    const FAMILIES: Family = Family::STR;

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
        match head {
            MpHead::Str(len) => {
                self.0 = dec.take_bytes(len as usize)?;
                Ok(())
            }
            _ => Err(DecodeError::WrongType {
                expected: Self::FAMILIES,
                got: head.family(),
            }),
        }
    }
}

impl Decode for AsBin<Vec<u8>> {
    const FAMILIES: Family = Family::BIN;

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
        match head {
            MpHead::Bin(len) => {
                self.0 = dec.take_bytes(len as usize)?;
                Ok(())
            }
            _ => Err(DecodeError::WrongType {
                expected: Self::FAMILIES,
                got: head.family(),
            }),
        }
    }
}

impl Decode for AsExt<Vec<u8>> {
    const FAMILIES: Family = Family::EXT;

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
        match head {
            MpHead::Ext(ext_type, len) => {
                self.0 = ext_type;
                self.1 = dec.take_bytes(len as usize)?;
                Ok(())
            }
            _ => Err(DecodeError::WrongType {
                expected: Self::FAMILIES,
                got: head.family(),
            }),
        }
    }
}

impl<T: Decode + Default> Decode for AsArr<Vec<T>> {
    const FAMILIES: Family = Family::ARR;

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
        self.0.read_value(head, dec)
    }
}

/// Pair-container destination: each entry becomes one `(K, V)` pair,
/// in stream order.
impl<K: Decode + Default, V: Decode + Default> Decode for AsMap<Vec<(K, V)>> {
    const FAMILIES: Family = Family::MAP;

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
        let n = match head {
            MpHead::Map(n) => n,
            _ => {
                return Err(DecodeError::WrongType {
                    expected: Self::FAMILIES,
                    got: head.family(),
                })
            }
        };
        self.0.clear();
        for _ in 0..n {
            let mut k = K::default();
            dec.decode(&mut k)?;
            let mut v = V::default();
            dec.decode(&mut v)?;
            self.0.push((k, v));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

impl<T: Decode + Default> Decode for Vec<T> {
    const FAMILIES: Family = Family::ARR;

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
        let n = match head {
            MpHead::Arr(n) => n,
            _ => {
                return Err(DecodeError::WrongType {
                    expected: Self::FAMILIES,
                    got: head.family(),
                })
            }
        };
        self.clear();
        // The count is attacker-controlled until elements actually arrive.
        self.reserve(n.min(1024) as usize);
        for _ in 0..n {
            let mut v = T::default();
            dec.decode(&mut v)?;
            self.push(v);
        }
        Ok(())
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    const FAMILIES: Family = Family::ARR;

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
        let n = match head {
            MpHead::Arr(n) => n,
            _ => {
                return Err(DecodeError::WrongType {
                    expected: Self::FAMILIES,
                    got: head.family(),
                })
            }
        };
        if n as usize != N {
            dec.skip_rest_of(MpHead::Arr(n))?;
            return Err(DecodeError::WrongType {
                expected: Self::FAMILIES,
                got: Family::ARR,
            });
        }
        for slot in self.iter_mut() {
            dec.decode(slot)?;
        }
        Ok(())
    }
}

impl<K, V, S> Decode for std::collections::HashMap<K, V, S>
where
    K: Decode + Default + Eq + std::hash::Hash,
    V: Decode + Default,
    S: std::hash::BuildHasher,
{
    const FAMILIES: Family = Family::MAP;

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
        let n = match head {
            MpHead::Map(n) => n,
            _ => {
                return Err(DecodeError::WrongType {
                    expected: Self::FAMILIES,
                    got: head.family(),
                })
            }
        };
        self.clear();
        for _ in 0..n {
            let mut k = K::default();
            dec.decode(&mut k)?;
            let mut v = V::default();
            dec.decode(&mut v)?;
            self.insert(k, v);
        }
        Ok(())
    }
}

impl<K, V> Decode for std::collections::BTreeMap<K, V>
where
    K: Decode + Default + Ord,
    V: Decode + Default,
{
    const FAMILIES: Family = Family::MAP;

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
        let n = match head {
            MpHead::Map(n) => n,
            _ => {
                return Err(DecodeError::WrongType {
                    expected: Self::FAMILIES,
                    got: head.family(),
                })
            }
        };
        self.clear();
        for _ in 0..n {
            let mut k = K::default();
            dec.decode(&mut k)?;
            let mut v = V::default();
            dec.decode(&mut v)?;
            self.insert(k, v);
        }
        Ok(())
    }
}

macro_rules! decode_tuple {
    ($($name:ident : $idx:tt),+ ; $len:expr) => {
        impl<$($name: Decode),+> Decode for ($($name,)+) {
            const FAMILIES: Family = Family::ARR;

            fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
                let n = match head {
                    MpHead::Arr(n) => n,
                    _ => {
                        return Err(DecodeError::WrongType {
                            expected: Self::FAMILIES,
                            got: head.family(),
                        })
                    }
                };
                if n != $len {
                    dec.skip_rest_of(MpHead::Arr(n))?;
                    return Err(DecodeError::WrongType {
                        expected: Self::FAMILIES,
                        got: Family::ARR,
                    });
                }
                $(dec.decode(&mut self.$idx)?;)+
                Ok(())
            }
        }
    };
}

decode_tuple!(A: 0; 1);
decode_tuple!(A: 0, B: 1; 2);
decode_tuple!(A: 0, B: 1, C: 2; 3);
decode_tuple!(A: 0, B: 1, C: 2, D: 3; 4);
decode_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4; 5);
decode_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5; 6);
decode_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6; 7);
decode_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7; 8);

// ---------------------------------------------------------------------------
// Optional, variant, raw, ignore
// ---------------------------------------------------------------------------

/// The family set of an optional is the union of nil and the payload's
/// set: nil clears it, anything else is delegated to a payload constructed
/// on demand.
impl<T: Decode + Default> Decode for Option<T> {
    const FAMILIES: Family = Family::NIL.union(T::FAMILIES);

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
        if head == MpHead::Nil {
            *self = None;
            return Ok(());
        }
        self.get_or_insert_with(T::default).read_value(head, dec)
    }
}

/// A two-alternative sum. Decoding dispatches on the incoming family,
/// testing alternatives in declaration order; nest `Either`s for more
/// alternatives. Ambiguity resolves to the earlier alternative.
#[derive(Debug, Clone, PartialEq)]
pub enum Either<A, B> {
    First(A),
    Second(B),
}

impl<A: Default, B> Default for Either<A, B> {
    fn default() -> Self {
        Either::First(A::default())
    }
}

impl<A: super::Encode, B: super::Encode> super::Encode for Either<A, B> {
    fn encode(&self, enc: &mut super::Encoder<'_>) {
        match self {
            Either::First(a) => a.encode(enc),
            Either::Second(b) => b.encode(enc),
        }
    }
}

impl<A: Decode + Default, B: Decode + Default> Decode for Either<A, B> {
    const FAMILIES: Family = A::FAMILIES.union(B::FAMILIES);

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
        if A::FAMILIES.contains(head.family()) {
            if !matches!(self, Either::First(_)) {
                *self = Either::First(A::default());
            }
            match self {
                Either::First(a) => a.read_value(head, dec),
                Either::Second(_) => Err(DecodeError::BrokenMsgpack),
            }
        } else {
            if !matches!(self, Either::Second(_)) {
                *self = Either::Second(B::default());
            }
            match self {
                Either::Second(b) => b.read_value(head, dec),
                Either::First(_) => Err(DecodeError::BrokenMsgpack),
            }
        }
    }
}

/// Captures the byte range of the next object without decoding it.
/// Re-decoding the captured range stand-alone yields the object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawRange {
    pub begin: LightCursor,
    pub end: LightCursor,
}

impl RawRange {
    pub fn len(&self) -> usize {
        self.end.sub(self.begin)
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

impl Decode for RawRange {
    const FAMILIES: Family = Family::ANY;

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
        self.begin = dec.head_start();
        dec.skip_rest_of(head)?;
        self.end = dec.pos();
        Ok(())
    }
}

/// Accepts and discards any object.
pub struct Ignore;

impl Decode for Ignore {
    const FAMILIES: Family = Family::ANY;

    fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
        dec.skip_rest_of(head)
    }
}

// ---------------------------------------------------------------------------
// Map-key binding
// ---------------------------------------------------------------------------

/// Binds map values to destinations by key. `T` is a tuple of
/// `(key pattern, &mut destination)` pairs; keys absent from the incoming
/// map leave their destination untouched, entries with unclaimed keys are
/// skipped whole.
pub struct MapKeys<T>(pub T);

macro_rules! impl_map_keys {
    ($($k:ident, $d:ident, $idx:tt);+) => {
        impl<'m, $($k: MapKeyPattern, $d: Decode),+> Decode for MapKeys<($(($k, &'m mut $d),)+)> {
            const FAMILIES: Family = Family::MAP;

            fn read_value(&mut self, head: MpHead, dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
                let n = match head {
                    MpHead::Map(n) => n,
                    _ => {
                        return Err(DecodeError::WrongType {
                            expected: Self::FAMILIES,
                            got: head.family(),
                        })
                    }
                };
                for _ in 0..n {
                    let key = dec.read_map_key()?;
                    let mut matched = false;
                    $(
                        if !matched && self.0.$idx.0.matches(&key) {
                            dec.decode(&mut *self.0.$idx.1)?;
                            matched = true;
                        }
                    )+
                    if !matched {
                        dec.skip()?;
                    }
                }
                Ok(())
            }
        }
    };
}

impl_map_keys!(K0, D0, 0);
impl_map_keys!(K0, D0, 0; K1, D1, 1);
impl_map_keys!(K0, D0, 0; K1, D1, 1; K2, D2, 2);
impl_map_keys!(K0, D0, 0; K1, D1, 1; K2, D2, 2; K3, D3, 3);
impl_map_keys!(K0, D0, 0; K1, D1, 1; K2, D2, 2; K3, D3, 3; K4, D4, 4);
impl_map_keys!(K0, D0, 0; K1, D1, 1; K2, D2, 2; K3, D3, 3; K4, D4, 4; K5, D5, 5);
impl_map_keys!(K0, D0, 0; K1, D1, 1; K2, D2, 2; K3, D3, 3; K4, D4, 4; K5, D5, 5; K6, D6, 6);
impl_map_keys!(K0, D0, 0; K1, D1, 1; K2, D2, 2; K3, D3, 3; K4, D4, 4; K5, D5, 5; K6, D6, 6; K7, D7, 7);
