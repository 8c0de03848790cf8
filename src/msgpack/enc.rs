//! Rule-driven MessagePack encoder over [`Buffer`].
//!
//! Values implementing [`Encode`] choose their family by their own
//! properties: integers pick the uint or int family by sign and the
//! shortest width that covers the value, containers become arrays, map
//! containers become maps. Wrapping a value in one of the `As*`
//! specificators pins a family explicitly:
//!
//! * [`AsStr`] / [`AsBin`]: byte data as str / bin;
//! * [`AsArr`] / [`AsMap`]: a slice as an array / a slice of pairs as a map;
//! * [`AsExt`]: an ext object of a given type;
//! * [`AsRaw`]: bytes that already contain a valid MessagePack object;
//! * [`AsFixed`]: an unsigned integer at a fixed width, skipping the
//!   shortest-encoding search (useful when the value will be patched later,
//!   as with frame size headers).
//!
//! Encoding is total for supported types: unsupported types simply do not
//! implement [`Encode`], so there is no runtime encode error.

use crate::buffer::{Buffer, LightCursor};

/// Explicit integer width for [`AsFixed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    /// Single tag byte (fixint range only).
    Fix,
    U8,
    U16,
    U32,
    U64,
}

/// A value that can be written as one MessagePack object.
pub trait Encode {
    fn encode(&self, enc: &mut Encoder<'_>);
}

/// Streaming encoder appending to a buffer.
pub struct Encoder<'b> {
    buf: &'b mut Buffer,
}

impl<'b> Encoder<'b> {
    pub fn new(buf: &'b mut Buffer) -> Self {
        Self { buf }
    }

    /// Current write position (one past the last encoded byte).
    #[inline]
    pub fn pos(&self) -> LightCursor {
        self.buf.end_pos()
    }

    /// Encode one value.
    #[inline]
    pub fn encode<T: Encode + ?Sized>(&mut self, value: &T) {
        value.encode(self);
    }

    /// Encode a value and return the cursor pair delimiting its bytes.
    pub fn encode_tracked<T: Encode + ?Sized>(
        &mut self,
        value: &T,
    ) -> (LightCursor, LightCursor) {
        let begin = self.pos();
        value.encode(self);
        (begin, self.pos())
    }

    /// Reserve `n` uninitialised bytes for later fill-in. Returns the
    /// cursor pair delimiting the reservation.
    pub fn reserve(&mut self, n: usize) -> (LightCursor, LightCursor) {
        let begin = self.pos();
        self.buf.advance_back(n);
        (begin, self.pos())
    }

    /// Overwrite previously reserved or encoded bytes.
    pub fn patch(&mut self, at: LightCursor, bytes: &[u8]) {
        self.buf.write_bytes(at, bytes);
    }

    pub fn encode_nil(&mut self) {
        self.buf.append_bytes(&[0xc0]);
    }

    pub fn encode_bool(&mut self, v: bool) {
        self.buf.append_bytes(&[if v { 0xc3 } else { 0xc2 }]);
    }

    /// Shortest encoding in the uint family.
    pub fn encode_uint(&mut self, v: u64) {
        if v <= 0x7f {
            self.buf.append_bytes(&[v as u8]);
        } else if v <= 0xff {
            self.buf.append_bytes(&[0xcc, v as u8]);
        } else if v <= 0xffff {
            let b = (v as u16).to_be_bytes();
            self.buf.append_bytes(&[0xcd, b[0], b[1]]);
        } else if v <= 0xffff_ffff {
            let mut out = [0xce, 0, 0, 0, 0];
            out[1..].copy_from_slice(&(v as u32).to_be_bytes());
            self.buf.append_bytes(&out);
        } else {
            let mut out = [0xcf, 0, 0, 0, 0, 0, 0, 0, 0];
            out[1..].copy_from_slice(&v.to_be_bytes());
            self.buf.append_bytes(&out);
        }
    }

    /// Shortest encoding: non-negative values use the uint family,
    /// negative values the int family.
    pub fn encode_int(&mut self, v: i64) {
        if v >= 0 {
            return self.encode_uint(v as u64);
        }
        if v >= -32 {
            self.buf.append_bytes(&[v as u8]);
        } else if v >= i8::MIN as i64 {
            self.buf.append_bytes(&[0xd0, v as u8]);
        } else if v >= i16::MIN as i64 {
            let b = (v as i16).to_be_bytes();
            self.buf.append_bytes(&[0xd1, b[0], b[1]]);
        } else if v >= i32::MIN as i64 {
            let mut out = [0xd2, 0, 0, 0, 0];
            out[1..].copy_from_slice(&(v as i32).to_be_bytes());
            self.buf.append_bytes(&out);
        } else {
            let mut out = [0xd3, 0, 0, 0, 0, 0, 0, 0, 0];
            out[1..].copy_from_slice(&v.to_be_bytes());
            self.buf.append_bytes(&out);
        }
    }

    /// A fixed-width uint, skipping the shortest-encoding search.
    /// The value must fit the requested width.
    pub fn encode_fixed_uint(&mut self, width: Width, v: u64) {
        match width {
            Width::Fix => {
                debug_assert!(v <= 0x7f);
                self.buf.append_bytes(&[v as u8]);
            }
            Width::U8 => {
                debug_assert!(v <= u8::MAX as u64);
                self.buf.append_bytes(&[0xcc, v as u8]);
            }
            Width::U16 => {
                debug_assert!(v <= u16::MAX as u64);
                let b = (v as u16).to_be_bytes();
                self.buf.append_bytes(&[0xcd, b[0], b[1]]);
            }
            Width::U32 => {
                debug_assert!(v <= u32::MAX as u64);
                let mut out = [0xce, 0, 0, 0, 0];
                out[1..].copy_from_slice(&(v as u32).to_be_bytes());
                self.buf.append_bytes(&out);
            }
            Width::U64 => {
                let mut out = [0xcf, 0, 0, 0, 0, 0, 0, 0, 0];
                out[1..].copy_from_slice(&v.to_be_bytes());
                self.buf.append_bytes(&out);
            }
        }
    }

    /// A float emits `ca`; widening to double during encode is forbidden.
    pub fn encode_f32(&mut self, v: f32) {
        let mut out = [0xca, 0, 0, 0, 0];
        out[1..].copy_from_slice(&v.to_bits().to_be_bytes());
        self.buf.append_bytes(&out);
    }

    pub fn encode_f64(&mut self, v: f64) {
        let mut out = [0xcb, 0, 0, 0, 0, 0, 0, 0, 0];
        out[1..].copy_from_slice(&v.to_bits().to_be_bytes());
        self.buf.append_bytes(&out);
    }

    pub fn encode_str_header(&mut self, len: u32) {
        if len < 32 {
            self.buf.append_bytes(&[0xa0 | len as u8]);
        } else if len <= 0xff {
            self.buf.append_bytes(&[0xd9, len as u8]);
        } else if len <= 0xffff {
            let b = (len as u16).to_be_bytes();
            self.buf.append_bytes(&[0xda, b[0], b[1]]);
        } else {
            let mut out = [0xdb, 0, 0, 0, 0];
            out[1..].copy_from_slice(&len.to_be_bytes());
            self.buf.append_bytes(&out);
        }
    }

    pub fn encode_str(&mut self, s: &[u8]) {
        self.encode_str_header(s.len() as u32);
        self.buf.append_bytes(s);
    }

    pub fn encode_bin_header(&mut self, len: u32) {
        if len <= 0xff {
            self.buf.append_bytes(&[0xc4, len as u8]);
        } else if len <= 0xffff {
            let b = (len as u16).to_be_bytes();
            self.buf.append_bytes(&[0xc5, b[0], b[1]]);
        } else {
            let mut out = [0xc6, 0, 0, 0, 0];
            out[1..].copy_from_slice(&len.to_be_bytes());
            self.buf.append_bytes(&out);
        }
    }

    pub fn encode_bin(&mut self, b: &[u8]) {
        self.encode_bin_header(b.len() as u32);
        self.buf.append_bytes(b);
    }

    pub fn encode_arr_header(&mut self, len: u32) {
        if len < 16 {
            self.buf.append_bytes(&[0x90 | len as u8]);
        } else if len <= 0xffff {
            let b = (len as u16).to_be_bytes();
            self.buf.append_bytes(&[0xdc, b[0], b[1]]);
        } else {
            let mut out = [0xdd, 0, 0, 0, 0];
            out[1..].copy_from_slice(&len.to_be_bytes());
            self.buf.append_bytes(&out);
        }
    }

    pub fn encode_map_header(&mut self, len: u32) {
        if len < 16 {
            self.buf.append_bytes(&[0x80 | len as u8]);
        } else if len <= 0xffff {
            let b = (len as u16).to_be_bytes();
            self.buf.append_bytes(&[0xde, b[0], b[1]]);
        } else {
            let mut out = [0xdf, 0, 0, 0, 0];
            out[1..].copy_from_slice(&len.to_be_bytes());
            self.buf.append_bytes(&out);
        }
    }

    pub fn encode_ext(&mut self, ext_type: i8, data: &[u8]) {
        let len = data.len() as u32;
        match len {
            1 => self.buf.append_bytes(&[0xd4, ext_type as u8]),
            2 => self.buf.append_bytes(&[0xd5, ext_type as u8]),
            4 => self.buf.append_bytes(&[0xd6, ext_type as u8]),
            8 => self.buf.append_bytes(&[0xd7, ext_type as u8]),
            16 => self.buf.append_bytes(&[0xd8, ext_type as u8]),
            _ if len <= 0xff => self.buf.append_bytes(&[0xc7, len as u8, ext_type as u8]),
            _ if len <= 0xffff => {
                let b = (len as u16).to_be_bytes();
                self.buf.append_bytes(&[0xc8, b[0], b[1], ext_type as u8]);
            }
            _ => {
                let mut out = [0xc9, 0, 0, 0, 0, 0];
                out[1..5].copy_from_slice(&len.to_be_bytes());
                out[5] = ext_type as u8;
                self.buf.append_bytes(&out);
            }
        }
        self.buf.append_bytes(data);
    }

    /// Emit a byte range that already contains a valid MessagePack object.
    pub fn encode_raw(&mut self, raw: &[u8]) {
        self.buf.append_bytes(raw);
    }
}

// ---------------------------------------------------------------------------
// Inferred impls: scalars
// ---------------------------------------------------------------------------

macro_rules! encode_as_uint {
    ($($t:ty),*) => {$(
        impl Encode for $t {
            #[inline]
            fn encode(&self, enc: &mut Encoder<'_>) {
                enc.encode_uint(*self as u64);
            }
        }
    )*};
}

macro_rules! encode_as_int {
    ($($t:ty),*) => {$(
        impl Encode for $t {
            #[inline]
            fn encode(&self, enc: &mut Encoder<'_>) {
                enc.encode_int(*self as i64);
            }
        }
    )*};
}

encode_as_uint!(u8, u16, u32, u64, usize);
encode_as_int!(i8, i16, i32, i64, isize);

impl Encode for bool {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_bool(*self);
    }
}

impl Encode for f32 {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_f32(*self);
    }
}

impl Encode for f64 {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_f64(*self);
    }
}

impl Encode for str {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_str(self.as_bytes());
    }
}

impl Encode for String {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_str(self.as_bytes());
    }
}

/// The unit value is an empty array.
impl Encode for () {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_arr_header(0);
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    #[inline]
    fn encode(&self, enc: &mut Encoder<'_>) {
        (**self).encode(enc);
    }
}

/// `None` encodes as nil, `Some` as the contained value.
impl<T: Encode> Encode for Option<T> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        match self {
            Some(v) => v.encode(enc),
            None => enc.encode_nil(),
        }
    }
}

// ---------------------------------------------------------------------------
// Inferred impls: containers
// ---------------------------------------------------------------------------

impl<T: Encode> Encode for [T] {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_arr_header(self.len() as u32);
        for v in self {
            v.encode(enc);
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        self.as_slice().encode(enc);
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode(&self, enc: &mut Encoder<'_>) {
        self.as_slice().encode(enc);
    }
}

impl<K: Encode, V: Encode, S> Encode for std::collections::HashMap<K, V, S> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_map_header(self.len() as u32);
        for (k, v) in self {
            k.encode(enc);
            v.encode(enc);
        }
    }
}

impl<K: Encode, V: Encode> Encode for std::collections::BTreeMap<K, V> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_map_header(self.len() as u32);
        for (k, v) in self {
            k.encode(enc);
            v.encode(enc);
        }
    }
}

macro_rules! encode_tuple {
    ($($name:ident : $idx:tt),+ ; $len:expr) => {
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            fn encode(&self, enc: &mut Encoder<'_>) {
                enc.encode_arr_header($len);
                $(self.$idx.encode(enc);)+
            }
        }
    };
}

encode_tuple!(A: 0; 1);
encode_tuple!(A: 0, B: 1; 2);
encode_tuple!(A: 0, B: 1, C: 2; 3);
encode_tuple!(A: 0, B: 1, C: 2, D: 3; 4);
encode_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4; 5);
encode_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5; 6);
encode_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6; 7);
encode_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7; 8);
encode_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8; 9);
encode_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9; 10);

// ---------------------------------------------------------------------------
// Specificators
// ---------------------------------------------------------------------------

/// An explicit nil.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nil;

impl Encode for Nil {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_nil();
    }
}

/// Pin the str family onto byte data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsStr<T>(pub T);

impl<T: AsRef<[u8]>> Encode for AsStr<T> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_str(self.0.as_ref());
    }
}

/// Pin the bin family onto byte data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsBin<T>(pub T);

impl<T: AsRef<[u8]>> Encode for AsBin<T> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_bin(self.0.as_ref());
    }
}

/// Pin the array family onto a sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsArr<T>(pub T);

impl<T: Encode> Encode for AsArr<&[T]> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        self.0.encode(enc);
    }
}

impl<T: Encode> Encode for AsArr<Vec<T>> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        self.0.as_slice().encode(enc);
    }
}

impl<T: Encode, const N: usize> Encode for AsArr<[T; N]> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        self.0.as_slice().encode(enc);
    }
}

/// Encode a sequence of pairs as a map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsMap<T>(pub T);

fn encode_pairs<K: Encode, V: Encode>(pairs: &[(K, V)], enc: &mut Encoder<'_>) {
    enc.encode_map_header(pairs.len() as u32);
    for (k, v) in pairs {
        k.encode(enc);
        v.encode(enc);
    }
}

impl<K: Encode, V: Encode> Encode for AsMap<&[(K, V)]> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        encode_pairs(self.0, enc);
    }
}

impl<K: Encode, V: Encode> Encode for AsMap<Vec<(K, V)>> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        encode_pairs(&self.0, enc);
    }
}

impl<K: Encode, V: Encode, const N: usize> Encode for AsMap<[(K, V); N]> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        encode_pairs(&self.0, enc);
    }
}

/// An ext object: type byte plus payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsExt<T>(pub i8, pub T);

impl<T: AsRef<[u8]>> Encode for AsExt<T> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_ext(self.0, self.1.as_ref());
    }
}

/// Pass bytes through verbatim. The bytes must already contain exactly one
/// valid MessagePack object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsRaw<T>(pub T);

impl<T: AsRef<[u8]>> Encode for AsRaw<T> {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_raw(self.0.as_ref());
    }
}

/// An unsigned integer at an explicit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsFixed(pub Width, pub u64);

impl Encode for AsFixed {
    fn encode(&self, enc: &mut Encoder<'_>) {
        enc.encode_fixed_uint(self.0, self.1);
    }
}
