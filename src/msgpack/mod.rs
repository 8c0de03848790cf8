//! Rule-driven MessagePack codec over the segmented buffer.
//!
//! The encoder ([`Encoder`], [`Encode`]) and the decoder ([`Decoder`],
//! [`Decode`]) are statically dispatched: each supported type carries its
//! encoding rule in its `Encode`/`Decode` impl, chosen at compile time,
//! with no runtime type information and no intermediate tree.

pub mod family;

mod dec;
mod enc;
mod rules;

pub use dec::{
    DecodedKey, Decode, Decoder, Either, Ignore, MapKeyPattern, MapKeys, MpHead, RawRange,
    DEFAULT_MAX_DEPTH,
};
pub use enc::{
    AsArr, AsBin, AsExt, AsFixed, AsMap, AsRaw, AsStr, Encode, Encoder, Nil, Width,
};
pub use family::Family;

#[cfg(test)]
mod dec_test;
#[cfg(test)]
mod rules_test;
