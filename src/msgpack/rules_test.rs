use pretty_assertions::assert_eq;

use crate::buffer::Buffer;
use crate::error::DecodeError;
use crate::msgpack::{Decode, Decoder, Encode, Encoder};
use crate::{
    mp_array_dec_rule, mp_array_enc_rule, mp_array_rule, mp_map_rule, mp_transparent_rule,
};

fn encode_one<T: Encode + ?Sized>(value: &T) -> Vec<u8> {
    let mut buf = Buffer::new();
    Encoder::new(&mut buf).encode(value);
    let mut out = vec![0u8; buf.len()];
    buf.read_bytes(buf.begin_pos(), &mut out);
    out
}

fn decode_one<T: Decode + Default>(bytes: &[u8]) -> Result<T, DecodeError> {
    let mut buf = Buffer::new();
    buf.append_bytes(bytes);
    let mut dec = Decoder::new(&buf);
    let mut out = T::default();
    dec.decode(&mut out)?;
    Ok(out)
}

#[derive(Debug, Default, Clone, PartialEq)]
struct UserTuple {
    field1: u64,
    field2: String,
    field3: f64,
}

mp_array_rule!(UserTuple { field1, field2, field3 });

#[test]
fn array_rule_roundtrip() {
    let tuple = UserTuple {
        field1: 666,
        field2: "111".to_string(),
        field3: 1.01,
    };
    // Identical on the wire to the plain tuple of its fields.
    assert_eq!(
        encode_one(&tuple),
        encode_one(&(666u64, "111", 1.01f64))
    );
    let back: UserTuple = decode_one(&encode_one(&tuple)).expect("roundtrip");
    assert_eq!(back, tuple);
}

#[test]
fn array_rule_arity_mismatch_is_wrong_type() {
    let bytes = encode_one(&(1u64, "a"));
    let res: Result<UserTuple, _> = decode_one(&bytes);
    assert!(matches!(res, Err(DecodeError::WrongType { .. })));
}

#[derive(Debug, Default, PartialEq)]
struct Limits {
    rate: u32,
    burst: u32,
}

mp_map_rule!(Limits { "rate" => rate, "burst" => burst });

#[test]
fn map_rule_roundtrip() {
    let limits = Limits { rate: 100, burst: 500 };
    let back: Limits = decode_one(&encode_one(&limits)).expect("roundtrip");
    assert_eq!(back, limits);
}

#[test]
fn map_rule_tolerates_unknown_and_missing_keys() {
    // {"burst": 7, "unknown": [1, 2]}
    let mut buf = Buffer::new();
    let mut enc = Encoder::new(&mut buf);
    enc.encode_map_header(2);
    enc.encode(&"burst");
    enc.encode(&7u32);
    enc.encode(&"unknown");
    enc.encode(&vec![1u64, 2]);
    let mut bytes = vec![0u8; buf.len()];
    buf.read_bytes(buf.begin_pos(), &mut bytes);

    let decoded: Limits = decode_one(&bytes).expect("partial map");
    assert_eq!(decoded, Limits { rate: 0, burst: 7 });
}

#[derive(Debug, Default, PartialEq)]
struct ErrorRow {
    code: u64,
    message: String,
}

mp_map_rule!(ErrorRow { 0u8 => code, 3u8 => message });

#[test]
fn map_rule_with_integer_keys() {
    let row = ErrorRow {
        code: 9,
        message: "oops".to_string(),
    };
    let back: ErrorRow = decode_one(&encode_one(&row)).expect("roundtrip");
    assert_eq!(back, row);
}

#[derive(Debug, Default, PartialEq)]
struct SpaceId {
    id: u32,
}

mp_transparent_rule!(SpaceId { id: u32 });

#[test]
fn transparent_rule_is_invisible_on_the_wire() {
    let space = SpaceId { id: 512 };
    assert_eq!(encode_one(&space), encode_one(&512u32));
    let back: SpaceId = decode_one(&encode_one(&space)).expect("roundtrip");
    assert_eq!(back, space);
}

#[derive(Debug, Default, PartialEq)]
struct EncOnly {
    a: u64,
    b: u64,
}

mp_array_enc_rule!(EncOnly { a, b });

#[derive(Debug, Default, PartialEq)]
struct DecOnly {
    a: u64,
    b: u64,
}

mp_array_dec_rule!(DecOnly { a, b });

#[test]
fn split_declarations_compose() {
    let bytes = encode_one(&EncOnly { a: 1, b: 2 });
    let back: DecOnly = decode_one(&bytes).expect("cross decode");
    assert_eq!(back, DecOnly { a: 1, b: 2 });
}
