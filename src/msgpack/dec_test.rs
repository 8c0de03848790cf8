use pretty_assertions::assert_eq;

use crate::buffer::Buffer;
use crate::error::DecodeError;
use crate::msgpack::{
    AsBin, AsExt, AsMap, AsRaw, AsStr, Decode, Decoder, Either, Encode, Encoder, Family, Ignore,
    MapKeys, RawRange,
};

fn buffer_with(bytes: &[u8]) -> Buffer {
    let mut buf = Buffer::new();
    buf.append_bytes(bytes);
    buf
}

fn encode_one<T: Encode + ?Sized>(value: &T) -> Vec<u8> {
    let mut buf = Buffer::new();
    Encoder::new(&mut buf).encode(value);
    let mut out = vec![0u8; buf.len()];
    buf.read_bytes(buf.begin_pos(), &mut out);
    out
}

fn decode_one<T: Decode + Default>(bytes: &[u8]) -> Result<T, DecodeError> {
    let buf = buffer_with(bytes);
    let mut dec = Decoder::new(&buf);
    let mut out = T::default();
    dec.decode(&mut out)?;
    Ok(out)
}

fn roundtrip<T>(value: T)
where
    T: Encode + Decode + Default + PartialEq + std::fmt::Debug,
{
    let decoded: T = decode_one(&encode_one(&value)).expect("roundtrip decode");
    assert_eq!(decoded, value);
}

#[test]
fn scalar_roundtrips() {
    roundtrip(0u64);
    roundtrip(0x7fu64);
    roundtrip(0xdead_beefu64);
    roundtrip(u64::MAX);
    roundtrip(-1i64);
    roundtrip(i64::MIN);
    roundtrip(true);
    roundtrip(1.5f32);
    roundtrip(1.01f64);
    roundtrip("hello".to_string());
    roundtrip(String::new());
}

#[test]
fn container_roundtrips() {
    roundtrip(vec![1u64, 2, 3]);
    roundtrip((666u64, "111".to_string(), 1.01f64));
    roundtrip([7u64, 8, 9]);

    let mut map = std::collections::BTreeMap::new();
    map.insert("a".to_string(), 1u64);
    map.insert("b".to_string(), 2u64);
    roundtrip(map);

    let mut hash = std::collections::HashMap::new();
    hash.insert(1u64, "x".to_string());
    let decoded: std::collections::HashMap<u64, String> =
        decode_one(&encode_one(&hash)).expect("hash map");
    assert_eq!(decoded, hash);
}

#[test]
fn pair_container_destination() {
    let pairs = AsMap(vec![(1u64, 10u64), (2, 20), (3, 30)]);
    let bytes = encode_one(&pairs);
    let decoded: AsMap<Vec<(u64, u64)>> = decode_one(&bytes).expect("pairs");
    assert_eq!(decoded.0, pairs.0);
}

#[test]
fn wrapper_destinations() {
    let bytes = encode_one(&AsStr("text"));
    let s: AsStr<Vec<u8>> = decode_one(&bytes).expect("as str");
    assert_eq!(s.0, b"text");

    let bytes = encode_one(&AsBin([9u8, 8, 7]));
    let b: AsBin<Vec<u8>> = decode_one(&bytes).expect("as bin");
    assert_eq!(b.0, [9, 8, 7]);
}

#[test]
fn float_destination_accepts_either_width() {
    let narrow: f32 = decode_one(&encode_one(&2.5f32)).expect("f32 from f32");
    assert_eq!(narrow, 2.5);
    let widened: f64 = decode_one(&encode_one(&2.5f32)).expect("f64 from f32");
    assert_eq!(widened, 2.5);
    let narrowed: f32 = decode_one(&encode_one(&2.5f64)).expect("f32 from f64");
    assert_eq!(narrowed, 2.5);
}

#[test]
fn uint_overflow_is_wrong_type() {
    let res: Result<u8, _> = decode_one(&encode_one(&300u64));
    assert!(matches!(res, Err(DecodeError::WrongType { .. })));
}

#[test]
fn signed_destination_accepts_uint_family() {
    let v: i64 = decode_one(&encode_one(&42u64)).expect("i64 from uint");
    assert_eq!(v, 42);
    let res: Result<i64, _> = decode_one(&encode_one(&u64::MAX));
    assert!(matches!(res, Err(DecodeError::WrongType { .. })));
}

#[test]
fn optional_sequence() {
    let mut buf = Buffer::new();
    let mut enc = Encoder::new(&mut buf);
    enc.encode(&Some(100u64));
    enc.encode(&None::<u64>);
    enc.encode(&Some(42u64));

    let mut dec = Decoder::new(&buf);
    let mut a: Option<u64> = None;
    let mut b: Option<u64> = Some(7);
    let mut c: Option<u64> = None;
    dec.decode(&mut a).expect("first");
    dec.decode(&mut b).expect("second");
    dec.decode(&mut c).expect("third");
    assert_eq!((a, b, c), (Some(100), None, Some(42)));
}

#[test]
fn map_key_binding() {
    let bytes = encode_one(&AsMap([("key1", "val1"), ("key2", "val2")]));
    let buf = buffer_with(&bytes);

    let mut v1 = String::new();
    let mut v2 = String::new();
    let mut dec = Decoder::new(&buf);
    dec.decode(&mut MapKeys((("key1", &mut v1), ("key2", &mut v2))))
        .expect("bind both");
    assert_eq!(v1, "val1");
    assert_eq!(v2, "val2");
    assert_eq!(dec.pos(), buf.end_pos());
}

#[test]
fn map_key_binding_skips_unclaimed_keys() {
    let bytes = encode_one(&AsMap([("key1", "val1"), ("key2", "val2")]));
    let buf = buffer_with(&bytes);

    let mut v1 = String::new();
    let mut v2 = String::new();
    let mut dec = Decoder::new(&buf);
    dec.decode(&mut MapKeys((("key1", &mut v1), ("key666", &mut v2))))
        .expect("bind one");
    assert_eq!(v1, "val1");
    assert_eq!(v2, "");
    // The whole map is consumed even though key2 went unclaimed.
    assert_eq!(dec.pos(), buf.end_pos());
}

#[test]
fn integer_map_keys_match_across_families() {
    let mut buf = Buffer::new();
    let mut enc = Encoder::new(&mut buf);
    enc.encode_map_header(1);
    enc.encode_int(3);
    enc.encode_uint(77);

    let mut v = 0u64;
    let mut dec = Decoder::new(&buf);
    dec.decode(&mut MapKeys(((3u64, &mut v),))).expect("bind");
    assert_eq!(v, 77);
}

#[test]
fn raw_capture() {
    let mut buf = Buffer::new();
    let mut enc = Encoder::new(&mut buf);
    enc.encode(&(1u64, 2u64, 3u64));
    enc.encode(&AsMap([(1u64, 2u64), (3, 4)]));

    let mut dec = Decoder::new(&buf);
    let mut raw = RawRange::default();
    dec.decode(&mut raw).expect("capture array");

    // The outer cursor sits at the start of the map.
    let mut first = [0u8; 1];
    buf.read_bytes(dec.pos(), &mut first);
    assert_eq!(first[0], 0x82);

    // Re-decoding the captured range stand-alone yields the array.
    let mut inner = Decoder::at(&buf, raw.begin);
    let mut tuple = (0u64, 0u64, 0u64);
    inner.decode(&mut tuple).expect("re-decode");
    assert_eq!(tuple, (1, 2, 3));
    assert_eq!(inner.pos(), raw.end);

    let mut map: AsMap<Vec<(u64, u64)>> = AsMap(Vec::new());
    dec.decode(&mut map).expect("decode map after capture");
    assert_eq!(map.0, vec![(1, 2), (3, 4)]);
}

#[test]
fn partial_input_reports_need_more_and_restores_position() {
    let full = encode_one(&(666u64, "111", 1.01f64, vec![1u64, 2, 3]));
    for cut in 0..full.len() {
        let buf = buffer_with(&full[..cut]);
        let mut dec = Decoder::new(&buf);
        let start = dec.pos();
        let mut dst: (u64, String, f64, Vec<u64>) = Default::default();
        match dec.decode(&mut dst) {
            Err(DecodeError::NeedMore) => assert_eq!(dec.pos(), start, "cut at {}", cut),
            other => panic!("expected NeedMore at cut {}, got {:?}", cut, other),
        }
    }
}

#[test]
fn wrong_type_skips_offending_object() {
    let mut buf = Buffer::new();
    let mut enc = Encoder::new(&mut buf);
    enc.encode(&"not a number");
    enc.encode(&5u64);

    let mut dec = Decoder::new(&buf);
    let mut n = 0u64;
    match dec.decode(&mut n) {
        Err(DecodeError::WrongType { expected, got }) => {
            assert_eq!(expected, Family::UINT);
            assert_eq!(got, Family::STR);
        }
        other => panic!("expected WrongType, got {:?}", other),
    }
    // The string was skipped whole; the next object decodes cleanly.
    dec.decode(&mut n).expect("next value");
    assert_eq!(n, 5);
}

#[test]
fn reserved_tag_is_broken_msgpack() {
    let res: Result<u64, _> = decode_one(&[0xc1]);
    assert_eq!(res, Err(DecodeError::BrokenMsgpack));
}

#[test]
fn depth_limit_is_enforced() {
    // Seventeen nested single-element arrays.
    let mut bytes = vec![0x91u8; 17];
    bytes.push(0x01);
    let buf = buffer_with(&bytes);
    let mut dec = Decoder::new(&buf);
    assert_eq!(dec.skip(), Err(DecodeError::MaxDepthReached));

    let shallow = buffer_with(&{
        let mut b = vec![0x91u8; 10];
        b.push(0x01);
        b
    });
    let mut dec = Decoder::new(&shallow);
    dec.skip().expect("ten levels fit");
    assert_eq!(dec.pos(), shallow.end_pos());

    let mut dec = Decoder::new(&shallow).with_max_depth(5);
    assert_eq!(dec.skip(), Err(DecodeError::MaxDepthReached));
}

#[test]
fn variant_dispatch_in_declaration_order() {
    let bytes = encode_one(&7u64);
    let v: Either<u64, String> = decode_one(&bytes).expect("uint arm");
    assert_eq!(v, Either::First(7));

    let bytes = encode_one(&"seven");
    let v: Either<u64, String> = decode_one(&bytes).expect("str arm");
    assert_eq!(v, Either::Second("seven".to_string()));

    // Both alternatives accept uint: declaration order wins.
    let v: Either<u64, i64> = decode_one(&encode_one(&7u64)).expect("ambiguous");
    assert_eq!(v, Either::First(7));
    let v: Either<u64, i64> = decode_one(&encode_one(&-7i64)).expect("int only");
    assert_eq!(v, Either::Second(-7));
}

#[test]
fn ignore_consumes_whole_object() {
    let bytes = encode_one(&AsMap([("k", vec![1u64, 2]), ("l", vec![3])]));
    let buf = buffer_with(&bytes);
    let mut dec = Decoder::new(&buf);
    dec.decode(&mut Ignore).expect("ignore");
    assert_eq!(dec.pos(), buf.end_pos());
}

#[test]
fn raw_passthrough_roundtrip() {
    let inner = encode_one(&(1u64, "a"));
    let outer = encode_one(&AsRaw(inner.as_slice()));
    assert_eq!(outer, inner);
}

#[test]
fn decode_is_deterministic() {
    let bytes = encode_one(&(5u64, vec![1u64, 2]));
    let a: (u64, Vec<u64>) = decode_one(&bytes).expect("first pass");
    let b: (u64, Vec<u64>) = decode_one(&bytes).expect("second pass");
    assert_eq!(a, b);
}

#[test]
fn wide_encodings_reencode_to_shortest() {
    // 5 encoded as uint8 decodes fine and re-encodes to a fixint, which
    // still decodes to the same value.
    let v: u64 = decode_one(&[0xcc, 0x05]).expect("wide uint");
    assert_eq!(v, 5);
    let re = encode_one(&v);
    assert_eq!(re, [0x05]);
    let v2: u64 = decode_one(&re).expect("short uint");
    assert_eq!(v2, v);
}

#[test]
fn ext_destination_roundtrip() {
    let bytes = encode_one(&AsExt(7, [1u8, 2, 3, 4]));
    let ext: AsExt<Vec<u8>> = decode_one(&bytes).expect("fixext4");
    assert_eq!(ext.0, 7);
    assert_eq!(ext.1, [1, 2, 3, 4]);

    let bytes = encode_one(&AsExt(-2, vec![9u8; 300]));
    let ext: AsExt<Vec<u8>> = decode_one(&bytes).expect("ext16");
    assert_eq!(ext.0, -2);
    assert_eq!(ext.1.len(), 300);
}

#[test]
fn ext_objects_are_skippable() {
    let mut buf = Buffer::new();
    let mut enc = Encoder::new(&mut buf);
    enc.encode_ext(4, &[1, 2, 3, 4, 5, 6, 7, 8]);
    enc.encode(&1u64);

    let mut dec = Decoder::new(&buf);
    dec.skip().expect("skip fixext8");
    let mut v = 0u64;
    dec.decode(&mut v).expect("value after ext");
    assert_eq!(v, 1);
}

#[test]
fn invalid_utf8_str_is_rejected() {
    let res: Result<String, _> = decode_one(&[0xa2, 0xff, 0xfe]);
    assert!(matches!(res, Err(DecodeError::WrongType { .. })));
}
