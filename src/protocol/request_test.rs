use pretty_assertions::assert_eq;

use crate::buffer::Buffer;
use crate::msgpack::{DecodedKey, Decoder, MpHead, RawRange};

use super::auth::scramble;
use super::constant::{body_key, header_key, IteratorType, RequestType, SCRAMBLE_SIZE};
use super::greeting::Greeting;
use super::request::RequestEncoder;

fn contents(buf: &Buffer) -> Vec<u8> {
    let mut out = vec![0u8; buf.len()];
    buf.read_bytes(buf.begin_pos(), &mut out);
    out
}

/// Decoded skeleton of one request frame.
struct Frame {
    code: u64,
    sync: u64,
    body: Vec<(u64, RawRange)>,
    end_reached: bool,
}

fn parse_frame(buf: &Buffer) -> Frame {
    let mut dec = Decoder::new(buf);
    let size = match dec.read_head().expect("size prefix") {
        MpHead::Uint(size) => size as usize,
        other => panic!("unexpected size prefix {:?}", other),
    };
    let frame_end = dec.pos().plus(size);

    let mut code = u64::MAX;
    let mut sync = u64::MAX;
    let n = match dec.read_head().expect("header map") {
        MpHead::Map(n) => n,
        other => panic!("unexpected header {:?}", other),
    };
    for _ in 0..n {
        match dec.read_map_key().expect("header key") {
            DecodedKey::Uint(k) if k == header_key::REQUEST_TYPE as u64 => {
                dec.decode(&mut code).expect("code");
            }
            DecodedKey::Uint(k) if k == header_key::SYNC as u64 => {
                dec.decode(&mut sync).expect("sync");
            }
            _ => dec.skip().expect("skip header value"),
        }
    }

    let mut body = Vec::new();
    if dec.pos() < frame_end {
        let n = match dec.read_head().expect("body map") {
            MpHead::Map(n) => n,
            other => panic!("unexpected body {:?}", other),
        };
        for _ in 0..n {
            let key = match dec.read_map_key().expect("body key") {
                DecodedKey::Uint(k) => k,
                other => panic!("unexpected body key {:?}", other),
            };
            let mut raw = RawRange::default();
            dec.decode(&mut raw).expect("body value");
            body.push((key, raw));
        }
    }
    Frame {
        code,
        sync,
        body,
        end_reached: dec.pos() == frame_end && frame_end == buf.end_pos(),
    }
}

#[test]
fn ping_frame_bytes() {
    let mut buf = Buffer::new();
    let mut enc = RequestEncoder::new();
    let sync = enc.encode_ping(&mut buf);
    assert_eq!(sync, 1);
    // size prefix | {0x00: PING, 0x01: 1}
    assert_eq!(
        contents(&buf),
        [0xce, 0, 0, 0, 5, 0x82, 0x00, 0x40, 0x01, 0x01]
    );
}

#[test]
fn sync_ids_are_monotonic() {
    let mut buf = Buffer::new();
    let mut enc = RequestEncoder::new();
    assert_eq!(enc.encode_ping(&mut buf), 1);
    assert_eq!(enc.encode_ping(&mut buf), 2);
    assert_eq!(enc.encode_replace(&mut buf, &(1u64,), 512), 3);
    assert_eq!(enc.sync(), 3);
}

#[test]
fn replace_frame_shape() {
    let mut buf = Buffer::new();
    let mut enc = RequestEncoder::new();
    enc.encode_replace(&mut buf, &(666u64, "111", 1.01f64), 512);

    let frame = parse_frame(&buf);
    assert_eq!(frame.code, RequestType::Replace as u64);
    assert_eq!(frame.sync, 1);
    assert!(frame.end_reached, "size prefix must cover the whole frame");

    let keys: Vec<u64> = frame.body.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, [body_key::SPACE_ID as u64, body_key::TUPLE as u64]);

    let (_, tuple_range) = &frame.body[1];
    let mut dec = Decoder::at(&buf, tuple_range.begin);
    let mut tuple = (0u64, String::new(), 0f64);
    dec.decode(&mut tuple).expect("tuple");
    assert_eq!(tuple, (666, "111".to_string(), 1.01));
}

#[test]
fn select_frame_shape() {
    let mut buf = Buffer::new();
    let mut enc = RequestEncoder::new();
    enc.encode_select(&mut buf, &(666u64,), 512, 0, u32::MAX, 0, IteratorType::Eq);

    let frame = parse_frame(&buf);
    assert_eq!(frame.code, RequestType::Select as u64);
    assert!(frame.end_reached);
    let keys: Vec<u64> = frame.body.iter().map(|(k, _)| *k).collect();
    assert_eq!(
        keys,
        [
            body_key::SPACE_ID as u64,
            body_key::INDEX_ID as u64,
            body_key::LIMIT as u64,
            body_key::OFFSET as u64,
            body_key::ITERATOR as u64,
            body_key::KEY as u64,
        ]
    );
}

#[test]
fn update_and_upsert_frame_shapes() {
    let mut buf = Buffer::new();
    let mut enc = RequestEncoder::new();
    enc.encode_update(&mut buf, &(666u64,), &[("=", 1u64, 7u64)], 512, 0);
    let frame = parse_frame(&buf);
    assert_eq!(frame.code, RequestType::Update as u64);
    let keys: Vec<u64> = frame.body.iter().map(|(k, _)| *k).collect();
    assert_eq!(
        keys,
        [
            body_key::SPACE_ID as u64,
            body_key::INDEX_ID as u64,
            body_key::KEY as u64,
            body_key::TUPLE as u64,
        ]
    );

    let mut buf = Buffer::new();
    enc.encode_upsert(&mut buf, &(666u64, 1u64), &[("+", 1u64, 1u64)], 512, 0);
    let frame = parse_frame(&buf);
    assert_eq!(frame.code, RequestType::Upsert as u64);
    let keys: Vec<u64> = frame.body.iter().map(|(k, _)| *k).collect();
    assert_eq!(
        keys,
        [
            body_key::SPACE_ID as u64,
            body_key::INDEX_BASE as u64,
            body_key::OPS as u64,
            body_key::TUPLE as u64,
        ]
    );
}

#[test]
fn sql_frames() {
    let mut buf = Buffer::new();
    let mut enc = RequestEncoder::new();
    enc.encode_execute(&mut buf, "SELECT * FROM t WHERE id = ?", &(666u64,));
    let frame = parse_frame(&buf);
    assert_eq!(frame.code, RequestType::Execute as u64);
    let keys: Vec<u64> = frame.body.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, [body_key::SQL_TEXT as u64, body_key::SQL_BIND as u64]);

    let mut buf = Buffer::new();
    enc.encode_execute_prepared(&mut buf, 42, &(666u64,));
    let frame = parse_frame(&buf);
    let keys: Vec<u64> = frame.body.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, [body_key::STMT_ID as u64, body_key::SQL_BIND as u64]);

    let mut buf = Buffer::new();
    enc.encode_prepare(&mut buf, "SELECT 1");
    let frame = parse_frame(&buf);
    assert_eq!(frame.code, RequestType::Prepare as u64);
}

#[test]
fn auth_frame_carries_chap_sha1_scramble() {
    let greeting = Greeting {
        version_id: (2 << 16) | (11 << 8),
        salt: (0u8..32).collect(),
    };
    let mut buf = Buffer::new();
    let mut enc = RequestEncoder::new();
    enc.encode_auth(&mut buf, "guest", "secret", &greeting);

    let frame = parse_frame(&buf);
    assert_eq!(frame.code, RequestType::Auth as u64);
    let keys: Vec<u64> = frame.body.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, [body_key::USER_NAME as u64, body_key::TUPLE as u64]);

    let (_, user_range) = &frame.body[0];
    let mut dec = Decoder::at(&buf, user_range.begin);
    let mut user = String::new();
    dec.decode(&mut user).expect("user");
    assert_eq!(user, "guest");

    let (_, tuple_range) = &frame.body[1];
    let mut dec = Decoder::at(&buf, tuple_range.begin);
    let mut auth_tuple: (String, crate::msgpack::AsStr<Vec<u8>>) = Default::default();
    dec.decode(&mut auth_tuple).expect("auth tuple");
    assert_eq!(auth_tuple.0, "chap-sha1");
    assert_eq!(auth_tuple.1 .0, scramble(&greeting.salt, "secret"));
}

#[test]
fn scramble_is_deterministic_and_password_sensitive() {
    let salt: Vec<u8> = (0u8..32).collect();
    let a = scramble(&salt, "secret");
    let b = scramble(&salt, "secret");
    let c = scramble(&salt, "other");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), SCRAMBLE_SIZE);
}
