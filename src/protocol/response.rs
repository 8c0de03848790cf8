//! Response frame decoder.
//!
//! A frame is parsed in place out of the connection's input buffer. The
//! `data` body field is never materialised: the decoder captures the byte
//! range of the tuple array with a pair of heavy cursors, which both pins
//! the range against input-buffer garbage collection and lets the caller
//! decode tuples zero-copy at its leisure.
//!
//! Until the full frame has arrived the decoder reports
//! [`DecodeError::NeedMore`] without consuming anything, so the caller can
//! retry from the same position once more bytes land.

use crate::buffer::{Buffer, Cursor, LightCursor};
use crate::error::DecodeError;
use crate::msgpack::{DecodedKey, Decoder, MapKeys, MpHead, RawRange};

use super::constant::{body_key, header_key, FRAME_SIZE_PREFIX, TYPE_ERROR_BIT};

/// Frame header: `{0x00 type, 0x01 sync, 0x05 schema version}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseHeader {
    pub sync: u64,
    /// Zero on success; the server error code otherwise.
    pub code: u32,
    pub schema_version: u64,
}

/// One entry of a server error stack.
#[derive(Debug, Clone, Default)]
pub struct ErrorDesc {
    pub error_type: String,
    pub file: String,
    pub line: u64,
    pub message: String,
    pub sys_errno: u64,
    pub code: u64,
}

crate::mp_map_dec_rule!(ErrorDesc {
    0u8 => error_type,
    1u8 => file,
    2u8 => line,
    3u8 => message,
    4u8 => sys_errno,
    5u8 => code,
});

/// Server error stack, outermost error first.
#[derive(Debug, Clone, Default)]
pub struct ErrorStack(pub Vec<ErrorDesc>);

impl std::fmt::Display for ErrorStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "unknown server error");
        }
        for (i, desc) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; caused by: ")?;
            }
            write!(f, "{} ({}, code {})", desc.message, desc.error_type, desc.code)?;
        }
        Ok(())
    }
}

/// One decoded response. Holding it pins the `data` range in the
/// connection's input buffer until dropped.
#[derive(Debug)]
pub struct Response {
    pub header: ResponseHeader,
    /// Byte range of the MessagePack array of result tuples.
    pub data: Option<(Cursor, Cursor)>,
    pub error: Option<ErrorStack>,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        self.header.code == 0
    }

    /// Take the error stack, substituting an empty one if the server sent
    /// an error code without a stack.
    pub fn take_error(&mut self) -> ErrorStack {
        self.error.take().unwrap_or_default()
    }
}

/// Decode one response frame starting at `at`.
///
/// Returns the response and the position one past the frame. `NeedMore`
/// means the frame has not fully arrived; nothing is consumed.
pub fn decode_response(
    buf: &Buffer,
    at: LightCursor,
) -> Result<(Response, LightCursor), DecodeError> {
    if !buf.has(at, FRAME_SIZE_PREFIX) {
        return Err(DecodeError::NeedMore);
    }
    let mut dec = Decoder::at(buf, at);
    let size = match dec.read_head()? {
        MpHead::Uint(size) => size as usize,
        _ => return Err(DecodeError::BrokenMsgpack),
    };
    if !buf.has(dec.pos(), size) {
        return Err(DecodeError::NeedMore);
    }
    let frame_end = dec.pos().plus(size);

    let mut header = ResponseHeader::default();
    let mut raw_type = 0u64;
    let n = match dec.read_head()? {
        MpHead::Map(n) => n,
        _ => return Err(DecodeError::BrokenMsgpack),
    };
    for _ in 0..n {
        match dec.read_map_key()? {
            DecodedKey::Uint(k) if k == header_key::REQUEST_TYPE as u64 => {
                dec.decode(&mut raw_type)?;
            }
            DecodedKey::Uint(k) if k == header_key::SYNC as u64 => {
                dec.decode(&mut header.sync)?;
            }
            DecodedKey::Uint(k) if k == header_key::SCHEMA_VERSION as u64 => {
                dec.decode(&mut header.schema_version)?;
            }
            _ => dec.skip()?,
        }
    }
    header.code = (raw_type as u32) & !TYPE_ERROR_BIT;

    let mut data = None;
    let mut error = None;
    if dec.pos() < frame_end {
        let n = match dec.read_head()? {
            MpHead::Map(n) => n,
            _ => return Err(DecodeError::BrokenMsgpack),
        };
        for _ in 0..n {
            match dec.read_map_key()? {
                DecodedKey::Uint(k) if k == body_key::DATA as u64 => {
                    let mut raw = RawRange::default();
                    dec.decode(&mut raw)?;
                    data = Some((buf.make_cursor(raw.begin), buf.make_cursor(raw.end)));
                }
                DecodedKey::Uint(k) if k == body_key::ERROR as u64 => {
                    let mut stack: Vec<ErrorDesc> = Vec::new();
                    dec.decode(&mut MapKeys(((0u8, &mut stack),)))?;
                    error = Some(ErrorStack(stack));
                }
                DecodedKey::Uint(k) if k == body_key::ERROR_24 as u64 => {
                    let mut message = String::new();
                    dec.decode(&mut message)?;
                    // Pre-2.4 servers send a bare message string.
                    if error.is_none() {
                        error = Some(ErrorStack(vec![ErrorDesc {
                            message,
                            code: header.code as u64,
                            ..ErrorDesc::default()
                        }]));
                    }
                }
                _ => dec.skip()?,
            }
        }
    }

    if dec.pos() > frame_end {
        return Err(DecodeError::BrokenMsgpack);
    }

    Ok((
        Response {
            header,
            data,
            error,
        },
        frame_end,
    ))
}
