//! IPROTO wire constants.

/// Welcome banner sent by the server on accept, consumed once per
/// connection before any frame.
pub const GREETING_SIZE: usize = 128;

/// Length of each of the two greeting lines.
pub const GREETING_LINE_SIZE: usize = 64;

/// The salt occupies up to 44 base64 characters of the second line.
pub const GREETING_SALT_CHARS: usize = 44;

/// Bytes of salt consumed by the chap-sha1 scramble.
pub const SCRAMBLE_SIZE: usize = 20;

/// Every frame starts with a MessagePack uint32 (`0xce` + 4 bytes)
/// carrying the byte length of the rest of the frame.
pub const FRAME_SIZE_PREFIX: usize = 5;

/// The response type field carries this bit for error responses; the low
/// bits are the error code.
pub const TYPE_ERROR_BIT: u32 = 0x8000;

/// Request operation codes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Select = 1,
    Insert = 2,
    Replace = 3,
    Update = 4,
    Delete = 5,
    Auth = 7,
    Upsert = 9,
    Call = 10,
    Execute = 11,
    Prepare = 13,
    Ping = 64,
}

/// Keys of the frame header map.
pub mod header_key {
    pub const REQUEST_TYPE: u8 = 0x00;
    pub const SYNC: u8 = 0x01;
    pub const SCHEMA_VERSION: u8 = 0x05;
}

/// Keys of request/response body maps.
pub mod body_key {
    pub const SPACE_ID: u8 = 0x10;
    pub const INDEX_ID: u8 = 0x11;
    pub const LIMIT: u8 = 0x12;
    pub const OFFSET: u8 = 0x13;
    pub const ITERATOR: u8 = 0x14;
    pub const INDEX_BASE: u8 = 0x15;
    pub const KEY: u8 = 0x20;
    pub const TUPLE: u8 = 0x21;
    pub const FUNCTION_NAME: u8 = 0x22;
    pub const USER_NAME: u8 = 0x23;
    pub const OPS: u8 = 0x28;
    pub const DATA: u8 = 0x30;
    pub const ERROR_24: u8 = 0x31;
    pub const SQL_TEXT: u8 = 0x40;
    pub const SQL_BIND: u8 = 0x41;
    pub const STMT_ID: u8 = 0x43;
    pub const ERROR: u8 = 0x52;
}

/// Keys of one error descriptor inside the error stack.
pub mod error_key {
    pub const TYPE: u8 = 0x00;
    pub const FILE: u8 = 0x01;
    pub const LINE: u8 = 0x02;
    pub const MESSAGE: u8 = 0x03;
    pub const ERRNO: u8 = 0x04;
    pub const CODE: u8 = 0x05;
}

/// Index iteration orders accepted by select.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IteratorType {
    #[default]
    Eq = 0,
    Req = 1,
    All = 2,
    Lt = 3,
    Le = 4,
    Ge = 5,
    Gt = 6,
    BitsAllSet = 7,
    BitsAnySet = 8,
    BitsAllNotSet = 9,
    Overlaps = 10,
    Neighbor = 11,
}
