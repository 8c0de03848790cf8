//! Request frame encoder.
//!
//! A request frame is `msgpack-uint32 size | header map | body map`. The
//! encoder reserves the five-byte size prefix up front, writes header and
//! body straight into the output buffer, then patches the prefix with a
//! fixed-width uint32, in one pass with no intermediate buffering.

use crate::buffer::{Buffer, LightCursor};
use crate::msgpack::{AsStr, Encode, Encoder};

use super::auth::scramble;
use super::constant::{body_key, header_key, FRAME_SIZE_PREFIX, IteratorType, RequestType};
use super::greeting::Greeting;

/// Builds request frames into a connection's output buffer and issues
/// monotonically increasing sync ids.
#[derive(Debug, Default)]
pub struct RequestEncoder {
    sync: u64,
}

impl RequestEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sync id of the most recently encoded request.
    pub fn sync(&self) -> u64 {
        self.sync
    }

    fn begin_frame(&mut self, buf: &mut Buffer, code: RequestType) -> LightCursor {
        self.sync += 1;
        let mut enc = Encoder::new(buf);
        let (size_at, _) = enc.reserve(FRAME_SIZE_PREFIX);
        enc.encode_map_header(2);
        enc.encode_uint(header_key::REQUEST_TYPE as u64);
        enc.encode_uint(code as u64);
        enc.encode_uint(header_key::SYNC as u64);
        enc.encode_uint(self.sync);
        size_at
    }

    fn finish_frame(&self, buf: &mut Buffer, size_at: LightCursor) -> u64 {
        let size = buf.end_pos().sub(size_at) - FRAME_SIZE_PREFIX;
        let mut prefix = [0xce, 0, 0, 0, 0];
        prefix[1..].copy_from_slice(&(size as u32).to_be_bytes());
        buf.write_bytes(size_at, &prefix);
        self.sync
    }

    /// Ping carries a header and no body.
    pub fn encode_ping(&mut self, buf: &mut Buffer) -> u64 {
        let size_at = self.begin_frame(buf, RequestType::Ping);
        self.finish_frame(buf, size_at)
    }

    pub fn encode_insert<T: Encode + ?Sized>(
        &mut self,
        buf: &mut Buffer,
        tuple: &T,
        space_id: u32,
    ) -> u64 {
        let size_at = self.begin_frame(buf, RequestType::Insert);
        let mut enc = Encoder::new(buf);
        enc.encode_map_header(2);
        enc.encode_uint(body_key::SPACE_ID as u64);
        enc.encode_uint(space_id as u64);
        enc.encode_uint(body_key::TUPLE as u64);
        enc.encode(tuple);
        self.finish_frame(buf, size_at)
    }

    pub fn encode_replace<T: Encode + ?Sized>(
        &mut self,
        buf: &mut Buffer,
        tuple: &T,
        space_id: u32,
    ) -> u64 {
        let size_at = self.begin_frame(buf, RequestType::Replace);
        let mut enc = Encoder::new(buf);
        enc.encode_map_header(2);
        enc.encode_uint(body_key::SPACE_ID as u64);
        enc.encode_uint(space_id as u64);
        enc.encode_uint(body_key::TUPLE as u64);
        enc.encode(tuple);
        self.finish_frame(buf, size_at)
    }

    pub fn encode_delete<K: Encode + ?Sized>(
        &mut self,
        buf: &mut Buffer,
        key: &K,
        space_id: u32,
        index_id: u32,
    ) -> u64 {
        let size_at = self.begin_frame(buf, RequestType::Delete);
        let mut enc = Encoder::new(buf);
        enc.encode_map_header(3);
        enc.encode_uint(body_key::SPACE_ID as u64);
        enc.encode_uint(space_id as u64);
        enc.encode_uint(body_key::INDEX_ID as u64);
        enc.encode_uint(index_id as u64);
        enc.encode_uint(body_key::KEY as u64);
        enc.encode(key);
        self.finish_frame(buf, size_at)
    }

    pub fn encode_update<K: Encode + ?Sized, O: Encode + ?Sized>(
        &mut self,
        buf: &mut Buffer,
        key: &K,
        ops: &O,
        space_id: u32,
        index_id: u32,
    ) -> u64 {
        let size_at = self.begin_frame(buf, RequestType::Update);
        let mut enc = Encoder::new(buf);
        enc.encode_map_header(4);
        enc.encode_uint(body_key::SPACE_ID as u64);
        enc.encode_uint(space_id as u64);
        enc.encode_uint(body_key::INDEX_ID as u64);
        enc.encode_uint(index_id as u64);
        enc.encode_uint(body_key::KEY as u64);
        enc.encode(key);
        enc.encode_uint(body_key::TUPLE as u64);
        enc.encode(ops);
        self.finish_frame(buf, size_at)
    }

    pub fn encode_upsert<T: Encode + ?Sized, O: Encode + ?Sized>(
        &mut self,
        buf: &mut Buffer,
        tuple: &T,
        ops: &O,
        space_id: u32,
        index_base: u32,
    ) -> u64 {
        let size_at = self.begin_frame(buf, RequestType::Upsert);
        let mut enc = Encoder::new(buf);
        enc.encode_map_header(4);
        enc.encode_uint(body_key::SPACE_ID as u64);
        enc.encode_uint(space_id as u64);
        enc.encode_uint(body_key::INDEX_BASE as u64);
        enc.encode_uint(index_base as u64);
        enc.encode_uint(body_key::OPS as u64);
        enc.encode(ops);
        enc.encode_uint(body_key::TUPLE as u64);
        enc.encode(tuple);
        self.finish_frame(buf, size_at)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn encode_select<K: Encode + ?Sized>(
        &mut self,
        buf: &mut Buffer,
        key: &K,
        space_id: u32,
        index_id: u32,
        limit: u32,
        offset: u32,
        iterator: IteratorType,
    ) -> u64 {
        let size_at = self.begin_frame(buf, RequestType::Select);
        let mut enc = Encoder::new(buf);
        enc.encode_map_header(6);
        enc.encode_uint(body_key::SPACE_ID as u64);
        enc.encode_uint(space_id as u64);
        enc.encode_uint(body_key::INDEX_ID as u64);
        enc.encode_uint(index_id as u64);
        enc.encode_uint(body_key::LIMIT as u64);
        enc.encode_uint(limit as u64);
        enc.encode_uint(body_key::OFFSET as u64);
        enc.encode_uint(offset as u64);
        enc.encode_uint(body_key::ITERATOR as u64);
        enc.encode_uint(iterator as u64);
        enc.encode_uint(body_key::KEY as u64);
        enc.encode(key);
        self.finish_frame(buf, size_at)
    }

    pub fn encode_call<T: Encode + ?Sized>(
        &mut self,
        buf: &mut Buffer,
        function: &str,
        args: &T,
    ) -> u64 {
        let size_at = self.begin_frame(buf, RequestType::Call);
        let mut enc = Encoder::new(buf);
        enc.encode_map_header(2);
        enc.encode_uint(body_key::FUNCTION_NAME as u64);
        enc.encode_str(function.as_bytes());
        enc.encode_uint(body_key::TUPLE as u64);
        enc.encode(args);
        self.finish_frame(buf, size_at)
    }

    /// Execute an SQL statement given as text.
    pub fn encode_execute<T: Encode + ?Sized>(
        &mut self,
        buf: &mut Buffer,
        statement: &str,
        parameters: &T,
    ) -> u64 {
        let size_at = self.begin_frame(buf, RequestType::Execute);
        let mut enc = Encoder::new(buf);
        enc.encode_map_header(2);
        enc.encode_uint(body_key::SQL_TEXT as u64);
        enc.encode_str(statement.as_bytes());
        enc.encode_uint(body_key::SQL_BIND as u64);
        enc.encode(parameters);
        self.finish_frame(buf, size_at)
    }

    /// Execute a statement previously prepared with
    /// [`encode_prepare`](Self::encode_prepare).
    pub fn encode_execute_prepared<T: Encode + ?Sized>(
        &mut self,
        buf: &mut Buffer,
        stmt_id: u64,
        parameters: &T,
    ) -> u64 {
        let size_at = self.begin_frame(buf, RequestType::Execute);
        let mut enc = Encoder::new(buf);
        enc.encode_map_header(2);
        enc.encode_uint(body_key::STMT_ID as u64);
        enc.encode_uint(stmt_id);
        enc.encode_uint(body_key::SQL_BIND as u64);
        enc.encode(parameters);
        self.finish_frame(buf, size_at)
    }

    pub fn encode_prepare(&mut self, buf: &mut Buffer, statement: &str) -> u64 {
        let size_at = self.begin_frame(buf, RequestType::Prepare);
        let mut enc = Encoder::new(buf);
        enc.encode_map_header(1);
        enc.encode_uint(body_key::SQL_TEXT as u64);
        enc.encode_str(statement.as_bytes());
        self.finish_frame(buf, size_at)
    }

    pub fn encode_auth(
        &mut self,
        buf: &mut Buffer,
        user: &str,
        password: &str,
        greeting: &Greeting,
    ) -> u64 {
        let size_at = self.begin_frame(buf, RequestType::Auth);
        let digest = scramble(&greeting.salt, password);
        let mut enc = Encoder::new(buf);
        enc.encode_map_header(2);
        enc.encode_uint(body_key::USER_NAME as u64);
        enc.encode_str(user.as_bytes());
        enc.encode_uint(body_key::TUPLE as u64);
        enc.encode(&("chap-sha1", AsStr(digest)));
        self.finish_frame(buf, size_at)
    }
}
