//! One logical connection: buffers, codec state, pending responses.
//!
//! `Connection` is a cheap refcounted handle; clones share one underlying
//! connection, and the last drop releases the stream and returns all
//! buffer blocks to the slab pool. All state lives behind a single-thread
//! `RefCell`; the crate's concurrency model confines every connection to
//! the thread driving its reactor.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use mio::Token;
use tracing::{debug, trace};

use crate::buffer::{Buffer, Cursor};
use crate::error::{DecodeError, Error, Result};
use crate::msgpack::{Decode, Decoder, Encode};
use crate::protocol::constant::IteratorType;
use crate::protocol::response::{decode_response, Response};
use crate::protocol::{Greeting, RequestEncoder};

use super::reactor::SendQueue;
use super::stream::Stream;

/// Input-buffer garbage collection cadence, in decoded frames.
const GC_STEP_CNT: u64 = 100;

/// Error recorded on a failed connection.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    pub msg: String,
    /// Saved in case the connection failed due to a system error.
    pub sys_errno: i32,
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.sys_errno != 0 {
            write!(f, "{} (errno {})", self.msg, self.sys_errno)
        } else {
            f.write_str(&self.msg)
        }
    }
}

pub(crate) struct ConnImpl {
    pub(crate) input: Buffer,
    pub(crate) output: Buffer,
    pub(crate) enc: RequestEncoder,
    /// Separates decoded from raw data in the input buffer.
    pub(crate) end_decoded: Cursor,
    pub(crate) stream: Option<Stream>,
    pub(crate) token: Option<Token>,
    pub(crate) send_queue: Option<Rc<RefCell<SendQueue>>>,
    pub(crate) in_send_queue: bool,
    /// A partial write left the stream armed for writable readiness.
    pub(crate) write_blocked: bool,
    pub(crate) futures: HashMap<u64, Response>,
    forgotten: HashSet<u64>,
    pub(crate) error: Option<ConnectionError>,
    pub(crate) greeting: Option<Greeting>,
    gc_step: u64,
}

impl ConnImpl {
    fn new() -> Self {
        let input = Buffer::new();
        let end_decoded = input.begin();
        Self {
            input,
            output: Buffer::new(),
            enc: RequestEncoder::new(),
            end_decoded,
            stream: None,
            token: None,
            send_queue: None,
            in_send_queue: false,
            write_blocked: false,
            futures: HashMap::new(),
            forgotten: HashSet::new(),
            error: None,
            greeting: None,
            gc_step: 0,
        }
    }

    /// Schedule the pending output for the next reactor round.
    pub(crate) fn mark_ready_to_send(&mut self) {
        if self.in_send_queue {
            return;
        }
        if let (Some(queue), Some(token)) = (&self.send_queue, self.token) {
            queue.borrow_mut().push(token);
            self.in_send_queue = true;
        }
    }

    pub(crate) fn set_error(&mut self, msg: String, sys_errno: i32) {
        debug!(%msg, sys_errno, "connection failed");
        if self.error.is_none() {
            self.error = Some(ConnectionError { msg, sys_errno });
        }
    }

    pub(crate) fn has_data_to_send(&self) -> bool {
        !self.output.is_empty()
    }

    /// Decode every complete frame sitting after `end_decoded`, filing the
    /// responses into the pending map. Returns the number of responses
    /// made ready.
    pub(crate) fn process_responses(&mut self) -> Result<usize> {
        let mut ready = 0usize;
        loop {
            let at = self.end_decoded.pos();
            match decode_response(&self.input, at) {
                Ok((response, next)) => {
                    self.end_decoded.set(next);
                    let sync = response.header.sync;
                    trace!(
                        sync,
                        code = response.header.code,
                        schema = response.header.schema_version,
                        "decoded response"
                    );
                    if self.forgotten.remove(&sync) {
                        trace!(sync, "dropping forgotten response");
                    } else {
                        self.futures.insert(sync, response);
                        ready += 1;
                    }
                    self.gc_step += 1;
                    if self.gc_step % GC_STEP_CNT == 0 {
                        trace!("flushing input buffer");
                        self.input.flush();
                    }
                }
                Err(DecodeError::NeedMore) => break,
                Err(e) => {
                    // The frame boundary is lost; nothing after this point
                    // in the stream can be trusted.
                    self.set_error(format!("Failed to decode response: {}", e), 0);
                    return Err(Error::DecodeError(e));
                }
            }
        }
        Ok(ready)
    }
}

/// A refcounted handle to one connection. Request methods write the frame
/// into the output buffer synchronously and schedule I/O; only the
/// connector's wait operations suspend. Chaining several requests before
/// one wait is the idiomatic batching pattern.
#[derive(Clone)]
pub struct Connection {
    inner: Rc<RefCell<ConnImpl>>,
}

impl Connection {
    pub(crate) fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ConnImpl::new())),
        }
    }

    pub(crate) fn inner(&self) -> &Rc<RefCell<ConnImpl>> {
        &self.inner
    }

    pub fn ping(&self) -> u64 {
        let i = &mut *self.inner.borrow_mut();
        let sync = i.enc.encode_ping(&mut i.output);
        i.mark_ready_to_send();
        sync
    }

    pub fn insert<T: Encode + ?Sized>(&self, space_id: u32, tuple: &T) -> u64 {
        let i = &mut *self.inner.borrow_mut();
        let sync = i.enc.encode_insert(&mut i.output, tuple, space_id);
        i.mark_ready_to_send();
        sync
    }

    pub fn replace<T: Encode + ?Sized>(&self, space_id: u32, tuple: &T) -> u64 {
        let i = &mut *self.inner.borrow_mut();
        let sync = i.enc.encode_replace(&mut i.output, tuple, space_id);
        i.mark_ready_to_send();
        sync
    }

    pub fn delete<K: Encode + ?Sized>(&self, space_id: u32, index_id: u32, key: &K) -> u64 {
        let i = &mut *self.inner.borrow_mut();
        let sync = i.enc.encode_delete(&mut i.output, key, space_id, index_id);
        i.mark_ready_to_send();
        sync
    }

    pub fn update<K: Encode + ?Sized, O: Encode + ?Sized>(
        &self,
        space_id: u32,
        index_id: u32,
        key: &K,
        ops: &O,
    ) -> u64 {
        let i = &mut *self.inner.borrow_mut();
        let sync = i.enc.encode_update(&mut i.output, key, ops, space_id, index_id);
        i.mark_ready_to_send();
        sync
    }

    pub fn upsert<T: Encode + ?Sized, O: Encode + ?Sized>(
        &self,
        space_id: u32,
        index_base: u32,
        tuple: &T,
        ops: &O,
    ) -> u64 {
        let i = &mut *self.inner.borrow_mut();
        let sync = i.enc.encode_upsert(&mut i.output, tuple, ops, space_id, index_base);
        i.mark_ready_to_send();
        sync
    }

    /// Select by key with the equality iterator and no limit.
    pub fn select<K: Encode + ?Sized>(&self, space_id: u32, index_id: u32, key: &K) -> u64 {
        self.select_with(space_id, index_id, key, u32::MAX, 0, IteratorType::Eq)
    }

    pub fn select_with<K: Encode + ?Sized>(
        &self,
        space_id: u32,
        index_id: u32,
        key: &K,
        limit: u32,
        offset: u32,
        iterator: IteratorType,
    ) -> u64 {
        let i = &mut *self.inner.borrow_mut();
        let sync =
            i.enc
                .encode_select(&mut i.output, key, space_id, index_id, limit, offset, iterator);
        i.mark_ready_to_send();
        sync
    }

    pub fn call<T: Encode + ?Sized>(&self, function: &str, args: &T) -> u64 {
        let i = &mut *self.inner.borrow_mut();
        let sync = i.enc.encode_call(&mut i.output, function, args);
        i.mark_ready_to_send();
        sync
    }

    /// Execute an SQL statement given as text.
    pub fn execute<T: Encode + ?Sized>(&self, statement: &str, parameters: &T) -> u64 {
        let i = &mut *self.inner.borrow_mut();
        let sync = i.enc.encode_execute(&mut i.output, statement, parameters);
        i.mark_ready_to_send();
        sync
    }

    /// Execute a statement prepared with [`prepare`](Self::prepare).
    pub fn execute_prepared<T: Encode + ?Sized>(&self, stmt_id: u64, parameters: &T) -> u64 {
        let i = &mut *self.inner.borrow_mut();
        let sync = i.enc.encode_execute_prepared(&mut i.output, stmt_id, parameters);
        i.mark_ready_to_send();
        sync
    }

    pub fn prepare(&self, statement: &str) -> u64 {
        let i = &mut *self.inner.borrow_mut();
        let sync = i.enc.encode_prepare(&mut i.output, statement);
        i.mark_ready_to_send();
        sync
    }

    /// True iff the response for `sync` has arrived and is waiting to be
    /// taken.
    pub fn response_ready(&self, sync: u64) -> bool {
        self.inner.borrow().futures.contains_key(&sync)
    }

    /// Remove and return the response for `sync`.
    pub fn take_response(&self, sync: u64) -> Option<Response> {
        self.inner.borrow_mut().futures.remove(&sync)
    }

    /// Number of responses decoded and not yet taken.
    pub fn future_count(&self) -> usize {
        self.inner.borrow().futures.len()
    }

    /// Drop the pending response for `sync`, or arrange for it to be
    /// dropped on arrival. A timed-out request stays in flight and its
    /// late response would otherwise land in the pending map; this is the
    /// escape hatch for callers that treat a timeout as terminal.
    pub fn forget_sync(&self, sync: u64) {
        let mut i = self.inner.borrow_mut();
        if i.futures.remove(&sync).is_none() {
            i.forgotten.insert(sync);
        }
    }

    pub fn has_error(&self) -> bool {
        self.inner.borrow().error.is_some()
    }

    pub fn take_error(&self) -> Option<ConnectionError> {
        self.inner.borrow_mut().error.take()
    }

    /// Clear a recorded error so the connection can be used again.
    pub fn reset(&self) {
        self.inner.borrow_mut().error = None;
    }

    /// The greeting received on connect, if any.
    pub fn greeting(&self) -> Option<Greeting> {
        self.inner.borrow().greeting.clone()
    }

    /// Decode a response's result tuples. The response must have been
    /// produced by this connection; its data range points into this
    /// connection's input buffer.
    pub fn decode_data<T: Decode + Default>(&self, response: &Response) -> Result<Vec<T>> {
        let inner = self.inner.borrow();
        let Some((begin, _)) = &response.data else {
            return Ok(Vec::new());
        };
        let mut dec = Decoder::at(&inner.input, begin.pos());
        let mut tuples: Vec<T> = Vec::new();
        dec.decode(&mut tuples)?;
        Ok(tuples)
    }

    /// Zero-copy access to the input buffer, for decoding captured ranges
    /// with custom destinations.
    pub fn with_input<R>(&self, f: impl FnOnce(&Buffer) -> R) -> R {
        f(&self.inner.borrow().input)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Connection")
            .field("token", &inner.token)
            .field("futures", &inner.futures.len())
            .field("error", &inner.error)
            .finish()
    }
}
