//! Readiness-based I/O core driving every registered connection.
//!
//! One `mio` poll multiplexes all streams. A stream is armed for read on
//! registration; write interest is added only while a vectored write comes
//! back `WouldBlock` and dropped again once the output buffer drains.
//! Reads are sized by asking the kernel how many bytes are pending
//! (`FIONREAD`), reserving exactly that much in the input buffer, reading
//! vectored into the reserved extents and trimming any over-reservation.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{self, IoSliceMut};
use std::rc::Rc;
use std::time::Duration;

use mio::{Events, Interest, Poll, Token};
use tracing::{debug, trace};

use crate::client::conn::{ConnImpl, Connection};
use crate::client::stream::Stream;

/// Poll granularity when the caller has no deadline.
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);
const EVENTS_MAX: usize = 128;
const IOVEC_MAX: usize = 32;

/// Tokens of connections with pending output, shared with the connections
/// themselves so that encoding a request schedules the send.
#[derive(Default)]
pub(crate) struct SendQueue {
    queue: Vec<Token>,
}

impl SendQueue {
    pub(crate) fn push(&mut self, token: Token) {
        self.queue.push(token);
    }

    fn take(&mut self) -> Vec<Token> {
        std::mem::take(&mut self.queue)
    }
}

pub(crate) struct Reactor {
    poll: Poll,
    events: Events,
    conns: HashMap<Token, Connection>,
    send_queue: Rc<RefCell<SendQueue>>,
    ready_to_decode: VecDeque<Token>,
    next_token: usize,
}

impl Reactor {
    pub(crate) fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENTS_MAX),
            conns: HashMap::new(),
            send_queue: Rc::new(RefCell::new(SendQueue::default())),
            ready_to_decode: VecDeque::new(),
            next_token: 0,
        })
    }

    /// Attach a stream to a connection and arm it for read.
    pub(crate) fn register(&mut self, conn: &Connection, mut stream: Stream) -> io::Result<Token> {
        let token = Token(self.next_token);
        self.next_token += 1;
        stream.register(self.poll.registry(), token, Interest::READABLE)?;
        {
            let i = &mut *conn.inner().borrow_mut();
            i.stream = Some(stream);
            i.token = Some(token);
            i.send_queue = Some(Rc::clone(&self.send_queue));
            if i.has_data_to_send() {
                i.mark_ready_to_send();
            }
        }
        self.conns.insert(token, conn.clone());
        trace!(?token, "registered connection");
        Ok(token)
    }

    /// Detach the connection's stream and forget it.
    pub(crate) fn close(&mut self, conn: &Connection) {
        let i = &mut *conn.inner().borrow_mut();
        if let Some(mut stream) = i.stream.take() {
            let _ = stream.deregister(self.poll.registry());
        }
        if let Some(token) = i.token.take() {
            self.conns.remove(&token);
            trace!(?token, "closed connection");
        }
        i.send_queue = None;
        i.in_send_queue = false;
        i.write_blocked = false;
    }

    pub(crate) fn connections(&self) -> Vec<Connection> {
        self.conns.values().cloned().collect()
    }

    pub(crate) fn pop_ready_to_decode(&mut self) -> Option<Connection> {
        while let Some(token) = self.ready_to_decode.pop_front() {
            if let Some(conn) = self.conns.get(&token) {
                return Some(conn.clone());
            }
        }
        None
    }

    /// One reactor round: flush pending sends, poll for readiness with
    /// `timeout` (default granularity when `None`), service readable and
    /// writable streams.
    pub(crate) fn wait(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let pending = self.send_queue.borrow_mut().take();
        for token in pending {
            let Some(conn) = self.conns.get(&token).cloned() else {
                continue;
            };
            conn.inner().borrow_mut().in_send_queue = false;
            self.try_send(&conn);
        }

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        let fired: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|e| (e.token(), e.is_readable(), e.is_writable()))
            .collect();
        for (token, readable, writable) in fired {
            let Some(conn) = self.conns.get(&token).cloned() else {
                continue;
            };
            if readable {
                trace!(?token, "socket is ready to read");
                self.try_recv(&conn);
            }
            if writable {
                trace!(?token, "socket is ready to write");
                self.try_send(&conn);
            }
        }
        Ok(())
    }

    /// Vectored write of the whole output buffer. On `WouldBlock` the
    /// stream is additionally armed for write; on full drain the interest
    /// falls back to read-only.
    fn try_send(&mut self, conn: &Connection) {
        let i = &mut *conn.inner().borrow_mut();
        let Some(token) = i.token else { return };
        loop {
            if !i.has_data_to_send() {
                if i.write_blocked {
                    i.write_blocked = false;
                    if let Some(stream) = i.stream.as_mut() {
                        let _ = stream.reregister(self.poll.registry(), token, Interest::READABLE);
                    }
                }
                return;
            }
            let ConnImpl { output, stream, .. } = &mut *i;
            let Some(stream) = stream.as_mut() else { return };
            let res = {
                let mut slices = Vec::with_capacity(IOVEC_MAX);
                let n = output.get_iov(output.begin_pos(), output.end_pos(), &mut slices, IOVEC_MAX);
                stream.write_vectored(&slices[..n])
            };
            match res {
                Ok(0) => {
                    self.fail(i, token, "Failed to send request: peer closed".to_string(), 0);
                    return;
                }
                Ok(sent) => {
                    trace!(?token, sent, "sent bytes");
                    i.output.drop_front(sent);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    i.write_blocked = true;
                    if let Some(stream) = i.stream.as_mut() {
                        let _ = stream.reregister(
                            self.poll.registry(),
                            token,
                            Interest::READABLE | Interest::WRITABLE,
                        );
                    }
                    return;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    let errno = e.raw_os_error().unwrap_or(0);
                    self.fail(i, token, format!("Failed to send request: {}", e), errno);
                    return;
                }
            }
        }
    }

    /// Drain the socket into the input buffer. The poll is edge-triggered,
    /// so reading continues until the kernel reports `WouldBlock`.
    fn try_recv(&mut self, conn: &Connection) {
        let i = &mut *conn.inner().borrow_mut();
        let Some(token) = i.token else { return };
        let mut total_read = 0usize;
        loop {
            let Some(stream_ref) = i.stream.as_ref() else { break };
            // Ask the kernel for the pending byte count; reserve one byte
            // anyway so that end-of-stream shows up as a zero-length read.
            let want = match stream_ref.available_bytes() {
                Ok(n) => n.max(1),
                Err(e) => {
                    let errno = e.raw_os_error().unwrap_or(0);
                    self.fail(i, token, format!("Failed to check socket: {}", e), errno);
                    return;
                }
            };
            let old_end = i.input.end_pos();
            i.input.advance_back(want);

            let mut filled = 0usize;
            let mut eof = false;
            let mut would_block = false;
            let mut io_err: Option<io::Error> = None;
            while filled < want {
                let ConnImpl { input, stream, .. } = &mut *i;
                let Some(stream) = stream.as_mut() else { break };
                let reserved_end = input.end_pos();
                let mut iovs: Vec<IoSliceMut<'_>> = Vec::with_capacity(IOVEC_MAX);
                let n = input.get_iov_mut(old_end.plus(filled), reserved_end, &mut iovs, IOVEC_MAX);
                match stream.read_vectored(&mut iovs[..n]) {
                    Ok(0) => {
                        eof = true;
                        break;
                    }
                    Ok(k) => filled += k,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        would_block = true;
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        io_err = Some(e);
                        break;
                    }
                }
            }
            // Trim the over-reservation before anything else looks at the
            // buffer.
            i.input.drop_back(want - filled);
            total_read += filled;

            if let Some(e) = io_err {
                let errno = e.raw_os_error().unwrap_or(0);
                self.fail(i, token, format!("Failed to receive response: {}", e), errno);
                break;
            }
            if eof {
                self.fail(i, token, "Connection closed by peer".to_string(), 0);
                break;
            }
            if would_block {
                break;
            }
        }
        if total_read > 0 {
            trace!(?token, total_read, "received bytes");
            self.ready_to_decode.push_back(token);
        }
    }

    fn fail(&mut self, i: &mut ConnImpl, token: Token, msg: String, errno: i32) {
        debug!(?token, %msg, "connection failed, closing");
        i.set_error(msg, errno);
        if let Some(mut stream) = i.stream.take() {
            let _ = stream.deregister(self.poll.registry());
        }
        i.token = None;
        i.send_queue = None;
        i.in_send_queue = false;
        i.write_blocked = false;
        self.conns.remove(&token);
        // Whatever already arrived is still decodable.
        self.ready_to_decode.push_back(token);
    }
}
