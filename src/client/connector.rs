//! Multi-connection fan-out: connect, wait, dispatch.
//!
//! One connector drives any number of connections on one thread. The wait
//! family is the only place the caller's control flow suspends; everything
//! else completes synchronously against in-memory state.
//!
//! A timeout is a soft failure: the request stays in flight and its
//! response, when it arrives, lands in the connection's pending map, where
//! it can still be taken later (or dropped with
//! [`Connection::forget_sync`]).

use std::net::ToSocketAddrs;
use std::time::Duration;

use mio::net::{TcpStream, UnixStream};
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::constant::GREETING_SIZE;
use crate::protocol::greeting::parse_greeting;

use super::conn::Connection;
use super::reactor::Reactor;
use super::stream::Stream;
use super::timer::Deadline;

pub struct Connector {
    reactor: Reactor,
}

impl Connector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            reactor: Reactor::new()?,
        })
    }

    /// Establish a connection: transport, greeting, and the auth round
    /// when credentials are configured. The whole sequence observes
    /// `opts.connect_timeout_ms`.
    #[instrument(skip_all, fields(host = %opts.host, port = opts.port))]
    pub fn connect(&mut self, opts: &Opts) -> Result<Connection> {
        let deadline = Deadline::after_ms(opts.connect_timeout_ms);
        let stream = self.open_stream(opts)?;
        let conn = Connection::new();
        self.reactor.register(&conn, stream)?;

        if let Err(e) = self.handshake(&conn, opts, &deadline) {
            self.close(&conn);
            return Err(e);
        }
        debug!("connection established");
        Ok(conn)
    }

    fn open_stream(&self, opts: &Opts) -> Result<Stream> {
        if let Some(path) = &opts.socket {
            let std_stream = std::os::unix::net::UnixStream::connect(path).map_err(|e| {
                Error::ConnectError {
                    addr: path.clone(),
                    reason: e.to_string(),
                }
            })?;
            std_stream.set_nonblocking(true)?;
            return Ok(Stream::unix(UnixStream::from_std(std_stream)));
        }

        let addr_str = format!("{}:{}", opts.host, opts.port);
        let addrs: Vec<_> = addr_str
            .to_socket_addrs()
            .map_err(|e| Error::ConnectError {
                addr: addr_str.clone(),
                reason: e.to_string(),
            })?
            .collect();
        let timeout = Duration::from_millis(opts.connect_timeout_ms.max(1));
        let mut last_err: Option<std::io::Error> = None;
        for addr in addrs {
            match std::net::TcpStream::connect_timeout(&addr, timeout) {
                Ok(std_stream) => {
                    std_stream.set_nodelay(opts.tcp_nodelay)?;
                    std_stream.set_nonblocking(true)?;
                    return Ok(Stream::tcp(TcpStream::from_std(std_stream)));
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(Error::ConnectError {
            addr: addr_str,
            reason: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no addresses resolved".to_string()),
        })
    }

    fn handshake(&mut self, conn: &Connection, opts: &Opts, deadline: &Deadline) -> Result<()> {
        // Greeting: exactly 128 bytes before anything else.
        loop {
            {
                let i = conn.inner().borrow();
                if let Some(err) = &i.error {
                    return Err(Error::ConnectionFailed(err.to_string()));
                }
                if i.input.has(i.end_decoded.pos(), GREETING_SIZE) {
                    break;
                }
            }
            if deadline.expired() {
                return Err(Error::ConnectError {
                    addr: opts.host.clone(),
                    reason: "timed out waiting for greeting".to_string(),
                });
            }
            self.reactor.wait(deadline.remaining())?;
        }
        {
            let i = &mut *conn.inner().borrow_mut();
            let mut raw = [0u8; GREETING_SIZE];
            i.input.read_bytes(i.end_decoded.pos(), &mut raw);
            i.end_decoded.advance(GREETING_SIZE);
            i.input.flush();
            let greeting = parse_greeting(&raw)?;
            debug!(version_id = greeting.version_id, "greeting received");
            i.greeting = Some(greeting);
        }

        // Authentication, when credentials are configured.
        if !opts.user.is_empty() {
            let sync = {
                let i = &mut *conn.inner().borrow_mut();
                let greeting = match &i.greeting {
                    Some(g) => g.clone(),
                    None => return Err(Error::GreetingError),
                };
                let password = opts.password.as_deref().unwrap_or("");
                let sync = i
                    .enc
                    .encode_auth(&mut i.output, &opts.user, password, &greeting);
                i.mark_ready_to_send();
                sync
            };
            self.wait_deadline(conn, sync, deadline)?;
            let mut response = conn
                .take_response(sync)
                .ok_or_else(|| Error::ConnectionFailed("auth response lost".to_string()))?;
            if !response.is_ok() {
                return Err(Error::AuthError(response.take_error()));
            }
            debug!(user = %opts.user, "authenticated");
        }
        Ok(())
    }

    /// Detach and forget a connection. Buffered state survives on the
    /// handle until the last clone drops.
    pub fn close(&mut self, conn: &Connection) {
        self.reactor.close(conn);
    }

    /// Wait until the response for `sync` is ready on `conn`.
    /// `timeout_ms` of zero waits indefinitely.
    #[instrument(skip_all, fields(sync))]
    pub fn wait(&mut self, conn: &Connection, sync: u64, timeout_ms: u64) -> Result<()> {
        let deadline = Deadline::after_ms(timeout_ms);
        self.wait_deadline(conn, sync, &deadline)
    }

    fn wait_deadline(&mut self, conn: &Connection, sync: u64, deadline: &Deadline) -> Result<()> {
        loop {
            conn.inner().borrow_mut().process_responses()?;
            if conn.response_ready(sync) {
                return Ok(());
            }
            if let Some(err) = &conn.inner().borrow().error {
                return Err(Error::ConnectionFailed(err.to_string()));
            }
            if let Some(e) = Self::socket_error(conn) {
                let msg = format!("Connection has been lost: {}", e);
                conn.inner()
                    .borrow_mut()
                    .set_error(msg.clone(), e.raw_os_error().unwrap_or(0));
                return Err(Error::ConnectionFailed(msg));
            }
            if deadline.expired() {
                debug!(sync, "wait timed out");
                return Err(Error::Timeout);
            }
            self.reactor.wait(deadline.remaining())?;
        }
    }

    /// Pending kernel-level socket error, the way the reactor's poll would
    /// eventually surface it.
    fn socket_error(conn: &Connection) -> Option<std::io::Error> {
        let i = conn.inner().borrow();
        let stream = i.stream.as_ref()?;
        stream.take_error().ok().flatten()
    }

    /// Wait until every listed sync has its response ready. One shared
    /// deadline covers the whole batch.
    #[instrument(skip_all)]
    pub fn wait_all(&mut self, conn: &Connection, syncs: &[u64], timeout_ms: u64) -> Result<()> {
        let deadline = Deadline::after_ms(timeout_ms);
        for sync in syncs {
            self.wait_deadline(conn, *sync, &deadline)?;
        }
        Ok(())
    }

    /// Wait until any registered connection has at least one response
    /// ready, and return it.
    #[instrument(skip_all)]
    pub fn wait_any(&mut self, timeout_ms: u64) -> Result<Connection> {
        let deadline = Deadline::after_ms(timeout_ms);
        loop {
            while let Some(conn) = self.reactor.pop_ready_to_decode() {
                conn.inner().borrow_mut().process_responses()?;
            }
            for conn in self.reactor.connections() {
                if conn.future_count() > 0 {
                    return Ok(conn);
                }
            }
            if deadline.expired() {
                return Err(Error::Timeout);
            }
            self.reactor.wait(deadline.remaining())?;
        }
    }
}
