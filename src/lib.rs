//! A high-performance Tarantool IPROTO client.
//!
//! Three tightly coupled cores:
//!
//! * a [segmented zero-copy buffer](Buffer) over a slab pool, with
//!   position-tracking [cursors](Cursor) that survive structural mutation;
//! * a [rule-driven MessagePack codec](msgpack) layered on the buffer,
//!   statically dispatched with no intermediate tree;
//! * a [multi-connection dispatcher](client) muxing many logical
//!   connections onto one readiness-polling event loop.
//!
//! The crate is single-threaded by design: one [`Connector`] drives its
//! connections cooperatively, and only the wait operations suspend.
//!
//! ```no_run
//! use zero_tarantool::{Connector, Opts};
//!
//! # fn main() -> zero_tarantool::Result<()> {
//! let mut connector = Connector::new()?;
//! let conn = connector.connect(&Opts::try_from("tarantool://localhost:3301")?)?;
//!
//! let replace = conn.replace(512, &(666u64, "111", 1.01f64));
//! let select = conn.select(512, 0, &(666u64,));
//! connector.wait_all(&conn, &[replace, select], 1000)?;
//!
//! let response = conn.take_response(select).expect("response is ready");
//! let tuples: Vec<(u64, String, f64)> = conn.decode_data(&response)?;
//! # Ok(())
//! # }
//! ```

mod buffer;
pub mod client;
pub mod error;
pub mod msgpack;
mod opts;
pub mod protocol;
pub mod slab;

pub use buffer::{Buffer, Cursor, LightCursor};
pub use client::{Connection, ConnectionError, Connector};
pub use error::{DecodeError, Error, Result};
pub use opts::Opts;

#[cfg(test)]
mod buffer_test;
#[cfg(test)]
mod opts_test;
#[cfg(test)]
mod slab_test;
