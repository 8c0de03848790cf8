use thiserror::Error;

pub use color_eyre::eyre::eyre;

use crate::protocol::response::ErrorStack;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Server error: {0}")]
    ServerError(ErrorStack),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Bad config error: {0}")]
    BadConfigError(String),

    #[error("Failed to connect to {addr}: {reason}")]
    ConnectError { addr: String, reason: String },

    #[error("Failed to parse server greeting")]
    GreetingError,

    #[error("Authentication rejected: {0}")]
    AuthError(ErrorStack),

    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    #[error("Wait timed out")]
    Timeout,

    #[error("Connection has failed: {0}")]
    ConnectionFailed(String),

    #[error("A bug in zero-tarantool: {0}")]
    LibraryBug(color_eyre::Report),
}

/// Statuses of the MessagePack decoder.
///
/// `NeedMore` is retryable: the decoder restores its read position to the
/// start of the incomplete object before returning it. The other variants
/// are terminal for the current object or frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("need more input")]
    NeedMore,

    #[error("wrong type: expected one of {expected:?}, got {got:?}")]
    WrongType {
        expected: crate::msgpack::Family,
        got: crate::msgpack::Family,
    },

    #[error("broken msgpack")]
    BrokenMsgpack,

    #[error("max nesting depth reached")]
    MaxDepthReached,

    #[error("aborted by user")]
    AbortedByUser,
}

impl Error {
    /// Errors after which the connection cannot be used without `reset()`.
    pub fn is_conn_broken(&self) -> bool {
        matches!(
            self,
            Error::IoError(_)
                | Error::ConnectionFailed(_)
                | Error::DecodeError(DecodeError::BrokenMsgpack)
        )
    }

    pub fn from_debug(err: impl std::fmt::Debug) -> Self {
        Self::LibraryBug(color_eyre::eyre::eyre!(format!("{:#?}", err)))
    }
}
