use std::io;

use thiserror::Error;

use crate::protocol::response::ServerError;

pub type Result<T> = core::result::Result<T, Error>;

/// Client-side error taxonomy.
///
/// Transport and protocol errors are sticky: once one is recorded on a
/// connection, every later submit or wait on that connection fails fast with
/// the stored error. Server errors travel inside a normal `Response` as an
/// error stack and never appear here.
///
/// The enum is `Clone` (io errors are flattened to kind + errno + message) so
/// the connection can keep the original in its error slot while handing
/// copies to every waiter.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("IO error: {msg}")]
    Io {
        kind: io::ErrorKind,
        errno: Option<i32>,
        msg: String,
    },

    #[error("Failed to resolve address: {0}")]
    Dns(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),

    #[error("Bad config error: {0}")]
    BadConfig(String),

    #[error("Malformed MsgPack in incoming frame")]
    BadMsgpack,

    #[error("Frame length {0} exceeds the input high-water mark")]
    FrameTooLarge(u64),

    #[error("Reply sync {0} does not match any in-flight request")]
    SyncMismatch(u64),

    #[error("Unexpected frame: {0}")]
    UnexpectedFrame(&'static str),

    #[error("Request id space exhausted")]
    RidOverflow,

    #[error("Connection is not established")]
    NotConnected,

    #[error("Connection closed by user")]
    Closed,

    #[error("Output buffer is over the high-water mark")]
    WouldBlock,

    #[error("Timeout")]
    Timeout,

    #[error("Server error: {0}")]
    Server(ServerError),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io {
            kind: err.kind(),
            errno: err.raw_os_error(),
            msg: err.to_string(),
        }
    }
}

impl Error {
    /// OS errno captured from the transport, or 0 when the error did not come
    /// from a syscall.
    pub fn saved_errno(&self) -> i32 {
        match self {
            Error::Io { errno, .. } => errno.unwrap_or(0),
            _ => 0,
        }
    }

    /// True for errors that must tear the connection down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io { .. }
                | Error::TlsHandshake(_)
                | Error::BadMsgpack
                | Error::FrameTooLarge(_)
                | Error::SyncMismatch(_)
                | Error::UnexpectedFrame(_)
                | Error::RidOverflow
        )
    }
}
