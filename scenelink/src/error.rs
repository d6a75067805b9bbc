//! Error types for sender operations.

use std::io;

use scenelink_proto::ErrorKind;

/// Alias for `Result<T, scenelink::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`Sender`](crate::Sender) calls.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The listener could not be reached, or the connection failed
    /// mid-exchange (refused, reset, timed out).
    #[error("connection error: {0}")]
    Connection(#[source] io::Error),

    /// The listener's reply could not be parsed.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The listener answered with an error response.
    #[error("{message}")]
    Remote {
        /// Error category reported by the listener.
        kind: ErrorKind,
        /// Error description reported by the listener.
        message: String,
    },

    /// An argument failed local shape validation; nothing was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Returns `true` if the connection timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Connection(e)
                if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
        )
    }

    /// The listener-reported category, for [`Error::Remote`].
    pub const fn remote_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Remote { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
