//! Error types for command dispatch.

use std::io;

use scenelink_proto::{ErrorKind, Response};

/// A failure raised by the host application while running a handler.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HostError {
    /// A validated parameter was missing or had the wrong kind.
    #[error("parameter `{0}` is missing or has the wrong type")]
    Param(&'static str),

    /// The modeling API rejected the requested geometry.
    #[error("invalid geometry: {0}")]
    Geometry(String),

    /// No text block with the given name exists.
    #[error("text block `{0}` not found")]
    TextNotFound(String),

    /// The scripting evaluator raised an error.
    #[error("script error: {0}")]
    Script(String),

    /// The handler produced a NaN or infinite number, which JSON cannot
    /// carry.
    #[error("result `{0}` is not a finite number")]
    NonFinite(String),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// An I/O error, e.g. while writing a render.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors produced while turning a request payload into a result.
///
/// Every variant maps onto an error [`Response`]; none of them ever
/// escapes the listener.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// The payload is not a well-formed command.
    #[error("malformed command payload: {0}")]
    Decode(String),

    /// The command name is not registered.
    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    /// The parameters do not match the handler's declared shape.
    #[error("invalid params for `{command}`: {}", describe(.missing, .extra, .mismatched))]
    InvalidParams {
        /// Command name.
        command: String,
        /// Required keys that were absent.
        missing: Vec<String>,
        /// Keys the handler does not declare.
        extra: Vec<String>,
        /// Present keys with the wrong value kind.
        mismatched: Vec<String>,
    },

    /// The underlying host call failed.
    #[error("`{command}` failed: {source}")]
    HandlerExecution {
        /// Command name.
        command: String,
        /// What the host application raised.
        source: HostError,
    },
}

impl DispatchError {
    /// Wire category of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) => ErrorKind::Decode,
            Self::UnknownCommand(_) => ErrorKind::UnknownCommand,
            Self::InvalidParams { .. } => ErrorKind::InvalidParams,
            Self::HandlerExecution { .. } => ErrorKind::HandlerExecution,
        }
    }

    /// Converts the error into the response sent back to the sender.
    pub fn to_response(&self) -> Response {
        Response::error(self.kind(), self.to_string())
    }
}

/// Joins the non-empty problem lists into one message.
fn describe(missing: &[String], extra: &[String], mismatched: &[String]) -> String {
    [("missing", missing), ("extra", extra), ("mismatched", mismatched)]
        .iter()
        .filter(|(_, keys)| !keys.is_empty())
        .map(|(label, keys)| format!("{label}: {}", keys.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}
