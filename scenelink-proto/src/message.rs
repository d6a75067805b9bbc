//! Protocol message types for sender↔listener communication.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Default TCP port of the scenelink listener.
pub const DEFAULT_PORT: u16 = 9999;

/// Default listener host (loopback).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Command parameters keyed by name.
pub type Params = BTreeMap<String, Value>;

/// A parameter or result value.
///
/// On the wire a value is a plain JSON bool, number, string, or an array
/// of exactly three numbers. Anything else decodes as
/// [`Value::Unsupported`] so that a bad parameter is rejected by the
/// handler's shape check rather than by the codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum Value {
    /// A boolean flag.
    Bool(bool),
    /// A floating-point number.
    Number(f64),
    /// A UTF-8 string.
    Text(String),
    /// A 3-tuple of numbers, used for positions.
    Vector([f64; 3]),
    /// Any other JSON value (null, object, array of another length).
    Unsupported(serde_json::Value),
}

/// The shape of a [`Value`], used for parameter validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValueKind {
    /// [`Value::Bool`].
    Bool,
    /// [`Value::Number`].
    Number,
    /// [`Value::Text`].
    Text,
    /// [`Value::Vector`].
    Vector,
    /// [`Value::Unsupported`].
    Unsupported,
}

impl Value {
    /// Returns the kind of this value.
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Number(_) => ValueKind::Number,
            Self::Text(_) => ValueKind::Text,
            Self::Vector(_) => ValueKind::Vector,
            Self::Unsupported(_) => ValueKind::Unsupported,
        }
    }

    /// Returns `false` if any number in this value is NaN or infinite.
    ///
    /// JSON has no encoding for those; `serde_json` writes them as `null`.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Number(n) => n.is_finite(),
            Self::Vector(v) => v.iter().all(|c| c.is_finite()),
            Self::Bool(_) | Self::Text(_) | Self::Unsupported(_) => true,
        }
    }

    /// Returns the boolean, if this is a [`Value::Bool`].
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the number, if this is a [`Value::Number`].
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string, if this is a [`Value::Text`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the components, if this is a [`Value::Vector`].
    pub const fn as_vector(&self) -> Option<[f64; 3]> {
        match self {
            Self::Vector(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Vector([x, y, z]) => write!(f, "({x}, {y}, {z})"),
            Self::Unsupported(v) => write!(f, "{v}"),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bool => "bool",
            Self::Number => "number",
            Self::Text => "string",
            Self::Vector => "vector",
            Self::Unsupported => "unsupported value",
        })
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<[f64; 3]> for Value {
    fn from(v: [f64; 3]) -> Self {
        Self::Vector(v)
    }
}

/// Request sent from sender to listener.
///
/// `timestamp` and `issuer` are provenance only. The listener logs them
/// and never uses them for ordering or authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Registry key of the command (e.g. `create_cube`).
    #[serde(rename = "command")]
    pub name: String,
    /// Command-specific parameters; may be empty.
    pub params: Params,
    /// Issue time as `YYYY-MM-DD HH:MM:SS`.
    #[serde(default)]
    pub timestamp: String,
    /// Name of whoever issued the command.
    #[serde(default, rename = "user")]
    pub issuer: String,
}

impl Command {
    /// Creates a command with no parameters and empty provenance.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Params::new(),
            timestamp: String::new(),
            issuer: String::new(),
        }
    }

    /// Adds (or replaces) one parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Replaces the whole parameter map.
    #[must_use]
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Sets the provenance metadata.
    #[must_use]
    pub fn issued(mut self, timestamp: impl Into<String>, issuer: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self.issuer = issuer.into();
        self
    }
}

/// Machine-readable category of an error [`Response`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorKind {
    /// The request payload could not be parsed.
    Decode,
    /// The command name is not registered.
    UnknownCommand,
    /// The parameters do not match the handler's declared shape.
    InvalidParams,
    /// The host application failed while executing the command.
    HandlerExecution,
    /// Any category this build does not know about.
    #[default]
    #[serde(other)]
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Decode => "decode error",
            Self::UnknownCommand => "unknown command",
            Self::InvalidParams => "invalid params",
            Self::HandlerExecution => "handler execution error",
            Self::Other => "error",
        })
    }
}

/// Response sent from listener to sender, exactly one per [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
#[allow(clippy::exhaustive_enums)]
pub enum Response {
    /// The command succeeded. `result` is `null` for commands with no
    /// meaningful return value.
    Ok {
        /// Handler return value.
        result: Option<Value>,
    },
    /// The command failed.
    Error {
        /// Error category.
        #[serde(default)]
        kind: ErrorKind,
        /// Human-readable description.
        message: String,
    },
}

impl Response {
    /// Builds a success response.
    pub const fn ok(result: Option<Value>) -> Self {
        Self::Ok { result }
    }

    /// Builds an error response.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Returns `true` for [`Response::Ok`].
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}
