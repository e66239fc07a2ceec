//! # Error Definitions
//!
//! Every way the codec can refuse a value or a document.

use std::fmt;

/// Codec failures, on both the serializing and the parsing side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The value has no wire representation (non-finite double, oversized host integer, ...).
    UnsupportedValueType(String),
    /// Date text did not match the ISO-8601 pattern.
    MalformedDate(String),
    /// The parser met a tag with no transition from its current state.
    UnexpectedTag { state: &'static str, tag: String },
    /// Scalar text could not be converted to its declared type.
    InvalidScalar { kind: &'static str, text: String },
    /// The tokenizer rejected the byte stream.
    Xml(String),
    /// The document was well-formed but not a usable response.
    Malformed(String),
    /// The nested depth of the values exceeded the safety limit.
    RecursionLimitExceeded,
    /// The API was driven out of order (push after end, feed after failure).
    Usage(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedValueType(kind) => write!(f, "Unsupported value type: {}", kind),
            Self::MalformedDate(text) => write!(f, "Malformed ISO-8601 date: {:?}", text),
            Self::UnexpectedTag { state, tag } => {
                write!(f, "Unexpected tag <{}> in state {}", tag, state)
            }
            Self::InvalidScalar { kind, text } => write!(f, "Invalid {} value: {:?}", kind, text),
            Self::Xml(msg) => write!(f, "XML error: {}", msg),
            Self::Malformed(msg) => write!(f, "Malformed response: {}", msg),
            Self::RecursionLimitExceeded => write!(f, "Value nesting exceeds the recursion limit"),
            Self::Usage(msg) => write!(f, "Usage error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl serde::ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self::UnsupportedValueType(msg.to_string())
    }
}

/// A specialized Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A fault reported by the remote peer instead of a result.
///
/// These are distinct from `Error`; a fault is a well-formed answer saying the
/// *remote* method failed, whereas `Error` means the codec failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i64,
    pub message: String,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault {}: {}", self.code, self.message)
    }
}
