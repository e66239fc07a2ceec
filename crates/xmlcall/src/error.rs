//! # Error Definitions

use std::fmt;

use xmlwire::Fault;

use crate::transport;

/// Ways a call can fail. Each failed call reports exactly one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Serializing a param or parsing the response failed.
    Wire(xmlwire::Error),
    /// The transport failed, or the server answered with a non-success status.
    Transport(transport::Error),
    /// The server answered with a well-formed fault.
    Fault(Fault),
    /// The call was driven out of order.
    Usage(String),
    /// The call was cancelled before it completed.
    Aborted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wire(e) => write!(f, "Wire error: {}", e),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Fault(fault) => write!(f, "Remote {}", fault),
            Self::Usage(msg) => write!(f, "Usage error: {}", msg),
            Self::Aborted => write!(f, "Call aborted"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Wire(e) => Some(e),
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<xmlwire::Error> for Error {
    fn from(e: xmlwire::Error) -> Self {
        Self::Wire(e)
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<Fault> for Error {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
