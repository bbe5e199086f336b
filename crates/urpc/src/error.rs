//! # Error Definitions
//!
//! Two disjoint taxonomies.
//!
//! - `ErrorCode` travels on the wire inside `ERROR` messages.
//! - `Error` is returned synchronously from local API calls.
//!
//! Protocol failures reach a local caller only through `From<ErrorCode> for Error`.

use crate::transport::TransportError;

/// Protocol error codes carried by `ERROR` messages.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The inbound signature differs from the registered one.
    SigIncorrect = 0x20,
    /// No function is registered under the requested name.
    Nonexist = 0x21,
    /// Unknown message kind or protocol version.
    NoSupport = 0x22,
    /// The message is structurally impossible or could not be buffered.
    BrokenMsg = 0x24,
    /// The handler faulted.
    Exception = 0x25,
}

impl ErrorCode {
    /// Returns the code for a given byte, or `None` if unknown.
    pub const fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x20 => Some(ErrorCode::SigIncorrect),
            0x21 => Some(ErrorCode::Nonexist),
            0x22 => Some(ErrorCode::NoSupport),
            0x24 => Some(ErrorCode::BrokenMsg),
            0x25 => Some(ErrorCode::Exception),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::SigIncorrect => write!(f, "incorrect function signature"),
            ErrorCode::Nonexist => write!(f, "no such function"),
            ErrorCode::NoSupport => write!(f, "operation not supported"),
            ErrorCode::BrokenMsg => write!(f, "broken message"),
            ErrorCode::Exception => write!(f, "function raised an exception"),
        }
    }
}

/// Local failures of the channel API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Buffer or channel precondition/resource failure.
    Local(wio::Error),
    /// A protocol failure observed locally (e.g. lookup of an unknown function).
    Protocol(ErrorCode),
    /// The send hook refused the bytes.
    Transport(TransportError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(e) => write!(f, "Local error: {}", e),
            Self::Protocol(code) => write!(f, "Protocol error: {}", code),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<wio::Error> for Error {
    fn from(e: wio::Error) -> Self {
        Self::Local(e)
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Self::Protocol(code)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// A specialized Result type for channel operations.
pub type Result<T> = std::result::Result<T, Error>;
