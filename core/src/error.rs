//! Error types for the e-Boekhouden session client.
//!
//! # Design
//! `ValidationError` and `RemoteFault` are the two errors callers are
//! expected to match on: the first is raised locally before any request is
//! built, the second after a round trip whose response carried a non-empty
//! `ErrorMsg.LastErrorCode`. Everything that goes wrong below the SOAP result
//! (connection failures, HTTP status, SOAP `Fault` elements, unreadable XML)
//! lands in the remaining variants with enough raw detail for debugging.

use std::fmt;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by `Session` operations and the request/response codec.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied value failed its field rule. No request was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The remote service answered with an embedded error descriptor.
    #[error(transparent)]
    Fault(#[from] RemoteFault),

    /// The transport could not complete the round trip.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The server returned a non-200 status without a readable SOAP fault.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body carried a SOAP `Fault` element.
    #[error("SOAP fault {code}: {reason}")]
    Soap { code: String, reason: String },

    /// An envelope could not be written or read as XML.
    #[error("xml error: {0}")]
    Xml(String),

    /// The envelope was well-formed but lacked an expected element.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The session configuration is incomplete or unreadable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// The rule a field value broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    TooLong { max: usize, actual: usize },
    NotAnInteger(String),
    OutOfRange { min: i64, max: i64, value: i64 },
    InvalidDate(String),
    NotAllowed(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::TooLong { max, actual } => {
                write!(f, "may have a string length of maximal {max} characters, got {actual}")
            }
            Violation::NotAnInteger(value) => write!(f, "`{value}` is not an integer"),
            Violation::OutOfRange { min, max, value } => {
                write!(f, "{value} is outside {min}..={max}")
            }
            Violation::InvalidDate(value) => write!(f, "`{value}` is not a YYYY-MM-DD date"),
            Violation::NotAllowed(value) => write!(f, "`{value}` is not an allowed value"),
        }
    }
}

/// A value rejected by its field rule before serialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} {violation} (code {code})")]
pub struct ValidationError {
    pub field: &'static str,
    pub violation: Violation,
    pub code: u16,
}

/// An error descriptor returned inside an otherwise successful response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote fault {code}: {description}")]
pub struct RemoteFault {
    pub code: String,
    pub description: String,
    /// The raw envelope that triggered the fault, captured in debug mode.
    pub last_request: Option<String>,
}
