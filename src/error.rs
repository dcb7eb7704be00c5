//! Unified error type.

use std::fmt;

/// The error type returned by tsu-middleware's fallible operations.
///
/// Request-level failures (404, 500, a handler that blew up) are expressed as
/// [`Fault`](crate::Fault) values and rendered by the error handler, not as
/// `Error`s. This type surfaces infrastructure failures: binding to a port,
/// encoding a body, or building the middleware set from bad configuration.
#[derive(Debug)]
pub enum Error {
    /// Socket I/O failed.
    Io(std::io::Error),
    /// A response body could not be serialised to JSON.
    Json(serde_json::Error),
    /// The snappy encoder rejected the body.
    Compress(snap::Error),
    /// A configured CORS header name is not a valid HTTP header name.
    InvalidHeader(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Json(e) => write!(f, "json: {e}"),
            Self::Compress(e) => write!(f, "compress: {e}"),
            Self::InvalidHeader(name) => write!(f, "invalid header name `{name}`"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Compress(e) => Some(e),
            Self::InvalidHeader(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<snap::Error> for Error {
    fn from(e: snap::Error) -> Self {
        Self::Compress(e)
    }
}
