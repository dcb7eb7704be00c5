//! Request-level faults.
//!
//! Everything that can go wrong while serving one request ends up as a
//! [`Fault`]: a handler returning `Err`, a panic inside a handler, a route
//! miss, or a plain string someone decided to "throw". The error handler only
//! ever sees this one shape, so "not found" renders exactly like any other
//! failure.
//!
//! ```rust
//! use tsu_middleware::Fault;
//! use http::StatusCode;
//!
//! let fault = Fault::new(StatusCode::UNAUTHORIZED, "AuthError", "not auth")
//!     .with_status_line("Auth needed");
//! assert_eq!(fault.status(), StatusCode::UNAUTHORIZED);
//! assert_eq!(fault.to_string(), "AuthError: not auth");
//!
//! let raw = Fault::from("big boom");
//! assert_eq!(raw.status(), StatusCode::INTERNAL_SERVER_ERROR);
//! assert_eq!(raw.to_string(), "big boom");
//! ```

use std::borrow::Cow;
use std::fmt;

use http::StatusCode;
use tracing::warn;

/// Name given to faults built from untyped values.
const GENERIC_NAME: &str = "Error";

/// Name of the fault produced for unmatched routes.
pub const NOT_FOUND_NAME: &str = "HttpNotFoundError";

/// Coarse classification of a fault, by status.
///
/// A fault raised after the response headers left the process is a third,
/// context-dependent class; the error handler detects that case from the
/// response itself (see [`ErrorNormalizer`](crate::middleware::ErrorNormalizer)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// 4xx, expected: not found, bad request, unauthorized.
    Client,
    /// Everything else, including the 500 default for untyped errors.
    Server,
}

/// Where the fault came from. Only changes how it prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Typed,
    Raw,
}

/// A normalized request failure.
///
/// Immutable once built: accessors only, and the `with_*` methods consume
/// `self`. Building a fault never touches the value it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    status: StatusCode,
    name: Cow<'static, str>,
    message: String,
    status_line: Option<String>,
    shape: Shape,
}

impl Fault {
    /// A typed fault with an explicit status.
    pub fn new(
        status: StatusCode,
        name: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            name: name.into(),
            message: message.into(),
            status_line: None,
            shape: Shape::Typed,
        }
    }

    /// A generic `Error` with no status of its own, so it resolves to 500.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_NAME, message)
    }

    /// A fault built from an arbitrary displayable value that is not an
    /// error at all. Resolves to 500 and prints as the bare value.
    pub fn raw(value: impl fmt::Display) -> Self {
        Self {
            shape: Shape::Raw,
            ..Self::error(value.to_string())
        }
    }

    /// The fault produced when no route matched: `404 HttpNotFoundError`.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, NOT_FOUND_NAME, "Not found")
    }

    /// Wraps a `std` error that carries no HTTP status. Resolves to 500,
    /// named after the error's type.
    pub fn internal<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            short_type_name::<E>(),
            err.to_string(),
        )
    }

    /// Wraps an error that knows its own HTTP status.
    pub fn from_http_error<E: HttpError>(err: &E) -> Self {
        let fault = Self::with_raw_status(err.status(), short_type_name::<E>(), err.to_string());
        match err.status_line() {
            Some(line) => fault.with_status_line(line),
            None => fault,
        }
    }

    /// Builds a typed fault from a status that has not been validated yet.
    ///
    /// Values outside `100..=999` are not HTTP statuses; they are coerced to
    /// 500 rather than passed through.
    pub fn with_raw_status(
        status: u16,
        name: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
    ) -> Self {
        let status = StatusCode::from_u16(status).unwrap_or_else(|_| {
            warn!(status, "fault carries an invalid HTTP status, using 500");
            StatusCode::INTERNAL_SERVER_ERROR
        });
        Self::new(status, name, message)
    }

    /// Sets the status line sent to clients in debug mode.
    pub fn with_status_line(mut self, line: impl Into<String>) -> Self {
        self.status_line = Some(line.into());
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn name(&self) -> &str { &self.name }
    pub fn message(&self) -> &str { &self.message }
    pub fn status_line(&self) -> Option<&str> { self.status_line.as_deref() }

    pub fn class(&self) -> FaultClass {
        if self.status.is_client_error() {
            FaultClass::Client
        } else {
            FaultClass::Server
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            Shape::Raw => f.write_str(&self.message),
            Shape::Typed if self.message.is_empty() => f.write_str(&self.name),
            Shape::Typed => write!(f, "{}: {}", self.name, self.message),
        }
    }
}

impl std::error::Error for Fault {}

/// An error type that carries its own HTTP status.
///
/// Implement this on application errors so the error handler picks up the
/// status (and optionally the status line) instead of defaulting to 500:
///
/// ```rust
/// use std::fmt;
/// use tsu_middleware::{Fault, HttpError};
///
/// #[derive(Debug)]
/// struct NotAuth;
///
/// impl fmt::Display for NotAuth {
///     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
///         f.write_str("not auth")
///     }
/// }
///
/// impl std::error::Error for NotAuth {}
///
/// impl HttpError for NotAuth {
///     fn status(&self) -> u16 { 401 }
///     fn status_line(&self) -> Option<&str> { Some("Auth needed") }
/// }
///
/// let fault = Fault::from_http_error(&NotAuth);
/// assert_eq!(fault.status().as_u16(), 401);
/// assert_eq!(fault.to_string(), "NotAuth: not auth");
/// ```
pub trait HttpError: std::error::Error {
    fn status(&self) -> u16;

    fn status_line(&self) -> Option<&str> {
        None
    }
}

impl From<&str> for Fault {
    fn from(value: &str) -> Self {
        Self::raw(value)
    }
}

impl From<String> for Fault {
    fn from(value: String) -> Self {
        Self::raw(value)
    }
}

impl From<std::io::Error> for Fault {
    fn from(e: std::io::Error) -> Self {
        Self::internal(&e)
    }
}

impl From<serde_json::Error> for Fault {
    fn from(e: serde_json::Error) -> Self {
        Self::internal(&e)
    }
}

impl From<crate::Error> for Fault {
    fn from(e: crate::Error) -> Self {
        Self::internal(&e)
    }
}

/// `std::io::Error` → `Error`, `my_app::NotAuth<T>` → `NotAuth`.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
