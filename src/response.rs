//! The response lifecycle, and the [`Reply`] values endpoints return.
//!
//! # One response, closed once
//!
//! A [`Response`] is a small state machine:
//!
//! ```text
//! Open ──write()──▶ HeadersSent ──end()──▶ Closing ──hooks done──▶ Closed
//!   └──────────────────end()─────────────────┘
//! ```
//!
//! Whoever finishes the response (an endpoint, the CORS preflight, the error
//! handler) calls [`Response::end`]. Only the first call counts: it stores the
//! final chunk, runs every hook registered with [`Response::on_complete`]
//! exactly once, and seals the response. Later calls are ignored. This is the
//! interception point the request logger hangs off, without wrapping or
//! replacing anything on the response.
//!
//! A response dropped without ever being closed (the client went away and
//! hyper cancelled the request future) fires no hooks.

use std::mem;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use http::header::CONTENT_TYPE;
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, StatusCode};
use tracing::warn;

use crate::fault::Fault;

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    HeadersSent,
    Closing,
    Closed,
}

/// Start and end of one request, kept in [`Response::locals`].
///
/// `started_at` is stored by the timestamp middleware; `completed_at` is
/// stamped by the response itself at the moment it closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestTiming {
    pub started_at: Option<Instant>,
    pub completed_at: Option<Instant>,
}

impl RequestTiming {
    pub fn started(at: Instant) -> Self {
        Self { started_at: Some(at), completed_at: None }
    }

    /// `completed_at - started_at`, if both ends are known.
    pub fn duration(&self) -> Option<Duration> {
        Some(self.completed_at?.saturating_duration_since(self.started_at?))
    }
}

/// What completion hooks get to see.
pub struct Completion<'a> {
    pub status: StatusCode,
    pub timing: RequestTiming,
    /// The bytes passed to the closing [`Response::end`] call, nothing else.
    pub chunk: &'a [u8],
}

type CompletionHook = Box<dyn FnOnce(&Completion<'_>) + Send>;

/// An outgoing response under construction.
pub struct Response {
    status: StatusCode,
    status_line: Option<String>,
    headers: HeaderMap,
    body: BytesMut,
    locals: Extensions,
    state: State,
    hooks: Vec<CompletionHook>,
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            status_line: None,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            locals: Extensions::new(),
            state: State::Open,
            hooks: Vec::new(),
        }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn status_line(&self) -> Option<&str> { self.status_line.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Per-request scratch state. Dies with the response.
    pub fn locals(&self) -> &Extensions { &self.locals }
    pub fn locals_mut(&mut self) -> &mut Extensions { &mut self.locals }

    /// `true` once anything has gone out: headers are frozen from here on.
    pub fn headers_sent(&self) -> bool { self.state != State::Open }
    pub fn is_closed(&self) -> bool { self.state == State::Closed }

    /// Sets the status code. Returns `self` so calls chain.
    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        if self.writable("status") {
            self.status = status;
        }
        self
    }

    /// Sets the reason phrase sent instead of the canonical one (HTTP/1 only).
    pub fn set_status_line(&mut self, line: impl Into<String>) -> &mut Self {
        if self.writable("status line") {
            self.status_line = Some(line.into());
        }
        self
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        if self.writable("header") {
            self.headers.insert(name, value);
        }
        self
    }

    /// Registers a hook to run once, when the response closes.
    pub fn on_complete<F>(&mut self, hook: F)
    where
        F: FnOnce(&Completion<'_>) + Send + 'static,
    {
        if self.is_closed() {
            warn!("on_complete registered after the response closed; hook dropped");
            return;
        }
        self.hooks.push(Box::new(hook));
    }

    /// Writes a body chunk without finishing the response. Freezes headers.
    pub fn write(&mut self, chunk: &[u8]) {
        match self.state {
            State::Open | State::HeadersSent => {
                self.state = State::HeadersSent;
                self.body.extend_from_slice(chunk);
            }
            State::Closing | State::Closed => warn!("write after end; chunk dropped"),
        }
    }

    /// Finishes the response with no final chunk. See [`Response::end_with`].
    pub fn end(&mut self) -> bool {
        self.end_with(Bytes::new())
    }

    /// Finishes the response with a final chunk.
    ///
    /// Returns `true` if this call closed the response, `false` if it was
    /// already closed (the chunk is then discarded and no hook runs).
    pub fn end_with(&mut self, chunk: impl Into<Bytes>) -> bool {
        if matches!(self.state, State::Closing | State::Closed) {
            return false;
        }
        // Flip the state before running hooks so a hook that calls back into
        // the response cannot close it a second time.
        self.state = State::Closing;

        let chunk = chunk.into();
        self.body.extend_from_slice(&chunk);

        let completed_at = Instant::now();
        let timing = match self.locals.get_mut::<RequestTiming>() {
            Some(timing) => {
                timing.completed_at = Some(completed_at);
                *timing
            }
            None => {
                let timing = RequestTiming { started_at: None, completed_at: Some(completed_at) };
                self.locals.insert(timing);
                timing
            }
        };

        let done = Completion { status: self.status, timing, chunk: &chunk };
        for hook in mem::take(&mut self.hooks) {
            hook(&done);
        }

        self.state = State::Closed;
        true
    }

    /// Writes a [`Reply`] into the response and closes it.
    pub fn send(&mut self, reply: Reply) -> bool {
        if !self.headers_sent() {
            self.status = reply.status;
            for (name, value) in &reply.headers {
                self.headers.insert(name.clone(), value.clone());
            }
        }
        self.end_with(reply.body)
    }

    /// Consumes the response, yielding the parts the server writes out.
    pub(crate) fn into_parts(self) -> (StatusCode, Option<String>, HeaderMap, Bytes) {
        (self.status, self.status_line, self.headers, self.body.freeze())
    }

    fn writable(&self, what: &str) -> bool {
        if self.headers_sent() {
            warn!(what, "cannot change the response after headers are sent");
            return false;
        }
        true
    }
}

impl Default for Response {
    fn default() -> Self { Self::new() }
}

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ReplyBuilder::bytes`].
#[derive(Debug, Clone, Copy)]
pub enum ContentType {
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Text,         // text/plain; charset=utf-8
}

impl ContentType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }

    fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// A complete response value, returned from an endpoint.
///
/// # Shortcuts (200 OK, no custom headers needed)
///
/// ```rust
/// use tsu_middleware::Reply;
/// use http::StatusCode;
///
/// Reply::json(br#"{"id":1}"#.to_vec());
/// Reply::text("hello");
/// Reply::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use tsu_middleware::{ContentType, Reply};
/// use http::{HeaderValue, StatusCode, header::LOCATION};
///
/// Reply::builder()
///     .status(StatusCode::CREATED)
///     .header(LOCATION, HeaderValue::from_static("/users/42"))
///     .json(br#"{"id":42}"#.to_vec());
///
/// Reply::builder().bytes(ContentType::Html, b"<p>ok</p>".to_vec());
/// ```
#[derive(Debug, Clone)]
pub struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    /// `200 OK`, `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().bytes(ContentType::Json, body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().bytes(ContentType::Text, body.into())
    }

    /// Reply with no body.
    pub fn status(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Bytes::new() }
    }

    pub fn builder() -> ReplyBuilder {
        ReplyBuilder { status: StatusCode::OK, headers: HeaderMap::new() }
    }
}

/// Fluent builder for [`Reply`]. Defaults to `200 OK`; terminated by a typed
/// body method.
pub struct ReplyBuilder {
    status: StatusCode,
    headers: HeaderMap,
}

impl ReplyBuilder {
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Reply {
        self.bytes(ContentType::Json, body)
    }

    /// Terminate with a typed body.
    pub fn bytes(mut self, content_type: ContentType, body: impl Into<Bytes>) -> Reply {
        self.headers.insert(CONTENT_TYPE, content_type.header_value());
        Reply { status: self.status, headers: self.headers, body: body.into() }
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Reply {
        Reply { status: self.status, headers: self.headers, body: Bytes::new() }
    }
}

// ── IntoReply ─────────────────────────────────────────────────────────────────

/// Conversion of an endpoint's return value into its outcome.
///
/// - `Ok(Some(reply))`: send it.
/// - `Ok(None)`: the endpoint declined the request (a router with no matching
///   route); the chain moves on to the next stage.
/// - `Err(fault)`: hand the fault to the error handlers.
///
/// Return `Result<T, E>` from an endpoint with any `E: Into<Fault>` and `?`
/// works as expected.
pub trait IntoReply {
    fn into_reply(self) -> Result<Option<Reply>, Fault>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Option<Reply>, Fault> { Ok(Some(self)) }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Option<Reply>, Fault> { Ok(Some(Reply::text(self))) }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Option<Reply>, Fault> { Ok(Some(Reply::text(self))) }
}

/// Return a [`StatusCode`] directly from an endpoint: `return StatusCode::NO_CONTENT`
impl IntoReply for StatusCode {
    fn into_reply(self) -> Result<Option<Reply>, Fault> { Ok(Some(Reply::status(self))) }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Result<Option<Reply>, Fault> {
        match self {
            Some(inner) => inner.into_reply(),
            None => Ok(None),
        }
    }
}

impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: Into<Fault>,
{
    fn into_reply(self) -> Result<Option<Reply>, Fault> {
        self.map_err(Into::into)?.into_reply()
    }
}
