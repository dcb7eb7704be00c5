//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns. This module ships the standard set:
//!
//! | Stage | Type | Job |
//! |---|---|---|
//! | timestamp | [`SetStartTimestamp`] | stores the request start time |
//! | log | [`RequestLogger`] | one access line per completed request |
//! | cors | [`CorsNegotiator`] | CORS headers, answers preflights |
//! | not found | [`NotFound`] | turns a route miss into a 404 fault |
//! | error | [`ErrorNormalizer`] | renders any fault as a response |
//! | websocket | [`WsLogger`] | one line per websocket open / close |
//!
//! [`MiddlewareManager`] builds all of them from one [`Config`].
//!
//! # Contracts
//!
//! A regular stage returns [`Flow::Next`] to pass the request on,
//! [`Flow::Halt`] once it has finished the response itself, or `Err(fault)`
//! to skip straight to the error stages. An error stage either handles the
//! fault (`Ok(())`) or forwards it (`Err(fault)`) to the next error stage.

mod cors;
mod error;
mod log;
mod manager;
mod timestamp;
mod ws;

pub use cors::{CorsNegotiator, CorsPolicy};
pub use error::{ErrorNormalizer, NotFound};
pub use log::RequestLogger;
pub use manager::{Config, MiddlewareManager};
pub use timestamp::SetStartTimestamp;
pub use ws::{WsConnection, WsLogger, close_code};

use crate::fault::Fault;
use crate::request::Request;
use crate::response::Response;

/// What a stage wants the chain to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the next stage.
    Next,
    /// The response is finished; run nothing downstream.
    Halt,
}

/// A synchronous stage run before (or instead of) the endpoint.
///
/// Plain functions work too:
///
/// ```rust
/// use tsu_middleware::{Fault, Request, Response};
/// use tsu_middleware::middleware::{Flow, Middleware};
/// use http::{HeaderName, HeaderValue};
///
/// fn powered_by(_req: &Request, res: &mut Response) -> Result<Flow, Fault> {
///     res.set_header(HeaderName::from_static("x-powered-by"), HeaderValue::from_static("tsu"));
///     Ok(Flow::Next)
/// }
///
/// fn assert_middleware(_: impl Middleware) {}
/// assert_middleware(powered_by);
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: &Request, res: &mut Response) -> Result<Flow, Fault>;
}

impl<F> Middleware for F
where
    F: Fn(&Request, &mut Response) -> Result<Flow, Fault> + Send + Sync + 'static,
{
    fn handle(&self, req: &Request, res: &mut Response) -> Result<Flow, Fault> {
        self(req, res)
    }
}

/// A stage that receives faults raised earlier in the chain.
pub trait ErrorMiddleware: Send + Sync + 'static {
    fn handle_error(&self, fault: Fault, req: &Request, res: &mut Response) -> Result<(), Fault>;
}
