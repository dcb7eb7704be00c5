use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::fault::Fault;
use crate::logger::SharedLogger;
use crate::request::Request;
use crate::response::Response;

use super::{ErrorMiddleware, Flow, Middleware};

const HEADERS_SENT_PREFIX: &str = "[headers sent] ";

/// Renders faults as responses. The last stage of every chain.
///
/// Every fault is written to the error sink, in full, whatever the mode. What
/// the client sees depends on the debug flag:
///
/// | | body | status line |
/// |---|---|---|
/// | debug | `{"error": message}` | fault's status line, else its name |
/// | default | `{}` | canonical |
///
/// Once the response headers are out the fault can no longer be rendered:
/// it is logged with a `[headers sent]` prefix and forwarded to the next
/// error stage untouched.
pub struct ErrorNormalizer {
    logger: SharedLogger,
    debug: bool,
}

impl ErrorNormalizer {
    pub fn new(logger: SharedLogger, debug: bool) -> Self {
        Self { logger, debug }
    }

    /// Logs `fault` and renders it into `res`.
    ///
    /// Returns the fault back as `Err` when it must be forwarded because the
    /// headers were already sent. Call at most once per request.
    pub fn handle(&self, fault: Fault, _req: &Request, res: &mut Response) -> Result<(), Fault> {
        if res.headers_sent() {
            self.logger.error(&format!("{HEADERS_SENT_PREFIX}{fault}"));
            debug!(status = %fault.status(), "fault raised after headers were sent; forwarding");
            return Err(fault);
        }
        self.logger.error(&fault.to_string());

        res.set_status(fault.status());
        if self.debug {
            res.set_status_line(fault.status_line().unwrap_or(fault.name()));
        }
        let body = if self.debug {
            json!({ "error": fault.message() })
        } else {
            Value::Object(Map::new())
        };

        // Serialising a `Value` cannot fail; close bare if it somehow does.
        let rendered = res.legacy().json(&body).map(|legacy| legacy.end());
        if rendered.is_err() {
            res.end();
        }
        Ok(())
    }
}

impl ErrorMiddleware for ErrorNormalizer {
    fn handle_error(&self, fault: Fault, req: &Request, res: &mut Response) -> Result<(), Fault> {
        self.handle(fault, req, res)
    }
}

/// Turns "nothing handled this request" into a `404 HttpNotFoundError` fault.
///
/// Placed after the endpoints, it is reached only when every endpoint
/// declined. As a stage it raises the fault into the error chain; with no
/// chain around, [`NotFound::render`] hands it straight to the shared
/// [`ErrorNormalizer`]. Either way a miss renders like any other fault.
#[derive(Clone)]
pub struct NotFound {
    normalizer: Arc<ErrorNormalizer>,
}

impl NotFound {
    pub fn new(normalizer: Arc<ErrorNormalizer>) -> Self {
        Self { normalizer }
    }

    /// The synchronous fallback: render the 404 directly.
    pub fn render(&self, req: &Request, res: &mut Response) {
        if let Err(fault) = self.normalizer.handle(Fault::not_found(), req, res) {
            debug!(%fault, "not-found fault raised after headers were sent; dropped");
        }
    }
}

impl Middleware for NotFound {
    fn handle(&self, _req: &Request, _res: &mut Response) -> Result<Flow, Fault> {
        Err(Fault::not_found())
    }
}
