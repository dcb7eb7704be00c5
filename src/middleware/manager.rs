use std::sync::Arc;

use crate::error::Error;
use crate::handler::Handler;
use crate::logger::{Logger, SharedLogger, TracingLogger};
use crate::pipeline::Pipeline;

use super::{
    CorsNegotiator, CorsPolicy, ErrorNormalizer, NotFound, RequestLogger, SetStartTimestamp,
    WsLogger,
};

/// Settings captured once when the middleware set is built.
///
/// ```rust
/// use tsu_middleware::middleware::{Config, MiddlewareManager};
///
/// let manager = MiddlewareManager::new(
///     Config::new().debug(true).cors_headers(["X-Request-Id"]),
/// ).unwrap();
/// ```
pub struct Config {
    logger: SharedLogger,
    debug: bool,
    cors_headers: Vec<String>,
}

impl Config {
    /// Logs through `tracing`, debug off, base CORS headers only.
    pub fn new() -> Self {
        Self { logger: Arc::new(TracingLogger), debug: false, cors_headers: Vec::new() }
    }

    pub fn logger(mut self, logger: impl Logger) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Like [`Config::logger`], for a sink the caller keeps a handle to.
    pub fn shared_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Expose fault messages and names to clients.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Extra request headers to allow, after the base CORS list.
    pub fn cors_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cors_headers.extend(headers.into_iter().map(Into::into));
        self
    }
}

impl Default for Config {
    fn default() -> Self { Self::new() }
}

/// Builds every middleware from one [`Config`] and hands them out.
///
/// Each accessor returns an independent stage, so the host chooses the
/// order. [`MiddlewareManager::pipeline`] assembles the standard one:
///
/// ```text
/// timestamp → log → cors → endpoints → not found ⇒ error
/// ```
///
/// The not-found stage and the error stage share one [`ErrorNormalizer`], so a
/// route miss renders exactly like any other fault.
pub struct MiddlewareManager {
    logger: SharedLogger,
    error_handler: Arc<ErrorNormalizer>,
    cors: CorsNegotiator,
}

impl MiddlewareManager {
    /// Fails only if a configured CORS header is not a valid header name.
    pub fn new(config: Config) -> Result<Self, Error> {
        let policy = CorsPolicy::new(&config.cors_headers)?;
        Ok(Self {
            error_handler: Arc::new(ErrorNormalizer::new(Arc::clone(&config.logger), config.debug)),
            cors: CorsNegotiator::new(Arc::new(policy)),
            logger: config.logger,
        })
    }

    pub fn set_start_timestamp(&self) -> SetStartTimestamp {
        SetStartTimestamp
    }

    pub fn log_request(&self) -> RequestLogger {
        RequestLogger::new(Arc::clone(&self.logger))
    }

    pub fn enable_cors(&self) -> CorsNegotiator {
        self.cors.clone()
    }

    pub fn catch_not_found(&self) -> NotFound {
        NotFound::new(Arc::clone(&self.error_handler))
    }

    pub fn error_handler(&self) -> Arc<ErrorNormalizer> {
        Arc::clone(&self.error_handler)
    }

    pub fn log_websocket(&self) -> WsLogger {
        WsLogger::new(Arc::clone(&self.logger))
    }

    /// The standard chain around `endpoint`.
    pub fn pipeline(&self, endpoint: impl Handler) -> Pipeline {
        Pipeline::new()
            .with(self.set_start_timestamp())
            .with(self.log_request())
            .with(self.enable_cors())
            .endpoint(endpoint)
            .with(self.catch_not_found())
            .on_error_shared(self.error_handler())
    }
}
