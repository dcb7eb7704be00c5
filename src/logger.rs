//! Log sinks.
//!
//! Every middleware that writes access or error lines receives its sink
//! through its constructor. There is no global logger: the default,
//! [`TracingLogger`], simply forwards each line to a `tracing` event, so the
//! application's subscriber decides where lines end up.

use std::sync::Arc;

use tracing::{error, info};

/// Capability set consumed by the middlewares: one line at a time, two
/// severities.
pub trait Logger: Send + Sync + 'static {
    fn info(&self, line: &str);
    fn error(&self, line: &str);
}

/// A shared, type-erased sink, cloned into every middleware that logs.
pub type SharedLogger = Arc<dyn Logger>;

/// Forwards lines to `tracing` under the `tsu_middleware::access` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, line: &str) {
        info!(target: "tsu_middleware::access", "{line}");
    }

    fn error(&self, line: &str) {
        error!(target: "tsu_middleware::access", "{line}");
    }
}
