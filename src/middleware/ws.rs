//! WebSocket lifecycle lines.
//!
//! One line when a connection opens (or its upgrade fails), one when it
//! closes:
//!
//! ```text
//! WS GET /subscribe/new client_ip=10.0.0.7
//! WS GET /subscribe/not_exist 404 client_ip=10.0.0.7
//! WS GET /subscribe/new client_ip=10.0.0.7 close_code=1006 reason=no close frame
//! ```
//!
//! Close codes are telemetry, not faults: nothing here raises, retries or
//! touches the connection.

use http::{Method, StatusCode};

use crate::logger::SharedLogger;
use crate::request::Request;

/// Close codes that mean the connection ended the way it should.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const NO_STATUS: u16 = 1005;

    pub(crate) fn is_graceful(code: u16) -> bool {
        matches!(code, NORMAL | GOING_AWAY | NO_STATUS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Severity {
    Info,
    Error,
}

/// The connection as the logger sees it.
#[derive(Debug, Clone)]
pub struct WsConnection {
    method: Method,
    url: String,
    status: Option<StatusCode>,
    client_ip: Option<String>,
}

impl WsConnection {
    pub fn new(req: &Request) -> Self {
        Self {
            method: req.method().clone(),
            url: req.url().to_owned(),
            status: None,
            client_ip: req.client_ip(),
        }
    }

    /// Records the status the upgrade was answered with.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }
}

/// Classifies and writes WebSocket lifecycle events.
#[derive(Clone)]
pub struct WsLogger {
    logger: SharedLogger,
}

impl WsLogger {
    pub fn new(logger: SharedLogger) -> Self {
        Self { logger }
    }

    /// Logs an open event (`code` absent) or a close event.
    pub fn log_event(&self, conn: &WsConnection, code: Option<u16>, reason: Option<&str>) {
        let line = format_event(conn, code, reason);
        match classify(conn, code) {
            Severity::Info => self.logger.info(&line),
            Severity::Error => self.logger.error(&line),
        }
    }
}

/// Open events are errors when the connection carries a non-2xx status.
/// Close events are errors unless the code is one of the graceful ones.
pub(crate) fn classify(conn: &WsConnection, code: Option<u16>) -> Severity {
    let ok = match code {
        None => conn.status.is_none_or(|s| s.is_success()),
        Some(code) => close_code::is_graceful(code),
    };
    if ok { Severity::Info } else { Severity::Error }
}

pub(crate) fn format_event(conn: &WsConnection, code: Option<u16>, reason: Option<&str>) -> String {
    let mut line = format!("WS {} {}", conn.method, conn.url);
    if let Some(status) = conn.status {
        line.push_str(&format!(" {}", status.as_u16()));
    }
    line.push_str(&format!(" client_ip={}", conn.client_ip.as_deref().unwrap_or("-")));
    if let Some(code) = code {
        line.push_str(&format!(" close_code={code}"));
        if let Some(reason) = reason.filter(|r| !r.is_empty()) {
            line.push_str(&format!(" reason={reason}"));
        }
    }
    line
}
