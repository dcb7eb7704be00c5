//! # tsu-middleware
//!
//! The middleware every service behind a reverse proxy ends up writing:
//! consistent error responses, one access line per request, CORS, and
//! WebSocket lifecycle lines.
//!
//! ## The contract
//!
//! nginx handles TLS, rate limiting and slow clients. Your router handles
//! routing, and your auth layer handles auth. This crate does none of that.
//! It owns what happens *around* a request:
//!
//! - **Errors** become one [`Fault`] shape, rendered by
//!   [`ErrorNormalizer`](middleware::ErrorNormalizer): the real status, and a
//!   body that leaks nothing unless debug mode is on.
//! - **Access lines** are written when the response closes, whoever closed it,
//!   with the final status and duration.
//! - **CORS** headers go on every response; preflights are answered directly.
//! - **WebSocket** opens and closes are logged at a severity that matches the
//!   close code.
//!
//! Log lines go to an injected [`Logger`]. The default forwards to `tracing`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tsu_middleware::middleware::{Config, MiddlewareManager};
//! use tsu_middleware::{Fault, Reply, Request, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = MiddlewareManager::new(Config::new().cors_headers(["X-Request-Id"]))
//!         .expect("valid CORS headers");
//!
//!     Server::bind("0.0.0.0:3000")
//!         .serve(manager.pipeline(app))
//!         .await
//!         .unwrap();
//! }
//!
//! async fn app(req: Request) -> Result<Option<Reply>, Fault> {
//!     match req.url() {
//!         "/health" => Ok(Some(Reply::text("ok"))),
//!         "/boom" => Err(Fault::error("big boom")),
//!         _ => Ok(None), // falls through to the 404 stage
//!     }
//! }
//! ```

mod error;
mod fault;
mod handler;
mod logger;
mod pipeline;
mod request;
mod respond;
mod response;
mod server;

pub mod middleware;

pub use error::Error;
pub use fault::{Fault, FaultClass, HttpError, NOT_FOUND_NAME};
pub use handler::Handler;
pub use logger::{Logger, SharedLogger, TracingLogger};
pub use pipeline::Pipeline;
pub use request::Request;
pub use respond::{Compressed, Legacy};
pub use response::{Completion, ContentType, IntoReply, Reply, ReplyBuilder, RequestTiming, Response};
pub use server::Server;
