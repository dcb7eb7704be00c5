//! Ordered middleware chain.
//!
//! A [`Pipeline`] is what a host server runs for every request: regular
//! stages and endpoints in registration order, then, if anything fails, the
//! error stages in registration order. Build it once at startup; pass it to
//! [`Server::serve`](crate::Server::serve).
//!
//! ```rust
//! use http::StatusCode;
//! use tsu_middleware::middleware::{Config, MiddlewareManager};
//! use tsu_middleware::{Fault, Reply, Request};
//!
//! async fn users(req: Request) -> Result<Option<Reply>, Fault> {
//!     match req.url() {
//!         "/users" => Ok(Some(Reply::json(r#"[{"id":1}]"#))),
//!         "/users/me" => Err(Fault::new(StatusCode::UNAUTHORIZED, "AuthError", "no session")),
//!         _ => Ok(None),
//!     }
//! }
//!
//! let manager = MiddlewareManager::new(Config::new()).unwrap();
//! let pipeline = manager.pipeline(users);
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::fault::Fault;
use crate::handler::{BoxedHandler, Handler, call_guarded};
use crate::middleware::{ErrorMiddleware, Flow, Middleware};
use crate::request::Request;
use crate::response::Response;

enum Stage {
    Middleware(Arc<dyn Middleware>),
    Endpoint(BoxedHandler),
}

/// The request chain. Each builder call returns `self` so registrations
/// chain naturally.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
    error_stages: Vec<Arc<dyn ErrorMiddleware>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a synchronous stage.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.stages.push(Stage::Middleware(Arc::new(middleware)));
        self
    }

    /// Appends an async endpoint. An endpoint that produces a reply finishes
    /// the request; one that declines (`None`) lets the chain continue.
    pub fn endpoint(mut self, handler: impl Handler) -> Self {
        self.stages.push(Stage::Endpoint(handler.into_boxed_handler()));
        self
    }

    /// Appends an error stage.
    pub fn on_error(self, handler: impl ErrorMiddleware) -> Self {
        self.on_error_shared(Arc::new(handler))
    }

    /// Appends an error stage the caller also holds a handle to.
    pub fn on_error_shared(mut self, handler: Arc<dyn ErrorMiddleware>) -> Self {
        self.error_stages.push(handler);
        self
    }

    /// Runs one request through the chain.
    ///
    /// The returned response is always closed: a chain that runs out of stages
    /// without finishing the response raises a not-found fault, and a fault no
    /// error stage renders leaves a bare response with the fault's status.
    pub async fn run(&self, req: Request) -> Response {
        let mut res = Response::new();

        if let Err(fault) = self.run_stages(&req, &mut res).await {
            self.fail(fault, &req, &mut res);
        }

        if !res.is_closed() {
            debug!(url = req.url(), "chain left the response open; closing it");
            res.end();
        }
        res
    }

    async fn run_stages(&self, req: &Request, res: &mut Response) -> Result<(), Fault> {
        for stage in &self.stages {
            match stage {
                Stage::Middleware(middleware) => {
                    if middleware.handle(req, res)? == Flow::Halt {
                        return Ok(());
                    }
                }
                Stage::Endpoint(handler) => {
                    if let Some(reply) = call_guarded(handler, req.clone()).await? {
                        res.send(reply);
                        return Ok(());
                    }
                }
            }
            if res.is_closed() {
                return Ok(());
            }
        }
        Err(Fault::not_found())
    }

    fn fail(&self, mut fault: Fault, req: &Request, res: &mut Response) {
        for stage in &self.error_stages {
            match stage.handle_error(fault, req, res) {
                Ok(()) => return,
                Err(forwarded) => fault = forwarded,
            }
        }

        debug!(%fault, "no error stage rendered the fault");
        if !res.headers_sent() {
            res.set_status(fault.status());
        }
        res.end();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use http::{Method, StatusCode};

    use super::*;
    use crate::response::Reply;

    fn request(method: Method, path: &str) -> Request {
        Request::from(http::Request::builder().method(method).uri(path).body(Bytes::new()).unwrap())
    }

    fn halt(_req: &Request, res: &mut Response) -> Result<Flow, Fault> {
        res.end_with("halted");
        Ok(Flow::Halt)
    }

    fn raise(_req: &Request, _res: &mut Response) -> Result<Flow, Fault> {
        Err(Fault::new(StatusCode::BAD_REQUEST, "BadInput", "nope"))
    }

    fn streams(_req: &Request, res: &mut Response) -> Result<Flow, Fault> {
        res.write(b"partial");
        Err(Fault::error("late"))
    }

    async fn hello(_req: Request) -> &'static str {
        "hello"
    }

    async fn decline(_req: Request) -> Option<Reply> {
        None
    }

    static ENDPOINT_CALLS: AtomicUsize = AtomicUsize::new(0);

    async fn counted(_req: Request) -> &'static str {
        ENDPOINT_CALLS.fetch_add(1, Ordering::SeqCst);
        "counted"
    }

    struct Render;

    impl ErrorMiddleware for Render {
        fn handle_error(&self, fault: Fault, _req: &Request, res: &mut Response) -> Result<(), Fault> {
            res.set_status(fault.status());
            res.end_with(fault.to_string());
            Ok(())
        }
    }

    struct Forward;

    impl ErrorMiddleware for Forward {
        fn handle_error(&self, fault: Fault, _req: &Request, _res: &mut Response) -> Result<(), Fault> {
            Err(fault)
        }
    }

    #[tokio::test]
    async fn endpoint_reply_is_sent() {
        let res = Pipeline::new().endpoint(hello).run(request(Method::GET, "/")).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), b"hello");
    }

    #[tokio::test]
    async fn halting_stage_skips_the_rest() {
        let before = ENDPOINT_CALLS.load(Ordering::SeqCst);
        let res = Pipeline::new().with(halt).endpoint(counted).run(request(Method::GET, "/")).await;
        assert_eq!(res.body(), b"halted");
        assert_eq!(ENDPOINT_CALLS.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn faults_reach_error_stages_in_order() {
        let res = Pipeline::new()
            .with(raise)
            .endpoint(hello)
            .on_error(Forward)
            .on_error(Render)
            .run(request(Method::POST, "/"))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.body(), b"BadInput: nope");
    }

    #[tokio::test]
    async fn exhausted_chain_is_not_found() {
        let res = Pipeline::new()
            .endpoint(decline)
            .on_error(Render)
            .run(request(Method::GET, "/nowhere"))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.body(), b"HttpNotFoundError: Not found");
    }

    #[tokio::test]
    async fn unrendered_fault_still_closes() {
        let res = Pipeline::new().with(raise).run(request(Method::GET, "/")).await;
        assert!(res.is_closed());
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(res.body().is_empty());
    }

    #[tokio::test]
    async fn fault_after_headers_keeps_what_was_sent() {
        let res = Pipeline::new().with(streams).on_error(Forward).run(request(Method::GET, "/")).await;
        assert!(res.is_closed());
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), b"partial");
    }
}
