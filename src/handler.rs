//! Endpoint trait and type erasure.
//!
//! # How async endpoints are stored
//!
//! A pipeline holds endpoints of *different* types in one `Vec`, so they go
//! behind a trait object (`dyn ErasedHandler`) with a single uniform call:
//!
//! ```text
//! async fn create(req: Request) -> Result<Reply, Fault> { … }  ← user writes this
//!        ↓ pipeline.endpoint(create)
//! create.into_boxed_handler()                               ← Handler blanket impl
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req)  at request time                        ← one vtable dispatch
//!        ↓
//! Box::pin(async { create(req).await.into_reply() })        ← BoxFuture
//! ```
//!
//! # Failures inside endpoints
//!
//! An endpoint fails by returning `Err`, which becomes a [`Fault`]. A panic is
//! a failure too: [`call_guarded`] runs the endpoint future on its own task so
//! the panic is caught there and forwarded to the error handlers instead of
//! tearing down the connection. The task is tied to the caller: when hyper
//! drops the request future (client gone), the endpoint task is aborted too.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::error;

use crate::fault::Fault;
use crate::request::Request;
use crate::response::{IntoReply, Reply};

// ── Internal types ────────────────────────────────────────────────────────────

/// What an endpoint produced; see [`IntoReply`].
pub(crate) type Outcome = Result<Option<Reply>, Fault>;

/// A heap-allocated, type-erased future resolving to an [`Outcome`].
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid endpoint.
///
/// Satisfied automatically by any `async fn` with the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoReply
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_reply() })
    }
}

// ── Panic guard ───────────────────────────────────────────────────────────────

/// Aborts the wrapped task when dropped. A no-op once the task has finished.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs an endpoint, turning a panic into a `500` fault.
///
/// The panic payload is used as the fault message when it is a string, which
/// covers `panic!("...")` and `.expect("...")`.
pub(crate) async fn call_guarded(handler: &BoxedHandler, req: Request) -> Outcome {
    let mut task = AbortOnDrop(tokio::spawn(handler.call(req)));
    match (&mut task.0).await {
        Ok(outcome) => outcome,
        Err(join) if join.is_panic() => {
            let payload = join.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "endpoint panicked".to_owned());
            error!(%message, "endpoint panicked");
            Err(Fault::error(message))
        }
        Err(join) => Err(Fault::error(join.to_string())),
    }
}
