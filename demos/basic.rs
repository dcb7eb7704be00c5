//! Minimal tsu-middleware example: the standard chain around a tiny app.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3000/users               # 400, error line with bodies
//!   curl http://localhost:3000/boom                        # 500, debug body
//!   curl http://localhost:3000/nope                        # 404
//!   curl -X OPTIONS http://localhost:3000/users            # preflight, never reaches the app

use http::header::LOCATION;
use http::{HeaderValue, StatusCode};
use tsu_middleware::middleware::{Config, MiddlewareManager};
use tsu_middleware::{Fault, Reply, Request, Server};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let manager = MiddlewareManager::new(Config::new().debug(true).cors_headers(["X-Request-Id"]))
        .expect("valid CORS headers");

    Server::bind("0.0.0.0:3000")
        .serve(manager.pipeline(app))
        .await
        .expect("server error");
}

async fn app(req: Request) -> Result<Option<Reply>, Fault> {
    let path = req.url().split('?').next().unwrap_or_default();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    match (req.method().as_str(), segments.as_slice()) {
        ("GET", ["users", id]) => Ok(Some(Reply::json(format!(r#"{{"id":"{id}","name":"alice"}}"#)))),
        ("POST", ["users"]) => create_user(&req).map(Some),
        (_, ["boom"]) => Err(Fault::error("big boom")),
        _ => Ok(None),
    }
}

fn create_user(req: &Request) -> Result<Reply, Fault> {
    if req.body().is_empty() {
        return Err(Fault::new(StatusCode::BAD_REQUEST, "ValidationError", "empty body"));
    }
    Ok(Reply::builder()
        .status(StatusCode::CREATED)
        .header(LOCATION, HeaderValue::from_static("/users/99"))
        .json(r#"{"id":"99","name":"new_user"}"#))
}
