use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{Method, StatusCode};
use tsu_middleware::middleware::{Config, MiddlewareManager, WsConnection};
use tsu_middleware::{Fault, Logger, Reply, Request};

#[derive(Default)]
struct Lines {
    info: Mutex<Vec<String>>,
    error: Mutex<Vec<String>>,
}

impl Lines {
    fn info(&self) -> Vec<String> {
        self.info.lock().unwrap().clone()
    }

    fn error(&self) -> Vec<String> {
        self.error.lock().unwrap().clone()
    }
}

impl Logger for Lines {
    fn info(&self, line: &str) {
        self.info.lock().unwrap().push(line.to_owned());
    }

    fn error(&self, line: &str) {
        self.error.lock().unwrap().push(line.to_owned());
    }
}

fn manager(debug: bool) -> (Arc<Lines>, MiddlewareManager) {
    let lines = Arc::new(Lines::default());
    let config = Config::new().shared_logger(lines.clone()).debug(debug);
    (lines, MiddlewareManager::new(config).unwrap())
}

fn request(method: Method, path: &str, body: &'static str) -> Request {
    Request::from(
        http::Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap(),
    )
    .with_remote_addr("127.0.0.1:41000".parse().unwrap())
}

static APP_CALLS: AtomicUsize = AtomicUsize::new(0);

async fn app(req: Request) -> Result<Option<Reply>, Fault> {
    APP_CALLS.fetch_add(1, Ordering::SeqCst);
    match req.url() {
        "/ok" => Ok(Some(Reply::json(r#"{"result":1}"#))),
        "/boom" => Err(Fault::error("big boom")),
        "/panic" => panic!("handler exploded"),
        _ => Ok(None),
    }
}

#[tokio::test]
async fn unmatched_route_is_a_quiet_404() {
    let (lines, manager) = manager(false);

    let res = manager.pipeline(app).run(request(Method::GET, "/nope", "")).await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.body(), b"{}");
    assert_eq!(res.status_line(), None);

    let errors = lines.error();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0], "HttpNotFoundError: Not found");
    assert_eq!(errors.iter().filter(|l| l.contains(" 404 ")).count(), 1);
    assert!(errors[1].starts_with("HTTP GET /nope client_ip=127.0.0.1 404 "));
    assert!(errors[1].ends_with("request_body=null response_body={}"));
    assert!(lines.info().is_empty());
}

#[tokio::test]
async fn failing_handler_in_debug_mode() {
    let (lines, manager) = manager(true);

    let res = manager
        .pipeline(app)
        .run(request(Method::POST, "/boom", r#"{"a":1}"#))
        .await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body(), br#"{"error":"big boom"}"#);
    assert_eq!(res.status_line(), Some("Error"));

    let errors = lines.error();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0], "Error: big boom");
    assert!(errors[1].starts_with("HTTP POST /boom client_ip=127.0.0.1 500 "));
    assert!(errors[1].ends_with(r#"request_body={"a":1} response_body={"error":"big boom"}"#));
}

#[tokio::test]
async fn panicking_handler_renders_a_500() {
    let (lines, manager) = manager(false);

    let res = manager.pipeline(app).run(request(Method::GET, "/panic", "")).await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body(), b"{}");
    assert_eq!(lines.error()[0], "Error: handler exploded");
}

#[tokio::test]
async fn successful_request_logs_one_info_line() {
    let (lines, manager) = manager(false);

    let res = manager.pipeline(app).run(request(Method::GET, "/ok", "")).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    let info = lines.info();
    assert_eq!(info.len(), 1);
    assert!(info[0].starts_with("HTTP GET /ok client_ip=127.0.0.1 200 "));
    assert!(info[0].ends_with("ms"));
    assert!(lines.error().is_empty());
}

#[tokio::test]
async fn preflight_never_reaches_the_app() {
    let (lines, manager) = manager(false);
    let before = APP_CALLS.load(Ordering::SeqCst);

    let res = manager.pipeline(app).run(request(Method::OPTIONS, "/ok", "")).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.body(), b"OK");
    assert_eq!(APP_CALLS.load(Ordering::SeqCst), before);
    assert_eq!(lines.info().len(), 1);
    assert!(lines.info()[0].starts_with("HTTP OPTIONS /ok client_ip=127.0.0.1 200 "));
}

#[tokio::test]
async fn extra_cors_headers_reach_the_response() {
    let lines = Arc::new(Lines::default());
    let manager = MiddlewareManager::new(
        Config::new().shared_logger(lines).cors_headers(["Custom-Cors-Header"]),
    )
    .unwrap();

    let res = manager.pipeline(app).run(request(Method::GET, "/ok", "")).await;

    assert_eq!(
        res.headers()["access-control-allow-headers"],
        "Origin, X-Requested-With, Content-Type, Accept, Authorization, Custom-Cors-Header"
    );
    assert_eq!(res.headers()["access-control-allow-methods"], "GET, POST, PUT, DELETE, PATCH, OPTIONS");
}

#[test]
fn websocket_open_then_abnormal_close() {
    let (lines, manager) = manager(false);
    let ws = manager.log_websocket();
    let conn = WsConnection::new(&request(Method::GET, "/subscribe/new", ""));

    ws.log_event(&conn, None, None);
    ws.log_event(&conn, Some(1006), Some("no close frame"));

    assert_eq!(lines.info(), ["WS GET /subscribe/new client_ip=127.0.0.1"]);
    assert_eq!(
        lines.error(),
        ["WS GET /subscribe/new client_ip=127.0.0.1 close_code=1006 reason=no close frame"]
    );
}
