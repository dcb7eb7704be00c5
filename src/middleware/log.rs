use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use tracing::warn;

use crate::fault::Fault;
use crate::logger::{Logger, SharedLogger};
use crate::request::Request;
use crate::response::{Completion, Response};

use super::{Flow, Middleware};

/// Rendered in place of a client address nobody could determine.
const UNKNOWN_IP: &str = "-";

/// Emits one access line per request, when the response closes.
///
/// Installing the logger registers a completion hook on the response, so the
/// line is written no matter which stage ends up finishing the response: an
/// endpoint, the CORS preflight, or the error handler. The line carries the
/// final status and the time elapsed since [`SetStartTimestamp`] ran.
///
/// ```text
/// HTTP GET /users/42 client_ip=10.0.0.7 200 3ms
/// HTTP POST /users client_ip=10.0.0.7 400 1ms request_body={"name":""} response_body={}
/// ```
///
/// Statuses below 300 go to the info sink. Anything else goes to the error
/// sink, with the request body and the final response chunk attached.
///
/// [`SetStartTimestamp`]: super::SetStartTimestamp
#[derive(Clone)]
pub struct RequestLogger {
    logger: SharedLogger,
}

/// What the completion hook needs from the request, captured up front.
struct Entry {
    method: Method,
    url: String,
    client_ip: Option<String>,
    body: Bytes,
}

impl RequestLogger {
    pub fn new(logger: SharedLogger) -> Self {
        Self { logger }
    }

    /// Hooks the access line onto `res`. Call once, before anything downstream
    /// can end the response.
    pub fn install(&self, req: &Request, res: &mut Response) {
        let logger = Arc::clone(&self.logger);
        let entry = Entry {
            method: req.method().clone(),
            url: req.url().to_owned(),
            client_ip: req.client_ip(),
            body: req.body().clone(),
        };
        res.on_complete(move |done| entry.emit(logger.as_ref(), done));
    }
}

impl Middleware for RequestLogger {
    fn handle(&self, req: &Request, res: &mut Response) -> Result<Flow, Fault> {
        self.install(req, res);
        Ok(Flow::Next)
    }
}

impl Entry {
    fn emit(&self, logger: &dyn Logger, done: &Completion<'_>) {
        let millis = match done.timing.duration() {
            Some(elapsed) => elapsed.as_millis(),
            None => {
                warn!(url = %self.url, "request finished without a start timestamp");
                Duration::MAX.as_millis()
            }
        };
        let line = format!(
            "HTTP {} {} client_ip={} {} {}ms",
            self.method,
            self.url,
            self.client_ip.as_deref().unwrap_or(UNKNOWN_IP),
            done.status.as_u16(),
            millis,
        );

        if done.status.as_u16() < 300 {
            logger.info(&line);
        } else {
            logger.error(&format!(
                "{line} request_body={} response_body={}",
                body_snapshot(&self.body),
                String::from_utf8_lossy(done.chunk),
            ));
        }
    }
}

/// JSON rendering of a request body for the error line.
///
/// JSON is re-serialised compactly, an empty body is `null`, anything else is
/// quoted as a JSON string.
fn body_snapshot(body: &[u8]) -> String {
    if body.is_empty() {
        return "null".to_owned();
    }
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => value.to_string(),
        Err(_) => serde_json::Value::String(String::from_utf8_lossy(body).into_owned()).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use http::StatusCode;

    use super::*;
    use crate::logger::testing::Recorder;
    use crate::middleware::SetStartTimestamp;
    use crate::response::RequestTiming;

    fn post(body: &'static str) -> Request {
        Request::from(
            http::Request::post("/test/method")
                .body(Bytes::from_static(body.as_bytes()))
                .unwrap(),
        )
        .with_remote_addr("127.0.0.1:40000".parse().unwrap())
    }

    fn started(res: &mut Response, req: &Request) {
        SetStartTimestamp.handle(req, res).unwrap();
    }

    fn millis_of(line: &str) -> u128 {
        let token = line.split(' ').find(|t| t.ends_with("ms")).unwrap();
        token.trim_end_matches("ms").parse().unwrap()
    }

    #[test]
    fn nothing_is_logged_before_the_response_closes() {
        let recorder = Recorder::shared();
        let req = post("");
        let mut res = Response::new();
        started(&mut res, &req);
        RequestLogger::new(recorder.clone()).handle(&req, &mut res).unwrap();

        assert!(recorder.info_lines().is_empty());
        assert!(recorder.error_lines().is_empty());
    }

    #[test]
    fn dropped_response_is_never_logged() {
        let recorder = Recorder::shared();
        let req = post(r#"{"a":1}"#);
        let mut res = Response::new();
        started(&mut res, &req);
        RequestLogger::new(recorder.clone()).install(&req, &mut res);
        res.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        res.write(b"partial");

        drop(res);

        assert!(recorder.info_lines().is_empty());
        assert!(recorder.error_lines().is_empty());
    }

    #[test]
    fn successful_request_goes_to_info() {
        let recorder = Recorder::shared();
        let req = post(r#"{"request": "body"}"#);
        let mut res = Response::new();
        started(&mut res, &req);
        RequestLogger::new(recorder.clone()).install(&req, &mut res);

        res.end_with(r#"{"result": 1}"#);
        res.end_with("again");

        let info = recorder.info_lines();
        assert_eq!(info.len(), 1);
        assert!(info[0].starts_with("HTTP POST /test/method client_ip=127.0.0.1 200 "));
        assert!(info[0].ends_with("ms"));
        assert!(!info[0].contains("request_body"));
        assert!(recorder.error_lines().is_empty());
    }

    #[test]
    fn failed_request_goes_to_error_with_bodies() {
        let recorder = Recorder::shared();
        let req = post(r#"{"request": "body"}"#);
        let mut res = Response::new();
        started(&mut res, &req);
        RequestLogger::new(recorder.clone()).install(&req, &mut res);

        res.set_status(StatusCode::BAD_REQUEST);
        res.end_with(r#"{"result": 1}"#);

        let errors = recorder.error_lines();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("HTTP POST /test/method client_ip=127.0.0.1 400 "));
        assert!(errors[0].ends_with(r#"ms request_body={"request":"body"} response_body={"result": 1}"#));
        assert!(recorder.info_lines().is_empty());
    }

    #[test]
    fn duration_spans_start_to_close() {
        let recorder = Recorder::shared();
        let req = post("");
        let mut res = Response::new();
        let start = Instant::now() - Duration::from_millis(250);
        res.locals_mut().insert(RequestTiming::started(start));
        RequestLogger::new(recorder.clone()).install(&req, &mut res);

        res.end();

        let millis = millis_of(&recorder.info_lines()[0]);
        assert!(millis >= 250);
        assert!(millis <= start.elapsed().as_millis());
    }

    #[test]
    fn missing_start_fails_closed() {
        let recorder = Recorder::shared();
        let req = post("");
        let mut res = Response::new();
        RequestLogger::new(recorder.clone()).install(&req, &mut res);

        res.end();

        assert_eq!(millis_of(&recorder.info_lines()[0]), Duration::MAX.as_millis());
    }

    #[test]
    fn redirects_count_as_failures_and_empty_chunks_render_empty() {
        let recorder = Recorder::shared();
        let req = post("");
        let mut res = Response::new();
        started(&mut res, &req);
        RequestLogger::new(recorder.clone()).install(&req, &mut res);

        res.set_status(StatusCode::FOUND);
        res.end();

        let errors = recorder.error_lines();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains(" 302 "));
        assert!(errors[0].ends_with("request_body=null response_body="));
    }

    #[test]
    fn body_snapshots() {
        assert_eq!(body_snapshot(b""), "null");
        assert_eq!(body_snapshot(br#"{ "a" : [1, 2] }"#), r#"{"a":[1,2]}"#);
        assert_eq!(body_snapshot(b"name=alice"), r#""name=alice""#);
    }

    #[test]
    fn unknown_client_ip_is_a_dash() {
        let recorder = Recorder::shared();
        let req = Request::from(http::Request::get("/").body(Bytes::new()).unwrap());
        let mut res = Response::new();
        started(&mut res, &req);
        RequestLogger::new(recorder.clone()).install(&req, &mut res);
        res.end();

        assert!(recorder.info_lines()[0].starts_with("HTTP GET / client_ip=- 200 "));
    }
}
