use std::sync::Arc;

use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use http::{HeaderName, HeaderValue, Method, StatusCode};

use crate::error::Error;
use crate::fault::Fault;
use crate::request::Request;
use crate::response::Response;

use super::{Flow, Middleware};

/// Request headers every browser client is allowed to send.
const BASE_HEADERS: [&str; 5] = ["Origin", "X-Requested-With", "Content-Type", "Accept", "Authorization"];

const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, PATCH, OPTIONS";

/// The allow-headers list, fixed at startup.
///
/// Base headers come first, then the configured extras in the order given.
/// Names are compared case-insensitively; repeats are dropped.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_headers: Vec<String>,
    allow_headers_value: HeaderValue,
}

impl CorsPolicy {
    pub fn new<I, S>(extra_headers: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed_headers: Vec<String> = BASE_HEADERS.iter().map(|h| (*h).to_owned()).collect();
        for header in extra_headers {
            let header = header.as_ref().trim();
            if HeaderName::from_bytes(header.as_bytes()).is_err() {
                return Err(Error::InvalidHeader(header.to_owned()));
            }
            if !allowed_headers.iter().any(|known| known.eq_ignore_ascii_case(header)) {
                allowed_headers.push(header.to_owned());
            }
        }

        let allow_headers_value = HeaderValue::from_str(&allowed_headers.join(", "))
            .map_err(|_| Error::InvalidHeader(allowed_headers.join(", ")))?;
        Ok(Self { allowed_headers, allow_headers_value })
    }

    pub fn allowed_headers(&self) -> &[String] {
        &self.allowed_headers
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allowed_headers: BASE_HEADERS.iter().map(|h| (*h).to_owned()).collect(),
            allow_headers_value: HeaderValue::from_static(
                "Origin, X-Requested-With, Content-Type, Accept, Authorization",
            ),
        }
    }
}

/// Adds the CORS headers to every response and answers preflights.
///
/// An `OPTIONS` request is finished right here with `200 OK` and body `OK`;
/// nothing downstream sees it.
#[derive(Debug, Clone)]
pub struct CorsNegotiator {
    policy: Arc<CorsPolicy>,
}

impl CorsNegotiator {
    pub fn new(policy: Arc<CorsPolicy>) -> Self {
        Self { policy }
    }
}

impl Middleware for CorsNegotiator {
    fn handle(&self, req: &Request, res: &mut Response) -> Result<Flow, Fault> {
        res.set_header(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"))
            .set_header(ACCESS_CONTROL_ALLOW_HEADERS, self.policy.allow_headers_value.clone())
            .set_header(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));

        if req.method() == Method::OPTIONS {
            res.set_status(StatusCode::OK).end_with("OK");
            return Ok(Flow::Halt);
        }
        Ok(Flow::Next)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn request(method: Method) -> Request {
        Request::from(http::Request::builder().method(method).uri("/x").body(Bytes::new()).unwrap())
    }

    fn negotiator(extra: &[&str]) -> CorsNegotiator {
        CorsNegotiator::new(Arc::new(CorsPolicy::new(extra).unwrap()))
    }

    #[test]
    fn preflight_is_answered_here() {
        let mut res = Response::new();
        let flow = negotiator(&[]).handle(&request(Method::OPTIONS), &mut res).unwrap();

        assert_eq!(flow, Flow::Halt);
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), b"OK");
        assert!(res.is_closed());
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            res.headers()[ACCESS_CONTROL_ALLOW_HEADERS],
            "Origin, X-Requested-With, Content-Type, Accept, Authorization"
        );
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_METHODS], ALLOWED_METHODS);
    }

    #[test]
    fn extra_headers_follow_the_base_list() {
        let mut res = Response::new();
        negotiator(&["Custom-Cors-Header", "accept", "X-Trace"])
            .handle(&request(Method::OPTIONS), &mut res)
            .unwrap();

        assert_eq!(
            res.headers()[ACCESS_CONTROL_ALLOW_HEADERS],
            "Origin, X-Requested-With, Content-Type, Accept, Authorization, Custom-Cors-Header, X-Trace"
        );
    }

    #[test]
    fn other_methods_pass_through_untouched() {
        let mut res = Response::new();
        let flow = negotiator(&[]).handle(&request(Method::GET), &mut res).unwrap();

        assert_eq!(flow, Flow::Next);
        assert!(!res.headers_sent());
        assert!(res.body().is_empty());
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[test]
    fn invalid_header_names_are_rejected() {
        assert!(matches!(CorsPolicy::new(["Bad Header"]), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn default_matches_an_empty_extension() {
        let built = CorsPolicy::new(Vec::<String>::new()).unwrap();
        assert_eq!(built.allow_headers_value, CorsPolicy::default().allow_headers_value);
        assert_eq!(built.allowed_headers(), CorsPolicy::default().allowed_headers());
    }
}
