//! Incoming HTTP request type.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method};

/// Proxy headers that may carry the real client address, most trusted first.
///
/// `x-forwarded-for` is a comma-separated chain; only its first entry (the
/// original client) is considered.
const CLIENT_IP_HEADERS: [&str; 7] = [
    "x-client-ip",
    "x-forwarded-for",
    "cf-connecting-ip",
    "fastly-client-ip",
    "true-client-ip",
    "x-real-ip",
    "x-cluster-client-ip",
];

/// An incoming HTTP request with its body fully buffered.
///
/// Middlewares never mutate the request; per-request scratch state lives on
/// the [`Response`](crate::Response). Cloning is one atomic increment, which is
/// what lets the same request be handed to an async endpoint by value while
/// the pipeline keeps its own handle for the error path.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

struct Inner {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    pub fn new(parts: http::request::Parts, body: Bytes) -> Self {
        let url = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_owned(), |pq| pq.as_str().to_owned());
        Self {
            inner: Arc::new(Inner {
                method: parts.method,
                url,
                headers: parts.headers,
                body,
                remote_addr: None,
            }),
        }
    }

    /// Attaches the socket peer address. Call before the request is shared.
    pub fn with_remote_addr(self, addr: SocketAddr) -> Self {
        let inner = Arc::try_unwrap(self.inner).unwrap_or_else(|shared| Inner {
            method: shared.method.clone(),
            url: shared.url.clone(),
            headers: shared.headers.clone(),
            body: shared.body.clone(),
            remote_addr: shared.remote_addr,
        });
        Self { inner: Arc::new(Inner { remote_addr: Some(addr), ..inner }) }
    }

    pub fn method(&self) -> &Method { &self.inner.method }
    pub fn headers(&self) -> &HeaderMap { &self.inner.headers }
    pub fn body(&self) -> &Bytes { &self.inner.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.inner.remote_addr }

    /// The URL as the client sent it: path plus query string.
    pub fn url(&self) -> &str { &self.inner.url }

    /// Case-insensitive header lookup. Non-UTF-8 values are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Best guess at the originating client address.
    ///
    /// Behind a reverse proxy the socket peer is the proxy, so the usual
    /// forwarding headers are consulted first. Only values that parse as an IP
    /// address (optionally with a port) are accepted; anything else falls
    /// through to the next header and finally to the socket peer.
    pub fn client_ip(&self) -> Option<String> {
        CLIENT_IP_HEADERS
            .iter()
            .filter_map(|name| self.header(name))
            .find_map(|value| {
                let first = value.split(',').next().unwrap_or_default();
                parse_ip(first.trim())
            })
            .or_else(|| self.inner.remote_addr.map(|addr| addr.ip()))
            .map(|ip| ip.to_string())
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts, body)
    }
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}
