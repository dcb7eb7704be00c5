//! Alternate responders.
//!
//! Both are thin views over a live [`Response`], borrowed for one call chain:
//!
//! ```rust
//! # fn demo(res: &mut tsu_middleware::Response) -> Result<(), tsu_middleware::Error> {
//! use http::StatusCode;
//!
//! res.legacy().status(StatusCode::CREATED).json(&serde_json::json!({"result": 1}))?;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use serde::Serialize;

use crate::error::Error;
use crate::response::{ContentType, Response};

/// `status(code)` / `json(body)` responder for handlers written against the
/// classic `res.status(..).json(..)` shape.
pub struct Legacy<'a> {
    res: &'a mut Response,
}

impl Legacy<'_> {
    /// Sets the status code only.
    pub fn status(self, status: StatusCode) -> Self {
        self.res.set_status(status);
        self
    }

    /// Serialises `body`, sets `Content-Type: application/json` and a
    /// `Content-Length` matching the UTF-8 text, then closes the response with
    /// it.
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self, Error> {
        let text = serde_json::to_string(body)?;
        self.res
            .set_header(CONTENT_TYPE, HeaderValue::from_static(ContentType::Json.as_str()))
            .set_header(CONTENT_LENGTH, HeaderValue::from(text.len()));
        self.res.end_with(text);
        Ok(self)
    }

    /// Closes the response, if `json` did not already.
    pub fn end(self) {
        self.res.end();
    }
}

/// Responder that ships JSON as a raw snappy block.
///
/// Clients read the whole body, snappy-decompress it, then parse JSON.
pub struct Compressed<'a> {
    res: &'a mut Response,
}

impl Compressed<'_> {
    /// Serialises `body` to JSON, compresses it, and closes the response with
    /// the compressed bytes as `application/octet-stream`. `Content-Length` is
    /// the compressed size.
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<(), Error> {
        let raw = serde_json::to_vec(body)?;
        let packed = snap::raw::Encoder::new().compress_vec(&raw)?;
        self.res
            .set_header(CONTENT_TYPE, HeaderValue::from_static(ContentType::OctetStream.as_str()))
            .set_header(CONTENT_LENGTH, HeaderValue::from(packed.len()));
        self.res.end_with(Bytes::from(packed));
        Ok(())
    }
}

impl Response {
    pub fn legacy(&mut self) -> Legacy<'_> {
        Legacy { res: self }
    }

    pub fn compressed(&mut self) -> Compressed<'_> {
        Compressed { res: self }
    }
}
