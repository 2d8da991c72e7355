//! Response-state tracking and response helpers.
//!
//! Handlers do not return responses. They write into the request's
//! [`ResponseWriter`], which remembers whether anything has been committed
//! and which status went out first. Collaborators use that state to decide
//! whether a fresh status line is still possible, e.g. an error handler that
//! only answers `500` when nothing was written yet.
//!
//! Commit rules, mirroring a head already sent on the wire:
//!
//! - the first [`write_header`](ResponseWriter::write_header) latches the
//!   status; later calls are accepted and ignored;
//! - the first [`write`](ResponseWriter::write) without a status commits an
//!   implicit `200 OK`;
//! - headers can change only until the response is committed;
//! - there is no rollback.

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http_body_util::Full;
use serde::Serialize;
use tracing::debug;

use crate::context::Context;
use crate::error::Error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`Context::bytes`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    FormData,     // application/x-www-form-urlencoded
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }

    fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// The output sink of one request.
///
/// The body is buffered and handed to the transport once the chain returns,
/// so writes themselves cannot fail.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Commits `status`. Only the first call takes effect.
    pub fn write_header(&mut self, status: StatusCode) {
        match self.status {
            None => self.status = Some(status),
            Some(committed) => {
                debug!(%committed, attempted = %status, "superfluous write_header ignored");
            }
        }
    }

    /// Appends `bytes` to the body, committing `200 OK` if no status was set.
    /// Returns the number of bytes written.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(bytes);
        bytes.len()
    }

    /// Sets a response header. Returns `false`, changing nothing, once the
    /// response has been committed.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> bool {
        if self.is_written() {
            debug!(header = %name, "header set after commit ignored");
            return false;
        }
        self.headers.insert(name, value);
        true
    }

    /// Whether a status or any body byte has been committed.
    pub fn is_written(&self) -> bool {
        self.status.is_some()
    }

    /// The committed status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// An untouched writer becomes `200 OK` with an empty body.
    pub(crate) fn into_response(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body.freeze()));
        *res.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *res.headers_mut() = self.headers;
        res
    }
}

// ── Context helpers ───────────────────────────────────────────────────────────

/// Writing shortcuts. Each sets the content type, commits the status and
/// appends the body, in that order.
impl Context {
    /// Commits `status` with no body.
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.response_mut().write_header(status);
        self
    }

    /// Writes a typed body. Use this for XML, CSV, binary, SSE, etc.
    pub fn bytes(&mut self, status: StatusCode, content_type: ContentType, body: &[u8]) {
        let writer = self.response_mut();
        writer.set_header(CONTENT_TYPE, content_type.header_value());
        writer.write_header(status);
        writer.write(body);
    }

    /// Writes a `text/plain` body.
    pub fn send(&mut self, status: StatusCode, text: impl AsRef<str>) {
        self.bytes(status, ContentType::Text, text.as_ref().as_bytes());
    }

    /// Writes a `text/html` body.
    pub fn html(&mut self, status: StatusCode, html: impl AsRef<str>) {
        self.bytes(status, ContentType::Html, html.as_ref().as_bytes());
    }

    /// Serializes `value` and writes it as `application/json`.
    ///
    /// Nothing is written when serialization fails.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) -> Result<(), Error> {
        let body = serde_json::to_vec(value)?;
        self.bytes(status, ContentType::Json, &body);
        Ok(())
    }

    /// `200 OK` with a JSON body.
    pub fn ok<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        self.json(StatusCode::OK, value)
    }

    /// `201 Created` with a JSON body.
    pub fn created<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        self.json(StatusCode::CREATED, value)
    }

    /// `204 No Content`.
    pub fn no_content(&mut self) {
        self.response_mut().write_header(StatusCode::NO_CONTENT);
    }

    pub fn bad_request(&mut self, message: &str) {
        self.error(StatusCode::BAD_REQUEST, message);
    }

    pub fn unauthorized(&mut self, message: &str) {
        self.error(StatusCode::UNAUTHORIZED, message);
    }

    pub fn forbidden(&mut self, message: &str) {
        self.error(StatusCode::FORBIDDEN, message);
    }

    pub fn not_found(&mut self, message: &str) {
        self.error(StatusCode::NOT_FOUND, message);
    }

    pub fn internal_server_error(&mut self, message: &str) {
        self.error(StatusCode::INTERNAL_SERVER_ERROR, message);
    }

    /// Writes `{"error": message}`.
    pub fn error(&mut self, status: StatusCode, message: &str) {
        let body = serde_json::json!({ "error": message }).to_string();
        self.bytes(status, ContentType::Json, body.as_bytes());
    }
}
