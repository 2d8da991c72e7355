//! Per-request context.
//!
//! A [`Context`] is created fresh for every inbound request and owned by the
//! one flow that handles it. Nothing in it is shared with other requests, so
//! none of it is synchronised.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use http::header::HeaderMap;
use http::{Method, Uri};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::binding::QueryBinder;
use crate::error::{BoxError, Error};
use crate::multipart::{MultipartForm, UploadedFile};
use crate::response::ResponseWriter;

/// The request body stream as seen by handlers.
pub type Body = BoxBody<Bytes, BoxError>;

/// The per-request bag handed to every handler in the chain.
pub struct Context {
    head: http::request::Parts,
    body: Option<Body>,
    form: Option<MultipartForm>,
    params: HashMap<String, String>,
    writer: ResponseWriter,
    stopped: bool,
    scope: Scope,
    store: Store,
    silent: bool,
}

impl Context {
    pub(crate) fn new(req: http::Request<Body>, scope: Scope, silent: bool) -> Self {
        let (head, body) = req.into_parts();
        Self {
            head,
            body: Some(body),
            form: None,
            params: HashMap::new(),
            writer: ResponseWriter::new(),
            stopped: false,
            scope,
            store: Store::default(),
            silent,
        }
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub(crate) fn into_writer(self) -> ResponseWriter {
        self.writer
    }

    // ── Request ──────────────────────────────────────────────────────────────

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn path(&self) -> &str { self.head.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }

    /// Header lookup. Names are case-insensitive; non-UTF-8 values read as `None`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter, exactly as it appeared in the path.
    ///
    /// For a route `/users/:id`, `ctx.param("id")` on `/users/42` returns
    /// `Some("42")`. Values are not percent-decoded.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// First value of the query parameter `key`, percent-decoded.
    pub fn query(&self, key: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Every decoded query pair, in order. A malformed query string reads as empty.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.head
            .uri
            .query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default()
    }

    /// Starts a descriptor-driven binding of the query string.
    pub fn query_binder(&self) -> QueryBinder {
        QueryBinder::new(self.query_pairs())
    }

    /// Reads the whole request body.
    ///
    /// The body stream is consumed by the first call; later calls return an
    /// empty buffer.
    pub async fn body_bytes(&mut self) -> Result<Bytes, Error> {
        match self.body.take() {
            Some(body) => Ok(body.collect().await.map_err(Error::Body)?.to_bytes()),
            None => Ok(Bytes::new()),
        }
    }

    /// Reads the body and decodes it as JSON.
    pub async fn bind_json<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        let bytes = self.body_bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Parses the body as `multipart/form-data`.
    ///
    /// The form is parsed once and kept; later calls return the same form.
    pub async fn multipart(&mut self) -> Result<&MultipartForm, Error> {
        let form = match self.form.take() {
            Some(form) => form,
            None => {
                let content_type = self.header("content-type").unwrap_or_default().to_owned();
                let body = self.body_bytes().await?;
                MultipartForm::parse(&content_type, body).await?
            }
        };
        Ok(self.form.insert(form))
    }

    /// The first file uploaded under form field `field`.
    pub async fn form_file(&mut self, field: &str) -> Result<&UploadedFile, Error> {
        self.multipart()
            .await?
            .file(field)
            .ok_or_else(|| Error::MissingFile(field.to_owned()))
    }

    /// Decodes the JSON carried in query parameter `name`.
    pub fn bind_query_json<T: DeserializeOwned>(&self, name: &str) -> Result<T, Error> {
        match self.query(name) {
            Some(raw) if !raw.is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Err(Error::MissingParameter { kind: "query", name: name.to_owned() }),
        }
    }

    /// Percent-decodes path parameter `name` and parses it as JSON.
    pub fn bind_param_json<T: DeserializeOwned>(&self, name: &str) -> Result<T, Error> {
        match self.param(name) {
            Some(raw) if !raw.is_empty() => Ok(serde_json::from_str(&unescape(raw))?),
            _ => Err(Error::MissingParameter { kind: "path", name: name.to_owned() }),
        }
    }

    // ── Response ─────────────────────────────────────────────────────────────

    pub fn response(&self) -> &ResponseWriter { &self.writer }
    pub fn response_mut(&mut self) -> &mut ResponseWriter { &mut self.writer }

    // ── Flow control ─────────────────────────────────────────────────────────

    /// Prevents any further unit of the chain from starting.
    ///
    /// Whoever stops the chain is responsible for having written a response.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Whether the request's cancellation scope has fired: the transport
    /// cancelled it or the deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.scope.is_expired()
    }

    pub fn deadline(&self) -> Instant {
        self.scope.deadline
    }

    /// Narrows the deadline to `timeout` from now. Never extends it.
    pub fn set_timeout(&mut self, timeout: Duration) {
        if let Some(candidate) = Instant::now().checked_add(timeout) {
            self.scope.deadline = self.scope.deadline.min(candidate);
        }
    }

    /// Resolves once the cancellation scope fires.
    ///
    /// The chain only checks the scope between units; a long-running handler
    /// can race its work against this future to give up early.
    pub async fn cancelled(&self) {
        tokio::select! {
            () = self.scope.token.cancelled() => {}
            () = tokio::time::sleep_until(self.scope.deadline) => {}
        }
    }

    /// `true` when the application was configured to keep diagnostic output quiet.
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    // ── Store ────────────────────────────────────────────────────────────────

    /// Stores `value` under `key`, replacing whatever was there.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.store.insert(key.into(), value);
    }

    /// Reads the value under `key` if it exists and is a `T`.
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.store.get(key).ok()
    }

    /// Like [`get`](Self::get), but tells a missing key from a type mismatch.
    pub fn try_get<T: 'static>(&self, key: &str) -> Result<&T, StoreError> {
        self.store.get(key)
    }

    #[cfg(test)]
    pub(crate) fn for_test(method: &str, path: &str) -> Self {
        let req = http::Request::builder()
            .method(method)
            .uri(path)
            .body(Body::default())
            .unwrap();
        Self::new(req, Scope::new(&CancellationToken::new(), Duration::from_secs(30)), true)
    }

    #[cfg(test)]
    pub(crate) fn cancel(&self) {
        self.scope.token.cancel();
    }
}

// ── Cancellation scope ───────────────────────────────────────────────────────

// Roughly 30 years, the same horizon tokio uses for an unbounded sleep.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// The bounded cancellation scope of one request.
pub(crate) struct Scope {
    token: CancellationToken,
    deadline: Instant,
}

impl Scope {
    /// Derives a scope from the transport's token, firing at most `timeout`
    /// from now.
    /// A timeout too large to represent means no practical deadline.
    pub(crate) fn new(parent: &CancellationToken, timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE);
        Self { token: parent.child_token(), deadline }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn is_expired(&self) -> bool {
        self.token.is_cancelled() || Instant::now() >= self.deadline
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

/// Why a typed store read failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no value stored under `{0}`")]
    Missing(String),

    #[error("value stored under `{key}` is not a `{expected}`")]
    TypeMismatch { key: String, expected: &'static str },
}

/// String-keyed values of arbitrary type. `HashMap::new` does not allocate,
/// so a request that never stores anything pays nothing.
#[derive(Default)]
struct Store {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Store {
    fn insert<T: Send + Sync + 'static>(&mut self, key: String, value: T) {
        self.values.insert(key, Box::new(value));
    }

    fn get<T: 'static>(&self, key: &str) -> Result<&T, StoreError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| StoreError::Missing(key.to_owned()))?;
        value.downcast_ref::<T>().ok_or_else(|| StoreError::TypeMismatch {
            key: key.to_owned(),
            expected: type_name::<T>(),
        })
    }
}

/// Percent-decodes one component, `+` included.
///
/// Runs the raw text through the form decoder as the value of a single
/// pair; `&` is escaped first so it cannot split the pair.
fn unescape(raw: &str) -> String {
    let pair = format!("v={}", raw.replace('&', "%26"));
    serde_urlencoded::from_str::<Vec<(String, String)>>(&pair)
        .ok()
        .and_then(|mut pairs| pairs.pop())
        .map_or_else(|| raw.to_owned(), |(_, value)| value)
}
