//! The application: route table, global middleware and dispatch.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body as HttpBody;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chain::{self, Next};
use crate::context::{Body, Context, Scope};
use crate::error::BoxError;
use crate::handler::{BoxFuture, BoxedHandler, Handler, boxed};
use crate::response::ContentType;
use crate::router::Router;

/// Application settings, fixed at construction.
#[derive(Clone, Debug)]
pub struct Config {
    /// Upper bound on a request's lifetime, measured from dispatch start.
    pub timeout: Duration,
    /// Suppresses diagnostic output such as recovered-panic logs.
    pub silent: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), silent: false }
    }
}

/// The application.
///
/// Build it once at startup; every builder method returns `self` so
/// registrations chain naturally. Hand it to [`Server::serve`] or call
/// [`App::handle`] directly.
///
/// ```rust
/// use tern::{App, from_fn, middleware::Logger};
///
/// let app = App::new()
///     .use_middleware(Logger)
///     .get("/users/:id", from_fn(|ctx, _next| Box::pin(async move {
///         let id = ctx.param("id").unwrap_or_default().to_owned();
///         ctx.send(http::StatusCode::OK, id);
///     })));
/// ```
///
/// [`Server::serve`]: crate::Server::serve
pub struct App {
    router: Router,
    middleware: Vec<BoxedHandler>,
    not_found: Option<BoxedHandler>,
    config: Config,
}

impl App {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self { router: Router::new(), middleware: Vec::new(), not_found: None, config }
    }

    /// Sets the per-request timeout (default 30 s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Silences diagnostic output such as recovered-panic logs.
    pub fn silent(mut self, silent: bool) -> Self {
        self.config.silent = silent;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Appends a global middleware. Middleware runs in registration order
    /// ahead of the matched route handler.
    pub fn use_middleware(mut self, middleware: impl Handler) -> Self {
        self.middleware.push(boxed(middleware));
        self
    }

    /// Replaces the handler run when no route matches. It runs on its own,
    /// outside the global middleware, with a continuation that does nothing.
    pub fn not_found(mut self, handler: impl Handler) -> Self {
        self.not_found = Some(boxed(handler));
        self
    }

    /// Registers a handler for a method + pattern pair.
    ///
    /// Segments starting with `:` are parameters; `ctx.param("id")` reads
    /// them. Earlier registrations take precedence.
    pub fn on(mut self, method: Method, pattern: &str, handler: impl Handler) -> Self {
        self.router.add(method, pattern, boxed(handler));
        self
    }

    pub fn get(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, pattern, handler)
    }

    pub fn patch(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, pattern, handler)
    }

    pub fn options(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::OPTIONS, pattern, handler)
    }

    pub fn head(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::HEAD, pattern, handler)
    }

    /// Registers routes and middleware under a common path prefix.
    ///
    /// ```rust
    /// use tern::{App, from_fn};
    ///
    /// let app = App::new().group("/api", |api| {
    ///     api.use_middleware(from_fn(|ctx, next| Box::pin(async move {
    ///             ctx.response_mut().set_header(
    ///                 http::header::CACHE_CONTROL,
    ///                 http::HeaderValue::from_static("no-store"),
    ///             );
    ///             next.run(ctx).await;
    ///         })))
    ///         .get("/status", from_fn(|ctx, _next| Box::pin(async move {
    ///             ctx.send(http::StatusCode::OK, "up");
    ///         })))
    /// });
    /// ```
    pub fn group(self, prefix: &str, build: impl FnOnce(Group) -> Group) -> Self {
        build(Group { prefix: prefix.to_owned(), app: self }).app
    }

    pub(crate) fn route_count(&self) -> usize {
        self.router.len()
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    /// Dispatches one request and produces its response.
    ///
    /// If the request extensions carry a [`CancellationToken`], the request's
    /// cancellation scope is derived from it; the server puts one there per
    /// connection.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: HttpBody<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let parent = req
            .extensions()
            .get::<CancellationToken>()
            .cloned()
            .unwrap_or_else(CancellationToken::new);
        let req = req.map(|body| Body::new(body.map_err(Into::<BoxError>::into)));

        let scope = Scope::new(&parent, self.config.timeout);
        // Released on every exit path, unwinding included.
        let _release = scope.token().clone().drop_guard();
        let mut ctx = Context::new(req, scope, self.config.silent);

        match self.router.lookup(ctx.method(), ctx.path()) {
            Some((route, params)) => {
                ctx.set_params(params);
                let mut units = Vec::with_capacity(self.middleware.len() + 1);
                units.extend(self.middleware.iter().cloned());
                units.push(route);
                chain::execute(&units, &mut ctx).await;
            }
            None => {
                debug!(method = %ctx.method(), path = ctx.path(), "no route matched");
                match &self.not_found {
                    Some(handler) => handler.call(&mut ctx, Next::noop()).await,
                    None => default_not_found(&mut ctx),
                }
            }
        }

        ctx.into_writer().into_response()
    }
}

impl Default for App {
    fn default() -> Self { Self::new() }
}

/// The protocol-level 404 used when no not-found handler is configured.
fn default_not_found(ctx: &mut Context) {
    ctx.bytes(StatusCode::NOT_FOUND, ContentType::Text, b"404 page not found\n");
}

// ── Groups ────────────────────────────────────────────────────────────────────

/// Routes and middleware sharing a path prefix. Obtained via [`App::group`].
pub struct Group {
    prefix: String,
    app: App,
}

impl Group {
    /// Appends a middleware that only runs for paths starting with the
    /// group prefix. It is registered globally, so it keeps its place in
    /// the application's middleware order.
    pub fn use_middleware(mut self, middleware: impl Handler) -> Self {
        let guard = PrefixGuard { prefix: self.prefix.clone(), inner: boxed(middleware) };
        self.app = self.app.use_middleware(guard);
        self
    }

    pub fn on(mut self, method: Method, pattern: &str, handler: impl Handler) -> Self {
        let pattern = format!("{}{pattern}", self.prefix);
        self.app = self.app.on(method, &pattern, handler);
        self
    }

    pub fn get(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, pattern, handler)
    }

    pub fn patch(self, pattern: &str, handler: impl Handler) -> Self {
        self.on(Method::PATCH, pattern, handler)
    }
}

/// Runs `inner` when the request path starts with `prefix` (a plain string
/// prefix, so `/api` also covers `/apiary`); otherwise just continues.
struct PrefixGuard {
    prefix: String,
    inner: BoxedHandler,
}

impl Handler for PrefixGuard {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a> {
        if ctx.path().starts_with(&self.prefix) {
            self.inner.call(ctx, next)
        } else {
            next.run(ctx)
        }
    }
}
