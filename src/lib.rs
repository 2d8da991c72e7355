//! # tern
//!
//! A minimal HTTP routing and middleware-chaining library on top of hyper.
//!
//! ## The model
//!
//! Every step of a request is a [`Handler`]: global middleware in
//! registration order, then the route handler the router matched. Each step
//! gets the request [`Context`] and a [`Next`] continuation. Running `next`
//! hands control downstream and returns when the rest of the chain is done,
//! so middleware can act on both passes:
//!
//! ```text
//! Logger before → Auth before → handler → Auth after → Logger after
//! ```
//!
//! Not running `next` short-circuits the chain. Before every step the
//! executor checks the request's cancellation scope (client gone or deadline
//! passed) and answers `504` once it has fired.
//!
//! What tern does:
//!
//! - First-match routing on `:param` patterns, one ordered list per method
//! - Middleware chaining with upstream and downstream passes
//! - Per-request scope: typed value store, deadline, response-state tracking
//! - Query, path, body and multipart upload binding helpers
//! - Graceful shutdown: SIGTERM / Ctrl-C, drains in-flight requests
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use tern::{App, Server, from_fn, middleware::{Logger, Recover}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tern::Error> {
//!     let app = App::new()
//!         .use_middleware(Logger)
//!         .use_middleware(Recover::new())
//!         .get("/users/:id", from_fn(|ctx, _next| Box::pin(async move {
//!             let id = ctx.param("id").unwrap_or_default().to_owned();
//!             let _ = ctx.ok(&serde_json::json!({ "id": id }));
//!         })))
//!         .post("/users", from_fn(|ctx, _next| Box::pin(async move {
//!             match ctx.body_bytes().await {
//!                 Ok(body) if !body.is_empty() => ctx.status(StatusCode::CREATED),
//!                 _ => ctx.status(StatusCode::BAD_REQUEST),
//!             };
//!         })));
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//! ```

mod app;
mod binding;
mod chain;
mod context;
mod error;
mod handler;
mod multipart;
mod response;
mod router;
mod server;

pub mod middleware;

pub use app::{App, Config, Group};
pub use binding::{FromQueryValue, QueryBinder};
pub use chain::{Next, TIMEOUT_STATUS};
pub use context::{Body, Context, StoreError};
pub use error::{BoxError, Error};
pub use handler::{BoxFuture, BoxedHandler, Handler, from_fn};
pub use multipart::{MAX_FORM_SIZE, MultipartForm, UploadedFile};
pub use response::{ContentType, ResponseWriter};
pub use server::Server;
