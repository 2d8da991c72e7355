//! Handler trait and type erasure.
//!
//! # One trait for middleware and route handlers
//!
//! Every step of a request is a [`Handler`]: it receives the request
//! [`Context`] and a [`Next`] continuation. Middleware runs `next` to pass
//! control downstream; a route handler usually ignores it. The difference is
//! only where the unit is registered.
//!
//! # How handlers are stored
//!
//! The route table and the global middleware list hold handlers of
//! *different* concrete types, so they are stored as trait objects:
//!
//! ```text
//! fn auth<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a>   ← user writes this
//!        ↓ app.use_middleware(auth)
//! Arc::new(auth)                       ← BoxedHandler = Arc<dyn Handler>
//!        ↓
//! handler.call(ctx, next)  per request ← one vtable dispatch
//! ```
//!
//! The context is *borrowed* by each unit rather than moved through it, so a
//! unit still owns its `&mut Context` after `next` returns. That is what lets
//! middleware do work on the upstream pass, and what lets
//! [`Recover`](crate::middleware::Recover) write a response after the
//! downstream chain panicked.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::chain::Next;
use crate::context::Context;

/// A heap-allocated, type-erased future borrowing the request context.
///
/// `Pin<Box<…>>` because the chain is recursive (a unit awaits the rest of the
/// chain) and a recursive `async` type must be boxed. `Send` lets tokio move
/// the request across worker threads.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A heap-allocated, type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// A step in request processing: middleware or route handler.
///
/// Implemented automatically for functions and closures with the signature
///
/// ```text
/// for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a>
/// ```
///
/// Closures need the [`from_fn`] hint to be inferred with that signature.
/// Implement it on a struct when the unit carries configuration:
///
/// ```rust
/// use tern::{BoxFuture, Context, Handler, Next};
///
/// struct RequireHeader(&'static str);
///
/// impl Handler for RequireHeader {
///     fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a> {
///         Box::pin(async move {
///             if ctx.header(self.0).is_none() {
///                 ctx.unauthorized("missing credentials");
///                 return;
///             }
///             next.run(ctx).await;
///         })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a> {
        (self)(ctx, next)
    }
}

/// Pins a closure to the [`Handler`] signature.
///
/// Rust cannot infer a higher-ranked closure signature from a trait bound, so
/// a bare closure passed to `get` or `use_middleware` fails to type-check.
/// Passing it through `from_fn` first fixes the signature:
///
/// ```rust
/// use tern::{App, from_fn};
///
/// let app = App::new().get("/ping", from_fn(|ctx, _next| Box::pin(async move {
///     ctx.send(http::StatusCode::OK, "pong");
/// })));
/// ```
pub fn from_fn<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a> + Send + Sync + 'static,
{
    f
}

pub(crate) fn boxed(handler: impl Handler) -> BoxedHandler {
    Arc::new(handler)
}
