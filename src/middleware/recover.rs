use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::error;

use crate::chain::Next;
use crate::context::Context;
use crate::handler::{BoxFuture, Handler};

/// A panic caught by [`Recover`], reduced to its message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct Panic {
    message: String,
}

impl Panic {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_owned()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

type ErrorHandler = Arc<dyn Fn(&mut Context, &Panic) + Send + Sync>;

/// Recovers from panics in the downstream chain.
///
/// The chain executor itself never catches panics; register `Recover` (first,
/// usually) to keep a panicking handler from tearing down its connection.
/// After a panic the error handler runs against the same context, so it can
/// check [`is_written`](crate::ResponseWriter::is_written) before answering.
///
/// The panic itself is logged unless the application is
/// [`silent`](crate::App::silent).
#[derive(Clone)]
pub struct Recover {
    on_panic: ErrorHandler,
}

impl Recover {
    /// Recovery with the default error handler: log the failure and, when
    /// nothing has been written yet, answer `500` with a JSON error body.
    pub fn new() -> Self {
        Self::with_handler(default_error_handler)
    }

    /// Recovery with a custom error handler.
    pub fn with_handler(handler: impl Fn(&mut Context, &Panic) + Send + Sync + 'static) -> Self {
        Self { on_panic: Arc::new(handler) }
    }
}

impl Default for Recover {
    fn default() -> Self { Self::new() }
}

impl Handler for Recover {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a> {
        Box::pin(async move {
            let outcome = AssertUnwindSafe(next.run(ctx)).catch_unwind().await;
            if let Err(payload) = outcome {
                let panic = Panic::from_payload(payload);
                if !ctx.is_silent() {
                    error!(method = %ctx.method(), path = ctx.path(), error = %panic, "panic recovered");
                }
                (self.on_panic)(ctx, &panic);
            }
        })
    }
}

fn default_error_handler(ctx: &mut Context, err: &Panic) {
    error!(error = %err, "request failed");
    if !ctx.response().is_written() {
        ctx.internal_server_error("An unexpected error occurred");
    }
}
