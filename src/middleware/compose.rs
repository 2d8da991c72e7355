use crate::chain::Next;
use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler, Handler, boxed};

/// Wraps `handler` so per-route middleware can run ahead of it.
///
/// ```rust
/// use tern::{App, from_fn, middleware::{Recover, with}};
///
/// let app = App::new().get(
///     "/reports/:id",
///     with(from_fn(|ctx, _next| Box::pin(async move {
///         ctx.send(http::StatusCode::OK, "report");
///     })))
///     .layer(Recover::new()),
/// );
/// ```
pub fn with(handler: impl Handler) -> Stack {
    Stack { units: vec![boxed(handler)] }
}

/// A handler with its own middleware. Built by [`with`].
///
/// The layers run in the order added, then the handler. If that inner chain
/// runs to its end (the handler itself runs `next`), control passes on to
/// the enclosing chain.
pub struct Stack {
    // Layers in order, the handler always last.
    units: Vec<BoxedHandler>,
}

impl Stack {
    pub fn layer(mut self, middleware: impl Handler) -> Self {
        let handler_slot = self.units.len() - 1;
        self.units.insert(handler_slot, boxed(middleware));
        self
    }
}

impl Handler for Stack {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a> {
        Box::pin(async move {
            Next::nested(&self.units, &next).run(ctx).await;
        })
    }
}
