use http::StatusCode;
use tokio::time::Instant;
use tracing::info;

use crate::chain::Next;
use crate::context::Context;
use crate::handler::{BoxFuture, Handler};

/// Logs every request once the downstream chain has returned.
///
/// Register it first so the measured latency covers the whole chain.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logger;

impl Handler for Logger {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a> {
        Box::pin(async move {
            let start = Instant::now();
            next.run(ctx).await;

            let status = ctx.response().status().unwrap_or(StatusCode::OK);
            info!(
                method = %ctx.method(),
                path = ctx.path(),
                status = status.as_u16(),
                elapsed = ?start.elapsed(),
                "request completed"
            );
        })
    }
}
