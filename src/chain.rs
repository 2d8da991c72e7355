//! Sequential middleware-chain executor.
//!
//! A chain is a flat slice of handlers: the global middleware in registration
//! order followed by the matched route handler. Execution walks the slice by
//! index. Each unit receives a [`Next`] that points one slot further; running
//! it invokes that slot, so a unit that does work after `next.run(ctx).await`
//! sees the downstream units finish first. The result behaves like nested
//! scopes even though registration is flat:
//!
//! ```text
//! M1 before → M2 before → H → M2 after → M1 after
//! ```
//!
//! Two checks happen before every unit, in this order:
//!
//! 1. the request's cancellation scope: once fired, `504 Gateway Timeout` is
//!    written and nothing further runs;
//! 2. the context's `stopped` flag: once set, the chain ends silently.
//!
//! Both checks run only at step boundaries. A unit that runs for a long time
//! without calling `next` is never interrupted.

use http::StatusCode;

use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler};

/// Status committed when the cancellation scope fires mid-chain.
pub const TIMEOUT_STATUS: StatusCode = StatusCode::GATEWAY_TIMEOUT;

const NO_UNITS: &[BoxedHandler] = &[];

/// The continuation handed to each unit: "the rest of the chain".
///
/// `Next` is `Copy`. Running it more than once re-enters the remainder of the
/// chain each time; nothing guards against that.
///
/// When `next` is never run, the chain ends at the current unit. That is the
/// intended way to short-circuit, e.g. on failed authentication.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    units: &'a [BoxedHandler],
    index: usize,
    // Continuation of an enclosing chain, run once `units` is exhausted.
    tail: Option<&'a Next<'a>>,
}

impl<'a> Next<'a> {
    pub(crate) fn new(units: &'a [BoxedHandler]) -> Self {
        Self { units, index: 0, tail: None }
    }

    /// A nested chain that hands control to `tail` when exhausted.
    pub(crate) fn nested(units: &'a [BoxedHandler], tail: &'a Next<'a>) -> Self {
        Self { units, index: 0, tail: Some(tail) }
    }

    /// A continuation that does nothing.
    pub(crate) fn noop() -> Self {
        Self::new(NO_UNITS)
    }

    /// Runs the rest of the chain against `ctx`.
    pub fn run<'c>(self, ctx: &'c mut Context) -> BoxFuture<'c>
    where
        'a: 'c,
    {
        Box::pin(async move {
            let step = match self.units.get(self.index) {
                Some(unit) => Step::Unit(unit),
                None => match self.tail {
                    Some(tail) => Step::Tail(tail),
                    None => return,
                },
            };

            if ctx.is_cancelled() {
                ctx.response_mut().write_header(TIMEOUT_STATUS);
                return;
            }
            if ctx.is_stopped() {
                return;
            }

            match step {
                Step::Unit(unit) => {
                    let next = Next { index: self.index + 1, ..self };
                    unit.call(ctx, next).await;
                }
                Step::Tail(tail) => tail.run(ctx).await,
            }
        })
    }

    /// Number of units this continuation has not reached yet, excluding any
    /// enclosing chain.
    pub fn remaining(&self) -> usize {
        self.units.len().saturating_sub(self.index)
    }
}

enum Step<'a> {
    Unit(&'a BoxedHandler),
    Tail(&'a Next<'a>),
}

/// Executes `units` in order against `ctx`.
pub(crate) async fn execute(units: &[BoxedHandler], ctx: &mut Context) {
    Next::new(units).run(ctx).await;
}
