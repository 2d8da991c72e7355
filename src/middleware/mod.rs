//! Built-in middleware.
//!
//! Everything here is an ordinary [`Handler`](crate::Handler); the executor
//! gives none of it special treatment.
//!
//! - [`Logger`]: one structured log line per request
//! - [`Recover`]: turns a panic in the downstream chain into a `500`
//! - [`with`]: per-route middleware that runs ahead of one handler

mod compose;
mod logger;
mod recover;

pub use compose::{Stack, with};
pub use logger::Logger;
pub use recover::{Panic, Recover};
