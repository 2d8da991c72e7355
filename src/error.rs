//! Unified error type.

/// Boxed error produced by request body streams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by tern's fallible operations.
///
/// Routing outcomes (404, 504, etc.) are written to the response, not raised
/// as `Error`s. This type surfaces infrastructure failures (binding a port,
/// reading a body) and the failures of the binding helpers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    Addr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("reading request body: {0}")]
    Body(#[source] BoxError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("multipart: {0}")]
    Multipart(#[from] multer::Error),

    #[error("no file uploaded under field {0}")]
    MissingFile(String),

    #[error("{kind} parameter {name} is empty or not found")]
    MissingParameter { kind: &'static str, name: String },

    /// Every field-level failure of one query binding, in declaration order.
    #[error("binding query parameters: {}", .0.join("; "))]
    Binding(Vec<String>),
}
