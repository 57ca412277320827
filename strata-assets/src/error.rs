use thiserror::Error;

/// Query-surface failures. Bulk load/reload failures never show up here;
/// those are logged and skipped per path.
#[derive(Debug, Error)]
pub enum QueryError {
    /// No source, no cache entry, no fallback.
    #[error("no such asset: {path}")]
    NoSuchAsset { path: String },

    /// The cached (or registered) instance is not the requested type.
    /// Always a programming or configuration error, never retried.
    #[error("type mismatch for {path}: requested {requested}, cached {cached}")]
    TypeMismatch {
        path: String,
        requested: &'static str,
        cached: &'static str,
    },

    /// Streaming is only defined for basic assets; a compound asset has
    /// no single backing stream.
    #[error("cannot stream compound asset: {path}")]
    StreamingUnsupported { path: String },

    #[error("cannot open {path}: {message}")]
    Io { path: String, message: String },
}
