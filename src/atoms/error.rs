// ── Lifegraph Atoms: Error Types ───────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, Store, Provider, Archive…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • Statement failures carry the statement's *purpose*, never interpolated
//     user content, so logs stay readable and leak nothing.
//   • Per-record failures inside sync/migration batches are caught at the
//     record boundary by callers — nothing here implements retry.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GraphError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The embedded store rejected or errored on a statement.
    /// `purpose` identifies what the statement was doing.
    #[error("Statement failed ({purpose}): {source}")]
    Statement {
        purpose: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// Store-level failure outside a specific statement (open, pragma, …).
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Operation requires an initialized on-disk store.
    #[error("Store not initialized: {0}")]
    StoreNotInitialized(String),

    /// Embedding or extraction provider failure (soft degradation for
    /// per-record work; callers store the record without the derived data).
    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    /// Export/import archive is malformed or unrecognized.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ───────────────────────────────────────────────

impl GraphError {
    /// Create a provider error with name and message.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider { provider: provider.into(), message: message.into() }
    }

    /// Wrap a rusqlite error with the purpose of the failing statement.
    pub fn statement(purpose: &'static str, source: rusqlite::Error) -> Self {
        Self::Statement { purpose, source }
    }
}

// ── Message bridge: String → GraphError ────────────────────────────────────
// Allows `?` on helpers that produce plain message errors.

impl From<String> for GraphError {
    fn from(s: String) -> Self {
        GraphError::Other(s)
    }
}

impl From<&str> for GraphError {
    fn from(s: &str) -> Self {
        GraphError::Other(s.to_string())
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations should return this type.
pub type GraphResult<T> = Result<T, GraphError>;
