// ── Lifegraph Atoms: Collaborator Traits ───────────────────────────────────
//
// Interfaces consumed by the engines but implemented elsewhere: the primary
// relational store (source of truth), the embedding provider, the LLM-backed
// atomic-thought extractor, and the process-wide settings collaborator.
//
// All network-bound collaborators are async and cancellable at their await
// points; failures are surfaced as `GraphError::Provider` and treated by the
// engines as "feature unavailable for this record", never as batch aborts.

use crate::atoms::error::GraphResult;
use crate::atoms::types::{EmbeddingInput, Extraction, NodeKind, SourceRecord};
use async_trait::async_trait;

// ── Primary store ──────────────────────────────────────────────────────────

/// Read access to the primary relational store, per entity kind.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Records created or modified strictly after `since_ms`.
    async fn records_modified_since(
        &self,
        kind: NodeKind,
        user_id: &str,
        since_ms: i64,
    ) -> GraphResult<Vec<SourceRecord>>;

    /// The full live-id set for deletion reconciliation.
    async fn all_ids(&self, kind: NodeKind, user_id: &str) -> GraphResult<Vec<String>>;

    /// Entire history for the bulk migration path.
    async fn all_records(&self, kind: NodeKind, user_id: &str)
        -> GraphResult<Vec<SourceRecord>>;
}

// ── Embedding provider ─────────────────────────────────────────────────────

/// Turns text into a fixed-length float vector. Dimensionality and model
/// version are provider-defined constants consumed by this crate.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str, input: EmbeddingInput) -> GraphResult<Vec<f32>>;

    /// Recorded alongside every embedding written to the graph.
    fn model_version(&self) -> &str;
}

// ── Extraction provider ────────────────────────────────────────────────────

/// LLM-backed extractor producing atomic thoughts, people and topics from a
/// document. Absence of an extractor means no derived nodes — not an error.
#[async_trait]
pub trait ThoughtExtractor: Send + Sync {
    async fn extract(&self, content: &str, context: &str) -> GraphResult<Extraction>;
}

// ── Settings collaborator ──────────────────────────────────────────────────

/// Process-wide flags and per-kind sync watermarks. The crate ships a
/// store-backed implementation (`engine::settings::GraphSettings`); callers
/// may substitute their own.
pub trait SettingsStore: Send + Sync {
    fn migration_complete(&self) -> GraphResult<bool>;
    fn set_migration_complete(&self, done: bool) -> GraphResult<()>;

    fn auto_sync_enabled(&self) -> GraphResult<bool>;
    fn set_auto_sync_enabled(&self, enabled: bool) -> GraphResult<()>;

    /// Per-kind high-water mark (unix millis); 0 when never synced.
    fn watermark(&self, kind: NodeKind) -> GraphResult<i64>;
    fn set_watermark(&self, kind: NodeKind, ts_ms: i64) -> GraphResult<()>;

    /// Updated after every sync pass, even an empty one.
    fn set_last_checked(&self, ts_ms: i64) -> GraphResult<()>;
    /// Updated only when a sync pass touched something.
    fn set_last_synced(&self, ts_ms: i64) -> GraphResult<()>;

    /// Whether an extraction-provider key is configured at all.
    fn extractor_key_present(&self) -> GraphResult<bool>;
}
