// ── Lifegraph ──────────────────────────────────────────────────────────────
//
// Hybrid-retrieval personal knowledge graph engine. Mirrors a user's primary
// relational records (journal entries, chats, notes, goals, tasks…) into an
// embedded property graph enriched with AI-derived nodes (atomic thoughts,
// people, topics), and answers context queries by blending vector similarity,
// keyword matching and recency.
//
// Layering:
//   atoms/  — pure types, constants, errors, collaborator traits
//   engine/ — store adapter, scoring, retrieval, sync, migration, providers
//
// The crate owns the graph store; the primary store, the embedding provider
// and the thought extractor are collaborators injected behind atoms/traits.

pub mod atoms;
pub mod engine;

pub use atoms::error::{GraphError, GraphResult};
pub use atoms::traits::{EmbeddingProvider, PrimaryStore, SettingsStore, ThoughtExtractor};
pub use atoms::types::{
    EdgeKind, EmbeddingInput, Extraction, GraphNode, MigrationState, MigrationStats, NodeKind,
    RetrievalOptions, RetrievedContext, ScoredItem, SourceRecord, SyncState, SyncStats,
    UpsertOutcome,
};
pub use engine::migration::MigrationEngine;
pub use engine::retrieval::ContextRetriever;
pub use engine::settings::GraphSettings;
pub use engine::store::GraphStore;
pub use engine::sync::SyncEngine;
