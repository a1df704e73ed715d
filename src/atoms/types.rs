// ── Lifegraph Atoms: Core Types ────────────────────────────────────────────
//
// Pure data types for the knowledge graph — node/edge kinds, primary-store
// records, retrieval results, sync/migration statistics and progress states.
// No logic beyond trivial constructors and string mapping.
//
// Follows the project pattern: structs here, impls in engine/.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// Node & edge kinds
// ═══════════════════════════════════════════════════════════════════════════

/// Every kind of node in the graph. Person and Topic are derived (created by
/// extraction, deduplicated per user); the rest mirror primary-store entities
/// or AI-derived records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    JournalEntry,
    AtomicThought,
    ChatMessage,
    Person,
    Topic,
    /// AI-derived goal (distinct from the user-authored UserGoal).
    Goal,
    AgendaItem,
    Summary,
    DailyApp,
    Note,
    UserGoal,
    UserTask,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::JournalEntry => "JournalEntry",
            NodeKind::AtomicThought => "AtomicThought",
            NodeKind::ChatMessage => "ChatMessage",
            NodeKind::Person => "Person",
            NodeKind::Topic => "Topic",
            NodeKind::Goal => "Goal",
            NodeKind::AgendaItem => "AgendaItem",
            NodeKind::Summary => "Summary",
            NodeKind::DailyApp => "DailyApp",
            NodeKind::Note => "Note",
            NodeKind::UserGoal => "UserGoal",
            NodeKind::UserTask => "UserTask",
        }
    }

    pub fn parse(s: &str) -> Option<NodeKind> {
        Some(match s {
            "JournalEntry" => NodeKind::JournalEntry,
            "AtomicThought" => NodeKind::AtomicThought,
            "ChatMessage" => NodeKind::ChatMessage,
            "Person" => NodeKind::Person,
            "Topic" => NodeKind::Topic,
            "Goal" => NodeKind::Goal,
            "AgendaItem" => NodeKind::AgendaItem,
            "Summary" => NodeKind::Summary,
            "DailyApp" => NodeKind::DailyApp,
            "Note" => NodeKind::Note,
            "UserGoal" => NodeKind::UserGoal,
            "UserTask" => NodeKind::UserTask,
            _ => return None,
        })
    }

    /// Entity kinds synced incrementally from the primary store, in the
    /// fixed cross-kind sync order.
    pub const SYNC_ORDER: [NodeKind; 8] = [
        NodeKind::JournalEntry,
        NodeKind::ChatMessage,
        NodeKind::AgendaItem,
        NodeKind::Summary,
        NodeKind::DailyApp,
        NodeKind::Note,
        NodeKind::UserGoal,
        NodeKind::UserTask,
    ];

    /// Kinds whose new content is handed to the atomic-thought extractor.
    /// Goals and tasks participate so that obligation-linked thoughts exist
    /// for the retrieval backfill.
    pub fn extractable(&self) -> bool {
        matches!(
            self,
            NodeKind::JournalEntry
                | NodeKind::ChatMessage
                | NodeKind::Note
                | NodeKind::UserGoal
                | NodeKind::UserTask
        )
    }
}

/// Directed, typed relationship kinds. Attributes (confidence, relevance,
/// sentiment, timestamps) travel in the edge's props payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Extraction provenance: AtomicThought → originating document.
    ExtractedFrom,
    /// Similarity link: AtomicThought → AtomicThought.
    SimilarTo,
    /// Support link: AtomicThought → Goal.
    Supports,
    /// Mention link: document → Person.
    Mentions,
    /// Topic link: document → Topic.
    About,
    /// Structural: UserTask → UserGoal.
    LinkedToGoal,
    /// Structural: AgendaItem → JournalEntry it was captured from.
    CapturedFrom,
    /// Structural: Summary → JournalEntry in its date range.
    Summarizes,
    /// Structural: DailyApp → JournalEntry in its trailing window.
    GeneratedFrom,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::ExtractedFrom => "EXTRACTED_FROM",
            EdgeKind::SimilarTo => "SIMILAR_TO",
            EdgeKind::Supports => "SUPPORTS",
            EdgeKind::Mentions => "MENTIONS",
            EdgeKind::About => "ABOUT",
            EdgeKind::LinkedToGoal => "LINKED_TO_GOAL",
            EdgeKind::CapturedFrom => "CAPTURED_FROM",
            EdgeKind::Summarizes => "SUMMARIZES",
            EdgeKind::GeneratedFrom => "GENERATED_FROM",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Nodes & primary-store records
// ═══════════════════════════════════════════════════════════════════════════

/// A content-bearing node as stored in the graph. The embedding is `None`
/// until successfully generated and is never partially written — the vector
/// and its model version are always set (or cleared) together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub user_id: String,
    /// Text used for embedding and keyword matching.
    pub content: String,
    /// Source modification/creation time (unix epoch millis).
    pub timestamp_ms: i64,
    /// Kind-specific scalar attributes (status, priority, sentiment, …).
    #[serde(default)]
    pub props: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

/// Whether an upsert created a new node or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Structural link hints carried by a primary-store record. Which fields are
/// populated depends on the record's kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordLinks {
    /// UserTask → the UserGoal it belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    /// AgendaItem / AtomicThought → the JournalEntry it came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_entry_id: Option<String>,
    /// Summary → the date range (millis, inclusive) it covers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range_ms: Option<(i64, i64)>,
}

/// One record from the primary relational store, shaped for graph ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub user_id: String,
    /// Content fields joined into the embedding text.
    pub text: String,
    /// Modification timestamp (unix epoch millis) — drives the watermark.
    pub timestamp_ms: i64,
    #[serde(default)]
    pub props: serde_json::Value,
    #[serde(default)]
    pub links: RecordLinks,
}

// ═══════════════════════════════════════════════════════════════════════════
// Extraction payloads
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedThought {
    pub content: String,
    #[serde(default)]
    pub thought_type: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub sentiment: f32,
    #[serde(default)]
    pub importance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPerson {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedTopic {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub relevance: f32,
}

/// Result of running the atomic-thought extractor over one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub thoughts: Vec<ExtractedThought>,
    #[serde(default)]
    pub people: Vec<ExtractedPerson>,
    #[serde(default)]
    pub topics: Vec<ExtractedTopic>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Retrieval results
// ═══════════════════════════════════════════════════════════════════════════

/// One scored item in a retrieval result list.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredItem {
    pub id: String,
    pub content: String,
    pub score: f64,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub props: serde_json::Value,
}

/// A person surfaced from the graph context of retrieved journal entries.
#[derive(Debug, Clone, Serialize)]
pub struct PersonMention {
    pub name: String,
    pub mention_count: i64,
    pub avg_sentiment: f64,
}

/// A topic surfaced from the graph context of retrieved journal entries.
#[derive(Debug, Clone, Serialize)]
pub struct TopicMention {
    pub name: String,
    pub total_relevance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Which entity kinds to include in a retrieval pass. Everything defaults on.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub journal: bool,
    pub thoughts: bool,
    pub goals: bool,
    pub notes: bool,
    pub user_goals: bool,
    pub user_tasks: bool,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            journal: true,
            thoughts: true,
            goals: true,
            notes: true,
            user_goals: true,
            user_tasks: true,
        }
    }
}

/// The bounded context bundle handed to the assistant.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievedContext {
    pub journal_entries: Vec<ScoredItem>,
    pub thoughts: Vec<ScoredItem>,
    pub goals: Vec<ScoredItem>,
    pub notes: Vec<ScoredItem>,
    pub user_goals: Vec<ScoredItem>,
    pub user_tasks: Vec<ScoredItem>,
    pub people: Vec<PersonMention>,
    pub topics: Vec<TopicMention>,
    /// `None` when the call degraded to keyword-only mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_embedding: Option<Vec<f32>>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Sync & migration statistics / progress states
// ═══════════════════════════════════════════════════════════════════════════

/// Per-kind created/updated counts for one sync batch.
#[derive(Debug, Clone, Serialize, Default)]
pub struct KindSyncStats {
    pub kind: String,
    pub created: usize,
    pub updated: usize,
}

/// Counters for one incremental sync pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub per_kind: Vec<KindSyncStats>,
    pub thoughts_created: usize,
    pub relationships_created: usize,
    pub nodes_deleted: usize,
}

impl SyncStats {
    pub fn created_total(&self) -> usize {
        self.per_kind.iter().map(|k| k.created).sum()
    }

    pub fn updated_total(&self) -> usize {
        self.per_kind.iter().map(|k| k.updated).sum()
    }

    /// True when the batch touched nothing — gates the `last_synced` stamp.
    pub fn is_empty(&self) -> bool {
        self.created_total() == 0
            && self.updated_total() == 0
            && self.thoughts_created == 0
            && self.nodes_deleted == 0
    }
}

/// Counters for the one-time bulk migration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationStats {
    pub nodes_created: usize,
    pub thoughts_created: usize,
    pub relationships_created: usize,
}

/// Observable progress of the bulk migration. External UI subscribes to a
/// watch channel carrying this state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state")]
pub enum MigrationState {
    NotStarted,
    InProgress { step: String, progress: f32, message: String },
    Completed { stats: MigrationStats },
    Failed { message: String },
}

/// Observable progress of an incremental sync pass.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state")]
pub enum SyncState {
    NotStarted,
    InProgress { step: String, message: String },
    Completed { stats: SyncStats },
    Failed { message: String },
}

// ═══════════════════════════════════════════════════════════════════════════
// Embedding input tagging
// ═══════════════════════════════════════════════════════════════════════════

/// Documents and queries are embedded with different input tags; mixing them
/// degrades similarity quality on asymmetric embedding models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingInput {
    Document,
    Query,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_round_trips_through_strings() {
        for kind in [
            NodeKind::JournalEntry,
            NodeKind::AtomicThought,
            NodeKind::Person,
            NodeKind::UserTask,
        ] {
            assert_eq!(NodeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NodeKind::parse("Nonsense"), None);
    }

    #[test]
    fn sync_order_excludes_derived_kinds() {
        assert!(!NodeKind::SYNC_ORDER.contains(&NodeKind::Person));
        assert!(!NodeKind::SYNC_ORDER.contains(&NodeKind::Topic));
        assert!(!NodeKind::SYNC_ORDER.contains(&NodeKind::AtomicThought));
        assert!(!NodeKind::SYNC_ORDER.contains(&NodeKind::Goal));
        assert_eq!(NodeKind::SYNC_ORDER[0], NodeKind::JournalEntry);
    }

    #[test]
    fn obligation_kinds_feed_the_extractor() {
        assert!(NodeKind::UserGoal.extractable());
        assert!(NodeKind::UserTask.extractable());
        assert!(NodeKind::Note.extractable());
        assert!(!NodeKind::Summary.extractable());
        assert!(!NodeKind::DailyApp.extractable());
    }

    #[test]
    fn empty_sync_stats_reported_as_empty() {
        let mut stats = SyncStats::default();
        assert!(stats.is_empty());
        stats.per_kind.push(KindSyncStats {
            kind: "JournalEntry".into(),
            created: 1,
            updated: 0,
        });
        assert!(!stats.is_empty());
    }
}
