// End-to-end flows over the public API: bulk migration into incremental
// sync, extraction-to-retrieval, keyword-only degradation, and the archive
// round trip. Collaborators are stubbed; the graph store is real.

use async_trait::async_trait;
use lifegraph::engine::settings::GraphSettings;
use lifegraph::{
    ContextRetriever, EmbeddingInput, EmbeddingProvider, Extraction, GraphResult, GraphStore,
    MigrationEngine, NodeKind, PrimaryStore, RetrievalOptions, SettingsStore, SourceRecord,
    SyncEngine, ThoughtExtractor,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

// ── Stub collaborators ─────────────────────────────────────────────────────

#[derive(Default)]
struct StubPrimary {
    records: Mutex<HashMap<NodeKind, Vec<SourceRecord>>>,
}

impl StubPrimary {
    fn put(&self, kind: NodeKind, record: SourceRecord) {
        self.records.lock().entry(kind).or_default().push(record);
    }
}

#[async_trait]
impl PrimaryStore for StubPrimary {
    async fn records_modified_since(
        &self,
        kind: NodeKind,
        user_id: &str,
        since_ms: i64,
    ) -> GraphResult<Vec<SourceRecord>> {
        Ok(self
            .records
            .lock()
            .get(&kind)
            .map(|list| {
                list.iter()
                    .filter(|r| r.user_id == user_id && r.timestamp_ms > since_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn all_ids(&self, kind: NodeKind, user_id: &str) -> GraphResult<Vec<String>> {
        Ok(self.all_records(kind, user_id).await?.into_iter().map(|r| r.id).collect())
    }

    async fn all_records(&self, kind: NodeKind, user_id: &str) -> GraphResult<Vec<SourceRecord>> {
        self.records_modified_since(kind, user_id, i64::MIN).await
    }
}

/// Crude two-axis "semantics": coffee-flavored text lands on one axis,
/// everything else on the other. Enough to make ranking observable.
struct StubEmbedder;

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, text: &str, _input: EmbeddingInput) -> GraphResult<Vec<f32>> {
        if text.to_lowercase().contains("coffee") {
            Ok(vec![1.0, 0.0])
        } else {
            Ok(vec![0.0, 1.0])
        }
    }

    fn model_version(&self) -> &str {
        "stub-embed-v1"
    }
}

struct StubExtractor {
    extraction: Extraction,
}

#[async_trait]
impl ThoughtExtractor for StubExtractor {
    async fn extract(&self, _content: &str, _context: &str) -> GraphResult<Extraction> {
        Ok(self.extraction.clone())
    }
}

fn record(id: &str, text: &str, ts: i64) -> SourceRecord {
    SourceRecord {
        id: id.into(),
        user_id: "u1".into(),
        text: text.into(),
        timestamp_ms: ts,
        props: json!({}),
        links: Default::default(),
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ── Migration → sync pipeline ──────────────────────────────────────────────

#[tokio::test]
async fn migration_unlocks_incremental_sync() {
    let store = Arc::new(GraphStore::open_in_memory().unwrap());
    let primary = Arc::new(StubPrimary::default());
    let settings = Arc::new(GraphSettings::new(store.clone()));
    let t0 = now_ms();

    primary.put(NodeKind::JournalEntry, record("j1", "started journaling", t0 - 1_000));
    primary.put(NodeKind::JournalEntry, record("j2", "kept going", t0 - 500));

    // Before migration, sync refuses to touch the graph.
    let sync = SyncEngine::new(
        store.clone(),
        primary.clone(),
        Some(Arc::new(StubEmbedder)),
        None,
        settings.clone(),
    );
    assert!(!sync.is_sync_enabled().unwrap());
    assert!(sync.perform_incremental_sync("u1").await.unwrap().is_empty());
    assert_eq!(store.count_nodes(NodeKind::JournalEntry).unwrap(), 0);

    let migration = MigrationEngine::new(
        store.clone(),
        primary.clone(),
        Some(Arc::new(StubEmbedder)),
        settings.clone(),
    );
    let stats = migration.run("u1").await.unwrap();
    assert_eq!(stats.nodes_created, 2);
    assert!(sync.is_sync_enabled().unwrap());

    // A record written after migration arrives through the sync path.
    primary.put(NodeKind::Note, record("n1", "remember the dentist", t0));
    let stats = sync.perform_incremental_sync("u1").await.unwrap();
    assert_eq!(stats.created_total(), 1);
    assert_eq!(store.count_nodes(NodeKind::Note).unwrap(), 1);
    assert_eq!(settings.watermark(NodeKind::Note).unwrap(), t0);

    // Re-running against an unchanged primary store is a no-op: nodes are
    // merged by key and the watermark never regresses.
    let stats = sync.perform_incremental_sync("u1").await.unwrap();
    assert!(stats.is_empty());
    assert_eq!(store.count_nodes(NodeKind::Note).unwrap(), 1);
    assert_eq!(settings.watermark(NodeKind::Note).unwrap(), t0);
}

// ── Extraction flowing into retrieval ──────────────────────────────────────

#[tokio::test]
async fn coffee_with_sam_surfaces_entry_person_and_topic() {
    let store = Arc::new(GraphStore::open_in_memory().unwrap());
    let primary = Arc::new(StubPrimary::default());
    let settings = Arc::new(GraphSettings::new(store.clone()));
    settings.set_migration_complete(true).unwrap();
    settings.set_extractor_key_present(true).unwrap();

    primary.put(
        NodeKind::JournalEntry,
        record("j1", "Had coffee with Sam this morning, felt great", now_ms()),
    );
    primary.put(NodeKind::JournalEntry, record("j2", "Quiet evening reading", now_ms()));

    let extraction = Extraction {
        thoughts: vec![lifegraph::atoms::types::ExtractedThought {
            content: "Time with Sam lifts my mood".into(),
            thought_type: "observation".into(),
            confidence: 0.9,
            sentiment: 0.7,
            importance: 0.5,
        }],
        people: vec![lifegraph::atoms::types::ExtractedPerson {
            name: "Sam".into(),
            relationship: Some("friend".into()),
            sentiment: Some(0.8),
        }],
        topics: vec![lifegraph::atoms::types::ExtractedTopic {
            name: "coffee".into(),
            category: Some("food".into()),
            relevance: 0.6,
        }],
    };

    let sync = SyncEngine::new(
        store.clone(),
        primary,
        Some(Arc::new(StubEmbedder)),
        Some(Arc::new(StubExtractor { extraction })),
        settings,
    );
    let stats = sync.perform_incremental_sync("u1").await.unwrap();
    assert_eq!(stats.created_total(), 2);
    assert!(stats.thoughts_created >= 1);

    let retriever = ContextRetriever::new(store, Some(Arc::new(StubEmbedder)));
    let ctx = retriever
        .retrieve_context("u1", "coffee with Sam", RetrievalOptions::default())
        .await
        .unwrap();

    assert_eq!(ctx.journal_entries[0].id, "j1");
    assert!(ctx.people.iter().any(|p| p.name == "Sam"));
    assert!(ctx.topics.iter().any(|t| t.name == "coffee"));
    assert!(ctx.query_embedding.is_some());
}

// ── Keyword-only degradation ───────────────────────────────────────────────

#[tokio::test]
async fn deadline_query_scores_high_without_embeddings() {
    let store = Arc::new(GraphStore::open_in_memory().unwrap());
    store
        .upsert_node(&lifegraph::GraphNode {
            id: "j1".into(),
            kind: NodeKind::JournalEntry,
            user_id: "u1".into(),
            content: "Stressed about the project deadline all day".into(),
            timestamp_ms: now_ms(),
            props: json!({}),
            embedding: None,
            embedding_model: None,
        })
        .unwrap();

    // No embedding provider at all: permanent keyword-only mode.
    let retriever = ContextRetriever::new(store, None);
    let ctx = retriever
        .retrieve_context("u1", "deadline", RetrievalOptions::default())
        .await
        .unwrap();

    assert!(ctx.query_embedding.is_none());
    assert_eq!(ctx.journal_entries.len(), 1);
    // Full keyword match on a fresh entry: 0.7 from keywords plus nearly the
    // whole 0.3 recency share.
    assert!(ctx.journal_entries[0].score >= 0.7);
    assert!(ctx.journal_entries[0].score <= 1.0);
}

// ── Archive round trip ─────────────────────────────────────────────────────

#[test]
fn export_import_preserves_nodes_edges_and_watermarks() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("graph.db");
    let archive = dir.path().join("backup.lga");

    {
        let store = Arc::new(GraphStore::open(&db).unwrap());
        store
            .upsert_node(&lifegraph::GraphNode {
                id: "j1".into(),
                kind: NodeKind::JournalEntry,
                user_id: "u1".into(),
                content: "entry with an embedding".into(),
                timestamp_ms: 1_000,
                props: json!({"mood": "calm"}),
                embedding: Some(vec![0.5, -0.5, 0.25]),
                embedding_model: Some("stub-embed-v1".into()),
            })
            .unwrap();
        let sam = store.upsert_person("u1", "Sam", Some("friend"), Some(0.8), 1_000).unwrap();
        store
            .merge_edge(lifegraph::EdgeKind::Mentions, "j1", &sam, json!({"sentiment": 0.8}))
            .unwrap();
        GraphSettings::new(store.clone()).set_watermark(NodeKind::JournalEntry, 1_000).unwrap();

        store.export_archive(&archive).unwrap();
    }

    let restored_db = dir.path().join("restored.db");
    GraphStore::import_archive(&archive, &restored_db).unwrap();
    let restored = Arc::new(GraphStore::open(&restored_db).unwrap());

    assert_eq!(restored.count_nodes(NodeKind::JournalEntry).unwrap(), 1);
    assert_eq!(restored.count_edges().unwrap(), 1);

    let node = restored.get_node("j1").unwrap().unwrap();
    assert_eq!(node.embedding, Some(vec![0.5, -0.5, 0.25]));
    assert_eq!(node.props["mood"], "calm");

    let sam_id = lifegraph::engine::store::entity_key("person", "u1", "Sam");
    let sam = restored.get_entity(&sam_id).unwrap().unwrap();
    assert_eq!(sam.relationship.as_deref(), Some("friend"));

    // Sync position travels with the archive.
    let settings = GraphSettings::new(restored);
    assert_eq!(settings.watermark(NodeKind::JournalEntry).unwrap(), 1_000);
}
