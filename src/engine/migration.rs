// ── Migration Engine ───────────────────────────────────────────────────────
//
// One-time bulk load of the full primary-store history into a fresh graph.
// Unlike incremental sync this path is create-only (no merge check — the
// target is assumed empty) and aborts on the first statement failure rather
// than skipping records: a partially-migrated graph must not be marked
// complete. Fractional progress is published after each kind; success sets
// the migration-complete flag that turns incremental sync on.

use crate::atoms::error::GraphResult;
use crate::atoms::traits::{EmbeddingProvider, PrimaryStore, SettingsStore};
use crate::atoms::types::{
    EmbeddingInput, GraphNode, MigrationState, MigrationStats, NodeKind,
};
use crate::engine::store::GraphStore;
use crate::engine::sync::link_structural;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::watch;

/// Bulk-load order. Journal entries come first so that later kinds can
/// resolve range/window links against them; notes, user goals and user tasks
/// arrive through the first incremental sync instead.
const MIGRATION_ORDER: [NodeKind; 6] = [
    NodeKind::JournalEntry,
    NodeKind::ChatMessage,
    NodeKind::AgendaItem,
    NodeKind::Summary,
    NodeKind::DailyApp,
    NodeKind::AtomicThought,
];

/// Kind steps plus the final connection-count step.
const TOTAL_STEPS: usize = MIGRATION_ORDER.len() + 1;

pub struct MigrationEngine {
    store: Arc<GraphStore>,
    primary: Arc<dyn PrimaryStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    settings: Arc<dyn SettingsStore>,
    state_tx: watch::Sender<MigrationState>,
}

impl MigrationEngine {
    pub fn new(
        store: Arc<GraphStore>,
        primary: Arc<dyn PrimaryStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let (state_tx, _) = watch::channel(MigrationState::NotStarted);
        Self { store, primary, embedder, settings, state_tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<MigrationState> {
        self.state_tx.subscribe()
    }

    /// Run the full bulk migration for one user. Re-running after a
    /// completed migration is a no-op.
    pub async fn run(&self, user_id: &str) -> GraphResult<MigrationStats> {
        if self.settings.migration_complete()? {
            info!("[migrate] Migration already complete, nothing to do");
            return Ok(MigrationStats::default());
        }

        let result = self.run_steps(user_id).await;
        match &result {
            Ok(stats) => {
                info!(
                    "[migrate] Migration complete: {} nodes, {} thoughts, {} relationships",
                    stats.nodes_created, stats.thoughts_created, stats.relationships_created
                );
                self.settings.set_migration_complete(true)?;
                self.state_tx.send_replace(MigrationState::Completed { stats: stats.clone() });
            }
            Err(e) => {
                warn!("[migrate] Migration failed: {e}");
                self.state_tx.send_replace(MigrationState::Failed { message: e.to_string() });
            }
        }
        result
    }

    async fn run_steps(&self, user_id: &str) -> GraphResult<MigrationStats> {
        let mut stats = MigrationStats::default();

        for (step, kind) in MIGRATION_ORDER.into_iter().enumerate() {
            self.publish(step, kind.as_str(), &format!("Migrating {}", kind.as_str()));

            let records = self.primary.all_records(kind, user_id).await?;
            info!("[migrate] Loading {} {} records", records.len(), kind.as_str());
            for record in records {
                let (embedding, embedding_model) = match self.embed(&record.text).await {
                    Some((v, m)) => (Some(v), Some(m)),
                    None => (None, None),
                };
                self.store.create_node(&GraphNode {
                    id: record.id.clone(),
                    kind,
                    user_id: record.user_id.clone(),
                    content: record.text.clone(),
                    timestamp_ms: record.timestamp_ms,
                    props: record.props.clone(),
                    embedding,
                    embedding_model,
                })?;
                stats.nodes_created += 1;
                if kind == NodeKind::AtomicThought {
                    stats.thoughts_created += 1;
                }
                stats.relationships_created += link_structural(&self.store, kind, &record)?;
            }
        }

        // Final step: report the connection count so the completed state
        // reflects the whole graph, then make the WAL durable.
        self.publish(MIGRATION_ORDER.len(), "connections", "Counting connections");
        let edge_count = self.store.count_edges()?;
        info!("[migrate] Graph holds {edge_count} connections after bulk load");
        if let Err(e) = self.store.checkpoint() {
            warn!("[migrate] Checkpoint failed (data remains valid in the WAL): {e}");
        }

        Ok(stats)
    }

    async fn embed(&self, text: &str) -> Option<(Vec<f32>, String)> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(text, EmbeddingInput::Document).await {
            Ok(v) => Some((v, embedder.model_version().to_string())),
            Err(e) => {
                warn!("[migrate] Embedding failed, storing without vector: {e}");
                None
            }
        }
    }

    fn publish(&self, step: usize, name: &str, message: &str) {
        self.state_tx.send_replace(MigrationState::InProgress {
            step: name.to_string(),
            progress: step as f32 / TOTAL_STEPS as f32,
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{RecordLinks, SourceRecord};
    use crate::engine::settings::GraphSettings;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockPrimary {
        records: Mutex<HashMap<NodeKind, Vec<SourceRecord>>>,
    }

    impl MockPrimary {
        fn put(&self, kind: NodeKind, record: SourceRecord) {
            self.records.lock().entry(kind).or_default().push(record);
        }
    }

    #[async_trait]
    impl PrimaryStore for MockPrimary {
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

        async fn all_records(
            &self,
            kind: NodeKind,
            user_id: &str,
        ) -> GraphResult<Vec<SourceRecord>> {
            self.records_modified_since(kind, user_id, i64::MIN).await
        }
    }

    fn record(id: &str, text: &str, ts: i64) -> SourceRecord {
        SourceRecord {
            id: id.into(),
            user_id: "u1".into(),
            text: text.into(),
            timestamp_ms: ts,
            props: json!({}),
            links: RecordLinks::default(),
        }
    }

    #[tokio::test]
    async fn bulk_load_links_provenance_and_sets_flag() {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        let primary = Arc::new(MockPrimary::default());
        primary.put(NodeKind::JournalEntry, record("j1", "went climbing", 100));
        let mut thought = record("t1", "climbing brings me joy", 100);
        thought.links.journal_entry_id = Some("j1".into());
        primary.put(NodeKind::AtomicThought, thought);

        let settings = Arc::new(GraphSettings::new(store.clone()));
        let engine = MigrationEngine::new(store.clone(), primary, None, settings.clone());
        let stats = engine.run("u1").await.unwrap();

        assert_eq!(stats.nodes_created, 2);
        assert_eq!(stats.thoughts_created, 1);
        assert_eq!(stats.relationships_created, 1);
        assert!(settings.migration_complete().unwrap());

        let state = engine.subscribe().borrow().clone();
        assert!(matches!(state, MigrationState::Completed { .. }));
    }

    #[tokio::test]
    async fn completed_migration_does_not_rerun() {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        let primary = Arc::new(MockPrimary::default());
        primary.put(NodeKind::JournalEntry, record("j1", "entry", 100));

        let settings = Arc::new(GraphSettings::new(store.clone()));
        settings.set_migration_complete(true).unwrap();

        let engine = MigrationEngine::new(store.clone(), primary, None, settings);
        let stats = engine.run("u1").await.unwrap();
        assert_eq!(stats.nodes_created, 0);
        assert_eq!(store.count_nodes(NodeKind::JournalEntry).unwrap(), 0);
    }

    #[tokio::test]
    async fn summary_links_to_journal_entries_in_range() {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        let primary = Arc::new(MockPrimary::default());
        primary.put(NodeKind::JournalEntry, record("j1", "monday", 1_000));
        primary.put(NodeKind::JournalEntry, record("j2", "friday", 5_000));
        primary.put(NodeKind::JournalEntry, record("j3", "next month", 50_000));
        let mut summary = record("s1", "a good week", 6_000);
        summary.links.date_range_ms = Some((0, 10_000));
        primary.put(NodeKind::Summary, summary);

        let settings = Arc::new(GraphSettings::new(store.clone()));
        let engine = MigrationEngine::new(store.clone(), primary, None, settings);
        engine.run("u1").await.unwrap();

        let mut targets =
            store.edge_targets(crate::atoms::types::EdgeKind::Summarizes, "s1").unwrap();
        targets.sort();
        assert_eq!(targets, vec!["j1", "j2"]);
    }
}
