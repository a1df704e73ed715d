// ── Sync/Upsert Engine ─────────────────────────────────────────────────────
//
// Incremental primary-store → graph synchronization. Per entity kind, in a
// fixed order: read the watermark, fetch records modified after it, re-embed
// and upsert each, derive the kind's structural edges, run extraction over
// newly created content, then advance the watermark. After all kinds:
// deletion reconciliation, orphan-thought cleanup, checkpoint.
//
// Error policy: per-record failures are logged and skipped; they never abort
// the batch. A failing record therefore stays behind an advanced watermark
// and will not be retried — known risk, see DESIGN.md. Primary-store
// unreachability and settings failures abort the whole pass.

use crate::atoms::constants::{APP_WINDOW_DAYS, MS_PER_DAY};
use crate::atoms::error::GraphResult;
use crate::atoms::traits::{EmbeddingProvider, PrimaryStore, SettingsStore, ThoughtExtractor};
use crate::atoms::types::{
    EdgeKind, EmbeddingInput, GraphNode, KindSyncStats, NodeKind, SourceRecord, SyncState,
    SyncStats, UpsertOutcome,
};
use crate::engine::store::GraphStore;
use log::{debug, info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;

pub struct SyncEngine {
    store: Arc<GraphStore>,
    primary: Arc<dyn PrimaryStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    extractor: Option<Arc<dyn ThoughtExtractor>>,
    settings: Arc<dyn SettingsStore>,
    state_tx: watch::Sender<SyncState>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<GraphStore>,
        primary: Arc<dyn PrimaryStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        extractor: Option<Arc<dyn ThoughtExtractor>>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::NotStarted);
        Self { store, primary, embedder, extractor, settings, state_tx }
    }

    /// Subscribe to sync progress (UI polling surface).
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    /// Sync runs only once the bulk migration has completed AND auto-sync is
    /// switched on.
    pub fn is_sync_enabled(&self) -> GraphResult<bool> {
        Ok(self.settings.migration_complete()? && self.settings.auto_sync_enabled()?)
    }

    /// One full incremental pass over every synced entity kind.
    pub async fn perform_incremental_sync(&self, user_id: &str) -> GraphResult<SyncStats> {
        if !self.is_sync_enabled()? {
            debug!("[sync] Sync disabled (migration incomplete or auto-sync off), skipping");
            return Ok(SyncStats::default());
        }

        let result = self.run_pass(user_id).await;
        match &result {
            Ok(stats) => {
                info!(
                    "[sync] Pass complete: {} created, {} updated, {} thoughts, {} relationships, {} deleted",
                    stats.created_total(),
                    stats.updated_total(),
                    stats.thoughts_created,
                    stats.relationships_created,
                    stats.nodes_deleted
                );
                self.state_tx.send_replace(SyncState::Completed { stats: stats.clone() });
            }
            Err(e) => {
                warn!("[sync] Pass failed: {e}");
                self.state_tx.send_replace(SyncState::Failed { message: e.to_string() });
            }
        }
        result
    }

    async fn run_pass(&self, user_id: &str) -> GraphResult<SyncStats> {
        let mut stats = SyncStats::default();

        for kind in NodeKind::SYNC_ORDER {
            self.state_tx.send_replace(SyncState::InProgress {
                step: kind.as_str().to_string(),
                message: format!("Syncing {}", kind.as_str()),
            });

            let watermark = self.settings.watermark(kind)?;
            let records = self.primary.records_modified_since(kind, user_id, watermark).await?;
            if records.is_empty() {
                continue;
            }
            debug!("[sync] {}: {} records modified since {watermark}", kind.as_str(), records.len());

            let mut kind_stats = KindSyncStats { kind: kind.as_str().to_string(), ..Default::default() };
            let mut max_ts = watermark;
            for record in records {
                match self.process_record(kind, &record, &mut stats).await {
                    Ok(UpsertOutcome::Created) => {
                        kind_stats.created += 1;
                        max_ts = max_ts.max(record.timestamp_ms);
                    }
                    Ok(UpsertOutcome::Updated) => {
                        kind_stats.updated += 1;
                        max_ts = max_ts.max(record.timestamp_ms);
                    }
                    Err(e) => {
                        // Skipped records stay behind the advanced watermark.
                        warn!("[sync] Skipping {} record {}: {e}", kind.as_str(), record.id);
                    }
                }
            }
            if max_ts > watermark {
                self.settings.set_watermark(kind, max_ts)?;
            }
            if kind_stats.created > 0 || kind_stats.updated > 0 {
                stats.per_kind.push(kind_stats);
            }
        }

        self.state_tx.send_replace(SyncState::InProgress {
            step: "deletions".to_string(),
            message: "Reconciling deletions".to_string(),
        });
        stats.nodes_deleted = self.reconcile_deletions(user_id).await?;
        stats.nodes_deleted += self.cleanup_orphan_thoughts(user_id)?;

        if let Err(e) = self.store.checkpoint() {
            warn!("[sync] Checkpoint failed (data remains valid in the WAL): {e}");
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        self.settings.set_last_checked(now_ms)?;
        if !stats.is_empty() {
            self.settings.set_last_synced(now_ms)?;
        }
        Ok(stats)
    }

    // ── Single-record entry points (post-write low-latency path) ───────

    pub async fn sync_journal_entry(&self, record: SourceRecord) -> GraphResult<UpsertOutcome> {
        self.sync_single(NodeKind::JournalEntry, record).await
    }

    pub async fn sync_note(&self, record: SourceRecord) -> GraphResult<UpsertOutcome> {
        self.sync_single(NodeKind::Note, record).await
    }

    pub async fn sync_user_goal(&self, record: SourceRecord) -> GraphResult<UpsertOutcome> {
        self.sync_single(NodeKind::UserGoal, record).await
    }

    pub async fn sync_user_task(&self, record: SourceRecord) -> GraphResult<UpsertOutcome> {
        self.sync_single(NodeKind::UserTask, record).await
    }

    /// Same upsert + relationship + extraction steps as the batch path for
    /// exactly one record; watermarks are untouched.
    async fn sync_single(&self, kind: NodeKind, record: SourceRecord) -> GraphResult<UpsertOutcome> {
        let mut stats = SyncStats::default();
        let outcome = self.process_record(kind, &record, &mut stats).await?;
        debug!("[sync] Single-record sync for {} {}: {:?}", kind.as_str(), record.id, outcome);
        Ok(outcome)
    }

    // ── Record processing ──────────────────────────────────────────────

    async fn process_record(
        &self,
        kind: NodeKind,
        record: &SourceRecord,
        stats: &mut SyncStats,
    ) -> GraphResult<UpsertOutcome> {
        let (embedding, embedding_model) = match self.embed_document(&record.text).await {
            Some((v, m)) => (Some(v), Some(m)),
            None => (None, None),
        };

        let outcome = self.store.upsert_node(&GraphNode {
            id: record.id.clone(),
            kind,
            user_id: record.user_id.clone(),
            content: record.text.clone(),
            timestamp_ms: record.timestamp_ms,
            props: record.props.clone(),
            embedding,
            embedding_model,
        })?;

        stats.relationships_created += link_structural(&self.store, kind, record)?;

        if outcome == UpsertOutcome::Created && kind.extractable() {
            self.run_extraction(kind, record, stats).await;
        }
        Ok(outcome)
    }

    /// Regenerate the document embedding. Failure means the record is stored
    /// without a vector — still keyword-searchable, never a sync failure.
    async fn embed_document(&self, text: &str) -> Option<(Vec<f32>, String)> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(text, EmbeddingInput::Document).await {
            Ok(v) => Some((v, embedder.model_version().to_string())),
            Err(e) => {
                warn!("[sync] Embedding failed, storing without vector: {e}");
                None
            }
        }
    }

    /// Derive thought/person/topic nodes from new content. Every failure in
    /// here is soft: no extraction means no derived nodes, not a sync error.
    async fn run_extraction(&self, kind: NodeKind, record: &SourceRecord, stats: &mut SyncStats) {
        let Some(extractor) = self.extractor.as_ref() else { return };
        match self.settings.extractor_key_present() {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!("[sync] Could not read extractor-key flag, skipping extraction: {e}");
                return;
            }
        }

        let extraction = match extractor.extract(&record.text, kind.as_str()).await {
            Ok(x) => x,
            Err(e) => {
                warn!("[sync] Extraction failed for {}: {e}", record.id);
                return;
            }
        };

        for thought in &extraction.thoughts {
            let thought_id = uuid::Uuid::new_v4().to_string();
            let (embedding, embedding_model) = match self.embed_document(&thought.content).await {
                Some((v, m)) => (Some(v), Some(m)),
                None => (None, None),
            };
            let created = self
                .store
                .upsert_node(&GraphNode {
                    id: thought_id.clone(),
                    kind: NodeKind::AtomicThought,
                    user_id: record.user_id.clone(),
                    content: thought.content.clone(),
                    timestamp_ms: record.timestamp_ms,
                    props: json!({
                        "thought_type": thought.thought_type,
                        "confidence": thought.confidence,
                        "sentiment": thought.sentiment,
                        "importance": thought.importance,
                    }),
                    embedding,
                    embedding_model,
                })
                .and_then(|_| {
                    self.store.merge_edge(
                        EdgeKind::ExtractedFrom,
                        &thought_id,
                        &record.id,
                        json!({ "confidence": thought.confidence }),
                    )
                });
            match created {
                Ok(()) => {
                    stats.thoughts_created += 1;
                    stats.relationships_created += 1;
                }
                Err(e) => warn!("[sync] Failed to store extracted thought: {e}"),
            }
        }

        for person in &extraction.people {
            let result = self
                .store
                .upsert_person(
                    &record.user_id,
                    &person.name,
                    person.relationship.as_deref(),
                    person.sentiment.map(f64::from),
                    record.timestamp_ms,
                )
                .and_then(|person_id| {
                    self.store.merge_edge(
                        EdgeKind::Mentions,
                        &record.id,
                        &person_id,
                        json!({ "sentiment": person.sentiment }),
                    )
                });
            match result {
                Ok(()) => stats.relationships_created += 1,
                Err(e) => warn!("[sync] Failed to merge person {}: {e}", person.name),
            }
        }

        for topic in &extraction.topics {
            let result = self
                .store
                .upsert_topic(
                    &record.user_id,
                    &topic.name,
                    topic.category.as_deref(),
                    f64::from(topic.relevance),
                    record.timestamp_ms,
                )
                .and_then(|topic_id| {
                    self.store.merge_edge(
                        EdgeKind::About,
                        &record.id,
                        &topic_id,
                        json!({ "relevance": topic.relevance }),
                    )
                });
            match result {
                Ok(()) => stats.relationships_created += 1,
                Err(e) => warn!("[sync] Failed to merge topic {}: {e}", topic.name),
            }
        }
    }

    // ── Deletion reconciliation ────────────────────────────────────────

    /// Remove graph nodes whose source record no longer exists: per kind,
    /// diff the primary store's live-id set against the graph's.
    async fn reconcile_deletions(&self, user_id: &str) -> GraphResult<usize> {
        let mut deleted = 0;
        for kind in NodeKind::SYNC_ORDER {
            let live: std::collections::HashSet<String> =
                self.primary.all_ids(kind, user_id).await?.into_iter().collect();
            let graph_ids = self.store.node_ids(user_id, kind)?;
            for id in graph_ids {
                if live.contains(&id) {
                    continue;
                }
                match self.store.detach_delete(&id) {
                    Ok(()) => deleted += 1,
                    Err(e) => warn!("[sync] Failed to delete orphan {} {id}: {e}", kind.as_str()),
                }
            }
        }
        if deleted > 0 {
            info!("[sync] Deletion reconciliation removed {deleted} nodes");
        }
        Ok(deleted)
    }

    /// Delete AtomicThoughts whose extraction provenance is gone entirely
    /// (source deleted). Individual failures are logged and skipped.
    fn cleanup_orphan_thoughts(&self, user_id: &str) -> GraphResult<usize> {
        let mut deleted = 0;
        for id in self.store.orphan_thought_ids(user_id)? {
            match self.store.detach_delete(&id) {
                Ok(()) => deleted += 1,
                Err(e) => warn!("[sync] Failed to delete orphan thought {id}: {e}"),
            }
        }
        Ok(deleted)
    }
}

/// Structural edges implied by a record's link hints. Shared with the bulk
/// migration path. Returns the number of edges written.
pub(crate) fn link_structural(
    store: &GraphStore,
    kind: NodeKind,
    record: &SourceRecord,
) -> GraphResult<usize> {
    let mut count = 0;
    match kind {
        NodeKind::UserTask => {
            if let Some(goal_id) = &record.links.goal_id {
                store.merge_edge(EdgeKind::LinkedToGoal, &record.id, goal_id, json!({}))?;
                count += 1;
            }
        }
        NodeKind::AgendaItem => {
            if let Some(entry_id) = &record.links.journal_entry_id {
                store.merge_edge(EdgeKind::CapturedFrom, &record.id, entry_id, json!({}))?;
                count += 1;
            }
        }
        NodeKind::AtomicThought => {
            // Migration path: primary-store thoughts carry their provenance.
            if let Some(entry_id) = &record.links.journal_entry_id {
                store.merge_edge(EdgeKind::ExtractedFrom, &record.id, entry_id, json!({}))?;
                count += 1;
            }
        }
        NodeKind::Summary => {
            if let Some((start_ms, end_ms)) = record.links.date_range_ms {
                for entry_id in store.journal_ids_in_range(&record.user_id, start_ms, end_ms)? {
                    store.merge_edge(EdgeKind::Summarizes, &record.id, &entry_id, json!({}))?;
                    count += 1;
                }
            }
        }
        NodeKind::DailyApp => {
            let window_start = record.timestamp_ms - APP_WINDOW_DAYS * MS_PER_DAY;
            for entry_id in
                store.journal_ids_in_range(&record.user_id, window_start, record.timestamp_ms)?
            {
                store.merge_edge(EdgeKind::GeneratedFrom, &record.id, &entry_id, json!({}))?;
                count += 1;
            }
        }
        _ => {}
    }
    Ok(count)
}
