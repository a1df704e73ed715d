// ── Retrieval Engine ───────────────────────────────────────────────────────
//
// Hybrid context retrieval: vector + keyword candidate fetches per entity
// kind, merged by id, scored through engine::scoring, capped per kind, plus
// the people/topic graph context around the retrieved journal entries.
//
// Degradation ladder:
//   - query embedding fails  → keyword-only mode across all kinds
//   - zero query keywords    → keyword-dependent kinds come back empty
//   - any sub-query fails    → that source yields an empty list, never an
//                              error to the caller
//
// Ranking ties break by id ascending so results are stable under test.

use crate::atoms::constants::{
    ALL_GOALS_LIMIT, ALL_TASKS_LIMIT, DEFAULT_FALLBACK_SCORE, GOAL_CAP, GOAL_FETCH_K,
    GOAL_LINKED_THOUGHT_SCORE, JOURNAL_CAP, JOURNAL_FETCH_K, NOTE_CAP, NOTE_FETCH_K, PEOPLE_CAP,
    RECENT_NOTES_LIMIT, THOUGHT_CAP, THOUGHT_FETCH_K, TOPIC_CAP,
};
use crate::atoms::error::GraphResult;
use crate::atoms::traits::EmbeddingProvider;
use crate::atoms::types::{
    EmbeddingInput, NodeKind, RetrievalOptions, RetrievedContext, ScoredItem,
};
use crate::engine::scoring;
use crate::engine::store::{GraphStore, NodeRow};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

pub struct ContextRetriever {
    store: Arc<GraphStore>,
    /// `None` when no embedding provider is configured; retrieval then runs
    /// permanently in keyword-only mode.
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

/// A candidate after the vector/keyword union-merge, before final scoring.
struct Candidate {
    row: NodeRow,
    vector: f64,
    keyword: f64,
}

impl ContextRetriever {
    pub fn new(store: Arc<GraphStore>, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self { store, embedder }
    }

    /// Build the bounded context bundle for one query.
    pub async fn retrieve_context(
        &self,
        user_id: &str,
        query: &str,
        options: RetrievalOptions,
    ) -> GraphResult<RetrievedContext> {
        let keywords = scoring::extract_keywords(query);
        let now_ms = chrono::Utc::now().timestamp_millis();

        let query_embedding = match &self.embedder {
            Some(embedder) => match embedder.embed(query, EmbeddingInput::Query).await {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("[retrieval] Query embedding failed, degrading to keyword-only: {e}");
                    None
                }
            },
            None => None,
        };

        let mut ctx = RetrievedContext::default();

        match &query_embedding {
            Some(embedding) => {
                if options.journal {
                    ctx.journal_entries =
                        self.or_empty("journal", self.journal_hybrid(user_id, embedding, &keywords, now_ms));
                }
                if options.thoughts {
                    ctx.thoughts =
                        self.or_empty("thoughts", self.thoughts_hybrid(user_id, embedding, &keywords));
                }
                if options.goals {
                    ctx.goals =
                        self.or_empty("goals", self.goals_vector(user_id, embedding, &keywords));
                }
                if options.notes {
                    ctx.notes = self.or_empty(
                        "notes",
                        self.flat_hybrid(user_id, NodeKind::Note, embedding, &keywords),
                    );
                }
                if options.user_goals {
                    ctx.user_goals = self.or_empty(
                        "user goals",
                        self.flat_hybrid(user_id, NodeKind::UserGoal, embedding, &keywords),
                    );
                }
                if options.user_tasks {
                    ctx.user_tasks = self.or_empty(
                        "user tasks",
                        self.flat_hybrid(user_id, NodeKind::UserTask, embedding, &keywords),
                    );
                }
            }
            None => {
                // Keyword-only mode. With zero keywords every keyword-driven
                // source stays empty rather than returning everything.
                if !keywords.is_empty() {
                    if options.journal {
                        ctx.journal_entries = self.or_empty(
                            "journal",
                            self.journal_keyword_only(user_id, &keywords, now_ms),
                        );
                    }
                    if options.thoughts {
                        ctx.thoughts = self.or_empty(
                            "thoughts",
                            self.keyword_only(user_id, NodeKind::AtomicThought, &keywords, THOUGHT_FETCH_K, THOUGHT_CAP, None),
                        );
                    }
                    if options.goals {
                        ctx.goals = self.or_empty(
                            "goals",
                            self.keyword_only(user_id, NodeKind::Goal, &keywords, GOAL_FETCH_K, GOAL_CAP, Some("active")),
                        );
                    }
                    if options.notes {
                        ctx.notes = self.or_empty(
                            "notes",
                            self.keyword_only(user_id, NodeKind::Note, &keywords, NOTE_FETCH_K, NOTE_CAP, None),
                        );
                    }
                    if options.user_goals {
                        ctx.user_goals = self.or_empty(
                            "user goals",
                            self.keyword_only(user_id, NodeKind::UserGoal, &keywords, NOTE_FETCH_K, NOTE_CAP, None),
                        );
                    }
                    if options.user_tasks {
                        ctx.user_tasks = self.or_empty(
                            "user tasks",
                            self.keyword_only(user_id, NodeKind::UserTask, &keywords, NOTE_FETCH_K, NOTE_CAP, None),
                        );
                    }
                }
            }
        }

        // Graph context around whichever journal entries made the cut.
        let journal_ids: Vec<String> =
            ctx.journal_entries.iter().map(|item| item.id.clone()).collect();
        ctx.people =
            self.or_empty("people", self.store.people_for_documents(&journal_ids, PEOPLE_CAP));
        ctx.topics =
            self.or_empty("topics", self.store.topics_for_documents(&journal_ids, TOPIC_CAP));

        ctx.query_embedding = query_embedding;

        debug!(
            "[retrieval] Context for user {}: {} journal, {} thoughts, {} goals, {} notes, {} user goals, {} user tasks, {} people, {} topics",
            user_id,
            ctx.journal_entries.len(),
            ctx.thoughts.len(),
            ctx.goals.len(),
            ctx.notes.len(),
            ctx.user_goals.len(),
            ctx.user_tasks.len(),
            ctx.people.len(),
            ctx.topics.len(),
        );
        Ok(ctx)
    }

    // ── Unscored retrieve-all accessors ────────────────────────────────

    /// Every active user goal, priority-ordered. Callers that must always
    /// see current obligations use these instead of scored retrieval.
    pub fn all_active_goals(&self, user_id: &str) -> GraphResult<Vec<ScoredItem>> {
        let rows =
            self.store.list_with_status(user_id, NodeKind::UserGoal, "active", ALL_GOALS_LIMIT)?;
        Ok(rows.into_iter().map(|r| item(r, DEFAULT_FALLBACK_SCORE)).collect())
    }

    /// Every pending user task, priority-ordered.
    pub fn all_pending_tasks(&self, user_id: &str) -> GraphResult<Vec<ScoredItem>> {
        let rows =
            self.store.list_with_status(user_id, NodeKind::UserTask, "pending", ALL_TASKS_LIMIT)?;
        Ok(rows.into_iter().map(|r| item(r, DEFAULT_FALLBACK_SCORE)).collect())
    }

    /// Most recent notes, newest first.
    pub fn recent_notes(&self, user_id: &str) -> GraphResult<Vec<ScoredItem>> {
        let rows = self.store.list_recent(user_id, NodeKind::Note, RECENT_NOTES_LIMIT)?;
        Ok(rows.into_iter().map(|r| item(r, DEFAULT_FALLBACK_SCORE)).collect())
    }

    // ── Hybrid per-kind fetches ────────────────────────────────────────

    fn journal_hybrid(
        &self,
        user_id: &str,
        embedding: &[f32],
        keywords: &[String],
        now_ms: i64,
    ) -> GraphResult<Vec<ScoredItem>> {
        let merged = self.union_merge(user_id, NodeKind::JournalEntry, embedding, keywords, JOURNAL_FETCH_K, None)?;
        let mut scored: Vec<ScoredItem> = merged
            .into_iter()
            .map(|c| {
                let recency = scoring::recency_score(c.row.timestamp_ms, now_ms);
                // Graph signal reserved at 0 until a live source exists.
                let score = scoring::combined_score(c.vector, c.keyword, 0.0, recency);
                item(c.row, score)
            })
            .collect();
        rank(&mut scored);
        scored.truncate(JOURNAL_CAP);
        Ok(scored)
    }

    fn thoughts_hybrid(
        &self,
        user_id: &str,
        embedding: &[f32],
        keywords: &[String],
    ) -> GraphResult<Vec<ScoredItem>> {
        let merged =
            self.union_merge(user_id, NodeKind::AtomicThought, embedding, keywords, THOUGHT_FETCH_K, None)?;
        let mut scored: Vec<ScoredItem> = merged
            .into_iter()
            .map(|c| item(c.row, scoring::blended_score(c.vector, c.keyword)))
            .collect();
        rank(&mut scored);
        scored.truncate(THOUGHT_CAP);

        // Backfill: thoughts whose provenance leads to an active goal, a
        // pending task or a note still surface even without embeddings.
        if scored.len() < THOUGHT_CAP {
            let linked = [
                ("UserGoal", Some("active"), GOAL_LINKED_THOUGHT_SCORE),
                ("UserTask", Some("pending"), DEFAULT_FALLBACK_SCORE),
                ("Note", None, DEFAULT_FALLBACK_SCORE),
            ];
            for (src_kind, status, default_score) in linked {
                if scored.len() >= THOUGHT_CAP {
                    break;
                }
                let rows =
                    self.store.thoughts_linked_to(user_id, src_kind, status, THOUGHT_CAP)?;
                for row in rows {
                    if scored.len() >= THOUGHT_CAP {
                        break;
                    }
                    if scored.iter().any(|s| s.id == row.id) {
                        continue;
                    }
                    scored.push(item(row, default_score));
                }
            }
        }
        Ok(scored)
    }

    /// AI-derived goals: vector-only over active goals.
    fn goals_vector(
        &self,
        user_id: &str,
        embedding: &[f32],
        keywords: &[String],
    ) -> GraphResult<Vec<ScoredItem>> {
        let hits = self.store.vector_candidates(
            user_id,
            NodeKind::Goal,
            embedding,
            GOAL_FETCH_K,
            Some("active"),
        )?;
        let mut scored: Vec<ScoredItem> = hits
            .into_iter()
            .map(|(row, v)| {
                let k = scoring::keyword_score(keywords, &row.content);
                item(row, scoring::blended_score(v, k))
            })
            .collect();
        rank(&mut scored);
        scored.truncate(GOAL_CAP);
        Ok(scored)
    }

    /// Notes / user goals / user tasks share one shape: hybrid merge, with
    /// an unscored obligation listing when the vector branch finds nothing.
    fn flat_hybrid(
        &self,
        user_id: &str,
        kind: NodeKind,
        embedding: &[f32],
        keywords: &[String],
    ) -> GraphResult<Vec<ScoredItem>> {
        let vector_hits =
            self.store.vector_candidates(user_id, kind, embedding, NOTE_FETCH_K, None)?;

        if vector_hits.is_empty() {
            // Embeddings missing wholesale (e.g. pre-migration data). Fall
            // back to the qualifying listing so obligations stay visible.
            let rows = match kind {
                NodeKind::UserGoal => {
                    self.store.list_with_status(user_id, kind, "active", NOTE_CAP)?
                }
                NodeKind::UserTask => {
                    self.store.list_with_status(user_id, kind, "pending", NOTE_CAP)?
                }
                _ => self.store.list_recent(user_id, kind, NOTE_CAP)?,
            };
            return Ok(rows.into_iter().map(|r| item(r, DEFAULT_FALLBACK_SCORE)).collect());
        }

        let keyword_rows = self.store.keyword_candidates(user_id, kind, keywords, NOTE_FETCH_K)?;
        let merged = merge_candidates(vector_hits, keyword_rows, keywords);
        let mut scored: Vec<ScoredItem> = merged
            .into_iter()
            .map(|c| item(c.row, scoring::blended_score(c.vector, c.keyword)))
            .collect();
        rank(&mut scored);
        scored.truncate(NOTE_CAP);
        Ok(scored)
    }

    // ── Keyword-only fetches ───────────────────────────────────────────

    fn journal_keyword_only(
        &self,
        user_id: &str,
        keywords: &[String],
        now_ms: i64,
    ) -> GraphResult<Vec<ScoredItem>> {
        let rows =
            self.store.keyword_candidates(user_id, NodeKind::JournalEntry, keywords, JOURNAL_FETCH_K)?;
        let mut scored: Vec<ScoredItem> = rows
            .into_iter()
            .map(|row| {
                let k = scoring::keyword_score(keywords, &row.content);
                let r = scoring::recency_score(row.timestamp_ms, now_ms);
                item(row, scoring::fallback_score(k, r))
            })
            .collect();
        rank(&mut scored);
        scored.truncate(JOURNAL_CAP);
        Ok(scored)
    }

    fn keyword_only(
        &self,
        user_id: &str,
        kind: NodeKind,
        keywords: &[String],
        fetch_k: usize,
        cap: usize,
        status: Option<&str>,
    ) -> GraphResult<Vec<ScoredItem>> {
        let rows = self.store.keyword_candidates(user_id, kind, keywords, fetch_k)?;
        let mut scored: Vec<ScoredItem> = rows
            .into_iter()
            .filter(|row| match status {
                Some(s) => row.props.get("status").and_then(|v| v.as_str()) == Some(s),
                None => true,
            })
            .map(|row| {
                let k = scoring::keyword_score(keywords, &row.content);
                item(row, k)
            })
            .collect();
        rank(&mut scored);
        scored.truncate(cap);
        Ok(scored)
    }

    // ── Plumbing ───────────────────────────────────────────────────────

    fn union_merge(
        &self,
        user_id: &str,
        kind: NodeKind,
        embedding: &[f32],
        keywords: &[String],
        fetch_k: usize,
        status: Option<&str>,
    ) -> GraphResult<Vec<Candidate>> {
        let vector_hits =
            self.store.vector_candidates(user_id, kind, embedding, fetch_k, status)?;
        let keyword_rows = self.store.keyword_candidates(user_id, kind, keywords, fetch_k)?;
        Ok(merge_candidates(vector_hits, keyword_rows, keywords))
    }

    /// Per-source silent degradation: a failing sub-query logs and yields an
    /// empty list instead of aborting the whole retrieval.
    fn or_empty<T>(&self, source: &str, result: GraphResult<Vec<T>>) -> Vec<T> {
        match result {
            Ok(items) => items,
            Err(e) => {
                warn!("[retrieval] {source} fetch failed, returning empty: {e}");
                Vec::new()
            }
        }
    }
}

/// Union-merge vector and keyword candidate sets by id. A candidate found by
/// both branches carries both scores; keyword-only candidates get vector 0.
fn merge_candidates(
    vector_hits: Vec<(NodeRow, f64)>,
    keyword_rows: Vec<NodeRow>,
    keywords: &[String],
) -> Vec<Candidate> {
    let mut by_id: HashMap<String, Candidate> = HashMap::new();
    for (row, v) in vector_hits {
        let k = scoring::keyword_score(keywords, &row.content);
        by_id.insert(row.id.clone(), Candidate { row, vector: v, keyword: k });
    }
    for row in keyword_rows {
        if by_id.contains_key(&row.id) {
            continue;
        }
        let k = scoring::keyword_score(keywords, &row.content);
        by_id.insert(row.id.clone(), Candidate { row, vector: 0.0, keyword: k });
    }
    by_id.into_values().collect()
}

fn item(row: NodeRow, score: f64) -> ScoredItem {
    ScoredItem {
        id: row.id,
        content: row.content,
        score,
        timestamp_ms: row.timestamp_ms,
        props: row.props,
    }
}

/// Sort descending by score with an id-ascending tiebreak.
fn rank(items: &mut [ScoredItem]) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}
