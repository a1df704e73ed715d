// Edge operations and Person/Topic entity merges.
//
// Edge writes are merge-semantics: the (kind, src, dst) composite key makes a
// re-issued write update attributes in place instead of duplicating the edge.
// Person/Topic merges branch on create vs match: create seeds the counters,
// match increments the mention count and only ever moves the last-mention
// timestamp forward.

use super::nodes::entity_key;
use super::GraphStore;
use crate::atoms::error::{GraphError, GraphResult};
use crate::atoms::types::{EdgeKind, PersonMention, TopicMention};
use rusqlite::{params, OptionalExtension};

/// A Person or Topic row.
#[derive(Debug, Clone)]
pub struct EntityRow {
    pub id: String,
    pub name: String,
    pub relationship: Option<String>,
    pub category: Option<String>,
    pub mention_count: i64,
    pub sentiment_total: f64,
    pub relevance_total: f64,
    pub first_seen_ms: i64,
    pub last_mentioned_ms: i64,
}

impl GraphStore {
    // ── Edges ──────────────────────────────────────────────────────────

    /// Idempotent edge write: same (kind, src, dst) updates attributes,
    /// never duplicates.
    pub fn merge_edge(
        &self,
        kind: EdgeKind,
        src_id: &str,
        dst_id: &str,
        props: serde_json::Value,
    ) -> GraphResult<()> {
        let conn = self.conn.lock();
        let props = serde_json::to_string(&props)?;
        conn.execute(
            "INSERT INTO edges (kind, src_id, dst_id, props) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(kind, src_id, dst_id) DO UPDATE SET props = excluded.props",
            params![kind.as_str(), src_id, dst_id, props],
        )
        .map_err(|e| GraphError::statement("merge edge", e))?;
        Ok(())
    }

    /// Destination ids of all edges of `kind` leaving `src_id`.
    pub fn edge_targets(&self, kind: EdgeKind, src_id: &str) -> GraphResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT dst_id FROM edges WHERE kind = ?1 AND src_id = ?2")
            .map_err(|e| GraphError::statement("edge target scan", e))?;
        let ids = stmt
            .query_map(params![kind.as_str(), src_id], |row| row.get::<_, String>(0))
            .map_err(|e| GraphError::statement("edge target scan", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    // ── Provenance queries ─────────────────────────────────────────────

    /// AtomicThought ids with no extraction-provenance edge to any source.
    /// Eligible for cleanup once their origin is gone.
    pub fn orphan_thought_ids(&self, user_id: &str) -> GraphResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT t.id FROM nodes t
                 WHERE t.user_id = ?1 AND t.kind = 'AtomicThought'
                   AND NOT EXISTS (
                       SELECT 1 FROM edges e
                       WHERE e.kind = 'EXTRACTED_FROM' AND e.src_id = t.id
                   )",
            )
            .map_err(|e| GraphError::statement("orphan thought scan", e))?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))
            .map_err(|e| GraphError::statement("orphan thought scan", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    /// Thoughts linked by extraction provenance to source nodes of `src_kind`,
    /// optionally restricted to sources carrying `props.status = status`.
    /// Surfaces obligation-linked thoughts even when they have no embedding.
    pub fn thoughts_linked_to(
        &self,
        user_id: &str,
        src_kind: &str,
        status: Option<&str>,
        limit: usize,
    ) -> GraphResult<Vec<super::NodeRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT t.id, t.content, t.timestamp_ms, t.props, t.embedding, t.embedding_model
                 FROM nodes t
                 JOIN edges e ON e.src_id = t.id AND e.kind = 'EXTRACTED_FROM'
                 JOIN nodes s ON s.id = e.dst_id
                 WHERE t.user_id = ?1 AND t.kind = 'AtomicThought'
                   AND s.kind = ?2
                   AND (?3 IS NULL OR json_extract(s.props, '$.status') = ?3)
                 ORDER BY t.timestamp_ms DESC, t.id ASC
                 LIMIT ?4",
            )
            .map_err(|e| GraphError::statement("linked thought scan", e))?;
        let rows = stmt
            .query_map(params![user_id, src_kind, status, limit as i64], |row| {
                let props_text: String = row.get(3)?;
                let blob: Option<Vec<u8>> = row.get(4)?;
                Ok(super::NodeRow {
                    id: row.get(0)?,
                    content: row.get(1)?,
                    timestamp_ms: row.get(2)?,
                    props: serde_json::from_str(&props_text).unwrap_or(serde_json::Value::Null),
                    embedding: blob.map(|b| super::nodes::bytes_to_f32_vec(&b)),
                    embedding_model: row.get(5)?,
                })
            })
            .map_err(|e| GraphError::statement("linked thought scan", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // ── Person / Topic merges ──────────────────────────────────────────

    /// Merge a person mention. Returns the stable entity id.
    pub fn upsert_person(
        &self,
        user_id: &str,
        name: &str,
        relationship: Option<&str>,
        sentiment: Option<f64>,
        now_ms: i64,
    ) -> GraphResult<String> {
        let id = entity_key("person", user_id, name);
        let conn = self.conn.lock();
        let exists: bool = conn
            .query_row("SELECT 1 FROM entities WHERE id = ?1", params![id], |_| Ok(true))
            .optional()
            .map_err(|e| GraphError::statement("check person existence", e))?
            .unwrap_or(false);

        if exists {
            // On match: bump the counters; the last-mention stamp only moves
            // forward, and a known relationship is never overwritten by NULL.
            conn.execute(
                "UPDATE entities SET
                     mention_count = mention_count + 1,
                     sentiment_total = sentiment_total + ?2,
                     last_mentioned_ms = MAX(last_mentioned_ms, ?3),
                     relationship = COALESCE(?4, relationship)
                 WHERE id = ?1",
                params![id, sentiment.unwrap_or(0.0), now_ms, relationship],
            )
            .map_err(|e| GraphError::statement("update person", e))?;
        } else {
            conn.execute(
                "INSERT INTO entities
                     (id, user_id, kind, name, relationship, mention_count,
                      sentiment_total, first_seen_ms, last_mentioned_ms)
                 VALUES (?1, ?2, 'Person', ?3, ?4, 1, ?5, ?6, ?6)",
                params![id, user_id, name.trim(), relationship, sentiment.unwrap_or(0.0), now_ms],
            )
            .map_err(|e| GraphError::statement("create person", e))?;
        }
        Ok(id)
    }

    /// Merge a topic mention. Returns the stable entity id.
    pub fn upsert_topic(
        &self,
        user_id: &str,
        name: &str,
        category: Option<&str>,
        relevance: f64,
        now_ms: i64,
    ) -> GraphResult<String> {
        let id = entity_key("topic", user_id, name);
        let conn = self.conn.lock();
        let exists: bool = conn
            .query_row("SELECT 1 FROM entities WHERE id = ?1", params![id], |_| Ok(true))
            .optional()
            .map_err(|e| GraphError::statement("check topic existence", e))?
            .unwrap_or(false);

        if exists {
            conn.execute(
                "UPDATE entities SET
                     mention_count = mention_count + 1,
                     relevance_total = relevance_total + ?2,
                     last_mentioned_ms = MAX(last_mentioned_ms, ?3),
                     category = COALESCE(?4, category)
                 WHERE id = ?1",
                params![id, relevance, now_ms, category],
            )
            .map_err(|e| GraphError::statement("update topic", e))?;
        } else {
            conn.execute(
                "INSERT INTO entities
                     (id, user_id, kind, name, category, mention_count,
                      relevance_total, first_seen_ms, last_mentioned_ms)
                 VALUES (?1, ?2, 'Topic', ?3, ?4, 1, ?5, ?6, ?6)",
                params![id, user_id, name.trim(), category, relevance, now_ms],
            )
            .map_err(|e| GraphError::statement("create topic", e))?;
        }
        Ok(id)
    }

    pub fn get_entity(&self, id: &str) -> GraphResult<Option<EntityRow>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, relationship, category, mention_count, sentiment_total,
                    relevance_total, first_seen_ms, last_mentioned_ms
             FROM entities WHERE id = ?1",
            params![id],
            |row| {
                Ok(EntityRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    relationship: row.get(2)?,
                    category: row.get(3)?,
                    mention_count: row.get(4)?,
                    sentiment_total: row.get(5)?,
                    relevance_total: row.get(6)?,
                    first_seen_ms: row.get(7)?,
                    last_mentioned_ms: row.get(8)?,
                })
            },
        )
        .optional()
        .map_err(|e| GraphError::statement("get entity", e))
    }

    // ── Graph context aggregation ──────────────────────────────────────

    /// People mentioned by the given document ids, most-mentioned first,
    /// with their average sentiment.
    pub fn people_for_documents(
        &self,
        doc_ids: &[String],
        limit: usize,
    ) -> GraphResult<Vec<PersonMention>> {
        if doc_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders: Vec<String> =
            (0..doc_ids.len()).map(|i| format!("?{}", i + 1)).collect();
        let sql = format!(
            "SELECT p.name, p.mention_count,
                    CASE WHEN p.mention_count > 0
                         THEN p.sentiment_total / p.mention_count ELSE 0 END AS avg_sentiment
             FROM entities p
             JOIN edges e ON e.dst_id = p.id AND e.kind = 'MENTIONS'
             WHERE p.kind = 'Person' AND e.src_id IN ({})
             GROUP BY p.id
             ORDER BY p.mention_count DESC, p.name ASC
             LIMIT {}",
            placeholders.join(", "),
            limit
        );
        let mut stmt =
            conn.prepare(&sql).map_err(|e| GraphError::statement("people aggregation", e))?;
        let refs: Vec<&dyn rusqlite::ToSql> =
            doc_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        let people = stmt
            .query_map(refs.as_slice(), |row| {
                Ok(PersonMention {
                    name: row.get(0)?,
                    mention_count: row.get(1)?,
                    avg_sentiment: row.get(2)?,
                })
            })
            .map_err(|e| GraphError::statement("people aggregation", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(people)
    }

    /// Topics referenced by the given document ids, highest cumulative
    /// relevance first.
    pub fn topics_for_documents(
        &self,
        doc_ids: &[String],
        limit: usize,
    ) -> GraphResult<Vec<TopicMention>> {
        if doc_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let placeholders: Vec<String> =
            (0..doc_ids.len()).map(|i| format!("?{}", i + 1)).collect();
        let sql = format!(
            "SELECT t.name, t.relevance_total, t.category
             FROM entities t
             JOIN edges e ON e.dst_id = t.id AND e.kind = 'ABOUT'
             WHERE t.kind = 'Topic' AND e.src_id IN ({})
             GROUP BY t.id
             ORDER BY t.relevance_total DESC, t.name ASC
             LIMIT {}",
            placeholders.join(", "),
            limit
        );
        let mut stmt =
            conn.prepare(&sql).map_err(|e| GraphError::statement("topic aggregation", e))?;
        let refs: Vec<&dyn rusqlite::ToSql> =
            doc_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
        let topics = stmt
            .query_map(refs.as_slice(), |row| {
                Ok(TopicMention {
                    name: row.get(0)?,
                    total_relevance: row.get(1)?,
                    category: row.get(2)?,
                })
            })
            .map_err(|e| GraphError::statement("topic aggregation", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(topics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{GraphNode, NodeKind};
    use serde_json::json;

    fn store_with_journal(id: &str) -> GraphStore {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .upsert_node(&GraphNode {
                id: id.into(),
                kind: NodeKind::JournalEntry,
                user_id: "u1".into(),
                content: "entry".into(),
                timestamp_ms: 1_000,
                props: json!({}),
                embedding: None,
                embedding_model: None,
            })
            .unwrap();
        store
    }

    #[test]
    fn merge_edge_is_idempotent() {
        let store = store_with_journal("j1");
        for _ in 0..3 {
            store
                .merge_edge(EdgeKind::Mentions, "j1", "p1", json!({"sentiment": 0.5}))
                .unwrap();
        }
        assert_eq!(store.count_edges().unwrap(), 1);
    }

    #[test]
    fn person_dedup_by_normalized_name() {
        let store = store_with_journal("j1");
        let a = store.upsert_person("u1", "Sam", None, Some(0.2), 1_000).unwrap();
        let b = store.upsert_person("u1", " sam ", Some("friend"), Some(0.4), 2_000).unwrap();
        assert_eq!(a, b);

        let row = store.get_entity(&a).unwrap().unwrap();
        assert_eq!(row.mention_count, 2);
        assert!((row.sentiment_total - 0.6).abs() < 1e-9);
        assert_eq!(row.relationship.as_deref(), Some("friend"));
        assert_eq!(row.first_seen_ms, 1_000);
        assert_eq!(row.last_mentioned_ms, 2_000);
    }

    #[test]
    fn last_mention_timestamp_never_regresses() {
        let store = store_with_journal("j1");
        let id = store.upsert_person("u1", "Sam", None, None, 5_000).unwrap();
        store.upsert_person("u1", "Sam", None, None, 1_000).unwrap();
        let row = store.get_entity(&id).unwrap().unwrap();
        assert_eq!(row.last_mentioned_ms, 5_000);
    }

    #[test]
    fn people_aggregation_is_scoped_to_documents() {
        let store = store_with_journal("j1");
        let sam = store.upsert_person("u1", "Sam", None, Some(1.0), 1_000).unwrap();
        let alex = store.upsert_person("u1", "Alex", None, Some(-1.0), 1_000).unwrap();
        store.merge_edge(EdgeKind::Mentions, "j1", &sam, json!({})).unwrap();
        // Alex is mentioned by a document we did not retrieve.
        store.merge_edge(EdgeKind::Mentions, "other", &alex, json!({})).unwrap();

        let people = store.people_for_documents(&["j1".into()], 5).unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].name, "Sam");
        assert!((people[0].avg_sentiment - 1.0).abs() < 1e-9);
    }

    #[test]
    fn orphan_scan_finds_thoughts_without_provenance() {
        let store = store_with_journal("j1");
        for (id, linked) in [("t1", true), ("t2", false)] {
            store
                .upsert_node(&GraphNode {
                    id: id.into(),
                    kind: NodeKind::AtomicThought,
                    user_id: "u1".into(),
                    content: "thought".into(),
                    timestamp_ms: 1,
                    props: json!({}),
                    embedding: None,
                    embedding_model: None,
                })
                .unwrap();
            if linked {
                store.merge_edge(EdgeKind::ExtractedFrom, id, "j1", json!({})).unwrap();
            }
        }
        let orphans = store.orphan_thought_ids("u1").unwrap();
        assert_eq!(orphans, vec!["t2".to_string()]);
    }
}
