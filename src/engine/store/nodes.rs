// Node operations: upsert/create/read/detach-delete plus the brute-force
// vector and keyword candidate scans used by the retrieval engine.
//
// The embedding is stored as a little-endian f32 BLOB alongside its model
// version; both columns are written in the same statement so a vector is
// never partially present.

use super::GraphStore;
use crate::atoms::error::{GraphError, GraphResult};
use crate::atoms::types::{GraphNode, NodeKind, UpsertOutcome};
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

/// A node row as fetched for retrieval — embedding decoded, props parsed.
#[derive(Debug, Clone)]
pub struct NodeRow {
    pub id: String,
    pub content: String,
    pub timestamp_ms: i64,
    pub props: serde_json::Value,
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
}

// ── Vector codec ───────────────────────────────────────────────────────────

/// Convert a byte slice (from a BLOB column) to a Vec<f32>.
pub(crate) fn bytes_to_f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Convert a Vec<f32> to bytes for BLOB storage.
pub fn f32_vec_to_bytes(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

// ── Stable dedup keys ──────────────────────────────────────────────────────

/// Deterministic, platform-independent dedup key for Person/Topic nodes:
/// sha256 over `{prefix}_{userId}_{normalizedName}`.
pub fn entity_key(prefix: &str, user_id: &str, name: &str) -> String {
    let normalized = name.trim().to_lowercase();
    let digest = Sha256::digest(format!("{prefix}_{user_id}_{normalized}").as_bytes());
    format!("{:x}", digest)
}

fn row_to_node_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeRow> {
    let props_text: String = row.get(3)?;
    let blob: Option<Vec<u8>> = row.get(4)?;
    Ok(NodeRow {
        id: row.get(0)?,
        content: row.get(1)?,
        timestamp_ms: row.get(2)?,
        props: serde_json::from_str(&props_text).unwrap_or(serde_json::Value::Null),
        embedding: blob.map(|b| bytes_to_f32_vec(&b)),
        embedding_model: row.get(5)?,
    })
}

const NODE_ROW_COLS: &str = "id, content, timestamp_ms, props, embedding, embedding_model";

/// Escape LIKE wildcards in a keyword so `%`/`_` match literally.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

impl GraphStore {
    // ── Write path ─────────────────────────────────────────────────────

    /// Merge-on-key write: create the node if absent, otherwise overwrite
    /// all scalar attributes and the embedding in place.
    pub fn upsert_node(&self, node: &GraphNode) -> GraphResult<UpsertOutcome> {
        let conn = self.conn.lock();
        let exists: bool = conn
            .query_row("SELECT 1 FROM nodes WHERE id = ?1", params![node.id], |_| Ok(true))
            .optional()
            .map_err(|e| GraphError::statement("check node existence", e))?
            .unwrap_or(false);

        let props = serde_json::to_string(&node.props)?;
        let blob = node.embedding.as_ref().map(|v| f32_vec_to_bytes(v));
        conn.execute(
            "INSERT INTO nodes (id, kind, user_id, content, timestamp_ms, props, embedding, embedding_model)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                 content = excluded.content,
                 timestamp_ms = excluded.timestamp_ms,
                 props = excluded.props,
                 embedding = excluded.embedding,
                 embedding_model = excluded.embedding_model,
                 updated_at = datetime('now')",
            params![
                node.id,
                node.kind.as_str(),
                node.user_id,
                node.content,
                node.timestamp_ms,
                props,
                blob,
                node.embedding_model,
            ],
        )
        .map_err(|e| GraphError::statement("upsert node", e))?;

        Ok(if exists { UpsertOutcome::Updated } else { UpsertOutcome::Created })
    }

    /// Create-only write for the bulk migration path. Fails on key collision.
    pub fn create_node(&self, node: &GraphNode) -> GraphResult<()> {
        let conn = self.conn.lock();
        let props = serde_json::to_string(&node.props)?;
        let blob = node.embedding.as_ref().map(|v| f32_vec_to_bytes(v));
        conn.execute(
            "INSERT INTO nodes (id, kind, user_id, content, timestamp_ms, props, embedding, embedding_model)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                node.id,
                node.kind.as_str(),
                node.user_id,
                node.content,
                node.timestamp_ms,
                props,
                blob,
                node.embedding_model,
            ],
        )
        .map_err(|e| GraphError::statement("create node", e))?;
        Ok(())
    }

    /// Delete a node together with every incident edge.
    pub fn detach_delete(&self, id: &str) -> GraphResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM edges WHERE src_id = ?1 OR dst_id = ?1", params![id])
            .map_err(|e| GraphError::statement("detach edges", e))?;
        conn.execute("DELETE FROM nodes WHERE id = ?1", params![id])
            .map_err(|e| GraphError::statement("delete node", e))?;
        Ok(())
    }

    // ── Read path ──────────────────────────────────────────────────────

    pub fn get_node(&self, id: &str) -> GraphResult<Option<GraphNode>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, kind, user_id, content, timestamp_ms, props, embedding, embedding_model
             FROM nodes WHERE id = ?1",
            params![id],
            |row| {
                let kind_text: String = row.get(1)?;
                let props_text: String = row.get(5)?;
                let blob: Option<Vec<u8>> = row.get(6)?;
                Ok(GraphNode {
                    id: row.get(0)?,
                    kind: NodeKind::parse(&kind_text).unwrap_or(NodeKind::Note),
                    user_id: row.get(2)?,
                    content: row.get(3)?,
                    timestamp_ms: row.get(4)?,
                    props: serde_json::from_str(&props_text).unwrap_or(serde_json::Value::Null),
                    embedding: blob.map(|b| bytes_to_f32_vec(&b)),
                    embedding_model: row.get(7)?,
                })
            },
        )
        .optional()
        .map_err(|e| GraphError::statement("get node", e))
    }

    /// All node ids for a user + kind (deletion reconciliation input).
    pub fn node_ids(&self, user_id: &str, kind: NodeKind) -> GraphResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id FROM nodes WHERE user_id = ?1 AND kind = ?2")
            .map_err(|e| GraphError::statement("list node ids", e))?;
        let ids = stmt
            .query_map(params![user_id, kind.as_str()], |row| row.get::<_, String>(0))
            .map_err(|e| GraphError::statement("list node ids", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    pub fn count_nodes(&self, kind: NodeKind) -> GraphResult<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE kind = ?1",
            params![kind.as_str()],
            |r| r.get(0),
        )
        .map_err(|e| GraphError::statement("count nodes", e))
    }

    pub fn count_edges(&self) -> GraphResult<i64> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM edges", [], |r| r.get(0))
            .map_err(|e| GraphError::statement("count edges", e))
    }

    // ── Retrieval scans ────────────────────────────────────────────────

    /// Top-k nodes by cosine similarity against a query embedding.
    /// Brute-force scan over stored vectors; only rows with an embedding of
    /// matching dimensionality participate. `status` optionally filters on
    /// `props.status`.
    pub fn vector_candidates(
        &self,
        user_id: &str,
        kind: NodeKind,
        query: &[f32],
        k: usize,
        status: Option<&str>,
    ) -> GraphResult<Vec<(NodeRow, f64)>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {NODE_ROW_COLS} FROM nodes
             WHERE user_id = ?1 AND kind = ?2 AND embedding IS NOT NULL"
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| GraphError::statement("vector candidate scan", e))?;

        let mut scored: Vec<(NodeRow, f64)> = stmt
            .query_map(params![user_id, kind.as_str()], row_to_node_row)
            .map_err(|e| GraphError::statement("vector candidate scan", e))?
            .filter_map(|r| r.ok())
            .filter(|row| match status {
                Some(s) => row.props.get("status").and_then(|v| v.as_str()) == Some(s),
                None => true,
            })
            .filter_map(|row| {
                let emb = row.embedding.as_deref()?;
                // Cross-model embeddings are compared as-is; see DESIGN.md.
                let score = crate::engine::scoring::vector_score(query, emb)?;
                Some((row, score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Nodes whose content contains at least one of the query keywords
    /// (case-insensitive substring). The caller computes the keyword ratio.
    pub fn keyword_candidates(
        &self,
        user_id: &str,
        kind: NodeKind,
        keywords: &[String],
        k: usize,
    ) -> GraphResult<Vec<NodeRow>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();

        let like_clauses: Vec<String> = (0..keywords.len())
            .map(|i| format!("LOWER(content) LIKE ?{} ESCAPE '\\'", i + 3))
            .collect();
        let sql = format!(
            "SELECT {NODE_ROW_COLS} FROM nodes
             WHERE user_id = ?1 AND kind = ?2 AND ({})
             ORDER BY timestamp_ms DESC, id ASC
             LIMIT {}",
            like_clauses.join(" OR "),
            k
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| GraphError::statement("keyword candidate scan", e))?;

        let mut bound: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(user_id.to_string()), Box::new(kind.as_str())];
        for kw in keywords {
            bound.push(Box::new(format!("%{}%", escape_like(&kw.to_lowercase()))));
        }
        let refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();

        let rows = stmt
            .query_map(refs.as_slice(), row_to_node_row)
            .map_err(|e| GraphError::statement("keyword candidate scan", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Most recent nodes of a kind (fallback/accessor listings).
    pub fn list_recent(
        &self,
        user_id: &str,
        kind: NodeKind,
        limit: usize,
    ) -> GraphResult<Vec<NodeRow>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {NODE_ROW_COLS} FROM nodes
             WHERE user_id = ?1 AND kind = ?2
             ORDER BY timestamp_ms DESC, id ASC
             LIMIT ?3"
        );
        let mut stmt =
            conn.prepare(&sql).map_err(|e| GraphError::statement("list recent nodes", e))?;
        let rows = stmt
            .query_map(params![user_id, kind.as_str(), limit as i64], row_to_node_row)
            .map_err(|e| GraphError::statement("list recent nodes", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Nodes with a given `props.status`, highest priority first (then
    /// newest). Used for the active/pending obligation listings.
    pub fn list_with_status(
        &self,
        user_id: &str,
        kind: NodeKind,
        status: &str,
        limit: usize,
    ) -> GraphResult<Vec<NodeRow>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {NODE_ROW_COLS} FROM nodes
             WHERE user_id = ?1 AND kind = ?2
               AND json_extract(props, '$.status') = ?3
             ORDER BY COALESCE(json_extract(props, '$.priority'), 0) DESC,
                      timestamp_ms DESC, id ASC
             LIMIT ?4"
        );
        let mut stmt =
            conn.prepare(&sql).map_err(|e| GraphError::statement("list nodes by status", e))?;
        let rows = stmt
            .query_map(params![user_id, kind.as_str(), status, limit as i64], row_to_node_row)
            .map_err(|e| GraphError::statement("list nodes by status", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Journal-entry ids whose source timestamp falls in [start, end].
    pub fn journal_ids_in_range(
        &self,
        user_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> GraphResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id FROM nodes
                 WHERE user_id = ?1 AND kind = 'JournalEntry'
                   AND timestamp_ms >= ?2 AND timestamp_ms <= ?3
                 ORDER BY timestamp_ms ASC",
            )
            .map_err(|e| GraphError::statement("journal range scan", e))?;
        let ids = stmt
            .query_map(params![user_id, start_ms, end_ms], |row| row.get::<_, String>(0))
            .map_err(|e| GraphError::statement("journal range scan", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }
}
