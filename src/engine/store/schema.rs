// Schema bootstrap for the graph store.
// Called once per open by GraphStore::open() after WAL is enabled.
// Adding a table or column: append an idempotent CREATE TABLE IF NOT EXISTS
// or ALTER TABLE … ADD COLUMN at the end of bootstrap() — never modify
// existing SQL, to keep upgrade paths clean.

use crate::atoms::error::GraphResult;
use rusqlite::Connection;

pub(crate) fn bootstrap(conn: &Connection) -> GraphResult<()> {
    conn.execute_batch(
        "
        -- Content-bearing nodes (every kind except Person/Topic).
        -- embedding and embedding_model are written together or not at all.
        CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            user_id TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            timestamp_ms INTEGER NOT NULL DEFAULT 0,
            props TEXT NOT NULL DEFAULT '{}',
            embedding BLOB,
            embedding_model TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_user_kind
            ON nodes(user_id, kind);
        CREATE INDEX IF NOT EXISTS idx_nodes_kind_ts
            ON nodes(kind, timestamp_ms);

        -- Person/Topic nodes, deduplicated per user by a normalized-name
        -- key (the row id IS the dedup key — a sha256 of user + name).
        CREATE TABLE IF NOT EXISTS entities (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            relationship TEXT,
            category TEXT,
            mention_count INTEGER NOT NULL DEFAULT 1,
            sentiment_total REAL NOT NULL DEFAULT 0,
            relevance_total REAL NOT NULL DEFAULT 0,
            first_seen_ms INTEGER NOT NULL DEFAULT 0,
            last_mentioned_ms INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_entities_user_kind
            ON entities(user_id, kind);

        -- Directed, typed, attributed edges. The composite primary key makes
        -- re-issued merge writes idempotent.
        CREATE TABLE IF NOT EXISTS edges (
            kind TEXT NOT NULL,
            src_id TEXT NOT NULL,
            dst_id TEXT NOT NULL,
            props TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (kind, src_id, dst_id)
        );

        CREATE INDEX IF NOT EXISTS idx_edges_src ON edges(src_id);
        CREATE INDEX IF NOT EXISTS idx_edges_dst ON edges(dst_id);

        -- Process flags and per-kind sync watermarks.
        CREATE TABLE IF NOT EXISTS graph_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}
