// ── Graph Store Adapter ────────────────────────────────────────────────────
//
// Thin wrapper around the embedded store. Owns the single connection and
// serializes every statement — reads included — through one mutex: the
// engine does not support concurrent connections and the workload is
// write-heavy, so one lock keeps the model simple.
//
// Module layout:
//   schema   — idempotent bootstrap (all node/edge tables, IF NOT EXISTS)
//   nodes    — node upsert/create/read/detach-delete, vector/keyword scans
//   edges    — idempotent edge merge, provenance and mention queries
//   archive  — portable export/import bundle
//
// Failure semantics: statement failures surface as `GraphError::Statement`
// carrying the statement's purpose. No retries here — retry policy belongs
// to callers.

use crate::atoms::error::{GraphError, GraphResult};
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub mod archive;
mod edges;
mod nodes;
mod schema;

pub use edges::EntityRow;
pub use nodes::{entity_key, f32_vec_to_bytes, NodeRow};

/// One parameterized statement handed to `GraphStore::execute`. The purpose
/// label ends up in logs and typed errors instead of raw SQL.
pub struct Statement<'a> {
    pub purpose: &'static str,
    pub sql: &'a str,
    pub params: Vec<Box<dyn rusqlite::ToSql + Send + 'a>>,
}

impl<'a> Statement<'a> {
    pub fn new(purpose: &'static str, sql: &'a str) -> Self {
        Self { purpose, sql, params: Vec::new() }
    }

    pub fn bind(mut self, value: impl rusqlite::ToSql + Send + 'a) -> Self {
        self.params.push(Box::new(value));
        self
    }
}

/// Thread-safe graph store. All persistent state flows through this handle;
/// no other component holds file handles to the store.
pub struct GraphStore {
    /// The connection, protected by a mutex.
    /// `pub(crate)` so sibling store modules share the same lock.
    pub(crate) conn: Mutex<Connection>,
    pub(crate) path: Option<PathBuf>,
}

impl GraphStore {
    /// Open (or create) the on-disk store and bootstrap the schema.
    /// Idempotent: safe to call on an already-initialized store.
    pub fn open(path: impl AsRef<Path>) -> GraphResult<Self> {
        let path = path.as_ref().to_path_buf();
        info!("[graph] Opening graph store at {:?}", path);

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys=ON;").ok();

        schema::bootstrap(&conn)?;

        Ok(GraphStore { conn: Mutex::new(conn), path: Some(path) })
    }

    /// In-memory store for tests and ephemeral use.
    pub fn open_in_memory() -> GraphResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::bootstrap(&conn)?;
        Ok(GraphStore { conn: Mutex::new(conn), path: None })
    }

    /// Run one statement. Every caller — reader or writer — serializes
    /// through the same lock.
    pub fn execute(&self, stmt: Statement<'_>) -> GraphResult<usize> {
        let conn = self.conn.lock();
        let params: Vec<&dyn rusqlite::ToSql> =
            stmt.params.iter().map(|p| p.as_ref() as &dyn rusqlite::ToSql).collect();
        conn.execute(stmt.sql, params.as_slice())
            .map_err(|e| GraphError::statement(stmt.purpose, e))
    }

    /// Read one value from the `graph_config` key/value table.
    pub fn get_config(&self, key: &str) -> GraphResult<Option<String>> {
        use rusqlite::OptionalExtension;
        let conn = self.conn.lock();
        conn.query_row("SELECT value FROM graph_config WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(|e| GraphError::statement("read config", e))
    }

    /// Write one value to the `graph_config` key/value table.
    pub fn set_config(&self, key: &str, value: &str) -> GraphResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO graph_config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )
        .map_err(|e| GraphError::statement("write config", e))?;
        Ok(())
    }

    /// Flush write-ahead-log state into the main store file. Called after
    /// each sync batch; callers treat failure as non-fatal (the WAL still
    /// holds valid data).
    pub fn checkpoint(&self) -> GraphResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(|e| GraphError::statement("wal checkpoint", e))?;
        Ok(())
    }

    /// Remove all persistent files for a store at `path`. Only safe when no
    /// connection to that store is open.
    pub fn delete_store(path: impl AsRef<Path>) -> GraphResult<()> {
        let path = path.as_ref();
        for suffix in ["", "-wal", "-shm"] {
            let mut p = path.as_os_str().to_owned();
            p.push(suffix);
            let p = PathBuf::from(p);
            if p.exists() {
                std::fs::remove_file(&p)?;
            }
        }
        info!("[graph] Deleted store files at {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("graph.db");
        {
            let store = GraphStore::open(&db).unwrap();
            drop(store);
        }
        // Second open bootstraps again without error.
        let store = GraphStore::open(&db).unwrap();
        store.checkpoint().unwrap();
    }

    #[test]
    fn execute_reports_purpose_on_failure() {
        let store = GraphStore::open_in_memory().unwrap();
        let err = store
            .execute(Statement::new("count imaginary table", "SELECT * FROM no_such_table"))
            .unwrap_err();
        assert!(err.to_string().contains("count imaginary table"), "{err}");
    }

    #[test]
    fn delete_store_removes_sidecar_files() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("graph.db");
        {
            let store = GraphStore::open(&db).unwrap();
            store
                .execute(Statement::new(
                    "touch config",
                    "INSERT INTO graph_config (key, value) VALUES ('k', 'v')",
                ))
                .unwrap();
        }
        assert!(db.exists());
        GraphStore::delete_store(&db).unwrap();
        assert!(!db.exists());
    }
}
