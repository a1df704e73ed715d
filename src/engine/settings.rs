// ── Settings over graph_config ─────────────────────────────────────────────
//
// Store-backed implementation of the settings collaborator. All flags and
// watermarks live in the `graph_config` key/value table next to the data
// they gate, so a restored archive carries its sync position with it.

use crate::atoms::error::GraphResult;
use crate::atoms::traits::SettingsStore;
use crate::atoms::types::NodeKind;
use crate::engine::store::GraphStore;
use std::sync::Arc;

const KEY_MIGRATION_COMPLETE: &str = "migration_complete";
const KEY_AUTO_SYNC: &str = "auto_sync_enabled";
const KEY_LAST_CHECKED: &str = "last_checked_ms";
const KEY_LAST_SYNCED: &str = "last_synced_ms";
const KEY_EXTRACTOR_KEY: &str = "extractor_key_present";

pub struct GraphSettings {
    store: Arc<GraphStore>,
}

impl GraphSettings {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    fn get_bool(&self, key: &str, default: bool) -> GraphResult<bool> {
        Ok(self.store.get_config(key)?.map(|v| v == "true").unwrap_or(default))
    }

    fn set_bool(&self, key: &str, value: bool) -> GraphResult<()> {
        self.store.set_config(key, if value { "true" } else { "false" })
    }

    fn watermark_key(kind: NodeKind) -> String {
        format!("watermark_{}", kind.as_str())
    }

    /// Recorded by the host when the extraction-provider key is configured.
    pub fn set_extractor_key_present(&self, present: bool) -> GraphResult<()> {
        self.set_bool(KEY_EXTRACTOR_KEY, present)
    }
}

impl SettingsStore for GraphSettings {
    fn migration_complete(&self) -> GraphResult<bool> {
        self.get_bool(KEY_MIGRATION_COMPLETE, false)
    }

    fn set_migration_complete(&self, done: bool) -> GraphResult<()> {
        self.set_bool(KEY_MIGRATION_COMPLETE, done)
    }

    fn auto_sync_enabled(&self) -> GraphResult<bool> {
        // Auto-sync defaults on; migration completion is the real gate.
        self.get_bool(KEY_AUTO_SYNC, true)
    }

    fn set_auto_sync_enabled(&self, enabled: bool) -> GraphResult<()> {
        self.set_bool(KEY_AUTO_SYNC, enabled)
    }

    fn watermark(&self, kind: NodeKind) -> GraphResult<i64> {
        Ok(self
            .store
            .get_config(&Self::watermark_key(kind))?
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0))
    }

    fn set_watermark(&self, kind: NodeKind, ts_ms: i64) -> GraphResult<()> {
        self.store.set_config(&Self::watermark_key(kind), &ts_ms.to_string())
    }

    fn set_last_checked(&self, ts_ms: i64) -> GraphResult<()> {
        self.store.set_config(KEY_LAST_CHECKED, &ts_ms.to_string())
    }

    fn set_last_synced(&self, ts_ms: i64) -> GraphResult<()> {
        self.store.set_config(KEY_LAST_SYNCED, &ts_ms.to_string())
    }

    fn extractor_key_present(&self) -> GraphResult<bool> {
        self.get_bool(KEY_EXTRACTOR_KEY, false)
    }
}
