// ── Lifegraph Engine ───────────────────────────────────────────────────────
// The five core components plus the HTTP provider clients.
//
// Module layout:
//   store      — graph store adapter over embedded SQLite (single writer lock)
//   scoring    — pure per-signal scoring + fixed-weight combination
//   retrieval  — hybrid retrieval and context-bundle assembly
//   sync       — incremental synchronization / upsert / reconciliation
//   migration  — one-time bulk load with progress reporting
//   embedding  — HTTP embedding client (Ollama / OpenAI-compatible)
//   extraction — LLM-backed atomic-thought extraction client
//   settings   — store-backed SettingsStore implementation

pub mod embedding;
pub mod extraction;
pub mod migration;
pub mod retrieval;
pub mod scoring;
pub mod settings;
pub mod store;
pub mod sync;
