// ── Lifegraph Atoms: Constants ─────────────────────────────────────────────
// Fixed product decisions. The score weights are deliberately NOT
// configurable per call — see DESIGN.md.

/// Embedding dimensionality expected from the provider.
pub const EMBEDDING_DIM: usize = 1024;

/// Recency half-life: a record loses half its recency score every 14 days.
pub const RECENCY_HALF_LIFE_DAYS: f64 = 14.0;

// ── Combined-score weights (journal-entry class) ───────────────────────────

pub const W_VECTOR: f64 = 0.4;
pub const W_KEYWORD: f64 = 0.3;
pub const W_GRAPH: f64 = 0.2;
pub const W_RECENCY: f64 = 0.1;

// ── Keyword-only fallback weights (embedding provider unavailable) ─────────

pub const FALLBACK_W_KEYWORD: f64 = 0.7;
pub const FALLBACK_W_RECENCY: f64 = 0.3;

// ── Keyword extraction ─────────────────────────────────────────────────────

/// Query tokens shorter than this are ignored.
pub const MIN_KEYWORD_LEN: usize = 3;
/// At most this many query tokens participate in keyword scoring.
pub const MAX_QUERY_KEYWORDS: usize = 5;

// ── Candidate fetch sizes and result caps per entity kind ──────────────────

pub const JOURNAL_FETCH_K: usize = 30;
pub const JOURNAL_CAP: usize = 10;

pub const THOUGHT_FETCH_K: usize = 20;
pub const THOUGHT_CAP: usize = 5;

pub const GOAL_FETCH_K: usize = 5;
pub const GOAL_CAP: usize = 3;

/// Notes, user goals and user tasks share the same fetch size and cap.
pub const NOTE_FETCH_K: usize = 10;
pub const NOTE_CAP: usize = 5;

pub const PEOPLE_CAP: usize = 5;
pub const TOPIC_CAP: usize = 5;

// ── Fixed default scores for non-scored fallback paths ─────────────────────

/// Thoughts surfaced via a link to an active goal (no semantic score).
pub const GOAL_LINKED_THOUGHT_SCORE: f64 = 0.6;
/// Thoughts linked to tasks/notes, and unscored active/pending listings.
pub const DEFAULT_FALLBACK_SCORE: f64 = 0.5;

// ── Unscored retrieve-all accessor limits ──────────────────────────────────

pub const ALL_GOALS_LIMIT: usize = 20;
pub const ALL_TASKS_LIMIT: usize = 30;
pub const RECENT_NOTES_LIMIT: usize = 10;

// ── Sync ───────────────────────────────────────────────────────────────────

/// DailyApp nodes link back to journal entries in this trailing window.
pub const APP_WINDOW_DAYS: i64 = 7;

pub const MS_PER_DAY: i64 = 86_400_000;
