// ── Scoring Engine ─────────────────────────────────────────────────────────
//
// Pure functions only — no I/O, no store access. Every retrieval path
// funnels through these so ranking behaves identically regardless of which
// component asked.

use crate::atoms::constants::{
    FALLBACK_W_KEYWORD, FALLBACK_W_RECENCY, MAX_QUERY_KEYWORDS, MIN_KEYWORD_LEN,
    RECENCY_HALF_LIFE_DAYS, W_GRAPH, W_KEYWORD, W_RECENCY, W_VECTOR,
};

/// Cosine similarity between a query embedding and a stored embedding.
/// Returns `None` when either vector is empty, the dimensions differ, or
/// either vector has zero magnitude — callers drop such candidates rather
/// than rank them at an arbitrary score.
pub fn vector_score(query: &[f32], stored: &[f32]) -> Option<f64> {
    if query.is_empty() || query.len() != stored.len() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut mag_q = 0.0f64;
    let mut mag_s = 0.0f64;
    for (a, b) in query.iter().zip(stored.iter()) {
        let (a, b) = (*a as f64, *b as f64);
        dot += a * b;
        mag_q += a * a;
        mag_s += b * b;
    }
    if mag_q == 0.0 || mag_s == 0.0 {
        return None;
    }
    Some(dot / (mag_q.sqrt() * mag_s.sqrt()))
}

/// Tokenize a free-text query into scoring keywords: whitespace split,
/// lowercased, tokens of fewer than three characters dropped, capped at the
/// first five. Order of appearance is preserved.
pub fn extract_keywords(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_KEYWORD_LEN)
        .take(MAX_QUERY_KEYWORDS)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Fraction of query keywords found (case-insensitive substring) in the
/// content. Empty keyword list scores 0.0, never a divide-by-zero.
pub fn keyword_score(keywords: &[String], content: &str) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let haystack = content.to_lowercase();
    let matched = keywords.iter().filter(|k| haystack.contains(k.as_str())).count();
    matched as f64 / keywords.len() as f64
}

/// Exponential-decay recency: 1.0 now, halving every 14 days, clamped to
/// [0, 1]. Future timestamps clamp to 1.0 rather than exceeding it.
pub fn recency_score(timestamp_ms: i64, now_ms: i64) -> f64 {
    let days = (now_ms - timestamp_ms) as f64 / 86_400_000.0;
    let score = 2f64.powf(-days / RECENCY_HALF_LIFE_DAYS);
    score.clamp(0.0, 1.0)
}

/// Full four-signal blend used for journal entries:
/// 0.4·vector + 0.3·keyword + 0.2·graph + 0.1·recency.
///
/// The graph signal is structural (shared-entity overlap); the current
/// pipeline always passes 0.0 for it, so journal scores top out at 0.8
/// until that signal is wired in.
pub fn combined_score(vector: f64, keyword: f64, graph: f64, recency: f64) -> f64 {
    W_VECTOR * vector + W_KEYWORD * keyword + W_GRAPH * graph + W_RECENCY * recency
}

/// Two-signal blend for thoughts, goals, notes and tasks:
/// 0.4·vector + 0.3·keyword.
pub fn blended_score(vector: f64, keyword: f64) -> f64 {
    W_VECTOR * vector + W_KEYWORD * keyword
}

/// Keyword-only fallback for journal entries when no query embedding is
/// available: 0.7·keyword + 0.3·recency.
pub fn fallback_score(keyword: f64, recency: f64) -> f64 {
    FALLBACK_W_KEYWORD * keyword + FALLBACK_W_RECENCY * recency
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identity_is_one() {
        let v = vec![0.3f32, -0.5, 0.8, 0.1];
        let score = vector_score(&v, &v).unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_opposite_is_negative_one() {
        let a = vec![1.0f32, 2.0, 3.0];
        let b: Vec<f32> = a.iter().map(|x| -x).collect();
        let score = vector_score(&a, &b).unwrap();
        assert!((score + 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!(vector_score(&a, &b).unwrap().abs() < 1e-9);
    }

    #[test]
    fn cosine_rejects_bad_inputs() {
        assert!(vector_score(&[], &[]).is_none());
        assert!(vector_score(&[1.0], &[1.0, 2.0]).is_none());
        assert!(vector_score(&[0.0, 0.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn keywords_drop_short_tokens_and_cap_at_five() {
        let kws = extract_keywords("I am so excited about the new coffee shop opening downtown");
        // "I", "am", "so" dropped; first five survivors kept.
        assert_eq!(kws, vec!["excited", "about", "the", "new", "coffee"]);
    }

    #[test]
    fn keywords_are_lowercased() {
        assert_eq!(extract_keywords("Meeting With Sam"), vec!["meeting", "with", "sam"]);
    }

    #[test]
    fn keyword_score_is_match_fraction() {
        let kws = extract_keywords("project deadline review");
        let score = keyword_score(&kws, "The deadline for the review slipped again");
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn keyword_score_empty_keywords_is_zero() {
        assert_eq!(keyword_score(&[], "anything"), 0.0);
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let kws = vec!["sam".to_string()];
        assert_eq!(keyword_score(&kws, "Lunch with Sam tomorrow"), 1.0);
    }

    #[test]
    fn recency_now_is_one() {
        let now = 1_700_000_000_000;
        assert!((recency_score(now, now) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn recency_halves_every_fourteen_days() {
        let now = 1_700_000_000_000;
        let two_weeks_ago = now - 14 * 86_400_000;
        assert!((recency_score(two_weeks_ago, now) - 0.5).abs() < 1e-9);
        let four_weeks_ago = now - 28 * 86_400_000;
        assert!((recency_score(four_weeks_ago, now) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn recency_future_clamps_to_one() {
        let now = 1_700_000_000_000;
        assert_eq!(recency_score(now + 86_400_000, now), 1.0);
    }

    #[test]
    fn combined_score_weights_sum_to_one() {
        // Perfect on every signal scores exactly 1.0.
        assert!((combined_score(1.0, 1.0, 1.0, 1.0) - 1.0).abs() < 1e-9);
        // Graph signal held at zero caps the blend at 0.8.
        assert!((combined_score(1.0, 1.0, 0.0, 1.0) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn fallback_full_keyword_recent_is_high() {
        let score = fallback_score(1.0, 1.0);
        assert!((score - 1.0).abs() < 1e-9);
        // A perfect keyword match on a fresh record clears 0.7 on its own.
        assert!(fallback_score(1.0, 0.0) >= 0.7 - 1e-9);
    }

    #[test]
    fn blended_score_ignores_recency() {
        assert!((blended_score(0.5, 0.5) - 0.35).abs() < 1e-9);
    }
}
