//! Post-retrieval stages of the query path.
//!
//! Retrieval over-fetches from the index store; these pure functions then
//! narrow the candidates in three explicit steps:
//!
//! 1. [`retain_committed`]: drop chunks whose version is not the committed
//!    version of their document (uncommitted or superseded generations).
//! 2. [`filter_by_role`]: drop chunks above the caller's permission level.
//! 3. [`rank_sources`]: order by score (desc), `updated_at` (desc), chunk
//!    id (asc), and truncate to the requested `k`.

use crate::models::{Role, Source};
use crate::store::ScoredChunk;

/// True iff a caller with `role` may see a chunk at `permission_level`.
pub fn permits(role: &Role, permission_level: u32) -> bool {
    permission_level <= role.level
}

/// Result of the permission stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Filtered {
    pub visible: Vec<ScoredChunk>,
    /// Number of candidates removed by the role check.
    pub hidden: usize,
}

/// Keep only chunks whose version equals the committed version returned by
/// `committed` for their document.
pub fn retain_committed<F>(candidates: Vec<ScoredChunk>, committed: F) -> Vec<ScoredChunk>
where
    F: Fn(&str) -> Option<u64>,
{
    candidates
        .into_iter()
        .filter(|c| committed(&c.document_id) == Some(c.version))
        .collect()
}

/// Drop every candidate the role may not see.
pub fn filter_by_role(candidates: Vec<ScoredChunk>, role: &Role) -> Filtered {
    let total = candidates.len();
    let visible: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter(|c| permits(role, c.permission_level))
        .collect();
    let hidden = total - visible.len();
    Filtered { visible, hidden }
}

/// Order candidates and convert the best `k` into citations.
pub fn rank_sources(mut candidates: Vec<ScoredChunk>, k: usize) -> Vec<Source> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.updated_at.cmp(&a.updated_at))
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    candidates.truncate(k);
    candidates
        .into_iter()
        .map(|c| Source {
            chunk_id: c.chunk_id,
            document_id: c.document_id,
            text: c.text,
            score: round4(c.score),
            offset: c.offset,
            updated_at: c.updated_at,
        })
        .collect()
}

fn round4(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn candidate(id: &str, doc: &str, version: u64, level: u32, score: f64) -> ScoredChunk {
        ScoredChunk {
            chunk_id: id.to_string(),
            document_id: doc.to_string(),
            version,
            text: format!("text of {}", id),
            offset: 0,
            permission_level: level,
            updated_at: Utc::now(),
            score,
        }
    }

    #[test]
    fn test_visibility_iff_level_at_most_role() {
        for role_level in 1..=4u32 {
            let role = Role::new("r", role_level);
            let candidates: Vec<ScoredChunk> = (1..=4u32)
                .map(|lvl| candidate(&format!("c{}", lvl), "d", 1, lvl, 0.5))
                .collect();
            let filtered = filter_by_role(candidates, &role);
            for c in &filtered.visible {
                assert!(c.permission_level <= role_level);
            }
            assert_eq!(filtered.visible.len(), role_level as usize);
            assert_eq!(filtered.hidden, 4 - role_level as usize);
        }
    }

    #[test]
    fn test_role_one_never_sees_level_three() {
        let role = Role::new("employee", 1);
        let filtered = filter_by_role(
            vec![
                candidate("public", "faq.md", 1, 1, 0.2),
                candidate("secret", "hr/salaries.md", 1, 3, 0.99),
            ],
            &role,
        );
        assert_eq!(filtered.visible.len(), 1);
        assert_eq!(filtered.visible[0].chunk_id, "public");
    }

    #[test]
    fn test_retain_committed_drops_other_versions() {
        let candidates = vec![
            candidate("old", "a.md", 1, 1, 0.9),
            candidate("new", "a.md", 2, 1, 0.8),
            candidate("orphan", "gone.md", 1, 1, 0.7),
        ];
        let kept = retain_committed(candidates, |doc| (doc == "a.md").then_some(2));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].chunk_id, "new");
    }

    #[test]
    fn test_rank_orders_by_score_then_recency() {
        let now = Utc::now();
        let mut older = candidate("older", "a.md", 1, 1, 0.5);
        older.updated_at = now - Duration::hours(1);
        let mut newer = candidate("newer", "b.md", 1, 1, 0.5);
        newer.updated_at = now;
        let best = candidate("best", "c.md", 1, 1, 0.9);

        let ranked = rank_sources(vec![older, best, newer], 3);
        let ids: Vec<&str> = ranked.iter().map(|s| s.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["best", "newer", "older"]);
    }

    #[test]
    fn test_rank_truncates() {
        let candidates = (0..10)
            .map(|i| candidate(&format!("c{}", i), "a.md", 1, 1, i as f64 / 10.0))
            .collect();
        let ranked = rank_sources(candidates, 3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].chunk_id, "c9");
    }
}
