//! Fuzzy name matching for import reconciliation.
//!
//! Precedence, first rule wins:
//!
//! 1. Exact match after [`normalize`] returns immediately, whatever the threshold.
//! 2. Substring containment in either direction scores
//!    `min(len) / max(len)` (in chars).
//! 3. Otherwise the character-set overlap scores
//!    `|set(a) ∩ set(b)| / max(|set(a)|, |set(b)|)`.
//!
//! Substring scores form a higher tier: once any candidate has produced one,
//! character-set scores no longer compete. Within a tier the earliest
//! candidate wins ties. The winner is returned only if its score reaches the
//! threshold.

use std::collections::HashSet;

use serde::Serialize;

/// Default minimum score for a non-exact match.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.5;

/// Anything with a name that can be matched.
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for String {
    fn name(&self) -> &str {
        self
    }
}

impl Named for &str {
    fn name(&self) -> &str {
        self
    }
}

/// How a match was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Substring,
    CharOverlap,
}

/// The winning candidate with its index into the candidate slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchResult {
    pub index: usize,
    pub score: f64,
    pub kind: MatchKind,
}

/// Trim and lowercase.
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Return the best candidate for `target`, or `None`.
pub fn best_match<'a, T: Named>(target: &str, candidates: &'a [T], threshold: f64) -> Option<&'a T> {
    match_candidate(target, candidates, threshold).map(|m| &candidates[m.index])
}

/// Like [`best_match`] but reports index, score and match kind.
pub fn match_candidate<T: Named>(
    target: &str,
    candidates: &[T],
    threshold: f64,
) -> Option<MatchResult> {
    let target = normalize(target);
    if target.is_empty() || candidates.is_empty() {
        return None;
    }
    let target_len = target.chars().count();
    let target_set: HashSet<char> = target.chars().collect();

    let mut best: Option<MatchResult> = None;

    for (index, candidate) in candidates.iter().enumerate() {
        let name = normalize(candidate.name());
        if name.is_empty() {
            continue;
        }
        if name == target {
            return Some(MatchResult {
                index,
                score: 1.0,
                kind: MatchKind::Exact,
            });
        }

        let scored = if name.contains(&target) || target.contains(&name) {
            let name_len = name.chars().count();
            MatchResult {
                index,
                score: target_len.min(name_len) as f64 / target_len.max(name_len) as f64,
                kind: MatchKind::Substring,
            }
        } else {
            let name_set: HashSet<char> = name.chars().collect();
            let common = target_set.intersection(&name_set).count();
            MatchResult {
                index,
                score: common as f64 / target_set.len().max(name_set.len()) as f64,
                kind: MatchKind::CharOverlap,
            }
        };

        best = match best {
            None => Some(scored),
            Some(current) => Some(prefer(current, scored)),
        };
    }

    best.filter(|m| m.score >= threshold)
}

/// Pick between the current best and a new score. Substring beats
/// character overlap outright; equal tiers need a strictly higher score.
fn prefer(current: MatchResult, new: MatchResult) -> MatchResult {
    match (current.kind, new.kind) {
        (MatchKind::CharOverlap, MatchKind::Substring) => new,
        (MatchKind::Substring, MatchKind::CharOverlap) => current,
        _ if new.score > current.score => new,
        _ => current,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
