//! Ranking & deduplication engine.
//!
//! Scored candidates go in; an ordered, capped, labeled digest comes out.
//! Near-duplicates (same normalized title) collapse to the single
//! highest-scoring copy. Dedup runs *after* scoring so the more credible
//! duplicate wins instead of whichever arrived first.

pub mod scoring;
pub mod thresholds;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::types::{CandidateItem, FeedbackAggregate, RankedItem};
use scoring::{composite_score, Role};
use thresholds::LabelThresholds;

/// One pre-scored input to [`rank_scored`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub source_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub base_score: f32,
}

/// Engine output: stable order (rank score descending) plus per-id detail.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankOutcome {
    pub ordered_ids: Vec<String>,
    pub by_id: HashMap<String, RankedItem>,
    /// Items discarded by the near-duplicate collapse.
    pub duplicates_collapsed: usize,
}

/// Dedup key: casefold, strip punctuation and whitespace. "Foo: bar!" and
/// "foo bar" collide on purpose; feeds republish the same story with
/// cosmetically different titles.
pub fn dedup_key(title: &str) -> String {
    static RE_NON_ALNUM: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_NON_ALNUM.get_or_init(|| regex::Regex::new(r"[^\p{L}\p{N}]+").unwrap());
    re.replace_all(&title.to_lowercase(), "").into_owned()
}

/// Rank pre-scored candidates: collapse duplicates, sort by score
/// descending (recency, then insertion order break ties), truncate to
/// `limit`, label from the policy table.
pub fn rank_scored(
    limit: usize,
    items: Vec<ScoredCandidate>,
    thresholds: &LabelThresholds,
) -> RankOutcome {
    // Collapse: keep the best-scoring copy per key; on equal score the
    // later-published copy wins, otherwise the incumbent stays.
    let mut by_key: HashMap<String, ScoredCandidate> = HashMap::with_capacity(items.len());
    let mut order: Vec<String> = Vec::with_capacity(items.len());
    let mut duplicates_collapsed = 0usize;

    for cand in items {
        let key = dedup_key(&cand.title);
        match by_key.entry(key) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                order.push(slot.key().clone());
                slot.insert(cand);
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                duplicates_collapsed += 1;
                let incumbent = slot.get_mut();
                let wins = cand.base_score > incumbent.base_score
                    || (cand.base_score == incumbent.base_score
                        && cand.published_at > incumbent.published_at);
                if wins {
                    *incumbent = cand;
                }
            }
        }
    }

    // Survivors in insertion order, then a stable sort by score desc with
    // a recency tiebreak; full ties keep insertion order.
    let mut survivors: Vec<ScoredCandidate> = order
        .iter()
        .filter_map(|k| by_key.remove(k))
        .collect();
    survivors.sort_by(|a, b| {
        b.base_score
            .partial_cmp(&a.base_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.published_at.cmp(&a.published_at))
    });
    survivors.truncate(limit);

    let mut ordered_ids = Vec::with_capacity(survivors.len());
    let mut by_id = HashMap::with_capacity(survivors.len());
    for cand in survivors {
        ordered_ids.push(cand.id.clone());
        by_id.insert(
            cand.id.clone(),
            RankedItem {
                id: cand.id,
                rank_score: cand.base_score,
                label: thresholds.label_for(cand.base_score),
            },
        );
    }

    RankOutcome {
        ordered_ids,
        by_id,
        duplicates_collapsed,
    }
}

/// Full pipeline: composite-score each candidate for `role`, then rank.
/// Items from disabled sources are skipped up front.
pub fn rank_candidates(
    role: Role,
    limit: usize,
    candidates: &[CandidateItem],
    feedback: &HashMap<String, FeedbackAggregate>,
    now: DateTime<Utc>,
    thresholds: &LabelThresholds,
) -> RankOutcome {
    let scored = candidates
        .iter()
        .filter(|c| c.source.enabled)
        .map(|c| ScoredCandidate {
            id: c.id.clone(),
            title: c.title.clone(),
            summary: c.summary.clone(),
            source_name: c.source.name.clone(),
            published_at: Some(c.effective_time()),
            base_score: composite_score(c, role, feedback.get(&c.source.id), now).total(),
        })
        .collect();
    rank_scored(limit, scored, thresholds)
}
