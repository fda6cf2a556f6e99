//! Shared data model for the digest engine.
//!
//! Candidate items are owned by the ingestion subsystem; this core only
//! reads them. The only thing the core ever writes back is the digest
//! snapshot (ordered ids + labels), never the items themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Disposition label for one item in a digest.
///
/// `DO` = act on it, `FYI` = worth a glance, `DROP` = dismissed. Also the
/// shape of a user's manual triage decision, which is why it lives here and
/// not inside the ranking engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Disposition {
    Drop,
    Fyi,
    Do,
}

impl Disposition {
    /// Dismissiveness rank, for the ordering guarantee in the ranking
    /// engine: `DROP` is the most dismissive, `DO` the least.
    pub fn dismissiveness(self) -> u8 {
        match self {
            Disposition::Do => 0,
            Disposition::Fyi => 1,
            Disposition::Drop => 2,
        }
    }
}

/// Source a candidate item was fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub trust_tags: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// One ingested item, as handed to the core by the signal store.
///
/// Immutable from the core's point of view; `triage_score` and
/// `disposition` are attachments written by the triage generator and the
/// user respectively, and may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub summary: String,
    /// Publication time as reported by the feed; falls back to
    /// `created_at` for recency scoring when the feed omits it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub source: SourceMeta,
    /// Externally computed 0–100 relevance score, if triage already ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triage_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposition: Option<Disposition>,
}

impl CandidateItem {
    /// Timestamp used for recency scoring and dedup tiebreaks.
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.published_at.unwrap_or(self.created_at)
    }
}

/// Per-source behavioral feedback counts, derived from an append-only
/// event log outside this core. Read-only scoring input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackAggregate {
    #[serde(default)]
    pub session_entered: u32,
    #[serde(default)]
    pub session_resumed: u32,
    #[serde(default)]
    pub jobs_requested: u32,
}

/// One entry of the ranking engine's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub id: String,
    pub rank_score: f32,
    pub label: Disposition,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_serializes_uppercase() {
        let v = serde_json::to_value([Disposition::Do, Disposition::Fyi, Disposition::Drop])
            .unwrap();
        assert_eq!(v, serde_json::json!(["DO", "FYI", "DROP"]));
    }

    #[test]
    fn dismissiveness_orders_drop_highest() {
        assert!(Disposition::Drop.dismissiveness() > Disposition::Fyi.dismissiveness());
        assert!(Disposition::Fyi.dismissiveness() > Disposition::Do.dismissiveness());
    }
}
