//! Composite scorer: five independent, non-negative signals summed raw.
//!
//! Deliberately additive with no normalization; ranking only needs a
//! consistent ordering within one run, and raw components keep the score
//! explainable ("+10 trusted source, +12 fresh").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CandidateItem, FeedbackAggregate};

/// Reader role the digest is built for; selects the keyword set used by
/// the role-affinity signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Pm,
    Eng,
    Res,
}

impl Default for Role {
    fn default() -> Self {
        Role::Res
    }
}

impl Role {
    /// Lenient parse for API/config input; unknown roles fall back to the
    /// researcher set rather than failing the whole refresh.
    pub fn parse_lenient(s: &str) -> Role {
        match s.trim().to_ascii_uppercase().as_str() {
            "PM" => Role::Pm,
            "ENG" => Role::Eng,
            _ => Role::Res,
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Role::Pm => &[
                "roadmap", "launch", "pricing", "growth", "customer", "adoption", "market",
                "milestone", "revenue",
            ],
            Role::Eng => &[
                "breaking", "security", "vulnerability", "cve", "migration", "deprecat",
                "regression", "patch", "rollback",
            ],
            Role::Res => &[
                "paper", "benchmark", "study", "dataset", "evaluation", "arxiv", "method",
                "baseline",
            ],
        }
    }
}

/// Credibility keywords matched against source name + trust tags.
const STRONG_TRUST_KEYWORDS: [&str; 4] = ["official", "changelog", "docs", "trusted"];
const WEAK_TRUST_KEYWORDS: [&str; 2] = ["github", "release"];

const STRONG_TRUST_POINTS: f32 = 10.0;
const WEAK_TRUST_POINTS: f32 = 4.0;
const ROLE_HIT_POINTS: f32 = 4.0;

/// Per-signal contributions; `total()` is the rank score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub triage: f32,
    pub credibility: f32,
    pub role: f32,
    pub recency: f32,
    pub feedback: f32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f32 {
        self.triage + self.credibility + self.role + self.recency + self.feedback
    }
}

/// Score one candidate for one role at one instant.
pub fn composite_score(
    item: &CandidateItem,
    role: Role,
    feedback: Option<&FeedbackAggregate>,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    ScoreBreakdown {
        triage: item.triage_score.map_or(0.0, |s| s.clamp(0.0, 100.0)),
        credibility: credibility_score(item),
        role: role_score(item, role),
        recency: recency_score(item.effective_time(), now),
        feedback: feedback.map_or(0.0, feedback_score),
    }
}

/// Heuristic keyword match on source name/tags. Stacks additively; a
/// source tagged both "official" and "docs" earns both bonuses.
fn credibility_score(item: &CandidateItem) -> f32 {
    let mut haystack = item.source.name.to_lowercase();
    for tag in &item.source.trust_tags {
        haystack.push(' ');
        haystack.push_str(&tag.to_lowercase());
    }

    let mut score = 0.0;
    for kw in STRONG_TRUST_KEYWORDS {
        if haystack.contains(kw) {
            score += STRONG_TRUST_POINTS;
        }
    }
    for kw in WEAK_TRUST_KEYWORDS {
        if haystack.contains(kw) {
            score += WEAK_TRUST_POINTS;
        }
    }
    score
}

/// Count of role keywords present in title+summary, ×4. Each keyword
/// counts at most once regardless of repetitions.
fn role_score(item: &CandidateItem, role: Role) -> f32 {
    let text = format!("{} {}", item.title, item.summary).to_lowercase();
    let hits = role.keywords().iter().filter(|kw| text.contains(*kw)).count();
    hits as f32 * ROLE_HIT_POINTS
}

/// Step function on item age: ≤2h→12, ≤6h→8, ≤12h→5, ≤24h→2, else 0.
fn recency_score(published: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let age_hours = (now - published).num_minutes() as f64 / 60.0;
    if age_hours < 0.0 {
        // Future-dated items (clock skew in feeds) count as brand new.
        return 12.0;
    }
    if age_hours <= 2.0 {
        12.0
    } else if age_hours <= 6.0 {
        8.0
    } else if age_hours <= 12.0 {
        5.0
    } else if age_hours <= 24.0 {
        2.0
    } else {
        0.0
    }
}

fn feedback_score(fb: &FeedbackAggregate) -> f32 {
    (fb.session_entered * 4 + fb.session_resumed * 2 + fb.jobs_requested * 3) as f32
}
