// Shared test harness: an in-memory store wired to counting mock
// collaborators, so tests can assert call counts and failure isolation.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};

use signal_digest::rank::scoring::Role;
use signal_digest::refresh::{Ingestion, PreviewGenerator, RefreshOrchestrator, TriageGenerator, TriageRecord};
use signal_digest::store::{IngestionStats, MemoryStore, PreviewStats};
use signal_digest::types::{CandidateItem, SourceMeta};
use signal_digest::LabelThresholds;

pub struct CountingIngestion {
    pub calls: AtomicUsize,
}

#[async_trait::async_trait]
impl Ingestion for CountingIngestion {
    async fn run_ingestion(&self) -> Result<IngestionStats> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(IngestionStats {
            sources: 2,
            signals: 5,
            duplicates: 1,
            errors: vec![],
        })
    }
}

/// Triage mock: configurable per-id scores, configurable failing ids.
pub struct ScriptedTriage {
    pub calls: AtomicUsize,
    pub scores: Mutex<HashMap<String, f32>>,
    pub fail_ids: Mutex<HashSet<String>>,
    pub default_score: f32,
}

impl ScriptedTriage {
    pub fn new(default_score: f32) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            scores: Mutex::new(HashMap::new()),
            fail_ids: Mutex::new(HashSet::new()),
            default_score,
        }
    }

    pub fn score_for(&self, id: &str, score: f32) {
        self.scores.lock().unwrap().insert(id.to_string(), score);
    }

    pub fn fail_for(&self, id: &str) {
        self.fail_ids.lock().unwrap().insert(id.to_string());
    }
}

#[async_trait::async_trait]
impl TriageGenerator for ScriptedTriage {
    async fn generate_triage(&self, signal_id: &str, _role: Role) -> Result<TriageRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_ids.lock().unwrap().contains(signal_id) {
            return Err(anyhow!("triage upstream unavailable for {signal_id}"));
        }
        let score = self
            .scores
            .lock()
            .unwrap()
            .get(signal_id)
            .copied()
            .unwrap_or(self.default_score);
        Ok(TriageRecord {
            signal_id: signal_id.to_string(),
            score,
        })
    }
}

pub struct CountingPreviews {
    pub calls: AtomicUsize,
    pub fail_all: bool,
}

#[async_trait::async_trait]
impl PreviewGenerator for CountingPreviews {
    async fn prefetch_previews(&self, signal_ids: &[String]) -> Result<PreviewStats> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all {
            return Err(anyhow!("preview upstream down"));
        }
        Ok(PreviewStats {
            requested: signal_ids.len() as u32,
            generated: signal_ids.len() as u32,
            failed: 0,
            errors: vec![],
        })
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub ingestion: Arc<CountingIngestion>,
    pub triage: Arc<ScriptedTriage>,
    pub previews: Arc<CountingPreviews>,
    pub orchestrator: Arc<RefreshOrchestrator>,
}

pub fn harness() -> Harness {
    harness_with(ScriptedTriage::new(50.0), false)
}

pub fn harness_with(triage: ScriptedTriage, previews_fail: bool) -> Harness {
    signal_digest::init_tracing();
    let store = Arc::new(MemoryStore::new());
    let ingestion = Arc::new(CountingIngestion {
        calls: AtomicUsize::new(0),
    });
    let triage = Arc::new(triage);
    let previews = Arc::new(CountingPreviews {
        calls: AtomicUsize::new(0),
        fail_all: previews_fail,
    });
    let orchestrator = Arc::new(RefreshOrchestrator::new(
        store.clone(),
        store.clone(),
        ingestion.clone(),
        triage.clone(),
        previews.clone(),
        LabelThresholds::default(),
    ));
    Harness {
        store,
        ingestion,
        triage,
        previews,
        orchestrator,
    }
}

/// Candidate published at the given UTC hour of 2025-06-10.
pub fn item(id: &str, title: &str, hour: u32, triage_score: Option<f32>) -> CandidateItem {
    let at = Utc.with_ymd_and_hms(2025, 6, 10, hour, 0, 0).unwrap();
    CandidateItem {
        id: id.into(),
        title: title.into(),
        url: Some(format!("https://example.com/{id}")),
        summary: String::new(),
        published_at: Some(at),
        created_at: at,
        source: SourceMeta {
            id: format!("src-{id}"),
            name: "Example Feed".into(),
            trust_tags: vec![],
            enabled: true,
        },
        triage_score,
        disposition: None,
    }
}

/// A fixed "now" late on the digest day, so same-day items score recency.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
}
