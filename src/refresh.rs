//! Refresh orchestration: one linear cycle that (re)builds the digest for
//! a `(dateKey, windowDays)` key and persists it.
//!
//! Order per invocation: existence pre-check → optional scoped decision
//! reset → ingestion → ranking pass 1 → triage prefetch for items still
//! missing a score → ranking pass 2 (only if prefetch generated anything)
//! → preview prefetch → snapshot + run record persist.
//!
//! Validation and the already-exists conflict abort before any side
//! effect. Everything downstream fails per item and is collected into the
//! summary; the only fatal path left is the storage write itself. The
//! snapshot is written before the run record, so a failed snapshot write
//! can never leave a run record without a matching snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};

use crate::rank::scoring::Role;
use crate::rank::thresholds::LabelThresholds;
use crate::rank::{rank_candidates, RankOutcome};
use crate::store::{
    DigestRun, DigestSnapshot, DigestStore, IngestionErrorDetail, IngestionStats, PreviewStats,
    RefreshMeta, RunMode, SignalStore, TriageStats,
};
use crate::types::RankedItem;
use crate::window::{resolve_window, TimeWindow, WindowError};

/// Hard cap on the digest size a caller may request.
pub const MAX_LIMIT: usize = 100;

/// External ingestion pipeline. Idempotent; duplicates are expected and
/// tolerated, so the orchestrator calls it on every overwrite-permitted
/// path.
#[async_trait::async_trait]
pub trait Ingestion: Send + Sync {
    async fn run_ingestion(&self) -> Result<IngestionStats>;
}

/// Externally computed triage score for one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageRecord {
    pub signal_id: String,
    pub score: f32,
}

/// External triage (LLM) scorer. May fail per item; a failure must never
/// abort the batch.
#[async_trait::async_trait]
pub trait TriageGenerator: Send + Sync {
    async fn generate_triage(&self, signal_id: &str, role: Role) -> Result<TriageRecord>;
}

/// External preview/extract generator for the final ranked set.
#[async_trait::async_trait]
pub trait PreviewGenerator: Send + Sync {
    async fn prefetch_previews(&self, signal_ids: &[String]) -> Result<PreviewStats>;
}

/// What happens to prior user decisions when a snapshot is overwritten.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResetMode {
    #[default]
    PreserveDispositions,
    ResetDispositions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub date_key: String,
    pub timezone: String,
    pub window_days: u32,
    pub limit: usize,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub reset_mode: ResetMode,
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Validation(#[from] WindowError),
    #[error("INVALID_LIMIT: limit must be 1..={MAX_LIMIT}, got {0}")]
    InvalidLimit(usize),
    #[error("DIGEST_ALREADY_EXISTS: snapshot for ({date_key}, {window_days}d) exists; pass overwrite to regenerate")]
    AlreadyExists { date_key: String, window_days: u32 },
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl RefreshError {
    /// Conflict as opposed to caller error; the HTTP layer maps this to
    /// 409 and validation to 400.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RefreshError::AlreadyExists { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RefreshError::Validation(_) | RefreshError::InvalidLimit(_)
        )
    }
}

/// Everything one refresh cycle did, returned to the caller and partially
/// persisted as snapshot metadata.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub date_key: String,
    pub window_days: u32,
    pub window: TimeWindow,
    pub ordered_ids: Vec<String>,
    pub by_id: HashMap<String, RankedItem>,
    pub duplicates_collapsed: usize,
    pub candidate_count: usize,
    /// Items whose dispositions/triage were wiped by `RESET_DISPOSITIONS`.
    pub reset_items: u64,
    pub ingestion: IngestionStats,
    pub triage: TriageStats,
    pub previews: PreviewStats,
    pub updated_at: DateTime<Utc>,
}

/// Drives refresh cycles. One per process; owns the per-key locks that
/// keep concurrent refreshes of the same `(dateKey, windowDays)` from
/// racing between the existence check and the write.
pub struct RefreshOrchestrator {
    digests: Arc<dyn DigestStore>,
    signals: Arc<dyn SignalStore>,
    ingestion: Arc<dyn Ingestion>,
    triage: Arc<dyn TriageGenerator>,
    previews: Arc<dyn PreviewGenerator>,
    thresholds: LabelThresholds,
    locks: Mutex<HashMap<(String, u32), Arc<tokio::sync::Mutex<()>>>>,
}

impl RefreshOrchestrator {
    pub fn new(
        digests: Arc<dyn DigestStore>,
        signals: Arc<dyn SignalStore>,
        ingestion: Arc<dyn Ingestion>,
        triage: Arc<dyn TriageGenerator>,
        previews: Arc<dyn PreviewGenerator>,
        thresholds: LabelThresholds,
    ) -> Self {
        Self {
            digests,
            signals,
            ingestion,
            triage,
            previews,
            thresholds,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Manual refresh entry point.
    pub async fn refresh(&self, req: &RefreshRequest) -> Result<RefreshSummary, RefreshError> {
        self.refresh_with_mode(req, RunMode::Manual, Utc::now()).await
    }

    /// Shared path for manual and scheduled refreshes; `now` is injected
    /// so tests and the scheduler control recency scoring and timestamps.
    pub async fn refresh_with_mode(
        &self,
        req: &RefreshRequest,
        mode: RunMode,
        now: DateTime<Utc>,
    ) -> Result<RefreshSummary, RefreshError> {
        // Validation, before any side effect.
        if req.limit == 0 || req.limit > MAX_LIMIT {
            return Err(RefreshError::InvalidLimit(req.limit));
        }
        let window = resolve_window(&req.date_key, &req.timezone, req.window_days)?;

        // Serialize check→write for this snapshot key.
        let key_lock = self.key_lock(&req.date_key, req.window_days);
        let _guard = key_lock.lock().await;

        // CHECK_EXISTING: conflict fails fast, before ingestion runs.
        if !req.overwrite
            && self
                .digests
                .find_snapshot(&req.date_key, req.window_days)
                .await?
                .is_some()
        {
            counter!("digest_refresh_conflicts_total").increment(1);
            return Err(RefreshError::AlreadyExists {
                date_key: req.date_key.clone(),
                window_days: req.window_days,
            });
        }

        // RESET_IF_REQUESTED: scoped to this window, never global.
        let reset_items = if req.overwrite && req.reset_mode == ResetMode::ResetDispositions {
            let n = self.digests.delete_decisions_in_window(&window).await?;
            tracing::info!(
                date_key = %req.date_key,
                window_days = req.window_days,
                items = n,
                "reset dispositions inside window"
            );
            n
        } else {
            0
        };

        // INGEST: idempotent upstream; a hard failure degrades to an
        // empty stats block with one error entry rather than aborting.
        let ingestion = match self.ingestion.run_ingestion().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = ?e, "ingestion call failed; continuing with stored candidates");
                IngestionStats {
                    errors: vec![IngestionErrorDetail {
                        source_id: String::new(),
                        source_name: "ingestion".into(),
                        rss_url: None,
                        message: e.to_string(),
                    }],
                    ..IngestionStats::default()
                }
            }
        };

        let candidates = self.signals.candidates_in_window(&window).await?;
        let feedback = self.signals.feedback_by_source().await?;

        // RANK_PASS_1: against whatever triage scores already exist.
        let pass1 = rank_candidates(
            req.role,
            req.limit,
            &candidates,
            &feedback,
            now,
            &self.thresholds,
        );

        // PREFETCH_MISSING_TRIAGE: sequential, best-effort, per-item
        // failure isolation. Only the pass-1 survivors are queued; items
        // the digest dropped are not worth an upstream call.
        let triage_by_id: HashMap<String, Option<f32>> = candidates
            .iter()
            .map(|c| (c.id.clone(), c.triage_score))
            .collect();
        let queue: Vec<&String> = pass1
            .ordered_ids
            .iter()
            .filter(|id| matches!(triage_by_id.get(*id), Some(None)))
            .collect();

        let mut triage = TriageStats {
            requested: queue.len() as u32,
            ..TriageStats::default()
        };
        let mut generated: HashMap<String, f32> = HashMap::new();
        for id in queue {
            match self.triage.generate_triage(id, req.role).await {
                Ok(rec) => {
                    generated.insert(rec.signal_id, rec.score);
                    triage.generated += 1;
                }
                Err(e) => {
                    triage.failed += 1;
                    counter!("digest_triage_prefetch_failed_total").increment(1);
                    tracing::warn!(signal_id = %id, error = ?e, "triage prefetch failed");
                }
            }
        }

        // RANK_PASS_2: only worth it if prefetch produced new scores.
        let outcome: RankOutcome = if generated.is_empty() {
            pass1
        } else {
            let mut rescored = candidates.clone();
            for item in rescored.iter_mut() {
                if let Some(score) = generated.get(&item.id) {
                    item.triage_score = Some(*score);
                }
            }
            rank_candidates(
                req.role,
                req.limit,
                &rescored,
                &feedback,
                now,
                &self.thresholds,
            )
        };

        // PREFETCH_PREVIEWS: last, against the final ranked set.
        let previews = match self.previews.prefetch_previews(&outcome.ordered_ids).await {
            Ok(stats) => {
                if stats.failed > 0 {
                    counter!("digest_preview_prefetch_failed_total")
                        .increment(u64::from(stats.failed));
                }
                stats
            }
            Err(e) => {
                tracing::warn!(error = ?e, "preview prefetch failed");
                counter!("digest_preview_prefetch_failed_total")
                    .increment(outcome.ordered_ids.len() as u64);
                PreviewStats {
                    requested: outcome.ordered_ids.len() as u32,
                    failed: outcome.ordered_ids.len() as u32,
                    errors: vec![e.to_string()],
                    ..PreviewStats::default()
                }
            }
        };

        // PERSIST_SNAPSHOT_AND_RUN: snapshot first; a fatal write here
        // propagates and no run record is written.
        let snapshot = DigestSnapshot {
            date_key: req.date_key.clone(),
            window_days: req.window_days,
            item_ids: outcome.ordered_ids.clone(),
            meta: RefreshMeta {
                ingestion: ingestion.clone(),
                triage,
            },
            updated_at: now,
        };
        self.digests.upsert_snapshot(&snapshot).await?;
        self.digests
            .upsert_run(&DigestRun {
                date_key: req.date_key.clone(),
                mode,
                signal_count: candidates.len() as u32,
                processed_count: outcome.ordered_ids.len() as u32,
                updated_at: now,
            })
            .await?;

        counter!("digest_refresh_total").increment(1);
        gauge!("digest_last_refresh_ts").set(now.timestamp() as f64);
        tracing::info!(
            date_key = %req.date_key,
            window_days = req.window_days,
            items = outcome.ordered_ids.len(),
            collapsed = outcome.duplicates_collapsed,
            triage_generated = snapshot.meta.triage.generated,
            triage_failed = snapshot.meta.triage.failed,
            "digest refresh persisted"
        );

        Ok(RefreshSummary {
            date_key: req.date_key.clone(),
            window_days: req.window_days,
            window,
            ordered_ids: outcome.ordered_ids,
            by_id: outcome.by_id,
            duplicates_collapsed: outcome.duplicates_collapsed,
            candidate_count: candidates.len(),
            reset_items,
            ingestion,
            triage: snapshot.meta.triage,
            previews,
            updated_at: now,
        })
    }

    fn key_lock(&self, date_key: &str, window_days: u32) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("refresh lock map poisoned");
        locks
            .entry((date_key.to_string(), window_days))
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
