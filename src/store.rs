//! Storage contracts and persisted shapes.
//!
//! The engine assumes a transactional relational store underneath; these
//! traits are its whole view of it. `digest_snapshot` is keyed by
//! `(dateKey, windowDays)`, `digest_run` by `dateKey` alone, both
//! upsert-only. `MemoryStore` is the in-crate reference implementation
//! used by tests and embedders.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CandidateItem, FeedbackAggregate};
use crate::window::TimeWindow;

/// One failed source from an ingestion cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionErrorDetail {
    pub source_id: String,
    pub source_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rss_url: Option<String>,
    pub message: String,
}

/// Counters returned by the ingestion collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionStats {
    pub sources: u32,
    pub signals: u32,
    pub duplicates: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<IngestionErrorDetail>,
}

/// Triage prefetch counters; exact regardless of prefetch ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageStats {
    pub requested: u32,
    pub generated: u32,
    pub failed: u32,
}

/// Preview prefetch counters, same shape discipline as triage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewStats {
    pub requested: u32,
    pub generated: u32,
    pub failed: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Refresh statistics persisted alongside the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshMeta {
    pub ingestion: IngestionStats,
    pub triage: TriageStats,
}

/// The persisted result of one digest generation. One row per
/// `(dateKey, windowDays)`, overwritten whole or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestSnapshot {
    pub date_key: String,
    pub window_days: u32,
    pub item_ids: Vec<String>,
    pub meta: RefreshMeta,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunMode {
    Manual,
    Scheduled,
}

/// At most one row per calendar day key, independent of window length.
/// Consulted by the scheduler for daily idempotency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestRun {
    pub date_key: String,
    pub mode: RunMode,
    pub signal_count: u32,
    pub processed_count: u32,
    pub updated_at: DateTime<Utc>,
}

/// Singleton schedule settings. Mutated only by the settings surface and
/// the scheduler's post-run marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// Local fire time, "HH:mm".
    pub local_time: String,
    /// IANA zone the fire time is interpreted in.
    pub timezone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_schedule_run_at: Option<DateTime<Utc>>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            local_time: "07:00".into(),
            timezone: "UTC".into(),
            last_schedule_run_at: None,
        }
    }
}

/// Snapshot/run persistence plus the scoped decision wipe used by
/// `RESET_DISPOSITIONS`.
#[async_trait::async_trait]
pub trait DigestStore: Send + Sync {
    async fn find_snapshot(
        &self,
        date_key: &str,
        window_days: u32,
    ) -> Result<Option<DigestSnapshot>>;
    async fn upsert_snapshot(&self, snapshot: &DigestSnapshot) -> Result<()>;
    async fn find_run(&self, date_key: &str) -> Result<Option<DigestRun>>;
    async fn upsert_run(&self, run: &DigestRun) -> Result<()>;
    /// Delete user dispositions and triage records for items inside
    /// `window` only, never globally. Returns how many items were touched.
    async fn delete_decisions_in_window(&self, window: &TimeWindow) -> Result<u64>;
}

/// Read access to ingested candidate items and behavioral feedback.
#[async_trait::async_trait]
pub trait SignalStore: Send + Sync {
    async fn candidates_in_window(&self, window: &TimeWindow) -> Result<Vec<CandidateItem>>;
    /// Resolve ids to items; unknown ids are silently absent from the
    /// result (dangling snapshot ids are filtered at read, not deleted).
    async fn resolve_items(&self, ids: &[String]) -> Result<Vec<CandidateItem>>;
    async fn feedback_by_source(&self) -> Result<HashMap<String, FeedbackAggregate>>;
}

/// Schedule-config singleton access.
#[async_trait::async_trait]
pub trait SettingsStore: Send + Sync {
    async fn schedule_config(&self) -> Result<ScheduleConfig>;
    async fn update_schedule_config(&self, cfg: &ScheduleConfig) -> Result<()>;
    async fn mark_schedule_run(&self, at: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    snapshots: HashMap<(String, u32), DigestSnapshot>,
    runs: HashMap<String, DigestRun>,
    items: Vec<CandidateItem>,
    feedback: HashMap<String, FeedbackAggregate>,
    schedule: ScheduleConfig,
}

/// In-memory implementation of all three storage contracts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_item(&self, item: CandidateItem) {
        let mut st = self.state.lock().expect("memory store mutex poisoned");
        st.items.push(item);
    }

    pub fn insert_feedback(&self, source_id: &str, fb: FeedbackAggregate) {
        let mut st = self.state.lock().expect("memory store mutex poisoned");
        st.feedback.insert(source_id.to_string(), fb);
    }

    pub fn item(&self, id: &str) -> Option<CandidateItem> {
        let st = self.state.lock().expect("memory store mutex poisoned");
        st.items.iter().find(|i| i.id == id).cloned()
    }

    /// Drop an item entirely, leaving any snapshot that references it with
    /// a dangling id. Test hook for the read-path filtering.
    pub fn remove_item(&self, id: &str) {
        let mut st = self.state.lock().expect("memory store mutex poisoned");
        st.items.retain(|i| i.id != id);
    }
}

#[async_trait::async_trait]
impl DigestStore for MemoryStore {
    async fn find_snapshot(
        &self,
        date_key: &str,
        window_days: u32,
    ) -> Result<Option<DigestSnapshot>> {
        let st = self.state.lock().expect("memory store mutex poisoned");
        Ok(st.snapshots.get(&(date_key.to_string(), window_days)).cloned())
    }

    async fn upsert_snapshot(&self, snapshot: &DigestSnapshot) -> Result<()> {
        let mut st = self.state.lock().expect("memory store mutex poisoned");
        st.snapshots.insert(
            (snapshot.date_key.clone(), snapshot.window_days),
            snapshot.clone(),
        );
        Ok(())
    }

    async fn find_run(&self, date_key: &str) -> Result<Option<DigestRun>> {
        let st = self.state.lock().expect("memory store mutex poisoned");
        Ok(st.runs.get(date_key).cloned())
    }

    async fn upsert_run(&self, run: &DigestRun) -> Result<()> {
        let mut st = self.state.lock().expect("memory store mutex poisoned");
        st.runs.insert(run.date_key.clone(), run.clone());
        Ok(())
    }

    async fn delete_decisions_in_window(&self, window: &TimeWindow) -> Result<u64> {
        let mut st = self.state.lock().expect("memory store mutex poisoned");
        let mut touched = 0u64;
        for item in st.items.iter_mut() {
            if window.contains(item.effective_time())
                && (item.triage_score.is_some() || item.disposition.is_some())
            {
                item.triage_score = None;
                item.disposition = None;
                touched += 1;
            }
        }
        Ok(touched)
    }
}

#[async_trait::async_trait]
impl SignalStore for MemoryStore {
    async fn candidates_in_window(&self, window: &TimeWindow) -> Result<Vec<CandidateItem>> {
        let st = self.state.lock().expect("memory store mutex poisoned");
        Ok(st
            .items
            .iter()
            .filter(|i| window.contains(i.effective_time()))
            .cloned()
            .collect())
    }

    async fn resolve_items(&self, ids: &[String]) -> Result<Vec<CandidateItem>> {
        let st = self.state.lock().expect("memory store mutex poisoned");
        Ok(ids
            .iter()
            .filter_map(|id| st.items.iter().find(|i| &i.id == id).cloned())
            .collect())
    }

    async fn feedback_by_source(&self) -> Result<HashMap<String, FeedbackAggregate>> {
        let st = self.state.lock().expect("memory store mutex poisoned");
        Ok(st.feedback.clone())
    }
}

#[async_trait::async_trait]
impl SettingsStore for MemoryStore {
    async fn schedule_config(&self) -> Result<ScheduleConfig> {
        let st = self.state.lock().expect("memory store mutex poisoned");
        Ok(st.schedule.clone())
    }

    async fn update_schedule_config(&self, cfg: &ScheduleConfig) -> Result<()> {
        let mut st = self.state.lock().expect("memory store mutex poisoned");
        st.schedule = cfg.clone();
        Ok(())
    }

    async fn mark_schedule_run(&self, at: DateTime<Utc>) -> Result<()> {
        let mut st = self.state.lock().expect("memory store mutex poisoned");
        st.schedule.last_schedule_run_at = Some(at);
        Ok(())
    }
}
