//! Point-in-time digest status: the persisted snapshot, with item ids that
//! no longer resolve filtered out of the view. Read-only; the snapshot row
//! itself is never trimmed here — a dangling id may resolve again after
//! the next ingestion.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::{DigestStore, RefreshMeta, SignalStore};
use crate::types::CandidateItem;
use crate::window::{resolve_window, WindowError};

#[derive(Debug, Clone, Serialize)]
pub struct DigestStatus {
    pub date_key: String,
    pub window_days: u32,
    /// Snapshot ids that still resolve, in snapshot order.
    pub items: Vec<CandidateItem>,
    /// Snapshot ids that no longer resolve (reported, not deleted).
    pub dangling_ids: Vec<String>,
    pub meta: RefreshMeta,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error(transparent)]
    Validation(#[from] WindowError),
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Fetch the persisted digest for `(date_key, window_days)` without any
/// recomputation. `Ok(None)` means no snapshot has been generated yet.
pub async fn digest_status(
    digests: &Arc<dyn DigestStore>,
    signals: &Arc<dyn SignalStore>,
    date_key: &str,
    timezone: &str,
    window_days: u32,
) -> Result<Option<DigestStatus>, StatusError> {
    // Validates the key triplet even though only the snapshot key is
    // needed for the lookup; a bad request should not read as "empty".
    resolve_window(date_key, timezone, window_days)?;

    let Some(snapshot) = digests.find_snapshot(date_key, window_days).await? else {
        return Ok(None);
    };

    let resolved = signals.resolve_items(&snapshot.item_ids).await?;
    let mut items = Vec::with_capacity(resolved.len());
    let mut dangling_ids = Vec::new();
    for id in &snapshot.item_ids {
        match resolved.iter().find(|i| &i.id == id) {
            Some(item) => items.push(item.clone()),
            None => dangling_ids.push(id.clone()),
        }
    }
    if !dangling_ids.is_empty() {
        tracing::debug!(
            date_key,
            window_days,
            dangling = dangling_ids.len(),
            "snapshot contains ids that no longer resolve"
        );
    }

    Ok(Some(DigestStatus {
        date_key: snapshot.date_key,
        window_days: snapshot.window_days,
        items,
        dangling_ids,
        meta: snapshot.meta,
        updated_at: snapshot.updated_at,
    }))
}
