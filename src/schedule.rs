//! Scheduler tick: a single idempotent-per-day trigger for the daily
//! digest refresh.
//!
//! `evaluate_tick` is a pure function of `(now, settings)` so the
//! due-window and idempotency rules are unit-testable without clocks or
//! stores. `run_tick` is the effectful wrapper: it drives the refresh
//! orchestrator at `windowDays = 1` and stamps `last_schedule_run_at`
//! only after a successful cycle — a skipped or failed tick never
//! advances the marker.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::rank::scoring::Role;
use crate::refresh::{RefreshError, RefreshOrchestrator, RefreshRequest, RefreshSummary, ResetMode};
use crate::store::{RunMode, ScheduleConfig, SettingsStore};
use crate::window::local_day_key;

/// Minutes after the configured fire time during which a tick counts as
/// due. External cron triggers are sloppy; exact-minute matching would
/// routinely miss.
pub const DUE_WINDOW_MINUTES: u32 = 10;

/// The scheduled path always builds the 1-day digest with a fixed cap.
pub const SCHEDULED_WINDOW_DAYS: u32 = 1;
pub const SCHEDULED_LIMIT: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("INVALID_TIMEZONE: unknown IANA timezone `{0}` in schedule config")]
    InvalidTimezone(String),
    #[error("INVALID_LOCAL_TIME: expected HH:mm, got `{0}`")]
    InvalidLocalTime(String),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Pure verdict of one tick evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickDecision {
    Disabled,
    NotDue,
    AlreadyRan,
    /// Due; carries the local day key the refresh should target.
    Due { date_key: String },
}

/// What a tick did, for the caller and for logs.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TickOutcome {
    SkippedDisabled,
    SkippedNotDue,
    SkippedAlreadyRan,
    Ran { summary: RefreshSummary },
}

/// Decide whether a tick at `now` should fire under `cfg`.
///
/// Checks, in order: enabled, inside the due window, not already run
/// today (local day of `last_schedule_run_at` vs local day of `now`).
pub fn evaluate_tick(now: DateTime<Utc>, cfg: &ScheduleConfig) -> Result<TickDecision, TickError> {
    if !cfg.enabled {
        return Ok(TickDecision::Disabled);
    }

    let tz: Tz = cfg
        .timezone
        .parse()
        .map_err(|_| TickError::InvalidTimezone(cfg.timezone.clone()))?;
    let fire_at = NaiveTime::parse_from_str(&cfg.local_time, "%H:%M")
        .map_err(|_| TickError::InvalidLocalTime(cfg.local_time.clone()))?;

    let local_now = now.with_timezone(&tz);
    let now_minutes = local_now.hour() * 60 + local_now.minute();
    let fire_minutes = fire_at.hour() * 60 + fire_at.minute();

    if now_minutes < fire_minutes || now_minutes > fire_minutes + DUE_WINDOW_MINUTES {
        return Ok(TickDecision::NotDue);
    }

    let today = local_day_key(now, tz);
    if let Some(last) = cfg.last_schedule_run_at {
        if local_day_key(last, tz) == today {
            return Ok(TickDecision::AlreadyRan);
        }
    }

    Ok(TickDecision::Due { date_key: today })
}

/// Evaluate and, if due, run the daily scheduled refresh.
pub async fn run_tick(
    orchestrator: &RefreshOrchestrator,
    settings: &Arc<dyn SettingsStore>,
    now: DateTime<Utc>,
) -> Result<TickOutcome, TickError> {
    let cfg = settings.schedule_config().await?;

    let date_key = match evaluate_tick(now, &cfg)? {
        TickDecision::Disabled => {
            tracing::debug!("schedule tick skipped: disabled");
            return Ok(TickOutcome::SkippedDisabled);
        }
        TickDecision::NotDue => {
            tracing::debug!(local_time = %cfg.local_time, "schedule tick skipped: not due");
            return Ok(TickOutcome::SkippedNotDue);
        }
        TickDecision::AlreadyRan => {
            tracing::info!("schedule tick skipped: already ran today");
            return Ok(TickOutcome::SkippedAlreadyRan);
        }
        TickDecision::Due { date_key } => date_key,
    };

    let req = RefreshRequest {
        date_key: date_key.clone(),
        timezone: cfg.timezone.clone(),
        window_days: SCHEDULED_WINDOW_DAYS,
        limit: SCHEDULED_LIMIT,
        role: Role::default(),
        overwrite: true,
        reset_mode: ResetMode::PreserveDispositions,
    };
    let summary = orchestrator
        .refresh_with_mode(&req, RunMode::Scheduled, now)
        .await?;

    // Marker moves only after a successful cycle.
    settings.mark_schedule_run(now).await?;
    tracing::info!(
        date_key = %date_key,
        items = summary.ordered_ids.len(),
        "scheduled digest refresh ran"
    );

    Ok(TickOutcome::Ran { summary })
}
