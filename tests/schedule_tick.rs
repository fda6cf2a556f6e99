// tests/schedule_tick.rs
//
// Scheduler tick end-to-end against the in-memory store: a due tick runs
// the 1-day scheduled refresh exactly once per local day; every skipped
// path leaves the `last_schedule_run_at` marker untouched.

mod common;

use std::sync::atomic::Ordering;

use chrono::{TimeZone, Utc};
use common::{harness, item};
use signal_digest::run_tick;
use signal_digest::store::{DigestStore, RunMode, ScheduleConfig, SettingsStore};
use signal_digest::TickOutcome;

async fn enable_schedule(h: &common::Harness, local_time: &str, timezone: &str) {
    let settings: std::sync::Arc<dyn SettingsStore> = h.store.clone();
    settings
        .update_schedule_config(&ScheduleConfig {
            enabled: true,
            local_time: local_time.into(),
            timezone: timezone.into(),
            last_schedule_run_at: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn due_tick_runs_then_same_day_tick_skips() {
    let h = harness();
    h.store.insert_item(item("a", "morning story", 6, Some(70.0)));
    enable_schedule(&h, "07:00", "UTC").await;

    let settings: std::sync::Arc<dyn SettingsStore> = h.store.clone();
    let first_now = Utc.with_ymd_and_hms(2025, 6, 10, 7, 2, 0).unwrap();
    let first = run_tick(&h.orchestrator, &settings, first_now).await.unwrap();
    assert!(matches!(first, TickOutcome::Ran { .. }));
    assert_eq!(h.ingestion.calls.load(Ordering::SeqCst), 1);

    // Marker stamped with the run instant.
    let cfg = settings.schedule_config().await.unwrap();
    assert_eq!(cfg.last_schedule_run_at, Some(first_now));

    // Snapshot and SCHEDULED run record exist for today at 1 day.
    let snap = h.store.find_snapshot("2025-06-10", 1).await.unwrap().unwrap();
    assert_eq!(snap.item_ids, vec!["a"]);
    let run = h.store.find_run("2025-06-10").await.unwrap().unwrap();
    assert_eq!(run.mode, RunMode::Scheduled);

    // Second invocation, still inside the due window: idempotent skip.
    let second_now = Utc.with_ymd_and_hms(2025, 6, 10, 7, 8, 0).unwrap();
    let second = run_tick(&h.orchestrator, &settings, second_now).await.unwrap();
    assert!(matches!(second, TickOutcome::SkippedAlreadyRan));
    assert_eq!(h.ingestion.calls.load(Ordering::SeqCst), 1);

    // Marker still points at the first (actual) run.
    let cfg = settings.schedule_config().await.unwrap();
    assert_eq!(cfg.last_schedule_run_at, Some(first_now));
}

#[tokio::test]
async fn disabled_schedule_skips_without_side_effects() {
    let h = harness();
    let settings: std::sync::Arc<dyn SettingsStore> = h.store.clone();
    let now = Utc.with_ymd_and_hms(2025, 6, 10, 7, 0, 0).unwrap();

    let out = run_tick(&h.orchestrator, &settings, now).await.unwrap();
    assert!(matches!(out, TickOutcome::SkippedDisabled));
    assert_eq!(h.ingestion.calls.load(Ordering::SeqCst), 0);
    assert!(settings.schedule_config().await.unwrap().last_schedule_run_at.is_none());
}

#[tokio::test]
async fn outside_due_window_skips_not_due() {
    let h = harness();
    enable_schedule(&h, "07:00", "UTC").await;
    let settings: std::sync::Arc<dyn SettingsStore> = h.store.clone();

    for (hour, minute) in [(6u32, 59u32), (7, 11), (12, 0)] {
        let now = Utc.with_ymd_and_hms(2025, 6, 10, hour, minute, 0).unwrap();
        let out = run_tick(&h.orchestrator, &settings, now).await.unwrap();
        assert!(matches!(out, TickOutcome::SkippedNotDue), "{hour}:{minute}");
    }
    assert_eq!(h.ingestion.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn next_local_day_runs_again() {
    let h = harness();
    enable_schedule(&h, "07:00", "UTC").await;
    let settings: std::sync::Arc<dyn SettingsStore> = h.store.clone();

    let day1 = Utc.with_ymd_and_hms(2025, 6, 10, 7, 1, 0).unwrap();
    assert!(matches!(
        run_tick(&h.orchestrator, &settings, day1).await.unwrap(),
        TickOutcome::Ran { .. }
    ));
    let day2 = Utc.with_ymd_and_hms(2025, 6, 11, 7, 1, 0).unwrap();
    assert!(matches!(
        run_tick(&h.orchestrator, &settings, day2).await.unwrap(),
        TickOutcome::Ran { .. }
    ));
    assert_eq!(h.ingestion.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn tick_respects_configured_timezone_for_day_key() {
    let h = harness();
    enable_schedule(&h, "07:00", "Asia/Tokyo").await;
    let settings: std::sync::Arc<dyn SettingsStore> = h.store.clone();

    // 2025-06-09 22:03 UTC == 2025-06-10 07:03 in Tokyo.
    let now = Utc.with_ymd_and_hms(2025, 6, 9, 22, 3, 0).unwrap();
    let out = run_tick(&h.orchestrator, &settings, now).await.unwrap();
    match out {
        TickOutcome::Ran { summary } => assert_eq!(summary.date_key, "2025-06-10"),
        other => panic!("expected Ran, got {other:?}"),
    }
    assert!(h.store.find_snapshot("2025-06-10", 1).await.unwrap().is_some());
}
