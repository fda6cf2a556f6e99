//! Prometheus exposition for the digest pipeline. Installing the
//! recorder also registers every series the refresh path emits, so
//! scrapes carry help text from the first cycle on.

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global recorder, describe the refresh/triage/preview
    /// series, and pin the configured size cap as a static gauge.
    pub fn init(max_limit: usize) -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");

        describe_counter!("digest_refresh_total", "Completed refresh cycles.");
        describe_counter!(
            "digest_refresh_conflicts_total",
            "Refreshes rejected because a snapshot already existed."
        );
        describe_counter!(
            "digest_triage_prefetch_failed_total",
            "Per-item triage generation failures."
        );
        describe_counter!(
            "digest_preview_prefetch_failed_total",
            "Per-item preview generation failures."
        );
        describe_gauge!(
            "digest_last_refresh_ts",
            "Unix ts of the last persisted snapshot."
        );
        describe_gauge!(
            "digest_max_limit",
            "Hard cap on the digest size a caller may request."
        );
        gauge!("digest_max_limit").set(max_limit as f64);

        Self { handle }
    }

    /// `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || std::future::ready(handle.render())),
        )
    }
}
