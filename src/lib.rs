// src/lib.rs
// Public library surface for integration tests (and embedders).

pub mod api;
pub mod metrics;
pub mod rank;
pub mod refresh;
pub mod schedule;
pub mod status;
pub mod store;
pub mod types;
pub mod window;

// ---- Re-exports for a stable public API ----
pub use crate::api::router;
pub use crate::rank::scoring::Role;
pub use crate::rank::thresholds::LabelThresholds;
pub use crate::refresh::{
    RefreshError, RefreshOrchestrator, RefreshRequest, RefreshSummary, ResetMode,
};
pub use crate::schedule::{evaluate_tick, run_tick, TickDecision, TickOutcome};
pub use crate::store::MemoryStore;
pub use crate::types::Disposition;
pub use crate::window::{resolve_window, TimeWindow};

/// Dev/test tracing init: pretty logs honoring `RUST_LOG`, safe to call
/// more than once.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
