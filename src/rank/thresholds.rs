//! Label policy table: composite score → disposition.
//!
//! The cutoffs are a policy knob, not a contract, so they load from a JSON
//! config file and fall back to a built-in seed. Labeling is a single
//! descending-threshold scan, which makes the ordering guarantee (a higher
//! score is never labeled more dismissively) hold for any table where
//! `do_min >= fyi_min`.

use serde::Deserialize;
use std::{fs, path::Path};

use crate::types::Disposition;

/// Minimum composite scores for `DO` and `FYI`; anything below both is
/// `DROP`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct LabelThresholds {
    #[serde(default = "default_do_min")]
    pub do_min: f32,
    #[serde(default = "default_fyi_min")]
    pub fyi_min: f32,
}

fn default_do_min() -> f32 {
    60.0
}

fn default_fyi_min() -> f32 {
    25.0
}

impl Default for LabelThresholds {
    fn default() -> Self {
        Self {
            do_min: default_do_min(),
            fyi_min: default_fyi_min(),
        }
    }
}

impl LabelThresholds {
    /// Load from a JSON file; any read/parse problem falls back to the
    /// defaults so a broken config never takes ranking down.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
            Err(_) => Self::default(),
        }
        .sanitized()
    }

    /// Enforce `do_min >= fyi_min` so the scan below stays monotone even
    /// with a miswritten config.
    fn sanitized(mut self) -> Self {
        if self.do_min < self.fyi_min {
            self.do_min = self.fyi_min;
        }
        self
    }

    pub fn label_for(&self, score: f32) -> Disposition {
        if score >= self.do_min {
            Disposition::Do
        } else if score >= self.fyi_min {
            Disposition::Fyi
        } else {
            Disposition::Drop
        }
    }
}
