//! Run identifiers and per-run output directories.
//!
//! A run writes everything it produces under `{results_dir}/{run_id}/`:
//!
//! ```text
//! results/
//!   Bio-ClinicalBERT_small_2024-05-01T12:00:00.000000Z/
//!     params.json
//!     results.json
//!     checkpoint/
//!       checkpoint.bin
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::encoder::short_name;
use crate::error::Result;
use crate::features::key::sanitize;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub const PARAMS_FILE: &str = "params.json";
pub const RESULTS_FILE: &str = "results.json";
pub const CHECKPOINT_DIR: &str = "checkpoint";

/// Identifies one training or evaluation run.
///
/// Rendered as `{model_short}_{dataset}_{timestamp}`; the model and dataset
/// components are sanitized so `_` only separates fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId {
    model: String,
    dataset: String,
    timestamp: DateTime<Utc>,
}

impl RunId {
    /// New run id stamped with the current UTC time.
    pub fn new<M: Into<String>, D: Into<String>>(model: M, dataset: D) -> Self {
        Self::with_timestamp(model, dataset, Utc::now())
    }

    pub fn with_timestamp<M: Into<String>, D: Into<String>>(
        model: M,
        dataset: D,
        timestamp: DateTime<Utc>,
    ) -> Self {
        RunId {
            model: model.into(),
            dataset: dataset.into(),
            timestamp,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            sanitize(short_name(&self.model)),
            sanitize(&self.dataset),
            self.timestamp.format(TIMESTAMP_FORMAT)
        )
    }
}

impl Serialize for RunId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The output directory of one run.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    path: PathBuf,
}

impl RunDirectory {
    /// Create `{results_dir}/{run_id}/` and its checkpoint subdirectory.
    pub fn create<P: AsRef<Path>>(results_dir: P, run_id: &RunId) -> Result<Self> {
        let path = results_dir.as_ref().join(run_id.to_string());
        fs::create_dir_all(path.join(CHECKPOINT_DIR))?;
        debug!("Created run directory {}", path.display());
        Ok(RunDirectory { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.path.join(CHECKPOINT_DIR)
    }

    pub fn params_path(&self) -> PathBuf {
        self.path.join(PARAMS_FILE)
    }

    pub fn results_path(&self) -> PathBuf {
        self.path.join(RESULTS_FILE)
    }

    /// Snapshot the run configuration as pretty JSON.
    pub fn save_params<T: Serialize>(&self, params: &T) -> Result<PathBuf> {
        let path = self.params_path();
        fs::write(&path, serde_json::to_string_pretty(params)?)?;
        Ok(path)
    }
}
