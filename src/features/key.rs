//! Structured feature cache keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataset::Split;
use crate::encoder::short_name;

/// Identifies one cached (matrix, labels) pair: which encoder produced the
/// features, from which dataset and split, under which extraction settings.
///
/// `params` does not take part in the file name. It is stored in the artifact
/// header, so an entry written under other settings reads as a miss and is
/// replaced by the next write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub encoder: String,
    pub dataset: String,
    pub split: Split,
    /// Canonical description of the settings that shape the features.
    #[serde(default)]
    pub params: String,
}

impl CacheKey {
    pub fn new<E: Into<String>, D: Into<String>>(encoder: E, dataset: D, split: Split) -> Self {
        CacheKey {
            encoder: encoder.into(),
            dataset: dataset.into(),
            split,
            params: String::new(),
        }
    }

    /// Attach the extraction settings the features depend on.
    pub fn with_params<P: Into<String>>(mut self, params: P) -> Self {
        self.params = params.into();
        self
    }

    /// File stem shared by both artifacts: `{split}_{dataset}_{encoder_short}`.
    ///
    /// Components are sanitized so `_` only ever appears as the separator. The
    /// mapping is lossy: `a_b` and `a-b` share a stem, and so do keys differing
    /// only in `params`. Such keys take turns overwriting one file pair, while
    /// the header check keeps either from being read as the other.
    pub fn stem(&self) -> String {
        format!(
            "{}_{}_{}",
            self.split.as_str(),
            sanitize(&self.dataset),
            sanitize(short_name(&self.encoder))
        )
    }

    /// File name of the feature matrix artifact.
    pub fn matrix_file(&self) -> String {
        format!("{MATRIX_PREFIX}{}{ARTIFACT_EXTENSION}", self.stem())
    }

    /// File name of the label vector artifact.
    pub fn labels_file(&self) -> String {
        format!("{LABELS_PREFIX}{}{ARTIFACT_EXTENSION}", self.stem())
    }
}

pub(crate) const MATRIX_PREFIX: &str = "X_feat_";
pub(crate) const LABELS_PREFIX: &str = "y_";
pub(crate) const ARTIFACT_EXTENSION: &str = ".bin";

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.encoder, self.dataset, self.split)
    }
}

pub(crate) fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
