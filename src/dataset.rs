//! Labeled text datasets partitioned into train/validation/test splits.
//!
//! A [`DatasetProvider`] turns a dataset identifier into a [`Dataset`]. The
//! built-in [`JsonlDatasetProvider`] reads one JSON object per line:
//!
//! ```text
//! data/
//! └── reviews/
//!     ├── train.jsonl   {"text": "great product", "label": 4}
//!     ├── valid.jsonl
//!     └── test.jsonl
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SheafError};
use crate::features::MAX_CLASSES;

/// One labeled text example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    /// Raw text.
    pub text: String,
    /// Class index.
    pub label: usize,
}

impl Example {
    pub fn new<S: Into<String>>(text: S, label: usize) -> Self {
        Example {
            text: text.into(),
            label,
        }
    }
}

/// Named partition of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Split {
    #[serde(rename = "train")]
    Train,
    #[serde(rename = "valid", alias = "validation")]
    Validation,
    #[serde(rename = "test")]
    Test,
}

impl Split {
    /// All splits in canonical order.
    pub const ALL: [Split; 3] = [Split::Train, Split::Validation, Split::Test];

    /// Canonical on-disk name of the split.
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "valid",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = SheafError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "valid" | "validation" => Ok(Split::Validation),
            "test" => Ok(Split::Test),
            other => Err(SheafError::invalid_argument(format!(
                "unknown split '{other}' (expected train, valid or test)"
            ))),
        }
    }
}

/// A dataset loaded for the duration of a run.
#[derive(Debug, Clone)]
pub struct Dataset {
    id: String,
    splits: BTreeMap<Split, Vec<Example>>,
}

impl Dataset {
    /// Create an empty dataset.
    pub fn new<S: Into<String>>(id: S) -> Self {
        Dataset {
            id: id.into(),
            splits: BTreeMap::new(),
        }
    }

    /// Builder-style split insertion.
    pub fn with_split(mut self, split: Split, examples: Vec<Example>) -> Self {
        self.splits.insert(split, examples);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Examples of a split, in load order.
    pub fn split(&self, split: Split) -> Result<&[Example]> {
        self.splits
            .get(&split)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                SheafError::dataset(format!("dataset '{}' has no '{split}' split", self.id))
            })
    }

    pub fn has_split(&self, split: Split) -> bool {
        self.splits.contains_key(&split)
    }

    /// Splits present in this dataset.
    pub fn splits(&self) -> impl Iterator<Item = Split> + '_ {
        self.splits.keys().copied()
    }

    /// Labels of a split, in load order.
    pub fn labels(&self, split: Split) -> Result<Vec<usize>> {
        Ok(self.split(split)?.iter().map(|e| e.label).collect())
    }

    /// Number of classes observed across all splits (max label + 1).
    pub fn num_classes(&self) -> usize {
        self.splits
            .values()
            .flatten()
            .map(|e| e.label.saturating_add(1))
            .max()
            .unwrap_or(0)
    }
}

/// Supplies datasets by identifier.
pub trait DatasetProvider {
    /// Load every available split of the dataset.
    fn load(&self, dataset_id: &str) -> Result<Dataset>;
}

/// Reads `{root}/{dataset_id}/{split}.jsonl` files.
#[derive(Debug, Clone)]
pub struct JsonlDatasetProvider {
    root: PathBuf,
}

impl JsonlDatasetProvider {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        JsonlDatasetProvider {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_split(path: &Path) -> Result<Vec<Example>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut examples = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let example: Example = serde_json::from_str(&line).map_err(|e| {
                SheafError::dataset(format!(
                    "{}:{}: malformed record: {e}",
                    path.display(),
                    line_num + 1
                ))
            })?;
            if example.label >= MAX_CLASSES {
                return Err(SheafError::dataset(format!(
                    "{}:{}: label {} exceeds the limit of {MAX_CLASSES} classes",
                    path.display(),
                    line_num + 1,
                    example.label
                )));
            }
            examples.push(example);
        }

        Ok(examples)
    }
}

impl DatasetProvider for JsonlDatasetProvider {
    fn load(&self, dataset_id: &str) -> Result<Dataset> {
        let dir = self.root.join(dataset_id);
        if !dir.is_dir() {
            return Err(SheafError::config(format!(
                "unknown dataset '{dataset_id}': {} is not a directory",
                dir.display()
            )));
        }

        let mut dataset = Dataset::new(dataset_id);
        for split in Split::ALL {
            let path = dir.join(format!("{split}.jsonl"));
            if !path.is_file() {
                debug!("dataset '{dataset_id}' has no {split} split");
                continue;
            }
            let examples = Self::read_split(&path)?;
            debug!("loaded {} {split} examples from {}", examples.len(), path.display());
            dataset.splits.insert(split, examples);
        }

        if dataset.splits.is_empty() {
            return Err(SheafError::dataset(format!(
                "dataset '{dataset_id}' contains no split files in {}",
                dir.display()
            )));
        }

        info!(
            "loaded dataset '{dataset_id}' ({} classes, splits: {})",
            dataset.num_classes(),
            dataset
                .splits()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(dataset)
    }
}

/// In-memory provider, handy for tests and embedding the library.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDatasetProvider {
    datasets: BTreeMap<String, Dataset>,
}

impl InMemoryDatasetProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dataset: Dataset) {
        self.datasets.insert(dataset.id.clone(), dataset);
    }
}

impl DatasetProvider for InMemoryDatasetProvider {
    fn load(&self, dataset_id: &str) -> Result<Dataset> {
        self.datasets
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| SheafError::config(format!("unknown dataset '{dataset_id}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_split(dir: &Path, name: &str, lines: &[&str]) {
        let mut file = File::create(dir.join(name)).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
    }

    #[test]
    fn test_split_parsing() {
        assert_eq!("train".parse::<Split>().unwrap(), Split::Train);
        assert_eq!("validation".parse::<Split>().unwrap(), Split::Validation);
        assert_eq!("VALID".parse::<Split>().unwrap(), Split::Validation);
        assert!("dev".parse::<Split>().is_err());
        assert_eq!(Split::Validation.to_string(), "valid");
    }

    #[test]
    fn test_jsonl_provider_loads_splits_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("small");
        std::fs::create_dir(&dir).unwrap();
        write_split(
            &dir,
            "train.jsonl",
            &[
                r#"{"text": "a", "label": 0}"#,
                "",
                r#"{"text": "b", "label": 3}"#,
            ],
        );
        write_split(&dir, "test.jsonl", &[r#"{"text": "c", "label": 1}"#]);

        let provider = JsonlDatasetProvider::new(temp_dir.path());
        let dataset = provider.load("small").unwrap();

        let train = dataset.split(Split::Train).unwrap();
        assert_eq!(train, &[Example::new("a", 0), Example::new("b", 3)]);
        assert!(!dataset.has_split(Split::Validation));
        assert!(dataset.split(Split::Validation).is_err());
        assert_eq!(dataset.num_classes(), 4);
        assert_eq!(dataset.labels(Split::Test).unwrap(), vec![1]);
    }

    #[test]
    fn test_unknown_dataset_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let provider = JsonlDatasetProvider::new(temp_dir.path());
        let err = provider.load("missing").unwrap_err();
        assert!(matches!(err, SheafError::Config(_)));
    }

    #[test]
    fn test_malformed_line_reports_location() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("broken");
        std::fs::create_dir(&dir).unwrap();
        write_split(
            &dir,
            "train.jsonl",
            &[r#"{"text": "ok", "label": 0}"#, r#"{"text": 1}"#],
        );

        let provider = JsonlDatasetProvider::new(temp_dir.path());
        let err = provider.load("broken").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("train.jsonl:2"), "{message}");
    }

    #[test]
    fn test_oversized_label_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("huge");
        std::fs::create_dir(&dir).unwrap();
        write_split(
            &dir,
            "train.jsonl",
            &[
                r#"{"text": "ok", "label": 1}"#,
                r#"{"text": "bad", "label": 18446744073709551615}"#,
            ],
        );

        let err = JsonlDatasetProvider::new(temp_dir.path())
            .load("huge")
            .unwrap_err();
        assert!(matches!(err, SheafError::Dataset(_)));
        assert!(err.to_string().contains("train.jsonl:2"), "{err}");
    }

    #[test]
    fn test_num_classes_saturates() {
        let dataset = Dataset::new("edge")
            .with_split(Split::Train, vec![Example::new("x", usize::MAX)]);
        assert_eq!(dataset.num_classes(), usize::MAX);
    }
}
