//! On-disk feature cache.
//!
//! Each [`CacheKey`] maps to two artifacts in the cache directory:
//!
//! - `X_feat_{stem}.bin` - the feature matrix
//! - `y_{stem}.bin` - the label vector
//!
//! Both carry a header (magic, format version, full key including the
//! extraction settings, shape), a shared pair
//! fingerprint and a trailing CRC32. A missing, truncated, corrupted or
//! mismatched entry is reported as a miss so the caller recomputes it; nothing
//! read from disk is trusted without these checks. Entries are never
//! invalidated automatically, only through [`FeatureCache::remove`] and
//! [`FeatureCache::clear`].

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::dataset::Split;
use crate::error::{Result, SheafError};
use crate::features::artifact::{ArtifactReader, ArtifactWriter, Rejection};
use crate::features::key::{ARTIFACT_EXTENSION, CacheKey, LABELS_PREFIX, MATRIX_PREFIX};
use crate::features::matrix::{FeatureMatrix, LabelVector, check_paired};

const MATRIX_MAGIC: &[u8; 4] = b"SHFX";
const LABELS_MAGIC: &[u8; 4] = b"SHFY";
const FORMAT_VERSION: u16 = 2;

/// Feature cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct FeatureCache {
    directory: PathBuf,
}

impl FeatureCache {
    /// Create a cache in the given directory, creating it if needed.
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        if !directory.exists() {
            fs::create_dir_all(&directory).map_err(|e| {
                SheafError::cache(format!(
                    "failed to create cache directory {}: {e}",
                    directory.display()
                ))
            })?;
        }
        if !directory.is_dir() {
            return Err(SheafError::cache(format!(
                "path is not a directory: {}",
                directory.display()
            )));
        }
        Ok(FeatureCache { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Full path of the matrix artifact for a key.
    pub fn matrix_path(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(key.matrix_file())
    }

    /// Full path of the label artifact for a key.
    pub fn labels_path(&self, key: &CacheKey) -> PathBuf {
        self.directory.join(key.labels_file())
    }

    /// Whether both artifacts for the key exist. Does not validate them.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.matrix_path(key).is_file() && self.labels_path(key).is_file()
    }

    /// Load the cached pair, or `None` when absent or invalid.
    pub fn get(&self, key: &CacheKey) -> Result<Option<(FeatureMatrix, LabelVector)>> {
        let Some(matrix_bytes) = read_optional(&self.matrix_path(key))? else {
            debug!("cache miss for {key}: no matrix artifact");
            return Ok(None);
        };
        let Some(label_bytes) = read_optional(&self.labels_path(key))? else {
            debug!("cache miss for {key}: no label artifact");
            return Ok(None);
        };

        let decoded = decode_matrix(&matrix_bytes, key).and_then(|(matrix, matrix_pair)| {
            let (labels, labels_pair) = decode_labels(&label_bytes, key)?;
            if matrix_pair != labels_pair {
                return Err("matrix and label artifacts come from different writes".to_string());
            }
            if matrix.rows() != labels.len() {
                return Err(format!(
                    "matrix has {} rows but label vector has {} entries",
                    matrix.rows(),
                    labels.len()
                ));
            }
            Ok((matrix, labels))
        });

        match decoded {
            Ok((matrix, labels)) => {
                debug!("cache hit for {key}: {:?}", matrix.shape());
                Ok(Some((matrix, labels)))
            }
            Err(reason) => {
                warn!("ignoring cached features for {key}: {reason}");
                Ok(None)
            }
        }
    }

    /// Store a pair, replacing any existing entry for the key.
    pub fn put(&self, key: &CacheKey, matrix: &FeatureMatrix, labels: &LabelVector) -> Result<()> {
        check_paired(matrix, labels)?;

        let pair = pair_fingerprint(matrix, labels);
        let matrix_bytes = encode_matrix(key, matrix, pair);
        let label_bytes = encode_labels(key, labels, pair);

        for (path, bytes) in [
            (self.matrix_path(key), &matrix_bytes),
            (self.labels_path(key), &label_bytes),
        ] {
            write_atomic(&path, bytes).map_err(|e| {
                SheafError::cache(format!("failed to write {}: {e}", path.display()))
            })?;
        }

        info!(
            "cached features for {key} ({} x {}) in {}",
            matrix.rows(),
            matrix.cols(),
            self.directory.display()
        );
        Ok(())
    }

    /// Return the cached pair, computing and storing it on a miss.
    ///
    /// `compute` runs only when [`get`](Self::get) finds no valid entry. If it
    /// fails nothing is written.
    pub fn get_or_compute<F>(&self, key: &CacheKey, compute: F) -> Result<(FeatureMatrix, LabelVector)>
    where
        F: FnOnce() -> Result<(FeatureMatrix, LabelVector)>,
    {
        if let Some(hit) = self.get(key)? {
            return Ok(hit);
        }
        let (matrix, labels) = compute()?;
        self.put(key, &matrix, &labels)?;
        Ok((matrix, labels))
    }

    /// Delete both artifacts for a key. Returns whether anything was removed.
    pub fn remove(&self, key: &CacheKey) -> Result<bool> {
        let removed_matrix = remove_optional(&self.matrix_path(key))?;
        let removed_labels = remove_optional(&self.labels_path(key))?;
        Ok(removed_matrix || removed_labels)
    }

    /// Stems of all matrix artifacts in the cache directory, sorted.
    pub fn entries(&self) -> Result<Vec<String>> {
        let mut stems = Vec::new();
        for name in self.artifact_names()? {
            if let Some(stem) = name
                .strip_prefix(MATRIX_PREFIX)
                .and_then(|rest| rest.strip_suffix(ARTIFACT_EXTENSION))
            {
                stems.push(stem.to_string());
            }
        }
        stems.sort();
        Ok(stems)
    }

    /// Delete every cache artifact. Returns the number of files removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for name in self.artifact_names()? {
            if remove_optional(&self.directory.join(&name))? {
                removed += 1;
            }
        }
        info!("removed {removed} cache artifacts from {}", self.directory.display());
        Ok(removed)
    }

    fn artifact_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && is_artifact_name(name)
            {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

fn is_artifact_name(name: &str) -> bool {
    if !name.ends_with(ARTIFACT_EXTENSION) {
        return false;
    }
    let stem = if let Some(rest) = name.strip_prefix(MATRIX_PREFIX) {
        rest
    } else if let Some(rest) = name.strip_prefix(LABELS_PREFIX) {
        rest
    } else {
        return false;
    };
    // Stems always start with a split name.
    Split::ALL
        .iter()
        .any(|split| stem.starts_with(&format!("{}_", split.as_str())))
}

fn pair_fingerprint(matrix: &FeatureMatrix, labels: &LabelVector) -> u64 {
    let mut hasher = crc32fast::Hasher::new();
    for value in matrix.as_slice() {
        hasher.update(&value.to_le_bytes());
    }
    let matrix_crc = hasher.finalize();

    let mut hasher = crc32fast::Hasher::new();
    for &label in labels.iter() {
        hasher.update(&(label as u64).to_le_bytes());
    }
    let labels_crc = hasher.finalize();

    (u64::from(matrix_crc) << 32) | u64::from(labels_crc)
}

fn write_header(writer: &mut ArtifactWriter, magic: &[u8; 4], key: &CacheKey, pair: u64) {
    writer.write_magic(magic);
    writer.write_u16(FORMAT_VERSION);
    writer.write_string(&key.encoder);
    writer.write_string(&key.dataset);
    writer.write_string(key.split.as_str());
    writer.write_string(&key.params);
    writer.write_u64(pair);
}

fn read_header(
    reader: &mut ArtifactReader<'_>,
    magic: &[u8; 4],
    key: &CacheKey,
) -> std::result::Result<u64, Rejection> {
    reader.read_magic(magic)?;
    let version = reader.read_u16()?;
    if version != FORMAT_VERSION {
        return Err(format!("unsupported format version {version}"));
    }
    let encoder = reader.read_string()?;
    let dataset = reader.read_string()?;
    let split = reader.read_string()?;
    if encoder != key.encoder || dataset != key.dataset || split != key.split.as_str() {
        return Err(format!(
            "artifact belongs to {encoder}/{dataset}/{split}, not {key}"
        ));
    }
    let params = reader.read_string()?;
    if params != key.params {
        return Err(format!(
            "artifact was extracted with [{params}], not [{}]",
            key.params
        ));
    }
    reader.read_u64()
}

fn encode_matrix(key: &CacheKey, matrix: &FeatureMatrix, pair: u64) -> Vec<u8> {
    let mut writer = ArtifactWriter::with_capacity(64 + matrix.as_slice().len() * 4);
    write_header(&mut writer, MATRIX_MAGIC, key, pair);
    writer.write_u64(matrix.rows() as u64);
    writer.write_u64(matrix.cols() as u64);
    for &value in matrix.as_slice() {
        writer.write_f32(value);
    }
    writer.finish()
}

fn decode_matrix(
    bytes: &[u8],
    key: &CacheKey,
) -> std::result::Result<(FeatureMatrix, u64), Rejection> {
    let mut reader = ArtifactReader::open(bytes)?;
    let pair = read_header(&mut reader, MATRIX_MAGIC, key)?;
    let rows = reader.read_u64()? as usize;
    let cols = reader.read_u64()? as usize;
    let count = rows
        .checked_mul(cols)
        .ok_or_else(|| format!("shape ({rows}, {cols}) overflows"))?;
    let data = reader.read_f32s(count)?;
    reader.finish()?;
    let matrix = FeatureMatrix::new(rows, cols, data).map_err(|e| e.to_string())?;
    Ok((matrix, pair))
}

fn encode_labels(key: &CacheKey, labels: &LabelVector, pair: u64) -> Vec<u8> {
    let mut writer = ArtifactWriter::with_capacity(64 + labels.len() * 8);
    write_header(&mut writer, LABELS_MAGIC, key, pair);
    writer.write_u64(labels.len() as u64);
    for &label in labels.iter() {
        writer.write_u64(label as u64);
    }
    writer.finish()
}

fn decode_labels(
    bytes: &[u8],
    key: &CacheKey,
) -> std::result::Result<(LabelVector, u64), Rejection> {
    let mut reader = ArtifactReader::open(bytes)?;
    let pair = read_header(&mut reader, LABELS_MAGIC, key)?;
    let len = reader.read_u64()? as usize;
    let labels = reader
        .read_u64s(len)?
        .into_iter()
        .map(|label| label as usize)
        .collect();
    reader.finish()?;
    Ok((labels, pair))
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SheafError::cache(format!(
            "failed to read {}: {e}",
            path.display()
        ))),
    }
}

fn remove_optional(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SheafError::cache(format!(
            "failed to remove {}: {e}",
            path.display()
        ))),
    }
}

/// Write through a temporary sibling and rename it into place, so readers
/// never observe a partially written file under `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")
    })?;
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let write = || -> io::Result<()> {
        let mut file: File = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    };

    write().inspect_err(|_| {
        let _ = fs::remove_file(&temp_path);
    })
}
