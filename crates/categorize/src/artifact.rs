use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Format tag written into every model artifact.
pub const ARTIFACT_FORMAT: &str = "spendwise-categorizer";
/// Bumped whenever the artifact layout or feature extraction changes.
pub const ARTIFACT_VERSION: u32 = 2;

/// Descriptive header stored alongside the fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub format: String,
    pub version: u32,
    /// Label set frozen at training time, in taxonomy declaration order.
    pub labels: Vec<String>,
    /// SHA-256 hex digest of `labels`; identifies the taxonomy the model was trained on.
    pub label_fingerprint: String,
    pub examples: usize,
    pub vocabulary_size: usize,
    pub ngram_range: (usize, usize),
    pub trained_at: DateTime<Utc>,
}

/// The minimum needed to decide whether an artifact is readable at all.
#[derive(Debug, Deserialize)]
pub(crate) struct ArtifactHeader {
    pub metadata: HeaderFields,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HeaderFields {
    pub format: String,
    pub version: u32,
}

/// Fingerprint of an ordered label set.
pub fn label_fingerprint<S: AsRef<str>>(labels: &[S]) -> String {
    let mut hasher = Sha256::new();
    for label in labels {
        hasher.update(label.as_ref().as_bytes());
        hasher.update([0u8]);
    }
    let hash: [u8; 32] = hasher.finalize().into();
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// Temporary sibling used while writing `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `bytes` to a temporary sibling, fsync it and rename it over `path`,
/// so readers only ever see the previous file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    let result = (|| -> io::Result<()> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}
