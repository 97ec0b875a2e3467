//! Persistence of the last validation run
//!
//! `--validate-rules` stores its results so `--generate-report` can render
//! them later without sending traffic again. The file wraps the run with a
//! format version and a SHA-256 checksum of the run's JSON.
//!
//! A run records the canonical path and content checksum of the rules file
//! it validated; it is only reused for that exact file content.

use crate::core::error::{Error, Result, ResultsError};
use crate::core::rules::RuleSource;
use crate::core::validator::ValidationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Current on-disk format version
pub const RESULTS_FORMAT_VERSION: u32 = 2;

const RESULTS_FILE_NAME: &str = "last_run.json";

/// One complete validation run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationRun {
    pub validated_at: DateTime<Utc>,
    pub source: RuleSource,
    pub results: Vec<ValidationResult>,
}

impl ValidationRun {
    pub fn new(source: RuleSource, results: Vec<ValidationResult>) -> Self {
        Self {
            validated_at: Utc::now(),
            source,
            results,
        }
    }

    /// Whether this run validated exactly the rules file described by `source`
    pub fn is_for(&self, source: &RuleSource) -> bool {
        self.source == *source
    }
}

#[derive(Serialize, Deserialize)]
struct StoredRun {
    version: u32,
    checksum: String,
    run: ValidationRun,
}

/// Location of the persisted run inside a state directory
pub fn results_path(state_dir: &Path) -> PathBuf {
    state_dir.join(RESULTS_FILE_NAME)
}

/// Computes the SHA-256 checksum of a run's canonical JSON.
///
/// # Errors
///
/// Returns `Err` if the run cannot be serialized.
pub fn compute_checksum(run: &ValidationRun) -> Result<String> {
    let json = serde_json::to_string(run)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Saves a run using an atomic write pattern.
/// 1. Writes to a temporary file next to the target.
/// 2. Creates it with mode 0o600 before any data is written.
/// 3. Atomically renames to the target path.
///
/// # Errors
///
/// Returns `Err` if the directory cannot be created or the file cannot be written.
pub async fn save_run(path: &Path, run: &ValidationRun) -> Result<()> {
    let stored = StoredRun {
        version: RESULTS_FORMAT_VERSION,
        checksum: compute_checksum(run)?,
        run: run.clone(),
    };
    let json = serde_json::to_string_pretty(&stored)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    tokio::fs::rename(&temp_path, path).await?;
    info!(
        "Saved validation run ({} results) to {}",
        run.results.len(),
        path.display()
    );
    Ok(())
}

/// Loads the persisted run, if any.
///
/// Returns `Ok(None)` when no run has been saved yet.
///
/// # Errors
///
/// Returns `Err` if the file exists but cannot be read, is malformed, has an
/// unknown format version, or fails its checksum.
pub async fn load_run(path: &Path) -> Result<Option<ValidationRun>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let stored: StoredRun = serde_json::from_str(&content).map_err(|e| {
        warn!("Results file {} is malformed: {e}", path.display());
        Error::Results(ResultsError::Corrupted)
    })?;

    if stored.version != RESULTS_FORMAT_VERSION {
        return Err(ResultsError::VersionMismatch {
            found: stored.version,
            expected: RESULTS_FORMAT_VERSION,
        }
        .into());
    }

    let actual = compute_checksum(&stored.run)?;
    if actual != stored.checksum {
        warn!("Results file {} failed checksum verification", path.display());
        return Err(ResultsError::ChecksumMismatch {
            expected: stored.checksum,
            actual,
        }
        .into());
    }

    Ok(Some(stored.run))
}
