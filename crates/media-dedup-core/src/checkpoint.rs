//! Point-in-time snapshots of the dedup artifacts.
//!
//! A checkpoint is a new timestamped directory under `<state>/checkpoints`
//! holding copies of the well-known artifacts, a `checkpoint.log` and a
//! `manifest.json`. Checkpoints are never modified or removed once written.

use chrono::Local;
use filetime::FileTime;
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::{Config, StateLayout};
use crate::disk_usage::disk_usage;
use crate::error::{Error, Result};
use crate::logging::{log_file_error, log_fs_modification};
use crate::processing::{compute_digest, DEFAULT_BUFFER_SIZE};

const LOG_FILE: &str = "checkpoint.log";
const MANIFEST_FILE: &str = "manifest.json";
const MAX_NAME_ATTEMPTS: usize = 100;

/// One artifact copied into a checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub bytes: u64,
    /// Digest of the copy, when verification ran
    pub sha256: Option<String>,
    /// Whether the copy re-hashed equal to its source
    pub verified: Option<bool>,
}

/// An artifact that existed but could not be copied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedCopy {
    pub source: PathBuf,
    pub error: String,
}

/// Result of creating one checkpoint
#[derive(Debug, Clone, Serialize)]
pub struct Checkpoint {
    pub dir: PathBuf,
    pub created_at: String,
    pub description: String,
    pub copied: Vec<ArtifactRecord>,
    pub missing: Vec<PathBuf>,
    pub failed: Vec<FailedCopy>,
    pub disk_usage: Vec<String>,
}

impl Checkpoint {
    /// True when every copy was verified equal to its source
    pub fn is_verified(&self) -> bool {
        self.failed.is_empty() && self.copied.iter().all(|a| a.verified == Some(true))
    }
}

/// Creates and lists checkpoints for one state directory
pub struct CheckpointManager {
    layout: StateLayout,
    disk_targets: Vec<PathBuf>,
    verify: bool,
    buffer_size: usize,
}

impl CheckpointManager {
    pub fn new(layout: StateLayout, disk_targets: Vec<PathBuf>) -> Self {
        Self {
            layout,
            disk_targets,
            verify: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            layout: config.layout(),
            disk_targets: config.disk_usage_targets.clone(),
            verify: config.verify_checkpoints,
            buffer_size: config.buffer_size,
        }
    }

    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn root(&self) -> PathBuf {
        self.layout.checkpoints()
    }

    /// Snapshot the current artifacts. Missing artifacts are skipped and
    /// individual copy failures are recorded without aborting.
    pub fn create(&self, description: &str) -> Result<Checkpoint> {
        let now = Local::now();
        let root = self.root();
        fs::create_dir_all(&root).map_err(|e| {
            Error::Checkpoint(format!("cannot create {}: {}", root.display(), e))
        })?;
        let dir = create_unique_dir(&root, &now.format("%Y%m%d_%H%M%S").to_string())?;

        let mut checkpoint = Checkpoint {
            dir: dir.clone(),
            created_at: now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            description: description.to_string(),
            copied: Vec::new(),
            missing: Vec::new(),
            failed: Vec::new(),
            disk_usage: Vec::new(),
        };

        let mut log = BufWriter::new(File::create(dir.join(LOG_FILE))?);
        writeln!(log, "{} - {}", checkpoint.created_at, description)?;

        for source in self.layout.checkpoint_artifacts() {
            if !source.is_file() {
                writeln!(log, "missing {}", source.display())?;
                checkpoint.missing.push(source);
                continue;
            }
            let Some(name) = source.file_name() else {
                continue;
            };
            let destination = dir.join(name);
            match fs::copy(&source, &destination) {
                Ok(bytes) => {
                    if let Err(e) = copy_mtime(&source, &destination) {
                        log_file_error(&destination, "checkpoint_mtime", &e);
                    }
                    writeln!(log, "copied {} -> {}", source.display(), destination.display())?;
                    checkpoint.copied.push(ArtifactRecord {
                        source,
                        destination,
                        bytes,
                        sha256: None,
                        verified: None,
                    });
                }
                Err(e) => {
                    log_file_error(&source, "checkpoint_copy", &e);
                    writeln!(log, "FAILED {}: {}", source.display(), e)?;
                    checkpoint.failed.push(FailedCopy {
                        source,
                        error: e.to_string(),
                    });
                }
            }
        }

        if self.verify {
            self.verify_copies(&mut checkpoint.copied);
            for record in &checkpoint.copied {
                match (&record.sha256, record.verified) {
                    (Some(digest), Some(true)) => {
                        writeln!(log, "verified sha256 {} {}", digest, record.destination.display())?
                    }
                    _ => writeln!(log, "verify FAILED {}", record.destination.display())?,
                }
            }
        }

        writeln!(log, "df summary:")?;
        for usage in disk_usage(&self.disk_targets) {
            let text = match usage {
                Ok(usage) => usage.to_df_lines(),
                Err(reason) => format!("unavailable: {}", reason),
            };
            writeln!(log, "{}", text)?;
            checkpoint.disk_usage.push(text);
        }
        log.flush()?;

        let mut manifest = BufWriter::new(File::create(dir.join(MANIFEST_FILE))?);
        serde_json::to_writer_pretty(&mut manifest, &checkpoint)?;
        manifest.flush()?;

        log_fs_modification(
            "checkpoint",
            &dir,
            Some(&format!(
                "{} copied, {} missing, {} failed",
                checkpoint.copied.len(),
                checkpoint.missing.len(),
                checkpoint.failed.len()
            )),
        );
        if !checkpoint.failed.is_empty() || (self.verify && !checkpoint.is_verified()) {
            warn!("Checkpoint {} is incomplete or unverified", dir.display());
        }
        Ok(checkpoint)
    }

    /// Re-hash each copy and its source in parallel
    fn verify_copies(&self, records: &mut [ArtifactRecord]) {
        let buffer_size = self.buffer_size;
        records.par_iter_mut().for_each(|record| {
            let copy = compute_digest(&record.destination, buffer_size);
            let original = compute_digest(&record.source, buffer_size);
            match (copy, original) {
                (Ok(copy), Ok(original)) => {
                    record.verified = Some(copy == original);
                    record.sha256 = Some(copy.to_string());
                }
                (Err(e), _) | (_, Err(e)) => {
                    log_file_error(&record.destination, "checkpoint_verify", &e);
                    record.verified = Some(false);
                }
            }
        });
    }

    /// Existing checkpoint directories, oldest first
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let root = self.root();
        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

/// Give `destination` the modification time of `source`
fn copy_mtime(source: &Path, destination: &Path) -> io::Result<()> {
    let mtime = FileTime::from_last_modification_time(&fs::metadata(source)?);
    filetime::set_file_mtime(destination, mtime)
}

/// Create `<root>/<name>`, adding `_2`, `_3`, ... when it already exists
fn create_unique_dir(root: &Path, name: &str) -> Result<PathBuf> {
    for attempt in 1..=MAX_NAME_ATTEMPTS {
        let candidate = if attempt == 1 {
            root.join(name)
        } else {
            root.join(format!("{}_{}", name, attempt))
        };
        match fs::create_dir(&candidate) {
            Ok(()) => {
                info!("Created checkpoint directory {}", candidate.display());
                return Ok(candidate);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(Error::Checkpoint(format!(
                    "cannot create {}: {}",
                    candidate.display(),
                    e
                )))
            }
        }
    }
    Err(Error::Checkpoint(format!(
        "no free checkpoint name for {} under {}",
        name,
        root.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_unique_dir_adds_suffix() {
        let dir = tempdir().unwrap();
        let first = create_unique_dir(dir.path(), "20240101_120000").unwrap();
        let second = create_unique_dir(dir.path(), "20240101_120000").unwrap();

        assert_eq!(first, dir.path().join("20240101_120000"));
        assert_eq!(second, dir.path().join("20240101_120000_2"));
    }

    #[test]
    fn test_empty_state_dir_still_checkpoints() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(StateLayout::new(dir.path()), vec![]);

        let checkpoint = manager.create("nothing yet").unwrap();

        assert!(checkpoint.copied.is_empty());
        assert_eq!(checkpoint.missing.len(), 5);
        let log = fs::read_to_string(checkpoint.dir.join(LOG_FILE)).unwrap();
        assert!(log.lines().next().unwrap().ends_with(" - nothing yet"));
        assert!(log.contains("df summary:"));
    }

    #[test]
    fn test_list_is_sorted() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(StateLayout::new(dir.path()), vec![]);
        assert!(manager.list().unwrap().is_empty());

        fs::create_dir_all(manager.root().join("20240102_000000")).unwrap();
        fs::create_dir_all(manager.root().join("20240101_000000")).unwrap();
        fs::write(manager.root().join("stray.txt"), b"x").unwrap();

        let names: Vec<_> = manager
            .list()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["20240101_000000", "20240102_000000"]);
    }
}
