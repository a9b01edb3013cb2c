//! Content-addressed duplicate detection for large media libraries.
//!
//! This library provides the three stages of the dedup pipeline:
//! - Incremental content-hash indexing into append-only stores
//! - Deterministic duplicate plans (one KEEP per digest, the rest QUARANTINE)
//! - Timestamped checkpoints of the resulting artifacts
//!
//! Nothing here moves or deletes media files; executing a plan is left to
//! the caller.

// -- External Dependencies --
use log::info;
use std::path::Path;

// -- Internal Modules --
mod error;

// -- Public Re-exports --
pub use config::{Config, LogLevel, StateLayout};
pub use error::{Error, Result};
pub use types::*;

// -- Public Modules --
pub mod audit;
pub mod checkpoint;
pub mod config;
pub mod discovery;
pub mod disk_usage;
pub mod indexer;
pub mod logging;
pub mod plan;
pub mod processing;
pub mod progress;
pub mod store;
pub mod types;

use audit::AuditReport;
use checkpoint::{Checkpoint, CheckpointManager};
use indexer::{HashIndexer, IndexOptions, IndexSummary};
use plan::{PlanBuilder, PlanOutputs, Report};
use store::{FileStore, MalformedPolicy, RowLayout};

/// Main entry point wiring configuration into the pipeline stages
pub struct DedupEngine {
    config: Config,
}

impl DedupEngine {
    /// Create a new DedupEngine with the provided configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Hash every new file under `root` into the external store at `store_path`
    pub fn index_root<F>(
        &self,
        root: &Path,
        store_path: &Path,
        limit: Option<usize>,
        on_hashed: F,
    ) -> Result<IndexSummary>
    where
        F: FnMut(&HashEntry),
    {
        let options = IndexOptions::from_config(&self.config).with_limit(limit);
        let mut store = FileStore::new(store_path, RowLayout::External);
        HashIndexer::new(options).run_with(root, &mut store, on_hashed)
    }

    /// Merge the primary and external stores and write plan, tmp index and report
    pub fn build_plan(
        &self,
        hash_index: &Path,
        external: &Path,
        outputs: &PlanOutputs,
    ) -> Result<Report> {
        let policy = if self.config.strict_rows {
            MalformedPolicy::Fail
        } else {
            MalformedPolicy::Skip
        };
        let primary = FileStore::new(hash_index, RowLayout::Primary);
        let external_store = FileStore::new(external, RowLayout::External);

        info!(
            "Building plan from {} and {}",
            hash_index.display(),
            external.display()
        );
        PlanBuilder::new(policy).build(&primary, &external_store, external, outputs)
    }

    /// Snapshot the state directory artifacts
    pub fn checkpoint(&self, description: &str) -> Result<Checkpoint> {
        CheckpointManager::from_config(&self.config).create(description)
    }

    pub fn list_checkpoints(&self) -> Result<Vec<std::path::PathBuf>> {
        CheckpointManager::from_config(&self.config).list()
    }

    /// Re-hash recorded paths; with `prune`, drop the stale rows
    pub fn verify_store(
        &self,
        store_path: &Path,
        root: Option<&Path>,
        prune: bool,
    ) -> Result<(AuditReport, usize)> {
        let mut store = FileStore::new(store_path, RowLayout::External);
        let report = audit::audit_store(&store, root, self.config.buffer_size)?;
        let removed = if prune {
            audit::prune_stale(&mut store, &report)?
        } else {
            0
        };
        Ok((report, removed))
    }
}
