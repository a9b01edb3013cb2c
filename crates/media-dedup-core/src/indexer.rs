//! Incremental content-hash indexer.
//!
//! Walks a root directory, skips every path already recorded in the target
//! store, hashes the rest on a bounded worker pool and appends one
//! `(digest, path)` row per file through a single writer. Re-running over an
//! unchanged tree appends nothing.

use log::{debug, info, warn};
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::Config;
use crate::discovery::{resolve_root, walk_files, Discovered};
use crate::error::{Error, Result};
use crate::logging::log_hash_error;
use crate::processing::{HashJob, HashOutcome, HashPool, DEFAULT_BUFFER_SIZE};
use crate::progress::IndexProgress;
use crate::store::{load_entries, MalformedPolicy, Store};
use crate::types::HashEntry;

/// Options for one indexing run
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Maximum number of rows appended by this run (`None` or 0 = no cap)
    pub limit: Option<usize>,
    pub threads: usize,
    pub queue_depth: usize,
    pub buffer_size: usize,
    pub show_progress: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            limit: None,
            threads: num_cpus::get().max(1),
            queue_depth: 256,
            buffer_size: DEFAULT_BUFFER_SIZE,
            show_progress: false,
        }
    }
}

impl IndexOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            limit: None,
            threads: config.worker_threads(),
            queue_depth: config.queue_depth,
            buffer_size: config.buffer_size,
            show_progress: config.show_progress,
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit.filter(|&n| n > 0);
        self
    }
}

/// How an indexing run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Every eligible file was hashed
    Completed,

    /// The per-run cap was exhausted; a continuation run has more to do
    LimitReached,

    /// Nothing new under the root
    NoNewFiles,
}

/// Counts gathered during one indexing run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSummary {
    pub root: PathBuf,
    pub outcome: IndexOutcome,
    /// Rows appended to the store
    pub hashed: usize,
    /// Files skipped because their path was already recorded
    pub already_indexed: usize,
    /// Files that could not be opened or read
    pub skipped: usize,
    /// Files whose path cannot be stored in a TSV row
    pub unrepresentable: usize,
    /// Directory entries the walk could not read
    pub walk_errors: usize,
    /// Malformed rows found while loading the store
    pub malformed_rows: usize,
}

/// Walks a root and appends new content digests to a hash store
pub struct HashIndexer {
    options: IndexOptions,
}

impl HashIndexer {
    pub fn new(options: IndexOptions) -> Self {
        Self { options }
    }

    /// Index `root` into `store`
    pub fn run<S: Store>(&self, root: &Path, store: &mut S) -> Result<IndexSummary> {
        self.run_with(root, store, |_| {})
    }

    /// Index `root` into `store`, calling `on_hashed` after each appended row
    pub fn run_with<S, F>(&self, root: &Path, store: &mut S, mut on_hashed: F) -> Result<IndexSummary>
    where
        S: Store,
        F: FnMut(&HashEntry),
    {
        let root = resolve_root(root)?;

        let (known, malformed_rows) = if store.exists() {
            let loaded = load_entries(store, MalformedPolicy::Skip)?;
            let known: HashSet<String> = loaded.entries.into_iter().map(|e| e.path).collect();
            (known, loaded.malformed)
        } else {
            (HashSet::new(), 0)
        };
        info!(
            "Indexing '{}' into {} ({} paths already recorded)",
            root.display(),
            store.location(),
            known.len()
        );

        let already_indexed = AtomicUsize::new(0);
        let unrepresentable = AtomicUsize::new(0);
        let walk_errors = AtomicUsize::new(0);

        let jobs = walk_files(&root).filter_map(|found| match found {
            Discovered::File { path, recorded } => {
                if known.contains(&recorded) {
                    already_indexed.fetch_add(1, Ordering::Relaxed);
                    None
                } else {
                    Some(HashJob { path, recorded })
                }
            }
            Discovered::Unrepresentable(path) => {
                warn!("Skipping path that cannot be stored: {:?}", path);
                unrepresentable.fetch_add(1, Ordering::Relaxed);
                None
            }
            Discovered::WalkError(e) => {
                warn!("Walk error under '{}': {}", root.display(), e);
                walk_errors.fetch_add(1, Ordering::Relaxed);
                None
            }
        });

        let pool = HashPool::new(
            self.options.threads,
            self.options.queue_depth,
            self.options.buffer_size,
        );
        let progress = IndexProgress::new(self.options.show_progress);
        let limit = self.options.limit.filter(|&n| n > 0);

        let mut hashed = 0usize;
        let mut skipped = 0usize;
        let mut limit_reached = false;
        let mut write_error: Option<Error> = None;

        pool.run(jobs, |outcome| {
            match outcome {
                HashOutcome::Hashed(entry) => {
                    if let Err(e) = store.append(&entry) {
                        write_error = Some(e);
                        return ControlFlow::Break(());
                    }
                    hashed += 1;
                    debug!("Hashed {} {}", entry.digest, entry.path);
                    on_hashed(&entry);
                    progress.hashed();

                    if limit.is_some_and(|cap| hashed >= cap) {
                        limit_reached = true;
                        return ControlFlow::Break(());
                    }
                }
                HashOutcome::Skipped { path, error } => {
                    log_hash_error(&path, &error);
                    skipped += 1;
                }
            }
            ControlFlow::Continue(())
        });

        if let Some(e) = write_error {
            progress.finish("aborted");
            return Err(e);
        }

        let outcome = if limit_reached {
            IndexOutcome::LimitReached
        } else if hashed == 0 {
            IndexOutcome::NoNewFiles
        } else {
            IndexOutcome::Completed
        };
        progress.finish(&format!("{} files hashed", hashed));

        let summary = IndexSummary {
            root,
            outcome,
            hashed,
            already_indexed: already_indexed.into_inner(),
            skipped,
            unrepresentable: unrepresentable.into_inner(),
            walk_errors: walk_errors.into_inner(),
            malformed_rows,
        };
        info!(
            "Indexing finished: {:?}, {} hashed, {} already indexed, {} skipped",
            summary.outcome, summary.hashed, summary.already_indexed, summary.skipped
        );
        Ok(summary)
    }
}
