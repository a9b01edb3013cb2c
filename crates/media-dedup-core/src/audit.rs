//! Store verification and explicit invalidation.
//!
//! The indexer never re-hashes a recorded path, so a file whose content
//! changes keeps its first digest forever. An audit re-hashes recorded paths
//! and reports which ones drifted; pruning removes those rows so the next
//! indexing run hashes them again.

use log::info;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::logging::log_fs_modification;
use crate::processing::compute_digest;
use crate::store::{load_entries, MalformedPolicy, ParsedRow, Store};
use crate::types::{Digest, HashEntry};

/// State of one recorded path compared with the file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Unchanged,
    Changed { current: Digest },
    Missing,
    Unreadable(String),
}

impl EntryStatus {
    /// Rows in these states no longer describe the file and get pruned
    pub fn is_stale(&self) -> bool {
        matches!(self, EntryStatus::Changed { .. } | EntryStatus::Missing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditedEntry {
    pub entry: HashEntry,
    pub status: EntryStatus,
}

/// Outcome of verifying a store
#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    pub entries: Vec<AuditedEntry>,
    /// Rows outside the requested root, left untouched
    pub out_of_scope: usize,
}

impl AuditReport {
    pub fn count(&self, pred: impl Fn(&EntryStatus) -> bool) -> usize {
        self.entries.iter().filter(|a| pred(&a.status)).count()
    }

    pub fn stale(&self) -> impl Iterator<Item = &AuditedEntry> {
        self.entries.iter().filter(|a| a.status.is_stale())
    }
}

/// Re-hash the entries of `store`, optionally only those under `root`
pub fn audit_store<S: Store + ?Sized>(
    store: &S,
    root: Option<&Path>,
    buffer_size: usize,
) -> Result<AuditReport> {
    let loaded = load_entries(store, MalformedPolicy::Skip)?;
    let (in_scope, out_of_scope): (Vec<HashEntry>, Vec<HashEntry>) = loaded
        .entries
        .into_iter()
        .partition(|e| root.map_or(true, |r| Path::new(&e.path).starts_with(r)));

    let entries: Vec<AuditedEntry> = in_scope
        .into_par_iter()
        .map(|entry| {
            let status = check_entry(&entry, buffer_size);
            AuditedEntry { entry, status }
        })
        .collect();

    let report = AuditReport {
        entries,
        out_of_scope: out_of_scope.len(),
    };
    info!(
        "Audited {}: {} unchanged, {} changed, {} missing, {} unreadable",
        store.location(),
        report.count(|s| *s == EntryStatus::Unchanged),
        report.count(|s| matches!(s, EntryStatus::Changed { .. })),
        report.count(|s| *s == EntryStatus::Missing),
        report.count(|s| matches!(s, EntryStatus::Unreadable(_))),
    );
    Ok(report)
}

fn check_entry(entry: &HashEntry, buffer_size: usize) -> EntryStatus {
    let path = PathBuf::from(&entry.path);
    if !path.is_file() {
        return EntryStatus::Missing;
    }
    match compute_digest(&path, buffer_size) {
        Ok(current) if current == entry.digest => EntryStatus::Unchanged,
        Ok(current) => EntryStatus::Changed { current },
        Err(e) => EntryStatus::Unreadable(e.to_string()),
    }
}

/// Rewrite `store` without the stale rows of `report`.
/// Malformed rows are written back untouched. Returns the number of rows
/// removed.
pub fn prune_stale<S: Store + ?Sized>(store: &mut S, report: &AuditReport) -> Result<usize> {
    let stale: HashSet<&HashEntry> = report.stale().map(|a| &a.entry).collect();
    if stale.is_empty() {
        return Ok(0);
    }

    let rows = store.load()?;
    let before = rows.len();
    let kept: Vec<ParsedRow> = rows
        .into_iter()
        .filter(|row| !matches!(row, ParsedRow::Entry(e) if stale.contains(e)))
        .collect();
    let removed = before - kept.len();

    store.replace(&kept)?;
    log_fs_modification(
        "prune_store",
        Path::new(&store.location()),
        Some(&format!("{} stale rows removed", removed)),
    );
    Ok(removed)
}
