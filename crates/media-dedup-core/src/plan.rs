//! Duplicate plan builder.
//!
//! Merges a primary (library) store with an external store into per-digest
//! groups, primary rows first, each side in insertion order. For every group
//! with two or more paths the first path is labelled KEEP and the rest
//! QUARANTINE. The plan is regenerated from scratch on every run.

use log::{info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::logging::log_fs_modification;
use crate::store::{load_entries, write_atomic, MalformedPolicy, Store};
use crate::types::{Action, Digest, DuplicateGroup, HashEntry, PlanRow};

/// Digest groups in first-seen order
#[derive(Debug, Clone, Default)]
pub struct MergedIndex {
    groups: Vec<DuplicateGroup>,
    positions: HashMap<Digest, usize>,
    seen: HashSet<(Digest, String)>,
    repeated: usize,
}

impl MergedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add entries after everything already merged.
    /// A `(digest, path)` pair seen before is dropped so a path can never
    /// be both kept and quarantined.
    pub fn extend<I: IntoIterator<Item = HashEntry>>(&mut self, entries: I) {
        for entry in entries {
            if !self.seen.insert((entry.digest.clone(), entry.path.clone())) {
                self.repeated += 1;
                continue;
            }
            match self.positions.get(&entry.digest) {
                Some(&idx) => self.groups[idx].paths.push(entry.path),
                None => {
                    self.positions.insert(entry.digest.clone(), self.groups.len());
                    self.groups.push(DuplicateGroup {
                        digest: entry.digest,
                        paths: vec![entry.path],
                    });
                }
            }
        }
    }

    pub fn groups(&self) -> &[DuplicateGroup] {
        &self.groups
    }

    pub fn duplicate_groups(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.groups.iter().filter(|g| g.is_duplicate())
    }

    /// Total number of merged paths, duplicates or not
    pub fn total_paths(&self) -> usize {
        self.groups.iter().map(|g| g.paths.len()).sum()
    }

    /// Repeated `(digest, path)` pairs that were collapsed
    pub fn repeated(&self) -> usize {
        self.repeated
    }

    /// Plan rows for every duplicate group, in merge order
    pub fn plan_rows(&self) -> Vec<PlanRow> {
        self.duplicate_groups().flat_map(|g| g.plan_rows()).collect()
    }
}

/// Output locations of a plan build
#[derive(Debug, Clone)]
pub struct PlanOutputs {
    pub plan: PathBuf,
    pub tmp: PathBuf,
    pub report: PathBuf,
}

/// Summary written next to the plan. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Directory of the external store
    pub roots: PathBuf,
    /// All merged paths, duplicates or not
    pub processed: usize,
    /// Digests with two or more paths
    pub duplicate_hashes: usize,
    /// Paths labelled QUARANTINE
    pub quarantined: usize,
    /// Rows dropped from either store because they could not be parsed
    pub malformed_rows: usize,
    pub plan: PathBuf,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "HASH_DUPES_REPORT")?;
        writeln!(f, "Roots: {}", self.roots.display())?;
        writeln!(f, "Archivos procesados: {}", self.processed)?;
        writeln!(f, "Hashes con duplicados: {}", self.duplicate_hashes)?;
        writeln!(f, "Archivos en cuarentena: {}", self.quarantined)?;
        writeln!(f, "Filas malformadas: {}", self.malformed_rows)?;
        writeln!(f, "Plan: {}", self.plan.display())
    }
}

/// Builds a duplicate plan from a primary and an external hash store
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanBuilder {
    policy: MalformedPolicy,
}

impl PlanBuilder {
    pub fn new(policy: MalformedPolicy) -> Self {
        Self { policy }
    }

    /// Read both stores and merge them, primary rows first.
    /// Returns the merged index and the number of malformed rows skipped.
    pub fn merge<P, E>(&self, primary: &P, external: &E) -> Result<(MergedIndex, usize)>
    where
        P: Store + ?Sized,
        E: Store + ?Sized,
    {
        let base = load_entries(primary, self.policy)?;
        let ext = load_entries(external, self.policy)?;

        let mut merged = MergedIndex::new();
        merged.extend(base.entries);
        merged.extend(ext.entries);

        if merged.repeated() > 0 {
            warn!(
                "Collapsed {} repeated (digest, path) rows while merging",
                merged.repeated()
            );
        }
        Ok((merged, base.malformed + ext.malformed))
    }

    /// Merge both stores and write the tmp index, plan and report
    pub fn build<P, E>(
        &self,
        primary: &P,
        external: &E,
        external_path: &Path,
        outputs: &PlanOutputs,
    ) -> Result<Report>
    where
        P: Store + ?Sized,
        E: Store + ?Sized,
    {
        let (merged, malformed_rows) = self.merge(primary, external)?;

        write_tmp(&merged, &outputs.tmp)?;
        let rows = merged.plan_rows();
        write_plan(&rows, &outputs.plan)?;

        let report = Report {
            roots: roots_of(external_path),
            processed: merged.total_paths(),
            duplicate_hashes: merged.duplicate_groups().count(),
            quarantined: rows
                .iter()
                .filter(|r| r.action == Action::Quarantine)
                .count(),
            malformed_rows,
            plan: outputs.plan.clone(),
        };
        write_atomic(&outputs.report, |out| write!(out, "{}", report))?;
        log_fs_modification("write_report", &outputs.report, None);

        info!(
            "Plan built: {} paths, {} duplicate digests, {} to quarantine",
            report.processed, report.duplicate_hashes, report.quarantined
        );
        Ok(report)
    }
}

/// Directory holding the external store; `.` for a bare file name
fn roots_of(external_path: &Path) -> PathBuf {
    match external_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Write every merged path, duplicate or not, as `digest \t path`
fn write_tmp(merged: &MergedIndex, path: &Path) -> Result<()> {
    write_atomic(path, |out| {
        for group in merged.groups() {
            for p in &group.paths {
                writeln!(out, "{}\t{}", group.digest, p)?;
            }
        }
        Ok(())
    })?;
    log_fs_modification("write_tmp_index", path, None);
    Ok(())
}

fn write_plan(rows: &[PlanRow], path: &Path) -> Result<()> {
    write_atomic(path, |out| {
        for row in rows {
            writeln!(out, "{}\t{}\t{}", row.digest, row.action, row.path)?;
        }
        Ok(())
    })?;
    log_fs_modification("write_plan", path, Some(&format!("{} rows", rows.len())));
    Ok(())
}
