//! Hash stores: append-only tables of `(digest, path)` rows.
//!
//! Two on-disk layouts exist. The primary library index carries an extra
//! column between digest and path which is ignored on read:
//!
//! ```text
//! <sha256_hex>\t<ignored>\t<absolute_path>
//! ```
//!
//! External stores, written by the indexer, have two columns:
//!
//! ```text
//! <sha256_hex>\t<absolute_path>
//! ```
//!
//! Parsing never drops a line silently: every non-blank line comes back as
//! either [`ParsedRow::Entry`] or [`ParsedRow::Malformed`], and the caller
//! decides whether to log, count or fail.

mod file;
mod memory;

pub use file::FileStore;
pub(crate) use file::write_atomic;
pub use memory::MemoryStore;

use crate::error::{Error, Result};
use crate::types::{Digest, HashEntry};

/// Column layout of a hash store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLayout {
    /// `digest \t ignored \t path`
    Primary,

    /// `digest \t path`
    External,
}

/// Result of parsing one store line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRow {
    Entry(HashEntry),
    Malformed {
        /// 1-based line number
        line: usize,
        reason: String,
        /// The line as read, kept so rewrites can preserve it
        raw: String,
    },
}

/// What a caller does with malformed rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Log and count the row, then continue
    #[default]
    Skip,

    /// Abort with [`Error::MalformedRow`]
    Fail,
}

/// Storage backend for hash entries
pub trait Store {
    /// Human-readable location, used in logs and errors
    fn location(&self) -> String;

    /// Whether the store has been created yet
    fn exists(&self) -> bool;

    /// Read every row in file order
    fn load(&self) -> Result<Vec<ParsedRow>>;

    /// Append one entry as a single complete row
    fn append(&mut self, entry: &HashEntry) -> Result<()>;

    /// Replace the whole content. Only explicit invalidation uses this.
    /// Malformed rows are written back verbatim.
    fn replace(&mut self, rows: &[ParsedRow]) -> Result<()>;
}

/// Parse one line (without its terminator) in the given layout.
/// Returns `None` for blank lines.
pub fn parse_row(layout: RowLayout, line_no: usize, line: &str) -> Option<ParsedRow> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return None;
    }

    let malformed = |reason: &str| ParsedRow::Malformed {
        line: line_no,
        reason: reason.to_string(),
        raw: line.to_string(),
    };

    let (digest, path) = match layout {
        RowLayout::External => match line.split_once('\t') {
            Some(parts) => parts,
            None => return Some(malformed("expected 2 tab-separated columns")),
        },
        RowLayout::Primary => {
            // Columns after the third are ignored
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 3 {
                return Some(malformed("expected 3 tab-separated columns"));
            }
            (parts[0], parts[2])
        }
    };

    if path.is_empty() {
        return Some(malformed("empty path"));
    }

    match digest.parse::<Digest>() {
        Ok(digest) => Some(ParsedRow::Entry(HashEntry::new(digest, path))),
        Err(reason) => Some(malformed(&reason)),
    }
}

/// Format an entry as a store line, terminator included
pub fn format_row(layout: RowLayout, entry: &HashEntry) -> String {
    match layout {
        RowLayout::External => format!("{}\t{}\n", entry.digest, entry.path),
        RowLayout::Primary => format!("{}\t-\t{}\n", entry.digest, entry.path),
    }
}

/// Render a parsed row back into a store line, terminator included
pub fn render_row(layout: RowLayout, row: &ParsedRow) -> String {
    match row {
        ParsedRow::Entry(entry) => format_row(layout, entry),
        ParsedRow::Malformed { raw, .. } => format!("{}\n", raw),
    }
}

/// Entries of a store after applying a malformed-row policy
#[derive(Debug, Clone, Default)]
pub struct LoadedEntries {
    pub entries: Vec<HashEntry>,
    pub malformed: usize,
}

/// Load a store and resolve malformed rows according to `policy`
pub fn load_entries<S: Store + ?Sized>(store: &S, policy: MalformedPolicy) -> Result<LoadedEntries> {
    let mut loaded = LoadedEntries::default();
    for row in store.load()? {
        match row {
            ParsedRow::Entry(entry) => loaded.entries.push(entry),
            ParsedRow::Malformed { line, reason, .. } => {
                if policy == MalformedPolicy::Fail {
                    return Err(Error::MalformedRow {
                        path: store.location().into(),
                        line,
                        reason,
                    });
                }
                log::warn!("Skipping malformed row {}:{}: {}", store.location(), line, reason);
                loaded.malformed += 1;
            }
        }
    }
    Ok(loaded)
}
