use super::{format_row, parse_row, render_row, ParsedRow, RowLayout, Store};
use crate::error::Result;
use crate::types::HashEntry;

/// Store held in memory as raw lines, parsed the same way as a file
#[derive(Debug, Clone)]
pub struct MemoryStore {
    layout: RowLayout,
    lines: Vec<String>,
}

impl MemoryStore {
    pub fn new(layout: RowLayout) -> Self {
        Self {
            layout,
            lines: Vec::new(),
        }
    }

    /// Seed the store with raw lines, malformed ones included
    pub fn from_lines(layout: RowLayout, lines: &[&str]) -> Self {
        Self {
            layout,
            lines: lines.iter().map(|line| line.to_string()).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Well-formed entries only
    pub fn entries(&self) -> Vec<HashEntry> {
        self.lines
            .iter()
            .enumerate()
            .filter_map(|(idx, line)| match parse_row(self.layout, idx + 1, line) {
                Some(ParsedRow::Entry(entry)) => Some(entry),
                _ => None,
            })
            .collect()
    }
}

impl Store for MemoryStore {
    fn location(&self) -> String {
        "<memory>".to_string()
    }

    fn exists(&self) -> bool {
        true
    }

    fn load(&self) -> Result<Vec<ParsedRow>> {
        Ok(self
            .lines
            .iter()
            .enumerate()
            .filter_map(|(idx, line)| parse_row(self.layout, idx + 1, line))
            .collect())
    }

    fn append(&mut self, entry: &HashEntry) -> Result<()> {
        let line = format_row(self.layout, entry);
        self.lines.push(line.trim_end_matches('\n').to_string());
        Ok(())
    }

    fn replace(&mut self, rows: &[ParsedRow]) -> Result<()> {
        self.lines = rows
            .iter()
            .map(|row| render_row(self.layout, row).trim_end_matches('\n').to_string())
            .collect();
        Ok(())
    }
}
