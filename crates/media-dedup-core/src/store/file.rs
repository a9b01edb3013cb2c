use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{format_row, parse_row, render_row, ParsedRow, RowLayout, Store};
use crate::error::{Error, Result};
use crate::types::HashEntry;

/// Hash store backed by a tab-separated file
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    layout: RowLayout,
    // Opened lazily on the first append
    writer: Option<File>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, layout: RowLayout) -> Self {
        Self {
            path: path.into(),
            layout,
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> RowLayout {
        self.layout
    }

    fn unreadable(&self, source: io::Error) -> Error {
        Error::StoreUnreadable {
            path: self.path.clone(),
            source,
        }
    }
}

impl Store for FileStore {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn load(&self) -> Result<Vec<ParsedRow>> {
        let file = File::open(&self.path).map_err(|e| self.unreadable(e))?;
        let mut reader = BufReader::new(file);

        let mut rows = Vec::new();
        let mut buf = Vec::new();
        let mut line_no = 0;
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| self.unreadable(e))?;
            if read == 0 {
                break;
            }
            line_no += 1;
            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            // Invalid UTF-8 is replaced rather than rejected
            let line = String::from_utf8_lossy(&buf);
            if let Some(row) = parse_row(self.layout, line_no, &line) {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn append(&mut self, entry: &HashEntry) -> Result<()> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&self.path)?;
            terminate_last_line(&mut file)?;
            self.writer = Some(file);
        }

        let line = format_row(self.layout, entry);
        if let Some(writer) = self.writer.as_mut() {
            // One write per row keeps an interrupted run structurally valid
            writer.write_all(line.as_bytes())?;
            writer.flush()?;
        }
        Ok(())
    }

    fn replace(&mut self, rows: &[ParsedRow]) -> Result<()> {
        self.writer = None;
        let layout = self.layout;
        write_atomic(&self.path, |out| {
            for row in rows {
                out.write_all(render_row(layout, row).as_bytes())?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

/// Add the missing newline of a store whose last row was cut short, so the
/// next append starts on a line of its own
fn terminate_last_line(file: &mut File) -> io::Result<()> {
    if file.metadata()?.len() == 0 {
        return Ok(());
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        file.write_all(b"\n")?;
    }
    Ok(())
}

/// Write a file through a sibling temporary file renamed over the target,
/// so readers never observe a half-written artifact.
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".partial");
    let tmp_path = path.with_file_name(tmp_name);

    let result = (|| {
        let mut out = BufWriter::new(File::create(&tmp_path)?);
        write(&mut out)?;
        out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const H1: &str = "1111111111111111111111111111111111111111111111111111111111111111";
    const H2: &str = "2222222222222222222222222222222222222222222222222222222222222222";

    fn entry(digest: &str, path: &str) -> HashEntry {
        HashEntry::new(digest.parse().unwrap(), path)
    }

    #[test]
    fn test_missing_store_is_unreadable() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.tsv"), RowLayout::External);

        assert!(!store.exists());
        assert!(matches!(store.load(), Err(Error::StoreUnreadable { .. })));
    }

    #[test]
    fn test_append_creates_store_and_parent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("external_hashes.tsv");
        let mut store = FileStore::new(&path, RowLayout::External);

        store.append(&entry(H1, "/ext/a.mp3")).unwrap();
        store.append(&entry(H2, "/ext/b.mp3")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{H1}\t/ext/a.mp3\n{H2}\t/ext/b.mp3\n"));
    }

    #[test]
    fn test_append_preserves_existing_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("external_hashes.tsv");
        fs::write(&path, format!("{H1}\t/ext/a.mp3\n")).unwrap();

        let mut store = FileStore::new(&path, RowLayout::External);
        store.append(&entry(H2, "/ext/b.mp3")).unwrap();

        let rows = store.load().unwrap();
        assert_eq!(
            rows,
            vec![
                ParsedRow::Entry(entry(H1, "/ext/a.mp3")),
                ParsedRow::Entry(entry(H2, "/ext/b.mp3")),
            ]
        );
    }

    #[test]
    fn test_load_reports_malformed_line_numbers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hash_index.tsv");
        fs::write(
            &path,
            format!("{H1}\t10\t/lib/a.mp3\n\nbroken row\n{H2}\t20\t/lib/b.mp3\n"),
        )
        .unwrap();

        let rows = FileStore::new(&path, RowLayout::Primary).load().unwrap();
        assert_eq!(rows.len(), 3);
        assert!(matches!(rows[1], ParsedRow::Malformed { line: 3, .. }));
    }

    #[test]
    fn test_load_tolerates_invalid_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("external_hashes.tsv");
        let mut bytes = format!("{H1}\t/ext/").into_bytes();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b".mp3\n");
        fs::write(&path, bytes).unwrap();

        let rows = FileStore::new(&path, RowLayout::External).load().unwrap();
        assert!(matches!(&rows[0], ParsedRow::Entry(e) if e.path.starts_with("/ext/")));
    }

    #[test]
    fn test_replace_rewrites_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("external_hashes.tsv");
        let mut store = FileStore::new(&path, RowLayout::External);
        store.append(&entry(H1, "/ext/a.mp3")).unwrap();
        store.append(&entry(H2, "/ext/b.mp3")).unwrap();

        store
            .replace(&[ParsedRow::Entry(entry(H2, "/ext/b.mp3"))])
            .unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{H2}\t/ext/b.mp3\n"));
        assert!(!dir.path().join("external_hashes.tsv.partial").exists());

        // Appends after a rewrite land in the new file
        store.append(&entry(H1, "/ext/c.mp3")).unwrap();
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_append_after_unterminated_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("external_hashes.tsv");
        fs::write(&path, format!("{H1}\t/ext/old.mp3")).unwrap();

        let mut store = FileStore::new(&path, RowLayout::External);
        store.append(&entry(H2, "/ext/new.mp3")).unwrap();

        assert_eq!(
            store.load().unwrap(),
            vec![
                ParsedRow::Entry(entry(H1, "/ext/old.mp3")),
                ParsedRow::Entry(entry(H2, "/ext/new.mp3")),
            ]
        );
    }

    #[test]
    fn test_replace_keeps_malformed_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("external_hashes.tsv");
        fs::write(&path, format!("legacy\t/ext/old.mp3\n{H1}\t/ext/a.mp3\n")).unwrap();

        let mut store = FileStore::new(&path, RowLayout::External);
        let rows = store.load().unwrap();
        store.replace(&rows).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("legacy\t/ext/old.mp3\n{H1}\t/ext/a.mp3\n")
        );
    }
}
