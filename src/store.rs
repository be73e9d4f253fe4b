//! CSV input and output.
//!
//! Output files are append-only: the header goes in once when the file is new
//! and every row is flushed as soon as it is written, so an interrupted run
//! keeps everything recorded before it stopped.

use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::StoreError;

/// Read the non-empty values of `column` from a CSV with a header row.
pub fn read_entities(path: &Path, column: &str) -> Result<Vec<String>, StoreError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let index = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| StoreError::MissingColumn {
            column: column.to_string(),
            path: path.display().to_string(),
        })?;

    let mut names = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(name) = record.get(index).map(str::trim).filter(|n| !n.is_empty()) {
            names.push(name.to_string());
        }
    }

    info!(path = %path.display(), column, count = names.len(), "loaded entities");
    Ok(names)
}

/// An append-only CSV file with a fixed header.
pub struct AppendStore {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

impl AppendStore {
    pub fn open(path: impl AsRef<Path>, header: &[&str]) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(header)?;
            writer.flush()?;
            debug!(path = %path.display(), "wrote header");
        }

        Ok(Self { path, writer, rows: 0 })
    }

    pub fn append<T: Serialize>(&mut self, row: &T) -> Result<(), StoreError> {
        self.writer.serialize(row)?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Rows appended through this handle.
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AppendStore {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Row<'a> {
        name: &'a str,
        url: &'a str,
    }

    #[test]
    fn test_header_written_once_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        {
            let mut store = AppendStore::open(&path, &["name", "url"]).unwrap();
            store.append(&Row { name: "Ferry Plaza", url: "https://a/1.jpg" }).unwrap();
            assert_eq!(store.rows_written(), 1);
        }
        {
            let mut store = AppendStore::open(&path, &["name", "url"]).unwrap();
            store.append(&Row { name: "Ferry Plaza", url: "https://a/1.jpg" }).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "name,url\nFerry Plaza,https://a/1.jpg\nFerry Plaza,https://a/1.jpg\n"
        );
    }

    #[test]
    fn test_rows_visible_before_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        let mut store = AppendStore::open(&path, &["a", "b"]).unwrap();
        store.append(&("x, y", "z")).unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "a,b\n\"x, y\",z\n");
    }

    #[test]
    fn test_read_entities_by_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markets.csv");
        std::fs::write(
            &path,
            "state_name,market_name,market_city\nCalifornia,Ferry Plaza,San Francisco\nCalifornia,,Napa\nCalifornia, Santa Rosa Original ,Santa Rosa\n",
        )
        .unwrap();

        let names = read_entities(&path, "market_name").unwrap();
        assert_eq!(names, vec!["Ferry Plaza", "Santa Rosa Original"]);
    }

    #[test]
    fn test_read_entities_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markets.csv");
        std::fs::write(&path, "name\nFerry Plaza\n").unwrap();

        let err = read_entities(&path, "market_name").unwrap_err();
        assert!(matches!(err, StoreError::MissingColumn { .. }));
    }
}
