use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use keylight_domain::{ProgressRecord, PROGRESS_HEADER};

/// Records shown by default when reading history back.
pub const DEFAULT_HISTORY_LEN: usize = 5;

/// Append-only store of finished sessions, partitioned by profile and song.
pub trait ProgressLog: Send + Sync {
    fn append(&self, profile: u32, song: &str, record: &ProgressRecord) -> Result<()>;

    /// The newest `limit` records, newest first. No history is not an error.
    fn recent(&self, profile: u32, song: &str, limit: usize) -> Result<Vec<ProgressRecord>>;
}

/// One CSV file per song under `<root>/<profile>/`.
#[derive(Debug, Clone)]
pub struct CsvProgressLog {
    root: PathBuf,
}

impl CsvProgressLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_of(&self, profile: u32, song: &str) -> PathBuf {
        self.root.join(profile.to_string()).join(format!("{song}.csv"))
    }

    fn ensure_file(path: &Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create progress directory {parent:?}"))?;
        }
        std::fs::write(path, format!("{PROGRESS_HEADER}\n"))
            .with_context(|| format!("create progress log {path:?}"))?;
        debug!(?path, "progress log created");
        Ok(())
    }
}

impl ProgressLog for CsvProgressLog {
    fn append(&self, profile: u32, song: &str, record: &ProgressRecord) -> Result<()> {
        let path = self.path_of(profile, song);
        Self::ensure_file(&path)?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .with_context(|| format!("open progress log {path:?}"))?;
        writeln!(file, "{}", record.to_row()).with_context(|| format!("append to {path:?}"))?;
        Ok(())
    }

    fn recent(&self, profile: u32, song: &str, limit: usize) -> Result<Vec<ProgressRecord>> {
        let path = self.path_of(profile, song);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).with_context(|| format!("read progress log {path:?}")),
        };
        let records: Vec<ProgressRecord> = text
            .lines()
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match ProgressRecord::from_row(line) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(%err, ?path, "skipping malformed progress row");
                    None
                }
            })
            .collect();
        Ok(records.into_iter().rev().take(limit).collect())
    }
}

/// Keeps records in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryProgressLog {
    records: Mutex<HashMap<(u32, String), Vec<ProgressRecord>>>,
}

impl MemoryProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self, profile: u32, song: &str) -> Vec<ProgressRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(profile, song.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

impl ProgressLog for MemoryProgressLog {
    fn append(&self, profile: u32, song: &str, record: &ProgressRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((profile, song.to_string()))
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn recent(&self, profile: u32, song: &str, limit: usize) -> Result<Vec<ProgressRecord>> {
        Ok(self.all(profile, song).into_iter().rev().take(limit).collect())
    }
}
