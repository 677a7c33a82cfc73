//! Resume ledger: remembers which upload id belongs to which local file.
//!
//! Stored as JSON next to the configuration file. An entry only matches while
//! the file keeps the size and modification time it had when recorded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chunkflow_uploader::SourceFile;
use serde::{Deserialize, Serialize};

pub const LEDGER_FILE: &str = "resume.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub upload_id: String,
    pub size: u64,
    /// Modification time in seconds since the Unix epoch.
    #[serde(default)]
    pub modified: Option<u64>,
    /// Chunk size the upload was split with. Entries written without it
    /// cannot be resumed.
    #[serde(default)]
    pub chunk_size: Option<u64>,
}

#[derive(Debug)]
pub struct ResumeLedger {
    path: PathBuf,
    entries: BTreeMap<String, LedgerEntry>,
}

impl ResumeLedger {
    /// Loads the ledger at `path`; a missing file is an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            if data.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&data)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    /// Ledger file that sits next to `config_path`.
    pub fn path_for(config_path: &Path) -> PathBuf {
        config_path
            .parent()
            .map(|dir| dir.join(LEDGER_FILE))
            .unwrap_or_else(|| PathBuf::from(LEDGER_FILE))
    }

    /// Entry recorded for `source`, if the file is unchanged since.
    pub fn lookup(&self, source: &SourceFile) -> Option<&LedgerEntry> {
        let entry = self.entries.get(&key(source))?;
        (entry.size == source.size() && entry.modified == modified_secs(source)).then_some(entry)
    }

    pub fn record(
        &mut self,
        source: &SourceFile,
        upload_id: &str,
        chunk_size: u64,
    ) -> anyhow::Result<()> {
        self.entries.insert(
            key(source),
            LedgerEntry {
                upload_id: upload_id.to_string(),
                size: source.size(),
                modified: modified_secs(source),
                chunk_size: Some(chunk_size),
            },
        );
        self.save()
    }

    /// Drops the entry for `source`. Saving is skipped when nothing changed.
    pub fn forget(&mut self, source: &SourceFile) -> anyhow::Result<()> {
        if self.entries.remove(&key(source)).is_some() {
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, json)?;
        tracing::debug!(entries = self.entries.len(), path = %self.path.display(), "resume ledger saved");
        Ok(())
    }
}

fn key(source: &SourceFile) -> String {
    let path = source.path();
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn modified_secs(source: &SourceFile) -> Option<u64> {
    source
        .modified()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
}
