//! Persisted index snapshot.
//!
//! The snapshot keeps one entry per source document: the admitted record
//! plus a fingerprint of the raw text it came from. Across runs an
//! unchanged source is readmitted straight from the snapshot without
//! re-parsing; a changed or vanished source falls out of it.

use std::{collections::HashMap, io::ErrorKind, path::PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::warn;

use crate::{record::WriteupRecord, utils::write};

/// Hex fingerprint of a source document's raw text.
#[must_use]
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Codec(#[from] bincode::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEntry {
    sha256: String,
    record: WriteupRecord,
}

/// On-disk snapshot of the admitted corpus, keyed by source id.
#[derive(Debug)]
pub struct CorpusSnapshot {
    entries: HashMap<String, SnapshotEntry>,
    path: PathBuf,
}

impl CorpusSnapshot {
    /// Load the snapshot at `path`; a missing file is an empty snapshot,
    /// and a corrupt one is discarded and rebuilt on the next persist.
    ///
    /// # Errors
    /// Returns [`SnapshotError::Io`] on any read failure other than the
    /// file not existing.
    pub async fn load(path: PathBuf) -> Result<Self, SnapshotError> {
        let entries = match fs::read(&path).await {
            Ok(bytes) => match bincode::deserialize::<HashMap<String, SnapshotEntry>>(&bytes) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "discarding corrupt snapshot");
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { entries, path })
    }

    /// The record previously admitted for `source`, when the raw text is
    /// unchanged.
    #[must_use]
    pub fn hit(&self, source: &str, sha256: &str) -> Option<WriteupRecord> {
        self.entries
            .get(source)
            .and_then(|entry| (entry.sha256 == sha256).then(|| entry.record.clone()))
    }

    pub fn store(&mut self, source: impl Into<String>, sha256: impl Into<String>, record: WriteupRecord) {
        self.entries.insert(
            source.into(),
            SnapshotEntry {
                sha256: sha256.into(),
                record,
            },
        );
    }

    /// Drop the entry for a source that failed, vanished, or was removed.
    pub fn forget(&mut self, source: &str) {
        self.entries.remove(source);
    }

    /// Keep only entries whose source id passes the predicate.
    pub fn retain_sources(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|source, _| keep(source));
    }

    /// Every record currently in the snapshot.
    #[must_use]
    pub fn records(&self) -> Vec<WriteupRecord> {
        self.entries
            .values()
            .map(|entry| entry.record.clone())
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the snapshot back to its path.
    ///
    /// # Errors
    /// Returns [`SnapshotError`] when encoding or writing fails.
    pub async fn persist(&self) -> Result<(), SnapshotError> {
        let bytes = bincode::serialize(&self.entries)?;
        write(&self.path, &bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{document::parse, validate::validate};

    fn sample_record(source: &str) -> WriteupRecord {
        let text = "---\nname: Lame\nplatform: HackTheBox\ncategory: retired\n\
                    difficulty: Easy\ndate: 2024-06-30\npwned: true\n---\nbody\n";
        validate(parse(text).unwrap(), source).unwrap()
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("pwndex-snapshot-{}-{name}", std::process::id()))
            .join("snapshot.bin")
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let snapshot = CorpusSnapshot::load(scratch_path("missing")).await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn persists_and_reloads_entries() {
        let path = scratch_path("round-trip");
        let record = sample_record("writeups/lame.md");
        let sha = fingerprint("raw text");

        let mut snapshot = CorpusSnapshot::load(path.clone()).await.unwrap();
        snapshot.store("writeups/lame.md", sha.clone(), record.clone());
        snapshot.persist().await.unwrap();

        let reloaded = CorpusSnapshot::load(path.clone()).await.unwrap();
        assert_eq!(reloaded.hit("writeups/lame.md", &sha), Some(record));

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }

    #[tokio::test]
    async fn changed_text_misses() {
        let path = scratch_path("changed");
        let mut snapshot = CorpusSnapshot::load(path).await.unwrap();
        snapshot.store(
            "writeups/lame.md",
            fingerprint("old text"),
            sample_record("writeups/lame.md"),
        );
        assert!(snapshot.hit("writeups/lame.md", &fingerprint("new text")).is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_discarded() {
        let path = scratch_path("corrupt");
        write(&path, b"definitely not bincode").await.unwrap();
        let snapshot = CorpusSnapshot::load(path.clone()).await.unwrap();
        assert!(snapshot.is_empty());
        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }

    #[tokio::test]
    async fn forget_drops_an_entry() {
        let mut snapshot = CorpusSnapshot::load(scratch_path("forget")).await.unwrap();
        snapshot.store(
            "writeups/lame.md",
            fingerprint("text"),
            sample_record("writeups/lame.md"),
        );
        snapshot.forget("writeups/lame.md");
        assert!(snapshot.is_empty());
    }
}
