use crate::error::IngestError;
use crate::models::{FingerprintRecord, ManifestDiff};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Persisted path → fingerprint mapping: the record of which documents
/// have been committed to the vector index and at what content digest.
///
/// Entries are committed one at a time, strictly after the corresponding
/// index mutation has been persisted, so the manifest never claims vectors
/// that do not exist. Serialized as pretty-printed JSON with sorted keys
/// so the file diffs cleanly.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    entries: BTreeMap<String, FingerprintRecord>,
}

impl Manifest {
    /// Loads the manifest, failing softly: a missing or unparseable file
    /// yields an empty manifest, which only costs a full reprocessing run.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self { path, entries }
    }

    /// Diffs the current corpus listing (path → digest) against the
    /// manifest. Every path lands in exactly one output set or none.
    pub fn diff(&self, corpus: &BTreeMap<String, String>) -> ManifestDiff {
        let mut diff = ManifestDiff::default();

        for (path, digest) in corpus {
            match self.entries.get(path) {
                None => diff.to_add.push(path.clone()),
                Some(record) if record.digest != *digest => diff.to_update.push(path.clone()),
                Some(_) => {}
            }
        }

        for path in self.entries.keys() {
            if !corpus.contains_key(path) {
                diff.to_remove.push(path.clone());
            }
        }

        diff
    }

    /// Records a successfully indexed document. Called only after the
    /// index mutation for `path` has been persisted.
    pub fn commit(&mut self, path: &str, digest: &str) -> Result<(), IngestError> {
        self.entries.insert(
            path.to_string(),
            FingerprintRecord {
                digest: digest.to_string(),
                indexed_at: Utc::now(),
            },
        );
        self.persist()
    }

    /// Drops a document's entry after its index entries have been removed.
    pub fn remove(&mut self, path: &str) -> Result<(), IngestError> {
        if self.entries.remove(path).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    /// Forgets every entry; the next ingestion pass reprocesses the whole
    /// corpus. Used for full rebuilds.
    pub fn clear(&mut self) -> Result<(), IngestError> {
        self.entries.clear();
        self.persist()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&FingerprintRecord> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write-temp-then-rename so a crash mid-write cannot truncate the
    /// manifest.
    fn persist(&self) -> Result<(), IngestError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(&self.entries)
            .map_err(|error| IngestError::Manifest(error.to_string()))?;
        let tmp = temp_sibling(&self.path);
        std::fs::write(&tmp, serialized)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
