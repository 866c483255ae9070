//! Per-dimension checkpoints for resuming an interrupted run.
//!
//! Checkpoints are a recovery optimization only: a missing, expired or corrupt record is
//! a cache miss and the dimension simply runs again.

use crate::digest::DimensionDigest;
use crate::error::{PhaseError, Result};
use crate::result::DimensionResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory under the run root holding one JSON file per dimension
pub const CHECKPOINT_DIR: &str = ".bootstrap-checkpoints";

/// Default freshness window
pub fn default_ttl() -> chrono::Duration {
    chrono::Duration::hours(1)
}

/// Cached result of one completed dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub dim_id: String,
    pub session_id: String,
    #[serde(flatten)]
    pub result: DimensionResult,
    pub digest: Option<DimensionDigest>,
    pub completed_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        dim_id: impl Into<String>,
        session_id: impl Into<String>,
        result: DimensionResult,
        digest: Option<DimensionDigest>,
    ) -> Self {
        Self {
            dim_id: dim_id.into(),
            session_id: session_id.into(),
            result,
            digest,
            completed_at: Utc::now(),
        }
    }

    /// `now - completed_at < ttl`
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.completed_at < ttl
    }
}

/// Key-value store of checkpoints, one record per `dim_id` under a run root
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Write (or overwrite) the record for `dim_id`, stamped `completed_at = now`.
    async fn save(
        &self,
        run_root: &Path,
        session_id: &str,
        dim_id: &str,
        result: &DimensionResult,
        digest: Option<&DimensionDigest>,
    ) -> Result<()>;

    /// Fresh records only. Never fails: unreadable records and a missing location
    /// both read as "no checkpoint".
    async fn load_all(&self, run_root: &Path) -> HashMap<String, Checkpoint>;

    /// Delete every record; an absent location is not an error.
    async fn clear_all(&self, run_root: &Path) -> Result<()>;
}

/// JSON files under `<run_root>/.bootstrap-checkpoints/`
#[derive(Debug, Clone)]
pub struct FsCheckpointStore {
    ttl: chrono::Duration,
}

impl Default for FsCheckpointStore {
    fn default() -> Self {
        Self::new(default_ttl())
    }
}

impl FsCheckpointStore {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self { ttl }
    }

    pub fn dir(run_root: &Path) -> PathBuf {
        run_root.join(CHECKPOINT_DIR)
    }

    fn record_path(run_root: &Path, dim_id: &str) -> PathBuf {
        Self::dir(run_root).join(format!("{}.json", file_stem(dim_id)))
    }

    async fn read_record(path: &Path) -> std::result::Result<Checkpoint, PhaseError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| corrupt_record(path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| corrupt_record(path, e))
    }
}

#[async_trait]
impl CheckpointStore for FsCheckpointStore {
    async fn save(
        &self,
        run_root: &Path,
        session_id: &str,
        dim_id: &str,
        result: &DimensionResult,
        digest: Option<&DimensionDigest>,
    ) -> Result<()> {
        let dir = Self::dir(run_root);
        tokio::fs::create_dir_all(&dir).await?;

        let checkpoint = Checkpoint::new(dim_id, session_id, result.clone(), digest.cloned());
        let bytes = serde_json::to_vec_pretty(&checkpoint)?;

        // Write-then-rename so a crash never leaves a half-written record behind.
        let path = Self::record_path(run_root, dim_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!("Checkpoint saved for {} at {}", dim_id, path.display());
        Ok(())
    }

    async fn load_all(&self, run_root: &Path) -> HashMap<String, Checkpoint> {
        let dir = Self::dir(run_root);
        let mut loaded = HashMap::new();

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("No checkpoints at {}: {}", dir.display(), e);
                return loaded;
            }
        };

        let now = Utc::now();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped reading checkpoints in {}: {}", dir.display(), e);
                    break;
                }
            };

            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            match Self::read_record(&path).await {
                Ok(cp) if cp.is_fresh(now, self.ttl) => {
                    loaded.insert(cp.dim_id.clone(), cp);
                }
                Ok(cp) => debug!("Checkpoint for {} expired, ignoring", cp.dim_id),
                Err(e) => debug!("Skipping checkpoint: {}", e),
            }
        }

        loaded
    }

    async fn clear_all(&self, run_root: &Path) -> Result<()> {
        let dir = Self::dir(run_root);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Cleared checkpoints at {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store (tests, dry runs)
#[derive(Debug)]
pub struct InMemoryCheckpointStore {
    ttl: chrono::Duration,
    records: Mutex<HashMap<PathBuf, HashMap<String, Checkpoint>>>,
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new(default_ttl())
    }
}

impl InMemoryCheckpointStore {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            ttl,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Put a record as-is, keeping its `completed_at`
    pub fn insert(&self, run_root: &Path, checkpoint: Checkpoint) {
        self.records
            .lock()
            .entry(run_root.to_path_buf())
            .or_default()
            .insert(checkpoint.dim_id.clone(), checkpoint);
    }

    /// Raw record count, expired ones included
    pub fn len(&self, run_root: &Path) -> usize {
        self.records.lock().get(run_root).map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, run_root: &Path) -> bool {
        self.len(run_root) == 0
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(
        &self,
        run_root: &Path,
        session_id: &str,
        dim_id: &str,
        result: &DimensionResult,
        digest: Option<&DimensionDigest>,
    ) -> Result<()> {
        self.insert(
            run_root,
            Checkpoint::new(dim_id, session_id, result.clone(), digest.cloned()),
        );
        Ok(())
    }

    async fn load_all(&self, run_root: &Path) -> HashMap<String, Checkpoint> {
        let now = Utc::now();
        self.records
            .lock()
            .get(run_root)
            .map(|records| {
                records
                    .iter()
                    .filter(|(_, cp)| cp.is_fresh(now, self.ttl))
                    .map(|(id, cp)| (id.clone(), cp.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn clear_all(&self, run_root: &Path) -> Result<()> {
        self.records.lock().remove(run_root);
        Ok(())
    }
}

fn corrupt_record(path: &Path, e: impl std::fmt::Display) -> PhaseError {
    PhaseError::CheckpointCorrupt(format!("{}: {}", path.display(), e))
}

/// Dimension ids become file names. Bytes outside `[A-Za-z0-9_-]` are written as `%XX`,
/// so distinct ids never share a file.
fn file_stem(dim_id: &str) -> String {
    let mut stem = String::with_capacity(dim_id.len());
    for byte in dim_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("%{:02X}", byte));
        }
    }
    stem
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn result_with(candidates: usize) -> DimensionResult {
        DimensionResult {
            candidate_count: candidates,
            analysis_chars: 1200,
            referenced_files: 7,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = FsCheckpointStore::default();

        let digest = DimensionDigest::fallback("found things", 4, 100);
        store
            .save(tmp.path(), "session-1", "X", &result_with(4), Some(&digest))
            .await
            .unwrap();

        let loaded = store.load_all(tmp.path()).await;
        assert_eq!(loaded.len(), 1);

        let cp = &loaded["X"];
        assert_eq!(cp.dim_id, "X");
        assert_eq!(cp.session_id, "session-1");
        assert_eq!(cp.result, result_with(4));
        assert_eq!(cp.digest.as_ref(), Some(&digest));
    }

    #[tokio::test]
    async fn test_save_overwrites_existing_record() {
        let tmp = TempDir::new().unwrap();
        let store = FsCheckpointStore::default();

        store
            .save(tmp.path(), "s1", "X", &result_with(1), None)
            .await
            .unwrap();
        store
            .save(tmp.path(), "s2", "X", &result_with(9), None)
            .await
            .unwrap();

        let loaded = store.load_all(tmp.path()).await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["X"].result.candidate_count, 9);
        assert_eq!(loaded["X"].session_id, "s2");
    }

    #[tokio::test]
    async fn test_expired_record_excluded() {
        let tmp = TempDir::new().unwrap();
        let store = FsCheckpointStore::default();

        let mut stale = Checkpoint::new("X", "s1", result_with(4), None);
        stale.completed_at = Utc::now() - default_ttl() - chrono::Duration::seconds(1);

        let dir = FsCheckpointStore::dir(tmp.path());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("X.json"), serde_json::to_vec(&stale).unwrap()).unwrap();

        assert!(store.load_all(tmp.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_ttl_elapses_after_save() {
        let tmp = TempDir::new().unwrap();
        let store = FsCheckpointStore::new(chrono::Duration::milliseconds(50));

        store
            .save(tmp.path(), "s1", "X", &result_with(4), None)
            .await
            .unwrap();
        assert_eq!(store.load_all(tmp.path()).await.len(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        assert!(store.load_all(tmp.path()).await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_record_skipped() {
        let tmp = TempDir::new().unwrap();
        let store = FsCheckpointStore::default();

        store
            .save(tmp.path(), "s1", "good", &result_with(2), None)
            .await
            .unwrap();
        std::fs::write(
            FsCheckpointStore::dir(tmp.path()).join("bad.json"),
            b"{ truncated",
        )
        .unwrap();

        let loaded = store.load_all(tmp.path()).await;
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("good"));
    }

    #[tokio::test]
    async fn test_missing_location_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FsCheckpointStore::default();

        let loaded = store.load_all(&tmp.path().join("never-created")).await;
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_clear_all() {
        let tmp = TempDir::new().unwrap();
        let store = FsCheckpointStore::default();

        store
            .save(tmp.path(), "s1", "A", &result_with(1), None)
            .await
            .unwrap();
        store
            .save(tmp.path(), "s1", "B", &result_with(2), None)
            .await
            .unwrap();
        assert_eq!(store.load_all(tmp.path()).await.len(), 2);

        store.clear_all(tmp.path()).await.unwrap();
        assert!(store.load_all(tmp.path()).await.is_empty());

        // Second clear on an absent directory is fine.
        store.clear_all(tmp.path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_record_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, b"{ truncated").unwrap();

        let err = FsCheckpointStore::read_record(&path).await.unwrap_err();
        assert!(matches!(err, PhaseError::CheckpointCorrupt(_)));
        assert!(err.to_string().starts_with("checkpoint corrupt: "));
        assert!(err.to_string().contains("bad.json"));
    }

    #[tokio::test]
    async fn test_dimension_id_escaped_for_file_name() {
        let tmp = TempDir::new().unwrap();
        let store = FsCheckpointStore::default();

        store
            .save(tmp.path(), "s1", "../escape/attempt", &result_with(1), None)
            .await
            .unwrap();

        assert!(FsCheckpointStore::dir(tmp.path())
            .join("%2E%2E%2Fescape%2Fattempt.json")
            .exists());
        assert!(store
            .load_all(tmp.path())
            .await
            .contains_key("../escape/attempt"));
    }

    #[tokio::test]
    async fn test_similar_ids_keep_separate_records() {
        let tmp = TempDir::new().unwrap();
        let store = FsCheckpointStore::default();

        store
            .save(tmp.path(), "s1", "api.v1", &result_with(1), None)
            .await
            .unwrap();
        store
            .save(tmp.path(), "s1", "api_v1", &result_with(2), None)
            .await
            .unwrap();

        let loaded = store.load_all(tmp.path()).await;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["api.v1"].result.candidate_count, 1);
        assert_eq!(loaded["api_v1"].result.candidate_count, 2);
    }

    #[test]
    fn test_file_stem_escapes_reserved_bytes() {
        assert_eq!(file_stem("overview"), "overview");
        assert_eq!(file_stem("api-v1_x"), "api-v1_x");
        assert_eq!(file_stem("a%b"), "a%25b");
        assert_eq!(file_stem("é"), "%C3%A9");
    }

    #[tokio::test]
    async fn test_in_memory_store_ttl_and_clear() {
        let store = InMemoryCheckpointStore::default();
        let root = Path::new("/runs/r1");

        store
            .save(root, "s1", "fresh", &result_with(1), None)
            .await
            .unwrap();

        let mut stale = Checkpoint::new("stale", "s0", result_with(3), None);
        stale.completed_at = Utc::now() - chrono::Duration::minutes(61);
        store.insert(root, stale);

        assert_eq!(store.len(root), 2);
        let loaded = store.load_all(root).await;
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("fresh"));

        store.clear_all(root).await.unwrap();
        assert!(store.is_empty(root));
        assert!(store.load_all(root).await.is_empty());
    }
}
