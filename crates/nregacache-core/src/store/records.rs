use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::StoreError;
use crate::models::{PerformanceRecord, PeriodId, RegionId};

const RECORDS_DIR: &str = "records";

/// A persisted record with its bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    #[serde(flatten)]
    pub record: PerformanceRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// File-backed record store.
pub struct RecordStore {
    root: Option<PathBuf>,
    /// Serializes writers so read-modify-write of a file is not interleaved.
    write_lock: Mutex<()>,
}

impl RecordStore {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// A directory that cannot be created yields an unavailable store rather
    /// than an error.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        match std::fs::create_dir_all(dir.join(RECORDS_DIR)) {
            Ok(()) => {
                debug!(path = %dir.display(), "Record store opened");
                Self {
                    root: Some(dir),
                    write_lock: Mutex::new(()),
                }
            }
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Record store unavailable");
                Self::unavailable()
            }
        }
    }

    /// A store with no backing directory. Every read is absent.
    pub fn unavailable() -> Self {
        Self {
            root: None,
            write_lock: Mutex::new(()),
        }
    }

    /// The store root, if it is configured and still present on disk.
    pub(crate) fn root(&self) -> Result<&Path, StoreError> {
        match self.root.as_deref() {
            Some(root) if root.join(RECORDS_DIR).is_dir() => Ok(root),
            _ => Err(StoreError::Unavailable),
        }
    }

    pub fn is_available(&self) -> bool {
        self.root().is_ok()
    }

    fn record_path(root: &Path, region: &RegionId, period: &PeriodId) -> PathBuf {
        root.join(RECORDS_DIR)
            .join(format!("{}_{}.json", region, period))
    }

    pub(crate) async fn lock_writes(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Record stored for the key, if any.
    pub async fn find(&self, region: &RegionId, period: &PeriodId) -> Option<PerformanceRecord> {
        self.find_stored(region, period).await.map(|s| s.record)
    }

    /// Like `find`, with the storage timestamps.
    pub async fn find_stored(&self, region: &RegionId, period: &PeriodId) -> Option<StoredRecord> {
        match self.try_find(region, period).await {
            Ok(stored) => stored,
            Err(StoreError::Unavailable) => None,
            Err(e) => {
                warn!(region = %region, period = %period, error = %e, "Store read failed");
                None
            }
        }
    }

    async fn try_find(
        &self,
        region: &RegionId,
        period: &PeriodId,
    ) -> Result<Option<StoredRecord>, StoreError> {
        let root = self.root()?;
        read_json(&Self::record_path(root, region, period)).await
    }

    /// Insert or overwrite the record for its key.
    ///
    /// An existing record keeps its `created_at`. Derived performance figures
    /// are recomputed from the raw fields before writing. Returns the record as
    /// persisted, or `None` when the store could not take the write.
    pub async fn upsert(&self, record: &PerformanceRecord) -> Option<PerformanceRecord> {
        match self.try_upsert(record).await {
            Ok(stored) => Some(stored.record),
            Err(StoreError::Unavailable) => {
                debug!(key = %record.key(), "Store unavailable, skipping write");
                None
            }
            Err(e) => {
                warn!(key = %record.key(), error = %e, "Store write failed");
                None
            }
        }
    }

    async fn try_upsert(&self, record: &PerformanceRecord) -> Result<StoredRecord, StoreError> {
        let root = self.root()?;
        let path = Self::record_path(root, &record.region_id, &record.period_id);

        let _guard = self.lock_writes().await;
        let now = Utc::now();
        // An unreadable existing file is overwritten as if new
        let created_at = match read_json::<StoredRecord>(&path).await {
            Ok(Some(existing)) => existing.created_at,
            Ok(None) => now,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Replacing unreadable stored record");
                now
            }
        };

        let mut merged = record.clone();
        merged.recompute_performance();
        let stored = StoredRecord {
            record: merged,
            created_at,
            updated_at: now,
        };
        write_json(&path, &stored).await?;
        Ok(stored)
    }

    /// The most recently updated record for `region`, any period, whatever its age.
    pub async fn find_most_recent(&self, region: &RegionId) -> Option<PerformanceRecord> {
        let stored = match self.load_all().await {
            Ok(stored) => stored,
            Err(StoreError::Unavailable) => return None,
            Err(e) => {
                warn!(region = %region, error = %e, "Store scan failed");
                return None;
            }
        };

        stored
            .into_iter()
            .filter(|s| &s.record.region_id == region)
            .max_by_key(|s| (s.updated_at, s.record.period_id))
            .map(|s| s.record)
    }

    /// Delete records created before `cutoff`. Returns how many were removed.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        match self.try_delete_older_than(cutoff).await {
            Ok(count) => count,
            Err(StoreError::Unavailable) => 0,
            Err(e) => {
                warn!(error = %e, "Store cleanup failed");
                0
            }
        }
    }

    async fn try_delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let root = self.root()?;
        let _guard = self.lock_writes().await;

        let mut deleted = 0;
        for (path, stored) in scan_records(&root.join(RECORDS_DIR)).await? {
            if stored.created_at < cutoff {
                tokio::fs::remove_file(&path).await?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Number of stored records, 0 when unavailable.
    pub async fn record_count(&self) -> usize {
        self.load_all().await.map(|all| all.len()).unwrap_or(0)
    }

    async fn load_all(&self) -> Result<Vec<StoredRecord>, StoreError> {
        let root = self.root()?;
        let records = scan_records(&root.join(RECORDS_DIR)).await?;
        Ok(records.into_iter().map(|(_, stored)| stored).collect())
    }
}

/// Every parseable record file in `dir`. Unparseable files are skipped.
async fn scan_records(dir: &Path) -> Result<Vec<(PathBuf, StoredRecord)>, StoreError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut records = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match read_json::<StoredRecord>(&path).await {
            Ok(Some(stored)) => records.push((path, stored)),
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable record"),
        }
    }
    Ok(records)
}

pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through a temp file and rename so readers never see a partial file.
pub(crate) async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let contents = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::tests::sample_record;
    use chrono::Duration;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, RecordStore) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path());
        (dir, store)
    }

    fn ids(region: &str, period: &str) -> (RegionId, PeriodId) {
        (RegionId::parse(region).unwrap(), PeriodId::parse(period).unwrap())
    }

    #[tokio::test]
    async fn test_upsert_then_find() {
        let (_dir, store) = open_store();
        let record = sample_record("0901", "2024-25");
        let (region, period) = ids("0901", "2024-25");

        assert!(store.find(&region, &period).await.is_none());
        let persisted = store.upsert(&record).await.unwrap();

        assert_eq!(persisted, record);
        assert_eq!(store.find(&region, &period).await, Some(record));
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn test_upsert_keeps_created_at_and_overwrites() {
        let (_dir, store) = open_store();
        let (region, period) = ids("0901", "2024-25");
        let mut record = sample_record("0901", "2024-25");

        store.upsert(&record).await.unwrap();
        let first = store.find_stored(&region, &period).await.unwrap();

        record.budget.expenditure = 500_000.0;
        store.upsert(&record).await.unwrap();
        let second = store.find_stored(&region, &period).await.unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(second.record.budget.expenditure, 500_000.0);
        assert_eq!(second.record.performance.utilization_rate, 50);
    }

    #[tokio::test]
    async fn test_upsert_recomputes_derived_rates() {
        let (_dir, store) = open_store();
        let mut record = sample_record("0902", "2024-25");
        record.performance.completion_rate = 3;
        record.performance.utilization_rate = 99;
        record.performance.employment_generated = 0.0;

        let persisted = store.upsert(&record).await.unwrap();
        assert_eq!(persisted.performance.completion_rate, 80);
        assert_eq!(persisted.performance.utilization_rate, 70);
        assert_eq!(persisted.performance.employment_generated, 1200.0);
    }

    #[tokio::test]
    async fn test_find_most_recent_picks_last_updated() {
        let (_dir, store) = open_store();
        store.upsert(&sample_record("0901", "2022-23")).await.unwrap();
        store.upsert(&sample_record("0901", "2023-24")).await.unwrap();
        store.upsert(&sample_record("0902", "2024-25")).await.unwrap();

        let (region, _) = ids("0901", "2022-23");
        let latest = store.find_most_recent(&region).await.unwrap();
        assert_eq!(latest.period_id.to_string(), "2023-24");

        let (missing, _) = ids("0999", "2022-23");
        assert!(store.find_most_recent(&missing).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_older_than() {
        let (_dir, store) = open_store();
        store.upsert(&sample_record("0901", "2023-24")).await.unwrap();
        store.upsert(&sample_record("0902", "2023-24")).await.unwrap();

        assert_eq!(store.delete_older_than(Utc::now() - Duration::days(1)).await, 0);
        assert_eq!(store.delete_older_than(Utc::now() + Duration::days(1)).await, 2);
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_skipped() {
        let (dir, store) = open_store();
        store.upsert(&sample_record("0901", "2023-24")).await.unwrap();
        std::fs::write(dir.path().join(RECORDS_DIR).join("0901_2024-25.json"), "{oops").unwrap();

        let (region, period) = ids("0901", "2024-25");
        assert!(store.find(&region, &period).await.is_none());
        assert_eq!(store.record_count().await, 1);
        // Overwriting a corrupt file works
        assert!(store.upsert(&sample_record("0901", "2024-25")).await.is_some());
    }

    #[tokio::test]
    async fn test_unavailable_store_is_absent_everywhere() {
        let store = RecordStore::unavailable();
        let (region, period) = ids("0901", "2024-25");

        assert!(!store.is_available());
        assert!(store.find(&region, &period).await.is_none());
        assert!(store.upsert(&sample_record("0901", "2024-25")).await.is_none());
        assert!(store.find_most_recent(&region).await.is_none());
        assert_eq!(store.delete_older_than(Utc::now()).await, 0);
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn test_store_becomes_unavailable_when_directory_disappears() {
        let (dir, store) = open_store();
        store.upsert(&sample_record("0901", "2024-25")).await.unwrap();
        std::fs::remove_dir_all(dir.path().join(RECORDS_DIR)).unwrap();

        let (region, period) = ids("0901", "2024-25");
        assert!(!store.is_available());
        assert!(store.find(&region, &period).await.is_none());
        assert!(store.upsert(&sample_record("0901", "2024-25")).await.is_none());
    }
}
