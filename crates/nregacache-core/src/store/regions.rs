//! Region registry kept alongside the records in `regions.json`.

use std::path::PathBuf;

use tracing::warn;

use super::records::{read_json, write_json};
use super::{RecordStore, StoreError};
use crate::models::Region;

const REGIONS_FILE: &str = "regions.json";

impl RecordStore {
    fn regions_path(&self) -> Result<PathBuf, StoreError> {
        Ok(self.root()?.join(REGIONS_FILE))
    }

    async fn try_list_regions(&self) -> Result<Vec<Region>, StoreError> {
        let path = self.regions_path()?;
        Ok(read_json(&path).await?.unwrap_or_default())
    }

    /// Every registered region, empty when the store is unavailable.
    pub async fn list_regions(&self) -> Vec<Region> {
        match self.try_list_regions().await {
            Ok(regions) => regions,
            Err(StoreError::Unavailable) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read region registry");
                Vec::new()
            }
        }
    }

    /// Insert or replace a single region. Returns false if nothing was written.
    pub async fn upsert_region(&self, region: Region) -> bool {
        self.upsert_regions(vec![region]).await > 0
    }

    /// Insert or replace regions by id. Returns how many were written.
    pub async fn upsert_regions(&self, regions: Vec<Region>) -> usize {
        match self.try_upsert_regions(regions).await {
            Ok(count) => count,
            Err(StoreError::Unavailable) => 0,
            Err(e) => {
                warn!(error = %e, "Failed to write region registry");
                0
            }
        }
    }

    async fn try_upsert_regions(&self, regions: Vec<Region>) -> Result<usize, StoreError> {
        let path = self.regions_path()?;
        let _guard = self.lock_writes().await;

        let mut registry: Vec<Region> = read_json(&path).await?.unwrap_or_default();
        let count = regions.len();
        for region in regions {
            match registry.iter_mut().find(|r| r.region_id == region.region_id) {
                Some(existing) => *existing = region,
                None => registry.push(region),
            }
        }
        registry.sort_by(|a, b| a.region_id.cmp(&b.region_id));

        write_json(&path, &registry).await?;
        Ok(count)
    }

    /// Every active region of `state_code`, sorted by name.
    ///
    /// When the state has none, falls back to at most `cap` active regions of
    /// any state.
    pub async fn find_priority_regions(&self, state_code: &str, cap: usize) -> Vec<Region> {
        let mut active: Vec<Region> = self
            .list_regions()
            .await
            .into_iter()
            .filter(|r| r.active)
            .collect();
        active.sort_by(|a, b| a.name.cmp(&b.name));

        let in_state: Vec<Region> = active
            .iter()
            .filter(|r| r.in_state(state_code))
            .cloned()
            .collect();

        if !in_state.is_empty() {
            return in_state;
        }
        active.truncate(cap);
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{default_regions, RegionId, DEFAULT_STATE_CODE};
    use tempfile::TempDir;

    fn region(code: &str, name: &str) -> Region {
        Region::new(RegionId::parse(code).unwrap(), name)
    }

    #[tokio::test]
    async fn test_registry_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path());
        assert!(store.list_regions().await.is_empty());
        assert!(store.find_priority_regions("09", 20).await.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_region_replaces_by_id() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path());

        assert!(store.upsert_region(region("0902", "Aligarh")).await);
        assert!(store.upsert_region(region("0901", "Agra")).await);
        let mut renamed = region("0902", "Aligarh District");
        renamed.active = false;
        assert!(store.upsert_region(renamed).await);

        let regions = store.list_regions().await;
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].region_id.as_str(), "0901");
        assert_eq!(regions[1].name, "Aligarh District");
        assert!(!regions[1].active);
    }

    #[tokio::test]
    async fn test_priority_regions_cover_whole_state() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path());
        assert_eq!(store.upsert_regions(default_regions()).await, 50);

        let mut inactive = region("0901", "Agra");
        inactive.active = false;
        store.upsert_region(inactive).await;

        let priority = store.find_priority_regions(DEFAULT_STATE_CODE, 20).await;
        assert_eq!(priority.len(), 49);
        assert!(priority.iter().all(|r| r.active));
        assert!(priority.windows(2).all(|w| w[0].name <= w[1].name));
        assert_eq!(priority[0].name, "Aligarh");
    }

    #[tokio::test]
    async fn test_priority_regions_fall_back_to_any_state() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path());
        store
            .upsert_regions(vec![region("0602", "Bhiwani"), region("0601", "Ambala")])
            .await;

        let priority = store.find_priority_regions("09", 20).await;
        let names: Vec<_> = priority.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Ambala", "Bhiwani"]);
    }

    #[tokio::test]
    async fn test_any_state_fallback_is_capped() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path());
        let haryana = (1..=30)
            .map(|n| region(&format!("06{:02}", n), &format!("District {:02}", n)))
            .collect();
        store.upsert_regions(haryana).await;

        let priority = store.find_priority_regions("09", 20).await;
        assert_eq!(priority.len(), 20);
        assert_eq!(priority[0].name, "District 01");
        assert_eq!(priority[19].name, "District 20");
    }

    #[tokio::test]
    async fn test_unavailable_registry() {
        let store = RecordStore::unavailable();
        assert!(!store.upsert_region(region("0901", "Agra")).await);
        assert!(store.list_regions().await.is_empty());
    }
}
