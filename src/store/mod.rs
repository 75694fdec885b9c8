use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::{LifecycleError, Result, WorkshopModRecord};

/// In-memory document store for workshop mod records.
///
/// Records are keyed by their internal id. Several records may share one
/// `external_id`: history rows from earlier install cycles stay behind when a
/// mod is reinstalled, and `find_latest` picks the newest by creation time.
pub struct ModStore {
    records: RwLock<HashMap<Uuid, WorkshopModRecord>>,
}

impl ModStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, record: WorkshopModRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(LifecycleError::Store(format!(
                "record {} already exists",
                record.id
            )));
        }
        records.insert(record.id, record);
        Ok(())
    }

    /// Replaces an existing record. Errors if the record was deleted.
    pub async fn update(&self, record: WorkshopModRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if !records.contains_key(&record.id) {
            return Err(LifecycleError::Store(format!(
                "record {} no longer exists",
                record.id
            )));
        }
        records.insert(record.id, record);
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Option<WorkshopModRecord> {
        self.records.read().await.get(&id).cloned()
    }

    /// Newest record for the workshop item, by creation time.
    pub async fn find_latest(&self, external_id: &str) -> Option<WorkshopModRecord> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.external_id == external_id)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned()
    }

    /// Every history row for the workshop item.
    pub async fn find_all(&self, external_id: &str) -> Vec<WorkshopModRecord> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| r.external_id == external_id)
            .cloned()
            .collect()
    }

    pub async fn list(&self) -> Vec<WorkshopModRecord> {
        let mut all: Vec<WorkshopModRecord> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let mut records = self.records.write().await;
        records
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| LifecycleError::Store(format!("record {} not found", id)))
    }
}

impl Default for ModStore {
    fn default() -> Self {
        Self::new()
    }
}
