//! In-memory [`StorageBackend`] for tests and throwaway sessions.
//!
//! Both tables are `BTreeMap`s behind one `Mutex`, so a batch is applied
//! while holding the lock and readers never observe half of it.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::Result;

use super::{StorageBackend, StoreStats, WriteBatch, WriteOp};

#[derive(Default)]
struct Tables {
    checklists: BTreeMap<String, Vec<u8>>,
    images: BTreeMap<String, Vec<u8>>,
}

#[derive(Default)]
pub struct InMemoryBackend {
    tables: Mutex<Tables>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get_checklist(&self, id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock().checklists.get(id).cloned())
    }

    async fn get_images(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let tables = self.lock();
        Ok(keys.iter().map(|key| tables.images.get(key).cloned()).collect())
    }

    async fn list_checklists(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self.lock().checklists.values().cloned().collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut tables = self.lock();
        for op in batch.into_ops() {
            match op {
                WriteOp::PutImage { key, value } => {
                    tables.images.insert(key, value);
                }
                WriteOp::DeleteImage { key } => {
                    tables.images.remove(&key);
                }
                WriteOp::PutChecklist { id, value } => {
                    tables.checklists.insert(id, value);
                }
                WriteOp::DeleteChecklist { id } => {
                    tables.checklists.remove(&id);
                }
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut tables = self.lock();
        tables.checklists.clear();
        tables.images.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let tables = self.lock();
        Ok(StoreStats {
            checklists: tables.checklists.len(),
            images: tables.images.len(),
        })
    }
}
