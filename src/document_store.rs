use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock};

use crate::backend::{InMemoryBackend, LmdbBackend, StorageBackend, StoreStats, WriteBatch};
use crate::checklist_model::Checklist;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::stored_record::{self, ChecklistRecord, SplitChecklist};

/// Which engine a [`DocumentStore`] opens on first use.
pub enum BackendKind {
    Lmdb(StoreConfig),
    /// Ephemeral; contents are lost on [`DocumentStore::close`].
    InMemory,
    /// An already constructed backend, shared as-is.
    Custom(Arc<dyn StorageBackend>),
}

enum Readiness {
    Pending,
    Ready(Arc<dyn StorageBackend>),
    Failed(String),
}

/// Durable CRUD for checklists with images kept in a separate table.
///
/// Construct one per application and hand it to whoever needs it. Creating the
/// store does no I/O: the backend is opened by the first operation (or by
/// [`open`](Self::open)), and operations issued meanwhile wait for it. A failed
/// open is remembered and reported as [`StoreError::Unavailable`] until
/// [`reinitialize`](Self::reinitialize) succeeds.
///
/// Every operation takes `access` before asking for the backend and holds it
/// while the backend is in use, so [`close`](Self::close) never releases a
/// backend out from under a running operation.
pub struct DocumentStore {
    kind: BackendKind,
    readiness: Mutex<Readiness>,
    access: RwLock<()>,
}

impl DocumentStore {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            readiness: Mutex::new(Readiness::Pending),
            access: RwLock::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(BackendKind::InMemory)
    }

    /// Creates the store and waits for the backend to open.
    pub async fn open(kind: BackendKind) -> Result<Self> {
        let store = Self::new(kind);
        store.ready().await?;
        Ok(store)
    }

    pub async fn is_ready(&self) -> bool {
        matches!(*self.readiness.lock().await, Readiness::Ready(_))
    }

    async fn ready(&self) -> Result<Arc<dyn StorageBackend>> {
        let mut readiness = self.readiness.lock().await;
        match &*readiness {
            Readiness::Ready(backend) => return Ok(Arc::clone(backend)),
            Readiness::Failed(reason) => return Err(StoreError::Unavailable(reason.clone())),
            Readiness::Pending => {}
        }

        match self.initialize().await {
            Ok(backend) => {
                *readiness = Readiness::Ready(Arc::clone(&backend));
                Ok(backend)
            }
            Err(e) => {
                let reason = e.to_string();
                warn!("Checklist store failed to open: {reason}");
                *readiness = Readiness::Failed(reason.clone());
                Err(StoreError::Unavailable(reason))
            }
        }
    }

    async fn initialize(&self) -> Result<Arc<dyn StorageBackend>> {
        match &self.kind {
            BackendKind::Lmdb(config) => {
                let config = config.clone();
                let backend = tokio::task::spawn_blocking(move || LmdbBackend::open(&config)).await??;
                info!("Checklist store ready");
                Ok(Arc::new(backend))
            }
            BackendKind::InMemory => Ok(Arc::new(InMemoryBackend::new())),
            BackendKind::Custom(backend) => Ok(Arc::clone(backend)),
        }
    }

    /// Releases the backend. The next operation opens it again.
    pub async fn close(&self) {
        let _exclusive = self.access.write().await;
        *self.readiness.lock().await = Readiness::Pending;
        info!("Checklist store closed");
    }

    /// Drops any cached failure and opens the backend again.
    pub async fn reinitialize(&self) -> Result<()> {
        self.close().await;
        self.ready().await.map(|_| ())
    }

    /// Persists `checklist`, replacing any stored checklist with the same id.
    ///
    /// Image payloads go to the image table under
    /// [`image_key`](crate::stored_record::image_key); blobs addressed by the
    /// previous version but not by this one are deleted. Blob writes, stale blob
    /// deletes and the metadata write are committed as one batch, blobs first.
    pub async fn save(&self, checklist: &Checklist) -> Result<()> {
        let SplitChecklist { record, blobs } = stored_record::split(checklist)?;
        let _exclusive = self.access.write().await;
        let backend = self.ready().await?;

        let stale = match backend.get_checklist(&record.id).await? {
            Some(bytes) => match ChecklistRecord::decode(&bytes) {
                Ok(previous) => record.stale_keys_since(&previous),
                Err(e) => {
                    warn!("Overwriting unreadable record {}; its images are not collected: {e}", record.id);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let image_total = blobs.len();
        let stale_total = stale.len();

        let mut batch = WriteBatch::new();
        for (key, value) in blobs {
            batch.put_image(key, value);
        }
        for key in stale {
            batch.delete_image(key);
        }
        batch.put_checklist(record.id.clone(), record.encode()?);

        backend.commit(batch).await?;
        debug!(
            "Saved checklist {} ({image_total} images, {stale_total} stale removed)",
            record.id
        );
        Ok(())
    }

    /// Loads a checklist with every image payload attached, or `None` if `id` was never saved.
    pub async fn get_checklist_by_id(&self, id: &str) -> Result<Option<Checklist>> {
        let _shared = self.access.read().await;
        let backend = self.ready().await?;

        let Some(bytes) = backend.get_checklist(id).await? else {
            debug!("No checklist stored under {id}");
            return Ok(None);
        };
        let record = ChecklistRecord::decode(&bytes)?;

        let keys = record.image_keys();
        let blobs = if keys.is_empty() {
            Vec::new()
        } else {
            backend.get_images(&keys).await?
        };

        record.hydrate(blobs).map(Some)
    }

    /// Every stored checklist without image payloads. Order carries no meaning.
    pub async fn get_all_checklists(&self) -> Result<Vec<ChecklistRecord>> {
        let _shared = self.access.read().await;
        let backend = self.ready().await?;

        backend
            .list_checklists()
            .await?
            .iter()
            .map(|bytes| ChecklistRecord::decode(bytes))
            .collect()
    }

    /// Removes the checklist and all of its image blobs. Returns `false` if nothing was stored.
    pub async fn delete_checklist(&self, id: &str) -> Result<bool> {
        let _exclusive = self.access.write().await;
        let backend = self.ready().await?;

        let Some(bytes) = backend.get_checklist(id).await? else {
            return Ok(false);
        };

        let mut batch = WriteBatch::new();
        match ChecklistRecord::decode(&bytes) {
            Ok(record) => {
                for key in record.image_keys() {
                    batch.delete_image(key);
                }
            }
            Err(e) => warn!("Deleting unreadable record {id}; its images are left behind: {e}"),
        }
        batch.delete_checklist(id.to_string());

        backend.commit(batch).await?;
        info!("Deleted checklist {id}");
        Ok(true)
    }

    /// Empties both tables.
    pub async fn clear_all(&self) -> Result<()> {
        let _exclusive = self.access.write().await;
        let backend = self.ready().await?;
        backend.clear().await?;
        info!("Cleared all checklists and images");
        Ok(())
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let _shared = self.access.read().await;
        let backend = self.ready().await?;
        backend.stats().await
    }
}
