//! Storage backends.
//!
//! A backend provides the two independent keyspaces the store needs:
//!
//! | Table | Key | Value |
//! |-------|-----|-------|
//! | `checklists` | checklist id | JSON [`ChecklistRecord`](crate::stored_record::ChecklistRecord) |
//! | `images` | `<checklist id>_<item id>_<index>` | JSON [`ImageRecord`](crate::checklist_model::ImageRecord) |
//!
//! Writes go through a [`WriteBatch`] that the backend applies all-or-nothing,
//! in the order the operations were added. If an image put fails the backend
//! returns [`StoreError::PartialWrite`](crate::error::StoreError::PartialWrite)
//! and none of the batch becomes visible.
//!
//! All methods are async. [`LmdbBackend`] runs its transactions on the
//! blocking pool; [`InMemoryBackend`] returns immediately-ready futures.

pub mod lmdb_backend;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

pub use lmdb_backend::LmdbBackend;
pub use memory::InMemoryBackend;

pub const CHECKLISTS_TABLE: &str = "checklists";
pub const IMAGES_TABLE: &str = "images";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    PutImage { key: String, value: Vec<u8> },
    DeleteImage { key: String },
    PutChecklist { id: String, value: Vec<u8> },
    DeleteChecklist { id: String },
}

/// Ordered set of writes applied in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_image(&mut self, key: String, value: Vec<u8>) -> &mut Self {
        self.ops.push(WriteOp::PutImage { key, value });
        self
    }

    pub fn delete_image(&mut self, key: String) -> &mut Self {
        self.ops.push(WriteOp::DeleteImage { key });
        self
    }

    pub fn put_checklist(&mut self, id: String, value: Vec<u8>) -> &mut Self {
        self.ops.push(WriteOp::PutChecklist { id, value });
        self
    }

    pub fn delete_checklist(&mut self, id: String) -> &mut Self {
        self.ops.push(WriteOp::DeleteChecklist { id });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Row counts of both tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub checklists: usize,
    pub images: usize,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Raw metadata record for `id`, if any.
    async fn get_checklist(&self, id: &str) -> Result<Option<Vec<u8>>>;

    /// Image blobs for `keys`, positionally; absent keys yield `None`.
    async fn get_images(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Every metadata record, in key order.
    async fn list_checklists(&self) -> Result<Vec<Vec<u8>>>;

    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Empties both tables.
    async fn clear(&self) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;
}
