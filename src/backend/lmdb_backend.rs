//! LMDB-backed [`StorageBackend`].
//!
//! One environment directory holds two named databases, `checklists` and
//! `images`. Opening is idempotent: existing databases are reused, missing
//! ones are created empty. Every [`WriteBatch`] is applied inside a single
//! write transaction, so a save either lands completely or not at all.

use std::sync::Arc;

use async_trait::async_trait;
use lmdb::{Cursor, Database, DatabaseFlags, Environment, RwTransaction, Transaction, WriteFlags};
use log::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};

use super::{StorageBackend, StoreStats, WriteBatch, WriteOp, CHECKLISTS_TABLE, IMAGES_TABLE};

struct LmdbTables {
    env: Environment,
    checklists: Database,
    images: Database,
}

pub struct LmdbBackend {
    tables: Arc<LmdbTables>,
}

impl LmdbBackend {
    /// Opens (or creates) the environment at `config.path`.
    ///
    /// Blocking; [`DocumentStore`](crate::document_store::DocumentStore) calls it
    /// from the blocking pool.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let path = &config.path;
        if path.exists() {
            info!("Opening existing checklist store at {}", path.display());
        } else {
            info!("Creating checklist store at {}", path.display());
            std::fs::create_dir_all(path)?;
        }

        let env = Environment::new()
            .set_max_dbs(2)
            .set_map_size(config.map_size)
            .set_max_readers(config.max_readers)
            .open(path)?;

        let checklists = env.create_db(Some(CHECKLISTS_TABLE), DatabaseFlags::empty())?;
        let images = env.create_db(Some(IMAGES_TABLE), DatabaseFlags::empty())?;

        Ok(Self {
            tables: Arc::new(LmdbTables {
                env,
                checklists,
                images,
            }),
        })
    }

    async fn run<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&LmdbTables) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tables = Arc::clone(&self.tables);
        tokio::task::spawn_blocking(move || work(&tables)).await?
    }
}

fn read<T: Transaction>(txn: &T, db: Database, key: &str) -> Result<Option<Vec<u8>>> {
    match txn.get(db, &key) {
        Ok(bytes) => Ok(Some(bytes.to_vec())),
        Err(lmdb::Error::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn remove(txn: &mut RwTransaction<'_>, db: Database, key: &str) -> Result<()> {
    match txn.del(db, &key, None) {
        Ok(()) | Err(lmdb::Error::NotFound) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn count<T: Transaction>(txn: &T, db: Database) -> Result<usize> {
    let mut cursor = txn.open_ro_cursor(db)?;
    let rows = cursor.iter_start().count();
    Ok(rows)
}

#[async_trait]
impl StorageBackend for LmdbBackend {
    async fn get_checklist(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let id = id.to_string();
        self.run(move |tables| {
            let txn = tables.env.begin_ro_txn()?;
            read(&txn, tables.checklists, &id)
        })
        .await
    }

    async fn get_images(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        let keys = keys.to_vec();
        self.run(move |tables| {
            let txn = tables.env.begin_ro_txn()?;
            let blobs = keys
                .iter()
                .map(|key| read(&txn, tables.images, key))
                .collect::<Result<Vec<_>>>()?;
            Ok(blobs)
        })
        .await
    }

    async fn list_checklists(&self) -> Result<Vec<Vec<u8>>> {
        self.run(|tables| {
            let txn = tables.env.begin_ro_txn()?;
            let mut cursor = txn.open_ro_cursor(tables.checklists)?;
            let records: Vec<Vec<u8>> = cursor
                .iter_start()
                .map(|(_, value)| value.to_vec())
                .collect();
            Ok(records)
        })
        .await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.run(move |tables| {
            let mut txn = tables.env.begin_rw_txn()?;
            let op_count = batch.len();

            for op in batch.into_ops() {
                match op {
                    WriteOp::PutImage { key, value } => {
                        if let Err(e) = txn.put(tables.images, &key, &value, WriteFlags::empty()) {
                            warn!("Aborting batch: image blob {key} failed to write: {e}");
                            return Err(StoreError::PartialWrite {
                                key,
                                source: Box::new(e.into()),
                            });
                        }
                    }
                    WriteOp::DeleteImage { key } => remove(&mut txn, tables.images, &key)?,
                    WriteOp::PutChecklist { id, value } => {
                        txn.put(tables.checklists, &id, &value, WriteFlags::empty())?
                    }
                    WriteOp::DeleteChecklist { id } => remove(&mut txn, tables.checklists, &id)?,
                }
            }

            txn.commit()?;
            debug!("Committed batch of {op_count} operations");
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.run(|tables| {
            let mut txn = tables.env.begin_rw_txn()?;
            txn.clear_db(tables.checklists)?;
            txn.clear_db(tables.images)?;
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.run(|tables| {
            let txn = tables.env.begin_ro_txn()?;
            Ok(StoreStats {
                checklists: count(&txn, tables.checklists)?,
                images: count(&txn, tables.images)?,
            })
        })
        .await
    }
}
