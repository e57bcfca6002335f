//! Error type shared by every store operation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage engine could not be opened. Sticky until the store is reinitialized.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// An image blob could not be written; nothing of the save was persisted.
    #[error("failed to write image blob '{key}': {source}")]
    PartialWrite {
        key: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("lmdb error: {0}")]
    Storage(#[from] lmdb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Metadata references a blob that is not in the image table.
    #[error("image blob '{0}' is referenced by metadata but missing")]
    MissingImage(String),

    #[error("invalid checklist: {0}")]
    InvalidChecklist(String),

    /// The report renderer or mail transport reported a failure.
    #[error("report delivery failed: {0}")]
    Delivery(String),

    #[error("unsupported record layout version {0}")]
    UnsupportedLayout(u32),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    /// True when the error means the engine itself is gone, as opposed to a bad record.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
