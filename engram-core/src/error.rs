use crate::types::Collection;

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the memory layer
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Content blocked by security scan: {0}")]
    SecurityBlocked(String),

    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Embedding timeout after {0:?}")]
    EmbeddingTimeout(std::time::Duration),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Queue locked by another processor")]
    QueueLocked,

    #[error("Collection {collection} has no point {point_id}")]
    PointNotFound {
        collection: Collection,
        point_id: uuid::Uuid,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is recoverable (the operation can be retried
    /// or parked in the retry queue)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Validation(_) => false,
            Error::SecurityBlocked(_) => false,
            Error::StoreUnavailable(_) => true,
            Error::Store(_) => true,
            Error::EmbeddingTimeout(_) => true,
            Error::Embedding(_) => false,
            Error::Classifier(_) => false,
            Error::Queue(_) => false,
            Error::QueueLocked => false,
            Error::PointNotFound { .. } => false,
            Error::Serialization(_) => false,
            Error::Io(_) => true,
        }
    }

    /// Short machine-readable code used as a metric label
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::SecurityBlocked(_) => "security_blocked",
            Error::StoreUnavailable(_) => "store_unavailable",
            Error::Store(_) => "store",
            Error::EmbeddingTimeout(_) => "embedding_timeout",
            Error::Embedding(_) => "embedding",
            Error::Classifier(_) => "classifier",
            Error::Queue(_) => "queue",
            Error::QueueLocked => "queue_locked",
            Error::PointNotFound { .. } => "point_not_found",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
        }
    }
}
