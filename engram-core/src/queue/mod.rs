//! File-backed coordination queues.
//!
//! Everything that must survive a hook process lives here: the retry
//! queue for writes that failed transiently, and the classification queue
//! feeding the asynchronous classifier worker.

pub mod classification;
pub mod retry;

pub use classification::{ClassificationQueue, ClassificationTask};
pub use retry::{QueueLock, QueueStats, RetryEntry, RetryQueue};
