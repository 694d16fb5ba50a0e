//! Classification task queue.
//!
//! One JSON file per task in `$INSTALL_DIR/queue/classification/`,
//! named so lexicographic order is FIFO order. Many writers (hook
//! workers), one reader (the classifier worker) which consumes by
//! unlink-after-read.

use crate::config::Config;
use crate::error::Result;
use crate::types::{Collection, MemoryType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

/// Content handed to the LLM is capped well below the store ceiling.
pub const TASK_CONTENT_MAX: usize = 2000;

/// One pending classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationTask {
    pub point_id: Uuid,
    pub collection: Collection,
    pub content: String,
    pub current_type: MemoryType,
    pub group_id: String,
    pub source_hook: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl ClassificationTask {
    /// Cap the content field at the task limit (character boundary safe).
    #[must_use]
    pub fn capped_content(content: &str) -> String {
        if content.len() <= TASK_CONTENT_MAX {
            return content.to_string();
        }
        let mut end = TASK_CONTENT_MAX;
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        content[..end].to_string()
    }
}

/// Directory-backed FIFO of [`ClassificationTask`]s.
pub struct ClassificationQueue {
    dir: PathBuf,
}

impl ClassificationQueue {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            dir: config.classification_queue_dir(),
        }
    }

    /// Post a task. Failure here never fails the storage call; callers
    /// log and continue.
    pub fn enqueue(&self, task: &ClassificationTask) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let name = format!(
            "{:020}-{}.json",
            task.created_at.timestamp_nanos_opt().unwrap_or_default(),
            task.point_id
        );
        let tmp = self.dir.join(format!(".{name}.tmp"));
        std::fs::write(&tmp, serde_json::to_vec(task)?)?;
        std::fs::rename(&tmp, self.dir.join(name))?;
        Ok(())
    }

    /// Take up to `batch_size` tasks in FIFO order, removing them from
    /// the queue. A file that vanished under us (competing reader) or
    /// fails to parse is skipped.
    pub fn dequeue_batch(&self, batch_size: usize) -> Result<Vec<ClassificationTask>> {
        let mut names = self.task_files()?;
        names.sort();

        let mut tasks = Vec::new();
        for path in names.into_iter().take(batch_size) {
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };
            if std::fs::remove_file(&path).is_err() {
                continue;
            }
            match serde_json::from_slice::<ClassificationTask>(&bytes) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!(path = %path.display(), error = %e, "dropping corrupt classification task"),
            }
        }
        Ok(tasks)
    }

    /// Current queue depth.
    pub fn size(&self) -> Result<usize> {
        Ok(self.task_files()?.len())
    }

    fn task_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().is_some_and(|ext| ext == "json")
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| !n.starts_with('.'))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_in(dir: &std::path::Path) -> ClassificationQueue {
        ClassificationQueue {
            dir: dir.to_path_buf(),
        }
    }

    fn task(content: &str, at_nanos: i64) -> ClassificationTask {
        ClassificationTask {
            point_id: Uuid::new_v4(),
            collection: Collection::Discussions,
            content: content.to_string(),
            current_type: MemoryType::UserMessage,
            group_id: "proj".into(),
            source_hook: "user_prompt_capture".into(),
            created_at: DateTime::from_timestamp_nanos(at_nanos),
            session_id: Some("s1".into()),
            trace_id: None,
        }
    }

    #[test]
    fn fifo_order_and_consumption() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path());

        queue.enqueue(&task("first", 1_000)).unwrap();
        queue.enqueue(&task("second", 2_000)).unwrap();
        queue.enqueue(&task("third", 3_000)).unwrap();
        assert_eq!(queue.size().unwrap(), 3);

        let batch = queue.dequeue_batch(2).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].content, "first");
        assert_eq!(batch[1].content, "second");
        assert_eq!(queue.size().unwrap(), 1);
    }

    #[test]
    fn empty_queue_dequeues_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let queue = queue_in(dir.path());
        assert_eq!(queue.size().unwrap(), 0);
        assert!(queue.dequeue_batch(10).unwrap().is_empty());
    }

    #[test]
    fn content_cap_respects_char_boundaries() {
        let long = "é".repeat(TASK_CONTENT_MAX);
        let capped = ClassificationTask::capped_content(&long);
        assert!(capped.len() <= TASK_CONTENT_MAX);
        assert!(capped.chars().all(|c| c == 'é'));
    }
}
