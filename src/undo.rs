//! Undo Log (§4.9): bounded MRU list of compensating actions. `VecDeque` gives O(1)
//! push-front/pop-front for the "most recent" access pattern; a HashMap with
//! arbitrary-key eviction wouldn't preserve insertion order, which MRU needs.

use crate::ids::{now, TaskId, UndoId};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub type UndoFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
pub type UndoThunk = Arc<dyn Fn() -> UndoFuture + Send + Sync>;

#[derive(Clone)]
pub struct UndoEntry {
    pub id: UndoId,
    pub task_id: TaskId,
    pub action: String,
    pub description: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    thunk: UndoThunk,
}

/// Summary returned by `get_history`; omits the thunk, which isn't meaningful outside
/// the process that captured it.
#[derive(Debug, Clone)]
pub struct UndoSummary {
    pub id: UndoId,
    pub task_id: TaskId,
    pub action: String,
    pub description: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&UndoEntry> for UndoSummary {
    fn from(entry: &UndoEntry) -> Self {
        Self {
            id: entry.id,
            task_id: entry.task_id,
            action: entry.action.clone(),
            description: entry.description.clone(),
            created_at: entry.created_at,
        }
    }
}

pub struct UndoLog {
    entries: Arc<Mutex<VecDeque<UndoEntry>>>,
    capacity: usize,
}

impl UndoLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub async fn push(&self, task_id: TaskId, action: impl Into<String>, description: impl Into<String>, thunk: UndoThunk) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.capacity {
            entries.pop_back();
        }
        entries.push_front(UndoEntry {
            id: UndoId::new(),
            task_id,
            action: action.into(),
            description: description.into(),
            created_at: now(),
            thunk,
        });
    }

    pub async fn can_undo(&self) -> bool {
        !self.entries.lock().await.is_empty()
    }

    /// Pops the most recent entry and invokes its thunk. Invocation failure is logged
    /// and returns `false`; the entry is not re-inserted.
    pub async fn undo(&self) -> bool {
        let entry = self.entries.lock().await.pop_front();
        match entry {
            Some(entry) => self.invoke(entry).await,
            None => false,
        }
    }

    pub async fn undo_by_id(&self, id: UndoId) -> bool {
        let entry = {
            let mut entries = self.entries.lock().await;
            let position = entries.iter().position(|e| e.id == id);
            position.and_then(|i| entries.remove(i))
        };
        match entry {
            Some(entry) => self.invoke(entry).await,
            None => false,
        }
    }

    async fn invoke(&self, entry: UndoEntry) -> bool {
        match (entry.thunk)().await {
            Ok(()) => {
                info!("undid task {} ({})", entry.task_id, entry.action);
                true
            }
            Err(e) => {
                warn!("undo failed for task {}: {}", entry.task_id, e);
                false
            }
        }
    }

    pub async fn get_history(&self, limit: Option<usize>) -> Vec<UndoSummary> {
        let entries = self.entries.lock().await;
        let iter = entries.iter().map(UndoSummary::from);
        match limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn thunk(flag: Arc<AtomicBool>) -> UndoThunk {
        Arc::new(move || {
            let flag = flag.clone();
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn undo_invokes_most_recent_first() {
        let log = UndoLog::new(10);
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));
        log.push(TaskId::new(), "a", "first", thunk(first.clone())).await;
        log.push(TaskId::new(), "a", "second", thunk(second.clone())).await;

        assert!(log.undo().await);
        assert!(second.load(Ordering::SeqCst));
        assert!(!first.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn capacity_evicts_oldest() {
        let log = UndoLog::new(1);
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));
        log.push(TaskId::new(), "a", "first", thunk(first.clone())).await;
        log.push(TaskId::new(), "a", "second", thunk(second.clone())).await;

        assert_eq!(log.get_history(None).await.len(), 1);
        assert!(log.undo().await);
        assert!(second.load(Ordering::SeqCst));
        assert!(!first.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn undo_by_id_removes_out_of_order() {
        let log = UndoLog::new(10);
        let first = Arc::new(AtomicBool::new(false));
        log.push(TaskId::new(), "a", "first", thunk(first.clone())).await;
        let history = log.get_history(None).await;
        let id = history[0].id;

        assert!(log.undo_by_id(id).await);
        assert!(first.load(Ordering::SeqCst));
        assert!(!log.can_undo().await);
    }

    #[tokio::test]
    async fn undo_on_empty_log_returns_false() {
        let log = UndoLog::new(10);
        assert!(!log.undo().await);
    }
}
