use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use super::record::DownloadRecord;

/// What changed in a [`DownloadEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadEventKind {
    /// The record entered `Downloading`.
    Started,
    /// Byte counts or percentage advanced.
    Progress,
    /// The file was written and verified.
    Completed,
    /// The pipeline failed.
    Failed,
    /// The record was reset to `Idle`.
    Reset,
}

/// State-change notification with the record as it was right after the change.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadEvent {
    /// What changed.
    pub kind: DownloadEventKind,
    /// Snapshot of the record after the mutation.
    pub record: DownloadRecord,
}

/// Observer of orchestrator state changes.
///
/// Called synchronously on the task that made the change; keep it short.
/// A panicking listener is logged and skipped.
pub trait DownloadListener: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &DownloadEvent);
}

impl<F> DownloadListener for F
where
    F: Fn(&DownloadEvent) + Send + Sync,
{
    fn on_event(&self, event: &DownloadEvent) {
        self(event);
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(super) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn DownloadListener>)>>,
}

impl ListenerRegistry {
    pub(super) fn subscribe(&self, listener: Arc<dyn DownloadListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub(super) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `event` to every listener, isolating panics per listener.
    pub(super) fn notify(&self, event: &DownloadEvent) {
        // Snapshot so listeners may (un)subscribe from inside a callback.
        let listeners: Vec<(ListenerId, Arc<dyn DownloadListener>)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, listener) in listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                warn!(
                    listener = ?id,
                    download_id = %event.record.id,
                    kind = ?event.kind,
                    panic = %panic_message(panic.as_ref()),
                    "download listener panicked; continuing"
                );
            }
        }
    }
}

/// Extracts a printable message from a panic payload.
pub(super) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
