// src/watch/backend.rs

use std::fmt;
use std::path::Path;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::info;

use crate::errors::{PolicyWatchError, Result};
use crate::types::{ChangeEvent, FileOp};

/// One item of the notification stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMessage {
    Change(ChangeEvent),
    /// The underlying watch mechanism reported an error.
    Error(String),
}

/// A live subscription to a directory.
///
/// Holds the receiving end of the notification stream plus whatever keeps the
/// underlying watcher alive. Dropping the subscription stops watching.
pub struct WatchSubscription {
    rx: mpsc::UnboundedReceiver<WatchMessage>,
    _guard: Box<dyn Send>,
}

impl fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSubscription").finish_non_exhaustive()
    }
}

impl WatchSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<WatchMessage>, guard: impl Send + 'static) -> Self {
        Self {
            rx,
            _guard: Box::new(guard),
        }
    }

    /// Wait for the next notification. `None` once the source is gone.
    pub async fn recv(&mut self) -> Option<WatchMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> std::result::Result<WatchMessage, TryRecvError> {
        self.rx.try_recv()
    }
}

/// Source of filesystem change notifications.
///
/// Production code uses [`NotifyBackend`]; tests inject notifications through
/// their own implementation.
pub trait WatchBackend: Send + Sync {
    /// Start watching `dir` (non-recursively).
    fn subscribe(&self, dir: &Path) -> Result<WatchSubscription>;
}

/// Watch backend built on `notify`'s platform watcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyBackend;

impl WatchBackend for NotifyBackend {
    fn subscribe(&self, dir: &Path) -> Result<WatchSubscription> {
        let (tx, rx) = mpsc::unbounded_channel::<WatchMessage>();

        // Called synchronously by notify. Send failures mean the monitor loop
        // has already exited, so they are dropped.
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for change in translate(event) {
                        let _ = tx.send(WatchMessage::Change(change));
                    }
                }
                Err(err) => {
                    let _ = tx.send(WatchMessage::Error(err.to_string()));
                }
            },
            Config::default(),
        )
        .map_err(|e| subscription_error(dir, e))?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| subscription_error(dir, e))?;

        info!("policy watcher subscribed to {:?}", dir);
        Ok(WatchSubscription::new(rx, watcher))
    }
}

fn subscription_error(dir: &Path, err: notify::Error) -> PolicyWatchError {
    PolicyWatchError::WatchSubscription {
        path: dir.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Map a notify event kind onto the operations the monitor understands.
pub fn classify(kind: &EventKind) -> Option<FileOp> {
    match kind {
        EventKind::Create(_) => Some(FileOp::Create),
        EventKind::Remove(_) => Some(FileOp::Remove),
        EventKind::Modify(ModifyKind::Name(_)) => Some(FileOp::Rename),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(FileOp::Metadata),
        EventKind::Modify(_) => Some(FileOp::Write),
        _ => None,
    }
}

/// Split a notify event into one [`ChangeEvent`] per path.
pub fn translate(event: Event) -> Vec<ChangeEvent> {
    match classify(&event.kind) {
        Some(op) => event
            .paths
            .into_iter()
            .map(|path| ChangeEvent::new(path, op))
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RenameMode};

    #[test]
    fn classifies_notify_kinds() {
        assert_eq!(classify(&EventKind::Create(CreateKind::File)), Some(FileOp::Create));
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(FileOp::Write)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some(FileOp::Rename)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))),
            Some(FileOp::Metadata)
        );
        assert_eq!(classify(&EventKind::Access(AccessKind::Any)), None);
    }

    #[test]
    fn rename_events_yield_one_change_per_path() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path("/rules/old.yaml".into())
            .add_path("/rules/new.yaml".into());

        let changes = translate(event);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.op == FileOp::Rename));
    }
}
