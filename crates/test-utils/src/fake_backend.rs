use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use policywatch::errors::{PolicyWatchError, Result};
use policywatch::types::{ChangeEvent, FileOp};
use policywatch::watch::{WatchBackend, WatchMessage, WatchSubscription};

/// A watch backend driven by the test instead of the filesystem.
///
/// - records every directory it was asked to subscribe to
/// - delivers notifications to the most recent subscription
/// - tracks how many subscriptions are still alive
#[derive(Default)]
pub struct FakeWatchBackend {
    sender: Mutex<Option<mpsc::UnboundedSender<WatchMessage>>>,
    subscriptions: Mutex<Vec<PathBuf>>,
    live: Arc<AtomicUsize>,
    fail: AtomicBool,
}

/// Keeps the live-subscription count honest.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeWatchBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every following `subscribe` call fail.
    pub fn fail_subscriptions(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Directories subscribed to so far, in order.
    pub fn subscriptions(&self) -> Vec<PathBuf> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Subscriptions not yet dropped by their owner.
    pub fn live_subscriptions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Deliver a change notification. Returns `false` if nobody is listening.
    pub fn send_change(&self, path: impl AsRef<Path>, op: FileOp) -> bool {
        self.send(WatchMessage::Change(ChangeEvent::new(path.as_ref(), op)))
    }

    /// Deliver a watch-mechanism error.
    pub fn send_error(&self, message: &str) -> bool {
        self.send(WatchMessage::Error(message.to_string()))
    }

    /// End the notification stream of the current subscription.
    pub fn close(&self) {
        self.sender.lock().unwrap().take();
    }

    fn send(&self, message: WatchMessage) -> bool {
        match self.sender.lock().unwrap().as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }
}

impl WatchBackend for FakeWatchBackend {
    fn subscribe(&self, dir: &Path) -> Result<WatchSubscription> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PolicyWatchError::WatchSubscription {
                path: dir.to_path_buf(),
                reason: "injected subscription failure".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(tx);
        self.subscriptions.lock().unwrap().push(dir.to_path_buf());
        self.live.fetch_add(1, Ordering::SeqCst);

        Ok(WatchSubscription::new(rx, LiveGuard(Arc::clone(&self.live))))
    }
}
