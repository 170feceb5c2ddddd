// src/engine/publisher.rs

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::info;

use crate::errors::{PolicyWatchError, Result};
use crate::policy::RuleSet;

/// Receiving end of the handoff queue.
pub type RuleSetReceiver = mpsc::Receiver<Arc<RuleSet>>;

/// Bounded FIFO handoff of freshly compiled rule sets.
///
/// Publishing never waits: a full queue drops the new rule set and reports
/// backpressure, leaving the queued ones untouched.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: mpsc::Sender<Arc<RuleSet>>,
    capacity: usize,
}

impl Publisher {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> (Self, RuleSetReceiver) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, capacity }, rx)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn publish(&self, rules: Arc<RuleSet>) -> Result<()> {
        let generation = rules.generation();
        match self.tx.try_send(rules) {
            Ok(()) => {
                info!(generation, "pushed new policy rule set on channel");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(PolicyWatchError::PublishBackpressure {
                generation,
                capacity: self.capacity,
            }),
            Err(TrySendError::Closed(_)) => Err(PolicyWatchError::PublisherClosed { generation }),
        }
    }
}
