// src/watch/coalesce.rs

use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::config::DrainConfig;
use crate::types::ChangeEvent;
use crate::watch::backend::{WatchMessage, WatchSubscription};
use crate::watch::matcher::ExtensionMatcher;

/// Result of draining one burst of notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Qualifying events dequeued during the drain.
    pub qualifying: usize,
    /// True if a stop was requested while draining.
    pub cancelled: bool,
}

/// Absorbs bursts of notifications into a single reload trigger.
///
/// The count is only a trigger signal. Which files changed is re-derived by
/// the checksum tracker, since watch backends may drop, duplicate or merge
/// events.
#[derive(Debug, Clone)]
pub struct EventCoalescer {
    matcher: ExtensionMatcher,
    drain: DrainConfig,
}

impl EventCoalescer {
    pub fn new(matcher: ExtensionMatcher, drain: DrainConfig) -> Self {
        Self { matcher, drain }
    }

    /// An event qualifies if it can change a rule file.
    pub fn qualifies(&self, event: &ChangeEvent) -> bool {
        event.op.alters_rules() && self.matcher.matches(&event.path)
    }

    /// Dequeue pending notifications without blocking.
    ///
    /// Each time the queue is found empty the coalescer sleeps for
    /// `drain.interval`; it stops after `drain.retries` empty polls in total,
    /// when `drain.max_burst` qualifying events were seen, when the source is
    /// closed, or when `cancel` fires.
    pub async fn drain(
        &self,
        subscription: &mut WatchSubscription,
        cancel: &CancellationToken,
    ) -> DrainOutcome {
        let mut outcome = DrainOutcome::default();
        let mut empty_polls = 0u32;

        while empty_polls < self.drain.retries {
            match subscription.try_recv() {
                Ok(WatchMessage::Change(event)) => {
                    trace!(path = ?event.path, op = %event.op, "queued file event");
                    if self.qualifies(&event) {
                        outcome.qualifying += 1;
                        if self
                            .drain
                            .max_burst
                            .is_some_and(|max| outcome.qualifying >= max)
                        {
                            trace!(burst = outcome.qualifying, "burst cap reached");
                            break;
                        }
                    }
                }
                Ok(WatchMessage::Error(err)) => {
                    warn!(error = %err, "file watch error while draining events");
                }
                Err(TryRecvError::Empty) => {
                    empty_polls += 1;
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            outcome.cancelled = true;
                            break;
                        }
                        _ = tokio::time::sleep(self.drain.interval) => {}
                    }
                }
                Err(TryRecvError::Disconnected) => break,
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    use crate::types::FileOp;

    fn coalescer(retries: u32, max_burst: Option<usize>) -> EventCoalescer {
        let matcher = ExtensionMatcher::new(&["yaml", "yml"]).unwrap();
        EventCoalescer::new(
            matcher,
            DrainConfig {
                retries,
                interval: Duration::from_millis(1),
                max_burst,
            },
        )
    }

    fn change(path: &str, op: FileOp) -> WatchMessage {
        WatchMessage::Change(ChangeEvent::new(path, op))
    }

    #[test]
    fn only_rule_files_and_content_ops_qualify() {
        let c = coalescer(1, None);
        assert!(c.qualifies(&ChangeEvent::new("/r/a.yaml", FileOp::Write)));
        assert!(c.qualifies(&ChangeEvent::new("/r/a.yml", FileOp::Remove)));
        assert!(!c.qualifies(&ChangeEvent::new("/r/a.yaml", FileOp::Metadata)));
        assert!(!c.qualifies(&ChangeEvent::new("/r/a.yaml~", FileOp::Write)));
    }

    #[tokio::test]
    async fn counts_only_qualifying_events() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = WatchSubscription::new(rx, ());
        tx.send(change("/r/a.yaml", FileOp::Write)).unwrap();
        tx.send(change("/r/.a.yaml.swp", FileOp::Write)).unwrap();
        tx.send(WatchMessage::Error("overflow".into())).unwrap();
        tx.send(change("/r/b.yml", FileOp::Create)).unwrap();

        let out = coalescer(3, None).drain(&mut sub, &CancellationToken::new()).await;
        assert_eq!(out.qualifying, 2);
        assert!(!out.cancelled);
    }

    #[tokio::test]
    async fn burst_cap_leaves_the_rest_queued() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = WatchSubscription::new(rx, ());
        for _ in 0..10 {
            tx.send(change("/r/a.yaml", FileOp::Write)).unwrap();
        }

        let out = coalescer(3, Some(4)).drain(&mut sub, &CancellationToken::new()).await;
        assert_eq!(out.qualifying, 4);
        assert!(sub.try_recv().is_ok());
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_drain() {
        let (_tx, rx) = mpsc::unbounded_channel::<WatchMessage>();
        let mut sub = WatchSubscription::new(rx, ());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let out = coalescer(u32::MAX, None).drain(&mut sub, &cancel).await;
        assert!(out.cancelled);
    }

    #[tokio::test]
    async fn closed_source_ends_the_drain() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = WatchSubscription::new(rx, ());
        tx.send(change("/r/a.yaml", FileOp::Write)).unwrap();
        drop(tx);

        let out = coalescer(u32::MAX, None).drain(&mut sub, &CancellationToken::new()).await;
        assert_eq!(out.qualifying, 1);
    }
}
