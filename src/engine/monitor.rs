// src/engine/monitor.rs

//! Policy monitor controller.
//!
//! Owns the watch subscription and the background loop, and sequences the
//! pieces of a reload:
//!
//! ```text
//! notification → coalescer (drain burst) → checksum tracker (changed?)
//!              → compile gateway → publisher → consumer swap
//! ```
//!
//! Only a failed subscription in [`Monitor::start`] is returned to the
//! caller. Every other failure is logged and the loop keeps watching, so a bad
//! rule edit degrades to "no update applied".

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::MonitorConfig;
use crate::engine::core::{decide, ReloadDecision};
use crate::engine::gateway::CompileGateway;
use crate::engine::publisher::{Publisher, RuleSetReceiver};
use crate::errors::{PolicyWatchError, Result};
use crate::fs::FileSystem;
use crate::policy::RuleSet;
use crate::types::{ChangeEvent, MonitorState};
use crate::watch::{ChecksumTracker, EventCoalescer, ExtensionMatcher, WatchBackend, WatchMessage, WatchSubscription};

/// Watches a rule directory and publishes a fresh [`RuleSet`] whenever its
/// rule files materially change.
pub struct Monitor {
    policies_path: PathBuf,
    coalescer: EventCoalescer,
    tracker: Arc<Mutex<ChecksumTracker>>,
    gateway: CompileGateway,
    publisher: Publisher,
    backend: Arc<dyn WatchBackend>,
    state: MonitorState,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("policies_path", &self.policies_path)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// Build a stopped monitor and the receiving end of its handoff queue.
    ///
    /// The snapshot starts empty, so the first qualifying notification after
    /// `start` always leads to a compile.
    pub fn new(
        config: MonitorConfig,
        gateway: CompileGateway,
        backend: Arc<dyn WatchBackend>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<(Self, RuleSetReceiver)> {
        let matcher = ExtensionMatcher::new(&config.extensions)?;
        // Canonicalize once so snapshot keys are absolute and stable.
        let policies_path = fs
            .canonicalize(&config.policies_path)
            .unwrap_or_else(|_| config.policies_path.clone());

        let tracker = ChecksumTracker::new(policies_path.clone(), matcher.clone(), fs);
        let coalescer = EventCoalescer::new(matcher, config.drain);
        let (publisher, rx) = Publisher::new(config.queue_capacity);

        let monitor = Self {
            policies_path,
            coalescer,
            tracker: Arc::new(Mutex::new(tracker)),
            gateway,
            publisher,
            backend,
            state: MonitorState::Stopped,
            cancel: None,
            handle: None,
        };
        Ok((monitor, rx))
    }

    /// `Stopped` after [`stop`], and also once the loop has exited on its
    /// own because the watch stream closed.
    ///
    /// [`stop`]: Monitor::stop
    pub fn state(&self) -> MonitorState {
        let loop_exited = self.handle.as_ref().is_some_and(|h| h.is_finished());
        if self.state == MonitorState::Running && loop_exited {
            MonitorState::Stopped
        } else {
            self.state
        }
    }

    /// Subscribe to the policy directory and spawn the background loop.
    ///
    /// No-op when already running. Must be called from within a Tokio
    /// runtime. On subscription failure the monitor stays stopped.
    ///
    /// If the loop of a previous run is still finishing a compile, the new
    /// loop waits for it to exit before handling notifications, so at most
    /// one loop is ever active.
    pub fn start(&mut self) -> Result<()> {
        if self.state() == MonitorState::Running {
            debug!("policy monitor already running");
            return Ok(());
        }

        let subscription = self.backend.subscribe(&self.policies_path).map_err(|err| {
            error!(path = ?self.policies_path, error = %err, "unable to add watch to policy directory");
            err
        })?;

        let cancel = CancellationToken::new();
        let ctx = LoopContext {
            policies_path: self.policies_path.clone(),
            coalescer: self.coalescer.clone(),
            tracker: Arc::clone(&self.tracker),
            gateway: self.gateway.clone(),
            publisher: self.publisher.clone(),
        };
        let previous = self.handle.take().filter(|h| !h.is_finished());
        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                debug!("waiting for previous policy monitor loop to exit");
                if let Err(err) = previous.await {
                    warn!(error = %err, "previous policy monitor task ended abnormally");
                }
            }
            run_loop(ctx, subscription, loop_cancel).await;
        });

        self.cancel = Some(cancel);
        self.handle = Some(handle);
        self.state = MonitorState::Running;
        info!(path = ?self.policies_path, "policy monitor started");
        Ok(())
    }

    /// Ask the background loop to exit. Never blocks.
    ///
    /// No-op when already stopped. A compile in progress runs to completion;
    /// the loop exits at its next scheduling point.
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if self.state == MonitorState::Running {
            info!(path = ?self.policies_path, "policy monitor stopping");
        }
        self.state = MonitorState::Stopped;
    }

    /// Wait for every loop started so far to finish.
    ///
    /// Each loop joins its predecessor, so awaiting the latest one covers
    /// them all. Returns immediately if no loop was started. Call after
    /// [`stop`]; while running, this waits until the watch source closes.
    ///
    /// [`stop`]: Monitor::stop
    pub async fn wait(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "policy monitor task ended abnormally");
            }
            // No loop is left running, whether or not `stop` was called.
            self.cancel = None;
            self.state = MonitorState::Stopped;
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

/// Everything the background loop owns or shares.
struct LoopContext {
    policies_path: PathBuf,
    coalescer: EventCoalescer,
    tracker: Arc<Mutex<ChecksumTracker>>,
    gateway: CompileGateway,
    publisher: Publisher,
}

async fn run_loop(ctx: LoopContext, mut subscription: WatchSubscription, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                trace!("policy monitor received stop signal; exiting");
                break;
            }
            message = subscription.recv() => match message {
                Some(WatchMessage::Change(event)) => {
                    ctx.on_change(event, &mut subscription, &cancel).await;
                }
                Some(WatchMessage::Error(err)) => {
                    let err = PolicyWatchError::WatchStream(err);
                    error!(path = ?ctx.policies_path, error = %err, "error while watching policy directory");
                }
                None => {
                    warn!(path = ?ctx.policies_path, "policy watch stream closed; monitor exiting");
                    break;
                }
            }
        }
    }
    // Dropping the subscription here releases the underlying watcher.
    debug!(path = ?ctx.policies_path, "policy monitor loop finished");
}

impl LoopContext {
    async fn on_change(
        &self,
        event: ChangeEvent,
        subscription: &mut WatchSubscription,
        cancel: &CancellationToken,
    ) {
        trace!(path = ?event.path, op = %event.op, "file event");
        if !self.coalescer.qualifies(&event) {
            return;
        }

        let drained = self.coalescer.drain(subscription, cancel).await;
        if drained.cancelled {
            return;
        }
        let activity = 1 + drained.qualifying;
        trace!(activity, "coalesced policy file events");

        let tracker = Arc::clone(&self.tracker);
        let gateway = self.gateway.clone();
        let policies_path = self.policies_path.clone();

        // Scanning and compiling are synchronous; keep them off the runtime
        // worker threads.
        let compiled = tokio::task::spawn_blocking(move || {
            reload(&mut lock_tracker(&tracker), &gateway, &policies_path)
        })
        .await;

        match compiled {
            Ok(Some(rules)) => self.publish(rules),
            Ok(None) => {}
            Err(err) => error!(error = %err, "policy reload task failed"),
        }
    }

    fn publish(&self, rules: Arc<RuleSet>) {
        if let Err(err) = self.publisher.publish(rules) {
            error!(error = %err, "unable to push new policy rule set to consumer");
        }
    }
}

fn lock_tracker(tracker: &Mutex<ChecksumTracker>) -> MutexGuard<'_, ChecksumTracker> {
    tracker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scan, decide, and compile if needed. Returns the new rule set, if any.
fn reload(
    tracker: &mut ChecksumTracker,
    gateway: &CompileGateway,
    policies_path: &Path,
) -> Option<Arc<RuleSet>> {
    let scan = tracker.scan();
    let paths = match decide(&scan) {
        ReloadDecision::Unchanged => {
            debug!("policy files unchanged; skipping compile");
            return None;
        }
        ReloadDecision::Compile(paths) => paths,
        ReloadDecision::AwaitPolicies => {
            error!(
                path = ?policies_path,
                "there are no policy files in the policy path; waiting for policies to be added"
            );
            return None;
        }
        ReloadDecision::Relist => {
            if let Err(err) = &scan {
                error!(error = %err, "unable to calculate checksums on policies; attempting to compile policies");
            }
            match tracker.list() {
                Ok(paths) if !paths.is_empty() => paths,
                Ok(_) => {
                    error!(path = ?policies_path, "no policy files found; waiting for policies to be added");
                    return None;
                }
                Err(err) => {
                    error!(error = %err, "unable to list policy files; skipping compile");
                    return None;
                }
            }
        }
    };

    // Compile errors are logged by the gateway; the rule set in force stays.
    gateway.compile(&paths).ok()
}
