// src/engine/swap.rs

//! Consumer-side swap point.
//!
//! The record-evaluation stage reads the rule set in force through an
//! [`EvaluatorSlot`]. Each record is evaluated against the single `Arc` it
//! loaded, so a swap never splits a record across generations, and a set
//! stays alive for as long as any evaluation still holds it.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::publisher::RuleSetReceiver;
use crate::policy::RuleSet;

/// Holds the rule set currently in force.
#[derive(Debug)]
pub struct EvaluatorSlot {
    current: ArcSwapOption<RuleSet>,
}

impl Default for EvaluatorSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluatorSlot {
    /// An empty slot; nothing is evaluated until the first adoption.
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
        }
    }

    /// The rule set in force. Load once per record and use only that.
    pub fn load(&self) -> Option<Arc<RuleSet>> {
        self.current.load_full()
    }

    pub fn generation(&self) -> Option<u64> {
        self.current.load().as_ref().map(|rules| rules.generation())
    }

    /// Make `next` the rule set in force, unless the slot already holds the
    /// same or a newer generation.
    ///
    /// Returns whether `next` was adopted. Generations in force never go
    /// backwards.
    pub fn adopt(&self, next: Arc<RuleSet>) -> bool {
        let mut adopted = false;
        self.current.rcu(|current| match current {
            Some(held) if held.generation() >= next.generation() => {
                adopted = false;
                Some(Arc::clone(held))
            }
            _ => {
                adopted = true;
                Some(Arc::clone(&next))
            }
        });
        adopted
    }
}

/// Drain the publisher queue and adopt every rule set it delivers.
///
/// The task ends once every publisher handle has been dropped.
pub fn spawn_swap_consumer(mut rx: RuleSetReceiver, slot: Arc<EvaluatorSlot>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(rules) = rx.recv().await {
            let generation = rules.generation();
            if slot.adopt(rules) {
                info!(generation, "swapped in new policy rule set");
            } else {
                warn!(
                    generation,
                    current = ?slot.generation(),
                    "ignoring stale policy rule set"
                );
            }
        }
        debug!("rule set channel closed; swap consumer exiting");
    })
}
