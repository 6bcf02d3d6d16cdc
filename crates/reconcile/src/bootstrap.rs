//! Auto-activation of catalog layers flagged `checked`.
//!
//! The catalog can finish loading before the render surface exists, so
//! dispatch is guarded by a bounded retry. The retry budget lives here;
//! the spacing between attempts is owned by the caller (the host sleeps,
//! tests just poll), keeping this crate free of timers.

use std::time::Duration;

use catalog::LayerDefinition;
use layers::{ActiveLayerStore, StoreError, Tier};
use tracing::{debug, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub spacing: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            spacing: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoActivateOutcome {
    /// Dispatched; `n` layers were activated.
    Activated(usize),
    /// Surface not ready yet; poll again after the policy's spacing.
    Waiting { attempts_left: u32 },
    /// Attempt budget exhausted. Not an error: the catalog itself loaded
    /// fine, the pre-checked layers just stay inactive.
    GaveUp,
}

/// Bounded-retry dispatcher for the catalog's pre-checked leaves.
///
/// Terminal outcomes are sticky: once dispatched or given up, further
/// polls return the terminal outcome and never re-activate.
#[derive(Debug)]
pub struct AutoActivator {
    pending: Vec<LayerDefinition>,
    attempts_left: u32,
    policy: RetryPolicy,
    gave_up: bool,
    dispatched: bool,
}

impl AutoActivator {
    /// `pending` is the output of [`catalog::collect_checked_leaves`].
    pub fn new(pending: Vec<LayerDefinition>) -> Self {
        Self::with_policy(pending, RetryPolicy::default())
    }

    pub fn with_policy(pending: Vec<LayerDefinition>, policy: RetryPolicy) -> Self {
        Self {
            pending,
            attempts_left: policy.max_attempts,
            policy,
            gave_up: false,
            dispatched: false,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn is_settled(&self) -> bool {
        self.dispatched || self.gave_up || self.pending.is_empty()
    }

    /// One activation attempt. Pre-checked layers activate at the
    /// intermediate tier with activation defaults.
    pub fn poll(&mut self, store: &mut ActiveLayerStore, surface_ready: bool) -> AutoActivateOutcome {
        if self.gave_up {
            return AutoActivateOutcome::GaveUp;
        }
        if self.dispatched || self.pending.is_empty() {
            self.dispatched = true;
            return AutoActivateOutcome::Activated(0);
        }

        if !surface_ready {
            if self.attempts_left == 0 {
                self.gave_up = true;
                warn!(
                    pending = self.pending.len(),
                    attempts = self.policy.max_attempts,
                    "render surface never became ready, giving up on auto-activation"
                );
                return AutoActivateOutcome::GaveUp;
            }
            self.attempts_left -= 1;
            debug!(attempts_left = self.attempts_left, "surface not ready, will retry");
            return AutoActivateOutcome::Waiting {
                attempts_left: self.attempts_left,
            };
        }

        let mut activated = 0;
        for definition in std::mem::take(&mut self.pending) {
            match store.activate(definition, Tier::Intermediate) {
                Ok(()) => activated += 1,
                Err(StoreError::DuplicateActivation { id }) => {
                    debug!(layer = %id, "already active, skipping auto-activation");
                }
            }
        }
        self.dispatched = true;
        AutoActivateOutcome::Activated(activated)
    }
}
