use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::GateError;
use crate::policy::expiry::ExpiryScheduler;
use crate::registry::MonitoredTargetRegistry;
use crate::store::{KeyValueStore, Mutation};
use crate::target::{SESSION_ACTIVE_PREFIX, Target};

/// Default grace window after a solved challenge
pub const DEFAULT_GRACE_WINDOW: Duration = Duration::from_secs(10);

/// Outcome of evaluating an access event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Challenge,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Where a target sits in the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Never solved (or administratively reset)
    Fresh,
    /// Solved before, grace window over
    SolvedInactive,
    /// Within the grace window
    SolvedActive,
}

/// Persisted flag pair for one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionState {
    pub puzzle_solved: bool,
    pub session_active: bool,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match (self.puzzle_solved, self.session_active) {
            (true, true) => SessionPhase::SolvedActive,
            (true, false) => SessionPhase::SolvedInactive,
            // An active flag without a solve is never granted
            (false, _) => SessionPhase::Fresh,
        }
    }
}

/// Decides whether an access is allowed and owns every session flag write
pub struct SessionPolicyEngine {
    store: Arc<dyn KeyValueStore>,
    registry: Arc<MonitoredTargetRegistry>,
    expiry: ExpiryScheduler,
    grace_window: Duration,
}

impl SessionPolicyEngine {
    /// Create an engine bound to the current tokio runtime
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        registry: Arc<MonitoredTargetRegistry>,
        grace_window: Duration,
    ) -> Result<Self, GateError> {
        Ok(Self {
            store,
            registry,
            expiry: ExpiryScheduler::from_current()?,
            grace_window,
        })
    }

    pub fn registry(&self) -> &Arc<MonitoredTargetRegistry> {
        &self.registry
    }

    pub fn grace_window(&self) -> Duration {
        self.grace_window
    }

    /// Decide whether `target` may be used right now
    ///
    /// Resolved from the store on every call. Any store failure fails closed.
    pub fn evaluate(&self, target: &Target) -> Decision {
        if self.registry.is_host(&target.id) {
            return Decision::Allow;
        }

        match self.try_evaluate(target) {
            Ok(decision) => {
                debug!("Evaluated {}: {:?}", target, decision);
                decision
            }
            Err(e) => {
                warn!("Failed to evaluate {}, requiring a challenge: {}", target, e);
                Decision::Challenge
            }
        }
    }

    fn try_evaluate(&self, target: &Target) -> Result<Decision, GateError> {
        if !self.registry.is_monitored(target)? {
            return Ok(Decision::Allow);
        }

        Ok(match self.session_state(target)?.phase() {
            SessionPhase::SolvedActive => Decision::Allow,
            SessionPhase::Fresh | SessionPhase::SolvedInactive => Decision::Challenge,
        })
    }

    /// Read both flags from one snapshot
    pub fn session_state(&self, target: &Target) -> Result<SessionState, GateError> {
        let solved_key = target.puzzle_solved_key();
        let active_key = target.session_active_key();
        let flags = self
            .store
            .get_bools(&[solved_key.as_str(), active_key.as_str()], false)?;

        Ok(SessionState {
            puzzle_solved: flags.first().copied().unwrap_or(false),
            session_active: flags.get(1).copied().unwrap_or(false),
        })
    }

    pub fn phase(&self, target: &Target) -> Result<SessionPhase, GateError> {
        Ok(self.session_state(target)?.phase())
    }

    /// Record a solved challenge and open the grace window
    ///
    /// Both flags are written in one batch. Any pending expiry for the target
    /// is replaced by a new one, and an expiry already firing finishes before
    /// the batch is written.
    pub fn mark_solved(&self, target: &Target) -> Result<(), GateError> {
        let store = self.store.clone();
        let expired = target.clone();
        self.expiry.schedule(
            target.clone(),
            self.grace_window,
            || {
                self.store.apply(vec![
                    Mutation::PutBool(target.puzzle_solved_key(), true),
                    Mutation::PutBool(target.session_active_key(), true),
                ])
            },
            move || match store.put_bool(&expired.session_active_key(), false) {
                Ok(()) => info!("Grace window elapsed for {}", expired),
                Err(e) => error!("Failed to end session for {}: {}", expired, e),
            },
        )?;

        info!(
            "Challenge solved for {}; access allowed for {}s",
            target,
            self.grace_window.as_secs()
        );
        Ok(())
    }

    /// End the grace window for `target`; idempotent
    pub fn reset_session(&self, target: &Target) -> Result<(), GateError> {
        self.expiry
            .cancel_with(target, || self.store.put_bool(&target.session_active_key(), false))?;
        debug!("Session reset for {}", target);
        Ok(())
    }

    /// End every grace window; run at startup because timers do not survive restarts
    ///
    /// Covers every monitored target plus any other target that still has a
    /// stored session flag (for example an observed domain variant such as
    /// `m.facebook.com` gated by the `facebook` entry).
    pub fn reset_all_sessions(&self) -> Result<usize, GateError> {
        let mut reset = 0;

        for target in self.registry.monitored_targets()? {
            self.reset_session(&target)?;
            reset += 1;
        }

        let stale: Vec<Mutation> = self
            .store
            .keys_with_prefix(SESSION_ACTIVE_PREFIX)?
            .into_iter()
            .filter(|key| self.store.get_bool(key, false).unwrap_or(true))
            .map(|key| Mutation::PutBool(key, false))
            .collect();
        reset += stale.len();
        self.store.apply(stale)?;

        info!("Reset {} session(s)", reset);
        Ok(reset)
    }

    /// Administrative reset: forget that `target` was ever solved
    pub fn reset_target(&self, target: &Target) -> Result<(), GateError> {
        self.expiry.cancel_with(target, || {
            self.store.apply(vec![
                Mutation::PutBool(target.puzzle_solved_key(), false),
                Mutation::PutBool(target.session_active_key(), false),
            ])
        })?;
        info!("Reset {} to fresh", target);
        Ok(())
    }

    /// True while an expiry timer is pending for `target`
    pub fn has_pending_expiry(&self, target: &Target) -> bool {
        self.expiry.is_pending(target)
    }
}
