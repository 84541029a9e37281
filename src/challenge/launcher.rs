use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::challenge::presentation::{ChallengeDescriptor, ChallengePresentation, GlobalConfig};
use crate::challenge::puzzle::PuzzleSource;
use crate::error::GateError;
use crate::policy::{SessionPolicyEngine, package_for_domain};
use crate::target::{Target, TargetKind};

/// Parameters handed to the host launch primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchParams {
    pub package_id: String,
    pub domain: Option<String>,
}

impl LaunchParams {
    pub fn for_target(target: &Target) -> Self {
        match target.kind {
            TargetKind::App => Self {
                package_id: target.id.clone(),
                domain: None,
            },
            TargetKind::Domain => Self {
                package_id: package_for_domain(&target.id).to_string(),
                domain: Some(target.id.clone()),
            },
        }
    }
}

/// What the host needs to display a challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeView {
    pub target: Target,
    pub launch: LaunchParams,
    pub presentation: ChallengePresentation,
    pub prompt: String,
}

/// The UI side of a challenge
///
/// `show` must not block on the user's answer. Answers come back through
/// [`ChallengeLauncher::submit`] or [`ChallengeLauncher::abandon`].
pub trait ChallengeHost: Send + Sync {
    fn show(&self, challenge: ChallengeView);

    /// A user-visible notice (toast)
    fn notify(&self, message: &str);
}

/// Reopens the app the user was gated from
pub trait AppLauncher: Send + Sync {
    /// Fails with [`GateError::TargetResolutionFailure`] when the app has no launch entry point
    fn launch(&self, params: &LaunchParams) -> Result<(), GateError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// A challenge for this target is already on screen
    AlreadyPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Session opened; `relaunched` is false when the original app could not be reopened
    Solved { relaunched: bool },
    /// Wrong answer; the challenge stays open
    Incorrect,
    /// No challenge is open for this target
    NotPending,
}

struct PendingChallenge {
    launch: LaunchParams,
    descriptor: ChallengeDescriptor,
}

/// Presents challenges and turns correct answers into sessions
pub struct ChallengeLauncher {
    engine: Arc<SessionPolicyEngine>,
    puzzles: Arc<dyn PuzzleSource>,
    config: GlobalConfig,
    host: Arc<dyn ChallengeHost>,
    apps: Arc<dyn AppLauncher>,
    pending: Mutex<HashMap<Target, PendingChallenge>>,
}

impl ChallengeLauncher {
    pub fn new(
        engine: Arc<SessionPolicyEngine>,
        puzzles: Arc<dyn PuzzleSource>,
        config: GlobalConfig,
        host: Arc<dyn ChallengeHost>,
        apps: Arc<dyn AppLauncher>,
    ) -> Self {
        Self {
            engine,
            puzzles,
            config,
            host,
            apps,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Put a challenge in front of the user for `target`
    ///
    /// Returns once the host has been handed the challenge; the outcome
    /// arrives later through [`submit`](Self::submit).
    pub fn present(&self, target: &Target) -> Result<PresentOutcome, GateError> {
        if self.lock_pending().contains_key(target) {
            debug!("Challenge already pending for {}", target);
            return Ok(PresentOutcome::AlreadyPending);
        }

        let presentation = self.config.presentation();
        let puzzle = match self.puzzles.next_puzzle() {
            Ok(puzzle) => puzzle,
            Err(e) => {
                error!("No challenge available for {}: {}", target, e);
                self.host.notify("No puzzle is available right now. Access stays blocked.");
                return Err(match e {
                    GateError::ChallengeSourceUnavailable(_) => e,
                    other => GateError::ChallengeSourceUnavailable(other.to_string()),
                });
            }
        };

        let descriptor = presentation.build(&puzzle);
        let launch = LaunchParams::for_target(target);
        let view = ChallengeView {
            target: target.clone(),
            launch: launch.clone(),
            presentation,
            prompt: descriptor.prompt().to_string(),
        };

        {
            let mut pending = self.lock_pending();
            if pending.contains_key(target) {
                return Ok(PresentOutcome::AlreadyPending);
            }
            pending.insert(target.clone(), PendingChallenge { launch, descriptor });
        }

        info!("Presenting {} challenge for {}", presentation, target);
        self.host.show(view);
        Ok(PresentOutcome::Presented)
    }

    /// Check an answer for the pending challenge on `target`
    pub fn submit(&self, target: &Target, candidate: &str) -> Result<SubmitOutcome, GateError> {
        let launch = {
            let mut pending = self.lock_pending();
            let Some(challenge) = pending.get(target) else {
                return Ok(SubmitOutcome::NotPending);
            };

            if !challenge.descriptor.is_solution(candidate) {
                drop(pending);
                debug!("Incorrect answer for {}", target);
                self.host.notify("The solution is incorrect. Please try again.");
                return Ok(SubmitOutcome::Incorrect);
            }

            match pending.remove(target) {
                Some(challenge) => challenge.launch,
                None => return Ok(SubmitOutcome::NotPending),
            }
        };

        self.engine.mark_solved(target)?;
        self.host.notify("Congratulations! The puzzle is solved correctly.");

        let relaunched = match self.apps.launch(&launch) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not relaunch {}: {}", launch.package_id, e);
                self.host.notify("Unable to launch the app.");
                false
            }
        };

        Ok(SubmitOutcome::Solved { relaunched })
    }

    /// The user backed out; nothing is granted. Returns false if nothing was pending.
    pub fn abandon(&self, target: &Target) -> bool {
        let removed = self.lock_pending().remove(target).is_some();
        if removed {
            info!("Challenge abandoned for {}", target);
        }
        removed
    }

    pub fn is_pending(&self, target: &Target) -> bool {
        self.lock_pending().contains_key(target)
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<Target, PendingChallenge>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
