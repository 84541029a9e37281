//! Access event sources
//!
//! Every way of noticing that the user reached for a gated target ends up as
//! a [`Target`] handed to the [`EventDispatcher`], which evaluates it and
//! presents a challenge when needed.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::challenge::{ChallengeLauncher, PresentOutcome};
use crate::policy::{Decision, SessionPolicyEngine};
use crate::target::Target;

pub mod poll;
pub mod traffic;
pub mod window;

pub use poll::{PollingSource, UsageEvent, UsageEventKind, UsageProbe};
pub use traffic::TrafficSource;
pub use window::{WindowEventSource, WindowStateChanged};

/// What happened to one access event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The event named the gate itself or nothing at all
    Ignored,
    Allowed,
    Challenged,
    /// Blocked; a challenge is already on screen
    AlreadyChallenged,
    /// Blocked; no challenge could be presented
    Blocked,
}

/// Routes normalized access events through the policy engine
pub struct EventDispatcher {
    engine: Arc<SessionPolicyEngine>,
    launcher: Arc<ChallengeLauncher>,
}

impl EventDispatcher {
    pub fn new(engine: Arc<SessionPolicyEngine>, launcher: Arc<ChallengeLauncher>) -> Self {
        Self { engine, launcher }
    }

    pub fn dispatch(&self, target: Target) -> DispatchOutcome {
        let target = Target::new(target.kind, target.id.trim());
        if target.id.is_empty() || self.engine.registry().is_host(&target.id) {
            return DispatchOutcome::Ignored;
        }

        match self.engine.evaluate(&target) {
            Decision::Allow => DispatchOutcome::Allowed,
            Decision::Challenge => match self.launcher.present(&target) {
                Ok(PresentOutcome::Presented) => DispatchOutcome::Challenged,
                Ok(PresentOutcome::AlreadyPending) => DispatchOutcome::AlreadyChallenged,
                Err(e) => {
                    error!("Access to {} blocked without a challenge: {}", target, e);
                    DispatchOutcome::Blocked
                }
            },
        }
    }
}

/// Anything that observes access events
pub trait AccessEventSource: Send + 'static {
    fn name(&self) -> &'static str;

    /// Feed events to `dispatcher` until the input ends or `shutdown` flips to true
    fn run(
        self,
        dispatcher: Arc<EventDispatcher>,
        shutdown: watch::Receiver<bool>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Run a source as a background task
pub fn spawn_source<S: AccessEventSource>(
    source: S,
    dispatcher: Arc<EventDispatcher>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let name = source.name();
    tokio::spawn(async move {
        info!("Starting {} source", name);
        match source.run(dispatcher, shutdown).await {
            Ok(()) => info!("{} source stopped", name),
            Err(e) => error!("{} source failed: {:#}", name, e),
        }
    })
}

/// Resolves once shutdown has been requested or the sender is gone
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            debug!("Shutdown sender dropped");
            return;
        }
    }
}
