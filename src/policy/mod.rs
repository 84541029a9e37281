/// Session policy module: the gate's decision core
///
/// This module provides:
/// - ALLOW / CHALLENGE decisions for access events
/// - Session state transitions (solved, active, expired, reset)
/// - Cancellable grace-window expiry per target
/// - The domain → package lookup used to relaunch after a domain challenge

pub mod engine;
pub mod expiry;
pub mod launch_map;

pub use engine::{DEFAULT_GRACE_WINDOW, Decision, SessionPhase, SessionPolicyEngine, SessionState};
pub use expiry::ExpiryScheduler;
pub use launch_map::{UNKNOWN_PACKAGE, package_for_domain};
