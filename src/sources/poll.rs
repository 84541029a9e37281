use anyhow::Context;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use super::{AccessEventSource, EventDispatcher, shutdown_requested};
use crate::target::Target;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_LOOKBACK: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageEventKind {
    ActivityResumed,
    MoveToForeground,
    ActivityPaused,
    MoveToBackground,
    Other,
}

impl UsageEventKind {
    pub fn is_foreground(&self) -> bool {
        matches!(self, Self::ActivityResumed | Self::MoveToForeground)
    }
}

/// One entry from the platform's usage history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEvent {
    pub package: String,
    pub kind: UsageEventKind,
    pub timestamp: DateTime<Utc>,
}

/// Platform query for recent usage events
pub trait UsageProbe: Send + Sync + 'static {
    fn query_events(&self, begin: DateTime<Utc>, end: DateTime<Utc>) -> anyhow::Result<Vec<UsageEvent>>;
}

/// Package of the latest foreground event; the earliest wins a timestamp tie
pub fn latest_foreground(events: &[UsageEvent]) -> Option<&str> {
    let mut latest: Option<&UsageEvent> = None;
    for event in events.iter().filter(|e| e.kind.is_foreground()) {
        if latest.is_none_or(|current| event.timestamp > current.timestamp) {
            latest = Some(event);
        }
    }
    latest.map(|event| event.package.as_str())
}

/// Poll-based source: periodically samples which app is in the foreground
pub struct PollingSource<P> {
    probe: Arc<P>,
    interval: Duration,
    lookback: Duration,
}

impl<P: UsageProbe> PollingSource<P> {
    pub fn new(probe: P, interval: Duration, lookback: Duration) -> Self {
        Self {
            probe: Arc::new(probe),
            interval,
            lookback,
        }
    }

    pub fn with_defaults(probe: P) -> Self {
        Self::new(probe, DEFAULT_POLL_INTERVAL, DEFAULT_LOOKBACK)
    }

    async fn sample(&self) -> anyhow::Result<Option<String>> {
        let end = Utc::now();
        let begin = end - chrono::Duration::from_std(self.lookback).context("Look-back window too large")?;
        let probe = self.probe.clone();

        // Probes may shell out; keep them off the async workers
        let events = tokio::task::spawn_blocking(move || probe.query_events(begin, end))
            .await
            .context("Usage probe task failed")??;

        Ok(latest_foreground(&events).map(str::to_string))
    }
}

impl<P: UsageProbe> AccessEventSource for PollingSource<P> {
    fn name(&self) -> &'static str {
        "poll"
    }

    async fn run(
        self,
        dispatcher: Arc<EventDispatcher>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                _ = ticker.tick() => {
                    match self.sample().await {
                        Ok(Some(package)) => {
                            let outcome = dispatcher.dispatch(Target::app(package.clone()));
                            debug!("Foreground app {}: {:?}", package, outcome);
                        }
                        Ok(None) => debug!("No foreground app in the last {:?}", self.lookback),
                        Err(e) => warn!("Failed to sample foreground app: {:#}", e),
                    }
                }
            }
        }
        Ok(())
    }
}
