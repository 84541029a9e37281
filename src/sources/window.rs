use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::{AccessEventSource, EventDispatcher, shutdown_requested};
use crate::target::Target;

/// A window-focus notification, as an accessibility service would deliver it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowStateChanged {
    pub package: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl WindowStateChanged {
    pub fn now(package: impl Into<String>) -> Self {
        Self {
            package: Some(package.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Event-driven source fed through a channel by the platform integration
pub struct WindowEventSource {
    events: mpsc::Receiver<WindowStateChanged>,
}

impl WindowEventSource {
    /// Create the source and the sender the platform side pushes into
    pub fn channel(capacity: usize) -> (mpsc::Sender<WindowStateChanged>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { events: rx })
    }
}

impl AccessEventSource for WindowEventSource {
    fn name(&self) -> &'static str {
        "window"
    }

    async fn run(
        mut self,
        dispatcher: Arc<EventDispatcher>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    let Some(package) = event.package else {
                        debug!("Window event without a package");
                        continue;
                    };
                    let outcome = dispatcher.dispatch(Target::app(package));
                    debug!("Window event at {}: {:?}", event.timestamp, outcome);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::spawn_source;
    use crate::sources::test_support::{HOST, gate};

    #[tokio::test]
    async fn focus_events_reach_the_gate() {
        let g = gate();
        let (tx, source) = WindowEventSource::channel(8);
        let (_stop, shutdown) = watch::channel(false);
        let task = spawn_source(source, g.dispatcher.clone(), shutdown);

        tx.send(WindowStateChanged::now(HOST)).await.unwrap();
        tx.send(WindowStateChanged {
            package: None,
            timestamp: Utc::now(),
        })
        .await
        .unwrap();
        tx.send(WindowStateChanged::now("com.example.calculator")).await.unwrap();
        tx.send(WindowStateChanged::now("com.example.social")).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let shown = g.host.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].target, Target::app("com.example.social"));
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let g = gate();
        let (_tx, source) = WindowEventSource::channel(8);
        let (stop, shutdown) = watch::channel(false);
        let task = spawn_source(source, g.dispatcher.clone(), shutdown);

        stop.send(true).unwrap();
        task.await.unwrap();
    }
}
