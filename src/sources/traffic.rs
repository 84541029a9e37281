use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{debug, trace};

use super::{AccessEventSource, EventDispatcher, shutdown_requested};
use crate::target::Target;

/// Traffic-based source: reads one observed hostname per line
///
/// A local resolver or proxy log piped into the gate is enough; the source
/// only needs the hostname, not the connection itself.
pub struct TrafficSource<R> {
    reader: R,
}

impl<R> TrafficSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

/// Normalize a log line into a hostname, or None for blanks and comments
pub fn normalize_domain(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let host = line.trim_end_matches('.');
    if host.is_empty() {
        return None;
    }
    Some(host.to_lowercase())
}

impl<R> AccessEventSource for TrafficSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn name(&self) -> &'static str {
        "traffic"
    }

    async fn run(
        self,
        dispatcher: Arc<EventDispatcher>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let mut lines = self.reader.lines();

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        debug!("Traffic input ended");
                        break;
                    };
                    let Some(domain) = normalize_domain(&line) else {
                        trace!("Skipping traffic line {:?}", line);
                        continue;
                    };
                    let outcome = dispatcher.dispatch(Target::domain(domain.clone()));
                    debug!("Traffic to {}: {:?}", domain, outcome);
                }
            }
        }
        Ok(())
    }
}
