use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::challenge::{ChallengeLauncher, GlobalConfig};
use crate::commands::host::{TerminalHost, answer_challenges};
use crate::commands::utils::{load_puzzles, open_store};
use crate::config::GateConfig;
use crate::platform::{ForegroundProbe, SystemAppLauncher};
use crate::policy::SessionPolicyEngine;
use crate::registry::MonitoredTargetRegistry;
use crate::sources::{EventDispatcher, PollingSource, TrafficSource, spawn_source};

/// Run the gate in the foreground until Ctrl+C
pub fn run(config: GateConfig, traffic_log: Option<PathBuf>, no_poll: bool) -> Result<()> {
    if no_poll && traffic_log.is_none() {
        anyhow::bail!("Nothing to watch: --no-poll needs --traffic-log");
    }
    if traffic_log.as_deref() == Some(Path::new("-")) {
        anyhow::bail!("Stdin carries challenge answers; pass --traffic-log a file or named pipe");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run_gate(config, traffic_log, no_poll));

    // Stdin reads park a blocking thread that never returns on its own
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run_gate(config: GateConfig, traffic_log: Option<PathBuf>, no_poll: bool) -> Result<()> {
    let store = open_store(&config)?;
    let registry = Arc::new(MonitoredTargetRegistry::new(store.clone(), config.host_app_id.clone()));
    let engine = Arc::new(SessionPolicyEngine::new(
        store.clone(),
        registry.clone(),
        config.grace_window(),
    )?);

    // Expiry timers did not survive the last shutdown
    engine.reset_all_sessions().context("Failed to reset sessions")?;

    let puzzles = load_puzzles(&config)?;
    let (host, views) = TerminalHost::channel();
    let launcher = Arc::new(ChallengeLauncher::new(
        engine.clone(),
        Arc::new(puzzles),
        GlobalConfig::new(store.clone()),
        Arc::new(host),
        Arc::new(SystemAppLauncher),
    ));
    let dispatcher = Arc::new(EventDispatcher::new(engine.clone(), launcher.clone()));

    let (stop, shutdown) = watch::channel(false);
    let mut tasks = Vec::new();

    if !no_poll {
        let source = PollingSource::new(ForegroundProbe, config.poll_interval(), config.poll_lookback());
        tasks.push(spawn_source(source, dispatcher.clone(), shutdown.clone()));
    }

    if let Some(path) = traffic_log {
        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open traffic log: {}", path.display()))?;
        let source = TrafficSource::new(BufReader::new(file));
        tasks.push(spawn_source(source, dispatcher.clone(), shutdown.clone()));
    }

    let answers = tokio::spawn(answer_challenges(
        launcher.clone(),
        views,
        BufReader::new(tokio::io::stdin()),
        shutdown.clone(),
    ));

    let monitored = registry.monitored_targets()?.len();
    info!(
        "Puzzle gate running: {} target(s), {}s grace window",
        monitored,
        config.grace_window_secs
    );
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down...");

    let _ = stop.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            warn!("Event source task failed: {}", e);
        }
    }
    match answers.await {
        Ok(Err(e)) => warn!("Challenge prompt failed: {:#}", e),
        Err(e) => warn!("Challenge prompt task failed: {}", e),
        Ok(Ok(())) => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traffic_log_cannot_be_stdin() {
        let err = run(GateConfig::default(), Some(PathBuf::from("-")), true).unwrap_err();
        assert!(err.to_string().contains("named pipe"));
    }

    #[test]
    fn no_poll_needs_a_traffic_log() {
        assert!(run(GateConfig::default(), None, true).is_err());
    }
}
