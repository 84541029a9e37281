use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::challenge::{ChallengePresentation, GlobalConfig};
use crate::cli::{ChallengeCommands, InitSettings, TargetArg, presentation_names};
use crate::commands::utils::{flag, open_store};
use crate::config::{EXAMPLE_CONFIG, GateConfig, get_config_path, save_config};
use crate::policy::{Decision, SessionPolicyEngine};
use crate::registry::MonitoredTargetRegistry;
use crate::target::Target;

/// Initialize a new configuration file
///
/// Without settings the commented example is written as is. With settings a
/// validated config is written instead, and invalid values are rejected.
pub fn init(output: Option<PathBuf>, force: bool, settings: &InitSettings) -> Result<()> {
    let output_path = output.unwrap_or_else(|| {
        get_config_path().unwrap_or_else(|_| PathBuf::from("puzzle-gate.yaml"))
    });

    if output_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {}\nUse --force to overwrite",
            output_path.display()
        );
    }

    if settings.is_empty() {
        crate::platform::atomic_write(&output_path, EXAMPLE_CONFIG.as_bytes())
            .with_context(|| format!("Failed to write config file: {}", output_path.display()))?;
    } else {
        save_config(&output_path, &settings.to_config())?;
    }

    println!("✓ Created configuration file: {}", output_path.display());
    println!("\nEdit this file to tune the grace window and polling.");
    println!("Then choose what to gate:");
    println!("  puzzle-gate apps add <app-id>");
    println!("  puzzle-gate domains add <keyword>");

    Ok(())
}

/// Run `f` against a policy engine opened on the configured store
///
/// The engine needs a runtime for its expiry timers even when none fire.
fn with_engine<T>(
    config: &GateConfig,
    f: impl FnOnce(&SessionPolicyEngine) -> Result<T>,
) -> Result<T> {
    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    let store = open_store(config)?;
    let registry = Arc::new(MonitoredTargetRegistry::new(store.clone(), config.host_app_id.clone()));
    let engine = SessionPolicyEngine::new(store, registry, config.grace_window())?;
    f(&engine)
}

fn require_target(target: &TargetArg) -> Result<Target> {
    target.target().context("Specify --app or --domain")
}

pub fn challenge(command: ChallengeCommands, config: &GateConfig) -> Result<()> {
    let settings = GlobalConfig::new(open_store(config)?);

    match command {
        ChallengeCommands::Show => {
            let stored = settings.presentation_name()?;
            let active = settings.presentation();
            println!("Challenge: {}", active);
            if stored != active.name() {
                println!("  (stored setting '{}' is not available)", stored);
            }
        }
        ChallengeCommands::Set { name } => {
            let presentation = ChallengePresentation::resolve(&name).with_context(|| {
                format!("Choose one of: {}", presentation_names().join(", "))
            })?;
            settings.set_presentation(presentation)?;
            println!("✓ Challenge set to {}", presentation);
        }
    }

    Ok(())
}

pub fn check(target: &TargetArg, config: &GateConfig) -> Result<()> {
    let target = require_target(target)?;

    with_engine(config, |engine| {
        let decision = engine.evaluate(&target);
        let state = engine.session_state(&target)?;
        let monitored = engine.registry().is_monitored(&target)?;

        println!("Target:    {}", target);
        println!("Monitored: {}", flag(monitored));
        println!("Solved:    {}", flag(state.puzzle_solved));
        println!("Active:    {}", flag(state.session_active));
        println!(
            "Decision:  {}",
            match decision {
                Decision::Allow => "allow",
                Decision::Challenge => "challenge",
            }
        );
        Ok(())
    })
}

pub fn status(config: &GateConfig) -> Result<()> {
    println!("Puzzle Gate Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Store:        {}", config.resolved_store_path()?.display());
    println!("Grace window: {}s", config.grace_window_secs);

    with_engine(config, |engine| {
        let targets = engine.registry().monitored_targets()?;
        println!();
        if targets.is_empty() {
            println!("Nothing is gated yet.");
            return Ok(());
        }

        println!("{:<40} {:>7} {:>7}", "Target", "Solved", "Active");
        for target in targets {
            let state = engine.session_state(&target)?;
            println!(
                "{:<40} {:>7} {:>7}",
                target.to_string(),
                flag(state.puzzle_solved),
                flag(state.session_active)
            );
        }
        Ok(())
    })
}

pub fn reset_sessions(config: &GateConfig) -> Result<()> {
    let count = with_engine(config, |engine| Ok(engine.reset_all_sessions()?))?;
    println!("✓ Closed {} session(s)", count);
    Ok(())
}

pub fn reset_target(target: &TargetArg, config: &GateConfig) -> Result<()> {
    let target = require_target(target)?;
    with_engine(config, |engine| Ok(engine.reset_target(&target)?))?;
    println!("✓ {} will be challenged on next use", target);
    Ok(())
}
