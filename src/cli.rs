use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::challenge::ChallengePresentation;
use crate::config::GateConfig;
use crate::target::Target;

/// Puzzle Gate
///
/// Interposes a Sudoku challenge before chosen apps and websites. A solved
/// puzzle opens a short session; the next launch after it lapses is
/// challenged again.
#[derive(Parser, Debug)]
#[command(name = "puzzle-gate")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (defaults to the platform location)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write an example configuration file, or a validated one when settings are given
    Init {
        /// Output path (defaults to the platform config location)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        settings: InitSettings,
    },
    /// Manage monitored apps
    Apps {
        #[command(subcommand)]
        command: AppsCommands,
    },
    /// Manage monitored domains
    Domains {
        #[command(subcommand)]
        command: DomainsCommands,
    },
    /// Show or choose the challenge presentation
    Challenge {
        #[command(subcommand)]
        command: ChallengeCommands,
    },
    /// Evaluate a target without presenting a challenge
    Check {
        #[command(flatten)]
        target: TargetArg,
    },
    /// Show monitored targets and their session flags
    Status,
    /// Close every active session (done automatically when the gate starts)
    ResetSessions,
    /// Clear both session flags for one target
    ResetTarget {
        #[command(flatten)]
        target: TargetArg,
    },
    /// Run the gate in the foreground
    Run {
        /// Also read observed hostnames, one per line, from this file or named pipe
        #[arg(long)]
        traffic_log: Option<PathBuf>,

        /// Do not poll the foreground app
        #[arg(long)]
        no_poll: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum AppsCommands {
    /// Start gating an app
    Add { id: String },
    /// Stop gating an app
    Remove { id: String },
    /// List monitored apps
    List,
    /// List installed apps that are not monitored
    Available,
}

#[derive(Subcommand, Debug)]
pub enum DomainsCommands {
    /// Start gating hostnames containing this keyword
    Add { domain: String },
    /// Stop gating a domain keyword
    Remove { domain: String },
    /// List monitored domains
    List,
}

#[derive(Subcommand, Debug)]
pub enum ChallengeCommands {
    /// Show the configured presentation
    Show,
    /// Choose the presentation by name
    Set { name: String },
}

/// Settings `init` writes instead of the commented example
#[derive(ClapArgs, Debug, Default, Clone)]
pub struct InitSettings {
    /// How long a solved puzzle keeps a target open, in seconds
    #[arg(long)]
    pub grace_window_secs: Option<u64>,

    /// Preference store location
    #[arg(long)]
    pub store_path: Option<PathBuf>,

    /// CSV of `puzzle,solution` lines
    #[arg(long)]
    pub puzzle_file: Option<PathBuf>,
}

impl InitSettings {
    pub fn is_empty(&self) -> bool {
        self.grace_window_secs.is_none() && self.store_path.is_none() && self.puzzle_file.is_none()
    }

    /// Defaults with these settings applied
    pub fn to_config(&self) -> GateConfig {
        let mut config = GateConfig::default();
        if let Some(secs) = self.grace_window_secs {
            config.grace_window_secs = secs;
        }
        config.store_path = self.store_path.clone();
        config.puzzle_file = self.puzzle_file.clone();
        config
    }
}

/// Exactly one of --app or --domain
#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = false)]
pub struct TargetArg {
    /// App identifier
    #[arg(long)]
    pub app: Option<String>,

    /// Domain name
    #[arg(long)]
    pub domain: Option<String>,
}

impl TargetArg {
    pub fn target(&self) -> Option<Target> {
        match (&self.app, &self.domain) {
            (Some(app), _) => Some(Target::app(app.trim())),
            (None, Some(domain)) => Some(Target::domain(domain.trim().to_lowercase())),
            (None, None) => None,
        }
    }
}

/// Presentation names accepted by `challenge set`
pub fn presentation_names() -> Vec<&'static str> {
    ChallengePresentation::ALL.iter().map(|p| p.name()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetKind;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn check_requires_exactly_one_target() {
        assert!(Args::try_parse_from(["puzzle-gate", "check"]).is_err());
        assert!(
            Args::try_parse_from(["puzzle-gate", "check", "--app", "a", "--domain", "b"]).is_err()
        );

        let args = Args::try_parse_from(["puzzle-gate", "check", "--domain", " Facebook.com "]).unwrap();
        let Commands::Check { target } = args.command else {
            panic!("expected check");
        };
        let target = target.target().unwrap();
        assert_eq!(target.kind, TargetKind::Domain);
        assert_eq!(target.id, "facebook.com");
    }

    #[test]
    fn init_settings_are_optional() {
        let args = Args::try_parse_from(["puzzle-gate", "init"]).unwrap();
        let Commands::Init { settings, .. } = args.command else {
            panic!("expected init");
        };
        assert!(settings.is_empty());

        let args =
            Args::try_parse_from(["puzzle-gate", "init", "--grace-window-secs", "30"]).unwrap();
        let Commands::Init { settings, .. } = args.command else {
            panic!("expected init");
        };
        assert_eq!(settings.to_config().grace_window_secs, 30);
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let args =
            Args::try_parse_from(["puzzle-gate", "apps", "list", "-v", "--config", "gate.yaml"]).unwrap();
        assert!(args.verbose);
        assert_eq!(args.config, Some(PathBuf::from("gate.yaml")));
    }
}
