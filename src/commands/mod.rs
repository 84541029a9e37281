pub mod gate;
pub mod host;
pub mod run;
pub mod targets;
pub mod utils;

use anyhow::Result;

use crate::cli::{Args, Commands};
use crate::platform::SystemCatalog;

/// Dispatch a parsed command line
pub fn run_command(args: Args) -> Result<()> {
    utils::init_logging(args.verbose);

    // `init` writes the config, so only the other commands load it
    let config_path = args.config;
    let load = || utils::load_gate_config(config_path.clone());

    match args.command {
        Commands::Init { output, force, settings } => gate::init(output, force, &settings),
        Commands::Apps { command } => targets::run_apps_command(command, &load()?, &SystemCatalog),
        Commands::Domains { command } => targets::run_domains_command(command, &load()?),
        Commands::Challenge { command } => gate::challenge(command, &load()?),
        Commands::Check { target } => gate::check(&target, &load()?),
        Commands::Status => gate::status(&load()?),
        Commands::ResetSessions => gate::reset_sessions(&load()?),
        Commands::ResetTarget { target } => gate::reset_target(&target, &load()?),
        Commands::Run { traffic_log, no_poll } => run::run(load()?, traffic_log, no_poll),
    }
}
