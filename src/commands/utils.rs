use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::challenge::PuzzleBank;
use crate::config::{self, GateConfig};
use crate::registry::MonitoredTargetRegistry;
use crate::store::PreferenceStore;

/// Initialize logging
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

/// Load the config at `path`, or the platform default location
///
/// A missing file at the default location means defaults; a missing file the
/// user named explicitly is an error.
pub fn load_gate_config(path: Option<PathBuf>) -> Result<GateConfig> {
    match path {
        Some(path) => config::load_config(&path)
            .context("Failed to load configuration file"),
        None => {
            let path = config::get_config_path()?;
            config::load_config_or_default(&path)
                .context("Failed to load configuration file")
        }
    }
}

pub fn open_store(config: &GateConfig) -> Result<Arc<PreferenceStore>> {
    let path = config.resolved_store_path()?;
    let store = PreferenceStore::open(&path)
        .with_context(|| format!("Failed to open preference store: {}", path.display()))?;
    Ok(Arc::new(store))
}

pub fn open_registry(config: &GateConfig) -> Result<(Arc<PreferenceStore>, MonitoredTargetRegistry)> {
    let store = open_store(config)?;
    let registry = MonitoredTargetRegistry::new(store.clone(), config.host_app_id.clone());
    Ok((store, registry))
}

/// The configured puzzle file, or the builtin bank
pub fn load_puzzles(config: &GateConfig) -> Result<PuzzleBank> {
    match &config.puzzle_file {
        Some(path) => {
            let bank = PuzzleBank::load(path)?;
            info!("Loaded {} puzzle(s) from {}", bank.len(), path.display());
            Ok(bank)
        }
        None => Ok(PuzzleBank::builtin()),
    }
}

/// Render an 81-cell grid as nine rows, blanks shown as '.'
pub fn format_grid(cells: &str) -> String {
    let cells: Vec<char> = cells
        .chars()
        .map(|c| if c == '0' { '.' } else { c })
        .collect();

    let mut out = String::new();
    for (row, chunk) in cells.chunks(9).enumerate() {
        if row > 0 && row % 3 == 0 {
            out.push_str("------+-------+------\n");
        }
        for (col, cell) in chunk.iter().enumerate() {
            if col > 0 && col % 3 == 0 {
                out.push_str("| ");
            }
            out.push(*cell);
            if col + 1 < chunk.len() {
                out.push(' ');
            }
        }
        out.push('\n');
    }
    out
}

/// Print a yes/no flag
pub fn flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_grid_rows_and_boxes() {
        let grid = format_grid(
            "530070000600195000098000060800060003400803001700020006060000280000419005000080079",
        );
        let lines: Vec<&str> = grid.lines().collect();

        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], "5 3 . | . 7 . | . . .");
        assert_eq!(lines[3], "------+-------+------");
        assert_eq!(lines[10], ". . . | . 8 . | . 7 9");
    }

    #[test]
    fn builtin_puzzles_without_puzzle_file() {
        let bank = load_puzzles(&GateConfig::default()).unwrap();
        assert!(!bank.is_empty());
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_gate_config(Some(dir.path().join("absent.yaml"))).is_err());
    }
}
