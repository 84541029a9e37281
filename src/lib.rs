//! Puzzle Gate
//!
//! Gates chosen apps and websites behind a Sudoku challenge. Solving it opens
//! a short session for that target; once the grace window lapses the next
//! launch is challenged again.

pub mod apps;
pub mod challenge;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod platform;
pub mod policy;
pub mod registry;
pub mod sources;
pub mod store;
pub mod target;

pub use error::GateError;
