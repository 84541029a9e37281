/// Challenge module: what the user must solve to pass the gate
///
/// This module provides:
/// - Puzzle validation and the CSV-backed puzzle bank
/// - The closed set of builtin challenge presentations
/// - The launcher that presents challenges and records solves

pub mod launcher;
pub mod presentation;
pub mod puzzle;

pub use launcher::{
    AppLauncher, ChallengeHost, ChallengeLauncher, ChallengeView, LaunchParams, PresentOutcome,
    SubmitOutcome,
};
pub use presentation::{ChallengeDescriptor, ChallengePresentation, GlobalConfig};
pub use puzzle::{Puzzle, PuzzleBank, PuzzleSource};
