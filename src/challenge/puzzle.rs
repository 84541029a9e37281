use rand::seq::SliceRandom;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::GateError;

/// Cells in a 9x9 grid
pub const GRID_CELLS: usize = 81;

/// Blank cell marker
pub const BLANK: char = '0';

/// Puzzle bank compiled into the binary, used when no puzzle file is configured
const BUILTIN_PUZZLES: &str = include_str!("../../assets/builtin-puzzles.csv");

/// A Sudoku puzzle and its solution, both 81-digit strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Puzzle {
    puzzle: String,
    solution: String,
}

impl Puzzle {
    /// Validate and build a puzzle
    ///
    /// The solution must be fully filled, and every given in the puzzle must
    /// agree with it.
    pub fn new(puzzle: &str, solution: &str) -> Result<Self, GateError> {
        let puzzle = puzzle.trim();
        let solution = solution.trim();

        validate_grid(puzzle, "puzzle")?;
        validate_grid(solution, "solution")?;

        if solution.contains(BLANK) {
            return Err(GateError::InvalidPuzzle("solution contains blank cells".to_string()));
        }

        if let Some(index) = puzzle
            .chars()
            .zip(solution.chars())
            .position(|(given, answer)| given != BLANK && given != answer)
        {
            return Err(GateError::InvalidPuzzle(format!(
                "given at cell {} disagrees with the solution",
                index
            )));
        }

        Ok(Self {
            puzzle: puzzle.to_string(),
            solution: solution.to_string(),
        })
    }

    pub fn puzzle(&self) -> &str {
        &self.puzzle
    }

    pub fn solution(&self) -> &str {
        &self.solution
    }

    pub fn blank_cells(&self) -> usize {
        self.puzzle.chars().filter(|c| *c == BLANK).count()
    }

    /// The solution with only `index` blanked
    pub fn with_single_blank(&self, index: usize) -> Self {
        let index = index % GRID_CELLS;
        let puzzle = self
            .solution
            .char_indices()
            .map(|(i, c)| if i == index { BLANK } else { c })
            .collect();

        Self {
            puzzle,
            solution: self.solution.clone(),
        }
    }
}

fn validate_grid(grid: &str, label: &str) -> Result<(), GateError> {
    if grid.len() != GRID_CELLS {
        return Err(GateError::InvalidPuzzle(format!(
            "{} must have {} cells, got {}",
            label,
            GRID_CELLS,
            grid.len()
        )));
    }
    if !grid.chars().all(|c| c.is_ascii_digit()) {
        return Err(GateError::InvalidPuzzle(format!("{} must contain only digits", label)));
    }
    Ok(())
}

/// Supplies puzzles for challenges
pub trait PuzzleSource: Send + Sync {
    fn next_puzzle(&self) -> Result<Puzzle, GateError>;
}

/// A fixed set of puzzles served in random order
#[derive(Debug, Clone, Default)]
pub struct PuzzleBank {
    puzzles: Vec<Puzzle>,
}

impl PuzzleBank {
    pub fn new(puzzles: Vec<Puzzle>) -> Self {
        Self { puzzles }
    }

    /// Parse `puzzle,solution` lines; malformed lines are skipped
    pub fn from_csv_str(content: &str) -> Self {
        let mut puzzles = Vec::new();

        for (line_number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let columns: Vec<&str> = line.split(',').collect();
            if columns.len() != 2 {
                debug!("Skipping puzzle line {}: expected 2 columns", line_number + 1);
                continue;
            }

            match Puzzle::new(columns[0], columns[1]) {
                Ok(puzzle) => puzzles.push(puzzle),
                Err(e) => warn!("Skipping puzzle line {}: {}", line_number + 1, e),
            }
        }

        Self { puzzles }
    }

    /// Load a CSV puzzle file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read puzzle file: {}", path.display()))?;
        let bank = Self::from_csv_str(&content);

        if bank.is_empty() {
            anyhow::bail!("Puzzle file contains no valid puzzles: {}", path.display());
        }

        debug!("Loaded {} puzzles from {}", bank.len(), path.display());
        Ok(bank)
    }

    /// The bank compiled into the binary
    pub fn builtin() -> Self {
        Self::from_csv_str(BUILTIN_PUZZLES)
    }

    pub fn len(&self) -> usize {
        self.puzzles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puzzles.is_empty()
    }
}

impl PuzzleSource for PuzzleBank {
    fn next_puzzle(&self) -> Result<Puzzle, GateError> {
        self.puzzles
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| GateError::ChallengeSourceUnavailable("puzzle bank is empty".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUZZLE: &str =
        "530070000600195000098000060800060003400803001700020006060000280000419005000080079";
    const SOLUTION: &str =
        "534678912672195348198342567859761423426853791713924856961537284287419635345286179";

    #[test]
    fn accepts_consistent_pair() {
        let puzzle = Puzzle::new(PUZZLE, SOLUTION).unwrap();
        assert_eq!(puzzle.blank_cells(), 51);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            Puzzle::new("123", SOLUTION),
            Err(GateError::InvalidPuzzle(_))
        ));
    }

    #[test]
    fn rejects_non_digits() {
        let bad = PUZZLE.replacen('0', "x", 1);
        assert!(Puzzle::new(&bad, SOLUTION).is_err());
    }

    #[test]
    fn rejects_blank_solution() {
        assert!(Puzzle::new(PUZZLE, PUZZLE).is_err());
    }

    #[test]
    fn rejects_given_that_disagrees() {
        let bad = format!("6{}", &PUZZLE[1..]);
        assert!(Puzzle::new(&bad, SOLUTION).is_err());
    }

    #[test]
    fn single_blank_keeps_solution() {
        let puzzle = Puzzle::new(PUZZLE, SOLUTION).unwrap().with_single_blank(10);
        assert_eq!(puzzle.blank_cells(), 1);
        assert_eq!(puzzle.puzzle().chars().nth(10), Some(BLANK));
        assert_eq!(puzzle.solution(), SOLUTION);
    }

    #[test]
    fn csv_skips_malformed_lines() {
        let csv = format!(
            "# header\n{},{}\nonly-one-column\n{},{}\n\n",
            PUZZLE, SOLUTION, "123", SOLUTION
        );
        let bank = PuzzleBank::from_csv_str(&csv);
        assert_eq!(bank.len(), 1);
    }

    #[test]
    fn builtin_bank_is_valid() {
        let bank = PuzzleBank::builtin();
        assert_eq!(bank.len(), 3);
        assert!(bank.next_puzzle().is_ok());
    }

    #[test]
    fn empty_bank_is_unavailable() {
        let bank = PuzzleBank::default();
        assert!(matches!(
            bank.next_puzzle(),
            Err(GateError::ChallengeSourceUnavailable(_))
        ));
    }

    #[test]
    fn load_rejects_file_without_puzzles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("puzzles.csv");
        std::fs::write(&path, "garbage\n").unwrap();
        assert!(PuzzleBank::load(&path).is_err());

        std::fs::write(&path, format!("{},{}\n", PUZZLE, SOLUTION)).unwrap();
        assert_eq!(PuzzleBank::load(&path).unwrap().len(), 1);
    }
}
