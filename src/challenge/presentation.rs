use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::challenge::puzzle::Puzzle;
use crate::error::GateError;
use crate::store::KeyValueStore;

/// Preference key holding the selected presentation
pub const GLOBAL_ACTIVITY_KEY: &str = "GLOBAL_ACTIVITY";

/// Cell blanked by the single-cell presentation
pub const SINGLE_CELL_INDEX: usize = 10;

/// Builtin ways of presenting a challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChallengePresentation {
    /// Solve the full puzzle
    #[default]
    Sudoku,
    /// Fill one blank cell of an otherwise solved grid
    SingleCell,
}

/// Recognised presentation names. `None` marks a name that is known but has
/// no builtin implementation.
const PRESENTATIONS: &[(&str, Option<ChallengePresentation>)] = &[
    ("sudoku", Some(ChallengePresentation::Sudoku)),
    ("sudoku puzzle", Some(ChallengePresentation::Sudoku)),
    ("com.social.media.decondition.SudokuPuzzleActivity", Some(ChallengePresentation::Sudoku)),
    ("single-cell", Some(ChallengePresentation::SingleCell)),
    ("math challenge", None),
    ("com.social.media.decondition.MathChallengeActivity", None),
    ("typing test", None),
    ("com.social.media.decondition.TypingTestActivity", None),
];

impl ChallengePresentation {
    pub const ALL: [ChallengePresentation; 2] = [Self::Sudoku, Self::SingleCell];

    /// Canonical name stored under [`GLOBAL_ACTIVITY_KEY`]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sudoku => "sudoku",
            Self::SingleCell => "single-cell",
        }
    }

    /// Resolve a configured name
    pub fn resolve(name: &str) -> Result<Self, GateError> {
        let trimmed = name.trim();
        PRESENTATIONS
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(trimmed))
            .and_then(|(_, presentation)| *presentation)
            .ok_or_else(|| GateError::ConfigClassMissing(trimmed.to_string()))
    }

    /// Build the descriptor shown to the user for `puzzle`
    pub fn build(&self, puzzle: &Puzzle) -> ChallengeDescriptor {
        let shown = match self {
            Self::Sudoku => puzzle.clone(),
            Self::SingleCell => puzzle.with_single_blank(SINGLE_CELL_INDEX),
        };
        let solution = shown.solution().to_string();

        ChallengeDescriptor::new(shown.puzzle().to_string(), move |candidate| {
            normalize_candidate(candidate) == solution
        })
    }
}

impl fmt::Display for ChallengePresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChallengePresentation {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}

/// Strip the separators a user may type between cells
fn normalize_candidate(candidate: &str) -> String {
    candidate
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '|' | '-' | '+' | ','))
        .collect()
}

/// Prompt plus the predicate that accepts its answer
///
/// Lives only as long as one challenge presentation.
pub struct ChallengeDescriptor {
    prompt: String,
    predicate: Box<dyn Fn(&str) -> bool + Send + Sync>,
}

impl ChallengeDescriptor {
    pub fn new(prompt: String, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            prompt,
            predicate: Box::new(predicate),
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn is_solution(&self, candidate: &str) -> bool {
        (self.predicate)(candidate)
    }
}

impl fmt::Debug for ChallengeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeDescriptor")
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

/// Process-wide challenge settings backed by the store
#[derive(Clone)]
pub struct GlobalConfig {
    store: Arc<dyn KeyValueStore>,
}

impl GlobalConfig {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Raw stored name, defaulting to the builtin presentation
    pub fn presentation_name(&self) -> Result<String, GateError> {
        Ok(self
            .store
            .get_string(GLOBAL_ACTIVITY_KEY, ChallengePresentation::default().name())?)
    }

    /// The presentation to use; unknown or unreadable settings fall back to the default
    pub fn presentation(&self) -> ChallengePresentation {
        let name = match self.presentation_name() {
            Ok(name) => name,
            Err(e) => {
                warn!("Failed to read challenge presentation, using default: {}", e);
                return ChallengePresentation::default();
            }
        };

        ChallengePresentation::resolve(&name).unwrap_or_else(|e| {
            warn!("{}; falling back to {}", e, ChallengePresentation::default());
            ChallengePresentation::default()
        })
    }

    pub fn set_presentation(&self, presentation: ChallengePresentation) -> Result<(), GateError> {
        self.store.put_string(GLOBAL_ACTIVITY_KEY, presentation.name())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PreferenceStore;

    const PUZZLE: &str =
        "530070000600195000098000060800060003400803001700020006060000280000419005000080079";
    const SOLUTION: &str =
        "534678912672195348198342567859761423426853791713924856961537284287419635345286179";

    fn puzzle() -> Puzzle {
        Puzzle::new(PUZZLE, SOLUTION).unwrap()
    }

    #[test]
    fn resolves_names_and_legacy_class_names() {
        assert_eq!(ChallengePresentation::resolve("sudoku").unwrap(), ChallengePresentation::Sudoku);
        assert_eq!(
            ChallengePresentation::resolve("Sudoku Puzzle").unwrap(),
            ChallengePresentation::Sudoku
        );
        assert_eq!(
            ChallengePresentation::resolve("com.social.media.decondition.SudokuPuzzleActivity").unwrap(),
            ChallengePresentation::Sudoku
        );
        assert_eq!(
            "single-cell".parse::<ChallengePresentation>().unwrap(),
            ChallengePresentation::SingleCell
        );
    }

    #[test]
    fn known_but_unbuilt_presentations_are_missing() {
        assert!(matches!(
            ChallengePresentation::resolve("Math Challenge"),
            Err(GateError::ConfigClassMissing(_))
        ));
        assert!(matches!(
            ChallengePresentation::resolve("com.social.media.decondition.TypingTestActivity"),
            Err(GateError::ConfigClassMissing(_))
        ));
        assert!(ChallengePresentation::resolve("nonsense").is_err());
    }

    #[test]
    fn sudoku_descriptor_accepts_only_the_solution() {
        let descriptor = ChallengePresentation::Sudoku.build(&puzzle());
        assert_eq!(descriptor.prompt(), PUZZLE);
        assert!(descriptor.is_solution(SOLUTION));
        assert!(!descriptor.is_solution(PUZZLE));
        assert!(!descriptor.is_solution(""));
    }

    #[test]
    fn descriptor_ignores_separators() {
        let descriptor = ChallengePresentation::Sudoku.build(&puzzle());
        let spaced: Vec<&str> = (0..9).map(|row| &SOLUTION[row * 9..row * 9 + 9]).collect();
        assert!(descriptor.is_solution(&spaced.join("\n")));
    }

    #[test]
    fn single_cell_descriptor_blanks_one_cell() {
        let descriptor = ChallengePresentation::SingleCell.build(&puzzle());
        assert_eq!(descriptor.prompt().chars().filter(|c| *c == '0').count(), 1);
        assert!(descriptor.is_solution(SOLUTION));
    }

    #[test]
    fn global_config_defaults_and_persists() {
        let store = Arc::new(PreferenceStore::in_memory());
        let config = GlobalConfig::new(store.clone());
        assert_eq!(config.presentation(), ChallengePresentation::Sudoku);

        config.set_presentation(ChallengePresentation::SingleCell).unwrap();
        assert_eq!(store.get_string(GLOBAL_ACTIVITY_KEY, "").unwrap(), "single-cell");
        assert_eq!(config.presentation(), ChallengePresentation::SingleCell);
    }

    #[test]
    fn global_config_falls_back_on_unknown_name() {
        let store = Arc::new(PreferenceStore::in_memory());
        store
            .put_string(GLOBAL_ACTIVITY_KEY, "com.social.media.decondition.MathChallengeActivity")
            .unwrap();
        let config = GlobalConfig::new(store);
        assert_eq!(config.presentation(), ChallengePresentation::Sudoku);
    }
}
