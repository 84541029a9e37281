use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a monitored target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetKind {
    App,
    Domain,
}

impl TargetKind {
    /// Segment used in persisted preference keys
    pub fn key_segment(&self) -> &'static str {
        match self {
            TargetKind::App => "APP",
            TargetKind::Domain => "DOMAIN",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::App => write!(f, "app"),
            TargetKind::Domain => write!(f, "domain"),
        }
    }
}

/// An app identifier or domain string subject to gating
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct Target {
    pub kind: TargetKind,
    pub id: String,
}

impl Target {
    pub fn new(kind: TargetKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn app(id: impl Into<String>) -> Self {
        Self::new(TargetKind::App, id)
    }

    pub fn domain(id: impl Into<String>) -> Self {
        Self::new(TargetKind::Domain, id)
    }

    /// `PUZZLE_SOLVED_<KIND>_<id>`
    pub fn puzzle_solved_key(&self) -> String {
        format!("{}{}", PUZZLE_SOLVED_PREFIX, self.key_suffix())
    }

    /// `SESSION_ACTIVE_<KIND>_<id>`
    pub fn session_active_key(&self) -> String {
        format!("{}{}", SESSION_ACTIVE_PREFIX, self.key_suffix())
    }

    fn key_suffix(&self) -> String {
        format!("{}_{}", self.kind.key_segment(), self.id)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

pub const PUZZLE_SOLVED_PREFIX: &str = "PUZZLE_SOLVED_";
pub const SESSION_ACTIVE_PREFIX: &str = "SESSION_ACTIVE_";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_keys_follow_kind_and_id() {
        let app = Target::app("com.example.social");
        assert_eq!(app.puzzle_solved_key(), "PUZZLE_SOLVED_APP_com.example.social");
        assert_eq!(app.session_active_key(), "SESSION_ACTIVE_APP_com.example.social");

        let domain = Target::domain("facebook.com");
        assert_eq!(domain.session_active_key(), "SESSION_ACTIVE_DOMAIN_facebook.com");
    }

    #[test]
    fn same_id_different_kind_is_a_different_target() {
        assert_ne!(Target::app("x"), Target::domain("x"));
        assert_ne!(
            Target::app("x").session_active_key(),
            Target::domain("x").session_active_key()
        );
    }

    #[test]
    fn display_is_kind_prefixed() {
        assert_eq!(Target::app("a.b").to_string(), "app:a.b");
        assert_eq!(Target::domain("c.d").to_string(), "domain:c.d");
    }
}
