//! Per-file import state machine.

use std::fmt;

use serde::Serialize;

/// Where a file is in the pipeline.
///
/// `Discovered → Reading → Parsing → Categorizing → Stored`, or `Failed` from
/// any non-terminal state. Duplicates found before reading go straight from
/// `Discovered` to `Stored`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    #[default]
    Discovered,
    Reading,
    Parsing,
    Categorizing,
    Stored,
    Failed,
}

impl FileState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileState::Stored | FileState::Failed)
    }

    /// Whether `self → next` is a valid transition.
    pub fn can_advance_to(&self, next: FileState) -> bool {
        use FileState::*;

        match (self, next) {
            (Stored | Failed, _) => false,
            (_, Failed) => true,
            (Discovered, Reading | Stored) => true,
            (Reading, Parsing) => true,
            (Parsing, Categorizing) => true,
            (Categorizing, Stored) => true,
            _ => false,
        }
    }

    /// Move to `next` if the transition is valid. Returns whether it moved.
    pub fn advance(&mut self, next: FileState) -> bool {
        if self.can_advance_to(next) {
            *self = next;
            true
        } else {
            false
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Discovered => "discovered",
            FileState::Reading => "reading",
            FileState::Parsing => "parsing",
            FileState::Categorizing => "categorizing",
            FileState::Stored => "stored",
            FileState::Failed => "failed",
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut state = FileState::default();
        for next in [
            FileState::Reading,
            FileState::Parsing,
            FileState::Categorizing,
            FileState::Stored,
        ] {
            assert!(state.advance(next), "{} -> {}", state, next);
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_duplicate_skips_to_stored() {
        let mut state = FileState::Discovered;
        assert!(state.advance(FileState::Stored));
    }

    #[test]
    fn test_no_skipping_stages() {
        let mut state = FileState::Reading;
        assert!(!state.advance(FileState::Stored));
        assert!(!state.advance(FileState::Categorizing));
        assert_eq!(state, FileState::Reading);
        assert!(state.advance(FileState::Failed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut failed = FileState::Failed;
        assert!(!failed.advance(FileState::Reading));
        assert!(!failed.advance(FileState::Stored));

        let mut stored = FileState::Stored;
        assert!(!stored.advance(FileState::Failed));
    }
}
