/// Shared data structures for the application state
///
/// These structs represent the data model that flows between
/// the file session and the UI layer.

/// Lifecycle of the file session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No handle held in memory
    NoFile,
    /// A file dialog is outstanding
    Picking,
    /// A handle is held and was readable last time we looked
    Active,
    /// The held handle stopped working and was dropped
    Invalid,
}

/// How the file label should be presented
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLabel {
    /// Freshly picked in this session
    Selected(String),
    /// Remembered from a previous session (may be stale)
    LastUsed(String),
    /// Generate was requested without a usable file
    SelectPrompt,
}

impl FileLabel {
    pub fn text(&self) -> String {
        match self {
            FileLabel::Selected(name) => format!("Selected: {}", name),
            FileLabel::LastUsed(name) => format!("Last used: {}", name),
            FileLabel::SelectPrompt => "Select a file".to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FileLabel::SelectPrompt)
    }
}

/// Snapshot of the session handed to the UI after every operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub state: SessionState,
    pub label: Option<FileLabel>,
    /// Generate-from-file is enabled exactly when the state is `Active`
    pub generate_enabled: bool,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            state: SessionState::NoFile,
            label: None,
            generate_enabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_text() {
        assert_eq!(FileLabel::Selected("a.typ".into()).text(), "Selected: a.typ");
        assert_eq!(FileLabel::LastUsed("notes.txt".into()).text(), "Last used: notes.txt");
        assert!(FileLabel::SelectPrompt.is_error());
    }
}
