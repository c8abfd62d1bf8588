/// Editor settings that survive restarts
///
/// Stored as JSON under the `editorSettings` preference key.

use serde::{Deserialize, Serialize};

use super::prefs::{Preferences, EDITOR_SETTINGS};

/// Font size used when nothing else is configured
pub const DEFAULT_FONT_SIZE: f32 = 28.0;

/// Smallest and largest size offered by the slider
pub const FONT_SIZE_RANGE: std::ops::RangeInclusive<f32> = 6.0..=144.0;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct EditorSettings {
    /// Text size in points
    pub font_size: f32,
    /// Wrap editor snippets in display math
    pub math_mode: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            math_mode: true,
        }
    }
}

impl EditorSettings {
    /// Convert to JSON string for storage
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load from preferences, falling back to `fallback` when absent or unreadable
    pub fn load(prefs: &dyn Preferences, fallback: Self) -> Self {
        prefs
            .get(EDITOR_SETTINGS)
            .and_then(|json| Self::from_json(&json).ok())
            .map(Self::clamped)
            .unwrap_or(fallback)
    }

    pub fn save(&self, prefs: &dyn Preferences) {
        match self.to_json() {
            Ok(json) => prefs.set(EDITOR_SETTINGS, &json),
            Err(e) => tracing::warn!("Failed to serialize editor settings: {}", e),
        }
    }

    /// Keep the font size inside the range the UI can show
    pub fn clamped(mut self) -> Self {
        if !self.font_size.is_finite() {
            self.font_size = DEFAULT_FONT_SIZE;
        }
        self.font_size = self
            .font_size
            .clamp(*FONT_SIZE_RANGE.start(), *FONT_SIZE_RANGE.end());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::prefs::JsonPreferences;

    #[test]
    fn test_serialization() {
        let settings = EditorSettings {
            font_size: 24.0,
            math_mode: false,
        };

        let json = settings.to_json().unwrap();
        let restored = EditorSettings::from_json(&json).unwrap();

        assert_eq!(settings, restored);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let restored = EditorSettings::from_json(r#"{"font_size": 12.0}"#).unwrap();
        assert_eq!(restored.font_size, 12.0);
        assert!(restored.math_mode);
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = JsonPreferences::open(dir.path());

        assert_eq!(
            EditorSettings::load(&prefs, EditorSettings::default()),
            EditorSettings::default()
        );

        let settings = EditorSettings {
            font_size: 1000.0,
            math_mode: false,
        };
        settings.save(&prefs);

        let loaded = EditorSettings::load(&prefs, EditorSettings::default());
        assert_eq!(loaded.font_size, 144.0);
        assert!(!loaded.math_mode);
    }
}
