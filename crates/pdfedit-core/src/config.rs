//! Editor configuration
//!
//! Deployment settings that do not belong in a single edit request: where
//! to look for fonts, how to interpret coordinates when the request does
//! not say, and whether to compress the output.
//!
//! ```toml
//! units = "fraction"
//!
//! [fonts]
//! include_defaults = false
//!
//! [[fonts.thai]]
//! regular = "/opt/fonts/Sarabun-Regular.ttf"
//! bold = "/opt/fonts/Sarabun-Bold.ttf"
//!
//! [output]
//! compress = true
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::fonts::{default_thai_candidates, FontCandidate, SystemFontResolver};
use crate::geometry::CoordinateUnits;

/// Top-level configuration loaded from TOML files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Overrides the unit mode of every request when set
    #[serde(default)]
    pub units: Option<CoordinateUnits>,
    #[serde(default)]
    pub fonts: FontConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl EditorConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the TOML is malformed
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }

    /// Font resolver probing the configured candidates, then the built-in
    /// ones unless disabled.
    pub fn font_resolver(&self) -> SystemFontResolver {
        let mut candidates = self.fonts.thai.clone();
        if self.fonts.include_defaults {
            candidates.extend(default_thai_candidates());
        }
        SystemFontResolver::new(candidates)
    }
}

/// Font search configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontConfig {
    /// Font files with Thai coverage, probed in order
    #[serde(default)]
    pub thai: Vec<FontCandidate>,
    /// Append the built-in system locations after `thai`
    #[serde(default = "default_include_defaults")]
    pub include_defaults: bool,
}

fn default_include_defaults() -> bool {
    true
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            thai: Vec::new(),
            include_defaults: true,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Flate-compress content streams before saving
    #[serde(default = "default_compress")]
    pub compress: bool,
}

fn default_compress() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { compress: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::{FontChoice, FontResolver};
    use std::path::PathBuf;

    #[test]
    fn test_parse_empty_config() {
        let config = EditorConfig::from_str("").unwrap();
        assert_eq!(config, EditorConfig::default());
        assert_eq!(config.units, None);
        assert!(config.fonts.include_defaults);
        assert!(config.output.compress);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            units = "points"

            [fonts]
            include_defaults = false

            [[fonts.thai]]
            regular = "/opt/fonts/Sarabun-Regular.ttf"
            bold = "/opt/fonts/Sarabun-Bold.ttf"

            [output]
            compress = false
        "#;

        let config = EditorConfig::from_str(toml).unwrap();
        assert_eq!(config.units, Some(CoordinateUnits::Points));
        assert!(!config.fonts.include_defaults);
        assert_eq!(config.fonts.thai.len(), 1);
        assert_eq!(
            config.fonts.thai[0].bold,
            Some(PathBuf::from("/opt/fonts/Sarabun-Bold.ttf"))
        );
        assert!(!config.output.compress);
    }

    #[test]
    fn test_invalid_units_rejected() {
        let result = EditorConfig::from_str(r#"units = "inches""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_file_reports_path() {
        let err = EditorConfig::from_file("/nonexistent/pdfedit.toml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/pdfedit.toml"));
    }

    #[test]
    fn test_configured_fonts_come_first() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("Custom.ttf");
        std::fs::write(&font, b"x").unwrap();

        let config = EditorConfig {
            fonts: FontConfig {
                thai: vec![FontCandidate::new(&font)],
                include_defaults: true,
            },
            ..EditorConfig::default()
        };
        assert_eq!(
            config.font_resolver().resolve("Tahoma", false, false),
            FontChoice::File(font)
        );
    }
}
