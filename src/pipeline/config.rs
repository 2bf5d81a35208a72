//! Parameter structs for the pipeline stages.
//!
//! Every stage owns one serde-deserializable configuration struct.
//! Enum-valued parameters are Rust enums, so out-of-enum values already
//! fail at deserialization; `validate` covers the remaining range checks
//! and runs once at stage start, before any node is processed.

use serde::{Deserialize, Serialize};

use crate::core::config::{ConfigError, ConfigValidator};
use crate::domain::level::Level;

/// Hierarchy levels the deskew stage may operate on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeskewLevel {
    #[default]
    Page,
    Region,
}

/// Hierarchy levels the binarize stage may operate on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinarizeLevel {
    #[default]
    Region,
    Line,
}

impl BinarizeLevel {
    pub fn as_level(&self) -> Level {
        match self {
            BinarizeLevel::Region => Level::Region,
            BinarizeLevel::Line => Level::Line,
        }
    }
}

/// The deepest hierarchy level the recognize stage annotates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEquivLevel {
    Region,
    Line,
    #[default]
    Word,
    Glyph,
}

impl TextEquivLevel {
    pub fn as_level(&self) -> Level {
        match self {
            TextEquivLevel::Region => Level::Region,
            TextEquivLevel::Line => Level::Line,
            TextEquivLevel::Word => Level::Word,
            TextEquivLevel::Glyph => Level::Glyph,
        }
    }
}

/// Configuration for the deskew stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskewConfig {
    /// Level whose nodes are deskewed.
    pub operation_level: DeskewLevel,
    /// Minimum engine confidence required to apply an orientation
    /// correction. The skew angle is recorded regardless.
    pub min_orientation_confidence: f32,
    /// DPI override; negative means "use image metadata".
    pub dpi: f32,
}

impl Default for DeskewConfig {
    fn default() -> Self {
        Self {
            operation_level: DeskewLevel::Page,
            min_orientation_confidence: 1.5,
            dpi: -1.0,
        }
    }
}

impl ConfigValidator for DeskewConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_confidence_threshold(self.min_orientation_confidence)?;
        self.validate_dpi(self.dpi)
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Configuration for the crop stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    /// Pixels added on every side of the detected border.
    pub padding: u32,
    /// DPI override; negative means "use image metadata".
    pub dpi: f32,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            padding: 4,
            dpi: -1.0,
        }
    }
}

impl ConfigValidator for CropConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_padding(self.padding)?;
        self.validate_dpi(self.dpi)
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Configuration for the binarize stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinarizeConfig {
    /// Level whose node subimages are binarized.
    pub operation_level: BinarizeLevel,
    /// DPI override; negative means "use image metadata".
    pub dpi: f32,
}

impl Default for BinarizeConfig {
    fn default() -> Self {
        Self {
            operation_level: BinarizeLevel::Region,
            dpi: -1.0,
        }
    }
}

impl ConfigValidator for BinarizeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_dpi(self.dpi)
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Configuration for the segment-region stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentRegionConfig {
    /// Replace existing regions instead of skipping segmented pages.
    pub overwrite_regions: bool,
    /// Pixels added around every detected region.
    pub padding: u32,
    /// Keep native detection polygons instead of their envelopes.
    pub crop_polygons: bool,
    /// Also detect table regions.
    pub find_tables: bool,
    /// Restrict detection to isolated single-line text regions.
    pub sparse_text: bool,
}

impl Default for SegmentRegionConfig {
    fn default() -> Self {
        Self {
            overwrite_regions: true,
            padding: 0,
            crop_polygons: false,
            find_tables: true,
            sparse_text: false,
        }
    }
}

impl ConfigValidator for SegmentRegionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_padding(self.padding)
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Configuration for the segment-table stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentTableConfig {
    /// Replace existing cell regions instead of skipping segmented
    /// tables.
    pub overwrite_cells: bool,
}

impl Default for SegmentTableConfig {
    fn default() -> Self {
        Self {
            overwrite_cells: true,
        }
    }
}

impl ConfigValidator for SegmentTableConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Configuration for the segment-line stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentLineConfig {
    /// Replace existing lines instead of skipping segmented regions.
    pub overwrite_lines: bool,
}

impl Default for SegmentLineConfig {
    fn default() -> Self {
        Self {
            overwrite_lines: true,
        }
    }
}

impl ConfigValidator for SegmentLineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Configuration for the segment-word stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentWordConfig {
    /// Replace existing words instead of skipping segmented lines.
    pub overwrite_words: bool,
}

impl Default for SegmentWordConfig {
    fn default() -> Self {
        Self {
            overwrite_words: true,
        }
    }
}

impl ConfigValidator for SegmentWordConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

/// Configuration for the recognize stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizeConfig {
    /// Deepest level that receives text annotations.
    pub textequiv_level: TextEquivLevel,
    /// Recognition model selector passed through to the engine.
    pub model: Option<String>,
    /// Restrict the hypothesis alphabet to exactly these characters.
    pub char_whitelist: Option<String>,
    /// Remove these characters from the hypothesis alphabet.
    pub char_blacklist: Option<String>,
    /// Re-allow these characters even when blacklisted.
    pub char_unblacklist: Option<String>,
    /// Recognize every line image as a single unit and forbid any
    /// additional segmentation.
    pub raw_lines: bool,
    /// Clear existing word and glyph structure before recognition.
    pub overwrite_words: bool,
    /// DPI override; negative means "use image metadata".
    pub dpi: f32,
}

impl Default for RecognizeConfig {
    fn default() -> Self {
        Self {
            textequiv_level: TextEquivLevel::Word,
            model: None,
            char_whitelist: None,
            char_blacklist: None,
            char_unblacklist: None,
            raw_lines: false,
            overwrite_words: false,
            dpi: -1.0,
        }
    }
}

impl ConfigValidator for RecognizeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.validate_dpi(self.dpi)?;
        if self.raw_lines
            && matches!(
                self.textequiv_level,
                TextEquivLevel::Word | TextEquivLevel::Glyph
            )
        {
            return Err(ConfigError::InvalidConfig {
                message: format!(
                    "raw_lines forbids segmentation below the line level, \
                     but textequiv_level is {:?}",
                    self.textequiv_level
                ),
            });
        }
        Ok(())
    }

    fn get_defaults() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(DeskewConfig::get_defaults().validate().is_ok());
        assert!(CropConfig::get_defaults().validate().is_ok());
        assert!(BinarizeConfig::get_defaults().validate().is_ok());
        assert!(SegmentRegionConfig::get_defaults().validate().is_ok());
        assert!(SegmentTableConfig::get_defaults().validate().is_ok());
        assert!(SegmentLineConfig::get_defaults().validate().is_ok());
        assert!(SegmentWordConfig::get_defaults().validate().is_ok());
        assert!(RecognizeConfig::get_defaults().validate().is_ok());
    }

    #[test]
    fn test_out_of_enum_level_fails_deserialization() {
        let result = serde_json::from_str::<DeskewConfig>(r#"{"operation_level": "line"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_confidence_rejected() {
        let config = DeskewConfig {
            min_orientation_confidence: -2.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_raw_lines_below_line_level_rejected() {
        let config = RecognizeConfig {
            raw_lines: true,
            textequiv_level: TextEquivLevel::Glyph,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RecognizeConfig {
            raw_lines: true,
            textequiv_level: TextEquivLevel::Line,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: RecognizeConfig =
            serde_json::from_str(r#"{"textequiv_level": "glyph", "char_whitelist": "abc"}"#)
                .unwrap();
        assert_eq!(config.textequiv_level, TextEquivLevel::Glyph);
        assert_eq!(config.char_whitelist.as_deref(), Some("abc"));
        assert!(!config.overwrite_words);
    }
}
