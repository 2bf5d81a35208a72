//! Hierarchy levels of the document annotation tree.

use serde::{Deserialize, Serialize};

/// The rank of a node in the page annotation hierarchy.
///
/// Levels are ordered from coarse to fine; `Page < Region < Line < Word <
/// Glyph`. Stages declare the level they read or write and the overwrite
/// policy prunes subtrees by level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Page,
    Region,
    Line,
    Word,
    Glyph,
}

impl Level {
    /// The canonical lowercase name of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Page => "page",
            Level::Region => "region",
            Level::Line => "line",
            Level::Word => "word",
            Level::Glyph => "glyph",
        }
    }

    /// The next finer level, or None for Glyph.
    pub fn finer(&self) -> Option<Level> {
        match self {
            Level::Page => Some(Level::Region),
            Level::Region => Some(Level::Line),
            Level::Line => Some(Level::Word),
            Level::Word => Some(Level::Glyph),
            Level::Glyph => None,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Page < Level::Region);
        assert!(Level::Region < Level::Line);
        assert!(Level::Line < Level::Word);
        assert!(Level::Word < Level::Glyph);
    }

    #[test]
    fn test_level_serde_names() {
        assert_eq!(serde_json::to_string(&Level::Word).unwrap(), "\"word\"");
        let level: Level = serde_json::from_str("\"region\"").unwrap();
        assert_eq!(level, Level::Region);
        assert!(serde_json::from_str::<Level>("\"paragraph\"").is_err());
    }
}
