//! Raw hypotheses returned by the external detection engine, plus the
//! character filter handed to recognition calls.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::tree::RegionKind;
use crate::processors::geometry::Geometry;

/// Orientation, skew and script detected on a page or region image.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientationHypothesis {
    /// Clockwise orientation correction in degrees (0, 90, 180 or 270).
    pub orientation_deg: i32,
    /// Residual skew angle in degrees after orientation correction.
    pub skew_deg: f32,
    /// Detected dominant script, when the engine reports one.
    pub script: Option<String>,
    /// Engine-specific orientation confidence; not normalized to [0, 1].
    pub confidence: f32,
}

/// Options for a region detection call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionDetectionOptions {
    /// Restrict detection to isolated single-line text regions, without
    /// paragraph, table or vertical-space grouping.
    pub sparse_text: bool,
    /// Also report table regions.
    pub find_tables: bool,
}

/// One detected layout region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionHypothesis {
    /// Region outline, in coordinates of the image handed to the engine.
    pub geometry: Geometry,
    /// Semantic type of the region.
    pub kind: RegionKind,
}

/// One recognized unit of text.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedSpan {
    /// Span outline relative to the recognized image, when the engine
    /// localizes its output.
    pub geometry: Option<Geometry>,
    /// Recognized text.
    pub text: String,
    /// Recognition confidence in [0, 1].
    pub confidence: f32,
}

/// Character allow/deny filter for recognition.
///
/// Precedence: a whitelist restricts the hypothesis alphabet to exactly
/// its members, regardless of any deny lists; otherwise blacklisted
/// characters are removed unless they also appear in the unblacklist,
/// which wins over the blacklist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CharFilter {
    whitelist: Option<BTreeSet<char>>,
    blacklist: BTreeSet<char>,
    unblacklist: BTreeSet<char>,
}

impl CharFilter {
    /// Builds a filter from the raw stage parameters.
    pub fn new(
        whitelist: Option<&str>,
        blacklist: Option<&str>,
        unblacklist: Option<&str>,
    ) -> Self {
        Self {
            whitelist: whitelist.map(|s| s.chars().collect()),
            blacklist: blacklist.map(|s| s.chars().collect()).unwrap_or_default(),
            unblacklist: unblacklist.map(|s| s.chars().collect()).unwrap_or_default(),
        }
    }

    /// A filter that allows every character.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// True when the filter imposes no restriction at all.
    pub fn is_unrestricted(&self) -> bool {
        self.whitelist.is_none() && self.blacklist.is_empty()
    }

    /// Whether `c` is an admissible recognition hypothesis.
    pub fn allows(&self, c: char) -> bool {
        if let Some(whitelist) = &self.whitelist {
            return whitelist.contains(&c);
        }
        !self.blacklist.contains(&c) || self.unblacklist.contains(&c)
    }

    /// Strips disallowed characters from `text`.
    pub fn filter_text(&self, text: &str) -> String {
        text.chars().filter(|c| self.allows(*c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrestricted_allows_everything() {
        let filter = CharFilter::unrestricted();
        assert!(filter.is_unrestricted());
        assert!(filter.allows('a'));
        assert!(filter.allows('\u{00df}'));
    }

    #[test]
    fn test_blacklist_removes_characters() {
        let filter = CharFilter::new(None, Some("a"), None);
        assert!(!filter.allows('a'));
        assert!(filter.allows('b'));
        assert_eq!(filter.filter_text("abba"), "bb");
    }

    #[test]
    fn test_unblacklist_wins_over_blacklist() {
        let filter = CharFilter::new(None, Some("a"), Some("a"));
        assert!(filter.allows('a'));
    }

    #[test]
    fn test_whitelist_wins_over_blacklist() {
        let filter = CharFilter::new(Some("b"), Some("a"), None);
        assert!(filter.allows('b'));
        assert!(!filter.allows('a'));
        // not whitelisted, even though not blacklisted either
        assert!(!filter.allows('c'));
    }
}
