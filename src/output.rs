//! Output types: per-fragment tag assignments and the document tag set.
//!
//! [`DocumentTagSet`] is what the PDF-generation collaborator embeds into the
//! rewritten file; [`TaggingOutput`] wraps it with the diagnostics of the run
//! (corrections made, how each figure got its description, timing).

use crate::error::DescribeError;
use crate::fragment::BBox;
use crate::pipeline::correct::CorrectionNote;
use crate::pipeline::describe::DescriptionSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Semantic role assigned to a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tag {
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    P,
    Table,
    Figure,
}

impl Tag {
    /// `Some(1..=6)` for headings, `None` otherwise.
    pub fn heading_level(self) -> Option<u8> {
        match self {
            Tag::H1 => Some(1),
            Tag::H2 => Some(2),
            Tag::H3 => Some(3),
            Tag::H4 => Some(4),
            Tag::H5 => Some(5),
            Tag::H6 => Some(6),
            Tag::P | Tag::Table | Tag::Figure => None,
        }
    }

    /// Heading tag for `level`; out-of-range levels are clamped to H1..H6.
    pub fn heading(level: u8) -> Tag {
        match level {
            0 | 1 => Tag::H1,
            2 => Tag::H2,
            3 => Tag::H3,
            4 => Tag::H4,
            5 => Tag::H5,
            _ => Tag::H6,
        }
    }

    pub fn is_heading(self) -> bool {
        self.heading_level().is_some()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tag::H1 => "H1",
            Tag::H2 => "H2",
            Tag::H3 => "H3",
            Tag::H4 => "H4",
            Tag::H5 => "H5",
            Tag::H6 => "H6",
            Tag::P => "P",
            Tag::Table => "Table",
            Tag::Figure => "Figure",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a tag string names no known [`Tag`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTag(pub String);

impl fmt::Display for UnknownTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tag '{}'", self.0)
    }
}

impl std::error::Error for UnknownTag {}

impl FromStr for Tag {
    type Err = UnknownTag;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let tag = match t.to_ascii_uppercase().as_str() {
            "H1" => Tag::H1,
            "H2" => Tag::H2,
            "H3" => Tag::H3,
            "H4" => Tag::H4,
            "H5" => Tag::H5,
            "H6" => Tag::H6,
            "P" => Tag::P,
            "TABLE" => Tag::Table,
            "FIGURE" => Tag::Figure,
            _ => return Err(UnknownTag(t.to_string())),
        };
        Ok(tag)
    }
}

/// Attributes attached to a tag in the structure tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
}

impl TagAttributes {
    /// Default attributes for a freshly fused tag.
    ///
    /// Headings carry their level, H1 is anchored as `title`, and Figures
    /// start with an empty `alt` awaiting description.
    pub fn for_tag(tag: Tag) -> Self {
        let mut attrs = TagAttributes {
            level: tag.heading_level(),
            ..Default::default()
        };
        if tag == Tag::H1 {
            attrs.id = Some("title".to_string());
        }
        if tag == Tag::Figure {
            attrs.alt = Some(String::new());
        }
        attrs
    }

    /// True when `alt` is present and not blank.
    pub fn has_alt(&self) -> bool {
        self.alt.as_deref().is_some_and(|a| !a.trim().is_empty())
    }
}

/// Final tag decision for one fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagAssignment {
    /// Fragment identifier this assignment belongs to.
    pub id: String,
    pub tag: Tag,
    /// Heading number for headings, 0 otherwise.
    pub level: u8,
    pub attributes: TagAttributes,
    /// Fused confidence in `[0, 1]`.
    pub confidence: f32,
    pub page: usize,
    pub bbox: BBox,
}

/// Derived document-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagSetMetadata {
    pub title: String,
    pub language: String,
    pub document_type: String,
    pub tags_used: BTreeSet<Tag>,
}

/// Ordered tag assignments for one document plus derived metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentTagSet {
    pub tagged_elements: Vec<TagAssignment>,
    pub metadata: TagSetMetadata,
}

impl DocumentTagSet {
    pub fn count(&self, tag: Tag) -> usize {
        self.tagged_elements.iter().filter(|a| a.tag == tag).count()
    }

    /// Mean fused confidence, or 0.5 for an empty set.
    pub fn average_confidence(&self) -> f32 {
        if self.tagged_elements.is_empty() {
            return 0.5;
        }
        let sum: f32 = self.tagged_elements.iter().map(|a| a.confidence).sum();
        sum / self.tagged_elements.len() as f32
    }

    pub fn get(&self, id: &str) -> Option<&TagAssignment> {
        self.tagged_elements.iter().find(|a| a.id == id)
    }
}

/// How one Figure obtained its description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionRecord {
    pub fragment_id: String,
    pub text: String,
    pub source: DescriptionSource,
    /// Last remote failure, if any attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<DescribeError>,
}

/// Aggregate statistics for a tagging run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaggingStats {
    pub fragments: usize,
    pub figures: usize,
    /// Calls made to the description service, retries included.
    pub remote_calls: usize,
    pub cache_hits: usize,
    pub fallbacks: usize,
    pub corrections: usize,
    pub average_confidence: f32,
    pub duration_ms: u64,
}

/// Result of [`crate::tagger::tag_document`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggingOutput {
    pub tag_set: DocumentTagSet,
    pub corrections: Vec<CorrectionNote>,
    pub descriptions: Vec<DescriptionRecord>,
    pub stats: TaggingStats,
}
