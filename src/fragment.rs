//! Input contract from the extraction collaborator.
//!
//! A [`Fragment`] is one extracted content unit (a text block, an image, or
//! a table) with its page, geometry, and, for text, typography. Fragments
//! are produced elsewhere and only ever *read* here; the tagging pipeline
//! never mutates them.
//!
//! Coordinates follow the extraction convention: `y` grows downwards from the
//! top of the page, so "above" means a smaller `y0`.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box `(x0, y0, x1, y1)` in page units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

/// What kind of content a fragment carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Text,
    Image,
    Table,
}

/// Raw fragment content: running text, or a table's cell matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FragmentContent {
    Text(String),
    Cells(Vec<Vec<String>>),
}

impl Default for FragmentContent {
    fn default() -> Self {
        FragmentContent::Text(String::new())
    }
}

/// Font metadata for text fragments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Typography {
    pub size: f32,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub font: String,
}

impl Default for Typography {
    /// The extraction default when a block carries no span information.
    fn default() -> Self {
        Self {
            size: 11.0,
            bold: false,
            font: String::new(),
        }
    }
}

/// Handle used to fetch an image's binary payload from the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    /// PDF object number of the image XObject.
    pub xref: u32,
    /// Position of the image in its page's image list.
    pub image_index: usize,
}

impl ImageRef {
    /// Identity of the physical image, shared by every placement of it.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.xref, self.image_index)
    }
}

/// One extracted content unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Stable identifier, e.g. `element_12`.
    pub id: String,
    /// 0-indexed page number.
    pub page: usize,
    pub bbox: BBox,
    pub kind: FragmentKind,
    #[serde(default)]
    pub content: FragmentContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typography: Option<Typography>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
}

impl Fragment {
    /// A text fragment with the given typography.
    pub fn text(
        id: impl Into<String>,
        page: usize,
        bbox: BBox,
        text: impl Into<String>,
        size: f32,
        bold: bool,
    ) -> Self {
        Self {
            id: id.into(),
            page,
            bbox,
            kind: FragmentKind::Text,
            content: FragmentContent::Text(text.into()),
            typography: Some(Typography {
                size,
                bold,
                font: String::new(),
            }),
            image: None,
        }
    }

    /// An image fragment pointing at `xref` / `image_index`.
    pub fn image(id: impl Into<String>, page: usize, bbox: BBox, xref: u32, image_index: usize) -> Self {
        Self {
            id: id.into(),
            page,
            bbox,
            kind: FragmentKind::Image,
            content: FragmentContent::default(),
            typography: None,
            image: Some(ImageRef { xref, image_index }),
        }
    }

    /// A table fragment with the given cell matrix.
    pub fn table(id: impl Into<String>, page: usize, bbox: BBox, cells: Vec<Vec<String>>) -> Self {
        Self {
            id: id.into(),
            page,
            bbox,
            kind: FragmentKind::Table,
            content: FragmentContent::Cells(cells),
            typography: None,
            image: None,
        }
    }

    /// Text content, or an empty string for tables and images.
    pub fn text_content(&self) -> &str {
        match &self.content {
            FragmentContent::Text(s) => s,
            FragmentContent::Cells(_) => "",
        }
    }

    /// Table dimensions as `(rows, columns of the first row)`.
    pub fn table_shape(&self) -> (usize, usize) {
        match &self.content {
            FragmentContent::Cells(rows) => (rows.len(), rows.first().map_or(0, Vec::len)),
            FragmentContent::Text(_) => (0, 0),
        }
    }

    /// Typography, falling back to the extraction default.
    pub fn typography_or_default(&self) -> Typography {
        self.typography.clone().unwrap_or_default()
    }

    pub fn word_count(&self) -> usize {
        self.text_content().split_whitespace().count()
    }
}

/// Document-level metadata reported by the extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Everything the extraction collaborator hands to the tagger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub fragments: Vec<Fragment>,
    #[serde(default)]
    pub page_count: usize,
    #[serde(default)]
    pub info: DocumentInfo,
}
