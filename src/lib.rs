//! # edgequake-pdftag
//!
//! Turn the flat fragment list of an extracted PDF into a validated,
//! internally consistent set of accessibility tags, with Vision Language
//! Model descriptions for every figure.
//!
//! ## Why this crate?
//!
//! Tagging a PDF for screen readers means deciding, for every text block,
//! image and table, what it *is*: a title, a section heading, a paragraph, a
//! figure. Two signals are available and neither is trustworthy alone. Local
//! typography rules see one fragment at a time; a structure-analysis model
//! sees the whole document but is sometimes wrong or missing. This crate
//! fuses both, asks a VLM to describe figures (with retries, a cache and a
//! cost cap), repairs the document-wide structure, and scores the result.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ExtractedDocument (+ HierarchyProposal)
//!  │
//!  ├─ 1. Classify  local rules + advisory proposal, one opinion each
//!  ├─ 2. Fuse      weighted merge, proposal wins disagreements
//!  ├─ 3. Describe  VLM alt text for Figures (retry/backoff, cache, cap)
//!  ├─ 4. Correct   exactly one H1, alt text on every Figure
//!  └─ 5. Output    DocumentTagSet + diagnostics
//!        │
//!        └─ Score  AccessibilityValidator → ScoreReport
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdftag::{tag_document, DirectoryPayloads, ExtractedDocument, TaggerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let document: ExtractedDocument =
//!         serde_json::from_str(&std::fs::read_to_string("document.json")?)?;
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = TaggerConfig::default();
//!     let images = DirectoryPayloads::new("images/");
//!     let output = tag_document(&document, None, &images, &config).await?;
//!     for el in &output.tag_set.tagged_elements {
//!         println!("{} → {} ({:.2})", el.id, el.tag, el.confidence);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdftag` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-pdftag = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod error;
pub mod fragment;
pub mod mapping;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod scoring;
pub mod service;
pub mod tagger;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancellationFlag;
pub use config::{AltTextConfig, ConfigFile, TaggerConfig, TaggerConfigBuilder, ValidatorConfig};
pub use error::{AutotagError, DescribeError};
pub use fragment::{BBox, DocumentInfo, ExtractedDocument, Fragment, FragmentContent, FragmentKind, ImageRef, Typography};
pub use mapping::{
    archive_mapping, build_summary_report, compute_mapping_diff, mapping_entries, read_mapping_json,
    write_mapping_diff, write_mapping_json, MappingDiff, MappingEntry, SummaryReport,
};
pub use output::{
    DescriptionRecord, DocumentTagSet, Tag, TagAssignment, TagAttributes, TagSetMetadata, TaggingOutput,
    TaggingStats,
};
pub use pipeline::correct::CorrectionNote;
pub use pipeline::describe::{DescriptionSource, FallbackReason};
pub use pipeline::hierarchy::{HierarchyProposal, ProposalEntry};
pub use progress::{NoopProgressCallback, ProgressCallback, TaggingProgressCallback};
pub use scoring::{ai_friendliness_score, AccessibilityValidator, ArtifactFacts, PageText, ScoreReport};
pub use service::{
    DescriptionRequest, DescriptionService, DirectoryPayloads, ImagePayload, ImagePayloadSource,
    LlmDescriptionService, NoImagePayloads,
};
pub use tagger::{tag_document, tag_document_sync};
