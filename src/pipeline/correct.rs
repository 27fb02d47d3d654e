//! Structural consistency corrector.
//!
//! Runs once over the complete assignment list, after fusion and figure
//! description, and enforces the document-wide invariants no single-fragment
//! stage can see:
//!
//! - exactly one H1 (when the document has any heading at all)
//! - every Figure carries non-empty alternative text
//!
//! The input is never mutated; the corrected copy comes back with one
//! [`CorrectionNote`] per rewrite. Running the corrector on its own output
//! changes nothing.

use crate::output::{Tag, TagAssignment};
use crate::pipeline::describe::PLACEHOLDER_DESCRIPTION;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// What the corrector changed and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrectionNote {
    /// No H1 existed; this heading became the document title.
    PromotedToTitle { id: String, from: Tag },
    /// A second (or later) H1 became H2.
    DemotedExtraTitle { id: String },
    /// A Figure had no alternative text; the placeholder was inserted.
    FilledAltText { id: String },
}

impl fmt::Display for CorrectionNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectionNote::PromotedToTitle { id, from } => {
                write!(f, "{id}: promoted {from} to H1 (document had no title)")
            }
            CorrectionNote::DemotedExtraTitle { id } => write!(f, "{id}: demoted extra H1 to H2"),
            CorrectionNote::FilledAltText { id } => write!(f, "{id}: inserted placeholder alt text"),
        }
    }
}

/// Corrected assignments plus the list of rewrites.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub assignments: Vec<TagAssignment>,
    pub notes: Vec<CorrectionNote>,
}

/// Enforce the document-wide invariants on a copy of `assignments`.
pub fn correct(assignments: &[TagAssignment]) -> Correction {
    let mut out = assignments.to_vec();
    let mut notes = Vec::new();

    ensure_single_title(&mut out, &mut notes);
    fill_missing_alt(&mut out, &mut notes);

    for note in &notes {
        warn!("Structure corrected: {}", note);
    }
    debug!("Corrector applied {} rewrite(s)", notes.len());

    Correction {
        assignments: out,
        notes,
    }
}

/// Heading level reserved for the document title.
const TITLE_LEVEL: u8 = 1;

fn ensure_single_title(out: &mut [TagAssignment], notes: &mut Vec<CorrectionNote>) {
    let h1s: Vec<usize> = out
        .iter()
        .enumerate()
        .filter(|(_, a)| a.tag.heading_level() == Some(TITLE_LEVEL))
        .map(|(i, _)| i)
        .collect();

    if h1s.is_empty() {
        // Shallowest heading wins; among equals, the first in document order.
        let candidate = out
            .iter()
            .enumerate()
            .filter(|(_, a)| a.tag.is_heading())
            .min_by_key(|&(i, a)| (a.tag.heading_level(), i));
        if let Some((i, _)) = candidate {
            let from = out[i].tag;
            retag(&mut out[i], Tag::heading(TITLE_LEVEL));
            out[i].attributes.id = Some("title".to_string());
            notes.push(CorrectionNote::PromotedToTitle {
                id: out[i].id.clone(),
                from,
            });
        }
        return;
    }

    for &i in &h1s[1..] {
        retag(&mut out[i], Tag::heading(TITLE_LEVEL + 1));
        out[i].attributes.id = None;
        notes.push(CorrectionNote::DemotedExtraTitle { id: out[i].id.clone() });
    }
}

fn fill_missing_alt(out: &mut [TagAssignment], notes: &mut Vec<CorrectionNote>) {
    for a in out.iter_mut().filter(|a| a.tag == Tag::Figure) {
        if !a.attributes.has_alt() {
            a.attributes.alt = Some(PLACEHOLDER_DESCRIPTION.to_string());
            notes.push(CorrectionNote::FilledAltText { id: a.id.clone() });
        }
    }
}

fn retag(a: &mut TagAssignment, tag: Tag) {
    let level = tag.heading_level().unwrap_or(0);
    a.tag = tag;
    a.level = level;
    a.attributes.level = tag.heading_level();
}
