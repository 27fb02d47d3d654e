//! Hierarchy proposal adapter.
//!
//! A structure-analysis collaborator may send a whole-document proposal of
//! the form
//!
//! ```json
//! {
//!   "document_type": "report",
//!   "hierarchy": { "p0_b0": { "tag": "H1", "level": 1, "parent": null, "children": ["p0_b1"] } },
//!   "reading_order": ["p0_b0", "p0_b1"]
//! }
//! ```
//!
//! The proposal is advisory and untrusted: any part may be missing, entries
//! may name fragments that do not exist, and tags may be misspelt.
//! [`ProposalClassifier`] turns whatever survives into one classification
//! per fragment and fills the gaps with the local rule table.

use crate::fragment::Fragment;
use crate::output::Tag;
use crate::pipeline::classify::{Classification, ClassificationSource, SignalOrigin};
use crate::pipeline::heuristic::{self, DEFAULT_CONFIDENCE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// One proposed node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalEntry {
    /// Tag name as written by the proposer, e.g. `"H2"` or `"Figure"`.
    pub tag: String,
    pub level: u8,
    pub parent: Option<String>,
    pub children: Vec<String>,
}

impl ProposalEntry {
    /// The entry's tag, if it names one we know.
    pub fn parsed_tag(&self) -> Option<Tag> {
        self.tag.parse().ok()
    }
}

/// Whole-document hierarchy proposal keyed by fragment id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyProposal {
    pub document_type: Option<String>,
    pub hierarchy: BTreeMap<String, ProposalEntry>,
    pub reading_order: Vec<String>,
}

impl HierarchyProposal {
    /// Parse leniently. Malformed JSON yields an empty proposal, which
    /// makes the whole document fall back to local rules.
    pub fn from_json_str(s: &str) -> Self {
        match serde_json::from_str::<Value>(s) {
            Ok(v) => Self::from_value(&v),
            Err(e) => {
                warn!("Hierarchy proposal is not valid JSON, using fallback: {}", e);
                Self::default()
            }
        }
    }

    /// Pick out whatever is usable from an arbitrary JSON value.
    ///
    /// Entries that are not objects, or whose fields have the wrong types,
    /// are dropped individually rather than invalidating the whole map.
    pub fn from_value(v: &Value) -> Self {
        let document_type = v
            .get("document_type")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut hierarchy = BTreeMap::new();
        let mut skipped = 0usize;
        if let Some(map) = v.get("hierarchy").and_then(Value::as_object) {
            for (id, raw) in map {
                match serde_json::from_value::<ProposalEntry>(raw.clone()) {
                    Ok(entry) if !entry.tag.trim().is_empty() => {
                        hierarchy.insert(id.clone(), entry);
                    }
                    _ => skipped += 1,
                }
            }
        }
        if skipped > 0 {
            debug!("Skipped {} unusable hierarchy entries", skipped);
        }

        let reading_order = v
            .get("reading_order")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            document_type,
            hierarchy,
            reading_order,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hierarchy.is_empty()
    }

    /// Known tag proposed for `fragment_id`, if any.
    pub fn tag_for(&self, fragment_id: &str) -> Option<Tag> {
        self.hierarchy.get(fragment_id).and_then(ProposalEntry::parsed_tag)
    }
}

/// [`ClassificationSource`] over an optional proposal, with per-fragment
/// fallback to the local rule table.
#[derive(Debug, Clone, Copy)]
pub struct ProposalClassifier<'a> {
    proposal: Option<&'a HierarchyProposal>,
    proposal_confidence: f32,
    fallback_confidence: f32,
    enabled: bool,
}

impl<'a> ProposalClassifier<'a> {
    pub fn new(proposal: Option<&'a HierarchyProposal>) -> Self {
        Self {
            proposal,
            proposal_confidence: 0.8,
            fallback_confidence: 0.8,
            enabled: true,
        }
    }

    pub fn with_confidences(mut self, proposal: f32, fallback: f32) -> Self {
        self.proposal_confidence = proposal;
        self.fallback_confidence = fallback;
        self
    }

    /// Disabled proposals still produce tags, but every confidence drops
    /// to the neutral 0.5.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn confidence(&self, base: f32) -> f32 {
        if self.enabled {
            base
        } else {
            DEFAULT_CONFIDENCE
        }
    }
}

impl ClassificationSource for ProposalClassifier<'_> {
    fn name(&self) -> &'static str {
        "proposal"
    }

    fn classify(&self, fragments: &[Fragment]) -> Vec<Classification> {
        if let Some(p) = self.proposal {
            let known: HashSet<&str> = fragments.iter().map(|f| f.id.as_str()).collect();
            let unknown = p
                .hierarchy
                .keys()
                .filter(|id| !known.contains(id.as_str()))
                .count();
            if unknown > 0 {
                debug!("Hierarchy proposal references {} unknown fragment ids", unknown);
            }
        }

        let mut h1_taken = false;
        let mut fallbacks = 0usize;
        let out: Vec<Classification> = fragments
            .iter()
            .map(|f| {
                if let Some(tag) = self.proposal.and_then(|p| p.tag_for(&f.id)) {
                    h1_taken |= tag == Tag::H1;
                    return Classification::new(
                        tag,
                        self.confidence(self.proposal_confidence),
                        SignalOrigin::Proposal,
                    );
                }

                fallbacks += 1;
                let mut tag = heuristic::classify_fragment(f).tag;
                if tag == Tag::H1 {
                    if h1_taken {
                        tag = Tag::H2;
                    }
                    h1_taken = true;
                }
                Classification::new(
                    tag,
                    self.confidence(self.fallback_confidence),
                    SignalOrigin::Fallback,
                )
            })
            .collect();

        if fallbacks > 0 {
            debug!(
                "Proposal fallback used for {}/{} fragments",
                fallbacks,
                fragments.len()
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::BBox;
    use serde_json::json;

    fn title(id: &str, y: f32) -> Fragment {
        Fragment::text(id, 0, BBox::new(50.0, y, 500.0, y + 24.0), "Big Title", 24.0, true)
    }

    fn body(id: &str) -> Fragment {
        Fragment::text(
            id,
            0,
            BBox::new(50.0, 300.0, 500.0, 312.0),
            "plain body text with several words",
            11.0,
            false,
        )
    }

    #[test]
    fn absent_proposal_falls_back_with_single_h1() {
        let fragments = vec![title("a", 20.0), title("b", 100.0), body("c")];
        let out = ProposalClassifier::new(None).classify(&fragments);

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].tag, Tag::H1);
        assert_eq!(out[1].tag, Tag::H2);
        assert_eq!(out[1].level, 2);
        assert_eq!(out[2].tag, Tag::P);
        assert!(out.iter().all(|c| c.origin == SignalOrigin::Fallback));
        assert!(out.iter().all(|c| c.confidence == 0.8));
    }

    #[test]
    fn external_entries_win_and_gaps_fall_back() {
        let proposal = HierarchyProposal::from_value(&json!({
            "document_type": "report",
            "hierarchy": { "c": { "tag": "h2", "level": 2 } }
        }));
        let fragments = vec![title("a", 20.0), body("c")];
        let out = ProposalClassifier::new(Some(&proposal)).classify(&fragments);

        assert_eq!((out[0].tag, out[0].origin), (Tag::H1, SignalOrigin::Fallback));
        assert_eq!((out[1].tag, out[1].origin), (Tag::H2, SignalOrigin::Proposal));
    }

    #[test]
    fn external_h1_blocks_fallback_h1() {
        let proposal = HierarchyProposal::from_value(&json!({
            "hierarchy": { "b": { "tag": "H1" } }
        }));
        let fragments = vec![title("a", 20.0), title("b", 20.0)];
        let out = ProposalClassifier::new(Some(&proposal)).classify(&fragments);
        // "a" is seen first and takes the fallback H1 slot.
        assert_eq!(out[0].tag, Tag::H1);
        assert_eq!(out[1].tag, Tag::H1);

        let reordered = vec![title("b", 20.0), title("a", 20.0)];
        let out = ProposalClassifier::new(Some(&proposal)).classify(&reordered);
        assert_eq!(out[0].tag, Tag::H1);
        assert_eq!(out[1].tag, Tag::H2);
    }

    #[test]
    fn unknown_tags_and_bad_entries_are_ignored() {
        let proposal = HierarchyProposal::from_value(&json!({
            "hierarchy": {
                "a": { "tag": "Banner" },
                "b": 42,
                "c": { "tag": "P", "level": "high" },
                "ghost": { "tag": "H3" }
            },
            "reading_order": ["a", 7, "b"]
        }));
        assert_eq!(proposal.hierarchy.len(), 2);
        assert!(proposal.tag_for("a").is_none());
        assert_eq!(proposal.tag_for("ghost"), Some(Tag::H3));
        assert_eq!(proposal.reading_order, vec!["a", "b"]);

        let out = ProposalClassifier::new(Some(&proposal)).classify(&[body("a")]);
        assert_eq!(out[0].origin, SignalOrigin::Fallback);
    }

    #[test]
    fn malformed_json_is_an_empty_proposal() {
        let p = HierarchyProposal::from_json_str("{ not json");
        assert!(p.is_empty());
        assert!(p.document_type.is_none());
    }

    #[test]
    fn disabled_drops_confidence_to_neutral() {
        let proposal = HierarchyProposal::from_value(&json!({
            "hierarchy": { "a": { "tag": "P" } }
        }));
        let out = ProposalClassifier::new(Some(&proposal))
            .enabled(false)
            .classify(&[body("a"), body("b")]);
        assert!(out.iter().all(|c| c.confidence == 0.5));
    }

    #[test]
    fn custom_confidences_apply_per_origin() {
        let proposal = HierarchyProposal::from_value(&json!({
            "hierarchy": { "a": { "tag": "P" } }
        }));
        let out = ProposalClassifier::new(Some(&proposal))
            .with_confidences(0.9, 0.4)
            .classify(&[body("a"), body("b")]);
        assert_eq!(out[0].confidence, 0.9);
        assert_eq!(out[1].confidence, 0.4);
    }
}
