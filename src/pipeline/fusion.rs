//! Confidence fusion: merge the local and proposed classifications.
//!
//! The proposal sees the whole document while the heuristic sees a single
//! fragment, so the proposal carries more weight and wins disagreements.
//! Agreement is rewarded with a boost.

use crate::output::Tag;
use crate::pipeline::classify::Classification;
use serde::{Deserialize, Serialize};

pub const RULE_WEIGHT: f32 = 0.3;
pub const PROPOSAL_WEIGHT: f32 = 0.7;
pub const AGREEMENT_BOOST: f32 = 1.2;

/// Final tag and confidence for one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fused {
    pub tag: Tag,
    pub confidence: f32,
}

/// Fuse two classifications of the same fragment. Pure.
pub fn fuse(heuristic: &Classification, proposal: &Classification) -> Fused {
    let weighted = heuristic.confidence * RULE_WEIGHT + proposal.confidence * PROPOSAL_WEIGHT;
    if heuristic.tag == proposal.tag {
        Fused {
            tag: heuristic.tag,
            confidence: (weighted * AGREEMENT_BOOST).min(1.0),
        }
    } else {
        Fused {
            tag: proposal.tag,
            confidence: weighted.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classify::SignalOrigin;

    fn c(tag: Tag, confidence: f32) -> Classification {
        Classification::new(tag, confidence, SignalOrigin::Rule)
    }

    #[test]
    fn agreement_is_boosted() {
        let f = fuse(&c(Tag::H1, 0.8), &c(Tag::H1, 0.8));
        assert_eq!(f.tag, Tag::H1);
        assert!((f.confidence - 0.96).abs() < 1e-6);
    }

    #[test]
    fn agreement_boost_is_capped() {
        let f = fuse(&c(Tag::Figure, 0.9), &c(Tag::Figure, 1.0));
        assert_eq!(f.confidence, 1.0);
    }

    #[test]
    fn disagreement_takes_proposal_without_boost() {
        let f = fuse(&c(Tag::P, 0.7), &c(Tag::H2, 0.8));
        assert_eq!(f.tag, Tag::H2);
        assert!((f.confidence - (0.8 * 0.7 + 0.7 * 0.3)).abs() < 1e-6);
    }

    #[test]
    fn result_always_in_unit_range() {
        let levels = [0.0, 0.25, 0.5, 0.75, 1.0];
        for &h in &levels {
            for &p in &levels {
                for tags in [(Tag::P, Tag::P), (Tag::P, Tag::H3)] {
                    let f = fuse(&c(tags.0, h), &c(tags.1, p));
                    assert!((0.0..=1.0).contains(&f.confidence));
                }
            }
        }
    }
}
