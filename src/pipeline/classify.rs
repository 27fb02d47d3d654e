//! The classification-source seam.
//!
//! Local heuristics and the external hierarchy proposal are two competing
//! opinions about the same fragments. Both implement
//! [`ClassificationSource`] so the orchestrator treats them uniformly and
//! [`crate::pipeline::fusion`] never needs to know which is which.

use crate::fragment::Fragment;
use crate::output::Tag;
use serde::{Deserialize, Serialize};

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalOrigin {
    /// A local rule matched.
    Rule,
    /// No rule matched; the neutral default was used.
    Default,
    /// Taken from the external hierarchy proposal.
    Proposal,
    /// Synthesized because the proposal had no usable entry.
    Fallback,
}

/// One source's opinion about one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub tag: Tag,
    /// Nesting level; heading number for headings, 0 otherwise.
    pub level: u8,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    pub origin: SignalOrigin,
}

impl Classification {
    pub fn new(tag: Tag, confidence: f32, origin: SignalOrigin) -> Self {
        Self {
            tag,
            level: tag.heading_level().unwrap_or(0),
            confidence: confidence.clamp(0.0, 1.0),
            origin,
        }
    }
}

/// A producer of per-fragment classifications.
///
/// Implementations must return exactly one [`Classification`] per input
/// fragment, in input order.
pub trait ClassificationSource {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn classify(&self, fragments: &[Fragment]) -> Vec<Classification>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_level_and_clamps_confidence() {
        let c = Classification::new(Tag::H3, 1.4, SignalOrigin::Rule);
        assert_eq!(c.level, 3);
        assert_eq!(c.confidence, 1.0);

        let p = Classification::new(Tag::P, -0.2, SignalOrigin::Default);
        assert_eq!(p.level, 0);
        assert_eq!(p.confidence, 0.0);
    }
}
