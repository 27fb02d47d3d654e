//! Heuristic classifier: typography and geometry rules for one fragment.
//!
//! Rules are evaluated in precedence order and the first full match wins.
//! A fragment that matches nothing is a paragraph at neutral confidence.
//!
//! | # | Condition | Tag | Confidence |
//! |---|-----------|-----|------------|
//! | 1 | image | Figure | 0.9 |
//! | 2 | table ≥ 2×2 (else P, 0.6) | Table | 0.9 |
//! | 3 | text, size ≥ 20, bold, y0 < 200 | H1 | 0.8 |
//! | 4 | text, size ≥ 16, bold | H2 | 0.7 |
//! | 5 | text, size ≥ 14, bold | H3 | 0.6 |
//! | 6 | text, 10 ≤ size ≤ 13, regular, ≥ 5 words | P | 0.7 |
//! | – | otherwise | P | 0.5 |

use crate::fragment::{Fragment, FragmentKind};
use crate::output::Tag;
use crate::pipeline::classify::{Classification, ClassificationSource, SignalOrigin};

/// Only text this close to the top of the page can be a title.
pub const TITLE_ZONE_MAX_Y: f32 = 200.0;

/// Neutral answer when no rule fires.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Classify a single fragment.
///
/// Pure and total: depends only on the fragment itself.
pub fn classify_fragment(fragment: &Fragment) -> Classification {
    match fragment.kind {
        FragmentKind::Image => Classification::new(Tag::Figure, 0.9, SignalOrigin::Rule),
        FragmentKind::Table => {
            let (rows, cols) = fragment.table_shape();
            if rows >= 2 && cols >= 2 {
                Classification::new(Tag::Table, 0.9, SignalOrigin::Rule)
            } else {
                Classification::new(Tag::P, 0.6, SignalOrigin::Rule)
            }
        }
        FragmentKind::Text => classify_text(fragment),
    }
}

fn classify_text(fragment: &Fragment) -> Classification {
    let t = fragment.typography_or_default();
    let y = fragment.bbox.y0;

    let rule = if t.size >= 20.0 && t.bold && y < TITLE_ZONE_MAX_Y {
        Some((Tag::H1, 0.8))
    } else if t.size >= 16.0 && t.bold {
        Some((Tag::H2, 0.7))
    } else if t.size >= 14.0 && t.bold {
        Some((Tag::H3, 0.6))
    } else if (10.0..=13.0).contains(&t.size) && !t.bold && fragment.word_count() >= 5 {
        Some((Tag::P, 0.7))
    } else {
        None
    };

    match rule {
        Some((tag, score)) => Classification::new(tag, f32::min(score, 1.0), SignalOrigin::Rule),
        None => Classification::new(Tag::P, DEFAULT_CONFIDENCE, SignalOrigin::Default),
    }
}

/// [`ClassificationSource`] applying [`classify_fragment`] to every fragment.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicClassifier {
    enabled: bool,
}

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    /// A classifier that abstains: every fragment gets (P, 0.5).
    pub fn disabled() -> Self {
        Self { enabled: false }
    }
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassificationSource for HeuristicClassifier {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn classify(&self, fragments: &[Fragment]) -> Vec<Classification> {
        if !self.enabled {
            return fragments
                .iter()
                .map(|_| Classification::new(Tag::P, DEFAULT_CONFIDENCE, SignalOrigin::Default))
                .collect();
        }
        fragments.iter().map(classify_fragment).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::BBox;

    fn text(size: f32, bold: bool, y: f32, content: &str) -> Fragment {
        Fragment::text("t", 0, BBox::new(50.0, y, 500.0, y + size), content, size, bold)
    }

    #[test]
    fn large_bold_title_near_top_is_h1() {
        let c = classify_fragment(&text(24.0, true, 50.0, "Annual Report"));
        assert_eq!(c.tag, Tag::H1);
        assert_eq!(c.confidence, 0.8);
        assert_eq!(c.origin, SignalOrigin::Rule);
    }

    #[test]
    fn large_bold_text_low_on_page_falls_to_h2() {
        let c = classify_fragment(&text(24.0, true, 400.0, "Section"));
        assert_eq!(c.tag, Tag::H2);
        assert_eq!(c.confidence, 0.7);
    }

    #[test]
    fn medium_bold_text_is_h3() {
        let c = classify_fragment(&text(14.0, true, 300.0, "Subsection"));
        assert_eq!((c.tag, c.confidence), (Tag::H3, 0.6));
    }

    #[test]
    fn body_text_with_enough_words_is_paragraph() {
        let c = classify_fragment(&text(11.0, false, 300.0, "one two three four five"));
        assert_eq!((c.tag, c.confidence), (Tag::P, 0.7));
    }

    #[test]
    fn short_body_text_gets_default() {
        let c = classify_fragment(&text(11.0, false, 300.0, "too short"));
        assert_eq!((c.tag, c.confidence), (Tag::P, 0.5));
        assert_eq!(c.origin, SignalOrigin::Default);
    }

    #[test]
    fn non_bold_large_text_gets_default() {
        let c = classify_fragment(&text(22.0, false, 10.0, "Big but regular weight text"));
        assert_eq!((c.tag, c.confidence), (Tag::P, 0.5));
    }

    #[test]
    fn image_is_figure() {
        let c = classify_fragment(&Fragment::image("i", 0, BBox::default(), 7, 0));
        assert_eq!((c.tag, c.confidence), (Tag::Figure, 0.9));
    }

    #[test]
    fn table_needs_two_by_two() {
        let grid = Fragment::table(
            "t",
            0,
            BBox::default(),
            vec![vec!["a".into(), "b".into()], vec!["1".into(), "2".into()]],
        );
        assert_eq!(classify_fragment(&grid).tag, Tag::Table);

        let single_col = Fragment::table("t", 0, BBox::default(), vec![vec!["a".into()], vec!["1".into()]]);
        let c = classify_fragment(&single_col);
        assert_eq!((c.tag, c.confidence), (Tag::P, 0.6));
    }

    #[test]
    fn confidence_bounded_and_deterministic_over_sweep() {
        for size in [0.0, 8.0, 10.0, 12.5, 13.0, 14.0, 16.0, 19.9, 20.0, 48.0] {
            for bold in [false, true] {
                for y in [0.0, 199.0, 200.0, 700.0] {
                    let f = text(size, bold, y, "a b c d e f");
                    let a = classify_fragment(&f);
                    let b = classify_fragment(&f);
                    assert_eq!(a, b);
                    assert!((0.0..=1.0).contains(&a.confidence));
                }
            }
        }
    }

    #[test]
    fn disabled_classifier_abstains() {
        let fragments = vec![text(24.0, true, 10.0, "Title"), Fragment::image("i", 0, BBox::default(), 1, 0)];
        let out = HeuristicClassifier::disabled().classify(&fragments);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| c.tag == Tag::P && c.confidence == 0.5));
    }
}
