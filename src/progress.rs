//! Progress-callback trait for tagging events.
//!
//! Inject an [`Arc<dyn TaggingProgressCallback>`] via
//! [`crate::config::TaggerConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through a document. Classification and
//! fusion are instantaneous, so the interesting events are the per-figure
//! description calls, the only stage that talks to the network.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdftag::{DescriptionSource, TaggerConfig, TaggingProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     described: AtomicUsize,
//! }
//!
//! impl TaggingProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, _id: &str, n: usize, total: usize, _source: &DescriptionSource) {
//!         let done = self.described.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("figure {n}/{total} described ({done} so far)");
//!     }
//! }
//!
//! let config = TaggerConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { described: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::describe::DescriptionSource;
use std::sync::Arc;

/// Called by the tagging pipeline as it processes a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync` because
/// several documents may be tagged concurrently with one shared callback.
pub trait TaggingProgressCallback: Send + Sync {
    /// Called once before classification starts.
    ///
    /// # Arguments
    /// * `fragments` — number of fragments in the document
    /// * `figures`   — how many of them are images awaiting description
    fn on_tagging_start(&self, fragments: usize, figures: usize) {
        let _ = (fragments, figures);
    }

    /// Called just before a figure's description is synthesized.
    ///
    /// # Arguments
    /// * `fragment_id` — the image fragment
    /// * `n`           — 1-indexed position among the document's figures
    /// * `total`       — number of figures
    fn on_image_start(&self, fragment_id: &str, n: usize, total: usize) {
        let _ = (fragment_id, n, total);
    }

    /// Called when a figure has a description, however it was obtained.
    fn on_image_complete(&self, fragment_id: &str, n: usize, total: usize, source: &DescriptionSource) {
        let _ = (fragment_id, n, total, source);
    }

    /// Called once after correction, before the output is returned.
    ///
    /// # Arguments
    /// * `fragments`   — number of tag assignments produced
    /// * `corrections` — structural rewrites applied by the corrector
    fn on_tagging_complete(&self, fragments: usize, corrections: usize) {
        let _ = (fragments, corrections);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl TaggingProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TaggerConfig`].
pub type ProgressCallback = Arc<dyn TaggingProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        fallbacks: AtomicUsize,
    }

    impl TaggingProgressCallback for TrackingCallback {
        fn on_image_start(&self, _id: &str, _n: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_image_complete(&self, _id: &str, _n: usize, _total: usize, source: &DescriptionSource) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            if matches!(source, DescriptionSource::Fallback { .. }) {
                self.fallbacks.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn noop_callback_accepts_every_event() {
        let cb = NoopProgressCallback;
        cb.on_tagging_start(3, 1);
        cb.on_image_start("img", 1, 1);
        cb.on_image_complete("img", 1, 1, &DescriptionSource::Cached);
        cb.on_tagging_complete(3, 0);
    }

    #[test]
    fn tracking_callback_through_trait_object() {
        let tracker = Arc::new(TrackingCallback::default());
        let cb: ProgressCallback = tracker.clone();
        cb.on_image_start("a", 1, 2);
        cb.on_image_complete("a", 1, 2, &DescriptionSource::Remote { attempts: 1 });
        cb.on_image_start("b", 2, 2);
        cb.on_image_complete(
            "b",
            2,
            2,
            &DescriptionSource::Fallback {
                reason: crate::pipeline::describe::FallbackReason::PayloadUnavailable,
            },
        );
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.fallbacks.load(Ordering::SeqCst), 1);
    }
}
