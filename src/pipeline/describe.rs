//! Figure description synthesis: the only stage that talks to the network.
//!
//! For each image fragment the [`Synthesizer`] gathers nearby text, loads
//! the image bytes, and asks the [`DescriptionService`] for alternative
//! text. The answer is cleaned by [`crate::pipeline::postprocess`]. When no
//! answer can be had, a deterministic description is built from the
//! surrounding text instead, so every image leaves this stage with
//! *something*.
//!
//! ## Retry Strategy
//!
//! Vision endpoints time out and rate-limit under load. Each attempt is
//! bounded by `api_timeout_secs`; after failed attempt `n` (0-based) the
//! synthesizer waits `backoff_unit_ms * backoff_base^n` before trying again,
//! up to `max_attempts` attempts. With the defaults (3 attempts, 1 s unit,
//! base 1.5) the wait sequence is 1 s → 1.5 s. An empty answer counts as a
//! failure.
//!
//! ## Cost bounds
//!
//! Descriptions are cached by image identity for the lifetime of one
//! synthesizer, so an image repeated on many pages costs one call. An image
//! whose retries ran out is remembered too and is not retried. At most
//! `max_images` images per document are sent to the service; the rest use
//! the fallback directly.

use crate::cancel::CancellationFlag;
use crate::config::AltTextConfig;
use crate::error::DescribeError;
use crate::fragment::{Fragment, FragmentKind};
use crate::pipeline::encode::encode_payload;
use crate::pipeline::postprocess::clean_description;
use crate::prompts::{alt_text_user_prompt, ALT_TEXT_SYSTEM_PROMPT};
use crate::service::{DescriptionRequest, DescriptionService, ImagePayloadSource};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Description used when nothing better is available.
pub const PLACEHOLDER_DESCRIPTION: &str = "Image";

/// Suffix marking a description built from nearby text.
pub const RELATED_IMAGE_SUFFIX: &str = " (related image)";

/// Text fragments collected around an image for the prompt.
pub const MAX_CONTEXT_FRAGMENTS: usize = 5;

/// Context fragments the fallback considers.
const FALLBACK_CANDIDATES: usize = 3;

/// A context fragment must be longer than this to seed a fallback.
const FALLBACK_MIN_CHARS: usize = 10;

/// Chars of context copied into a fallback description.
const FALLBACK_PREFIX_CHARS: usize = 50;

/// Why a Figure got a fallback description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The fragment has no image reference or the bytes could not be loaded.
    PayloadUnavailable,
    /// Every attempt failed.
    RetriesExhausted,
    /// The per-document image cap was reached.
    BudgetExhausted,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FallbackReason::PayloadUnavailable => "image payload unavailable",
            FallbackReason::RetriesExhausted => "retries exhausted",
            FallbackReason::BudgetExhausted => "image budget exhausted",
        };
        f.write_str(s)
    }
}

/// How a description was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DescriptionSource {
    /// Written by the remote service after `attempts` attempts.
    Remote { attempts: u32 },
    /// Reused from an earlier occurrence of the same image.
    Cached,
    /// Built locally from surrounding text.
    Fallback { reason: FallbackReason },
}

/// A finished description.
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    pub text: String,
    pub source: DescriptionSource,
    /// Error of the final failed attempt, when retries were exhausted.
    pub last_error: Option<DescribeError>,
}

impl Description {
    fn fallback(text: String, reason: FallbackReason, last_error: Option<DescribeError>) -> Self {
        Self {
            text,
            source: DescriptionSource::Fallback { reason },
            last_error,
        }
    }
}

/// The run was cancelled while a description was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

/// Counters accumulated over one synthesizer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SynthesisStats {
    /// Service calls made, retries included.
    pub remote_calls: usize,
    pub cache_hits: usize,
    pub fallbacks: usize,
}

/// Result of [`describe_with_retry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome {
    pub result: Result<String, DescribeError>,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// Call `service` until it returns a non-empty answer or attempts run out.
pub async fn describe_with_retry(
    service: &dyn DescriptionService,
    request: &DescriptionRequest,
    config: &AltTextConfig,
) -> RetryOutcome {
    let max_attempts = config.max_attempts.max(1);
    let mut last_err = DescribeError::EmptyResponse;

    for attempt in 0..max_attempts {
        let err = match timeout(config.api_timeout(), service.describe(request)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                return RetryOutcome {
                    result: Ok(text),
                    attempts: attempt + 1,
                };
            }
            Ok(Ok(_)) => DescribeError::EmptyResponse,
            Ok(Err(e)) => e,
            Err(_) => DescribeError::Timeout {
                secs: config.api_timeout_secs,
            },
        };
        warn!(
            "{}: attempt {}/{} failed: {}",
            request.fragment_id,
            attempt + 1,
            max_attempts,
            err
        );
        last_err = err;

        if attempt + 1 < max_attempts {
            let backoff = config.backoff_for(attempt);
            debug!("{}: retrying after {:?}", request.fragment_id, backoff);
            sleep(backoff).await;
        }
    }

    RetryOutcome {
        result: Err(last_err),
        attempts: max_attempts,
    }
}

/// Trimmed text of same-page text fragments around `image`: those above it
/// first, then those below, top to bottom, at most five.
pub fn gather_context(image: &Fragment, fragments: &[Fragment]) -> Vec<String> {
    let mut on_page: Vec<&Fragment> = fragments
        .iter()
        .filter(|f| {
            f.kind == FragmentKind::Text && f.page == image.page && !f.text_content().trim().is_empty()
        })
        .collect();
    on_page.sort_by(|a, b| a.bbox.y0.total_cmp(&b.bbox.y0));

    let y = image.bbox.y0;
    let before = on_page.iter().filter(|f| f.bbox.y0 < y);
    let after = on_page.iter().filter(|f| f.bbox.y0 > y);
    before
        .chain(after)
        .take(MAX_CONTEXT_FRAGMENTS)
        .map(|f| f.text_content().trim().to_string())
        .collect()
}

/// Deterministic description from gathered context.
pub fn fallback_description(context: &[String]) -> String {
    context
        .iter()
        .take(FALLBACK_CANDIDATES)
        .map(|s| s.trim())
        .find(|s| s.chars().count() > FALLBACK_MIN_CHARS)
        .map(|s| {
            let head: String = s.chars().take(FALLBACK_PREFIX_CHARS).collect();
            format!("{head}{RELATED_IMAGE_SUFFIX}")
        })
        .unwrap_or_else(|| PLACEHOLDER_DESCRIPTION.to_string())
}

/// Per-document description synthesizer.
pub struct Synthesizer<'a> {
    service: Arc<dyn DescriptionService>,
    images: &'a dyn ImagePayloadSource,
    config: &'a AltTextConfig,
    cancel: Option<CancellationFlag>,
    cache: HashMap<String, String>,
    failed: HashSet<String>,
    synthesized: usize,
    stats: SynthesisStats,
}

impl<'a> Synthesizer<'a> {
    pub fn new(
        service: Arc<dyn DescriptionService>,
        images: &'a dyn ImagePayloadSource,
        config: &'a AltTextConfig,
    ) -> Self {
        Self {
            service,
            images,
            config,
            cancel: None,
            cache: HashMap::new(),
            failed: HashSet::new(),
            synthesized: 0,
            stats: SynthesisStats::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: Option<CancellationFlag>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stats(&self) -> SynthesisStats {
        self.stats
    }

    /// Describe one image fragment.
    ///
    /// `fragments` is the whole document, used for context. Only
    /// cancellation is an error; every other failure becomes a fallback.
    pub async fn describe(
        &mut self,
        image: &Fragment,
        fragments: &[Fragment],
        title: &str,
        language: &str,
    ) -> Result<Description, Interrupted> {
        if self.cancel.as_ref().is_some_and(CancellationFlag::is_cancelled) {
            return Err(Interrupted);
        }

        let context = gather_context(image, fragments);

        let Some(image_ref) = image.image.as_ref() else {
            return Ok(self.fallback(image, &context, FallbackReason::PayloadUnavailable, None));
        };

        let key = image_ref.cache_key();
        if let Some(text) = self.cache.get(&key) {
            debug!("{}: description cache hit for image {}", image.id, key);
            self.stats.cache_hits += 1;
            return Ok(Description {
                text: text.clone(),
                source: DescriptionSource::Cached,
                last_error: None,
            });
        }

        if self.failed.contains(&key) {
            debug!("{}: image {} already failed, not retrying", image.id, key);
            return Ok(self.fallback(image, &context, FallbackReason::RetriesExhausted, None));
        }

        if self.synthesized >= self.config.max_images {
            return Ok(self.fallback(image, &context, FallbackReason::BudgetExhausted, None));
        }

        let Some(payload) = self.images.load(image.page, image_ref.image_index) else {
            return Ok(self.fallback(image, &context, FallbackReason::PayloadUnavailable, None));
        };

        let request = DescriptionRequest {
            fragment_id: image.id.clone(),
            system_prompt: self
                .config
                .system_prompt
                .clone()
                .unwrap_or_else(|| ALT_TEXT_SYSTEM_PROMPT.to_string()),
            prompt: alt_text_user_prompt(title, language, &context),
            image: encode_payload(&payload),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        self.synthesized += 1;

        let work = describe_with_retry(self.service.as_ref(), &request, self.config);
        let outcome = match &self.cancel {
            Some(flag) => tokio::select! {
                biased;
                _ = flag.cancelled() => return Err(Interrupted),
                outcome = work => outcome,
            },
            None => work.await,
        };
        self.stats.remote_calls += outcome.attempts as usize;

        match outcome.result {
            Ok(raw) => {
                let text = clean_description(&raw);
                debug!("{}: described in {} attempt(s)", image.id, outcome.attempts);
                self.cache.insert(key, text.clone());
                Ok(Description {
                    text,
                    source: DescriptionSource::Remote {
                        attempts: outcome.attempts,
                    },
                    last_error: None,
                })
            }
            Err(e) => {
                self.failed.insert(key);
                Ok(self.fallback(image, &context, FallbackReason::RetriesExhausted, Some(e)))
            }
        }
    }

    fn fallback(
        &mut self,
        image: &Fragment,
        context: &[String],
        reason: FallbackReason,
        last_error: Option<DescribeError>,
    ) -> Description {
        warn!("{}: using fallback description ({})", image.id, reason);
        self.stats.fallbacks += 1;
        Description::fallback(fallback_description(context), reason, last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::BBox;
    use crate::service::{ImagePayload, NoImagePayloads};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, DescribeError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, DescribeError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DescriptionService for Scripted {
        async fn describe(&self, _request: &DescriptionRequest) -> Result<String, DescribeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(DescribeError::EmptyResponse))
        }
    }

    struct Hanging;

    #[async_trait]
    impl DescriptionService for Hanging {
        async fn describe(&self, _request: &DescriptionRequest) -> Result<String, DescribeError> {
            sleep(Duration::from_secs(30)).await;
            Ok("never".into())
        }
    }

    struct AnyImage;

    impl ImagePayloadSource for AnyImage {
        fn load(&self, _page: usize, _image_index: usize) -> Option<ImagePayload> {
            Some(ImagePayload {
                bytes: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
            })
        }
    }

    fn fast() -> AltTextConfig {
        AltTextConfig {
            backoff_unit_ms: 1,
            ..Default::default()
        }
    }

    fn text(id: &str, page: usize, y: f32, content: &str) -> Fragment {
        Fragment::text(id, page, BBox::new(0.0, y, 100.0, y + 10.0), content, 11.0, false)
    }

    fn image(id: &str, y: f32, xref: u32) -> Fragment {
        Fragment::image(id, 0, BBox::new(0.0, y, 100.0, y + 50.0), xref, 0)
    }

    #[test]
    fn context_is_before_then_after_capped_at_five() {
        let img = image("img", 300.0, 1);
        let fragments = vec![
            text("a3", 0, 500.0, "after two"),
            text("b1", 0, 100.0, "before one"),
            text("x", 1, 100.0, "other page"),
            text("blank", 0, 150.0, "   "),
            text("b2", 0, 200.0, "before two"),
            text("a1", 0, 350.0, "after one"),
            text("same", 0, 300.0, "same height"),
            text("a4", 0, 600.0, "after three"),
            text("a5", 0, 700.0, "after four"),
        ];
        let ctx = gather_context(&img, &fragments);
        assert_eq!(
            ctx,
            vec!["before one", "before two", "after one", "after two", "after three"]
        );
    }

    #[test]
    fn fallback_uses_first_substantial_context() {
        let ctx = vec![
            "short".to_string(),
            "Quarterly revenue by region for the fiscal year 2023 and beyond".to_string(),
        ];
        let out = fallback_description(&ctx);
        assert_eq!(
            out,
            "Quarterly revenue by region for the fiscal year 20 (related image)"
        );
    }

    #[test]
    fn fallback_only_considers_first_three() {
        let ctx = vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "this one is long enough but fourth".to_string(),
        ];
        assert_eq!(fallback_description(&ctx), PLACEHOLDER_DESCRIPTION);
        assert_eq!(fallback_description(&[]), PLACEHOLDER_DESCRIPTION);
    }

    #[tokio::test]
    async fn retry_succeeds_on_third_attempt() {
        let service = Scripted::new(vec![
            Err(DescribeError::Api { message: "503".into() }),
            Ok("   ".into()),
            Ok("A bar chart of quarterly revenue".into()),
        ]);
        let config = fast();
        let mut synth = Synthesizer::new(service.clone(), &AnyImage, &config);
        let img = image("img", 100.0, 4);
        let d = synth.describe(&img, &[img.clone()], "Report", "en-US").await.unwrap();

        assert_eq!(d.source, DescriptionSource::Remote { attempts: 3 });
        assert_eq!(d.text, "A bar chart of quarterly revenue");
        assert_eq!(service.calls(), 3);
        assert_eq!(synth.stats().remote_calls, 3);
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_with_last_error() {
        let service = Scripted::new(vec![
            Err(DescribeError::Api { message: "a".into() }),
            Err(DescribeError::Api { message: "b".into() }),
            Err(DescribeError::Api { message: "c".into() }),
        ]);
        let config = fast();
        let mut synth = Synthesizer::new(service.clone(), &AnyImage, &config);
        let img = image("img", 100.0, 4);
        let d = synth.describe(&img, &[img.clone()], "", "en-US").await.unwrap();

        assert_eq!(
            d.source,
            DescriptionSource::Fallback {
                reason: FallbackReason::RetriesExhausted
            }
        );
        assert_eq!(d.text, PLACEHOLDER_DESCRIPTION);
        assert_eq!(d.last_error, Some(DescribeError::Api { message: "c".into() }));
        assert_eq!(service.calls(), 3);
    }

    #[tokio::test]
    async fn repeated_image_hits_cache() {
        let service = Scripted::new(vec![Ok("Company logo with a blue wave".into())]);
        let config = fast();
        let mut synth = Synthesizer::new(service.clone(), &AnyImage, &config);
        let a = image("a", 100.0, 9);
        let b = Fragment::image("b", 3, BBox::default(), 9, 0);

        let first = synth.describe(&a, &[], "", "en").await.unwrap();
        let second = synth.describe(&b, &[], "", "en").await.unwrap();
        assert_eq!(second.source, DescriptionSource::Cached);
        assert_eq!(second.text, first.text);
        assert_eq!(service.calls(), 1);
        assert_eq!(synth.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn failed_image_is_not_sent_again() {
        let service = Scripted::new(vec![]);
        let config = AltTextConfig {
            max_images: 1,
            ..fast()
        };
        let mut synth = Synthesizer::new(service.clone(), &AnyImage, &config);
        let a = image("a", 100.0, 7);
        let b = Fragment::image("b", 1, BBox::new(0.0, 300.0, 100.0, 350.0), 7, 0);
        let caption = text("c", 1, 200.0, "Figure 4: Regional sales breakdown");

        let first = synth.describe(&a, &[], "", "en").await.unwrap();
        let second = synth.describe(&b, &[caption], "", "en").await.unwrap();
        let retries_exhausted = DescriptionSource::Fallback {
            reason: FallbackReason::RetriesExhausted,
        };
        assert_eq!(first.source, retries_exhausted);
        assert_eq!(second.source, retries_exhausted);
        // Each placement still builds its fallback from its own neighbours.
        assert_eq!(first.text, PLACEHOLDER_DESCRIPTION);
        assert_eq!(second.text, "Figure 4: Regional sales breakdown (related image)");
        assert_eq!(second.last_error, None);
        assert_eq!(service.calls(), 3);
        assert_eq!(synth.stats().remote_calls, 3);
        assert_eq!(synth.stats().fallbacks, 2);
    }

    #[tokio::test]
    async fn missing_payload_skips_service() {
        let service = Scripted::new(vec![]);
        let config = fast();
        let mut synth = Synthesizer::new(service.clone(), &NoImagePayloads, &config);
        let img = image("img", 300.0, 1);
        let ctx = text("c", 0, 100.0, "Figure 2: Network topology overview");
        let d = synth.describe(&img, &[ctx], "", "en").await.unwrap();

        assert_eq!(
            d.source,
            DescriptionSource::Fallback {
                reason: FallbackReason::PayloadUnavailable
            }
        );
        assert_eq!(d.text, "Figure 2: Network topology overview (related image)");
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn budget_caps_distinct_images() {
        let service = Scripted::new(vec![Ok("First chart of the report".into())]);
        let config = AltTextConfig {
            max_images: 1,
            ..fast()
        };
        let mut synth = Synthesizer::new(service.clone(), &AnyImage, &config);

        synth.describe(&image("a", 0.0, 1), &[], "", "en").await.unwrap();
        let d = synth.describe(&image("b", 0.0, 2), &[], "", "en").await.unwrap();
        assert_eq!(
            d.source,
            DescriptionSource::Fallback {
                reason: FallbackReason::BudgetExhausted
            }
        );
        // Cached images stay free after the cap.
        let again = synth.describe(&image("c", 0.0, 1), &[], "", "en").await.unwrap();
        assert_eq!(again.source, DescriptionSource::Cached);
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn attempt_timeout_is_a_failure() {
        let config = AltTextConfig {
            max_attempts: 1,
            api_timeout_secs: 1,
            ..fast()
        };
        let request = DescriptionRequest {
            fragment_id: "img".into(),
            system_prompt: String::new(),
            prompt: String::new(),
            image: crate::pipeline::encode::EncodedImage {
                data: String::new(),
                mime_type: "image/png".into(),
            },
            max_tokens: 10,
            temperature: 0.0,
        };
        let outcome = describe_with_retry(&Hanging, &request, &config).await;
        assert_eq!(outcome.result, Err(DescribeError::Timeout { secs: 1 }));
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn cancel_interrupts_in_flight_call() {
        let flag = CancellationFlag::new();
        let config = fast();
        let mut synth = Synthesizer::new(Arc::new(Hanging), &AnyImage, &config).with_cancel(Some(flag.clone()));

        let canceller = flag.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let img = image("img", 0.0, 1);
        let result = tokio::time::timeout(Duration::from_secs(5), synth.describe(&img, &[], "", "en"))
            .await
            .expect("cancel should end the call");
        assert_eq!(result, Err(Interrupted));
    }
}
