//! Configuration types for fragment tagging and accessibility scoring.
//!
//! All tagging behaviour is controlled through [`TaggerConfig`], built via
//! its [`TaggerConfigBuilder`]. Scoring has its own small
//! [`ValidatorConfig`] because the scoring engine runs on the rewritten
//! artifact, possibly in a different process than the tagger.
//!
//! The plain-data parts ([`AltTextConfig`], [`ValidatorConfig`] and the rule
//! switches) are serde types so a whole [`ConfigFile`] can be loaded from
//! JSON; live handles (provider, description service, progress callback,
//! cancellation flag) are only settable through the builder.

use crate::cancel::CancellationFlag;
use crate::error::AutotagError;
use crate::progress::ProgressCallback;
use crate::service::DescriptionService;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for one tagging run.
///
/// # Example
/// ```rust
/// use edgequake_pdftag::TaggerConfig;
///
/// let config = TaggerConfig::builder()
///     .max_images(5)
///     .max_attempts(2)
///     .default_language("ko-KR")
///     .build()
///     .unwrap();
/// assert_eq!(config.alt_text.max_images, 5);
/// ```
#[derive(Clone)]
pub struct TaggerConfig {
    /// Apply the local typography/geometry rules. Default: true.
    ///
    /// When disabled every fragment gets the neutral heuristic signal
    /// (P, 0.5) and fusion is driven by the hierarchy proposal alone.
    pub enable_rule_matching: bool,

    /// Trust the hierarchy proposal at full weight. Default: true.
    ///
    /// When disabled proposal confidences drop to 0.5, so a disagreeing
    /// heuristic still loses the tag but the fused confidence is lower.
    pub enable_ai_matching: bool,

    /// Confidence assigned to entries taken from an external proposal. Default: 0.8.
    pub proposal_confidence: f32,

    /// Confidence assigned to synthesized fallback entries. Default: 0.8.
    pub fallback_confidence: f32,

    /// Language reported when the extractor found none. Default: "en-US".
    pub default_language: String,

    /// Figure description settings.
    pub alt_text: AltTextConfig,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the environment is consulted.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed description service. Takes precedence over every
    /// provider setting; this is the seam tests and custom backends use.
    pub description_service: Option<Arc<dyn DescriptionService>>,

    /// Receives per-figure progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Cooperative cancellation for the whole run.
    pub cancel: Option<CancellationFlag>,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            enable_rule_matching: true,
            enable_ai_matching: true,
            proposal_confidence: 0.8,
            fallback_confidence: 0.8,
            default_language: "en-US".to_string(),
            alt_text: AltTextConfig::default(),
            provider_name: None,
            provider: None,
            description_service: None,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for TaggerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggerConfig")
            .field("enable_rule_matching", &self.enable_rule_matching)
            .field("enable_ai_matching", &self.enable_ai_matching)
            .field("proposal_confidence", &self.proposal_confidence)
            .field("fallback_confidence", &self.fallback_confidence)
            .field("default_language", &self.default_language)
            .field("alt_text", &self.alt_text)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "description_service",
                &self.description_service.as_ref().map(|_| "<dyn DescriptionService>"),
            )
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl TaggerConfig {
    /// Create a new builder for `TaggerConfig`.
    pub fn builder() -> TaggerConfigBuilder {
        TaggerConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Figure description settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AltTextConfig {
    /// Synthesize descriptions for Figures at all. Default: true.
    pub enabled: bool,

    /// Vision model identifier. If None, the provider default is used.
    pub model: Option<String>,

    /// Maximum tokens per description. Default: 300.
    ///
    /// A one-to-two sentence label needs well under 100 tokens; the
    /// headroom covers models that think aloud before answering.
    pub max_tokens: usize,

    /// Sampling temperature. Default: 0.3.
    pub temperature: f32,

    /// Attempts per image, including the first. Default: 3.
    pub max_attempts: u32,

    /// Exponential backoff base. Default: 1.5.
    ///
    /// After failed attempt `n` (0-based) the synthesizer sleeps
    /// `backoff_unit_ms * backoff_base^n`: 1 s → 1.5 s with the defaults.
    pub backoff_base: f64,

    /// Backoff time unit in milliseconds. Default: 1000.
    pub backoff_unit_ms: u64,

    /// Per-attempt timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Distinct images sent to the remote service per document. Default: 10.
    ///
    /// Bounds the cost of a single document; images past the cap are
    /// described from surrounding text instead.
    pub max_images: usize,

    /// Custom system prompt. If None, uses the built-in accessibility guide.
    pub system_prompt: Option<String>,
}

impl Default for AltTextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: None,
            max_tokens: 300,
            temperature: 0.3,
            max_attempts: 3,
            backoff_base: 1.5,
            backoff_unit_ms: 1000,
            api_timeout_secs: 60,
            max_images: 10,
            system_prompt: None,
        }
    }
}

impl AltTextConfig {
    /// Delay after failed attempt `attempt` (0-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_base.powi(attempt as i32);
        Duration::from_millis((self.backoff_unit_ms as f64 * factor).round() as u64)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`TaggerConfig`].
#[derive(Debug)]
pub struct TaggerConfigBuilder {
    config: TaggerConfig,
}

impl TaggerConfigBuilder {
    pub fn enable_rule_matching(mut self, v: bool) -> Self {
        self.config.enable_rule_matching = v;
        self
    }

    pub fn enable_ai_matching(mut self, v: bool) -> Self {
        self.config.enable_ai_matching = v;
        self
    }

    pub fn proposal_confidence(mut self, c: f32) -> Self {
        self.config.proposal_confidence = c;
        self
    }

    pub fn fallback_confidence(mut self, c: f32) -> Self {
        self.config.fallback_confidence = c;
        self
    }

    pub fn default_language(mut self, lang: impl Into<String>) -> Self {
        self.config.default_language = lang.into();
        self
    }

    pub fn alt_text(mut self, alt_text: AltTextConfig) -> Self {
        self.config.alt_text = alt_text;
        self
    }

    pub fn enable_alt_text(mut self, v: bool) -> Self {
        self.config.alt_text.enabled = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.alt_text.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.alt_text.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.alt_text.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.alt_text.max_attempts = n.max(1);
        self
    }

    pub fn backoff_base(mut self, base: f64) -> Self {
        self.config.alt_text.backoff_base = base;
        self
    }

    pub fn backoff_unit_ms(mut self, ms: u64) -> Self {
        self.config.alt_text.backoff_unit_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.alt_text.api_timeout_secs = secs.max(1);
        self
    }

    pub fn max_images(mut self, n: usize) -> Self {
        self.config.alt_text.max_images = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.alt_text.system_prompt = Some(prompt.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn description_service(mut self, service: Arc<dyn DescriptionService>) -> Self {
        self.config.description_service = Some(service);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel(mut self, flag: CancellationFlag) -> Self {
        self.config.cancel = Some(flag);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TaggerConfig, AutotagError> {
        let c = &self.config;
        for (name, v) in [
            ("proposal_confidence", c.proposal_confidence),
            ("fallback_confidence", c.fallback_confidence),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(AutotagError::InvalidConfig(format!(
                    "{name} must be within 0–1, got {v}"
                )));
            }
        }
        if c.alt_text.max_attempts == 0 {
            return Err(AutotagError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if !c.alt_text.backoff_base.is_finite() || c.alt_text.backoff_base < 1.0 {
            return Err(AutotagError::InvalidConfig(format!(
                "backoff_base must be ≥ 1.0, got {}",
                c.alt_text.backoff_base
            )));
        }
        if c.default_language.trim().is_empty() {
            return Err(AutotagError::InvalidConfig(
                "default_language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Settings for the accessibility scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Escalate structure and external-validator findings to issues and
    /// require a score ≥ 70 to pass. Default: false.
    pub strict_mode: bool,

    /// Target WCAG conformance level, reported for context. Default: "AA".
    pub wcag_level: String,

    /// External validator to run on the artifact (only "verapdf" is known).
    pub external_tool: Option<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            wcag_level: "AA".to_string(),
            external_tool: None,
        }
    }
}

/// Rule switches of [`TaggerConfig`] in serialisable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggerSettings {
    pub enable_rule_matching: bool,
    pub enable_ai_matching: bool,
    pub proposal_confidence: f32,
    pub fallback_confidence: f32,
    pub default_language: String,
}

impl Default for TaggerSettings {
    fn default() -> Self {
        let d = TaggerConfig::default();
        Self {
            enable_rule_matching: d.enable_rule_matching,
            enable_ai_matching: d.enable_ai_matching,
            proposal_confidence: d.proposal_confidence,
            fallback_confidence: d.fallback_confidence,
            default_language: d.default_language,
        }
    }
}

/// On-disk configuration: `{ "tagger": …, "alt_text": …, "validator": … }`.
///
/// Every section and every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub tagger: TaggerSettings,
    pub alt_text: AltTextConfig,
    pub validator: ValidatorConfig,
}

impl ConfigFile {
    /// Seed a builder with the file's values.
    pub fn builder(&self) -> TaggerConfigBuilder {
        TaggerConfig::builder()
            .enable_rule_matching(self.tagger.enable_rule_matching)
            .enable_ai_matching(self.tagger.enable_ai_matching)
            .proposal_confidence(self.tagger.proposal_confidence)
            .fallback_confidence(self.tagger.fallback_confidence)
            .default_language(self.tagger.default_language.clone())
            .alt_text(self.alt_text.clone())
    }
}
