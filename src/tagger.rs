//! Document tagging entry points.
//!
//! [`tag_document`] runs the whole pipeline for one extracted document:
//!
//! 1. classify every fragment twice (local rules, hierarchy proposal)
//! 2. fuse the two signals into one tag and confidence per fragment
//! 3. describe every Figure (remote service, cache, fallback)
//! 4. correct document-wide structure
//! 5. derive the tag-set metadata
//!
//! Every input fragment yields exactly one [`TagAssignment`], in input order.
//! The only fatal outcomes are an empty document and cancellation.

use crate::config::TaggerConfig;
use crate::error::AutotagError;
use crate::fragment::{ExtractedDocument, Fragment, FragmentKind};
use crate::output::{
    DescriptionRecord, DocumentTagSet, Tag, TagAssignment, TagAttributes, TagSetMetadata,
    TaggingOutput, TaggingStats,
};
use crate::pipeline::classify::ClassificationSource;
use crate::pipeline::correct::correct;
use crate::pipeline::describe::{Interrupted, SynthesisStats, Synthesizer};
use crate::pipeline::fusion::fuse;
use crate::pipeline::heuristic::HeuristicClassifier;
use crate::pipeline::hierarchy::{HierarchyProposal, ProposalClassifier};
use crate::service::{DescriptionService, ImagePayloadSource, LlmDescriptionService};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Vision model used when a provider is named without a model.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// Titles longer than this many chars are cut.
pub const MAX_TITLE_CHARS: usize = 200;

/// `document_type` when the proposal does not name one.
pub const DEFAULT_DOCUMENT_TYPE: &str = "document";

/// Tag one extracted document.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `document` — fragments and metadata from the extraction collaborator
/// * `proposal` — optional hierarchy proposal; missing entries fall back to
///   local rules
/// * `images`   — image payload lookup for Figure descriptions
/// * `config`   — tagging configuration
///
/// # Errors
/// - [`AutotagError::EmptyDocument`] when there are no fragments
/// - [`AutotagError::Cancelled`] when `config.cancel` fires; partial output
///   is discarded
///
/// Remote failures, malformed proposals and missing images are never errors.
pub async fn tag_document(
    document: &ExtractedDocument,
    proposal: Option<&HierarchyProposal>,
    images: &dyn ImagePayloadSource,
    config: &TaggerConfig,
) -> Result<TaggingOutput, AutotagError> {
    let start = Instant::now();
    let fragments = &document.fragments;
    let total = fragments.len();
    if total == 0 {
        return Err(AutotagError::EmptyDocument);
    }
    let image_count = fragments
        .iter()
        .filter(|f| f.kind == FragmentKind::Image)
        .count();
    info!("Tagging {} fragments ({} images)", total, image_count);
    if let Some(ref cb) = config.progress_callback {
        cb.on_tagging_start(total, image_count);
    }

    // ── Step 1: Classify ─────────────────────────────────────────────────
    let heuristic = if config.enable_rule_matching {
        HeuristicClassifier::new()
    } else {
        HeuristicClassifier::disabled()
    };
    let proposed = ProposalClassifier::new(proposal)
        .with_confidences(config.proposal_confidence, config.fallback_confidence)
        .enabled(config.enable_ai_matching);
    let local = heuristic.classify(fragments);
    let remote = proposed.classify(fragments);
    debug!(
        "Classified with '{}' and '{}'",
        heuristic.name(),
        proposed.name()
    );

    // ── Step 2: Fuse ─────────────────────────────────────────────────────
    let mut assignments = Vec::with_capacity(total);
    for (i, fragment) in fragments.iter().enumerate() {
        check_cancelled(config, i, total)?;
        let fused = fuse(&local[i], &remote[i]);
        debug!(
            "{}: rule {} ({:.2}), proposal {} ({:.2}) → {} ({:.2})",
            fragment.id,
            local[i].tag,
            local[i].confidence,
            remote[i].tag,
            remote[i].confidence,
            fused.tag,
            fused.confidence
        );
        assignments.push(TagAssignment {
            id: fragment.id.clone(),
            tag: fused.tag,
            level: fused.tag.heading_level().unwrap_or(0),
            attributes: TagAttributes::for_tag(fused.tag),
            confidence: fused.confidence,
            page: fragment.page,
            bbox: fragment.bbox,
        });
    }

    let language = document
        .info
        .language
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(&config.default_language)
        .to_string();

    // ── Step 3: Describe figures ─────────────────────────────────────────
    let mut descriptions = Vec::new();
    let mut synthesis = SynthesisStats::default();
    let service = if config.alt_text.enabled {
        match resolve_description_service(config) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Figure descriptions disabled: {}", e);
                None
            }
        }
    } else {
        debug!("Figure descriptions disabled by configuration");
        None
    };

    if let Some(service) = service {
        let prompt_title = document
            .info
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| derive_title(&assignments, fragments));

        // Image fragments are described whatever tag they fused to; text the
        // proposal called a Figure is left to the corrector.
        let figures: Vec<usize> = fragments
            .iter()
            .enumerate()
            .filter(|(_, f)| f.kind == FragmentKind::Image)
            .map(|(i, _)| i)
            .collect();
        let figure_total = figures.len();
        let mut synth = Synthesizer::new(service, images, &config.alt_text)
            .with_cancel(config.cancel.clone());

        for (n, &i) in figures.iter().enumerate() {
            let fragment = &fragments[i];
            if let Some(ref cb) = config.progress_callback {
                cb.on_image_start(&fragment.id, n + 1, figure_total);
            }
            let description = synth
                .describe(fragment, fragments, &prompt_title, &language)
                .await
                .map_err(|Interrupted| AutotagError::Cancelled { completed: i, total })?;
            if let Some(ref cb) = config.progress_callback {
                cb.on_image_complete(&fragment.id, n + 1, figure_total, &description.source);
            }
            assignments[i].attributes.alt = Some(description.text.clone());
            descriptions.push(DescriptionRecord {
                fragment_id: fragment.id.clone(),
                text: description.text,
                source: description.source,
                last_error: description.last_error,
            });
        }
        synthesis = synth.stats();
    }
    check_cancelled(config, total, total)?;

    // ── Step 4: Correct structure ────────────────────────────────────────
    let correction = correct(&assignments);
    let assignments = correction.assignments;

    // ── Step 5: Metadata and stats ───────────────────────────────────────
    let title = derive_title(&assignments, fragments);
    let document_type = proposal
        .and_then(|p| p.document_type.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_DOCUMENT_TYPE)
        .to_string();
    let tags_used: BTreeSet<Tag> = assignments.iter().map(|a| a.tag).collect();

    let tag_set = DocumentTagSet {
        tagged_elements: assignments,
        metadata: TagSetMetadata {
            title,
            language,
            document_type,
            tags_used,
        },
    };

    let stats = TaggingStats {
        fragments: total,
        figures: tag_set.count(Tag::Figure),
        remote_calls: synthesis.remote_calls,
        cache_hits: synthesis.cache_hits,
        fallbacks: synthesis.fallbacks,
        corrections: correction.notes.len(),
        average_confidence: tag_set.average_confidence(),
        duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        "Tagging complete: {} elements, {} corrections, avg confidence {:.2}, {}ms",
        stats.fragments, stats.corrections, stats.average_confidence, stats.duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_tagging_complete(stats.fragments, stats.corrections);
    }

    Ok(TaggingOutput {
        tag_set,
        corrections: correction.notes,
        descriptions,
        stats,
    })
}

/// Synchronous wrapper around [`tag_document`].
///
/// Creates a temporary tokio runtime internally.
pub fn tag_document_sync(
    document: &ExtractedDocument,
    proposal: Option<&HierarchyProposal>,
    images: &dyn ImagePayloadSource,
    config: &TaggerConfig,
) -> Result<TaggingOutput, AutotagError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AutotagError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(tag_document(document, proposal, images, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn check_cancelled(config: &TaggerConfig, completed: usize, total: usize) -> Result<(), AutotagError> {
    match config.cancel {
        Some(ref flag) if flag.is_cancelled() => {
            warn!("Tagging cancelled after {}/{} fragments", completed, total);
            Err(AutotagError::Cancelled { completed, total })
        }
        _ => Ok(()),
    }
}

/// Content of the H1 fragment, else of the first text fragment.
fn derive_title(assignments: &[TagAssignment], fragments: &[Fragment]) -> String {
    let from_h1 = assignments
        .iter()
        .zip(fragments)
        .find(|(a, _)| a.tag == Tag::H1)
        .map(|(_, f)| f.text_content().trim())
        .filter(|t| !t.is_empty());
    let title = from_h1.or_else(|| {
        fragments
            .iter()
            .filter(|f| f.kind == FragmentKind::Text)
            .map(|f| f.text_content().trim())
            .find(|t| !t.is_empty())
    });
    title
        .map(|t| t.chars().take(MAX_TITLE_CHARS).collect())
        .unwrap_or_default()
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, AutotagError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        AutotagError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the description service, from most-specific to least-specific.
///
/// 1. **Pre-built service** (`config.description_service`), used as-is
/// 2. **Pre-built provider** (`config.provider`)
/// 3. **Named provider + model** (`config.provider_name`,
///    `config.alt_text.model`)
/// 4. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`)
/// 5. **OpenAI key** (`OPENAI_API_KEY`), preferred when several keys exist
/// 6. **Full auto-detection** (`ProviderFactory::from_env`)
pub fn resolve_description_service(
    config: &TaggerConfig,
) -> Result<Arc<dyn DescriptionService>, AutotagError> {
    if let Some(ref service) = config.description_service {
        return Ok(Arc::clone(service));
    }
    resolve_provider(config).map(|p| Arc::new(LlmDescriptionService::new(p)) as Arc<dyn DescriptionService>)
}

fn resolve_provider(config: &TaggerConfig) -> Result<Arc<dyn LLMProvider>, AutotagError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.alt_text.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| AutotagError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::BBox;

    fn text(id: &str, content: &str, size: f32, bold: bool) -> Fragment {
        Fragment::text(id, 0, BBox::new(0.0, 10.0, 100.0, 30.0), content, size, bold)
    }

    fn assign(id: &str, tag: Tag) -> TagAssignment {
        TagAssignment {
            id: id.into(),
            tag,
            level: tag.heading_level().unwrap_or(0),
            attributes: TagAttributes::for_tag(tag),
            confidence: 0.5,
            page: 0,
            bbox: BBox::default(),
        }
    }

    #[test]
    fn title_prefers_h1_then_first_text() {
        let fragments = vec![
            Fragment::image("img", 0, BBox::default(), 1, 0),
            text("a", "Intro paragraph", 11.0, false),
            text("b", "  The Real Title ", 24.0, true),
        ];
        let with_h1 = vec![assign("img", Tag::Figure), assign("a", Tag::P), assign("b", Tag::H1)];
        assert_eq!(derive_title(&with_h1, &fragments), "The Real Title");

        let without = vec![assign("img", Tag::Figure), assign("a", Tag::P), assign("b", Tag::P)];
        assert_eq!(derive_title(&without, &fragments), "Intro paragraph");
    }

    #[test]
    fn title_is_truncated_and_may_be_empty() {
        let long = "x".repeat(300);
        let fragments = vec![text("a", &long, 24.0, true)];
        let title = derive_title(&[assign("a", Tag::H1)], &fragments);
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);

        let images = vec![Fragment::image("i", 0, BBox::default(), 1, 0)];
        assert_eq!(derive_title(&[assign("i", Tag::Figure)], &images), "");
    }

    #[test]
    fn sync_wrapper_reports_empty_document() {
        let config = TaggerConfig::builder().enable_alt_text(false).build().unwrap();
        let err = tag_document_sync(
            &ExtractedDocument::default(),
            None,
            &crate::service::NoImagePayloads,
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, AutotagError::EmptyDocument));
    }
}
