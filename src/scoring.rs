//! Accessibility scoring of a tagged artifact.
//!
//! The scoring engine does not open PDFs itself. The generation collaborator
//! reports what it actually persisted as [`ArtifactFacts`]; the
//! [`AccessibilityValidator`] turns those facts into a [`ScoreReport`]
//! starting from 100 points:
//!
//! | Check | Failure | Deduction |
//! |-------|---------|-----------|
//! | Title metadata | issue | −20 |
//! | Language metadata | warning | none |
//! | First-page text selectable | warning (issue if unreadable) | −30 |
//! | Structure tree | issue in strict mode, else warning | −25 |
//! | Reading order | warning | −15 |
//! | Alt text | warning | −10 |
//!
//! Reading order and alt text currently always pass: verifying them needs
//! the full structure tree, which the facts do not carry.
//!
//! An optional external validator (veraPDF) can add findings on top.

use crate::config::ValidatorConfig;
use crate::fragment::{ExtractedDocument, FragmentKind};
use crate::output::DocumentTagSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Below this many chars the first page is treated as image-only.
pub const MIN_SELECTABLE_TEXT_CHARS: usize = 10;

/// Minimum score to pass in strict mode.
pub const STRICT_PASS_SCORE: f64 = 70.0;

/// External-validator detail messages kept per run.
pub const MAX_EXTERNAL_DETAILS: usize = 10;

const TITLE_DEDUCTION: f64 = 20.0;
const TEXT_DEDUCTION: f64 = 30.0;
const STRUCTURE_DEDUCTION: f64 = 25.0;
const READING_ORDER_DEDUCTION: f64 = 15.0;
const ALT_TEXT_DEDUCTION: f64 = 10.0;

// ── Input ────────────────────────────────────────────────────────────────────

/// Text extracted from the artifact's first page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PageText {
    Text(String),
    /// The artifact has no pages.
    NoPages,
    /// Extraction failed; carries the reason.
    Unreadable(String),
}

/// What the generation collaborator persisted into the rewritten file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFacts {
    /// Location of the artifact, needed only by the external validator.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    pub first_page_text: PageText,
    #[serde(default)]
    pub has_structure_tree: bool,
    #[serde(default)]
    pub is_marked: bool,
    #[serde(default)]
    pub page_count: usize,
}

impl ArtifactFacts {
    /// Facts a faithful generator would persist for `tag_set`.
    ///
    /// Lets callers score a tagging result before the PDF is written.
    pub fn expected_for(tag_set: &DocumentTagSet, document: &ExtractedDocument) -> Self {
        let non_blank = |s: &str| (!s.trim().is_empty()).then(|| s.to_string());

        let first_page_text = if document.page_count == 0 {
            PageText::NoPages
        } else {
            let text = document
                .fragments
                .iter()
                .filter(|f| f.page == 0 && f.kind == FragmentKind::Text)
                .map(|f| f.text_content())
                .collect::<Vec<_>>()
                .join("\n");
            PageText::Text(text)
        };
        let tagged = !tag_set.tagged_elements.is_empty();

        Self {
            path: None,
            title: non_blank(&tag_set.metadata.title),
            language: non_blank(&tag_set.metadata.language),
            first_page_text,
            has_structure_tree: tagged,
            is_marked: tagged,
            page_count: document.page_count,
        }
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

/// Result of scoring one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub passed: bool,
    /// 0–100.
    pub score: f64,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    /// Named pass/fail flags: `title_metadata`, `language_metadata`,
    /// `text_selectable`, `structure_tree`, `alt_text`.
    pub compliance: BTreeMap<String, bool>,
    pub page_count: usize,
    pub wcag_level: String,
}

/// Score adjusted for machine readability: structure and metadata matter
/// more to downstream AI consumers than to the base checks. Capped at 100.
pub fn ai_friendliness_score(report: &ScoreReport) -> f64 {
    let flag = |k: &str| report.compliance.get(k).copied().unwrap_or(false);
    let mut score = report.score;
    if flag("structure_tree") {
        score += 10.0;
    }
    if flag("title_metadata") {
        score += 5.0;
    }
    if flag("language_metadata") {
        score += 5.0;
    }
    score.min(100.0)
}

// ── External validator ──────────────────────────────────────────────────────

/// Findings from an external validator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalFindings {
    /// Summary findings; escalated to issues in strict mode.
    pub issues: Vec<String>,
    /// Individual violation messages; always warnings.
    pub details: Vec<String>,
}

/// A third-party conformance checker run against the artifact file.
pub trait ExternalValidator: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, path: &Path) -> ExternalFindings;
}

/// veraPDF command-line validator (`verapdf --format json <file>`).
#[derive(Debug, Clone)]
pub struct VeraPdf {
    program: PathBuf,
}

impl VeraPdf {
    /// Use a specific executable instead of `verapdf` from `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for VeraPdf {
    fn default() -> Self {
        Self::with_program("verapdf")
    }
}

impl ExternalValidator for VeraPdf {
    fn name(&self) -> &str {
        "verapdf"
    }

    fn run(&self, path: &Path) -> ExternalFindings {
        let mut findings = ExternalFindings::default();
        let output = match Command::new(&self.program)
            .args(["--format", "json"])
            .arg(path)
            .output()
        {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                findings
                    .issues
                    .push("veraPDF executable not found (install veraPDF)".to_string());
                return findings;
            }
            Err(e) => {
                findings.issues.push(format!("veraPDF failed to start: {e}"));
                return findings;
            }
        };

        if !output.status.success() {
            findings
                .issues
                .push(format!("veraPDF exited abnormally ({})", output.status));
            return findings;
        }

        match parse_verapdf_report(&String::from_utf8_lossy(&output.stdout)) {
            Ok(violations) => {
                if !violations.is_empty() {
                    findings
                        .issues
                        .push(format!("veraPDF reported {} violation(s)", violations.len()));
                    findings.details = violations.into_iter().take(MAX_EXTERNAL_DETAILS).collect();
                }
            }
            Err(e) => findings
                .issues
                .push(format!("veraPDF output could not be parsed: {e}")),
        }
        findings
    }
}

/// Violation messages from veraPDF's JSON report. Empty output is a clean
/// report.
pub fn parse_verapdf_report(stdout: &str) -> Result<Vec<String>, serde_json::Error> {
    let stdout = stdout.trim();
    if stdout.is_empty() {
        return Ok(Vec::new());
    }
    let report: Value = serde_json::from_str(stdout)?;
    let messages = report
        .pointer("/validationResult/details")
        .and_then(Value::as_array)
        .map(|details| {
            details
                .iter()
                .map(|d| {
                    d.get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("no validation message")
                        .to_string()
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(messages)
}

// ── Validator ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct CheckResult {
    passed: bool,
    issues: Vec<String>,
    warnings: Vec<String>,
}

impl CheckResult {
    fn pass() -> Self {
        Self {
            passed: true,
            ..Default::default()
        }
    }
}

/// Scores artifacts against the configured WCAG level.
pub struct AccessibilityValidator {
    config: ValidatorConfig,
    external: Option<Box<dyn ExternalValidator>>,
}

impl AccessibilityValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            external: None,
        }
    }

    /// Use `validator` instead of resolving `external_tool` by name.
    pub fn with_external(mut self, validator: Box<dyn ExternalValidator>) -> Self {
        self.external = Some(validator);
        self
    }

    pub fn validate(&self, facts: &ArtifactFacts) -> ScoreReport {
        info!(
            "Scoring artifact ({} pages, WCAG {})",
            facts.page_count, self.config.wcag_level
        );
        let strict = self.config.strict_mode;
        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        let mut score = 100.0;

        let has_title = facts.title.as_deref().is_some_and(|t| !t.trim().is_empty());
        let has_language = facts.language.as_deref().is_some_and(|l| !l.trim().is_empty());
        if !has_title {
            issues.push("Title metadata missing".to_string());
            score -= TITLE_DEDUCTION;
        }
        if !has_language {
            warnings.push("Language metadata missing".to_string());
        }

        let (text, text_selectable) = check_text(&facts.first_page_text);
        if !text.passed {
            issues.extend(text.issues);
            warnings.extend(text.warnings);
            score -= TEXT_DEDUCTION;
        }

        let structure = check_structure(facts);
        if !structure.passed {
            if strict {
                issues.extend(structure.issues);
            } else {
                warnings.extend(structure.issues);
            }
            score -= STRUCTURE_DEDUCTION;
        }

        let reading_order = check_reading_order(facts);
        if !reading_order.passed {
            warnings.extend(reading_order.issues);
            score -= READING_ORDER_DEDUCTION;
        }

        let alt_text = check_alt_text(facts);
        if !alt_text.passed {
            warnings.extend(alt_text.issues);
            score -= ALT_TEXT_DEDUCTION;
        }

        let external = self.run_external(facts);
        if strict {
            issues.extend(external.issues);
        } else {
            warnings.extend(external.issues);
        }
        warnings.extend(external.details);

        let score = f64::max(score, 0.0);
        let passed = issues.is_empty() && (score >= STRICT_PASS_SCORE || !strict);

        let compliance = BTreeMap::from([
            ("title_metadata".to_string(), has_title),
            ("language_metadata".to_string(), has_language),
            ("text_selectable".to_string(), text_selectable),
            ("structure_tree".to_string(), facts.has_structure_tree),
            ("alt_text".to_string(), alt_text.passed),
        ]);

        if passed {
            info!("Accessibility check passed (score {:.1})", score);
        } else {
            warn!(
                "Accessibility check failed (score {:.1}, {} issue(s))",
                score,
                issues.len()
            );
        }

        ScoreReport {
            passed,
            score,
            issues,
            warnings,
            compliance,
            page_count: facts.page_count,
            wcag_level: self.config.wcag_level.clone(),
        }
    }

    fn run_external(&self, facts: &ArtifactFacts) -> ExternalFindings {
        let tool = self
            .config
            .external_tool
            .as_deref()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty());
        if tool.is_none() && self.external.is_none() {
            return ExternalFindings::default();
        }

        let resolved: Box<dyn ExternalValidator>;
        let validator: &dyn ExternalValidator = match (&self.external, tool.as_deref()) {
            (Some(v), _) => v.as_ref(),
            (None, Some("verapdf")) => {
                resolved = Box::new(VeraPdf::default());
                resolved.as_ref()
            }
            (None, Some(other)) => {
                return ExternalFindings {
                    issues: vec![format!("Unsupported external validator: {other}")],
                    details: Vec::new(),
                };
            }
            (None, None) => return ExternalFindings::default(),
        };

        let Some(path) = facts.path.as_deref() else {
            return ExternalFindings {
                issues: vec![format!(
                    "{} requires the artifact path, none was given",
                    validator.name()
                )],
                details: Vec::new(),
            };
        };
        debug!("Running external validator {} on {}", validator.name(), path.display());
        validator.run(path)
    }
}

/// Returns the check plus the `text_selectable` flag.
fn check_text(text: &PageText) -> (CheckResult, bool) {
    match text {
        PageText::NoPages => (CheckResult::pass(), false),
        PageText::Text(t) if t.trim().chars().count() >= MIN_SELECTABLE_TEXT_CHARS => {
            (CheckResult::pass(), true)
        }
        PageText::Text(_) => (
            CheckResult {
                passed: false,
                warnings: vec![
                    "First page has little or no extractable text (possibly image-only)".to_string(),
                ],
                ..Default::default()
            },
            false,
        ),
        PageText::Unreadable(reason) => (
            CheckResult {
                passed: false,
                issues: vec![format!("Text extraction failed: {reason}")],
                ..Default::default()
            },
            false,
        ),
    }
}

fn check_structure(facts: &ArtifactFacts) -> CheckResult {
    if facts.has_structure_tree {
        return CheckResult::pass();
    }
    let mut issues = vec!["Structure tree (StructTreeRoot) missing".to_string()];
    if !facts.is_marked {
        issues.push("Marked-content flag missing".to_string());
    }
    CheckResult {
        passed: false,
        issues,
        ..Default::default()
    }
}

fn check_reading_order(_facts: &ArtifactFacts) -> CheckResult {
    CheckResult::pass()
}

fn check_alt_text(_facts: &ArtifactFacts) -> CheckResult {
    CheckResult::pass()
}
