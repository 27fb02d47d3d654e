//! CLI binary for edgequake-pdftag.
//!
//! A thin JSON-in/JSON-out shim over the library crate: maps CLI flags to
//! `TaggerConfig` / `ValidatorConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdftag::{
    ai_friendliness_score, archive_mapping, compute_mapping_diff, mapping_entries,
    read_mapping_json, tag_document, write_mapping_diff, write_mapping_json, AccessibilityValidator,
    ArtifactFacts, CancellationFlag, ConfigFile, DescriptionSource, DirectoryPayloads,
    ExtractedDocument, HierarchyProposal, ImagePayloadSource, NoImagePayloads, ProgressCallback,
    ScoreReport, TaggerConfig, TaggingProgressCallback, ValidatorConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Progress bar over the document's figures; classification is instant so
/// only description calls are worth showing.
struct CliProgressCallback {
    bar: ProgressBar,
    fallbacks: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Tagging");
        bar.set_message("Classifying fragments…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            fallbacks: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} figures  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Describing");
    }
}

impl TaggingProgressCallback for CliProgressCallback {
    fn on_tagging_start(&self, fragments: usize, figures: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Tagging {fragments} fragments ({figures} images)…"))
        ));
        if figures > 0 {
            self.activate_bar(figures);
        }
    }

    fn on_image_start(&self, fragment_id: &str, _n: usize, _total: usize) {
        self.bar.set_message(fragment_id.to_string());
    }

    fn on_image_complete(&self, fragment_id: &str, n: usize, total: usize, source: &DescriptionSource) {
        let (mark, how) = match source {
            DescriptionSource::Remote { attempts } => (green("✓"), format!("remote, {attempts} attempt(s)")),
            DescriptionSource::Cached => (green("✓"), "cached".to_string()),
            DescriptionSource::Fallback { reason } => {
                self.fallbacks.fetch_add(1, Ordering::SeqCst);
                (yellow("↺"), format!("fallback: {reason}"))
            }
        };
        self.bar.println(format!(
            "  {} Figure {:>3}/{:<3}  {:<16}  {}",
            mark,
            n,
            total,
            fragment_id,
            dim(&how),
        ));
        self.bar.inc(1);
    }

    fn on_tagging_complete(&self, fragments: usize, corrections: usize) {
        self.bar.finish_and_clear();
        let fallbacks = self.fallbacks.load(Ordering::SeqCst);
        eprintln!(
            "{} {} elements tagged  {}",
            if fallbacks == 0 { green("✔") } else { cyan("⚠") },
            bold(&fragments.to_string()),
            dim(&format!("{corrections} correction(s), {fallbacks} fallback description(s)")),
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Tag an extracted document (fragments JSON from the extractor)
  pdftag tag report.json -o report.tags.json

  # Use a structure proposal and the extractor's image dump
  pdftag tag report.json --hierarchy report.hierarchy.json --images report_images/

  # Keep mapping history and score the result
  pdftag tag report.json --mapping-dir out/ --score --strict

  # Rules only, no network
  pdftag tag report.json --no-alt-text

  # Compare two mapping snapshots
  pdftag diff out/report_mapping.previous.json out/report_mapping.json

  # Score the facts reported by the PDF writer, with veraPDF
  pdftag score report.facts.json --external-tool verapdf

IMAGE DIRECTORY LAYOUT:
  page{P}_img{I}.png | .jpg | .jpeg   (P = 0-based page, I = image index)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Override log filter (e.g. edgequake_pdftag=debug)
"#;

/// Tag extracted PDF fragments for accessibility and score the result.
#[derive(Parser, Debug)]
#[command(
    name = "pdftag",
    version,
    about = "Tag extracted PDF fragments for accessibility using layout rules and Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFTAG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFTAG_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tag an extracted document.
    Tag(TagArgs),
    /// Diff two mapping files.
    Diff(DiffArgs),
    /// Score an artifact facts file.
    Score(ScoreArgs),
}

#[derive(Args, Debug)]
struct TagArgs {
    /// Extracted document JSON (fragments, page_count, info).
    input: PathBuf,

    /// Hierarchy proposal JSON from the structure analyzer.
    #[arg(long)]
    hierarchy: Option<PathBuf>,

    /// Directory of extracted images (page{P}_img{I}.png|jpg).
    #[arg(long)]
    images: Option<PathBuf>,

    /// Write the tagging output JSON here instead of stdout.
    #[arg(short, long, env = "PDFTAG_OUTPUT")]
    output: Option<PathBuf>,

    /// Write {stem}_mapping.json here, archiving and diffing the previous one.
    #[arg(long, env = "PDFTAG_MAPPING_DIR")]
    mapping_dir: Option<PathBuf>,

    /// JSON config file ({ "tagger": …, "alt_text": …, "validator": … }).
    #[arg(long, env = "PDFTAG_CONFIG")]
    config: Option<PathBuf>,

    /// Skip figure descriptions entirely (no network).
    #[arg(long)]
    no_alt_text: bool,

    /// Vision model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Distinct images sent to the model per document.
    #[arg(long, env = "PDFTAG_MAX_IMAGES")]
    max_images: Option<usize>,

    /// Attempts per image, including the first.
    #[arg(long, env = "PDFTAG_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Score the tag set as a faithful writer would persist it.
    #[arg(long)]
    score: bool,

    /// Strict scoring: escalate structure findings and require score ≥ 70.
    #[arg(long)]
    strict: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFTAG_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// Previous mapping JSON.
    old: PathBuf,
    /// Current mapping JSON.
    new: PathBuf,
    /// Write the diff JSON here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// Artifact facts JSON reported by the PDF writer.
    facts: PathBuf,
    /// Strict scoring.
    #[arg(long)]
    strict: bool,
    /// External validator to run on the artifact (verapdf).
    #[arg(long)]
    external_tool: Option<String>,
    /// JSON config file; only its "validator" section is used.
    #[arg(long, env = "PDFTAG_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs when it is shown.
    let show_progress = match cli.command {
        Command::Tag(ref a) => !cli.quiet && !a.no_progress,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Tag(ref args) => run_tag(args, cli.quiet, show_progress).await,
        Command::Diff(ref args) => run_diff(args),
        Command::Score(ref args) => run_score(args, cli.quiet),
    }
}

async fn run_tag(args: &TagArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let document: ExtractedDocument = read_json(&args.input).context("Failed to read document")?;
    let proposal = match args.hierarchy {
        Some(ref path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read hierarchy from {:?}", path))?;
            Some(HierarchyProposal::from_json_str(&raw))
        }
        None => None,
    };
    let file_config = load_config(args.config.as_deref())?;

    let images: Box<dyn ImagePayloadSource> = match args.images {
        Some(ref dir) => Box::new(DirectoryPayloads::new(dir)),
        None => Box::new(NoImagePayloads),
    };

    // Ctrl-C cancels in-flight description calls and discards the run.
    let cancel = CancellationFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn TaggingProgressCallback>)
    } else {
        None
    };
    let config = build_config(args, &file_config, progress, cancel)?;

    let output = tag_document(&document, proposal.as_ref(), images.as_ref(), &config)
        .await
        .context("Tagging failed")?;

    let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
    match args.output {
        Some(ref path) => {
            tokio::fs::write(path, format!("{json}\n"))
                .await
                .with_context(|| format!("Failed to write {:?}", path))?;
            if !quiet {
                eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
            }
        }
        None => println!("{json}"),
    }

    if let Some(ref dir) = args.mapping_dir {
        let stem = file_stem(&args.input);
        let previous = archive_mapping(dir, &stem)?;
        let entries = mapping_entries(&output.tag_set);
        let current = write_mapping_json(dir, &stem, &entries)?;
        if let Some(previous) = previous {
            let diff = compute_mapping_diff(&read_mapping_json(&previous)?, &entries);
            let diff_file = write_mapping_diff(dir, &stem, &diff)?;
            if !quiet {
                eprintln!(
                    "   mapping {}  diff +{} -{} ~{}  {}",
                    dim(&current.display().to_string()),
                    diff.counts.added,
                    diff.counts.removed,
                    diff.counts.changed,
                    dim(&diff_file.display().to_string()),
                );
            }
        } else if !quiet {
            eprintln!("   mapping {}", dim(&current.display().to_string()));
        }
    }

    if !quiet && !show_progress {
        eprintln!(
            "Tagged {} elements ({} figures, {} corrections) in {}ms",
            output.stats.fragments,
            output.stats.figures,
            output.stats.corrections,
            output.stats.duration_ms
        );
    }

    if args.score {
        let mut validator_config = file_config.validator.clone();
        validator_config.strict_mode |= args.strict;
        let facts = ArtifactFacts::expected_for(&output.tag_set, &document);
        let report = AccessibilityValidator::new(validator_config).validate(&facts);
        print_report(&report);
        if !report.passed {
            anyhow::bail!("Accessibility check failed (score {:.1})", report.score);
        }
    }

    Ok(())
}

fn run_diff(args: &DiffArgs) -> Result<()> {
    let old = read_mapping_json(&args.old)?;
    let new = read_mapping_json(&args.new)?;
    let diff = compute_mapping_diff(&old, &new);
    let json = serde_json::to_string_pretty(&diff).context("Failed to serialise diff")?;
    match args.output {
        Some(ref path) => {
            std::fs::write(path, format!("{json}\n")).with_context(|| format!("Failed to write {:?}", path))?
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_score(args: &ScoreArgs, quiet: bool) -> Result<()> {
    let facts: ArtifactFacts = read_json(&args.facts).context("Failed to read artifact facts")?;
    let mut config: ValidatorConfig = load_config(args.config.as_deref())?.validator;
    config.strict_mode |= args.strict;
    if args.external_tool.is_some() {
        config.external_tool = args.external_tool.clone();
    }

    let report = AccessibilityValidator::new(config).validate(&facts);
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialise report")?
    );
    if !quiet {
        print_report(&report);
    }
    if !report.passed {
        anyhow::bail!("Accessibility check failed (score {:.1})", report.score);
    }
    Ok(())
}

/// Map CLI args onto the config file's values.
fn build_config(
    args: &TagArgs,
    file: &ConfigFile,
    progress: Option<ProgressCallback>,
    cancel: CancellationFlag,
) -> Result<TaggerConfig> {
    let mut builder = file.builder().cancel(cancel);
    if args.no_alt_text {
        builder = builder.enable_alt_text(false);
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(n) = args.max_images {
        builder = builder.max_images(n);
    }
    if let Some(n) = args.max_attempts {
        builder = builder.max_attempts(n);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn load_config(path: Option<&Path>) -> Result<ConfigFile> {
    match path {
        Some(p) => read_json(p).context("Failed to read config file"),
        None => Ok(ConfigFile::default()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Cannot read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {:?}", path))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

fn print_report(report: &ScoreReport) {
    eprintln!(
        "{} Accessibility score {}  {}",
        if report.passed { green("✔") } else { red("✘") },
        bold(&format!("{:.1}", report.score)),
        dim(&format!(
            "AI-friendliness {:.1}, WCAG {}",
            ai_friendliness_score(report),
            report.wcag_level
        )),
    );
    for issue in &report.issues {
        eprintln!("  {} {}", red("✗"), issue);
    }
    for warning in &report.warnings {
        eprintln!("  {} {}", yellow("!"), warning);
    }
}
