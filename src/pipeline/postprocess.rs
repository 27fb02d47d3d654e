//! Post-processing: deterministic cleanup of model-written descriptions.
//!
//! Even a well-prompted vision model occasionally answers in a shape that is
//! unusable as alternative text: wrapped in code fences or quotes, spread
//! over several lines, a single generic word, or far too long for a screen
//! reader. These rules fix the shape without touching the meaning.
//!
//! ## Rule Order
//!
//! Whitespace is normalised before quotes are stripped so that a quoted
//! answer followed by a newline is still recognised. The generic-word check
//! runs before length padding, otherwise "Image" would be padded into
//! "Image (image)" and slip past it. Truncation is last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Descriptions shorter than this many chars are padded.
pub const MIN_DESCRIPTION_CHARS: usize = 20;

/// Descriptions longer than this many chars are truncated.
pub const MAX_DESCRIPTION_CHARS: usize = 200;

/// Replacement for answers that carry no information.
pub const GENERIC_REPLACEMENT: &str = "Content that requires an image description.";

/// Apply all rules to a raw model answer.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Remove invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Collapse whitespace runs to single spaces and trim
/// 4. Strip surrounding quotes, straight or curly
/// 5. Replace a lone generic word ("image", "photo", ...)
/// 6. Pad descriptions under 20 chars with " (image)"
/// 7. Truncate descriptions over 200 chars to 197 chars + "..."
pub fn clean_description(input: &str) -> String {
    let s = strip_fences(input);
    let s = remove_invisible_chars(&s);
    let s = collapse_whitespace(&s);
    let s = strip_quotes(&s);
    if is_generic(&s) {
        return GENERIC_REPLACEMENT.to_string();
    }
    let s = pad_short(s);
    truncate_long(s)
}

// ── Rule 1: Strip outer code fences ─────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n```\s*$").unwrap());

fn strip_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Remove invisible Unicode characters ────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Collapse whitespace ─────────────────────────────────────────────

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Rule 4: Strip surrounding quotes ────────────────────────────────────────

const QUOTES: [char; 6] = ['"', '\'', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];

fn strip_quotes(input: &str) -> String {
    input.trim_matches(&QUOTES[..]).trim().to_string()
}

// ── Rule 5: Empty or generic single-word answers ────────────────────────────

static RE_GENERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(image|photo|picture|figure|graphic|img)\.?$").unwrap());

fn is_generic(input: &str) -> bool {
    input.is_empty() || RE_GENERIC.is_match(input)
}

// ── Rule 6: Pad short descriptions ──────────────────────────────────────────

fn pad_short(input: String) -> String {
    if input.chars().count() < MIN_DESCRIPTION_CHARS {
        format!("{input} (image)")
    } else {
        input
    }
}

// ── Rule 7: Truncate long descriptions ──────────────────────────────────────

fn truncate_long(input: String) -> String {
    if input.chars().count() > MAX_DESCRIPTION_CHARS {
        let head: String = input.chars().take(MAX_DESCRIPTION_CHARS - 3).collect();
        format!("{head}...")
    } else {
        input
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
