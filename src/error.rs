//! Error types for the edgequake-pdftag library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AutotagError`] — **Fatal**: the tagging run cannot produce a result at
//!   all (empty fragment list, caller cancelled, invalid configuration,
//!   mapping file unreadable). Returned as `Err(AutotagError)` from the
//!   top-level `tag_document*` functions and the mapping I/O helpers.
//!
//! * [`DescribeError`] — **Non-fatal**: one remote description attempt
//!   failed (timeout, API error, empty answer). The synthesizer retries and
//!   finally falls back to a deterministic description, so these errors are
//!   only ever *recorded* in [`crate::output::DescriptionRecord`], never
//!   propagated.
//!
//! Structural problems (no H1, Figures without alt text) are not errors at
//! all: the corrector repairs them and reports a
//! [`crate::pipeline::correct::CorrectionNote`]. Accessibility failures are
//! findings inside [`crate::scoring::ScoreReport`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdftag library.
#[derive(Debug, Error)]
pub enum AutotagError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The extraction collaborator produced no fragments.
    #[error("Document has no content fragments to tag")]
    EmptyDocument,

    /// The caller cancelled the run; partial assignments were discarded.
    #[error("Tagging cancelled after {completed}/{total} fragments")]
    Cancelled { completed: usize, total: usize },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider could not be created (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Mapping I/O errors ────────────────────────────────────────────────
    /// Could not create or write a mapping artifact.
    #[error("Failed to write mapping file '{path}': {source}")]
    MappingWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not read a mapping artifact.
    #[error("Failed to read mapping file '{path}': {source}")]
    MappingRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A mapping artifact is not valid JSON of the expected shape.
    #[error("Mapping file '{path}' is malformed: {source}")]
    MappingParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of one remote description attempt.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum DescribeError {
    /// The attempt exceeded the per-call timeout.
    #[error("description request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider returned an error (transport, HTTP status, content filter).
    #[error("description request failed: {message}")]
    Api { message: String },

    /// The provider answered, but with nothing usable.
    #[error("description response was empty")]
    EmptyResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_display() {
        let e = AutotagError::Cancelled {
            completed: 3,
            total: 10,
        };
        assert!(e.to_string().contains("3/10"), "got: {e}");
    }

    #[test]
    fn provider_not_configured_display() {
        let e = AutotagError::ProviderNotConfigured {
            provider: "openai".into(),
            hint: "set OPENAI_API_KEY".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("openai"));
        assert!(msg.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn mapping_write_keeps_source() {
        use std::error::Error as _;
        let e = AutotagError::MappingWrite {
            path: PathBuf::from("out/doc_mapping.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(e.to_string().contains("doc_mapping.json"));
        assert!(e.source().is_some());
    }

    #[test]
    fn describe_error_display() {
        assert!(DescribeError::Timeout { secs: 30 }
            .to_string()
            .contains("30s"));
        assert!(DescribeError::Api {
            message: "HTTP 503".into()
        }
        .to_string()
        .contains("503"));
    }
}
