//! Pipeline stages for document tagging.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable; every stage except
//! [`describe`] is a synchronous pure function.
//!
//! ## Data Flow
//!
//! ```text
//!               ┌─▶ heuristic ─┐
//! fragments ────┤              ├─▶ fusion ──▶ describe ──▶ correct ──▶ tag set
//! (+ proposal)  └─▶ hierarchy ─┘              (figures)    (barrier)
//! ```
//!
//! 1. [`classify`]  — the [`classify::ClassificationSource`] seam shared by
//!    both signal producers
//! 2. [`heuristic`] — local typography/geometry rules, one fragment at a time
//! 3. [`hierarchy`] — normalise the advisory hierarchy proposal, with a
//!    deterministic fallback for missing entries
//! 4. [`fusion`]    — merge the two signals into one tag and confidence
//! 5. [`encode`]    — image payload → base64 + MIME for the vision request
//! 6. [`describe`]  — figure descriptions with retry/backoff; the only stage
//!    with network I/O
//! 7. [`postprocess`] — deterministic cleanup of model-written descriptions
//! 8. [`correct`]   — document-wide invariants (one H1, alt on every Figure);
//!    needs the complete assignment list

pub mod classify;
pub mod correct;
pub mod describe;
pub mod encode;
pub mod fusion;
pub mod heuristic;
pub mod hierarchy;
pub mod postprocess;
