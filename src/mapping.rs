//! Persisted mapping artifacts and run-to-run diffs.
//!
//! A mapping file lists, per tagged element, the tag it received and how
//! confident the pipeline was. Keeping the previous run's file around lets
//! reviewers see exactly which elements changed after a model or rule
//! update:
//!
//! ```text
//! out/
//!   report_mapping.json            ← current run
//!   report_mapping.previous.json   ← archived by archive_mapping()
//!   report_mapping_diff.json       ← compute_mapping_diff(previous, current)
//! ```
//!
//! Writes are atomic: each file is written to a temporary sibling and then
//! renamed over the target, so a crash never leaves a truncated mapping.

use crate::error::AutotagError;
use crate::output::{DocumentTagSet, Tag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One element of a mapping file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub element_id: String,
    pub tag: Tag,
    #[serde(default)]
    pub level: u8,
    pub confidence: f32,
    #[serde(default)]
    pub page: usize,
}

impl MappingEntry {
    /// Diff identity: the same element under a different tag is a
    /// remove-plus-add, not a change.
    pub fn key(&self) -> String {
        format!("{}::{}", self.element_id, self.tag)
    }
}

/// Mapping entries for every element of `tag_set`, in document order.
pub fn mapping_entries(tag_set: &DocumentTagSet) -> Vec<MappingEntry> {
    tag_set
        .tagged_elements
        .iter()
        .map(|a| MappingEntry {
            element_id: a.id.clone(),
            tag: a.tag,
            level: a.level,
            confidence: a.confidence,
            page: a.page,
        })
        .collect()
}

pub fn mapping_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}_mapping.json"))
}

pub fn previous_mapping_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}_mapping.previous.json"))
}

pub fn diff_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}_mapping_diff.json"))
}

/// Write `{stem}_mapping.json` into `dir`.
pub fn write_mapping_json(
    dir: &Path,
    stem: &str,
    entries: &[MappingEntry],
) -> Result<PathBuf, AutotagError> {
    let path = mapping_path(dir, stem);
    write_json_atomic(&path, &entries)?;
    info!("Wrote {} mapping entries to {}", entries.len(), path.display());
    Ok(path)
}

/// Read a mapping file written by [`write_mapping_json`].
pub fn read_mapping_json(path: &Path) -> Result<Vec<MappingEntry>, AutotagError> {
    let raw = std::fs::read_to_string(path).map_err(|source| AutotagError::MappingRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| AutotagError::MappingParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy the current mapping to `{stem}_mapping.previous.json`.
///
/// Returns the archive path, or `None` when there was no current mapping.
pub fn archive_mapping(dir: &Path, stem: &str) -> Result<Option<PathBuf>, AutotagError> {
    let current = mapping_path(dir, stem);
    if !current.exists() {
        debug!("No mapping to archive at {}", current.display());
        return Ok(None);
    }
    let previous = previous_mapping_path(dir, stem);
    std::fs::copy(&current, &previous).map_err(|source| AutotagError::MappingWrite {
        path: previous.clone(),
        source,
    })?;
    debug!("Archived {} to {}", current.display(), previous.display());
    Ok(Some(previous))
}

/// Before/after pair for an entry whose key survived but whose values changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingChange {
    pub before: MappingEntry,
    pub after: MappingEntry,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffCounts {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
}

/// Difference between two mapping snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingDiff {
    pub added: Vec<MappingEntry>,
    pub removed: Vec<MappingEntry>,
    pub changed: Vec<MappingChange>,
    pub counts: DiffCounts,
}

impl MappingDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Compare two snapshots. Every list is sorted by entry key.
///
/// When a snapshot repeats a key, its last entry is the one compared.
pub fn compute_mapping_diff(old: &[MappingEntry], new: &[MappingEntry]) -> MappingDiff {
    let index = |entries: &[MappingEntry]| -> BTreeMap<String, MappingEntry> {
        entries.iter().map(|e| (e.key(), e.clone())).collect()
    };
    let old_map = index(old);
    let new_map = index(new);

    let added: Vec<MappingEntry> = new_map
        .iter()
        .filter(|(k, _)| !old_map.contains_key(*k))
        .map(|(_, e)| e.clone())
        .collect();
    let removed: Vec<MappingEntry> = old_map
        .iter()
        .filter(|(k, _)| !new_map.contains_key(*k))
        .map(|(_, e)| e.clone())
        .collect();
    let changed: Vec<MappingChange> = new_map
        .iter()
        .filter_map(|(k, after)| {
            old_map
                .get(k)
                .filter(|before| *before != after)
                .map(|before| MappingChange {
                    before: before.clone(),
                    after: after.clone(),
                })
        })
        .collect();

    let counts = DiffCounts {
        added: added.len(),
        removed: removed.len(),
        changed: changed.len(),
    };
    MappingDiff {
        added,
        removed,
        changed,
        counts,
    }
}

/// Write `{stem}_mapping_diff.json` into `dir`.
pub fn write_mapping_diff(dir: &Path, stem: &str, diff: &MappingDiff) -> Result<PathBuf, AutotagError> {
    let path = diff_path(dir, stem);
    write_json_atomic(&path, diff)?;
    info!(
        "Mapping diff: +{} -{} ~{} ({})",
        diff.counts.added,
        diff.counts.removed,
        diff.counts.changed,
        path.display()
    );
    Ok(path)
}

/// Totals across the diffs of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub diff_totals: DiffCounts,
    pub diff_files: usize,
}

pub fn build_summary_report(diffs: &[MappingDiff]) -> SummaryReport {
    let diff_totals = diffs.iter().fold(DiffCounts::default(), |acc, d| DiffCounts {
        added: acc.added + d.counts.added,
        removed: acc.removed + d.counts.removed,
        changed: acc.changed + d.counts.changed,
    });
    SummaryReport {
        diff_totals,
        diff_files: diffs.len(),
    }
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AutotagError> {
    let write_err = |source: std::io::Error| AutotagError::MappingWrite {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    serde_json::to_writer_pretty(&mut tmp, value)
        .map_err(std::io::Error::from)
        .map_err(write_err)?;
    tmp.write_all(b"\n").map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::BBox;
    use crate::output::{TagAssignment, TagAttributes};

    fn entry(id: &str, tag: Tag, confidence: f32) -> MappingEntry {
        MappingEntry {
            element_id: id.to_string(),
            tag,
            level: tag.heading_level().unwrap_or(0),
            confidence,
            page: 0,
        }
    }

    #[test]
    fn identical_snapshots_diff_to_nothing() {
        let snap = vec![entry("a", Tag::H1, 0.9), entry("b", Tag::P, 0.7)];
        let diff = compute_mapping_diff(&snap, &snap);
        assert!(diff.is_empty());
        assert_eq!(diff.counts, DiffCounts::default());
    }

    #[test]
    fn diff_classifies_entries_by_key() {
        let old = vec![
            entry("a", Tag::H1, 0.9),
            entry("b", Tag::P, 0.7),
            entry("c", Tag::Figure, 0.9),
        ];
        let new = vec![
            entry("a", Tag::H1, 0.96),
            entry("b", Tag::H2, 0.7),
            entry("c", Tag::Figure, 0.9),
            entry("d", Tag::P, 0.5),
        ];
        let diff = compute_mapping_diff(&old, &new);

        assert_eq!(diff.counts, DiffCounts { added: 2, removed: 1, changed: 1 });
        let added: Vec<_> = diff.added.iter().map(MappingEntry::key).collect();
        assert_eq!(added, vec!["b::H2", "d::P"]);
        assert_eq!(diff.removed[0].key(), "b::P");
        assert_eq!(diff.changed[0].before.confidence, 0.9);
        assert_eq!(diff.changed[0].after.confidence, 0.96);
    }

    #[test]
    fn entries_follow_tag_set_order() {
        let set = DocumentTagSet {
            tagged_elements: vec![TagAssignment {
                id: "p0_b0".into(),
                tag: Tag::H1,
                level: 1,
                attributes: TagAttributes::for_tag(Tag::H1),
                confidence: 0.96,
                page: 0,
                bbox: BBox::default(),
            }],
            metadata: Default::default(),
        };
        let entries = mapping_entries(&set);
        assert_eq!(entries, vec![MappingEntry {
            element_id: "p0_b0".into(),
            tag: Tag::H1,
            level: 1,
            confidence: 0.96,
            page: 0,
        }]);
    }

    #[test]
    fn write_archive_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(archive_mapping(dir.path(), "doc").unwrap(), None);

        let first = vec![entry("a", Tag::H1, 0.9)];
        let path = write_mapping_json(dir.path(), "doc", &first).unwrap();
        assert!(path.ends_with("doc_mapping.json"));

        let archived = archive_mapping(dir.path(), "doc").unwrap().unwrap();
        assert!(archived.ends_with("doc_mapping.previous.json"));

        let second = vec![entry("a", Tag::H1, 0.96), entry("b", Tag::P, 0.5)];
        write_mapping_json(dir.path(), "doc", &second).unwrap();

        let old = read_mapping_json(&archived).unwrap();
        let new = read_mapping_json(&path).unwrap();
        assert_eq!(old, first);
        let diff = compute_mapping_diff(&old, &new);
        assert_eq!(diff.counts, DiffCounts { added: 1, removed: 0, changed: 1 });

        let diff_file = write_mapping_diff(dir.path(), "doc", &diff).unwrap();
        let raw = std::fs::read_to_string(diff_file).unwrap();
        assert!(raw.contains("\"changed\": 1"));
    }

    #[test]
    fn read_errors_are_typed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            read_mapping_json(&missing),
            Err(AutotagError::MappingRead { .. })
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{\"not\": \"a list\"}").unwrap();
        assert!(matches!(
            read_mapping_json(&bad),
            Err(AutotagError::MappingParse { .. })
        ));
    }

    #[test]
    fn summary_sums_counts() {
        let a = MappingDiff {
            counts: DiffCounts { added: 1, removed: 2, changed: 3 },
            ..Default::default()
        };
        let b = MappingDiff {
            counts: DiffCounts { added: 4, removed: 0, changed: 1 },
            ..Default::default()
        };
        let report = build_summary_report(&[a, b]);
        assert_eq!(report.diff_totals, DiffCounts { added: 5, removed: 2, changed: 4 });
        assert_eq!(report.diff_files, 2);
        assert_eq!(build_summary_report(&[]), SummaryReport::default());
    }
}
