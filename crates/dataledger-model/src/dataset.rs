// SPDX-License-Identifier: Apache-2.0

use crate::{ValidationError, VersionEntry, VersionLabel};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A logical named artifact tracked across versions. `history` is newest
/// first; insertion order is chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Dataset {
    pub file_name: String,
    pub history: Vec<VersionEntry>,
}

impl Dataset {
    #[must_use]
    pub fn new(file_name: String, first_entry: VersionEntry) -> Self {
        Self {
            file_name,
            history: vec![first_entry],
        }
    }

    #[must_use]
    pub fn latest(&self) -> Option<&VersionEntry> {
        self.history.first()
    }

    #[must_use]
    pub fn pending(&self) -> Option<&VersionEntry> {
        self.history.iter().find(|entry| entry.is_placeholder())
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending().is_some()
    }

    #[must_use]
    pub fn find_version(&self, label: VersionLabel) -> Option<&VersionEntry> {
        self.history.iter().find(|entry| entry.version == label)
    }

    /// Next label to assign: one past the highest ever used, so labels are
    /// never reused even after pruning.
    #[must_use]
    pub fn next_version(&self) -> VersionLabel {
        self.history
            .iter()
            .map(|entry| entry.version)
            .max()
            .map_or(VersionLabel::first(), VersionLabel::next)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.file_name.trim().is_empty() {
            return Err(ValidationError("dataset fileName must not be empty".to_string()));
        }
        if self.history.is_empty() {
            return Err(ValidationError(format!(
                "dataset '{}' must keep at least one version",
                self.file_name
            )));
        }
        let mut previous: Option<VersionLabel> = None;
        let mut placeholders = 0_usize;
        for entry in &self.history {
            entry.validate().map_err(|e| {
                ValidationError(format!("dataset '{}': {e}", self.file_name))
            })?;
            if entry.is_placeholder() {
                placeholders += 1;
            }
            if let Some(newer) = previous {
                if entry.version >= newer {
                    return Err(ValidationError(format!(
                        "dataset '{}' history must be strictly newest-first: {} follows {}",
                        self.file_name, entry.version, newer
                    )));
                }
            }
            previous = Some(entry.version);
        }
        if placeholders > 1 {
            return Err(ValidationError(format!(
                "dataset '{}' has {placeholders} placeholder entries; at most one is allowed",
                self.file_name
            )));
        }
        Ok(())
    }
}

/// Storage key for one version's bytes: `<stem>/<version>-<sha256><ext>`.
/// The per-dataset prefix keeps keys from different datasets disjoint, and
/// the version+digest suffix keeps every revision's key unique.
#[must_use]
pub fn versioned_object_key(file_name: &str, version: VersionLabel, sha256: &str) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    format!("{stem}/{version}-{sha256}{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(version: u64, placeholder: bool) -> VersionEntry {
        let label = VersionLabel::parse(&format!("v{version}")).expect("label");
        let mut e = VersionEntry::placeholder(
            label,
            format!("grid/v{version}-aa.sqlite"),
            "a".repeat(64),
            "entry".to_string(),
            None,
            None,
        );
        if !placeholder {
            e = e.finalized("abc123".to_string());
        }
        e
    }

    #[test]
    fn next_version_is_one_past_the_max() {
        let ds = Dataset {
            file_name: "grid.sqlite".to_string(),
            history: vec![entry(7, false), entry(3, false)],
        };
        assert_eq!(ds.next_version().to_string(), "v8");
    }

    #[test]
    fn validate_rejects_out_of_order_history() {
        let ds = Dataset {
            file_name: "grid.sqlite".to_string(),
            history: vec![entry(1, false), entry(2, false)],
        };
        assert!(ds.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_labels() {
        let ds = Dataset {
            file_name: "grid.sqlite".to_string(),
            history: vec![entry(2, false), entry(2, false)],
        };
        assert!(ds.validate().is_err());
    }

    #[test]
    fn validate_rejects_two_placeholders() {
        let ds = Dataset {
            file_name: "grid.sqlite".to_string(),
            history: vec![entry(2, true), entry(1, true)],
        };
        assert!(ds.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_history() {
        let ds = Dataset {
            file_name: "grid.sqlite".to_string(),
            history: Vec::new(),
        };
        assert!(ds.validate().is_err());
    }

    #[test]
    fn object_keys_are_namespaced_and_versioned() {
        let label = VersionLabel::parse("v3").expect("label");
        let key = versioned_object_key("grid.sqlite", label, &"d".repeat(64));
        assert_eq!(key, format!("grid/v3-{}.sqlite", "d".repeat(64)));

        let bare = versioned_object_key("plainfile", label, "ff00");
        assert_eq!(bare, "plainfile/v3-ff00");
    }
}
