// SPDX-License-Identifier: Apache-2.0

use crate::{ValidationError, VersionLabel};
use dataledger_core::is_hex_digest;
use serde::{Deserialize, Serialize};

/// One immutable revision of a dataset's bytes.
///
/// `commit_hash` is absent for a placeholder entry awaiting finalization; its
/// presence is the only thing that distinguishes the two states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VersionEntry {
    pub version: VersionLabel,
    pub object_key: String,
    pub sha256: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_detail: Option<String>,
}

impl VersionEntry {
    #[must_use]
    pub fn placeholder(
        version: VersionLabel,
        object_key: String,
        sha256: String,
        description: String,
        diff_summary: Option<String>,
        diff_detail: Option<String>,
    ) -> Self {
        Self {
            version,
            object_key,
            sha256,
            description,
            commit_hash: None,
            diff_summary,
            diff_detail,
        }
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.commit_hash.is_none()
    }

    /// Same entry with the commit reference filled in; every other field is
    /// carried over untouched.
    #[must_use]
    pub fn finalized(mut self, commit_hash: String) -> Self {
        self.commit_hash = Some(commit_hash);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.object_key.trim().is_empty() {
            return Err(ValidationError(format!(
                "version {} has an empty objectKey",
                self.version
            )));
        }
        if !is_hex_digest(&self.sha256) {
            return Err(ValidationError(format!(
                "version {} sha256 must be 64 hex characters",
                self.version
            )));
        }
        if let Some(commit) = &self.commit_hash {
            if commit.trim().is_empty() {
                return Err(ValidationError(format!(
                    "version {} commitHash must not be empty when present",
                    self.version
                )));
            }
        }
        Ok(())
    }
}
