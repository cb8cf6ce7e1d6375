// SPDX-License-Identifier: Apache-2.0

use crate::{Dataset, ValidationError, VersionEntry, VersionLabel};
use serde::{Deserialize, Serialize};

/// The full manifest: every dataset and its version history. Serializes as a
/// bare JSON array so the on-disk file is exactly the published format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    pub datasets: Vec<Dataset>,
}

impl Ledger {
    #[must_use]
    pub fn get_dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|ds| ds.file_name == name)
    }

    #[must_use]
    pub fn get_dataset_mut(&mut self, name: &str) -> Option<&mut Dataset> {
        self.datasets.iter_mut().find(|ds| ds.file_name == name)
    }

    #[must_use]
    pub fn get_version_entry(&self, name: &str, selector: &VersionSelector) -> Option<&VersionEntry> {
        let dataset = self.get_dataset(name)?;
        match selector {
            VersionSelector::Latest => dataset.latest(),
            VersionSelector::Label(label) => dataset.find_version(*label),
        }
    }

    /// Every object key referenced by any entry of any dataset.
    #[must_use]
    pub fn referenced_keys(&self) -> std::collections::BTreeSet<String> {
        self.datasets
            .iter()
            .flat_map(|ds| ds.history.iter().map(|entry| entry.object_key.clone()))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = std::collections::BTreeSet::new();
        for dataset in &self.datasets {
            dataset.validate()?;
            if !seen.insert(dataset.file_name.as_str()) {
                return Err(ValidationError(format!(
                    "duplicate dataset name '{}'",
                    dataset.file_name
                )));
            }
        }
        Ok(())
    }
}

/// Version lookup: an explicit label, or whatever is currently newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector {
    Latest,
    Label(VersionLabel),
}

impl VersionSelector {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        if input.trim().eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        VersionLabel::parse(input).map(Self::Label)
    }
}
