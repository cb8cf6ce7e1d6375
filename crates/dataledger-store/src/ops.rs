// SPDX-License-Identifier: Apache-2.0

//! In-memory ledger operations. Pipelines load the ledger once, apply one or
//! more of these, and persist the result in a single write.

use crate::{LedgerError, LedgerErrorCode};
use dataledger_model::{Dataset, Ledger, VersionEntry};

pub fn add_new_dataset(ledger: &mut Ledger, dataset: Dataset) -> Result<(), LedgerError> {
    dataset
        .validate()
        .map_err(|e| LedgerError::new(LedgerErrorCode::Conflict, e.to_string()))?;
    if ledger.get_dataset(&dataset.file_name).is_some() {
        return Err(LedgerError::new(
            LedgerErrorCode::Conflict,
            format!("dataset '{}' already exists", dataset.file_name),
        ));
    }
    ledger.datasets.push(dataset);
    Ok(())
}

/// Full replace of the named dataset record.
pub fn update_dataset(
    ledger: &mut Ledger,
    name: &str,
    new_dataset: Dataset,
) -> Result<(), LedgerError> {
    new_dataset
        .validate()
        .map_err(|e| LedgerError::new(LedgerErrorCode::Conflict, e.to_string()))?;
    let slot = ledger
        .datasets
        .iter_mut()
        .find(|ds| ds.file_name == name)
        .ok_or_else(|| {
            LedgerError::new(
                LedgerErrorCode::NotFound,
                format!("dataset '{name}' not found"),
            )
        })?;
    *slot = new_dataset;
    Ok(())
}

/// Prepends `entry` to the named dataset's history. The new label must be
/// strictly newer than everything already recorded, and a second placeholder
/// is refused outright.
pub fn add_history_entry(
    ledger: &mut Ledger,
    name: &str,
    entry: VersionEntry,
) -> Result<(), LedgerError> {
    let dataset = ledger.get_dataset_mut(name).ok_or_else(|| {
        LedgerError::new(
            LedgerErrorCode::NotFound,
            format!("dataset '{name}' not found"),
        )
    })?;
    if entry.is_placeholder() && dataset.has_pending() {
        let pending = dataset.pending().map(|e| e.version.to_string()).unwrap_or_default();
        return Err(LedgerError::new(
            LedgerErrorCode::Conflict,
            format!("dataset '{name}' already has placeholder {pending} awaiting finalization"),
        ));
    }
    let ceiling = dataset.next_version();
    if entry.version < ceiling {
        return Err(LedgerError::new(
            LedgerErrorCode::Conflict,
            format!(
                "dataset '{name}': version {} is not newer than the recorded history (next is {ceiling})",
                entry.version
            ),
        ));
    }
    dataset.history.insert(0, entry);
    Ok(())
}

/// Replaces `history[0]` of the named dataset, keeping the version label.
/// This is how a placeholder is amended into its finalized form.
pub fn update_latest_history_entry(
    ledger: &mut Ledger,
    name: &str,
    final_entry: VersionEntry,
) -> Result<(), LedgerError> {
    let dataset = ledger.get_dataset_mut(name).ok_or_else(|| {
        LedgerError::new(
            LedgerErrorCode::NotFound,
            format!("dataset '{name}' not found"),
        )
    })?;
    let latest = dataset.history.first().ok_or_else(|| {
        LedgerError::new(
            LedgerErrorCode::NotFound,
            format!("dataset '{name}' has no history to update"),
        )
    })?;
    if final_entry.version != latest.version {
        return Err(LedgerError::new(
            LedgerErrorCode::Conflict,
            format!(
                "dataset '{name}': replacement entry is {} but the latest entry is {}",
                final_entry.version, latest.version
            ),
        ));
    }
    dataset.history[0] = final_entry;
    Ok(())
}

/// Removes the dataset record and all of its version entries in one step.
pub fn remove_dataset(ledger: &mut Ledger, name: &str) -> Result<Dataset, LedgerError> {
    let index = ledger
        .datasets
        .iter()
        .position(|ds| ds.file_name == name)
        .ok_or_else(|| {
            LedgerError::new(
                LedgerErrorCode::NotFound,
                format!("dataset '{name}' not found"),
            )
        })?;
    Ok(ledger.datasets.remove(index))
}
