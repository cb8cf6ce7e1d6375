// SPDX-License-Identifier: Apache-2.0

//! Manifest-only maintenance: prune old versions, delete whole datasets.
//! Neither touches the object store; production keys that became
//! unreferenced are handed back to the caller as a reclaim list.

use crate::logging::{OpLog, OpStage};
use crate::{OpEvent, OpsContext, OpsError, OpsErrorCode};
use dataledger_model::{Dataset, Ledger, VersionEntry};
use dataledger_store::remove_dataset;
use std::collections::BTreeSet;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PruneResult {
    pub removed: Vec<VersionEntry>,
    pub reclaim: Vec<String>,
    pub events: Vec<OpEvent>,
}

/// Retires every entry beyond the `keep` most recent. Entries at positions
/// `0..keep` are never candidates, and a dataset is never reduced below one
/// version.
pub fn prune(ctx: &OpsContext<'_>, name: &str, keep: usize) -> Result<PruneResult, OpsError> {
    if keep == 0 {
        return Err(OpsError::new(
            OpsErrorCode::Conflict,
            format!("dataset '{name}': prune must keep at least one version"),
        ));
    }
    let mut log = OpLog::default();
    log.emit(
        OpStage::Resolve,
        "prune.start",
        &[("dataset", name.to_string()), ("keep", keep.to_string())],
    );

    let mut ledger = ctx.store.load()?;
    let dataset = ledger.get_dataset_mut(name).ok_or_else(|| {
        OpsError::new(
            OpsErrorCode::NotFound,
            format!("dataset '{name}' not found"),
        )
    })?;
    if let Some(pending) = dataset.pending() {
        return Err(OpsError::new(
            OpsErrorCode::Conflict,
            format!(
                "dataset '{name}' has placeholder {} awaiting finalization; publish it before starting a new operation",
                pending.version
            ),
        ));
    }
    if dataset.history.len() <= keep {
        log.emit(OpStage::Record, "prune.noop", &[]);
        return Ok(PruneResult {
            removed: Vec::new(),
            reclaim: Vec::new(),
            events: log.into_events(),
        });
    }

    let removed = dataset.history.split_off(keep);
    let reclaim = unreferenced_keys(&ledger, &removed);
    ctx.store.save(&ledger)?;

    log.emit(
        OpStage::Record,
        "prune.retired",
        &[
            ("removed", removed.len().to_string()),
            ("reclaim", reclaim.len().to_string()),
        ],
    );
    info!(dataset = name, removed = removed.len(), "prune recorded");

    Ok(PruneResult {
        removed,
        reclaim,
        events: log.into_events(),
    })
}

#[derive(Debug, Clone)]
pub struct DeleteResult {
    pub dataset: Dataset,
    pub reclaim: Vec<String>,
    pub events: Vec<OpEvent>,
}

/// Removes the dataset record and every version entry in one manifest
/// write. Irreversible once the reclaimed objects are deleted from
/// production, which is why the boundary demands strong confirmation.
pub fn delete_dataset(ctx: &OpsContext<'_>, name: &str) -> Result<DeleteResult, OpsError> {
    let mut log = OpLog::default();
    log.emit(OpStage::Resolve, "delete.start", &[("dataset", name.to_string())]);

    let mut ledger = ctx.store.load()?;
    if let Some(dataset) = ledger.get_dataset(name) {
        if let Some(pending) = dataset.pending() {
            return Err(OpsError::new(
                OpsErrorCode::Conflict,
                format!(
                    "dataset '{name}' has placeholder {} awaiting finalization; publish it before starting a new operation",
                    pending.version
                ),
            ));
        }
    }
    let dataset = remove_dataset(&mut ledger, name)?;
    let reclaim = unreferenced_keys(&ledger, &dataset.history);
    ctx.store.save(&ledger)?;

    log.emit(
        OpStage::Record,
        "delete.retired",
        &[
            ("versions", dataset.history.len().to_string()),
            ("reclaim", reclaim.len().to_string()),
        ],
    );
    info!(dataset = name, versions = dataset.history.len(), "dataset delete recorded");

    Ok(DeleteResult {
        dataset,
        reclaim,
        events: log.into_events(),
    })
}

/// Keys of the removed entries that no surviving entry still points at.
/// Rollback aliasing means several versions can share one key; a shared key
/// must outlive the pruned entry that introduced it.
fn unreferenced_keys(ledger: &Ledger, removed: &[VersionEntry]) -> Vec<String> {
    let survivors = ledger.referenced_keys();
    let mut seen = BTreeSet::new();
    removed
        .iter()
        .map(|entry| entry.object_key.clone())
        .filter(|key| !survivors.contains(key) && seen.insert(key.clone()))
        .collect()
}
