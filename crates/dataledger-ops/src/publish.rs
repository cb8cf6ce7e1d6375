// SPDX-License-Identifier: Apache-2.0

//! The publish collaborator: consumes placeholder entries, performs the
//! staging→production copy, and amends the manifest with the commit
//! reference. Every step tolerates being re-run.

use crate::logging::{OpLog, OpStage};
use crate::{with_dataset, OpEvent, OpsContext, OpsError, OpsErrorCode};
use dataledger_model::{Ledger, VersionEntry, VersionLabel};
use dataledger_store::update_latest_history_entry;
use std::collections::BTreeSet;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub dataset: String,
    pub entry: VersionEntry,
}

/// Placeholder entries awaiting finalization, in ledger order. A placeholder
/// is always the newest entry of its dataset.
#[must_use]
pub fn find_pending(ledger: &Ledger) -> Vec<PendingEntry> {
    ledger
        .datasets
        .iter()
        .filter_map(|dataset| {
            dataset
                .latest()
                .filter(|entry| entry.is_placeholder())
                .map(|entry| PendingEntry {
                    dataset: dataset.file_name.clone(),
                    entry: entry.clone(),
                })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Finalized(VersionEntry),
    AlreadyFinalized(VersionLabel),
}

#[derive(Debug, Clone)]
pub struct FinalizeResult {
    pub outcome: FinalizeOutcome,
    pub events: Vec<OpEvent>,
}

/// Fills the commit reference of the dataset's placeholder entry and makes
/// the bytes live in production.
///
/// Safe to retry end to end: an already-finalized entry is a no-op, and the
/// copy is skipped when production already holds the key with the recorded
/// digest (which is also how rollback entries finalize without any copy).
pub fn finalize(ctx: &OpsContext<'_>, name: &str, commit_hash: &str) -> Result<FinalizeResult, OpsError> {
    let commit = commit_hash.trim();
    if commit.is_empty() {
        return Err(OpsError::new(
            OpsErrorCode::Conflict,
            format!("dataset '{name}': commit reference must not be empty"),
        ));
    }
    let mut log = OpLog::default();
    log.emit(
        OpStage::Resolve,
        "publish.start",
        &[("dataset", name.to_string()), ("commit", commit.to_string())],
    );

    let mut ledger = ctx.store.load()?;
    let latest = {
        let dataset = ledger.get_dataset(name).ok_or_else(|| {
            OpsError::new(
                OpsErrorCode::NotFound,
                format!("dataset '{name}' not found"),
            )
        })?;
        dataset
            .latest()
            .ok_or_else(|| {
                OpsError::new(
                    OpsErrorCode::Internal,
                    format!("dataset '{name}' has no recorded history"),
                )
            })?
            .clone()
    };

    if let Some(existing) = &latest.commit_hash {
        if existing != commit {
            warn!(
                dataset = name,
                version = %latest.version,
                existing,
                requested = commit,
                "latest entry already finalized under a different commit; leaving it untouched"
            );
        }
        log.emit(
            OpStage::Record,
            "publish.noop_already_finalized",
            &[("version", latest.version.to_string())],
        );
        return Ok(FinalizeResult {
            outcome: FinalizeOutcome::AlreadyFinalized(latest.version),
            events: log.into_events(),
        });
    }

    promote_object(ctx, name, &latest, &mut log)?;

    if let Err(err) = ctx.staging.delete(&latest.object_key) {
        warn!(dataset = name, key = %latest.object_key, %err, "staging cleanup failed");
        log.emit(
            OpStage::Transfer,
            "publish.staging_cleanup_failed",
            &[("reason", err.to_string())],
        );
    }

    let final_entry = latest.finalized(commit.to_string());
    update_latest_history_entry(&mut ledger, name, final_entry.clone())?;
    ctx.store.save(&ledger)?;
    log.emit(
        OpStage::Record,
        "publish.finalized",
        &[
            ("version", final_entry.version.to_string()),
            ("commit", commit.to_string()),
        ],
    );
    info!(dataset = name, version = %final_entry.version, commit, "entry finalized");

    Ok(FinalizeResult {
        outcome: FinalizeOutcome::Finalized(final_entry),
        events: log.into_events(),
    })
}

/// Ensures production holds the entry's object. No-op when it already does
/// with a matching digest; otherwise requires the staged copy and performs a
/// server-side copy, verifying the result.
fn promote_object(
    ctx: &OpsContext<'_>,
    name: &str,
    entry: &VersionEntry,
    log: &mut OpLog,
) -> Result<(), OpsError> {
    let key = &entry.object_key;
    let in_production = ctx.production.head(key).map_err(|e| with_dataset(name, e))?;
    if let Some(head) = &in_production {
        if head.sha256.as_deref() == Some(entry.sha256.as_str()) {
            log.emit(
                OpStage::Transfer,
                "publish.copy_skipped",
                &[("objectKey", key.clone())],
            );
            return Ok(());
        }
    }

    let staged = ctx.staging.head(key).map_err(|e| with_dataset(name, e))?;
    if staged.is_none() {
        return Err(OpsError::new(
            OpsErrorCode::NotFound,
            format!(
                "dataset '{name}' version {}: object '{key}' is in neither staging nor production",
                entry.version
            ),
        ));
    }

    ctx.production
        .copy_from(ctx.staging, key)
        .map_err(|e| with_dataset(name, e))?;
    let copied = ctx.production.head(key).map_err(|e| with_dataset(name, e))?;
    match copied {
        Some(head) => {
            if let Some(stored) = head.sha256 {
                if stored != entry.sha256 {
                    return Err(OpsError::new(
                        OpsErrorCode::Integrity,
                        format!(
                            "dataset '{name}' version {}: production copy of '{key}' has digest {stored}, expected {}",
                            entry.version, entry.sha256
                        ),
                    ));
                }
            }
        }
        None => {
            return Err(OpsError::new(
                OpsErrorCode::Transfer,
                format!(
                    "dataset '{name}' version {}: '{key}' not visible in production after copy",
                    entry.version
                ),
            ));
        }
    }
    log.emit(
        OpStage::Transfer,
        "publish.copied",
        &[
            ("objectKey", key.clone()),
            ("from", ctx.staging.bucket.clone()),
            ("to", ctx.production.bucket.clone()),
        ],
    );
    Ok(())
}

/// Finalizes every pending placeholder under one commit reference.
pub fn finalize_all(
    ctx: &OpsContext<'_>,
    commit_hash: &str,
) -> Result<Vec<(String, FinalizeResult)>, OpsError> {
    let pending = find_pending(&ctx.store.load()?);
    let mut results = Vec::with_capacity(pending.len());
    for entry in pending {
        let result = finalize(ctx, &entry.dataset, commit_hash)?;
        results.push((entry.dataset, result));
    }
    Ok(results)
}

#[derive(Debug, Clone)]
pub struct CleanStagingResult {
    pub deleted: Vec<String>,
    pub kept: Vec<String>,
    pub events: Vec<OpEvent>,
}

/// Deletes staging objects that no placeholder entry references anymore:
/// leftovers of finished publishes and abandoned prepares. Keys still backing
/// a pending placeholder are never touched.
pub fn clean_staging(ctx: &OpsContext<'_>) -> Result<CleanStagingResult, OpsError> {
    let mut log = OpLog::default();
    let ledger = ctx.store.load()?;
    let protected: BTreeSet<String> = find_pending(&ledger)
        .into_iter()
        .map(|pending| pending.entry.object_key)
        .collect();

    let keys = ctx.staging.list_keys()?;
    let mut deleted = Vec::new();
    let mut kept = Vec::new();
    for key in keys {
        if protected.contains(&key) {
            kept.push(key);
            continue;
        }
        ctx.staging.delete(&key)?;
        deleted.push(key);
    }
    log.emit(
        OpStage::Transfer,
        "clean_staging.done",
        &[
            ("deleted", deleted.len().to_string()),
            ("kept", kept.len().to_string()),
        ],
    );
    info!(deleted = deleted.len(), kept = kept.len(), "staging cleanup complete");

    Ok(CleanStagingResult {
        deleted,
        kept,
        events: log.into_events(),
    })
}
