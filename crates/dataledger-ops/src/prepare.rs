// SPDX-License-Identifier: Apache-2.0

use crate::logging::{OpLog, OpStage};
use crate::{with_dataset, OpEvent, OpsContext, OpsError, OpsErrorCode};
use dataledger_core::hash_file;
use dataledger_diff::{line_count, truncate_lines};
use dataledger_model::{versioned_object_key, Dataset, VersionEntry, VersionLabel};
use dataledger_store::{add_history_entry, add_new_dataset};
use std::path::Path;
use tracing::{info, warn};

pub struct PrepareRequest<'a> {
    pub name: &'a str,
    pub file: &'a Path,
    pub description: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// First version of a previously-unseen dataset name.
    CreatedDataset(VersionEntry),
    /// New version of an existing dataset.
    NewVersion(VersionEntry),
    /// The local file hashes to the current latest version; nothing to do.
    Unchanged(VersionLabel),
}

#[derive(Debug, Clone)]
pub struct PrepareResult {
    pub outcome: PrepareOutcome,
    pub events: Vec<OpEvent>,
}

/// New-dataset / new-version pipeline: resolve, hash, upload to staging,
/// diff against the previous version, record a placeholder entry, hand off.
///
/// The manifest is only written after the staging upload fully succeeded, so
/// any earlier failure leaves the ledger exactly as it was.
pub fn prepare(ctx: &OpsContext<'_>, request: &PrepareRequest<'_>) -> Result<PrepareResult, OpsError> {
    let name = request.name;
    let mut log = OpLog::default();
    log.emit(OpStage::Resolve, "prepare.start", &[("dataset", name.to_string())]);

    let mut ledger = ctx.store.load()?;
    let existing = ledger.get_dataset(name).cloned();
    if let Some(dataset) = &existing {
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

    let digest = hash_file(request.file).map_err(|e| {
        OpsError::new(
            OpsErrorCode::Io,
            format!("dataset '{name}': cannot hash '{}': {e}", request.file.display()),
        )
    })?;
    log.emit(OpStage::Hash, "prepare.hashed", &[("sha256", digest.clone())]);

    if let Some(dataset) = &existing {
        let latest = latest_of(name, dataset)?;
        if latest.sha256 == digest {
            info!(dataset = name, version = %latest.version, "no changes detected");
            log.emit(
                OpStage::Resolve,
                "prepare.unchanged",
                &[("version", latest.version.to_string())],
            );
            return Ok(PrepareResult {
                outcome: PrepareOutcome::Unchanged(latest.version),
                events: log.into_events(),
            });
        }
    }

    let version = existing
        .as_ref()
        .map_or(VersionLabel::first(), Dataset::next_version);
    let object_key = versioned_object_key(name, version, &digest);

    match ctx.staging.head(&object_key).map_err(|e| with_dataset(name, e))? {
        Some(head) if head.sha256.as_deref() == Some(digest.as_str()) => {
            log.emit(
                OpStage::Transfer,
                "prepare.upload_skipped",
                &[("objectKey", object_key.clone())],
            );
        }
        Some(_) => {
            return Err(OpsError::new(
                OpsErrorCode::Conflict,
                format!(
                    "dataset '{name}': staging bucket '{}' already holds '{object_key}' with different content",
                    ctx.staging.bucket
                ),
            ));
        }
        None => {
            ctx.staging
                .upload(request.file, &object_key, &digest)
                .map_err(|e| with_dataset(name, e))?;
            log.emit(
                OpStage::Transfer,
                "prepare.uploaded",
                &[
                    ("bucket", ctx.staging.bucket.clone()),
                    ("objectKey", object_key.clone()),
                ],
            );
        }
    }

    let (diff_summary, diff_detail) = match &existing {
        None => (None, None),
        Some(dataset) => diff_against_latest(ctx, name, dataset, request.file, &mut log)?,
    };

    let entry = VersionEntry::placeholder(
        version,
        object_key,
        digest,
        request.description.to_string(),
        diff_summary,
        diff_detail,
    );
    let created = existing.is_none();
    if created {
        add_new_dataset(&mut ledger, Dataset::new(name.to_string(), entry.clone()))?;
    } else {
        add_history_entry(&mut ledger, name, entry.clone())?;
    }
    ctx.store.save(&ledger)?;
    log.emit(
        OpStage::Record,
        "prepare.placeholder_recorded",
        &[("version", version.to_string())],
    );
    log.emit(
        OpStage::Handoff,
        "prepare.handoff",
        &[(
            "next",
            "commit the manifest change; the publish step fills commitHash".to_string(),
        )],
    );
    info!(dataset = name, version = %version, "placeholder recorded");

    let outcome = if created {
        PrepareOutcome::CreatedDataset(entry)
    } else {
        PrepareOutcome::NewVersion(entry)
    };
    Ok(PrepareResult {
        outcome,
        events: log.into_events(),
    })
}

fn latest_of<'a>(name: &str, dataset: &'a Dataset) -> Result<&'a VersionEntry, OpsError> {
    dataset.latest().ok_or_else(|| {
        OpsError::new(
            OpsErrorCode::Internal,
            format!("dataset '{name}' has no recorded history"),
        )
    })
}

/// Fetches the current latest artifact (verified) and diffs the new file
/// against it. Diff degradation is soft: the entry simply carries no diff
/// text, and the events say why.
fn diff_against_latest(
    ctx: &OpsContext<'_>,
    name: &str,
    dataset: &Dataset,
    new_file: &Path,
    log: &mut OpLog,
) -> Result<(Option<String>, Option<String>), OpsError> {
    let latest = latest_of(name, dataset)?;
    log.emit(
        OpStage::Diff,
        "prepare.fetch_previous",
        &[("version", latest.version.to_string())],
    );
    let scratch = tempfile::tempdir().map_err(|e| {
        OpsError::new(
            OpsErrorCode::Io,
            format!("dataset '{name}': cannot create scratch directory: {e}"),
        )
    })?;
    let previous = scratch.path().join("previous");
    ctx.production
        .pull_and_verify(&latest.object_key, &latest.sha256, &previous)
        .map_err(|e| with_dataset(name, e))?;

    match ctx.diff.generate(&previous, new_file) {
        Ok(output) => {
            log.emit(
                OpStage::Diff,
                "prepare.diff_generated",
                &[("provider", output.provider.as_str().to_string())],
            );
            let summary = bounded_or_none(&output.summary, ctx.limits.max_summary_lines);
            let detail = if line_count(&output.full) <= ctx.limits.max_detail_lines {
                non_empty(output.full)
            } else {
                log.emit(
                    OpStage::Diff,
                    "prepare.diff_detail_omitted",
                    &[("lines", line_count(&output.full).to_string())],
                );
                None
            };
            Ok((summary, detail))
        }
        Err(err) => {
            warn!(dataset = name, %err, "diff unavailable; recording entry without one");
            log.emit(
                OpStage::Diff,
                "prepare.diff_unavailable",
                &[("reason", err.to_string())],
            );
            Ok((None, None))
        }
    }
}

fn bounded_or_none(text: &str, max_lines: usize) -> Option<String> {
    non_empty(truncate_lines(text, max_lines))
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
