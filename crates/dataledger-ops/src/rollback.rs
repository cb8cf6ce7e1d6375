// SPDX-License-Identifier: Apache-2.0

use crate::logging::{OpLog, OpStage};
use crate::{OpEvent, OpsContext, OpsError, OpsErrorCode};
use dataledger_model::{VersionEntry, VersionLabel};
use dataledger_store::add_history_entry;
use tracing::info;

pub struct RollbackRequest<'a> {
    pub name: &'a str,
    pub target: VersionLabel,
    pub description: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct RollbackResult {
    pub entry: VersionEntry,
    pub events: Vec<OpEvent>,
}

/// Re-publishes an old revision as a brand-new version whose object key
/// aliases the target's key. No bytes move: the artifact is already in
/// production, so the placeholder finalizes without any copy.
pub fn rollback(ctx: &OpsContext<'_>, request: &RollbackRequest<'_>) -> Result<RollbackResult, OpsError> {
    let name = request.name;
    let mut log = OpLog::default();
    log.emit(
        OpStage::Resolve,
        "rollback.start",
        &[
            ("dataset", name.to_string()),
            ("target", request.target.to_string()),
        ],
    );

    let mut ledger = ctx.store.load()?;
    let (target_entry, version) = {
        let dataset = ledger.get_dataset(name).ok_or_else(|| {
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
        let target_entry = dataset.find_version(request.target).ok_or_else(|| {
            OpsError::new(
                OpsErrorCode::NotFound,
                format!("dataset '{name}': version {} not found", request.target),
            )
        })?;
        (target_entry.clone(), dataset.next_version())
    };

    let description = request
        .description
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("Rollback to {}", request.target));
    let entry = VersionEntry::placeholder(
        version,
        target_entry.object_key.clone(),
        target_entry.sha256.clone(),
        description,
        None,
        None,
    );
    add_history_entry(&mut ledger, name, entry.clone())?;
    ctx.store.save(&ledger)?;

    log.emit(
        OpStage::Record,
        "rollback.placeholder_recorded",
        &[
            ("version", version.to_string()),
            ("aliases", target_entry.object_key.clone()),
        ],
    );
    log.emit(
        OpStage::Handoff,
        "rollback.handoff",
        &[(
            "next",
            "commit the manifest change; the publish step fills commitHash".to_string(),
        )],
    );
    info!(dataset = name, version = %version, target = %request.target, "rollback recorded");

    Ok(RollbackResult {
        entry,
        events: log.into_events(),
    })
}
