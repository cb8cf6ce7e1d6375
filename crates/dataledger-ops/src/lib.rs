// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod logging;
mod maintain;
mod prepare;
mod publish;
mod rollback;

pub const CRATE_NAME: &str = "dataledger-ops";

pub use logging::{OpEvent, OpLog, OpStage};
pub use maintain::{delete_dataset, prune, DeleteResult, PruneResult};
pub use prepare::{prepare, PrepareOutcome, PrepareRequest, PrepareResult};
pub use publish::{
    clean_staging, finalize, finalize_all, find_pending, CleanStagingResult, FinalizeOutcome,
    FinalizeResult, PendingEntry,
};
pub use rollback::{rollback, RollbackRequest, RollbackResult};

pub use dataledger_object::{check_bucket, verify_access, BucketPermissions, BucketReport};

use dataledger_diff::DiffEngine;
use dataledger_object::{BucketClient, GatewayError, GatewayErrorCode};
use dataledger_store::{LedgerError, LedgerErrorCode, LedgerStore};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OpsErrorCode {
    NotFound,
    Conflict,
    Integrity,
    Transfer,
    Permission,
    Ledger,
    Io,
    Internal,
}

impl OpsErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Integrity => "integrity_failure",
            Self::Transfer => "transfer_failure",
            Self::Permission => "permission_denied",
            Self::Ledger => "ledger_error",
            Self::Io => "io_error",
            Self::Internal => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpsError {
    pub code: OpsErrorCode,
    pub message: String,
}

impl OpsError {
    #[must_use]
    pub fn new(code: OpsErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for OpsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for OpsError {}

impl From<LedgerError> for OpsError {
    fn from(err: LedgerError) -> Self {
        let code = match err.code {
            LedgerErrorCode::NotFound => OpsErrorCode::NotFound,
            LedgerErrorCode::Conflict => OpsErrorCode::Conflict,
            _ => OpsErrorCode::Ledger,
        };
        Self::new(code, err.message)
    }
}

impl From<GatewayError> for OpsError {
    fn from(err: GatewayError) -> Self {
        let code = match err.code {
            GatewayErrorCode::NotFound => OpsErrorCode::NotFound,
            GatewayErrorCode::PermissionDenied => OpsErrorCode::Permission,
            GatewayErrorCode::Transfer => OpsErrorCode::Transfer,
            GatewayErrorCode::Integrity => OpsErrorCode::Integrity,
            GatewayErrorCode::Io => OpsErrorCode::Io,
            _ => OpsErrorCode::Internal,
        };
        Self::new(code, err.message)
    }
}

/// Bounds on how much diff text rides inside the manifest: the summary is
/// always truncated to `max_summary_lines`, the detail is dropped entirely
/// once it exceeds `max_detail_lines`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffLimits {
    pub max_summary_lines: usize,
    pub max_detail_lines: usize,
}

impl Default for DiffLimits {
    fn default() -> Self {
        Self {
            max_summary_lines: 20,
            max_detail_lines: 500,
        }
    }
}

/// Shared collaborators for one operation. The ledger itself is not held
/// here: each pipeline loads it once, mutates it in memory, and persists it
/// in a single write.
pub struct OpsContext<'a> {
    pub store: &'a LedgerStore,
    pub staging: &'a BucketClient,
    pub production: &'a BucketClient,
    pub diff: &'a DiffEngine,
    pub limits: DiffLimits,
}

/// Pre-flight gate used before developer-facing uploads: the staging bucket
/// must exist and grant read+write before any bytes move.
pub fn preflight_staging(ctx: &OpsContext<'_>) -> Result<(), OpsError> {
    let report = check_bucket(ctx.staging);
    if report.exists && report.permissions.read && report.permissions.write {
        return Ok(());
    }
    let reason = if report.message.is_empty() {
        "insufficient permissions".to_string()
    } else {
        report.message
    };
    Err(OpsError::new(
        OpsErrorCode::Permission,
        format!(
            "staging bucket '{}' is not ready for uploads: {reason}",
            ctx.staging.bucket
        ),
    ))
}

pub(crate) fn with_dataset(name: &str, err: impl Into<OpsError>) -> OpsError {
    let err = err.into();
    OpsError::new(err.code, format!("dataset '{name}': {}", err.message))
}
