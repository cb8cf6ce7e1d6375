// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod bucket;
mod observer;
mod retry;
mod verify;

pub const CRATE_NAME: &str = "dataledger-object";

pub use bucket::{BucketClient, ObjectHead};
pub use observer::{NoopObserver, TransferObserver};
pub use retry::RetryPolicy;
pub use verify::{check_bucket, verify_access, BucketPermissions, BucketReport};

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatewayErrorCode {
    NotFound,
    PermissionDenied,
    Transfer,
    Integrity,
    Io,
    Internal,
}

impl GatewayErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::Transfer => "transfer_failure",
            Self::Integrity => "integrity_failure",
            Self::Io => "io_error",
            Self::Internal => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,
}

impl GatewayError {
    #[must_use]
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for GatewayError {}
