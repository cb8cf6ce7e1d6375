// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod dataset;
mod entry;
mod ledger;
mod version;

pub const CRATE_NAME: &str = "dataledger-model";

pub use dataset::{versioned_object_key, Dataset};
pub use entry::VersionEntry;
pub use ledger::{Ledger, VersionSelector};
pub use version::VersionLabel;

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}
