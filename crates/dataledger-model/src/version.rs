// SPDX-License-Identifier: Apache-2.0

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Version label of the form `v1`, `v2`, … Numbers start at 1 and are
/// compared numerically, not lexically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionLabel(u64);

impl VersionLabel {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let s = input.trim();
        let digits = s
            .strip_prefix('v')
            .ok_or_else(|| ValidationError(format!("version label '{s}' must start with 'v'")))?;
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError(format!(
                "version label '{s}' must be 'v' followed by digits"
            )));
        }
        let number: u64 = digits
            .parse()
            .map_err(|_| ValidationError(format!("version label '{s}' is out of range")))?;
        if number == 0 {
            return Err(ValidationError("version numbers start at v1".to_string()));
        }
        Ok(Self(number))
    }

    #[must_use]
    pub const fn first() -> Self {
        Self(1)
    }

    #[must_use]
    pub const fn number(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for VersionLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl TryFrom<String> for VersionLabel {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionLabel> for String {
    fn from(value: VersionLabel) -> Self {
        value.to_string()
    }
}
