// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod ops;

pub use ops::{
    add_history_entry, add_new_dataset, remove_dataset, update_dataset,
    update_latest_history_entry,
};

use dataledger_model::{Dataset, Ledger, VersionEntry, VersionSelector};
use std::fmt::{Display, Formatter};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CRATE_NAME: &str = "dataledger-store";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum LedgerErrorCode {
    NotFound,
    Conflict,
    Corrupt,
    Io,
}

impl LedgerErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Corrupt => "corrupt_manifest",
            Self::Io => "io_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerError {
    pub code: LedgerErrorCode,
    pub message: String,
}

impl LedgerError {
    #[must_use]
    pub fn new(code: LedgerErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for LedgerError {}

/// Durable home of the ledger. Every save replaces the whole file through a
/// tmp-write + fsync + rename so a crash mid-write never leaves a truncated
/// manifest behind.
pub struct LedgerStore {
    pub path: PathBuf,
}

impl LedgerStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Absent file is an empty ledger, not an error.
    pub fn load(&self) -> Result<Ledger, LedgerError> {
        if !self.path.exists() {
            return Ok(Ledger::default());
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            LedgerError::new(
                LedgerErrorCode::Io,
                format!("failed to read manifest {}: {e}", self.path.display()),
            )
        })?;
        let ledger: Ledger = serde_json::from_str(&raw).map_err(|e| {
            LedgerError::new(
                LedgerErrorCode::Corrupt,
                format!("failed to parse manifest {}: {e}", self.path.display()),
            )
        })?;
        ledger.validate().map_err(|e| {
            LedgerError::new(
                LedgerErrorCode::Corrupt,
                format!("manifest {} is inconsistent: {e}", self.path.display()),
            )
        })?;
        Ok(ledger)
    }

    pub fn save(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        ledger.validate().map_err(|e| {
            LedgerError::new(
                LedgerErrorCode::Corrupt,
                format!("refusing to persist inconsistent ledger: {e}"),
            )
        })?;
        let mut bytes = serde_json::to_vec_pretty(ledger).map_err(|e| {
            LedgerError::new(LedgerErrorCode::Io, format!("failed to encode manifest: {e}"))
        })?;
        bytes.push(b'\n');

        let tmp = tmp_path(&self.path);
        let result = write_and_sync(&tmp, &bytes).and_then(|()| {
            fs::rename(&tmp, &self.path).map_err(|e| {
                LedgerError::new(
                    LedgerErrorCode::Io,
                    format!("failed to replace manifest {}: {e}", self.path.display()),
                )
            })?;
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    sync_dir(parent)?;
                }
            }
            Ok(())
        });
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    pub fn get_dataset(&self, name: &str) -> Result<Option<Dataset>, LedgerError> {
        Ok(self.load()?.get_dataset(name).cloned())
    }

    pub fn get_version_entry(
        &self,
        name: &str,
        selector: &VersionSelector,
    ) -> Result<Option<VersionEntry>, LedgerError> {
        Ok(self.load()?.get_version_entry(name, selector).cloned())
    }

    pub fn add_new_dataset(&self, dataset: Dataset) -> Result<(), LedgerError> {
        let mut ledger = self.load()?;
        ops::add_new_dataset(&mut ledger, dataset)?;
        self.save(&ledger)
    }

    pub fn update_dataset(&self, name: &str, new_dataset: Dataset) -> Result<(), LedgerError> {
        let mut ledger = self.load()?;
        ops::update_dataset(&mut ledger, name, new_dataset)?;
        self.save(&ledger)
    }

    pub fn add_history_entry(&self, name: &str, entry: VersionEntry) -> Result<(), LedgerError> {
        let mut ledger = self.load()?;
        ops::add_history_entry(&mut ledger, name, entry)?;
        self.save(&ledger)
    }

    pub fn update_latest_history_entry(
        &self,
        name: &str,
        final_entry: VersionEntry,
    ) -> Result<(), LedgerError> {
        let mut ledger = self.load()?;
        ops::update_latest_history_entry(&mut ledger, name, final_entry)?;
        self.save(&ledger)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "manifest.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    let mut file = File::create(path).map_err(|e| {
        LedgerError::new(
            LedgerErrorCode::Io,
            format!("failed to create {}: {e}", path.display()),
        )
    })?;
    file.write_all(bytes).map_err(|e| {
        LedgerError::new(
            LedgerErrorCode::Io,
            format!("failed to write {}: {e}", path.display()),
        )
    })?;
    file.sync_all().map_err(|e| {
        LedgerError::new(
            LedgerErrorCode::Io,
            format!("failed to sync {}: {e}", path.display()),
        )
    })
}

fn sync_dir(dir: &Path) -> Result<(), LedgerError> {
    let f = File::open(dir).map_err(|e| {
        LedgerError::new(
            LedgerErrorCode::Io,
            format!("failed to open directory {}: {e}", dir.display()),
        )
    })?;
    f.sync_all().map_err(|e| {
        LedgerError::new(
            LedgerErrorCode::Io,
            format!("failed to sync directory {}: {e}", dir.display()),
        )
    })
}
