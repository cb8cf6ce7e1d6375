#![forbid(unsafe_code)]

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

pub const CRATE_NAME: &str = "dataledger-core";

pub const ENV_ENDPOINT_URL: &str = "DATALEDGER_ENDPOINT_URL";
pub const ENV_AUTH_TOKEN: &str = "DATALEDGER_AUTH_TOKEN";
pub const ENV_PRODUCTION_BUCKET: &str = "DATALEDGER_PRODUCTION_BUCKET";
pub const ENV_STAGING_BUCKET: &str = "DATALEDGER_STAGING_BUCKET";
pub const ENV_MANIFEST_PATH: &str = "DATALEDGER_MANIFEST_PATH";
pub const ENV_LOG_JSON: &str = "DATALEDGER_LOG_JSON";
pub const ENV_MAX_SUMMARY_LINES: &str = "DATALEDGER_MAX_SUMMARY_LINES";
pub const ENV_MAX_DETAIL_LINES: &str = "DATALEDGER_MAX_DETAIL_LINES";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExitCode {
    Success = 0,
    Usage = 2,
    Validation = 3,
    DependencyFailure = 4,
    Internal = 10,
}

impl ExitCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Usage => "usage",
            Self::Validation => "validation",
            Self::DependencyFailure => "dependency_failure",
            Self::Internal => "internal",
        }
    }
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

const HASH_CHUNK_BYTES: usize = 64 * 1024;

/// Streams the file through SHA-256 in fixed-size chunks; the whole file is
/// never resident in memory.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut chunk = vec![0_u8; HASH_CHUNK_BYTES];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[must_use]
pub fn is_hex_digest(input: &str) -> bool {
    input.len() == 64 && input.chars().all(|c| c.is_ascii_hexdigit())
}
