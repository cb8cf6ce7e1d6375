// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod dump;

pub const CRATE_NAME: &str = "dataledger-diff";

use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use tracing::debug;

#[derive(Debug)]
pub struct DiffError(pub String);

impl Display for DiffError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for DiffError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DiffProvider {
    SqldiffCli,
    CanonicalDumpFallback,
}

impl DiffProvider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SqldiffCli => "sqldiff_cli",
            Self::CanonicalDumpFallback => "canonical_dump_fallback",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiffOutput {
    pub full: String,
    pub summary: String,
    pub provider: DiffProvider,
}

/// Structural diff between two SQLite files. The native `sqldiff` tool is
/// preferred; when it is not installed both databases are dumped to a
/// canonical textual form and diffed line by line with a synthesized
/// summary. The two providers' summary formats are independently
/// acceptable, not required to match.
pub struct DiffEngine {
    use_native: bool,
    sqldiff_program: String,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            use_native: true,
            sqldiff_program: "sqldiff".to_string(),
        }
    }

    /// Skips the native tool entirely; used where deterministic fallback
    /// output is required regardless of the host's installed tools.
    #[must_use]
    pub fn fallback_only() -> Self {
        Self {
            use_native: false,
            sqldiff_program: "sqldiff".to_string(),
        }
    }

    #[must_use]
    pub fn with_program(mut self, program: String) -> Self {
        self.sqldiff_program = program;
        self
    }

    pub fn generate(&self, old_file: &Path, new_file: &Path) -> Result<DiffOutput, DiffError> {
        if self.use_native {
            match self.run_sqldiff(old_file, new_file) {
                Ok(output) => return Ok(output),
                Err(NativeDiffFailure::NotInstalled) => {
                    debug!(program = %self.sqldiff_program, "native diff tool not installed; using fallback");
                }
                Err(NativeDiffFailure::Failed(message)) => {
                    debug!(%message, "native diff tool failed; using fallback");
                }
            }
        }
        fallback_diff(old_file, new_file)
    }

    fn run_sqldiff(&self, old_file: &Path, new_file: &Path) -> Result<DiffOutput, NativeDiffFailure> {
        let full = self.sqldiff_once(&[old_file, new_file], &[])?;
        let summary = self.sqldiff_once(&[old_file, new_file], &["--summary"])?;
        Ok(DiffOutput {
            full,
            summary,
            provider: DiffProvider::SqldiffCli,
        })
    }

    fn sqldiff_once(&self, files: &[&Path], flags: &[&str]) -> Result<String, NativeDiffFailure> {
        let output = Command::new(&self.sqldiff_program)
            .args(flags)
            .args(files)
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    NativeDiffFailure::NotInstalled
                } else {
                    NativeDiffFailure::Failed(e.to_string())
                }
            })?;
        if !output.status.success() {
            return Err(NativeDiffFailure::Failed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| NativeDiffFailure::Failed(format!("non-utf8 diff output: {e}")))
    }
}

enum NativeDiffFailure {
    NotInstalled,
    Failed(String),
}

/// Dump both databases to canonical SQL text and compute a line-level
/// difference. Every line has a deterministic position in the dump, so a
/// multiset comparison yields exact addition/deletion sets.
fn fallback_diff(old_file: &Path, new_file: &Path) -> Result<DiffOutput, DiffError> {
    let old_lines = dump::canonical_dump(old_file)?;
    let new_lines = dump::canonical_dump(new_file)?;

    let (removed, added) = dump::line_difference(&old_lines, &new_lines);

    let mut full = String::new();
    full.push_str(&format!("--- {}\n", file_label(old_file)));
    full.push_str(&format!("+++ {}\n", file_label(new_file)));
    for line in &removed {
        full.push_str(&format!("-{line}\n"));
    }
    for line in &added {
        full.push_str(&format!("+{line}\n"));
    }

    let summary = format!(
        "# summary: {} additions, {} deletions\n",
        added.len(),
        removed.len()
    );

    Ok(DiffOutput {
        full,
        summary,
        provider: DiffProvider::CanonicalDumpFallback,
    })
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Bounds `text` to at most `max_lines` lines, appending an explicit marker
/// naming how much was dropped.
#[must_use]
pub fn truncate_lines(text: &str, max_lines: usize) -> String {
    let total = text.lines().count();
    if total <= max_lines {
        return text.to_string();
    }
    let kept = text.lines().take(max_lines).collect::<Vec<_>>().join("\n");
    let omitted = total - max_lines;
    format!("{kept}\n… {omitted} more lines omitted")
}

#[must_use]
pub fn line_count(text: &str) -> usize {
    text.lines().count()
}
