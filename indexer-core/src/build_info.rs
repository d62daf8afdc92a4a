//! Build metadata dropped next to the binary by the release pipeline.

use std::path::Path;

use chrono::DateTime;

use crate::error::{IndexerError, Result};

const PROJECT_VERSION_FILE: &str = "PROJECT_VERSION";
const PROJECT_COMMIT_FILE: &str = "PROJECT_COMMIT_HASH";
const PROJECT_BUILD_DATE_FILE: &str = "PROJECT_BUILD_DATE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub git_tag: String,
    pub git_hash: String,
    /// Unix seconds.
    pub build_date: u64,
}

/// Read `PROJECT_VERSION`, `PROJECT_COMMIT_HASH` and `PROJECT_BUILD_DATE`
/// (RFC3339) from `dir`. Any missing or unparseable file fails the read;
/// the caller decides whether that is fatal.
pub fn read_build_info(dir: impl AsRef<Path>) -> Result<BuildInfo> {
    let dir = dir.as_ref();

    let git_tag = read_trimmed(&dir.join(PROJECT_VERSION_FILE))?;
    let git_hash = read_trimmed(&dir.join(PROJECT_COMMIT_FILE))?;

    let raw_date = read_trimmed(&dir.join(PROJECT_BUILD_DATE_FILE))?;
    let build_date = DateTime::parse_from_rfc3339(&raw_date)
        .map_err(|e| IndexerError::Parse(format!("invalid build date {raw_date:?}: {e}")))?
        .timestamp() as u64;

    Ok(BuildInfo {
        git_tag,
        git_hash,
        build_date,
    })
}

fn read_trimmed(path: &Path) -> Result<String> {
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}
