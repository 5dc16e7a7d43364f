//! snapshot::artifacts
//!
//! On-disk artifact set for one snapshot.
//!
//! Each snapshot name owns one directory containing:
//!
//! - `tags.txt` - `<tag> <40-hex sha>` per line, or a `# No tags found`
//!   comment when the repository had none
//! - `branches.json` - current branch plus branch entries
//! - `commits.bundle` - git bundle, or a zero-byte placeholder meaning
//!   "no refs existed at backup time"
//! - `manifest.json` - filenames of the above, the production tag names,
//!   a timestamp, and the bundle's SHA-256 when one was written
//!
//! The same schema is reused by scenario exports so the workflow-under-test
//! can rehydrate state inside its container checkout.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::types::{Sha, TagName};
use crate::git::BranchEntry;

use super::SnapshotError;

/// File names inside a snapshot directory.
pub const TAGS_FILE: &str = "tags.txt";
pub const BRANCHES_FILE: &str = "branches.json";
pub const BUNDLE_FILE: &str = "commits.bundle";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Comment written to `tags.txt` when no tags existed.
pub const NO_TAGS_MARKER: &str = "# No tags found";

/// Branch portion of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchState {
    /// Branch checked out at backup time, or the detached-HEAD sentinel.
    pub current_branch: String,
    /// All recorded branches.
    pub branches: Vec<BranchEntry>,
}

/// Snapshot manifest, the entry point for loading an artifact set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub tags_file: String,
    pub branches_file: String,
    pub bundle_file: String,
    /// Tag names present at backup time, recorded independently of the tag
    /// list because scenario application may delete tags before the tag
    /// list is read.
    pub production_tags: Vec<TagName>,
    pub created_at: DateTime<Utc>,
    /// SHA-256 of the bundle contents; absent for the empty placeholder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_sha256: Option<String>,
}

/// State of the commit bundle on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleState {
    /// Zero-byte placeholder: no refs existed at backup time.
    Empty,
    /// No bundle file at all (snapshot predates bundling).
    Missing,
    /// A real bundle.
    File(PathBuf),
}

fn io_err(path: &Path, source: std::io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write the tag list file.
pub fn write_tags(dir: &Path, tags: &[(TagName, Sha)]) -> Result<(), SnapshotError> {
    let path = dir.join(TAGS_FILE);
    let body = if tags.is_empty() {
        format!("{NO_TAGS_MARKER}\n")
    } else {
        let mut body = String::new();
        for (name, sha) in tags {
            body.push_str(&format!("{name} {sha}\n"));
        }
        body
    };
    fs::write(&path, body).map_err(|e| io_err(&path, e))
}

/// Read the tag list file, skipping comment lines.
pub fn read_tags(dir: &Path) -> Result<Vec<(TagName, Sha)>, SnapshotError> {
    let path = dir.join(TAGS_FILE);
    let text = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let mut tags = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(name), Some(sha)) = (parts.next(), parts.next()) else {
            return Err(SnapshotError::Corrupt {
                path: path.clone(),
                message: format!("malformed tag line: {line}"),
            });
        };
        let name = TagName::new(name).map_err(|e| SnapshotError::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let sha = Sha::new(sha).map_err(|e| SnapshotError::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;
        tags.push((name, sha));
    }
    Ok(tags)
}

/// Write the branch list file.
pub fn write_branches(dir: &Path, state: &BranchState) -> Result<(), SnapshotError> {
    let path = dir.join(BRANCHES_FILE);
    let json = serde_json::to_string_pretty(state).map_err(|e| SnapshotError::Corrupt {
        path: path.clone(),
        message: e.to_string(),
    })?;
    fs::write(&path, json).map_err(|e| io_err(&path, e))
}

/// Read the branch list file.
pub fn read_branches(dir: &Path) -> Result<BranchState, SnapshotError> {
    let path = dir.join(BRANCHES_FILE);
    let text = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_json::from_str(&text).map_err(|e| SnapshotError::Corrupt {
        path,
        message: e.to_string(),
    })
}

/// Write the empty-bundle placeholder.
pub fn write_empty_bundle(dir: &Path) -> Result<(), SnapshotError> {
    let path = dir.join(BUNDLE_FILE);
    fs::write(&path, []).map_err(|e| io_err(&path, e))
}

/// Classify the bundle file for a snapshot directory.
pub fn bundle_state(dir: &Path) -> Result<BundleState, SnapshotError> {
    let path = dir.join(BUNDLE_FILE);
    match fs::metadata(&path) {
        Ok(meta) if meta.len() == 0 => Ok(BundleState::Empty),
        Ok(_) => Ok(BundleState::File(path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BundleState::Missing),
        Err(e) => Err(io_err(&path, e)),
    }
}

/// SHA-256 of a bundle file, hex-encoded.
pub fn bundle_checksum(path: &Path) -> Result<String, SnapshotError> {
    let bytes = fs::read(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Write the manifest.
pub fn write_manifest(dir: &Path, manifest: &Manifest) -> Result<(), SnapshotError> {
    let path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(manifest).map_err(|e| SnapshotError::Corrupt {
        path: path.clone(),
        message: e.to_string(),
    })?;
    fs::write(&path, json).map_err(|e| io_err(&path, e))
}

/// Read the manifest.
pub fn read_manifest(dir: &Path) -> Result<Manifest, SnapshotError> {
    let path = dir.join(MANIFEST_FILE);
    let text = fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_json::from_str(&text).map_err(|e| SnapshotError::Corrupt {
        path,
        message: e.to_string(),
    })
}
