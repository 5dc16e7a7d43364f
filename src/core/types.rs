//! core::types
//!
//! Strong types for the ref-state domain.
//!
//! # Types
//!
//! - [`TagName`] - Validated Git tag name
//! - [`BranchName`] - Validated Git branch name
//! - [`Sha`] - Full 40-hex commit identifier
//!
//! # Validation
//!
//! These types enforce validity at construction time. A snapshot or scenario
//! holding a `Sha` is guaranteed to hold something `git` can be asked to
//! resolve; malformed values cannot travel through the harness.
//!
//! # Examples
//!
//! ```
//! use gitrig::core::types::{BranchName, Sha, TagName};
//!
//! let tag = TagName::new("v0.2.1").unwrap();
//! let branch = BranchName::new("release/v1").unwrap();
//! let sha = Sha::new("abc123def4567890abc123def4567890abc12345").unwrap();
//!
//! assert!(TagName::new("bad..tag").is_err());
//! assert!(Sha::new("not-a-sha").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sentinel recorded as the current branch when HEAD is detached at backup
/// time. Restore never attempts to check this out.
pub const DETACHED_HEAD: &str = "(detached)";

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid tag name: {0}")]
    InvalidTagName(String),

    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid commit sha: {0}")]
    InvalidSha(String),
}

/// Validate a name against Git's refname rules (see `git check-ref-format`).
///
/// Shared by tags and branches; both live under `refs/` and obey the same
/// component rules.
fn validate_refname(name: &str, what: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{what} cannot be empty"));
    }
    if name == "@" {
        return Err(format!("{what} cannot be '@' (reserved)"));
    }
    if name.starts_with('.') || name.starts_with('-') {
        return Err(format!("{what} cannot start with '.' or '-'"));
    }
    if name.ends_with(".lock") {
        return Err(format!("{what} cannot end with '.lock'"));
    }
    if name.ends_with('/') {
        return Err(format!("{what} cannot end with '/'"));
    }
    for pattern in ["..", "@{", "//"] {
        if name.contains(pattern) {
            return Err(format!("{what} cannot contain '{pattern}'"));
        }
    }
    const INVALID_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];
    for c in INVALID_CHARS {
        if name.contains(c) {
            return Err(format!("{what} cannot contain '{c}'"));
        }
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Err(format!("{what} cannot contain control characters"));
    }
    for component in name.split('/') {
        if component.starts_with('.') {
            return Err(format!("{what} component cannot start with '.'"));
        }
        if component.ends_with(".lock") {
            return Err(format!("{what} component cannot end with '.lock'"));
        }
    }
    Ok(())
}

/// A validated Git tag name.
///
/// # Example
///
/// ```
/// use gitrig::core::types::TagName;
///
/// let tag = TagName::new("v1.0.0").unwrap();
/// assert_eq!(tag.as_str(), "v1.0.0");
///
/// assert!(TagName::new("").is_err());
/// assert!(TagName::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagName(String);

impl TagName {
    /// Create a new validated tag name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidTagName` if the name violates Git's
    /// refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate_refname(&name, "tag name").map_err(TypeError::InvalidTagName)?;
        Ok(Self(name))
    }

    /// Get the tag name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TagName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TagName> for String {
    fn from(name: TagName) -> Self {
        name.0
    }
}

impl AsRef<str> for TagName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TagName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated Git branch name.
///
/// # Example
///
/// ```
/// use gitrig::core::types::BranchName;
///
/// let name = BranchName::new("release/v1").unwrap();
/// assert_eq!(name.as_str(), "release/v1");
///
/// assert!(BranchName::new(".hidden").is_err());
/// assert!(BranchName::new("branch.lock").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's
    /// refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        validate_refname(&name, "branch name").map_err(TypeError::InvalidBranchName)?;
        Ok(Self(name))
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A full commit identifier (40 hex characters, normalized to lowercase).
///
/// Snapshots record full SHAs only; abbreviated forms would make restore
/// dependent on the object database state at restore time.
///
/// # Example
///
/// ```
/// use gitrig::core::types::Sha;
///
/// let sha = Sha::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(sha.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(sha.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha(String);

impl Sha {
    /// Create a new validated commit sha.
    ///
    /// The value is normalized to lowercase.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidSha` unless the string is exactly 40 hex
    /// characters.
    pub fn new(sha: impl Into<String>) -> Result<Self, TypeError> {
        let sha = sha.into().to_ascii_lowercase();
        if sha.len() != 40 {
            return Err(TypeError::InvalidSha(format!(
                "expected 40 hex characters, got {}",
                sha.len()
            )));
        }
        if !sha.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidSha("sha must be hexadecimal".into()));
        }
        Ok(Self(sha))
    }

    /// Get an abbreviated form (first `len` characters).
    pub fn short(&self, len: usize) -> &str {
        let end = len.min(self.0.len());
        &self.0[..end]
    }

    /// Get the sha as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Sha {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Sha> for String {
    fn from(sha: Sha) -> Self {
        sha.0
    }
}

impl AsRef<str> for Sha {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Sha {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
