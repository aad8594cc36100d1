//! Release artifacts produced by a completed upload.
//!
//! A completed upload becomes exactly one of three shapes: a full version of
//! a base game, a version of an addon, or a patch between two versions. The
//! two version shapes carry a file list; a patch is a single opaque blob.

use crate::hash::ContentHash;
use crate::upload::UploadId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// File name suffixes treated as archives (informational only).
const ARCHIVE_SUFFIXES: &[&str] = &[
    ".zip", ".7z", ".rar", ".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tbz2", ".tar.xz", ".txz",
    ".gz", ".bz2", ".xz",
];

/// Kind of release a completion produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// Full version of a base game.
    GameVersion,
    /// Version of an addon for a base game.
    GameAddon,
    /// Delta between two published versions.
    GamePatch,
}

/// Target platform of a release.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
    Linux,
    Android,
    Ios,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::Macos => "macos",
            Self::Linux => "linux",
            Self::Android => "android",
            Self::Ios => "ios",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "windows" => Ok(Self::Windows),
            "macos" => Ok(Self::Macos),
            "linux" => Ok(Self::Linux),
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            _ => Err(crate::Error::InvalidPlatform(s.to_string())),
        }
    }
}

/// Whether a stored version row is a base game or an addon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionKind {
    Full,
    Addon,
}

impl VersionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Addon => "addon",
        }
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "full" => Ok(Self::Full),
            "addon" => Ok(Self::Addon),
            other => Err(crate::Error::field("kind", format!("unknown kind {other:?}"))),
        }
    }
}

/// One logical file inside a version release.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFile {
    pub file_name: String,
    /// Object store key of the file.
    pub file_path: String,
    pub file_size: u64,
    pub hash: ContentHash,
    /// Name carries a recognised archive suffix. No extraction happens.
    pub is_archive: bool,
}

/// A full or addon version release.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionRelease {
    pub version_id: Uuid,
    /// Game id for full versions, addon id for addon versions.
    pub product_id: String,
    /// Base game, always set for addons.
    pub base_game_id: Option<String>,
    pub platform: Platform,
    pub version: String,
    pub storage_url: String,
    pub blob_key: String,
    pub file_size: u64,
    pub hash: ContentHash,
    pub changelog: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub release_date: Option<OffsetDateTime>,
    pub upload_id: UploadId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub files: Vec<ProductFile>,
}

/// A patch between two versions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatchRelease {
    pub patch_id: Uuid,
    pub product_id: String,
    pub platform: Platform,
    pub name: String,
    pub from_version: String,
    pub to_version: String,
    pub patch_url: String,
    pub blob_key: String,
    pub file_size: u64,
    pub hash: ContentHash,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub release_date: Option<OffsetDateTime>,
    pub upload_id: UploadId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The persisted, immutable result of a completed upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReleaseArtifact {
    FullVersion(VersionRelease),
    AddonVersion(VersionRelease),
    Patch(PatchRelease),
}

impl ReleaseArtifact {
    /// Wrap a version row according to its kind.
    pub fn from_version(kind: VersionKind, release: VersionRelease) -> Self {
        match kind {
            VersionKind::Full => Self::FullVersion(release),
            VersionKind::Addon => Self::AddonVersion(release),
        }
    }

    pub fn upload_id(&self) -> UploadId {
        match self {
            Self::FullVersion(v) | Self::AddonVersion(v) => v.upload_id,
            Self::Patch(p) => p.upload_id,
        }
    }

    pub fn blob_key(&self) -> &str {
        match self {
            Self::FullVersion(v) | Self::AddonVersion(v) => &v.blob_key,
            Self::Patch(p) => &p.blob_key,
        }
    }

    pub fn file_size(&self) -> u64 {
        match self {
            Self::FullVersion(v) | Self::AddonVersion(v) => v.file_size,
            Self::Patch(p) => p.file_size,
        }
    }

    pub fn hash(&self) -> ContentHash {
        match self {
            Self::FullVersion(v) | Self::AddonVersion(v) => v.hash,
            Self::Patch(p) => p.hash,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::FullVersion(_) => "full_version",
            Self::AddonVersion(_) => "addon_version",
            Self::Patch(_) => "patch",
        }
    }
}

/// Editable metadata of a published version.
///
/// Storage location, size and hash are deliberately absent.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateReleaseRequest {
    #[serde(default)]
    pub changelog: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub release_date: Option<OffsetDateTime>,
}

/// Whether a file name ends in a recognised archive suffix.
pub fn is_archive_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ARCHIVE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Validate one component of an object key.
///
/// Components must be non-empty and free of path separators and `..`.
pub fn validate_key_component(field: &'static str, value: &str) -> crate::Result<()> {
    if value.trim().is_empty() {
        return Err(crate::Error::field(field, "must not be empty"));
    }
    if value.contains('/') || value.contains('\\') || value.contains("..") {
        return Err(crate::Error::field(
            field,
            format!("{value:?} contains a path separator or '..'"),
        ));
    }
    if value.chars().any(char::is_control) {
        return Err(crate::Error::field(field, "contains control characters"));
    }
    Ok(())
}
