//! Database models mapping to the catalog schema.

use crate::error::{MetadataError, MetadataResult};
use depot_core::{
    ContentHash, PatchRelease, Platform, ProductFile, ReleaseArtifact, UploadId, VersionKind,
    VersionRelease,
};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Versions
// =============================================================================

/// Full or addon version record.
#[derive(Debug, Clone, FromRow)]
pub struct ProductVersionRow {
    pub version_id: Uuid,
    pub product_id: String,
    pub base_game_id: Option<String>,
    /// "full" or "addon".
    pub kind: String,
    pub platform: String,
    pub version: String,
    pub storage_url: String,
    pub blob_key: String,
    pub file_size: i64,
    /// Lowercase hex SHA-256.
    pub hash: String,
    pub changelog: Option<String>,
    pub release_date: Option<OffsetDateTime>,
    pub upload_id: Uuid,
    pub created_at: OffsetDateTime,
}

/// One file belonging to a version.
#[derive(Debug, Clone, FromRow)]
pub struct ProductFileRow {
    pub file_id: Uuid,
    pub version_id: Uuid,
    /// Order within the version, starting at 0.
    pub position: i64,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub hash: String,
    pub is_archive: bool,
}

// =============================================================================
// Patches
// =============================================================================

/// Patch record. Has no file children.
#[derive(Debug, Clone, FromRow)]
pub struct GamePatchRow {
    pub patch_id: Uuid,
    pub product_id: String,
    pub platform: String,
    pub name: String,
    pub from_version: String,
    pub to_version: String,
    pub patch_url: String,
    pub blob_key: String,
    pub file_size: i64,
    pub hash: String,
    pub release_date: Option<OffsetDateTime>,
    pub upload_id: Uuid,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Conversions
// =============================================================================

fn size_to_db(size: u64) -> MetadataResult<i64> {
    i64::try_from(size).map_err(|_| MetadataError::Corrupt(format!("size {size} overflows i64")))
}

fn size_from_db(size: i64) -> MetadataResult<u64> {
    u64::try_from(size).map_err(|_| MetadataError::Corrupt(format!("negative size {size}")))
}

impl ProductVersionRow {
    /// Split a version release into its row and file rows.
    pub fn from_release(
        kind: VersionKind,
        release: &VersionRelease,
    ) -> MetadataResult<(Self, Vec<ProductFileRow>)> {
        let row = Self {
            version_id: release.version_id,
            product_id: release.product_id.clone(),
            base_game_id: release.base_game_id.clone(),
            kind: kind.as_str().to_string(),
            platform: release.platform.as_str().to_string(),
            version: release.version.clone(),
            storage_url: release.storage_url.clone(),
            blob_key: release.blob_key.clone(),
            file_size: size_to_db(release.file_size)?,
            hash: release.hash.to_hex(),
            changelog: release.changelog.clone(),
            release_date: release.release_date,
            upload_id: *release.upload_id.as_uuid(),
            created_at: release.created_at,
        };
        let files = release
            .files
            .iter()
            .enumerate()
            .map(|(position, file)| {
                Ok(ProductFileRow {
                    file_id: Uuid::new_v4(),
                    version_id: release.version_id,
                    position: position as i64,
                    file_name: file.file_name.clone(),
                    file_path: file.file_path.clone(),
                    file_size: size_to_db(file.file_size)?,
                    hash: file.hash.to_hex(),
                    is_archive: file.is_archive,
                })
            })
            .collect::<MetadataResult<Vec<_>>>()?;
        Ok((row, files))
    }

    /// Reassemble the domain artifact from a row and its files.
    pub fn into_artifact(self, files: Vec<ProductFileRow>) -> MetadataResult<ReleaseArtifact> {
        let kind = VersionKind::parse(&self.kind)?;
        let files = files
            .into_iter()
            .map(|f| {
                Ok(ProductFile {
                    file_name: f.file_name,
                    file_path: f.file_path,
                    file_size: size_from_db(f.file_size)?,
                    hash: ContentHash::from_hex(&f.hash)?,
                    is_archive: f.is_archive,
                })
            })
            .collect::<MetadataResult<Vec<_>>>()?;

        let release = VersionRelease {
            version_id: self.version_id,
            product_id: self.product_id,
            base_game_id: self.base_game_id,
            platform: self.platform.parse::<Platform>()?,
            version: self.version,
            storage_url: self.storage_url,
            blob_key: self.blob_key,
            file_size: size_from_db(self.file_size)?,
            hash: ContentHash::from_hex(&self.hash)?,
            changelog: self.changelog,
            release_date: self.release_date,
            upload_id: UploadId::from_uuid(self.upload_id),
            created_at: self.created_at,
            files,
        };
        Ok(ReleaseArtifact::from_version(kind, release))
    }
}

impl GamePatchRow {
    pub fn from_release(patch: &PatchRelease) -> MetadataResult<Self> {
        Ok(Self {
            patch_id: patch.patch_id,
            product_id: patch.product_id.clone(),
            platform: patch.platform.as_str().to_string(),
            name: patch.name.clone(),
            from_version: patch.from_version.clone(),
            to_version: patch.to_version.clone(),
            patch_url: patch.patch_url.clone(),
            blob_key: patch.blob_key.clone(),
            file_size: size_to_db(patch.file_size)?,
            hash: patch.hash.to_hex(),
            release_date: patch.release_date,
            upload_id: *patch.upload_id.as_uuid(),
            created_at: patch.created_at,
        })
    }

    pub fn into_release(self) -> MetadataResult<PatchRelease> {
        Ok(PatchRelease {
            patch_id: self.patch_id,
            product_id: self.product_id,
            platform: self.platform.parse::<Platform>()?,
            name: self.name,
            from_version: self.from_version,
            to_version: self.to_version,
            patch_url: self.patch_url,
            blob_key: self.blob_key,
            file_size: size_from_db(self.file_size)?,
            hash: ContentHash::from_hex(&self.hash)?,
            release_date: self.release_date,
            upload_id: UploadId::from_uuid(self.upload_id),
            created_at: self.created_at,
        })
    }
}
