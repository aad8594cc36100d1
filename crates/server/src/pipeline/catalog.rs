//! Classifying completions into release shapes and persisting them.
//!
//! [`ReleasePlan`] is built from a completion request before any blob is
//! read, so every branch-specific validation failure happens up front.
//! [`ReleaseCatalogWriter`] is the only component that talks to the
//! metadata store.

use super::assembler::AssembledBlob;
use super::error::{PipelineError, PipelineResult};
use depot_core::release::{is_archive_name, validate_key_component};
use depot_core::{
    CompleteUploadRequest, ContentHash, FileType, PatchRelease, Platform, ProductFile,
    ReleaseArtifact, UpdateReleaseRequest, UploadId, VersionKind, VersionRelease,
};
use depot_metadata::models::{GamePatchRow, ProductVersionRow};
use depot_metadata::MetadataStore;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// The release shape a completion will produce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReleaseTarget {
    Version {
        kind: VersionKind,
        product_id: String,
        base_game_id: Option<String>,
        version: String,
        changelog: Option<String>,
    },
    Patch {
        product_id: String,
        from_version: String,
        to_version: String,
    },
}

/// A validated completion request.
#[derive(Clone, Debug)]
pub struct ReleasePlan {
    pub target: ReleaseTarget,
    pub platform: Platform,
    pub final_file_name: String,
    pub release_date: Option<OffsetDateTime>,
    /// Whole-file hash declared at completion time.
    pub declared_hash: Option<ContentHash>,
}

fn required(field: &'static str, value: Option<&str>) -> PipelineResult<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(PipelineError::InvalidArgument(format!("{field} is required"))),
    }
}

impl ReleasePlan {
    /// Validate a completion request and pick its release shape.
    pub fn from_request(req: &CompleteUploadRequest) -> PipelineResult<Self> {
        let game_id = required("game_id", Some(req.game_id.as_str()))?;
        validate_key_component("game_id", &game_id)?;
        validate_key_component("final_file_name", &req.final_file_name)?;

        let target = match req.file_type {
            FileType::GameVersion => ReleaseTarget::Version {
                kind: VersionKind::Full,
                product_id: game_id,
                base_game_id: None,
                version: required("version", Some(req.version.as_str()))?,
                changelog: req.changelog.clone(),
            },
            FileType::GameAddon => {
                let addon_id = required("addon_id", req.addon_id.as_deref())?;
                validate_key_component("addon_id", &addon_id)?;
                ReleaseTarget::Version {
                    kind: VersionKind::Addon,
                    product_id: addon_id,
                    base_game_id: Some(game_id),
                    version: required("version", Some(req.version.as_str()))?,
                    changelog: req.changelog.clone(),
                }
            }
            FileType::GamePatch => ReleaseTarget::Patch {
                product_id: game_id,
                from_version: required("from_version", req.from_version.as_deref())?,
                to_version: required("to_version", req.to_version.as_deref())?,
            },
        };

        match &target {
            ReleaseTarget::Version { version, .. } => validate_key_component("version", version)?,
            ReleaseTarget::Patch {
                from_version,
                to_version,
                ..
            } => {
                validate_key_component("from_version", from_version)?;
                validate_key_component("to_version", to_version)?;
            }
        }

        let declared_hash = req
            .sha256
            .as_deref()
            .map(ContentHash::from_hex)
            .transpose()?;

        Ok(Self {
            target,
            platform: req.platform,
            final_file_name: req.final_file_name.clone(),
            release_date: req.release_date,
            declared_hash,
        })
    }

    /// Object key the assembled blob is published under.
    pub fn blob_key(&self, upload_id: &UploadId) -> String {
        match &self.target {
            ReleaseTarget::Version {
                product_id,
                version,
                ..
            } => format!(
                "releases/{product_id}/{}/{version}/{upload_id}/{}",
                self.platform, self.final_file_name
            ),
            ReleaseTarget::Patch {
                product_id,
                from_version,
                to_version,
            } => format!(
                "patches/{product_id}/{}/{from_version}-{to_version}/{upload_id}/{}",
                self.platform, self.final_file_name
            ),
        }
    }

    /// Build the artifact describing a verified blob.
    pub fn into_artifact(self, upload_id: UploadId, blob: &AssembledBlob) -> ReleaseArtifact {
        let now = OffsetDateTime::now_utc();
        match self.target {
            ReleaseTarget::Version {
                kind,
                product_id,
                base_game_id,
                version,
                changelog,
            } => {
                let file = ProductFile {
                    is_archive: is_archive_name(&self.final_file_name),
                    file_name: self.final_file_name,
                    file_path: blob.key.clone(),
                    file_size: blob.size,
                    hash: blob.hash,
                };
                ReleaseArtifact::from_version(
                    kind,
                    VersionRelease {
                        version_id: Uuid::new_v4(),
                        product_id,
                        base_game_id,
                        platform: self.platform,
                        version,
                        storage_url: blob.url.clone(),
                        blob_key: blob.key.clone(),
                        file_size: blob.size,
                        hash: blob.hash,
                        changelog,
                        release_date: self.release_date,
                        upload_id,
                        created_at: now,
                        files: vec![file],
                    },
                )
            }
            ReleaseTarget::Patch {
                product_id,
                from_version,
                to_version,
            } => ReleaseArtifact::Patch(PatchRelease {
                patch_id: Uuid::new_v4(),
                product_id,
                platform: self.platform,
                name: self.final_file_name,
                from_version,
                to_version,
                patch_url: blob.url.clone(),
                blob_key: blob.key.clone(),
                file_size: blob.size,
                hash: blob.hash,
                release_date: self.release_date,
                upload_id,
                created_at: now,
            }),
        }
    }
}

/// Reads and writes release records.
#[derive(Clone)]
pub struct ReleaseCatalogWriter {
    metadata: Arc<dyn MetadataStore>,
}

impl ReleaseCatalogWriter {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self { metadata }
    }

    pub fn store(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    /// Persist an artifact in one transaction.
    pub async fn persist(&self, artifact: &ReleaseArtifact) -> PipelineResult<()> {
        match artifact {
            ReleaseArtifact::FullVersion(release) => {
                let (row, files) = ProductVersionRow::from_release(VersionKind::Full, release)?;
                self.metadata.insert_version(&row, &files).await?;
            }
            ReleaseArtifact::AddonVersion(release) => {
                let (row, files) = ProductVersionRow::from_release(VersionKind::Addon, release)?;
                self.metadata.insert_version(&row, &files).await?;
            }
            ReleaseArtifact::Patch(patch) => {
                let row = GamePatchRow::from_release(patch)?;
                self.metadata.insert_patch(&row).await?;
            }
        }
        tracing::info!(
            upload_id = %artifact.upload_id(),
            kind = artifact.kind_str(),
            blob_key = artifact.blob_key(),
            "Release recorded"
        );
        Ok(())
    }

    /// Whether a release was already recorded for an upload.
    pub async fn has_release_for(&self, upload_id: &UploadId) -> PipelineResult<bool> {
        let count = self
            .metadata
            .count_releases_for_upload(*upload_id.as_uuid())
            .await?;
        Ok(count > 0)
    }

    /// The release recorded for an upload, if one was committed.
    pub async fn release_for_upload(
        &self,
        upload_id: &UploadId,
    ) -> PipelineResult<Option<ReleaseArtifact>> {
        let uuid = *upload_id.as_uuid();
        if let Some(row) = self.metadata.get_version_by_upload(uuid).await? {
            return Ok(Some(self.load_version(row).await?));
        }
        let patch = self.metadata.get_patch_by_upload(uuid).await?;
        Ok(patch
            .map(GamePatchRow::into_release)
            .transpose()?
            .map(ReleaseArtifact::Patch))
    }

    async fn load_version(&self, row: ProductVersionRow) -> PipelineResult<ReleaseArtifact> {
        let files = self.metadata.get_version_files(row.version_id).await?;
        Ok(row.into_artifact(files)?)
    }

    /// Most recent release of `version` for a product and platform.
    pub async fn get_release_by_version(
        &self,
        product_id: &str,
        platform: Platform,
        version: &str,
    ) -> PipelineResult<Option<ReleaseArtifact>> {
        match self
            .metadata
            .get_latest_version(product_id, platform.as_str(), version)
            .await?
        {
            Some(row) => Ok(Some(self.load_version(row).await?)),
            None => Ok(None),
        }
    }

    /// Every version of a product on a platform, newest first.
    pub async fn list_releases(
        &self,
        product_id: &str,
        platform: Platform,
    ) -> PipelineResult<Vec<ReleaseArtifact>> {
        let rows = self
            .metadata
            .list_versions(product_id, platform.as_str())
            .await?;
        let mut releases = Vec::with_capacity(rows.len());
        for row in rows {
            releases.push(self.load_version(row).await?);
        }
        Ok(releases)
    }

    pub async fn get_patch(
        &self,
        product_id: &str,
        platform: Platform,
        name: &str,
        from_version: Option<&str>,
        to_version: Option<&str>,
    ) -> PipelineResult<Option<PatchRelease>> {
        let row = self
            .metadata
            .get_patch(product_id, platform.as_str(), name, from_version, to_version)
            .await?;
        Ok(row.map(GamePatchRow::into_release).transpose()?)
    }

    /// Edit changelog and release date of a version.
    ///
    /// Returns the updated release, or `None` if the version is unknown.
    pub async fn update_release_details(
        &self,
        version_id: Uuid,
        req: &UpdateReleaseRequest,
    ) -> PipelineResult<Option<ReleaseArtifact>> {
        let updated = self
            .metadata
            .update_version_details(version_id, req.changelog.as_deref(), req.release_date)
            .await?;
        if !updated {
            return Ok(None);
        }
        match self.metadata.get_version(version_id).await? {
            Some(row) => Ok(Some(self.load_version(row).await?)),
            None => Ok(None),
        }
    }
}
