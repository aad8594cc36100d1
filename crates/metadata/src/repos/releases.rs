//! Release catalog repository.

use crate::error::MetadataResult;
use crate::models::{GamePatchRow, ProductFileRow, ProductVersionRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for published release records.
///
/// Rows are insert-only apart from the editable details of a version.
/// Publishing the same `(product_id, platform, version)` twice yields two
/// rows; lookups return the most recently inserted one.
#[async_trait]
pub trait ReleaseRepo: Send + Sync {
    /// Insert a version and its files in one transaction.
    ///
    /// Fails with `AlreadyExists` if a release was already recorded for the
    /// same upload.
    async fn insert_version(
        &self,
        version: &ProductVersionRow,
        files: &[ProductFileRow],
    ) -> MetadataResult<()>;

    /// Insert a patch record.
    ///
    /// Fails with `AlreadyExists` if a release was already recorded for the
    /// same upload.
    async fn insert_patch(&self, patch: &GamePatchRow) -> MetadataResult<()>;

    /// Most recent version row for a product, platform and version string.
    async fn get_latest_version(
        &self,
        product_id: &str,
        platform: &str,
        version: &str,
    ) -> MetadataResult<Option<ProductVersionRow>>;

    async fn get_version(&self, version_id: Uuid) -> MetadataResult<Option<ProductVersionRow>>;

    /// Files of a version, in their recorded order.
    async fn get_version_files(&self, version_id: Uuid) -> MetadataResult<Vec<ProductFileRow>>;

    /// All versions of a product on a platform, newest first.
    async fn list_versions(
        &self,
        product_id: &str,
        platform: &str,
    ) -> MetadataResult<Vec<ProductVersionRow>>;

    /// Most recent patch with the given name, optionally narrowed by its
    /// version endpoints.
    async fn get_patch(
        &self,
        product_id: &str,
        platform: &str,
        name: &str,
        from_version: Option<&str>,
        to_version: Option<&str>,
    ) -> MetadataResult<Option<GamePatchRow>>;

    /// Edit changelog and/or release date of a version. Fields passed as
    /// `None` are left untouched. Returns `false` if the version is unknown.
    async fn update_version_details(
        &self,
        version_id: Uuid,
        changelog: Option<&str>,
        release_date: Option<OffsetDateTime>,
    ) -> MetadataResult<bool>;

    /// The version row produced by an upload, if any.
    async fn get_version_by_upload(
        &self,
        upload_id: Uuid,
    ) -> MetadataResult<Option<ProductVersionRow>>;

    /// The patch row produced by an upload, if any.
    async fn get_patch_by_upload(&self, upload_id: Uuid) -> MetadataResult<Option<GamePatchRow>>;

    /// Number of release rows (versions and patches) produced by an upload.
    async fn count_releases_for_upload(&self, upload_id: Uuid) -> MetadataResult<u64>;
}
