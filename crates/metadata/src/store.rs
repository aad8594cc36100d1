//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::ReleaseRepo;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: ReleaseRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    /// Queries slower than this are logged. SQLite cannot cancel them.
    slow_query_threshold: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) a SQLite database and apply the schema.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // A single connection serialises writers and avoids lock contention.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            slow_query_threshold: Duration::from_secs(query_timeout_secs.unwrap_or(30)),
        };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "opened sqlite catalog");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run a query future, logging it if it exceeds the slow-query threshold.
    async fn timed<T>(&self, op: &'static str, fut: impl Future<Output = T>) -> T {
        let started = Instant::now();
        let out = fut.await;
        let elapsed = started.elapsed();
        if elapsed > self.slow_query_threshold {
            tracing::warn!(op, elapsed_ms = elapsed.as_millis() as u64, "slow metadata query");
        }
        out
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl ReleaseRepo for SqliteStore {
        async fn insert_version(
            &self,
            version: &ProductVersionRow,
            files: &[ProductFileRow],
        ) -> MetadataResult<()> {
            self.timed("insert_version", async {
                let mut tx = self.pool.begin().await?;

                // Upload ids are unique across both release tables.
                let taken: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM game_patches WHERE upload_id = ?)",
                )
                .bind(version.upload_id)
                .fetch_one(&mut *tx)
                .await?;
                if taken {
                    return Err(MetadataError::AlreadyExists(format!(
                        "release for upload {}",
                        version.upload_id
                    )));
                }

                sqlx::query(
                    r#"
                    INSERT INTO product_versions (
                        version_id, product_id, base_game_id, kind, platform, version,
                        storage_url, blob_key, file_size, hash, changelog, release_date,
                        upload_id, created_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(version.version_id)
                .bind(&version.product_id)
                .bind(&version.base_game_id)
                .bind(&version.kind)
                .bind(&version.platform)
                .bind(&version.version)
                .bind(&version.storage_url)
                .bind(&version.blob_key)
                .bind(version.file_size)
                .bind(&version.hash)
                .bind(&version.changelog)
                .bind(version.release_date)
                .bind(version.upload_id)
                .bind(version.created_at)
                .execute(&mut *tx)
                .await?;

                for file in files {
                    sqlx::query(
                        r#"
                        INSERT INTO product_files (
                            file_id, version_id, position, file_name, file_path,
                            file_size, hash, is_archive
                        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(file.file_id)
                    .bind(file.version_id)
                    .bind(file.position)
                    .bind(&file.file_name)
                    .bind(&file.file_path)
                    .bind(file.file_size)
                    .bind(&file.hash)
                    .bind(file.is_archive)
                    .execute(&mut *tx)
                    .await?;
                }

                tx.commit().await?;
                Ok::<(), MetadataError>(())
            })
            .await
        }

        async fn insert_patch(&self, patch: &GamePatchRow) -> MetadataResult<()> {
            self.timed("insert_patch", async {
                let mut tx = self.pool.begin().await?;

                let taken: bool = sqlx::query_scalar(
                    "SELECT EXISTS(SELECT 1 FROM product_versions WHERE upload_id = ?)",
                )
                .bind(patch.upload_id)
                .fetch_one(&mut *tx)
                .await?;
                if taken {
                    return Err(MetadataError::AlreadyExists(format!(
                        "release for upload {}",
                        patch.upload_id
                    )));
                }

                sqlx::query(
                    r#"
                    INSERT INTO game_patches (
                        patch_id, product_id, platform, name, from_version, to_version,
                        patch_url, blob_key, file_size, hash, release_date, upload_id,
                        created_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(patch.patch_id)
                .bind(&patch.product_id)
                .bind(&patch.platform)
                .bind(&patch.name)
                .bind(&patch.from_version)
                .bind(&patch.to_version)
                .bind(&patch.patch_url)
                .bind(&patch.blob_key)
                .bind(patch.file_size)
                .bind(&patch.hash)
                .bind(patch.release_date)
                .bind(patch.upload_id)
                .bind(patch.created_at)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok::<(), MetadataError>(())
            })
            .await
        }

        async fn get_latest_version(
            &self,
            product_id: &str,
            platform: &str,
            version: &str,
        ) -> MetadataResult<Option<ProductVersionRow>> {
            let row = self
                .timed(
                    "get_latest_version",
                    sqlx::query_as::<_, ProductVersionRow>(
                        r#"
                        SELECT * FROM product_versions
                        WHERE product_id = ? AND platform = ? AND version = ?
                        ORDER BY rowid DESC
                        LIMIT 1
                        "#,
                    )
                    .bind(product_id)
                    .bind(platform)
                    .bind(version)
                    .fetch_optional(&self.pool),
                )
                .await?;
            Ok(row)
        }

        async fn get_version(&self, version_id: Uuid) -> MetadataResult<Option<ProductVersionRow>> {
            let row = sqlx::query_as::<_, ProductVersionRow>(
                "SELECT * FROM product_versions WHERE version_id = ?",
            )
            .bind(version_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_version_files(&self, version_id: Uuid) -> MetadataResult<Vec<ProductFileRow>> {
            let rows = sqlx::query_as::<_, ProductFileRow>(
                "SELECT * FROM product_files WHERE version_id = ? ORDER BY position",
            )
            .bind(version_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_versions(
            &self,
            product_id: &str,
            platform: &str,
        ) -> MetadataResult<Vec<ProductVersionRow>> {
            let rows = self
                .timed(
                    "list_versions",
                    sqlx::query_as::<_, ProductVersionRow>(
                        r#"
                        SELECT * FROM product_versions
                        WHERE product_id = ? AND platform = ?
                        ORDER BY rowid DESC
                        "#,
                    )
                    .bind(product_id)
                    .bind(platform)
                    .fetch_all(&self.pool),
                )
                .await?;
            Ok(rows)
        }

        async fn get_patch(
            &self,
            product_id: &str,
            platform: &str,
            name: &str,
            from_version: Option<&str>,
            to_version: Option<&str>,
        ) -> MetadataResult<Option<GamePatchRow>> {
            let row = self
                .timed(
                    "get_patch",
                    sqlx::query_as::<_, GamePatchRow>(
                        r#"
                        SELECT * FROM game_patches
                        WHERE product_id = ? AND platform = ? AND name = ?
                          AND (? IS NULL OR from_version = ?)
                          AND (? IS NULL OR to_version = ?)
                        ORDER BY rowid DESC
                        LIMIT 1
                        "#,
                    )
                    .bind(product_id)
                    .bind(platform)
                    .bind(name)
                    .bind(from_version)
                    .bind(from_version)
                    .bind(to_version)
                    .bind(to_version)
                    .fetch_optional(&self.pool),
                )
                .await?;
            Ok(row)
        }

        async fn update_version_details(
            &self,
            version_id: Uuid,
            changelog: Option<&str>,
            release_date: Option<OffsetDateTime>,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                r#"
                UPDATE product_versions
                SET changelog = COALESCE(?, changelog),
                    release_date = COALESCE(?, release_date)
                WHERE version_id = ?
                "#,
            )
            .bind(changelog)
            .bind(release_date)
            .bind(version_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        }

        async fn get_version_by_upload(
            &self,
            upload_id: Uuid,
        ) -> MetadataResult<Option<ProductVersionRow>> {
            let row = sqlx::query_as::<_, ProductVersionRow>(
                "SELECT * FROM product_versions WHERE upload_id = ?",
            )
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_patch_by_upload(
            &self,
            upload_id: Uuid,
        ) -> MetadataResult<Option<GamePatchRow>> {
            let row =
                sqlx::query_as::<_, GamePatchRow>("SELECT * FROM game_patches WHERE upload_id = ?")
                    .bind(upload_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn count_releases_for_upload(&self, upload_id: Uuid) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar(
                r#"
                SELECT (SELECT COUNT(*) FROM product_versions WHERE upload_id = ?)
                     + (SELECT COUNT(*) FROM game_patches WHERE upload_id = ?)
                "#,
            )
            .bind(upload_id)
            .bind(upload_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(count as u64)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Full and addon versions
CREATE TABLE IF NOT EXISTS product_versions (
    version_id BLOB PRIMARY KEY,
    product_id TEXT NOT NULL,
    base_game_id TEXT,
    kind TEXT NOT NULL CHECK (kind IN ('full', 'addon')),
    platform TEXT NOT NULL,
    version TEXT NOT NULL,
    storage_url TEXT NOT NULL,
    blob_key TEXT NOT NULL,
    file_size INTEGER NOT NULL CHECK (file_size > 0),
    hash TEXT NOT NULL,
    changelog TEXT,
    release_date TEXT,
    upload_id BLOB NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    CHECK (kind = 'full' OR base_game_id IS NOT NULL)
);
CREATE INDEX IF NOT EXISTS idx_product_versions_lookup
    ON product_versions(product_id, platform, version);

-- Files of a version
CREATE TABLE IF NOT EXISTS product_files (
    file_id BLOB PRIMARY KEY,
    version_id BLOB NOT NULL REFERENCES product_versions(version_id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    file_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    hash TEXT NOT NULL,
    is_archive INTEGER NOT NULL DEFAULT 0,
    UNIQUE (version_id, position)
);

-- Patches between two versions
CREATE TABLE IF NOT EXISTS game_patches (
    patch_id BLOB PRIMARY KEY,
    product_id TEXT NOT NULL,
    platform TEXT NOT NULL,
    name TEXT NOT NULL,
    from_version TEXT NOT NULL,
    to_version TEXT NOT NULL,
    patch_url TEXT NOT NULL,
    blob_key TEXT NOT NULL,
    file_size INTEGER NOT NULL CHECK (file_size > 0),
    hash TEXT NOT NULL,
    release_date TEXT,
    upload_id BLOB NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_game_patches_lookup
    ON game_patches(product_id, platform, name);
"#;
