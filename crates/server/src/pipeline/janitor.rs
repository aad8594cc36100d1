//! Background reclamation of finished sessions and their chunks.

use super::session::UploadSessionManager;
use depot_core::config::JanitorConfig;
use depot_core::UploadStatus;
use depot_storage::ChunkStore;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Outcome of one sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions removed from the registry.
    pub sessions_removed: usize,
    /// Chunk sets removed whose session no longer exists.
    pub orphans_removed: usize,
    /// Chunk objects deleted in total.
    pub chunks_deleted: usize,
}

/// Periodically removes stale sessions and orphaned chunk data.
pub struct SessionJanitor {
    sessions: Arc<UploadSessionManager>,
    chunks: ChunkStore,
    grace_period: time::Duration,
    interval: Duration,
}

impl SessionJanitor {
    pub fn new(
        sessions: Arc<UploadSessionManager>,
        chunks: ChunkStore,
        config: &JanitorConfig,
    ) -> Self {
        Self {
            sessions,
            chunks,
            grace_period: config.grace_period(),
            interval: config.interval(),
        }
    }

    /// Run one sweep at time `now`.
    ///
    /// Storage failures are logged and skipped; whatever was missed is
    /// retried on the next sweep through the orphan pass.
    pub async fn sweep_at(&self, now: OffsetDateTime) -> SweepReport {
        let mut report = SweepReport::default();

        for session in self.sessions.take_sweepable(now, self.grace_period) {
            report.sessions_removed += 1;
            crate::metrics::JANITOR_SESSIONS_SWEPT
                .with_label_values(&[session.status.as_str()])
                .inc();
            if session.status == UploadStatus::Expired {
                tracing::info!(upload_id = %session.id, "Removing expired upload session");
            }
            match self.chunks.delete_upload(&session.id).await {
                Ok(n) => report.chunks_deleted += n,
                Err(e) => tracing::warn!(
                    upload_id = %session.id,
                    error = %e,
                    "Failed to delete chunks of swept session"
                ),
            }
        }

        match self.chunks.list_uploads().await {
            Ok(owners) => {
                for upload_id in owners {
                    if self.sessions.contains(&upload_id) {
                        continue;
                    }
                    match self.chunks.delete_upload(&upload_id).await {
                        Ok(n) => {
                            report.orphans_removed += 1;
                            report.chunks_deleted += n;
                            crate::metrics::JANITOR_ORPHANS_REMOVED.inc();
                        }
                        Err(e) => tracing::warn!(
                            upload_id = %upload_id,
                            error = %e,
                            "Failed to delete orphaned chunks"
                        ),
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to list chunk store"),
        }

        if report != SweepReport::default() {
            tracing::info!(
                sessions = report.sessions_removed,
                orphans = report.orphans_removed,
                chunks = report.chunks_deleted,
                "Janitor sweep finished"
            );
        }
        report
    }

    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(OffsetDateTime::now_utc()).await
    }

    /// Spawn the periodic sweep loop.
    ///
    /// The first sweep runs immediately so chunk data left over from a
    /// previous process is reclaimed at startup.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }
}
