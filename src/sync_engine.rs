// Copyright © DRL Mirror Contributors
// SPDX-License-Identifier: Apache-2.0

//! The incremental synchronization state machine. This is the hard
//! part of the crate: reconciling the locally stored version with the
//! server's latest version through chunked downloads, detecting and
//! recovering from inconsistency, and finalizing only once the
//! persisted entry count matches what the server declared.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};
use crate::local_store::LocalStore;
use crate::model::{SyncStatus, VersionInfo};
use crate::progress::{DownloadProgress, ProgressChannel};
use crate::remote_client::RemoteClient;

/// Consistency-retry budget: how many times the engine will wipe and
/// retry before giving up with [`SyncError::InconsistentState`].
pub const MAX_TRY: u32 = 3;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}

enum FinalizeOutcome {
    Installed,
    Wiped,
}

/// Outcome of one reconciliation attempt: either a resolved status, or
/// a signal that the local mirror was wiped and the caller should
/// retry. `update_from_server` loops over this up to `MAX_TRY` times
/// rather than recursing, since the retry count is already bounded.
enum AttemptOutcome {
    Done(SyncStatus),
    Inconsistent,
}

/// Reconciles the Local Store against the Remote Client. The sole
/// public entry point is [`SyncEngine::update_from_server`].
pub struct SyncEngine<R: RemoteClient, L: LocalStore> {
    remote: Arc<R>,
    store: Arc<L>,
    progress: ProgressChannel,
}

impl<R: RemoteClient, L: LocalStore> SyncEngine<R, L> {
    pub fn new(remote: Arc<R>, store: Arc<L>, progress: ProgressChannel) -> Self {
        Self {
            remote,
            store,
            progress,
        }
    }

    /// Reconciles the local mirror with the server's latest version,
    /// downloading and applying chunks as needed, and returns the
    /// resulting [`SyncStatus`]. Retries up to [`MAX_TRY`] times
    /// whenever an attempt detects the local mirror is inconsistent
    /// with its own recorded state and wipes it.
    pub async fn update_from_server(&self, cancel: &CancellationToken) -> Result<SyncStatus> {
        for attempt in 0..MAX_TRY {
            check_cancelled(cancel)?;
            match self.attempt_update(cancel).await? {
                AttemptOutcome::Done(status) => return Ok(status),
                AttemptOutcome::Inconsistent => {
                    tracing::debug!(attempt, "local mirror reset; retrying");
                }
            }
        }
        Err(SyncError::InconsistentState(MAX_TRY))
    }

    async fn attempt_update(&self, cancel: &CancellationToken) -> Result<AttemptOutcome> {
        // Step 0: read local, read remote.
        let mut local = self.store.load_or_init_status().await?;
        let remote = self.remote.get_status(local.current_version).await?;

        // Step 1: same-version path.
        if local.is_same_version(&remote) {
            let persisted = self.store.count_entries().await?;
            if persisted == remote.total_number_ucvi {
                local.last_check = Some(now_unix());
                self.store.update_status(&local).await?;
                return Ok(AttemptOutcome::Done(local));
            }
            tracing::warn!(
                current_version = local.current_version,
                persisted,
                expected = remote.total_number_ucvi,
                "local mirror diverged from its own recorded version; resetting"
            );
            return self.wipe_and_retry(&mut local).await;
        }

        // Step 2.1: reconcile target metadata.
        if local.is_target_version_consistent(&remote) {
            // A prior download already targets this exact remote state;
            // `last_chunk_saved` is preserved so the loop below resumes.
        } else if local.has_pending_download() && local.any_chunk_downloaded() {
            tracing::warn!(
                target_version = local.target_version,
                remote_version = remote.version,
                "resume attempted against a changed target; resetting"
            );
            return self.wipe_and_retry(&mut local).await;
        } else {
            local.adopt_target(&remote);
            self.store.update_status(&local).await?;
        }

        self.progress.emit(DownloadProgress::from_status(&local));

        // Step 2.2: chunk download loop.
        let mut finalized = false;
        while local.has_pending_download() {
            check_cancelled(cancel)?;

            let requested_index = local.last_chunk_saved + 1;
            let chunk = self
                .remote
                .get_chunk(local.current_version, requested_index)
                .await?;
            let chunk_info = chunk.as_version_info();

            tracing::debug!(
                version = chunk.version,
                chunk = chunk.chunk,
                total_chunks = chunk.total_chunks,
                "applying DRL chunk"
            );

            if !local.is_target_version_consistent(&chunk_info) {
                local.adopt_target(&chunk_info);
                if chunk.chunk != 1 {
                    // Target shifted mid-download and this fetch can't
                    // be applied as chunk 1 of the new target; loop
                    // back without saving so the next iteration refetches
                    // from last_chunk_saved + 1 == 1.
                    self.store.update_status(&local).await?;
                    continue;
                }
                // Falls through: apply this chunk as chunk 1 of the
                // newly observed target.
            }

            if chunk.is_first_snapshot_chunk() {
                let hashes = chunk.revoked_ucvi_list.clone().unwrap_or_default();
                self.store.reset_and_insert(&hashes).await?;
            } else if let Some(list) = &chunk.revoked_ucvi_list {
                self.store.bulk_insert_missing(list).await?;
            } else if let Some(delta) = &chunk.delta {
                self.store.bulk_insert_missing(&delta.insertions).await?;
                self.store.bulk_delete(&delta.deletions).await?;
            }

            local.target_total_number_ucvi = chunk.total_number_ucvi;
            local.last_chunk_saved = chunk.chunk;
            self.store.update_status(&local).await?;

            if !local.has_pending_download() {
                match self.finalize(&mut local, cancel).await? {
                    FinalizeOutcome::Installed => finalized = true,
                    FinalizeOutcome::Wiped => return Ok(AttemptOutcome::Inconsistent),
                }
            }

            self.progress.emit(DownloadProgress::from_status(&local));
        }

        // Step 2.3: post-loop finalize, for the resume case where the
        // loop body never ran (all chunks were already on disk from a
        // prior process) so step (f) above never got a chance to fire.
        if !finalized {
            let remote_recheck = self.remote.get_status(local.current_version).await?;
            if local.is_target_version(&remote_recheck) {
                match self.finalize(&mut local, cancel).await? {
                    FinalizeOutcome::Installed => {}
                    FinalizeOutcome::Wiped => return Ok(AttemptOutcome::Inconsistent),
                }
            }
        }

        Ok(AttemptOutcome::Done(local))
    }

    /// Step 3: promotes target metadata to current metadata once the
    /// persisted entry count confirms the download is complete and
    /// correct; otherwise wipes and signals the caller to retry.
    async fn finalize(
        &self,
        local: &mut SyncStatus,
        cancel: &CancellationToken,
    ) -> Result<FinalizeOutcome> {
        check_cancelled(cancel)?;
        let persisted = self.store.count_entries().await?;
        if persisted == local.target_total_number_ucvi {
            local.current_version = local.target_version;
            local.current_version_id = local.target_version_id.clone();
            local.last_check = Some(now_unix());
            self.store.update_status(local).await?;
            Ok(FinalizeOutcome::Installed)
        } else {
            tracing::warn!(
                expected = local.target_total_number_ucvi,
                persisted,
                "finalize count mismatch; resetting local mirror"
            );
            self.store.drop_entries().await?;
            local.reset();
            self.store.update_status(local).await?;
            Ok(FinalizeOutcome::Wiped)
        }
    }

    async fn wipe_and_retry(&self, local: &mut SyncStatus) -> Result<AttemptOutcome> {
        self.store.drop_entries().await?;
        local.reset();
        self.store.update_status(local).await?;
        Ok(AttemptOutcome::Inconsistent)
    }
}
