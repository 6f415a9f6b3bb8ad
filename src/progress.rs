// Copyright © DRL Mirror Contributors
// SPDX-License-Identifier: Apache-2.0

//! `download_progress_changed` events: a lock-protected list of
//! callbacks invoked sequentially on the engine's task. A panicking
//! subscriber is caught and logged, never allowed to prevent the
//! remaining subscribers from running.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::model::SyncStatus;

/// One progress update, emitted by the Sync Engine as it advances
/// through a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadProgress {
    pub current_version: i64,
    pub target_version: i64,
    pub last_chunk_saved: u32,
    pub target_chunks_count: u32,
    pub target_chunk_size: u32,
    pub total_progress_percent: f32,
    pub is_completed: bool,
}

impl DownloadProgress {
    pub fn from_status(status: &SyncStatus) -> Self {
        let total_progress_percent = if status.target_chunks_count > 0 {
            status.last_chunk_saved as f32 / status.target_chunks_count as f32
        } else {
            0.0
        };
        let is_completed = status.target_chunks_count > 0
            && status.current_version_matches_target()
            && !status.has_pending_download();
        Self {
            current_version: status.current_version,
            target_version: status.target_version,
            last_chunk_saved: status.last_chunk_saved,
            target_chunks_count: status.target_chunks_count,
            target_chunk_size: status.target_chunk_size,
            total_progress_percent,
            is_completed,
        }
    }
}

type ProgressCallback = Box<dyn Fn(&DownloadProgress) + Send + Sync>;

/// A cloneable handle onto the subscriber list; the Sync Engine and the
/// Provider Facade share one instance.
#[derive(Clone)]
pub struct ProgressChannel {
    subscribers: Arc<Mutex<Vec<ProgressCallback>>>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl ProgressChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber. Subscribers run on the engine's task, in
    /// registration order.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&DownloadProgress) + Send + Sync + 'static,
    {
        self.subscribers.lock().push(Box::new(callback));
    }

    pub fn emit(&self, progress: DownloadProgress) {
        let subscribers = self.subscribers.lock();
        for subscriber in subscribers.iter() {
            let outcome = catch_unwind(AssertUnwindSafe(|| subscriber(&progress)));
            if outcome.is_err() {
                tracing::error!(
                    "a download_progress_changed subscriber panicked; continuing with remaining subscribers"
                );
            }
        }
    }
}
