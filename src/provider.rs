// Copyright © DRL Mirror Contributors
// SPDX-License-Identifier: Apache-2.0

//! The crate's public entry point. Wraps the Sync Engine behind a
//! freshness policy and a Single-Flight Runner so that concurrent
//! `is_revoked` callers share one refresh.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

use crate::config::BlacklistOptions;
use crate::error::Result;
use crate::hashing::hash_ucvi;
use crate::local_store::{LocalStore, RocksDbLocalStore};
use crate::progress::{DownloadProgress, ProgressChannel};
use crate::remote_client::{HttpRemoteClient, RemoteClient};
use crate::single_flight::SingleFlightRunner;
use crate::sync_engine::SyncEngine;

/// The single DRL source this crate mirrors; exactly one upstream
/// issuer is supported per instance.
pub const SUPPORTED_COUNTRY: &str = "IT";

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Public facade over the blacklist mirror. Cheap to clone; clones share
/// the same underlying store, remote client, and in-flight refresh.
pub struct DrlBlacklistProvider<R: RemoteClient, L: LocalStore> {
    engine: Arc<SyncEngine<R, L>>,
    store: Arc<L>,
    runner: Arc<SingleFlightRunner<Result<()>>>,
    progress: ProgressChannel,
    options: BlacklistOptions,
    last_refresh_attempt: AtomicI64,
}

/// The provider built from the teacher's default stack: `reqwest` over
/// HTTP and RocksDB on disk.
pub type DefaultProvider = DrlBlacklistProvider<HttpRemoteClient, RocksDbLocalStore>;

impl DefaultProvider {
    /// Opens the local store at `options.store_path()` and wires it to
    /// `base_url` via [`HttpRemoteClient`].
    pub fn open(base_url: reqwest::Url, options: BlacklistOptions) -> Result<Self> {
        let store = RocksDbLocalStore::open(options.store_path())?;
        let remote = HttpRemoteClient::new(base_url);
        Ok(Self::new(Arc::new(remote), Arc::new(store), options))
    }
}

impl<R: RemoteClient + 'static, L: LocalStore + 'static> DrlBlacklistProvider<R, L> {
    pub fn new(remote: Arc<R>, store: Arc<L>, options: BlacklistOptions) -> Self {
        let progress = ProgressChannel::new();
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&remote),
            Arc::clone(&store),
            progress.clone(),
        ));
        Self {
            engine,
            store,
            runner: Arc::new(SingleFlightRunner::new()),
            progress,
            options,
            last_refresh_attempt: AtomicI64::new(0),
        }
    }

    /// Registers a subscriber for [`DownloadProgress`] events.
    pub fn on_download_progress<F>(&self, callback: F)
    where
        F: Fn(&DownloadProgress) + Send + Sync + 'static,
    {
        self.progress.subscribe(callback);
    }

    /// The single ISO country code this instance mirrors. Every other
    /// code returns `false`.
    pub fn is_supported_country(&self, country_code: &str) -> bool {
        country_code.eq_ignore_ascii_case(SUPPORTED_COUNTRY)
    }

    /// Unconditionally triggers a refresh (via the Single-Flight
    /// Runner) and awaits its outcome, ignoring freshness timers.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<()> {
        self.trigger_refresh(cancel).await
    }

    /// Applies the freshness policy and answers whether `identifier`'s
    /// hash is present in the local mirror.
    pub async fn is_revoked(&self, identifier: &str, cancel: &CancellationToken) -> Result<bool> {
        let status = self.store.load_or_init_status().await?;
        let now = now_unix();
        // A never-synced mirror (`last_check == None`) is treated as
        // infinitely stale: `now - 0` always exceeds `max_file_age`.
        let last_check = status.last_check.unwrap_or(0);

        if now - last_check > self.options.max_file_age.as_secs() as i64 {
            self.trigger_refresh(cancel).await?;
        } else if now - last_check > self.options.refresh_interval.as_secs() as i64
            || status.has_pending_download()
        {
            let last_attempt = self.last_refresh_attempt.load(Ordering::SeqCst);
            if now - last_attempt > self.options.min_refresh_interval.as_secs() as i64 {
                if self.options.use_available_values_while_refreshing {
                    self.spawn_background_refresh(cancel.clone());
                } else if let Err(err) = self.trigger_refresh(cancel).await {
                    // Not yet beyond max_file_age: serve the stale
                    // mirror rather than surfacing the error.
                    tracing::warn!(error = ?err, "refresh failed within max_file_age; serving stale mirror");
                }
            }
        }

        let hashed = hash_ucvi(identifier);
        self.store.contains_hashed_ucvi(&hashed).await
    }

    /// Starts (or attaches to) a refresh through the Single-Flight
    /// Runner and awaits its result.
    async fn trigger_refresh(&self, cancel: &CancellationToken) -> Result<()> {
        self.last_refresh_attempt.store(now_unix(), Ordering::SeqCst);
        let engine = Arc::clone(&self.engine);
        let cancel = cancel.clone();
        let result = SingleFlightRunner::run_single_task(Arc::clone(&self.runner), move || async move {
            engine.update_from_server(&cancel).await.map(|_| ())
        })
        .await;
        match &*result {
            Ok(()) => Ok(()),
            Err(err) => Err(err.clone()),
        }
    }

    /// Fires a refresh on a detached task and returns immediately,
    /// serving the existing (possibly stale) mirror to the current
    /// caller. Errors from the background task are logged, not
    /// surfaced, matching `use_available_values_while_refreshing`.
    fn spawn_background_refresh(&self, cancel: CancellationToken) {
        self.last_refresh_attempt.store(now_unix(), Ordering::SeqCst);
        let engine = Arc::clone(&self.engine);
        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            let result = SingleFlightRunner::run_single_task(runner, move || async move {
                engine.update_from_server(&cancel).await.map(|_| ())
            })
            .await;
            if let Err(err) = &*result {
                tracing::warn!(error = ?err, "background refresh failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChunkData, VersionInfo};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingRemote {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteClient for CountingRemote {
        async fn get_status(&self, _known_version: i64) -> Result<VersionInfo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(VersionInfo {
                version: 1,
                id: "v1".into(),
                total_number_ucvi: 1,
                total_chunks: 1,
                single_chunk_size: 1,
            })
        }

        async fn get_chunk(&self, _from_version: i64, _chunk_index: u32) -> Result<ChunkData> {
            Ok(ChunkData {
                version: 1,
                id: "v1".into(),
                total_number_ucvi: 1,
                total_chunks: 1,
                single_chunk_size: 1,
                chunk: 1,
                revoked_ucvi_list: Some(vec![hash_ucvi("revoked-one")]),
                delta: None,
            })
        }
    }

    async fn temp_provider() -> (tempfile::TempDir, DrlBlacklistProvider<CountingRemote, RocksDbLocalStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksDbLocalStore::open(dir.path().join("t.ldb")).unwrap();
        let remote = CountingRemote {
            calls: AtomicUsize::new(0),
        };
        let options = BlacklistOptions {
            base_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        let provider = DrlBlacklistProvider::new(Arc::new(remote), Arc::new(store), options);
        (dir, provider)
    }

    #[tokio::test]
    async fn cold_query_triggers_refresh_and_finds_entry() {
        let (_dir, provider) = temp_provider().await;
        let cancel = CancellationToken::new();
        assert!(provider.is_revoked("revoked-one", &cancel).await.unwrap());
        assert!(!provider.is_revoked("clean-one", &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn only_supported_country_is_it() {
        let (_dir, provider) = temp_provider().await;
        assert!(provider.is_supported_country("IT"));
        assert!(provider.is_supported_country("it"));
        assert!(!provider.is_supported_country("FR"));
    }

    #[tokio::test]
    async fn fresh_mirror_does_not_trigger_a_second_refresh() {
        let (_dir, provider) = temp_provider().await;
        let cancel = CancellationToken::new();
        provider.is_revoked("revoked-one", &cancel).await.unwrap();
        provider.is_revoked("revoked-one", &cancel).await.unwrap();
        // Both queries land within refresh_interval of a fresh
        // last_check, so the remote is only consulted once.
        let status = provider.store.load_or_init_status().await.unwrap();
        assert!(status.last_check.unwrap() > 0);
    }

    #[tokio::test]
    async fn refresh_is_single_flight_across_concurrent_callers() {
        let (_dir, provider) = temp_provider().await;
        let provider = Arc::new(provider);
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let provider = Arc::clone(&provider);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                provider.refresh(&cancel).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(
            provider.store.count_entries().await.unwrap(),
            1,
            "concurrent refreshes must not double-apply the same chunk"
        );
    }

    #[tokio::test]
    async fn min_refresh_interval_suppresses_rapid_retrigger() {
        let (_dir, provider) = temp_provider().await;
        let cancel = CancellationToken::new();
        provider.is_revoked("revoked-one", &cancel).await.unwrap();

        // Force staleness past refresh_interval but still inside
        // max_file_age, without waiting on a real clock.
        let mut status = provider.store.load_or_init_status().await.unwrap();
        let stale_check = now_unix() - provider.options.refresh_interval.as_secs() as i64 - 1;
        status.last_check = Some(stale_check);
        provider.store.update_status(&status).await.unwrap();
        provider
            .last_refresh_attempt
            .store(now_unix(), Ordering::SeqCst);

        // min_refresh_interval hasn't elapsed, so this query must serve
        // the existing mirror without blocking on a new refresh.
        tokio::time::timeout(
            Duration::from_secs(1),
            provider.is_revoked("revoked-one", &cancel),
        )
        .await
        .unwrap()
        .unwrap();
    }
}
