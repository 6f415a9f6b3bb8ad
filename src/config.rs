// Copyright © DRL Mirror Contributors
// SPDX-License-Identifier: Apache-2.0

//! Provider configuration and the on-disk layout of the local mirror.

use std::path::PathBuf;
use std::time::Duration;

/// Options governing how aggressively the [`crate::provider::DrlBlacklistProvider`]
/// refreshes its local mirror.
#[derive(Debug, Clone)]
pub struct BlacklistOptions {
    /// Where the local store file lives. Defaults to the platform
    /// user-data directory.
    pub base_path: PathBuf,
    /// Normal staleness window; once it elapses, a background refresh
    /// is triggered.
    pub refresh_interval: Duration,
    /// Floor between refresh attempts, regardless of staleness.
    pub min_refresh_interval: Duration,
    /// Hard staleness bound; once it elapses, queries block on refresh.
    pub max_file_age: Duration,
    /// When `refresh_interval` has expired but `max_file_age` has not:
    /// if `true`, serve the stale mirror while a refresh runs in the
    /// background; if `false`, block the query on that refresh.
    pub use_available_values_while_refreshing: bool,
}

impl Default for BlacklistOptions {
    fn default() -> Self {
        Self {
            base_path: dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")),
            refresh_interval: Duration::from_secs(24 * 60 * 60),
            min_refresh_interval: Duration::from_secs(5 * 60),
            max_file_age: Duration::from_secs(15 * 24 * 60 * 60),
            use_available_values_while_refreshing: true,
        }
    }
}

impl BlacklistOptions {
    /// The single-file store path, `<base_path>/DgcReaderData/Blacklist/Italy/italian-drl.ldb`.
    pub fn store_path(&self) -> PathBuf {
        self.base_path
            .join("DgcReaderData")
            .join("Blacklist")
            .join("Italy")
            .join("italian-drl.ldb")
    }
}
