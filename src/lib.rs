// Copyright © DRL Mirror Contributors
// SPDX-License-Identifier: Apache-2.0

//! A local mirror of the Italian Dynamic Revocation List (DRL): the set
//! of revoked certificate identifiers (UCVIs) published by the Italian
//! DGC backend, kept crash-consistent on disk and refreshed
//! incrementally against the upstream chunked sync protocol.
//!
//! The entry point is [`provider::DrlBlacklistProvider`]; most callers
//! want the [`provider::DefaultProvider`] alias and its `open`
//! constructor.

pub mod config;
pub mod error;
pub mod hashing;
pub mod local_store;
pub mod model;
pub mod progress;
pub mod provider;
pub mod remote_client;
pub mod single_flight;
pub mod sync_engine;

pub use config::BlacklistOptions;
pub use error::{Result, SyncError};
pub use local_store::{LocalStore, RocksDbLocalStore};
pub use model::{ChunkData, DeltaUpdate, HashedUcvi, SyncStatus, VersionInfo};
pub use progress::{DownloadProgress, ProgressChannel};
pub use provider::{DefaultProvider, DrlBlacklistProvider, SUPPORTED_COUNTRY};
pub use remote_client::{HttpRemoteClient, RemoteClient};
pub use single_flight::SingleFlightRunner;
pub use sync_engine::SyncEngine;

pub use tokio_util::sync::CancellationToken;
