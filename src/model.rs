// Copyright © DRL Mirror Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire and persisted data types: [`VersionInfo`], [`ChunkData`] (remote),
//! [`SyncStatus`] (the local singleton record), and the predicates the
//! sync engine reconciles against.

use serde::{Deserialize, Serialize};

/// A base64-encoded SHA-256 digest of a UCVI's UTF-8 bytes. Never holds
/// cleartext.
pub type HashedUcvi = String;

/// The server's current published version descriptor, returned by
/// `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: i64,
    pub id: String,
    pub total_number_ucvi: u64,
    pub total_chunks: u32,
    pub single_chunk_size: u32,
}

/// Insertions and deletions to apply against the previously installed
/// version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaUpdate {
    pub insertions: Vec<HashedUcvi>,
    pub deletions: Vec<HashedUcvi>,
}

/// One numbered chunk of a version transition, returned by
/// `GET /chunk`. Carries either a full-snapshot fragment
/// (`revoked_ucvi_list`) or a `delta`, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkData {
    pub version: i64,
    pub id: String,
    pub total_number_ucvi: u64,
    pub total_chunks: u32,
    pub single_chunk_size: u32,
    /// 1-based.
    pub chunk: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_ucvi_list: Option<Vec<HashedUcvi>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<DeltaUpdate>,
}

impl ChunkData {
    /// Projects the version-identifying fields this chunk carries as a
    /// [`VersionInfo`], for comparison against [`SyncStatus`] target
    /// fields.
    pub fn as_version_info(&self) -> VersionInfo {
        VersionInfo {
            version: self.version,
            id: self.id.clone(),
            total_number_ucvi: self.total_number_ucvi,
            total_chunks: self.total_chunks,
            single_chunk_size: self.single_chunk_size,
        }
    }

    /// True when this chunk is the first fragment of a non-incremental
    /// (full snapshot) delivery. Chunks after the first of such a
    /// delivery are assumed to partition the snapshot, never repeat
    /// it — the engine only wipes on `chunk == 1`.
    pub fn is_first_snapshot_chunk(&self) -> bool {
        self.chunk == 1 && matches!(&self.revoked_ucvi_list, Some(list) if !list.is_empty())
    }
}

/// The singleton sync-state record persisted by the Local Store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub current_version: i64,
    pub current_version_id: String,
    pub target_version: i64,
    pub target_version_id: String,
    pub target_chunks_count: u32,
    pub target_chunk_size: u32,
    pub target_total_number_ucvi: u64,
    /// 0 = none; chunks are numbered from 1.
    pub last_chunk_saved: u32,
    /// Unix seconds of the last successful consistency confirmation.
    pub last_check: Option<i64>,
}

impl SyncStatus {
    pub fn has_current_version(&self) -> bool {
        self.current_version > 0
    }

    pub fn current_version_matches_target(&self) -> bool {
        self.current_version == self.target_version
            && self.current_version_id == self.target_version_id
    }

    pub fn any_chunk_downloaded(&self) -> bool {
        self.last_chunk_saved > 0
    }

    pub fn has_pending_download(&self) -> bool {
        self.target_chunks_count > 0 && self.last_chunk_saved < self.target_chunks_count
    }

    pub fn is_same_version(&self, info: &VersionInfo) -> bool {
        self.current_version == info.version && self.current_version_id == info.id
    }

    pub fn is_target_version(&self, info: &VersionInfo) -> bool {
        self.target_version == info.version && self.target_version_id == info.id
    }

    pub fn is_target_version_consistent(&self, info: &VersionInfo) -> bool {
        self.is_target_version(info) && self.target_chunks_count == info.total_chunks
    }

    /// Copies `info`'s version-identifying fields into the target
    /// fields and resets `last_chunk_saved`, so the next chunk fetch
    /// starts over at chunk 1 of the newly adopted target.
    pub fn adopt_target(&mut self, info: &VersionInfo) {
        self.target_version = info.version;
        self.target_version_id = info.id.clone();
        self.target_chunks_count = info.total_chunks;
        self.target_chunk_size = info.single_chunk_size;
        self.target_total_number_ucvi = info.total_number_ucvi;
        self.last_chunk_saved = 0;
    }

    /// Wipes every current/target field back to the empty, never-synced
    /// state. Does not touch `last_check`'s meaning beyond what the
    /// caller assigns afterwards.
    pub fn reset(&mut self) {
        *self = SyncStatus::default();
    }
}
