// Copyright © DRL Mirror Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error type shared across the remote client, local store, sync engine
//! and provider facade.
//!
//! Every variant holds owned, `Clone` data rather than the originating
//! foreign error (`reqwest::Error`, `rocksdb::Error`, ...). The
//! single-flight runner (see [`crate::single_flight`]) fans one refresh
//! outcome out to every attached caller, and that only works cleanly if
//! the outcome can be cloned per caller.

use thiserror::Error;

/// Errors surfaced by this crate's public API.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    #[error("network error contacting upstream DRL service: {0}")]
    Network(String),

    #[error("malformed payload from upstream DRL service: {0}")]
    Decode(String),

    #[error("upstream DRL service returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error(
        "local mirror could not be reconciled with the server within {0} attempts"
    )]
    InconsistentState(u32),

    #[error("local store error: {0}")]
    Store(String),

    #[error("operation was cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

impl From<rocksdb::Error> for SyncError {
    fn from(err: rocksdb::Error) -> Self {
        SyncError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
