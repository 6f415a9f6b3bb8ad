// Copyright © DRL Mirror Contributors
// SPDX-License-Identifier: Apache-2.0

//! The upstream HTTP surface. No retries live here — retrying and
//! recovering from inconsistency is the Sync Engine's job.

use async_trait::async_trait;

use crate::error::{Result, SyncError};
use crate::model::{ChunkData, VersionInfo};

/// Fetches version status and chunk payloads from the upstream DRL
/// service. Implemented by [`HttpRemoteClient`] and by scripted mocks in
/// tests.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Returns the server's current published version descriptor.
    /// `known_version` is a hint, not a filter: the server always
    /// answers with its latest version.
    async fn get_status(&self, known_version: i64) -> Result<VersionInfo>;

    /// Requests one 1-based chunk of the transition away from
    /// `from_version`. The server decides whether the response is a
    /// full snapshot fragment or a delta.
    async fn get_chunk(&self, from_version: i64, chunk_index: u32) -> Result<ChunkData>;
}

/// `reqwest`-backed [`RemoteClient`] talking to `GET /status` and
/// `GET /chunk`.
pub struct HttpRemoteClient {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpRemoteClient {
    pub fn new(base_url: reqwest::Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn with_client(client: reqwest::Client, base_url: reqwest::Url) -> Self {
        Self { client, base_url }
    }

    async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Upstream { status, body });
        }
        response
            .json::<T>()
            .await
            .map_err(|err| SyncError::Decode(err.to_string()))
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn get_status(&self, known_version: i64) -> Result<VersionInfo> {
        let url = self
            .base_url
            .join("status")
            .map_err(|err| SyncError::Decode(err.to_string()))?;
        let request = self
            .client
            .get(url)
            .query(&[("version", known_version.to_string())]);
        tracing::debug!(known_version, "requesting DRL status");
        self.execute(request).await
    }

    async fn get_chunk(&self, from_version: i64, chunk_index: u32) -> Result<ChunkData> {
        let url = self
            .base_url
            .join("chunk")
            .map_err(|err| SyncError::Decode(err.to_string()))?;
        let request = self.client.get(url).query(&[
            ("version", from_version.to_string()),
            ("chunk", chunk_index.to_string()),
        ]);
        tracing::debug!(from_version, chunk_index, "requesting DRL chunk");
        self.execute(request).await
    }
}
