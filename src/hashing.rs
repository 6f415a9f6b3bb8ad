// Copyright © DRL Mirror Contributors
// SPDX-License-Identifier: Apache-2.0

//! The cleartext-to-hash boundary. Every UCVI crosses this function
//! exactly once, on its way into a query or before the rare case a
//! caller wants to compare against a raw snapshot list; nothing else in
//! the crate ever stores or logs a cleartext identifier.

use sha2::{Digest, Sha256};

use crate::model::HashedUcvi;

/// Base64-encodes the SHA-256 digest of `ucvi`'s UTF-8 bytes.
pub fn hash_ucvi(ucvi: &str) -> HashedUcvi {
    base64::encode(Sha256::digest(ucvi.as_bytes()))
}
