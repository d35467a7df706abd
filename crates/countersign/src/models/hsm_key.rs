/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Metadata for keys held inside an HSM.
//!
//! Private key material never appears here; only the public half and
//! lifecycle information cross the HSM boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Rsa,
    Ec,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Rsa => "rsa",
            KeyType::Ec => "ec",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUsage {
    Sign,
    Encrypt,
    Both,
}

impl KeyUsage {
    pub fn can_sign(&self) -> bool {
        matches!(self, KeyUsage::Sign | KeyUsage::Both)
    }
}

/// Lifecycle status. `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Inactive,
    Revoked,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Inactive => "inactive",
            KeyStatus::Revoked => "revoked",
        }
    }
}

/// Domain model for an HSM key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HsmKey {
    pub key_id: String,
    pub key_type: KeyType,
    pub key_size: u32,
    /// Signature algorithm name, e.g. "sha256WithRSAEncryption"
    pub algorithm: String,
    pub label: String,
    pub usage: KeyUsage,
    pub status: KeyStatus,
    pub created_at: DateTime<Utc>,
    /// Owning principal
    pub user_id: String,
    /// Base64 DER SubjectPublicKeyInfo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// SHA256 hex fingerprint of the public key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl HsmKey {
    /// Active and allowed to produce signatures.
    pub fn is_signing_capable(&self) -> bool {
        self.status == KeyStatus::Active && self.usage.can_sign()
    }
}

/// Parameters for generating a key inside the HSM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyGenerationParams {
    pub key_type: KeyType,
    pub key_size: u32,
    pub label: String,
    pub usage: KeyUsage,
}

/// Filters for listing HSM keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<KeyStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_type: Option<KeyType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl KeyFilter {
    pub fn matches(&self, key: &HsmKey) -> bool {
        self.status.map_or(true, |s| s == key.status)
            && self.key_type.map_or(true, |t| t == key.key_type)
    }
}
