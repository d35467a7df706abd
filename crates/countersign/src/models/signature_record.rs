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

//! The immutable artifact produced by a signing operation.

use crate::crypto::{DigestAlgorithm, PublicKey, Sha256Digest, SignatureAlgorithm};
use crate::error::CryptoError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who signed and why.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Domain model for a signature record.
///
/// Binary fields serialize as standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub signature_id: Uuid,
    pub document_id: String,
    /// Delegation this signature closed, if any
    pub delegation_id: Option<Uuid>,
    pub signer_info: SignerInfo,
    pub digest_algorithm: DigestAlgorithm,
    /// Hex digest of the canonical document bytes
    pub document_digest: String,
    pub signature_algorithm: SignatureAlgorithm,
    #[serde(with = "b64")]
    pub signature_bytes: Vec<u8>,
    /// DER certificates, end-entity first
    #[serde(with = "b64_vec")]
    pub certificate_chain: Vec<Vec<u8>>,
    /// DER SubjectPublicKeyInfo of the signing key
    #[serde(with = "b64")]
    pub signer_public_key: Vec<u8>,
    #[serde(default, with = "b64_opt")]
    pub timestamp_token: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl SignatureRecord {
    /// Checks `document` against the recorded digest and signature.
    pub fn verify(&self, document: &[u8]) -> Result<(), CryptoError> {
        let digest = Sha256Digest::of(document);
        if digest.to_hex() != self.document_digest {
            return Err(CryptoError::VerificationFailed);
        }
        PublicKey::from_spki_der(&self.signer_public_key)?
            .verify_prehash(&digest, &self.signature_bytes)
    }

    pub fn has_timestamp(&self) -> bool {
        self.timestamp_token.is_some()
    }
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod b64_vec {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(items.iter().map(|b| BASE64.encode(b)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(d)?
            .into_iter()
            .map(|s| BASE64.decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

mod b64_opt {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_some(&BASE64.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|s| BASE64.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
