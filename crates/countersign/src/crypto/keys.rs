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

//! Private and public key handling for the supported signature algorithms.
//!
//! Only RSA (PKCS#1 v1.5) and ECDSA over P-256 are supported, both over a
//! SHA-256 prehash.

use super::digest::Sha256Digest;
use crate::error::CryptoError;
use crate::models::KeyType;
use der::asn1::ObjectIdentifier;
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{
    Signature as EcdsaSignature, SigningKey as EcSigningKey, VerifyingKey as EcVerifyingKey,
};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, PrivateKeyInfo};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use spki::SubjectPublicKeyInfoRef;
use std::fmt;

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// Algorithm of a produced signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    #[serde(rename = "sha256WithRSAEncryption")]
    RsaPkcs1Sha256,
    #[serde(rename = "ecdsa-with-SHA256")]
    EcdsaP256Sha256,
}

impl SignatureAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::RsaPkcs1Sha256 => "sha256WithRSAEncryption",
            SignatureAlgorithm::EcdsaP256Sha256 => "ecdsa-with-SHA256",
        }
    }

    /// Parses the name used on the wire by remote HSMs.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha256WithRSAEncryption" | "RSA-SHA256" | "RS256" => {
                Some(SignatureAlgorithm::RsaPkcs1Sha256)
            }
            "ecdsa-with-SHA256" | "ECDSA-SHA256" | "ES256" => {
                Some(SignatureAlgorithm::EcdsaP256Sha256)
            }
            _ => None,
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A private signing key. Never serialized and never logged.
pub enum PrivateKey {
    Rsa(Box<RsaPrivateKey>),
    P256(EcSigningKey),
}

impl PrivateKey {
    /// Decodes an unencrypted PKCS#8 `PrivateKeyInfo`.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        let info = PrivateKeyInfo::try_from(der)
            .map_err(|e| CryptoError::MalformedContainer(format!("private key: {e}")))?;
        let oid = info.algorithm.oid;

        if oid == RSA_ENCRYPTION {
            RsaPrivateKey::from_pkcs8_der(der)
                .map(|k| PrivateKey::Rsa(Box::new(k)))
                .map_err(|e| CryptoError::MalformedContainer(format!("RSA key: {e}")))
        } else if oid == EC_PUBLIC_KEY {
            EcSigningKey::from_pkcs8_der(der).map(PrivateKey::P256).map_err(|_| {
                CryptoError::UnsupportedKeyAlgorithm("EC key on a curve other than P-256".into())
            })
        } else {
            Err(CryptoError::UnsupportedKeyAlgorithm(oid.to_string()))
        }
    }

    /// Generates a fresh key. RSA accepts 2048, 3072 or 4096 bits; EC only P-256.
    pub fn generate(key_type: KeyType, key_size: u32) -> Result<Self, CryptoError> {
        let mut rng = rand::thread_rng();
        match (key_type, key_size) {
            (KeyType::Rsa, 2048 | 3072 | 4096) => RsaPrivateKey::new(&mut rng, key_size as usize)
                .map(|k| PrivateKey::Rsa(Box::new(k)))
                .map_err(|e| CryptoError::SigningFailed(format!("key generation: {e}"))),
            (KeyType::Ec, 256) => Ok(PrivateKey::P256(EcSigningKey::random(&mut rng))),
            (key_type, size) => Err(CryptoError::UnsupportedKeyAlgorithm(format!(
                "{}-{}",
                key_type.as_str(),
                size
            ))),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            PrivateKey::Rsa(_) => KeyType::Rsa,
            PrivateKey::P256(_) => KeyType::Ec,
        }
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            PrivateKey::Rsa(_) => SignatureAlgorithm::RsaPkcs1Sha256,
            PrivateKey::P256(_) => SignatureAlgorithm::EcdsaP256Sha256,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::Rsa(key) => PublicKey::Rsa(key.to_public_key()),
            PrivateKey::P256(key) => PublicKey::P256(EcVerifyingKey::from(key)),
        }
    }

    /// Signs a SHA-256 digest. ECDSA signatures are DER-encoded.
    pub fn sign_prehash(&self, digest: &Sha256Digest) -> Result<Vec<u8>, CryptoError> {
        match self {
            PrivateKey::Rsa(key) => key
                .sign(Pkcs1v15Sign::new::<Sha256>(), digest.as_bytes())
                .map_err(|e| CryptoError::SigningFailed(e.to_string())),
            PrivateKey::P256(key) => {
                let signature: EcdsaSignature = key
                    .sign_prehash(digest.as_bytes())
                    .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.algorithm())
            .field("material", &"[REDACTED]")
            .finish()
    }
}

/// A public verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    P256(EcVerifyingKey),
}

impl PublicKey {
    /// Decodes a DER `SubjectPublicKeyInfo`.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, CryptoError> {
        let spki = SubjectPublicKeyInfoRef::try_from(der)
            .map_err(|e| CryptoError::MalformedCertificate(format!("public key: {e}")))?;
        let oid = spki.algorithm.oid;

        if oid == RSA_ENCRYPTION {
            RsaPublicKey::from_public_key_der(der)
                .map(PublicKey::Rsa)
                .map_err(|e| CryptoError::MalformedCertificate(format!("RSA public key: {e}")))
        } else if oid == EC_PUBLIC_KEY {
            EcVerifyingKey::from_public_key_der(der)
                .map(PublicKey::P256)
                .map_err(|_| {
                    CryptoError::UnsupportedKeyAlgorithm(
                        "EC key on a curve other than P-256".into(),
                    )
                })
        } else {
            Err(CryptoError::UnsupportedKeyAlgorithm(oid.to_string()))
        }
    }

    pub fn to_spki_der(&self) -> Result<Vec<u8>, CryptoError> {
        let document = match self {
            PublicKey::Rsa(key) => key.to_public_key_der(),
            PublicKey::P256(key) => key.to_public_key_der(),
        }
        .map_err(|e| CryptoError::SigningFailed(format!("public key encoding: {e}")))?;
        Ok(document.as_bytes().to_vec())
    }

    /// Verifies a signature produced by [`PrivateKey::sign_prehash`].
    pub fn verify_prehash(
        &self,
        digest: &Sha256Digest,
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        match self {
            PublicKey::Rsa(key) => key
                .verify(Pkcs1v15Sign::new::<Sha256>(), digest.as_bytes(), signature)
                .map_err(|_| CryptoError::VerificationFailed),
            PublicKey::P256(key) => {
                let signature = EcdsaSignature::from_der(signature)
                    .map_err(|_| CryptoError::VerificationFailed)?;
                key.verify_prehash(digest.as_bytes(), &signature)
                    .map_err(|_| CryptoError::VerificationFailed)
            }
        }
    }
}

/// Computes the SHA-256 hex fingerprint of a DER `SubjectPublicKeyInfo`.
pub fn compute_key_fingerprint(spki_der: &[u8]) -> String {
    hex::encode(Sha256::digest(spki_der))
}
