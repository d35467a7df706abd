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

//! PKCS#12 container loading.
//!
//! Decodes a PFX into a [`CertificateBundle`]: the private key, the
//! end-entity certificate and the remaining certificates in container order.
//!
//! Integrity is checked first (password MAC with SHA-256 or SHA-1), then each
//! safe is read, decrypting PBES2-protected content. A shrouded key bag is
//! preferred over a plain key bag. The first certificate bag is taken as the
//! end-entity certificate and must carry the public half of the loaded key.
//!
//! Legacy PKCS#12 PBE schemes (RC2, 3DES) are rejected with
//! [`CryptoError::UnsupportedEncryption`].

use super::digest::Sha256Digest;
use super::keys::{compute_key_fingerprint, PrivateKey, PublicKey, SignatureAlgorithm};
use crate::error::CryptoError;
use cms::content_info::ContentInfo;
use cms::encrypted_data::EncryptedData;
use der::asn1::{ContextSpecific, ObjectIdentifier, OctetString};
use der::{Any, Decode, Encode, Sequence};
use hmac::{Hmac, Mac};
use pkcs12::cert_type::CertBag;
use pkcs12::kdf::{derive_key_utf8, Pkcs12KeyType};
use pkcs12::mac_data::MacData;
use pkcs12::pfx::Pfx;
use pkcs12::safe_bag::SafeBag;
use sha1::Sha1;
use sha2::Sha256;
use spki::AlgorithmIdentifierOwned;
use std::fmt;

const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
const ID_ENCRYPTED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.6");
const PBES2: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.5.13");

const KEY_BAG: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.1");
const SHROUDED_KEY_BAG: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.2");
const CERT_BAG: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.3");
const X509_CERTIFICATE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.22.1");

const SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
const SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");

/// `EncryptedPrivateKeyInfo`, decoded loosely so the scheme OID can be
/// inspected before committing to PBES2.
#[derive(Sequence)]
struct EncryptedKeyEnvelope {
    encryption_algorithm: AlgorithmIdentifierOwned,
    encrypted_data: OctetString,
}

/// Signing material extracted from a PKCS#12 container.
///
/// Owned by the signing operation that loaded it. `Debug` never prints key
/// material.
pub struct CertificateBundle {
    key: PrivateKey,
    chain: Vec<Vec<u8>>,
    common_name: Option<String>,
    fingerprint: String,
    public_key_der: Vec<u8>,
}

impl CertificateBundle {
    /// Loads a bundle from PKCS#12 bytes.
    pub fn from_pkcs12(data: &[u8], password: &str) -> Result<Self, CryptoError> {
        let pfx = Pfx::from_der(data).map_err(malformed)?;
        if pfx.auth_safe.content_type != ID_DATA {
            return Err(CryptoError::MalformedContainer(format!(
                "unsupported integrity mode {}",
                pfx.auth_safe.content_type
            )));
        }

        let auth_safe = octets(&pfx.auth_safe.content)?;
        if let Some(mac_data) = &pfx.mac_data {
            verify_mac(mac_data, &auth_safe, password)?;
        }

        let mut bags = BagCollector::default();
        for safe in Vec::<ContentInfo>::from_der(&auth_safe).map_err(malformed)? {
            let contents = if safe.content_type == ID_DATA {
                octets(&safe.content)?
            } else if safe.content_type == ID_ENCRYPTED_DATA {
                decrypt_encrypted_data(&safe.content, password)?
            } else {
                return Err(CryptoError::UnsupportedEncryption(format!(
                    "safe content type {}",
                    safe.content_type
                )));
            };

            for bag in Vec::<SafeBag>::from_der(&contents).map_err(malformed)? {
                bags.collect(&bag)?;
            }
        }

        bags.into_bundle(password)
    }

    /// The end-entity certificate (DER).
    pub fn certificate(&self) -> &[u8] {
        &self.chain[0]
    }

    /// Every certificate, end-entity first, then the others in container order.
    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    /// Common Name of the end-entity certificate. For display only.
    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }

    /// SHA256 hex fingerprint of the public key.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// DER SubjectPublicKeyInfo of the key.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.key.algorithm()
    }

    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    /// Signs a SHA-256 digest with the bundle's private key.
    pub fn sign_digest(&self, digest: &Sha256Digest) -> Result<Vec<u8>, CryptoError> {
        self.key.sign_prehash(digest)
    }
}

impl fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("common_name", &self.common_name)
            .field("fingerprint", &self.fingerprint)
            .field("chain_len", &self.chain.len())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Default)]
struct BagCollector {
    shrouded_key: Option<Vec<u8>>,
    plain_key: Option<Vec<u8>>,
    certificates: Vec<Vec<u8>>,
}

impl BagCollector {
    fn collect(&mut self, bag: &SafeBag) -> Result<(), CryptoError> {
        let value = bag_value(bag);
        if bag.bag_id == SHROUDED_KEY_BAG {
            self.shrouded_key.get_or_insert(value);
        } else if bag.bag_id == KEY_BAG {
            self.plain_key.get_or_insert(value);
        } else if bag.bag_id == CERT_BAG {
            let cert_bag = CertBag::from_der(&value).map_err(malformed)?;
            if cert_bag.cert_id == X509_CERTIFICATE {
                self.certificates.push(cert_bag.cert_value.as_bytes().to_vec());
            } else {
                tracing::debug!(
                    cert_type = %cert_bag.cert_id,
                    "Skipping non-X.509 certificate bag"
                );
            }
        } else {
            tracing::debug!(bag_id = %bag.bag_id, "Skipping unsupported PKCS#12 bag");
        }
        Ok(())
    }

    fn into_bundle(self, password: &str) -> Result<CertificateBundle, CryptoError> {
        let key = select_private_key(self.shrouded_key, self.plain_key, password)?;
        if self.certificates.is_empty() {
            return Err(CryptoError::NoCertificate);
        }

        let (cert_key, common_name) = inspect_certificate(&self.certificates[0])?;
        let key_public = key.public_key();
        match cert_key {
            Some(public) if public == key_public => {}
            _ => return Err(CryptoError::CertKeyMismatch),
        }

        let public_key_der = key_public.to_spki_der()?;
        Ok(CertificateBundle {
            fingerprint: compute_key_fingerprint(&public_key_der),
            public_key_der,
            key,
            chain: self.certificates,
            common_name,
        })
    }
}

/// Tries the shrouded key first and falls back to a plain key bag.
fn select_private_key(
    shrouded: Option<Vec<u8>>,
    plain: Option<Vec<u8>>,
    password: &str,
) -> Result<PrivateKey, CryptoError> {
    match (shrouded, plain) {
        (Some(envelope), plain) => {
            let shrouded = decrypt_shrouded_key(&envelope, password)
                .and_then(|der| PrivateKey::from_pkcs8_der(&der));
            match shrouded {
                Ok(key) => Ok(key),
                Err(err) => match plain {
                    Some(der) => {
                        tracing::debug!(
                            error = %err,
                            "Shrouded key unusable, trying plain key bag"
                        );
                        PrivateKey::from_pkcs8_der(&der)
                    }
                    None => Err(err),
                },
            }
        }
        (None, Some(der)) => PrivateKey::from_pkcs8_der(&der),
        (None, None) => Err(CryptoError::NoPrivateKey),
    }
}

/// Returns the certificate's public key (if decodable) and its Common Name.
fn inspect_certificate(der: &[u8]) -> Result<(Option<PublicKey>, Option<String>), CryptoError> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| CryptoError::MalformedCertificate(e.to_string()))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string);

    let public = match PublicKey::from_spki_der(cert.public_key().raw) {
        Ok(public) => Some(public),
        Err(CryptoError::UnsupportedKeyAlgorithm(_)) => None,
        Err(err) => return Err(err),
    };
    Ok((public, common_name))
}

/// Strips the `[0] EXPLICIT` wrapper from a bag value when present.
fn bag_value(bag: &SafeBag) -> Vec<u8> {
    match ContextSpecific::<Any>::from_der(&bag.bag_value) {
        Ok(wrapped) if wrapped.tag_number.value() == 0 => wrapped
            .value
            .to_der()
            .unwrap_or_else(|_| bag.bag_value.clone()),
        _ => bag.bag_value.clone(),
    }
}

fn octets(content: &Any) -> Result<Vec<u8>, CryptoError> {
    let der = content.to_der().map_err(malformed)?;
    let octets = OctetString::from_der(&der).map_err(malformed)?;
    Ok(octets.as_bytes().to_vec())
}

fn verify_mac(mac_data: &MacData, content: &[u8], password: &str) -> Result<(), CryptoError> {
    let algorithm = mac_data.mac.algorithm.oid;
    let salt = mac_data.mac_salt.as_bytes();
    let rounds = mac_data.iterations;
    let expected = mac_data.mac.digest.as_bytes();

    let matches = if algorithm == SHA256 {
        let key = derive_key_utf8::<Sha256>(password, salt, Pkcs12KeyType::Mac, rounds, 32)
            .map_err(malformed)?;
        let mut mac = Hmac::<Sha256>::new_from_slice(&key).map_err(|_| CryptoError::BadPassword)?;
        mac.update(content);
        mac.verify_slice(expected).is_ok()
    } else if algorithm == SHA1 {
        let key = derive_key_utf8::<Sha1>(password, salt, Pkcs12KeyType::Mac, rounds, 20)
            .map_err(malformed)?;
        let mut mac = Hmac::<Sha1>::new_from_slice(&key).map_err(|_| CryptoError::BadPassword)?;
        mac.update(content);
        mac.verify_slice(expected).is_ok()
    } else {
        return Err(CryptoError::UnsupportedEncryption(format!(
            "MAC digest {algorithm}"
        )));
    };

    if matches {
        Ok(())
    } else {
        Err(CryptoError::BadPassword)
    }
}

fn decrypt_encrypted_data(content: &Any, password: &str) -> Result<Vec<u8>, CryptoError> {
    let der = content.to_der().map_err(malformed)?;
    let encrypted = EncryptedData::from_der(&der).map_err(malformed)?;
    let info = encrypted.enc_content_info;
    let ciphertext = info
        .encrypted_content
        .ok_or_else(|| CryptoError::MalformedContainer("encrypted safe has no content".into()))?;
    decrypt_pbes2(&info.content_enc_alg, ciphertext.as_bytes(), password)
}

fn decrypt_shrouded_key(envelope: &[u8], password: &str) -> Result<Vec<u8>, CryptoError> {
    let envelope = EncryptedKeyEnvelope::from_der(envelope).map_err(malformed)?;
    decrypt_pbes2(
        &envelope.encryption_algorithm,
        envelope.encrypted_data.as_bytes(),
        password,
    )
}

fn decrypt_pbes2(
    algorithm: &AlgorithmIdentifierOwned,
    ciphertext: &[u8],
    password: &str,
) -> Result<Vec<u8>, CryptoError> {
    if algorithm.oid != PBES2 {
        return Err(CryptoError::UnsupportedEncryption(algorithm.oid.to_string()));
    }
    let der = algorithm.to_der().map_err(malformed)?;
    let scheme = pkcs5::EncryptionScheme::from_der(&der)
        .map_err(|e| CryptoError::UnsupportedEncryption(e.to_string()))?;
    scheme
        .decrypt(password, ciphertext)
        .map_err(|_| CryptoError::BadPassword)
}

fn malformed(err: der::Error) -> CryptoError {
    CryptoError::MalformedContainer(err.to_string())
}
