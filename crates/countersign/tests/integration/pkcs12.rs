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

//! PKCS#12 loader tests against containers produced by OpenSSL.
//!
//! See `tests/fixtures/generate.sh` for how each container was built.

use countersign::crypto::{compute_key_fingerprint, CertificateBundle, Sha256Digest};
use countersign::CryptoError;

use crate::fixtures::{ec_bundle, rsa_bundle, PASSWORD};

fn subject_cn(der: &[u8]) -> String {
    let (_, cert) = x509_parser::parse_x509_certificate(der).unwrap();
    let cn = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap()
        .to_string();
    cn
}

#[test]
fn test_shrouded_key_with_two_certificates() {
    let bundle = CertificateBundle::from_pkcs12(&ec_bundle(), PASSWORD).unwrap();

    assert_eq!(bundle.chain().len(), 2);
    assert_eq!(bundle.common_name(), Some("Alice Signer"));
    assert_eq!(subject_cn(bundle.certificate()), "Alice Signer");
    assert_eq!(subject_cn(&bundle.chain()[1]), "Countersign Test Root");

    // The end-entity certificate carries the loaded key
    let (_, leaf) = x509_parser::parse_x509_certificate(bundle.certificate()).unwrap();
    assert_eq!(leaf.public_key().raw, bundle.public_key_der());
    assert_eq!(
        bundle.fingerprint(),
        compute_key_fingerprint(bundle.public_key_der())
    );
}

#[test]
fn test_rsa_container_signs_verifiably() {
    let bundle = CertificateBundle::from_pkcs12(&rsa_bundle(), PASSWORD).unwrap();
    assert_eq!(bundle.common_name(), Some("Bob Signer"));
    assert_eq!(bundle.algorithm().name(), "sha256WithRSAEncryption");

    let digest = Sha256Digest::of(b"payload");
    let signature = bundle.sign_digest(&digest).unwrap();
    assert!(bundle.public_key().verify_prehash(&digest, &signature).is_ok());
}

#[test]
fn test_plain_key_bag_is_accepted() {
    let plain = include_bytes!("../fixtures/plain-key.p12");
    let bundle = CertificateBundle::from_pkcs12(plain, PASSWORD).unwrap();
    let shrouded = CertificateBundle::from_pkcs12(&ec_bundle(), PASSWORD).unwrap();

    // Same key and certificate, different protection
    assert_eq!(bundle.fingerprint(), shrouded.fingerprint());
    assert_eq!(bundle.chain().len(), 2);
}

#[test]
fn test_wrong_password() {
    let err = CertificateBundle::from_pkcs12(&ec_bundle(), "not-the-password").unwrap_err();
    assert_eq!(err, CryptoError::BadPassword);
}

#[test]
fn test_container_without_key() {
    let data = include_bytes!("../fixtures/no-key.p12");
    let err = CertificateBundle::from_pkcs12(data, PASSWORD).unwrap_err();
    assert_eq!(err, CryptoError::NoPrivateKey);
}

#[test]
fn test_container_without_certificate() {
    let data = include_bytes!("../fixtures/no-cert.p12");
    let err = CertificateBundle::from_pkcs12(data, PASSWORD).unwrap_err();
    assert_eq!(err, CryptoError::NoCertificate);
}

#[test]
fn test_first_certificate_must_match_key() {
    let data = include_bytes!("../fixtures/mismatch.p12");
    let err = CertificateBundle::from_pkcs12(data, PASSWORD).unwrap_err();
    assert_eq!(err, CryptoError::CertKeyMismatch);
}

#[test]
fn test_legacy_encryption_is_reported() {
    let data = include_bytes!("../fixtures/legacy-3des.p12");
    let err = CertificateBundle::from_pkcs12(data, PASSWORD).unwrap_err();
    assert!(
        matches!(err, CryptoError::UnsupportedEncryption(_)),
        "unexpected error: {err:?}"
    );
}

#[test]
fn test_truncated_container_is_malformed() {
    let data = ec_bundle();
    let err = CertificateBundle::from_pkcs12(&data[..data.len() / 2], PASSWORD).unwrap_err();
    assert!(
        matches!(err, CryptoError::MalformedContainer(_)),
        "unexpected error: {err:?}"
    );
}

#[test]
fn test_debug_output_hides_key() {
    let bundle = CertificateBundle::from_pkcs12(&ec_bundle(), PASSWORD).unwrap();
    let debug = format!("{bundle:?}");
    assert!(debug.contains("Alice Signer"));
    assert!(!debug.contains("PrivateKey {"));
}
