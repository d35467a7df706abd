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

//! Cryptographic primitives: digests, keys, and PKCS#12 loading.

pub mod digest;
pub mod keys;
pub mod pkcs12;

pub use self::digest::{DigestAlgorithm, Sha256Digest};
pub use self::keys::{compute_key_fingerprint, PrivateKey, PublicKey, SignatureAlgorithm};
pub use self::pkcs12::CertificateBundle;
