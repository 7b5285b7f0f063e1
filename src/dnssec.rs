// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! DNSSEC signature verification ([RFC 4035 § 5.3]).
//!
//! The query engine validates pending data inline when it can do so
//! with keys it already trusts. This module reconstructs the data
//! covered by an RRSIG and checks the signature with `ring`.
//!
//! [RFC 4035 § 5.3]: https://datatracker.ietf.org/doc/html/rfc4035#section-5.3

use std::fmt;

use ring::signature::{self, RsaParameters, UnparsedPublicKey};

use crate::name::{Label, Name};
use crate::rr::rdata::{Dnskey, Rrsig};
use crate::rr::Rrset;

////////////////////////////////////////////////////////////////////////
// ALGORITHMS                                                         //
////////////////////////////////////////////////////////////////////////

// Algorithm numbers from the IANA DNSSEC algorithm registry.
pub const RSASHA1: u8 = 5;
pub const RSASHA1_NSEC3_SHA1: u8 = 7;
pub const RSASHA256: u8 = 8;
pub const RSASHA512: u8 = 10;
pub const ECDSAP256SHA256: u8 = 13;
pub const ECDSAP384SHA384: u8 = 14;
pub const ED25519: u8 = 15;

/// Returns whether signatures made with `algorithm` can be verified.
pub fn is_supported(algorithm: u8) -> bool {
    matches!(
        algorithm,
        RSASHA1
            | RSASHA1_NSEC3_SHA1
            | RSASHA256
            | RSASHA512
            | ECDSAP256SHA256
            | ECDSAP384SHA384
            | ED25519
    )
}

////////////////////////////////////////////////////////////////////////
// VERIFICATION                                                       //
////////////////////////////////////////////////////////////////////////

/// Verifies that `rrsig` is a valid signature by `key` over `rrset`,
/// owned by `owner`, at time `now` (seconds since the epoch, modulo
/// 2^32). If `ignore_time` is set, the validity period is not checked.
pub fn verify(
    owner: &Name,
    rrset: &Rrset,
    rrsig: &Rrsig,
    key: &Dnskey,
    now: u32,
    ignore_time: bool,
) -> Result<(), Error> {
    if rrsig.algorithm != key.algorithm {
        return Err(Error::AlgorithmMismatch);
    }
    if rrsig.type_covered != rrset.rr_type {
        return Err(Error::TypeMismatch);
    }
    if !ignore_time {
        // Serial number arithmetic ([RFC 4034 § 3.1.5]).
        if (now.wrapping_sub(rrsig.inception) as i32) < 0 {
            return Err(Error::NotYetValid);
        }
        if (rrsig.expiration.wrapping_sub(now) as i32) < 0 {
            return Err(Error::Expired);
        }
    }
    let data = signed_data(owner, rrset, rrsig)?;
    verify_raw(key.algorithm, &key.public_key, &data, &rrsig.signature)
}

/// Builds the data covered by `rrsig` ([RFC 4034 § 3.1.8.1]): the RRSIG
/// RDATA without its signature, followed by the records of `rrset` in
/// canonical form and order.
///
/// When the RRSIG's labels field is smaller than the owner's label
/// count, the RRset was synthesized from a wildcard, and the owner is
/// replaced by the wildcard name ([RFC 4035 § 5.3.2]).
///
/// [RFC 4034 § 3.1.8.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-3.1.8.1
/// [RFC 4035 § 5.3.2]: https://datatracker.ietf.org/doc/html/rfc4035#section-5.3.2
pub fn signed_data(owner: &Name, rrset: &Rrset, rrsig: &Rrsig) -> Result<Vec<u8>, Error> {
    let mut labels = owner.len() - 1;
    if owner.is_wildcard() {
        labels -= 1;
    }
    let rrsig_labels = rrsig.labels as usize;
    if rrsig_labels > labels {
        return Err(Error::TooManyLabels);
    }
    let owner = if rrsig_labels < labels {
        owner
            .superdomain(owner.len() - 1 - rrsig_labels)
            .ok_or(Error::TooManyLabels)?
            .prepend(Label::asterisk())
            .or(Err(Error::TooManyLabels))?
            .to_lowercase()
    } else {
        owner.to_lowercase()
    };

    let mut rdatas: Vec<_> = rrset.rdatas().map(|r| r.canonical(rrset.rr_type)).collect();
    rdatas.sort();
    rdatas.dedup();

    let mut data = rrsig.signed_header();
    for rdata in rdatas {
        data.extend_from_slice(owner.wire_repr());
        data.extend_from_slice(&u16::from(rrset.rr_type).to_be_bytes());
        data.extend_from_slice(&u16::from(rrset.class).to_be_bytes());
        data.extend_from_slice(&rrsig.original_ttl.to_be_bytes());
        data.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        data.extend_from_slice(&rdata);
    }
    Ok(data)
}

/// Checks `signature` over `data` with a DNSKEY public key.
fn verify_raw(algorithm: u8, public_key: &[u8], data: &[u8], sig: &[u8]) -> Result<(), Error> {
    let rsa = |parameters: &'static RsaParameters| {
        let (e, n) = rsa_exponent_modulus(public_key)?;
        signature::RsaPublicKeyComponents { n, e }
            .verify(parameters, data, sig)
            .or(Err(Error::BadSignature))
    };
    let ecdsa = |algorithm: &'static signature::EcdsaVerificationAlgorithm| {
        // ring expects the uncompressed-point marker that DNSKEY omits.
        let mut key = Vec::with_capacity(public_key.len() + 1);
        key.push(0x04);
        key.extend_from_slice(public_key);
        UnparsedPublicKey::new(algorithm, key)
            .verify(data, sig)
            .or(Err(Error::BadSignature))
    };
    match algorithm {
        RSASHA1 | RSASHA1_NSEC3_SHA1 => rsa(&signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY),
        RSASHA256 => rsa(&signature::RSA_PKCS1_1024_8192_SHA256_FOR_LEGACY_USE_ONLY),
        RSASHA512 => rsa(&signature::RSA_PKCS1_1024_8192_SHA512_FOR_LEGACY_USE_ONLY),
        ECDSAP256SHA256 => ecdsa(&signature::ECDSA_P256_SHA256_FIXED),
        ECDSAP384SHA384 => ecdsa(&signature::ECDSA_P384_SHA384_FIXED),
        ED25519 => UnparsedPublicKey::new(&signature::ED25519, public_key)
            .verify(data, sig)
            .or(Err(Error::BadSignature)),
        other => Err(Error::UnsupportedAlgorithm(other)),
    }
}

/// Splits an RSA public key in the format of [RFC 3110 § 2] into its
/// exponent and modulus.
///
/// [RFC 3110 § 2]: https://datatracker.ietf.org/doc/html/rfc3110#section-2
fn rsa_exponent_modulus(public_key: &[u8]) -> Result<(&[u8], &[u8]), Error> {
    let (start, exponent_len) = match public_key {
        [0, high, low, ..] => (3, (*high as usize) << 8 | *low as usize),
        [len, ..] => (1, *len as usize),
        [] => return Err(Error::InvalidKey),
    };
    let rest = public_key.get(start..).ok_or(Error::InvalidKey)?;
    if exponent_len == 0 || rest.len() <= exponent_len {
        return Err(Error::InvalidKey);
    }
    Ok(rest.split_at(exponent_len))
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// Reasons a signature fails to verify.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    UnsupportedAlgorithm(u8),
    AlgorithmMismatch,
    TypeMismatch,
    TooManyLabels,
    NotYetValid,
    Expired,
    InvalidKey,
    BadSignature,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnsupportedAlgorithm(a) => write!(f, "unsupported algorithm {a}"),
            Self::AlgorithmMismatch => f.write_str("key and signature algorithms differ"),
            Self::TypeMismatch => f.write_str("signature covers a different type"),
            Self::TooManyLabels => f.write_str("signature labels exceed owner labels"),
            Self::NotYetValid => f.write_str("signature is not yet valid"),
            Self::Expired => f.write_str("signature has expired"),
            Self::InvalidKey => f.write_str("malformed public key"),
            Self::BadSignature => f.write_str("signature does not verify"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TEST SIGNING                                                       //
////////////////////////////////////////////////////////////////////////

/// Ed25519 signing of test fixtures.
#[cfg(test)]
pub(crate) mod testing {
    use ring::rand::SystemRandom;
    use ring::signature::{Ed25519KeyPair, KeyPair};

    use super::*;
    use crate::class::Class;
    use crate::rr::{Rdata, Ttl, Type};

    /// Fixed validity window around the current time used by tests.
    pub const INCEPTION: u32 = 1_600_000_000;
    pub const EXPIRATION: u32 = 2_000_000_000;
    pub const NOW: u32 = 1_700_000_000;

    pub struct Signer {
        pub zone: Name,
        key_pair: Ed25519KeyPair,
        pub dnskey: Dnskey,
    }

    impl Signer {
        pub fn new(zone: &str) -> Self {
            let pkcs8 = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new()).unwrap();
            let key_pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
            let mut octets = vec![0x01, 0x01, 3, ED25519];
            octets.extend_from_slice(key_pair.public_key().as_ref());
            let dnskey = Dnskey::parse(&Rdata::new(octets).unwrap()).unwrap();
            Self {
                zone: zone.parse().unwrap(),
                key_pair,
                dnskey,
            }
        }

        /// The DNSKEY RRset of the signer's zone.
        pub fn dnskey_rrset(&self, ttl: u32) -> Rrset {
            let mut rrset = Rrset::new(Type::DNSKEY, Class::IN, Ttl::from(ttl));
            rrset.push_rdata(self.dnskey.to_rdata().unwrap());
            rrset
        }

        pub fn rrsig(&self, owner: &Name, rrset: &Rrset, expiration: u32) -> Rrsig {
            let mut labels = owner.len() - 1;
            if owner.is_wildcard() {
                labels -= 1;
            }
            let mut rrsig = Rrsig {
                type_covered: rrset.rr_type,
                algorithm: ED25519,
                labels: labels as u8,
                original_ttl: u32::from(rrset.ttl),
                expiration,
                inception: INCEPTION,
                key_tag: self.dnskey.key_tag,
                signer: self.zone.clone(),
                signature: Vec::new(),
            };
            let data = signed_data(owner, rrset, &rrsig).unwrap();
            rrsig.signature = self.key_pair.sign(&data).as_ref().to_vec();
            rrsig
        }

        /// Signs `rrset`, returning the covering RRSIG RRset.
        pub fn sign(&self, owner: &Name, rrset: &Rrset) -> Rrset {
            let rrsig = self.rrsig(owner, rrset, EXPIRATION);
            let mut sigs = Rrset::new_signatures(rrset.rr_type, rrset.class, rrset.ttl);
            sigs.push_rdata(rrsig.to_rdata().unwrap());
            sigs
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
