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

//! Typed views of the DNSSEC RDATA formats of [RFC 4034].
//!
//! [RFC 4034]: https://datatracker.ietf.org/doc/html/rfc4034

use super::{Cursor, Error, Rdata};
use crate::name::Name;
use crate::rr::Type;

////////////////////////////////////////////////////////////////////////
// RRSIG                                                              //
////////////////////////////////////////////////////////////////////////

/// The fields of RRSIG RDATA ([RFC 4034 § 3.1]).
///
/// [RFC 4034 § 3.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-3.1
#[derive(Clone, Debug)]
pub struct Rrsig {
    pub type_covered: Type,
    pub algorithm: u8,
    pub labels: u8,
    pub original_ttl: u32,
    pub expiration: u32,
    pub inception: u32,
    pub key_tag: u16,
    pub signer: Name,
    pub signature: Vec<u8>,
}

/// The length of the fixed-size fields at the start of RRSIG RDATA.
const RRSIG_FIXED_LEN: usize = 18;

impl Rrsig {
    pub fn parse(rdata: &Rdata) -> Result<Self, Error> {
        let mut cursor = Cursor::new(rdata.octets());
        Ok(Self {
            type_covered: cursor.u16()?.into(),
            algorithm: cursor.u8()?,
            labels: cursor.u8()?,
            original_ttl: cursor.u32()?,
            expiration: cursor.u32()?,
            inception: cursor.u32()?,
            key_tag: cursor.u16()?,
            signer: cursor.name()?,
            signature: cursor.rest().to_vec(),
        })
    }

    /// Returns the RRSIG RDATA with the signature field removed and the
    /// signer's name in canonical form, which is the first part of the
    /// data covered by the signature ([RFC 4034 § 3.1.8.1]).
    ///
    /// [RFC 4034 § 3.1.8.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-3.1.8.1
    pub fn signed_header(&self) -> Vec<u8> {
        let signer = self.signer.to_lowercase();
        let mut header = Vec::with_capacity(RRSIG_FIXED_LEN + signer.wire_repr().len());
        header.extend_from_slice(&u16::from(self.type_covered).to_be_bytes());
        header.push(self.algorithm);
        header.push(self.labels);
        header.extend_from_slice(&self.original_ttl.to_be_bytes());
        header.extend_from_slice(&self.expiration.to_be_bytes());
        header.extend_from_slice(&self.inception.to_be_bytes());
        header.extend_from_slice(&self.key_tag.to_be_bytes());
        header.extend_from_slice(signer.wire_repr());
        header
    }

    /// Builds RRSIG RDATA from its fields.
    pub fn to_rdata(&self) -> Result<Rdata, Error> {
        let mut octets = self.signed_header();
        // signed_header lowercases the signer; keep the original case.
        octets.truncate(RRSIG_FIXED_LEN);
        octets.extend_from_slice(self.signer.wire_repr());
        octets.extend_from_slice(&self.signature);
        Rdata::new(octets)
    }
}

////////////////////////////////////////////////////////////////////////
// NSEC                                                               //
////////////////////////////////////////////////////////////////////////

/// The fields of NSEC RDATA ([RFC 4034 § 4.1]).
///
/// [RFC 4034 § 4.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-4.1
#[derive(Clone, Debug)]
pub struct Nsec {
    pub next: Name,
    pub types: TypeBitmap,
}

impl Nsec {
    pub fn parse(rdata: &Rdata) -> Result<Self, Error> {
        let mut cursor = Cursor::new(rdata.octets());
        let next = cursor.name()?;
        let types = TypeBitmap::from_wire(cursor.rest())?;
        Ok(Self { next, types })
    }

    pub fn to_rdata(&self) -> Result<Rdata, Error> {
        let mut octets = self.next.wire_repr().to_vec();
        octets.extend_from_slice(&self.types.to_wire());
        Rdata::new(octets)
    }
}

/// The set of types present at an NSEC owner name, in ascending order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TypeBitmap {
    types: Vec<Type>,
}

impl TypeBitmap {
    pub fn new(types: impl IntoIterator<Item = Type>) -> Self {
        let mut types: Vec<Type> = types.into_iter().collect();
        types.sort();
        types.dedup();
        Self { types }
    }

    pub fn contains(&self, rr_type: Type) -> bool {
        self.types.binary_search(&rr_type).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = Type> + '_ {
        self.types.iter().copied()
    }

    /// Decodes the window-block encoding of [RFC 4034 § 4.1.2].
    ///
    /// [RFC 4034 § 4.1.2]: https://datatracker.ietf.org/doc/html/rfc4034#section-4.1.2
    fn from_wire(mut octets: &[u8]) -> Result<Self, Error> {
        let mut types = Vec::new();
        while !octets.is_empty() {
            let window = *octets.first().ok_or(Error::UnexpectedEnd)? as u16;
            let len = *octets.get(1).ok_or(Error::UnexpectedEnd)? as usize;
            if len == 0 || len > 32 {
                return Err(Error::UnexpectedEnd);
            }
            let bitmap = octets.get(2..2 + len).ok_or(Error::UnexpectedEnd)?;
            for (i, &octet) in bitmap.iter().enumerate() {
                for bit in 0..8 {
                    if octet & (0x80 >> bit) != 0 {
                        types.push(Type::from(window * 256 + (i * 8 + bit) as u16));
                    }
                }
            }
            octets = &octets[2 + len..];
        }
        Ok(Self { types })
    }

    fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::new();
        let mut current: Option<(u8, [u8; 32], usize)> = None;
        for rr_type in &self.types {
            let value = u16::from(*rr_type);
            let window = (value >> 8) as u8;
            let offset = (value & 0xff) as usize;
            match current {
                Some((w, _, _)) if w == window => (),
                _ => {
                    if let Some((w, bitmap, len)) = current.take() {
                        push_window(&mut wire, w, &bitmap[..len]);
                    }
                    current = Some((window, [0; 32], 0));
                }
            }
            if let Some((_, ref mut bitmap, ref mut len)) = current {
                bitmap[offset / 8] |= 0x80 >> (offset % 8);
                *len = (*len).max(offset / 8 + 1);
            }
        }
        if let Some((w, bitmap, len)) = current {
            push_window(&mut wire, w, &bitmap[..len]);
        }
        wire
    }
}

fn push_window(wire: &mut Vec<u8>, window: u8, bitmap: &[u8]) {
    wire.push(window);
    wire.push(bitmap.len() as u8);
    wire.extend_from_slice(bitmap);
}

////////////////////////////////////////////////////////////////////////
// DNSKEY AND DS                                                      //
////////////////////////////////////////////////////////////////////////

/// The fields of DNSKEY RDATA ([RFC 4034 § 2.1]).
///
/// [RFC 4034 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-2.1
#[derive(Clone, Debug)]
pub struct Dnskey {
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: Vec<u8>,
    pub key_tag: u16,
}

/// The Zone Key flag of [RFC 4034 § 2.1.1].
///
/// [RFC 4034 § 2.1.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-2.1.1
const ZONE_KEY_FLAG: u16 = 0x0100;

impl Dnskey {
    pub fn parse(rdata: &Rdata) -> Result<Self, Error> {
        let mut cursor = Cursor::new(rdata.octets());
        Ok(Self {
            flags: cursor.u16()?,
            protocol: cursor.u8()?,
            algorithm: cursor.u8()?,
            public_key: cursor.rest().to_vec(),
            key_tag: key_tag(rdata.octets()),
        })
    }

    /// Returns whether the key may be used to verify zone data.
    pub fn is_zone_key(&self) -> bool {
        self.flags & ZONE_KEY_FLAG != 0
    }

    pub fn to_rdata(&self) -> Result<Rdata, Error> {
        let mut octets = self.flags.to_be_bytes().to_vec();
        octets.push(self.protocol);
        octets.push(self.algorithm);
        octets.extend_from_slice(&self.public_key);
        Rdata::new(octets)
    }
}

/// Computes the key tag of DNSKEY RDATA per [RFC 4034 Appendix B].
/// (The special case for the retired algorithm 1 is not implemented,
/// since that algorithm is not supported.)
///
/// [RFC 4034 Appendix B]: https://datatracker.ietf.org/doc/html/rfc4034#appendix-B
pub fn key_tag(octets: &[u8]) -> u16 {
    let mut accumulator: u32 = 0;
    for (i, &octet) in octets.iter().enumerate() {
        if i & 1 == 1 {
            accumulator += octet as u32;
        } else {
            accumulator += (octet as u32) << 8;
        }
    }
    accumulator += (accumulator >> 16) & 0xffff;
    (accumulator & 0xffff) as u16
}

/// The fields of DS RDATA ([RFC 4034 § 5.1]).
///
/// [RFC 4034 § 5.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-5.1
#[derive(Clone, Debug)]
pub struct Ds {
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    pub digest: Vec<u8>,
}

impl Ds {
    pub fn parse(rdata: &Rdata) -> Result<Self, Error> {
        let mut cursor = Cursor::new(rdata.octets());
        Ok(Self {
            key_tag: cursor.u16()?,
            algorithm: cursor.u8()?,
            digest_type: cursor.u8()?,
            digest: cursor.rest().to_vec(),
        })
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_bitmap_matches_rfc4034_example() {
        // From RFC 4034 § 4.3: A MX RRSIG NSEC TYPE1234.
        let bitmap = TypeBitmap::new([
            Type::A,
            Type::MX,
            Type::RRSIG,
            Type::NSEC,
            Type::from(1234),
        ]);
        let wire = bitmap.to_wire();
        assert_eq!(
            wire,
            [
                0x00, 0x06, 0x40, 0x01, 0x00, 0x00, 0x00, 0x03, 0x04, 0x1b, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20,
            ]
        );
        assert_eq!(TypeBitmap::from_wire(&wire), Ok(bitmap));
    }

    #[test]
    fn nsec_parses() {
        let nsec = Nsec {
            next: "host.example.com.".parse().unwrap(),
            types: TypeBitmap::new([Type::A, Type::NSEC]),
        };
        let parsed = Nsec::parse(&nsec.to_rdata().unwrap()).unwrap();
        assert_eq!(parsed.next, nsec.next);
        assert!(parsed.types.contains(Type::A));
        assert!(!parsed.types.contains(Type::MX));
    }

    #[test]
    fn key_tag_sums_with_carry() {
        assert_eq!(key_tag(&[0x01, 0x00, 0x03, 0x0d, 0xaa, 0xbb]), 0xaec8);
        assert_eq!(key_tag(&[0xff, 0xff, 0xff, 0xff]), 0xffff);
    }
}
