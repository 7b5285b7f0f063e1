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

//! Implementation of the [`Rdata`] type and DNS RDATA processing.

use std::borrow::Cow;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::Type;
use crate::name::{self, Name};
use crate::util::nibble_to_ascii_hex_digit;

mod dnssec;
mod std13;
pub use dnssec::{Dnskey, Ds, Nsec, Rrsig, TypeBitmap};
pub use std13::{Naptr, Soa};

/// The maximum length of RDATA.
const MAX_RDATA_LEN: usize = u16::MAX as usize;

////////////////////////////////////////////////////////////////////////
// RDATA TYPE                                                         //
////////////////////////////////////////////////////////////////////////

/// The RDATA of a single record, stored in its uncompressed wire form.
///
/// The RDATA of a record is limited to 65,535 octets; an `Rdata` can
/// only be constructed if the underlying data has a valid length.
/// Interpretation of the octets depends on the record's [`Type`], so
/// methods that need it take the type as an argument. Typed views of
/// the RDATA formats used by the query engine ([`Soa`], [`Rrsig`],
/// [`Nsec`], [`Dnskey`], [`Ds`], [`Naptr`]) parse out of an `Rdata`.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Rdata {
    octets: Box<[u8]>,
}

#[allow(clippy::len_without_is_empty)]
impl Rdata {
    /// Wraps up wire-format RDATA.
    pub fn new(octets: impl Into<Box<[u8]>>) -> Result<Self, Error> {
        let octets = octets.into();
        if octets.len() > MAX_RDATA_LEN {
            Err(Error::TooLong)
        } else {
            Ok(Self { octets })
        }
    }

    /// Creates RDATA consisting of a single domain name, as used by NS,
    /// CNAME, DNAME, PTR, and similar types.
    pub fn from_name(name: &Name) -> Self {
        Self {
            octets: name.wire_repr().into(),
        }
    }

    /// Returns the octets of this `Rdata`.
    pub fn octets(&self) -> &[u8] {
        &self.octets
    }

    /// Returns the length of the RDATA in octets.
    pub fn len(&self) -> usize {
        self.octets.len()
    }

    /// Determines whether this `Rdata` is equal to another, assuming
    /// that they are both of type `rr_type`.
    ///
    /// [RFC 3597 § 6] specifies that RRs of unknown type are equal when
    /// their RDATA is bitwise equal. Only types that predate the RFC
    /// and embed domain names compare those names case-insensitively;
    /// [`Rdata::canonical`] does the work of normalizing them.
    ///
    /// [RFC 3597 § 6]: https://datatracker.ietf.org/doc/html/rfc3597#section-6
    pub fn equals(&self, other: &Self, rr_type: Type) -> bool {
        self.canonical(rr_type) == other.canonical(rr_type)
    }

    /// Returns the canonical form of this RDATA per [RFC 4034 § 6.2]
    /// (as amended by [RFC 6840 § 5.1]): domain names embedded in the
    /// RDATA of the older well-known types are lowercased. For other
    /// types, and for malformed RDATA, the octets are returned as-is.
    ///
    /// [RFC 4034 § 6.2]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.2
    /// [RFC 6840 § 5.1]: https://datatracker.ietf.org/doc/html/rfc6840#section-5.1
    pub fn canonical(&self, rr_type: Type) -> Cow<[u8]> {
        let ranges = self.name_ranges(rr_type).unwrap_or_default();
        if ranges.is_empty() {
            return Cow::Borrowed(&self.octets);
        }
        let mut canonical = self.octets.to_vec();
        for (start, end) in ranges {
            canonical[start..end].make_ascii_lowercase();
        }
        Cow::Owned(canonical)
    }

    /// Returns the octet ranges of the embedded domain names that
    /// [`Rdata::canonical`] lowercases.
    fn name_ranges(&self, rr_type: Type) -> Result<Vec<(usize, usize)>, Error> {
        let name_range = |start: usize| -> Result<(usize, usize), Error> {
            let octets = self.octets.get(start..).ok_or(Error::UnexpectedEnd)?;
            let (_, len) = Name::try_from_uncompressed(octets)?;
            Ok((start, start + len))
        };
        match rr_type {
            Type::NS
            | Type::MD
            | Type::MF
            | Type::CNAME
            | Type::MB
            | Type::MG
            | Type::MR
            | Type::PTR
            | Type::DNAME => Ok(vec![name_range(0)?]),
            Type::SOA | Type::MINFO => {
                let first = name_range(0)?;
                let second = name_range(first.1)?;
                Ok(vec![first, second])
            }
            Type::MX | Type::AFSDB | Type::RT | Type::KX => Ok(vec![name_range(2)?]),
            Type::SRV => Ok(vec![name_range(6)?]),
            Type::NAPTR => {
                let naptr = Naptr::parse(self)?;
                Ok(vec![name_range(naptr.replacement_offset)?])
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Returns the domain name that this RDATA points to for types
    /// whose RDATA is (or begins with) a single name: the canonical
    /// name of a CNAME, the target of a DNAME, and so on.
    pub fn target_name(&self, rr_type: Type) -> Result<Name, Error> {
        let start = match rr_type {
            Type::MX | Type::AFSDB | Type::RT | Type::KX => 2,
            Type::SRV => 6,
            _ => 0,
        };
        let octets = self.octets.get(start..).ok_or(Error::UnexpectedEnd)?;
        Ok(Name::try_from_uncompressed(octets)?.0)
    }

    /// For RDATA that calls for additional section processing
    /// ([RFC 1035 § 3.3], [RFC 2782], [RFC 3403 § 4.1]), returns the
    /// name to look up and the kind of data wanted. [`Type::A`] stands
    /// for all address records (A and AAAA).
    ///
    /// [RFC 1035 § 3.3]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.3
    /// [RFC 2782]: https://datatracker.ietf.org/doc/html/rfc2782
    /// [RFC 3403 § 4.1]: https://datatracker.ietf.org/doc/html/rfc3403#section-4.1
    pub fn additional_target(&self, rr_type: Type) -> Option<(Name, Type)> {
        match rr_type {
            Type::NS
            | Type::MD
            | Type::MF
            | Type::MB
            | Type::MX
            | Type::AFSDB
            | Type::RT
            | Type::KX
            | Type::SRV => self.target_name(rr_type).ok().map(|name| (name, Type::A)),
            Type::NAPTR => {
                let naptr = Naptr::parse(self).ok()?;
                if naptr.replacement.is_root() {
                    None
                } else if naptr.flags.eq_ignore_ascii_case(b"s") {
                    Some((naptr.replacement, Type::SRV))
                } else if naptr.flags.eq_ignore_ascii_case(b"a") {
                    Some((naptr.replacement, Type::A))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Returns an object that displays this RDATA in presentation
    /// format, interpreting it as type `rr_type`.
    pub fn display(&self, rr_type: Type) -> DisplayRdata {
        DisplayRdata {
            rdata: self,
            rr_type,
        }
    }
}

impl fmt::Debug for Rdata {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_generic(f, &self.octets)
    }
}

////////////////////////////////////////////////////////////////////////
// PRESENTATION FORMAT                                                //
////////////////////////////////////////////////////////////////////////

/// Displays [`Rdata`] in presentation format. RDATA of unknown types
/// (or RDATA that does not parse as its type) uses the generic
/// `\# <length> <hex>` form of [RFC 3597 § 5].
///
/// [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5
pub struct DisplayRdata<'a> {
    rdata: &'a Rdata,
    rr_type: Type,
}

impl fmt::Display for DisplayRdata<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.write_typed(f) {
            Some(result) => result,
            None => write_generic(f, &self.rdata.octets),
        }
    }
}

impl DisplayRdata<'_> {
    /// Writes the type-specific representation, or returns `None` if
    /// the type is unknown or the RDATA is malformed.
    fn write_typed(&self, f: &mut fmt::Formatter) -> Option<fmt::Result> {
        let octets = self.rdata.octets();
        let result = match self.rr_type {
            Type::A => {
                let octets: [u8; 4] = octets.try_into().ok()?;
                write!(f, "{}", Ipv4Addr::from(octets))
            }
            Type::AAAA => {
                let octets: [u8; 16] = octets.try_into().ok()?;
                write!(f, "{}", Ipv6Addr::from(octets))
            }
            Type::NS
            | Type::MD
            | Type::MF
            | Type::CNAME
            | Type::MB
            | Type::MG
            | Type::MR
            | Type::PTR
            | Type::DNAME => {
                let name = Name::try_from_uncompressed_all(octets).ok()?;
                write!(f, "{}", name)
            }
            Type::MX | Type::AFSDB | Type::RT | Type::KX => {
                let preference = u16::from_be_bytes(octets.get(0..2)?.try_into().ok()?);
                let name = Name::try_from_uncompressed_all(&octets[2..]).ok()?;
                write!(f, "{} {}", preference, name)
            }
            Type::SRV => {
                let fields = octets.get(0..6)?;
                let name = Name::try_from_uncompressed_all(&octets[6..]).ok()?;
                write!(
                    f,
                    "{} {} {} {}",
                    u16::from_be_bytes([fields[0], fields[1]]),
                    u16::from_be_bytes([fields[2], fields[3]]),
                    u16::from_be_bytes([fields[4], fields[5]]),
                    name
                )
            }
            Type::SOA => {
                let soa = Soa::parse(self.rdata).ok()?;
                write!(
                    f,
                    "{} {} {} {} {} {} {}",
                    soa.mname,
                    soa.rname,
                    soa.serial,
                    soa.refresh,
                    soa.retry,
                    soa.expire,
                    soa.minimum
                )
            }
            Type::TXT => write_character_strings(f, octets)?,
            Type::NAPTR => {
                let naptr = Naptr::parse(self.rdata).ok()?;
                write!(f, "{} {} ", naptr.order, naptr.preference)
                    .and_then(|_| write_character_string(f, &naptr.flags))
                    .and_then(|_| f.write_str(" "))
                    .and_then(|_| write_character_string(f, &naptr.services))
                    .and_then(|_| f.write_str(" "))
                    .and_then(|_| write_character_string(f, &naptr.regexp))
                    .and_then(|_| write!(f, " {}", naptr.replacement))
            }
            Type::DS => {
                let ds = Ds::parse(self.rdata).ok()?;
                write!(f, "{} {} {} ", ds.key_tag, ds.algorithm, ds.digest_type)
                    .and_then(|_| write_hex(f, &ds.digest))
            }
            Type::DNSKEY => {
                let dnskey = Dnskey::parse(self.rdata).ok()?;
                write!(
                    f,
                    "{} {} {} {}",
                    dnskey.flags,
                    dnskey.protocol,
                    dnskey.algorithm,
                    BASE64.encode(&dnskey.public_key)
                )
            }
            Type::RRSIG => {
                let rrsig = Rrsig::parse(self.rdata).ok()?;
                write!(
                    f,
                    "{} {} {} {} {} {} {} {} {}",
                    rrsig.type_covered,
                    rrsig.algorithm,
                    rrsig.labels,
                    rrsig.original_ttl,
                    rrsig.expiration,
                    rrsig.inception,
                    rrsig.key_tag,
                    rrsig.signer,
                    BASE64.encode(&rrsig.signature)
                )
            }
            Type::NSEC => {
                let nsec = Nsec::parse(self.rdata).ok()?;
                write!(f, "{}", nsec.next).and_then(|_| {
                    nsec.types
                        .iter()
                        .try_for_each(|rr_type| write!(f, " {}", rr_type))
                })
            }
            _ => return None,
        };
        Some(result)
    }
}

/// Writes a sequence of `<character-string>`s, or returns `None` if the
/// octets are not a valid sequence.
fn write_character_strings(f: &mut fmt::Formatter, mut octets: &[u8]) -> Option<fmt::Result> {
    let mut strings = Vec::new();
    while let Some(&len) = octets.first() {
        let string = octets.get(1..1 + len as usize)?;
        strings.push(string);
        octets = &octets[1 + len as usize..];
    }
    let mut result = Ok(());
    for (i, string) in strings.into_iter().enumerate() {
        if i > 0 {
            result = result.and_then(|_| f.write_str(" "));
        }
        result = result.and_then(|_| write_character_string(f, string));
    }
    Some(result)
}

/// Writes a quoted `<character-string>`, escaping as in RFC 1035 § 5.1.
fn write_character_string(f: &mut fmt::Formatter, octets: &[u8]) -> fmt::Result {
    f.write_str("\"")?;
    for &octet in octets {
        if octet == b'"' || octet == b'\\' {
            write!(f, "\\{}", octet as char)?;
        } else if octet == b' ' || octet.is_ascii_graphic() {
            write!(f, "{}", octet as char)?;
        } else {
            write!(f, "\\{:03}", octet)?;
        }
    }
    f.write_str("\"")
}

fn write_hex(f: &mut fmt::Formatter, octets: &[u8]) -> fmt::Result {
    for octet in octets {
        let high = nibble_to_ascii_hex_digit(octet >> 4);
        let low = nibble_to_ascii_hex_digit(octet & 0xf);
        write!(f, "{}{}", high as char, low as char)?;
    }
    Ok(())
}

fn write_generic(f: &mut fmt::Formatter, octets: &[u8]) -> fmt::Result {
    write!(f, "\\# {}", octets.len())?;
    if !octets.is_empty() {
        f.write_str(" ")?;
        write_hex(f, octets)?;
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that RDATA is malformed for its type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// The RDATA would be longer than 65,535 octets.
    TooLong,

    /// The RDATA ended before all of its fields were read.
    UnexpectedEnd,

    /// There was data left over after the last field.
    ExtraData,

    /// An embedded domain name was invalid.
    InvalidName(name::Error),
}

impl From<name::Error> for Error {
    fn from(err: name::Error) -> Self {
        Self::InvalidName(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::TooLong => f.write_str("RDATA is longer than 65,535 octets"),
            Self::UnexpectedEnd => f.write_str("RDATA ended unexpectedly"),
            Self::ExtraData => f.write_str("extra data after RDATA fields"),
            Self::InvalidName(err) => write!(f, "invalid embedded name: {}", err),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// PARSING HELPERS                                                    //
////////////////////////////////////////////////////////////////////////

/// A cursor over RDATA octets used by the typed views.
pub(super) struct Cursor<'a> {
    octets: &'a [u8],
    pub(super) position: usize,
}

impl<'a> Cursor<'a> {
    pub(super) fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
        }
    }

    pub(super) fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let slice = self
            .octets
            .get(self.position..self.position + n)
            .ok_or(Error::UnexpectedEnd)?;
        self.position += n;
        Ok(slice)
    }

    pub(super) fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub(super) fn u16(&mut self) -> Result<u16, Error> {
        let octets = self.take(2)?;
        Ok(u16::from_be_bytes([octets[0], octets[1]]))
    }

    pub(super) fn u32(&mut self) -> Result<u32, Error> {
        let octets = self.take(4)?;
        Ok(u32::from_be_bytes([octets[0], octets[1], octets[2], octets[3]]))
    }

    pub(super) fn name(&mut self) -> Result<Name, Error> {
        let (name, len) = Name::try_from_uncompressed(&self.octets[self.position..])?;
        self.position += len;
        Ok(name)
    }

    pub(super) fn character_string(&mut self) -> Result<&'a [u8], Error> {
        let len = self.u8()? as usize;
        self.take(len)
    }

    pub(super) fn rest(&mut self) -> &'a [u8] {
        let rest = &self.octets[self.position..];
        self.position = self.octets.len();
        rest
    }

    pub(super) fn finish(&self) -> Result<(), Error> {
        if self.position == self.octets.len() {
            Ok(())
        } else {
            Err(Error::ExtraData)
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn name(text: &str) -> Name {
        text.parse().unwrap()
    }

    #[test]
    fn equals_ignores_case_in_embedded_names() {
        let lower = Rdata::from_name(&name("ns.example.test."));
        let upper = Rdata::from_name(&name("NS.Example.TEST."));
        assert!(lower.equals(&upper, Type::NS));
        assert!(!lower.equals(&upper, Type::TXT));
    }

    #[test]
    fn mx_additional_target_works() {
        let mut octets = vec![0, 10];
        octets.extend_from_slice(name("mail.example.test.").wire_repr());
        let rdata = Rdata::new(octets).unwrap();
        assert_eq!(
            rdata.additional_target(Type::MX),
            Some((name("mail.example.test."), Type::A))
        );
        assert_eq!(rdata.display(Type::MX).to_string(), "10 mail.example.test.");
    }

    #[test]
    fn srv_additional_target_works() {
        let mut octets = vec![0, 1, 0, 2, 0, 53];
        octets.extend_from_slice(name("srv.example.test.").wire_repr());
        let rdata = Rdata::new(octets).unwrap();
        assert_eq!(
            rdata.additional_target(Type::SRV),
            Some((name("srv.example.test."), Type::A))
        );
    }

    #[test]
    fn unknown_types_display_generically() {
        let rdata = Rdata::new(vec![0xde, 0xad]).unwrap();
        assert_eq!(rdata.display(Type::from(65280)).to_string(), "\\# 2 dead");
        assert_eq!(
            Rdata::new(vec![]).unwrap().display(Type::from(65280)).to_string(),
            "\\# 0"
        );
    }

    #[test]
    fn addresses_display() {
        let a = Rdata::new(vec![192, 0, 2, 1]).unwrap();
        assert_eq!(a.display(Type::A).to_string(), "192.0.2.1");
        let malformed = Rdata::new(vec![192, 0, 2]).unwrap();
        assert_eq!(malformed.display(Type::A).to_string(), "\\# 3 c00002");
    }

    #[test]
    fn txt_displays_quoted() {
        let rdata = Rdata::new(b"\x05hello\x03a\"b".to_vec()).unwrap();
        assert_eq!(rdata.display(Type::TXT).to_string(), "\"hello\" \"a\\\"b\"");
    }
}
