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

//! Parsing of resource records in presentation format.
//!
//! This understands the one-record-per-line subset of the master file
//! format of [RFC 1035 § 5.1]: an owner (absolute, `@`, or relative to
//! a supplied origin), an optional TTL, an optional class, a type, and
//! the RDATA fields. Comments start with `;`. Parentheses and
//! directives are not supported.
//!
//! [RFC 1035 § 5.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-5.1

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::rdata::{self, Dnskey, Nsec, Rrsig, TypeBitmap};
use super::{Rdata, Ttl, Type};
use crate::class::Class;
use crate::name::{self, Name};
use crate::util::ascii_hex_digit_to_nibble;

////////////////////////////////////////////////////////////////////////
// RECORDS                                                            //
////////////////////////////////////////////////////////////////////////

/// A single resource record parsed from presentation format.
#[derive(Clone, Debug)]
pub struct Record {
    pub owner: Name,
    pub ttl: Ttl,
    pub class: Class,
    pub rr_type: Type,
    pub rdata: Rdata,
}

impl FromStr for Record {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        parse_line(text, None)
            .map_err(|kind| Error { line: 1, kind })?
            .ok_or(Error {
                line: 1,
                kind: ErrorKind::ExpectedField("owner"),
            })
    }
}

/// Parses a block of records, one per line. Relative names are made
/// absolute with `origin`, if provided. When the TTL is omitted, it is
/// zero; when the class is omitted, IN is assumed.
pub fn parse_records(text: &str, origin: Option<&Name>) -> Result<Vec<Record>, Error> {
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        match parse_line(line, origin) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => (),
            Err(kind) => {
                return Err(Error {
                    line: index + 1,
                    kind,
                })
            }
        }
    }
    Ok(records)
}

/// Parses one line, returning `None` for blank and comment lines.
fn parse_line(line: &str, origin: Option<&Name>) -> Result<Option<Record>, ErrorKind> {
    let tokens = tokenize(line)?;
    let mut fields = tokens.iter().map(String::as_str);
    let owner = match fields.next() {
        Some(owner) => parse_name(owner, origin)?,
        None => return Ok(None),
    };

    // The TTL and class may appear in either order, and either may be
    // omitted. Per RFC 1035 § 5.1 the possible values are disjoint from
    // each other and from the types, so we can simply try each.
    let mut ttl = None;
    let mut class = None;
    let rr_type = loop {
        let field = fields.next().ok_or(ErrorKind::ExpectedField("type"))?;
        if ttl.is_none() && field.bytes().all(|b| b.is_ascii_digit()) {
            ttl = Some(Ttl::from(
                field.parse::<u32>().or(Err(ErrorKind::InvalidTtl))?,
            ));
        } else if let (None, Ok(parsed)) = (class, field.parse::<Class>()) {
            class = Some(parsed);
        } else {
            break field.parse::<Type>().or(Err(ErrorKind::InvalidType))?;
        }
    };

    let rest: Vec<&str> = fields.collect();
    let rdata = parse_rdata(rr_type, &rest, origin)?;
    Ok(Some(Record {
        owner,
        ttl: ttl.unwrap_or(Ttl::ZERO),
        class: class.unwrap_or(Class::IN),
        rr_type,
        rdata,
    }))
}

/// Parses a domain name field, applying `origin` to relative names.
fn parse_name(field: &str, origin: Option<&Name>) -> Result<Name, ErrorKind> {
    if field == "@" {
        return origin.cloned().ok_or(ErrorKind::RelativeNameWithoutOrigin);
    } else if field.ends_with('.') && !field.ends_with("\\.") {
        return field.parse().map_err(ErrorKind::InvalidName);
    }
    match origin {
        Some(origin) if origin.is_root() => format!("{}.", field).parse(),
        Some(origin) => format!("{}.{}", field, origin).parse(),
        None => return Err(ErrorKind::RelativeNameWithoutOrigin),
    }
    .map_err(ErrorKind::InvalidName)
}

////////////////////////////////////////////////////////////////////////
// RDATA                                                              //
////////////////////////////////////////////////////////////////////////

/// Parses the RDATA fields of a record of type `rr_type`. The generic
/// `\# <length> <hex>` form of [RFC 3597 § 5] is accepted for any type.
///
/// [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5
pub fn parse_rdata(
    rr_type: Type,
    fields: &[&str],
    origin: Option<&Name>,
) -> Result<Rdata, ErrorKind> {
    if fields.first() == Some(&"\\#") {
        return parse_generic_rdata(&fields[1..]);
    }
    let mut fields = Fields {
        inner: fields.iter(),
        origin,
    };
    let mut octets = Vec::new();
    match rr_type {
        Type::A => {
            let address: Ipv4Addr = fields
                .next("address")?
                .parse()
                .or(Err(ErrorKind::InvalidRdata("IPv4 address")))?;
            octets.extend_from_slice(&address.octets());
        }
        Type::AAAA => {
            let address: Ipv6Addr = fields
                .next("address")?
                .parse()
                .or(Err(ErrorKind::InvalidRdata("IPv6 address")))?;
            octets.extend_from_slice(&address.octets());
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
            octets.extend_from_slice(fields.name()?.wire_repr());
        }
        Type::MX | Type::AFSDB | Type::RT | Type::KX => {
            octets.extend_from_slice(&fields.integer::<u16>()?.to_be_bytes());
            octets.extend_from_slice(fields.name()?.wire_repr());
        }
        Type::SRV => {
            for _ in 0..3 {
                octets.extend_from_slice(&fields.integer::<u16>()?.to_be_bytes());
            }
            octets.extend_from_slice(fields.name()?.wire_repr());
        }
        Type::SOA => {
            octets.extend_from_slice(fields.name()?.wire_repr());
            octets.extend_from_slice(fields.name()?.wire_repr());
            for _ in 0..5 {
                octets.extend_from_slice(&fields.integer::<u32>()?.to_be_bytes());
            }
        }
        Type::TXT => {
            let strings = fields.remaining();
            if strings.is_empty() {
                return Err(ErrorKind::ExpectedField("character-string"));
            }
            for string in strings {
                push_character_string(&mut octets, string)?;
            }
        }
        Type::NAPTR => {
            octets.extend_from_slice(&fields.integer::<u16>()?.to_be_bytes());
            octets.extend_from_slice(&fields.integer::<u16>()?.to_be_bytes());
            for what in ["flags", "services", "regexp"] {
                push_character_string(&mut octets, fields.next(what)?)?;
            }
            octets.extend_from_slice(fields.name()?.wire_repr());
        }
        Type::DS => {
            octets.extend_from_slice(&fields.integer::<u16>()?.to_be_bytes());
            octets.push(fields.integer::<u8>()?);
            octets.push(fields.integer::<u8>()?);
            octets.extend_from_slice(&parse_hex(&fields.remaining_joined())?);
        }
        Type::DNSKEY => {
            let dnskey = Dnskey {
                flags: fields.integer()?,
                protocol: fields.integer()?,
                algorithm: fields.integer()?,
                public_key: parse_base64(&fields.remaining_joined())?,
                key_tag: 0,
            };
            return dnskey.to_rdata().map_err(ErrorKind::Rdata);
        }
        Type::RRSIG => {
            let type_covered = fields
                .next("type covered")?
                .parse()
                .or(Err(ErrorKind::InvalidType))?;
            let rrsig = Rrsig {
                type_covered,
                algorithm: fields.integer()?,
                labels: fields.integer()?,
                original_ttl: fields.integer()?,
                expiration: parse_timestamp(fields.next("expiration")?)?,
                inception: parse_timestamp(fields.next("inception")?)?,
                key_tag: fields.integer()?,
                signer: fields.name()?,
                signature: parse_base64(&fields.remaining_joined())?,
            };
            return rrsig.to_rdata().map_err(ErrorKind::Rdata);
        }
        Type::NSEC => {
            let next = fields.name()?;
            let types = fields
                .remaining()
                .into_iter()
                .map(|field| field.parse::<Type>().or(Err(ErrorKind::InvalidType)))
                .collect::<Result<Vec<_>, _>>()?;
            let nsec = Nsec {
                next,
                types: TypeBitmap::new(types),
            };
            return nsec.to_rdata().map_err(ErrorKind::Rdata);
        }
        _ => return Err(ErrorKind::UnsupportedType(rr_type)),
    }
    fields.finish()?;
    Rdata::new(octets).map_err(ErrorKind::Rdata)
}

fn parse_generic_rdata(fields: &[&str]) -> Result<Rdata, ErrorKind> {
    let len: usize = fields
        .first()
        .ok_or(ErrorKind::ExpectedField("RDATA length"))?
        .parse()
        .or(Err(ErrorKind::InvalidRdata("RDATA length")))?;
    let octets = parse_hex(&fields[1..].concat())?;
    if octets.len() != len {
        return Err(ErrorKind::InvalidRdata("RDATA length mismatch"));
    }
    Rdata::new(octets).map_err(ErrorKind::Rdata)
}

/// A cursor over RDATA fields.
struct Fields<'a, 'b> {
    inner: std::slice::Iter<'b, &'a str>,
    origin: Option<&'b Name>,
}

impl<'a, 'b> Fields<'a, 'b> {
    fn next(&mut self, what: &'static str) -> Result<&'a str, ErrorKind> {
        self.inner.next().copied().ok_or(ErrorKind::ExpectedField(what))
    }

    fn name(&mut self) -> Result<Name, ErrorKind> {
        parse_name(self.next("domain name")?, self.origin)
    }

    fn integer<T: FromStr>(&mut self) -> Result<T, ErrorKind> {
        self.next("integer")?
            .parse()
            .or(Err(ErrorKind::InvalidRdata("integer")))
    }

    fn remaining(&mut self) -> Vec<&'a str> {
        self.inner.by_ref().copied().collect()
    }

    fn remaining_joined(&mut self) -> String {
        self.remaining().concat()
    }

    fn finish(&self) -> Result<(), ErrorKind> {
        if self.inner.as_slice().is_empty() {
            Ok(())
        } else {
            Err(ErrorKind::TrailingFields)
        }
    }
}

fn push_character_string(octets: &mut Vec<u8>, string: &str) -> Result<(), ErrorKind> {
    let bytes = string.as_bytes();
    if bytes.len() > 255 {
        return Err(ErrorKind::InvalidRdata("character-string longer than 255 octets"));
    }
    octets.push(bytes.len() as u8);
    octets.extend_from_slice(bytes);
    Ok(())
}

fn parse_hex(text: &str) -> Result<Vec<u8>, ErrorKind> {
    let digits = text.as_bytes();
    if digits.len() % 2 != 0 {
        return Err(ErrorKind::InvalidRdata("hexadecimal"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let high = ascii_hex_digit_to_nibble(pair[0]);
            let low = ascii_hex_digit_to_nibble(pair[1]);
            match (high, low) {
                (Some(high), Some(low)) => Ok(high << 4 | low),
                _ => Err(ErrorKind::InvalidRdata("hexadecimal")),
            }
        })
        .collect()
}

fn parse_base64(text: &str) -> Result<Vec<u8>, ErrorKind> {
    BASE64
        .decode(text)
        .or(Err(ErrorKind::InvalidRdata("base64")))
}

/// Parses an RRSIG timestamp, given either as seconds since the epoch
/// or in the `YYYYMMDDHHmmSS` form of [RFC 4034 § 3.2].
///
/// [RFC 4034 § 3.2]: https://datatracker.ietf.org/doc/html/rfc4034#section-3.2
fn parse_timestamp(field: &str) -> Result<u32, ErrorKind> {
    let invalid = ErrorKind::InvalidRdata("timestamp");
    if field.len() != 14 {
        return field.parse().or(Err(invalid));
    }
    let number = |range: std::ops::Range<usize>| -> Result<i64, ErrorKind> {
        field[range].parse().or(Err(ErrorKind::InvalidRdata("timestamp")))
    };
    let (year, month, day) = (number(0..4)?, number(4..6)?, number(6..8)?);
    let (hour, minute, second) = (number(8..10)?, number(10..12)?, number(12..14)?);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 23 || minute > 59 || second > 60 {
        return Err(invalid);
    }

    // Days from the civil calendar date (Howard Hinnant's algorithm).
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    let days = era * 146097 + doe - 719468;

    let seconds = days * 86400 + hour * 3600 + minute * 60 + second;
    // Serial number arithmetic (RFC 4034 § 3.1.5) wraps modulo 2^32.
    Ok(seconds.rem_euclid(1 << 32) as u32)
}

////////////////////////////////////////////////////////////////////////
// TOKENIZATION                                                       //
////////////////////////////////////////////////////////////////////////

/// Splits a line into whitespace-separated fields. Quoted fields may
/// contain whitespace, and within them `\"`, `\\`, and `\DDD` escapes
/// are decoded. A `;` outside of quotes starts a comment.
fn tokenize(line: &str) -> Result<Vec<String>, ErrorKind> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == ';' {
            break;
        } else if c == '"' {
            chars.next();
            let mut token = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => {
                        let mut escape = String::new();
                        while let Some(&digit) = chars.peek() {
                            if escape.len() < 3 && digit.is_ascii_digit() {
                                escape.push(digit);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        if escape.is_empty() {
                            token.push(chars.next().ok_or(ErrorKind::UnterminatedString)?);
                        } else {
                            let value: u8 = escape
                                .parse()
                                .ok()
                                .filter(u8::is_ascii)
                                .ok_or(ErrorKind::InvalidRdata("escape"))?;
                            token.push(value as char);
                        }
                    }
                    Some(c) => token.push(c),
                    None => return Err(ErrorKind::UnterminatedString),
                }
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == ';' {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(token);
        }
    }
    Ok(tokens)
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error encountered while parsing records in presentation format.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Error {
    line: usize,
    kind: ErrorKind,
}

impl Error {
    /// Returns the line on which the error occurred.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl std::error::Error for Error {}

/// The kinds of [`Error`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    ExpectedField(&'static str),
    InvalidName(name::Error),
    InvalidRdata(&'static str),
    InvalidTtl,
    InvalidType,
    Rdata(rdata::Error),
    RelativeNameWithoutOrigin,
    TrailingFields,
    UnsupportedType(Type),
    UnterminatedString,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ExpectedField(what) => write!(f, "expected {}", what),
            Self::InvalidName(err) => write!(f, "invalid domain name: {}", err),
            Self::InvalidRdata(what) => write!(f, "invalid {}", what),
            Self::InvalidTtl => f.write_str("invalid TTL"),
            Self::InvalidType => f.write_str("invalid type"),
            Self::Rdata(err) => err.fmt(f),
            Self::RelativeNameWithoutOrigin => f.write_str("relative name with no origin"),
            Self::TrailingFields => f.write_str("unexpected trailing fields"),
            Self::UnsupportedType(rr_type) => {
                write!(f, "type {} needs the generic \\# syntax", rr_type)
            }
            Self::UnterminatedString => f.write_str("unterminated quoted string"),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_record() {
        let record: Record = "www.example.test. 300 IN A 192.0.2.1".parse().unwrap();
        assert_eq!(record.owner, "www.example.test.".parse().unwrap());
        assert_eq!(record.ttl, Ttl::from(300));
        assert_eq!(record.class, Class::IN);
        assert_eq!(record.rr_type, Type::A);
        assert_eq!(record.rdata.octets(), &[192, 0, 2, 1]);
    }

    #[test]
    fn class_and_ttl_may_be_swapped_or_omitted() {
        let record: Record = "a.test. IN 60 AAAA 2001:db8::1".parse().unwrap();
        assert_eq!(record.ttl, Ttl::from(60));
        let record: Record = "a.test. TXT \"hello world\" plain".parse().unwrap();
        assert_eq!(record.ttl, Ttl::ZERO);
        assert_eq!(record.rdata.octets(), b"\x0bhello world\x05plain");
    }

    #[test]
    fn relative_names_use_origin() {
        let origin: Name = "example.test.".parse().unwrap();
        let records = parse_records(
            "; a comment\n\
             @ 3600 SOA ns hostmaster 1 2 3 4 300\n\
             \n\
             www 300 CNAME host ; trailing comment\n",
            Some(&origin),
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].owner, origin);
        assert_eq!(
            records[1].rdata,
            Rdata::from_name(&"host.example.test.".parse().unwrap())
        );
    }

    #[test]
    fn errors_report_line_numbers() {
        let err = parse_records("a.test. 1 A 192.0.2.1\nb.test. 1 A nonsense\n", None).unwrap_err();
        assert_eq!(err.line(), 2);
        assert_eq!(err.kind(), &ErrorKind::InvalidRdata("IPv4 address"));
    }

    #[test]
    fn generic_rdata_is_accepted() {
        let record: Record = "a.test. 1 TYPE65280 \\# 3 abcdef".parse().unwrap();
        assert_eq!(record.rdata.octets(), &[0xab, 0xcd, 0xef]);
    }

    #[test]
    fn split_digests_are_joined() {
        let record: Record = "a.test. 1 DS 12345 13 2 ABCD ef01".parse().unwrap();
        assert_eq!(
            record.rdata.octets(),
            &[0x30, 0x39, 13, 2, 0xab, 0xcd, 0xef, 0x01]
        );
    }

    #[test]
    fn nsec_round_trips_through_display() {
        let record: Record = "a.test. 1 NSEC c.test. A RRSIG NSEC".parse().unwrap();
        assert_eq!(
            record.rdata.display(Type::NSEC).to_string(),
            "c.test. A RRSIG NSEC"
        );
    }

    #[test]
    fn timestamps_parse_in_both_forms() {
        assert_eq!(parse_timestamp("20220101000000"), Ok(1640995200));
        assert_eq!(parse_timestamp("1640995200"), Ok(1640995200));
        assert!(parse_timestamp("20221301000000").is_err());
    }
}
