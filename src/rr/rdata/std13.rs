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

//! Typed views of SOA and NAPTR RDATA.

use super::{Cursor, Error, Rdata};
use crate::name::Name;

/// The fields of SOA RDATA ([RFC 1035 § 3.3.13]).
///
/// [RFC 1035 § 3.3.13]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.3.13
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Soa {
    pub mname: Name,
    pub rname: Name,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl Soa {
    pub fn parse(rdata: &Rdata) -> Result<Self, Error> {
        let mut cursor = Cursor::new(rdata.octets());
        let soa = Self {
            mname: cursor.name()?,
            rname: cursor.name()?,
            serial: cursor.u32()?,
            refresh: cursor.u32()?,
            retry: cursor.u32()?,
            expire: cursor.u32()?,
            minimum: cursor.u32()?,
        };
        cursor.finish()?;
        Ok(soa)
    }

    pub fn to_rdata(&self) -> Rdata {
        let mut octets = Vec::with_capacity(
            self.mname.wire_repr().len() + self.rname.wire_repr().len() + 20,
        );
        octets.extend_from_slice(self.mname.wire_repr());
        octets.extend_from_slice(self.rname.wire_repr());
        for field in [
            self.serial,
            self.refresh,
            self.retry,
            self.expire,
            self.minimum,
        ] {
            octets.extend_from_slice(&field.to_be_bytes());
        }
        // Two names and five integers cannot exceed the RDATA limit.
        Rdata { octets: octets.into() }
    }
}

/// The fields of NAPTR RDATA ([RFC 3403 § 4.1]).
///
/// [RFC 3403 § 4.1]: https://datatracker.ietf.org/doc/html/rfc3403#section-4.1
#[derive(Clone, Debug)]
pub struct Naptr {
    pub order: u16,
    pub preference: u16,
    pub flags: Vec<u8>,
    pub services: Vec<u8>,
    pub regexp: Vec<u8>,
    pub replacement: Name,
    pub(super) replacement_offset: usize,
}

impl Naptr {
    pub fn parse(rdata: &Rdata) -> Result<Self, Error> {
        let mut cursor = Cursor::new(rdata.octets());
        let order = cursor.u16()?;
        let preference = cursor.u16()?;
        let flags = cursor.character_string()?.to_vec();
        let services = cursor.character_string()?.to_vec();
        let regexp = cursor.character_string()?.to_vec();
        let replacement_offset = cursor.position;
        let replacement = cursor.name()?;
        cursor.finish()?;
        Ok(Self {
            order,
            preference,
            flags,
            services,
            regexp,
            replacement,
            replacement_offset,
        })
    }
}
