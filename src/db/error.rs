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

//! Implementation of the [`Error`] type for database errors.

use std::fmt;

use crate::rr::rdata;

/// Errors that arise when adding data to a [`Database`](super::Database).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    NotInZone,
    ClassMismatch,
    MissingSoa,
    InvalidRdata(rdata::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::NotInZone => f.write_str("the record's owner is not within the zone"),
            Self::ClassMismatch => {
                f.write_str("the record's class does not match the database's class")
            }
            Self::MissingSoa => f.write_str("the zone has no SOA record at its apex"),
            Self::InvalidRdata(e) => write!(f, "invalid RDATA: {e}"),
        }
    }
}

impl From<rdata::Error> for Error {
    fn from(error: rdata::Error) -> Self {
        Self::InvalidRdata(error)
    }
}

impl std::error::Error for Error {}
