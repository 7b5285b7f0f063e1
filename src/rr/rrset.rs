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

//! Implementation of the [`Rrset`] and [`Trust`] types.

use std::fmt;
use std::slice;
use std::sync::Arc;

use super::{Rdata, Ttl, Type};
use crate::class::Class;
use crate::name::Name;

////////////////////////////////////////////////////////////////////////
// TRUST LEVELS                                                       //
////////////////////////////////////////////////////////////////////////

/// How much confidence we have in the data of an [`Rrset`].
///
/// The levels follow the ranking of [RFC 2181 § 5.4.1], extended with
/// the DNSSEC states of [RFC 4035 § 4.3]: data that has not yet been
/// validated is *pending*, and data that has been validated is
/// *secure*. Authoritative zone data is [`Trust::Ultimate`]. The
/// variants are declared in increasing order of trust, so they can be
/// compared with `<` and `>`.
///
/// [RFC 2181 § 5.4.1]: https://datatracker.ietf.org/doc/html/rfc2181#section-5.4.1
/// [RFC 4035 § 4.3]: https://datatracker.ietf.org/doc/html/rfc4035#section-4.3
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Trust {
    /// Unvalidated data from the additional section of a response.
    PendingAdditional,

    /// Unvalidated data from the answer or authority section of a
    /// response.
    PendingAnswer,

    /// Non-authoritative additional data.
    Additional,

    /// Glue from a referral.
    Glue,

    /// Non-authoritative answer data.
    Answer,

    /// Authority-section data from an authoritative response.
    AuthAuthority,

    /// Answer-section data from an authoritative response.
    AuthAnswer,

    /// Data proven secure by DNSSEC validation.
    Secure,

    /// Data from a locally loaded authoritative zone.
    Ultimate,
}

impl Trust {
    /// Returns whether the data still needs DNSSEC validation.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::PendingAdditional | Self::PendingAnswer)
    }

    /// Returns whether the data is glue (or weaker additional data).
    pub fn is_glue(self) -> bool {
        matches!(self, Self::Additional | Self::Glue)
    }
}

impl fmt::Display for Trust {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::PendingAdditional => "pending-additional",
            Self::PendingAnswer => "pending-answer",
            Self::Additional => "additional",
            Self::Glue => "glue",
            Self::Answer => "answer",
            Self::AuthAuthority => "authauthority",
            Self::AuthAnswer => "authanswer",
            Self::Secure => "secure",
            Self::Ultimate => "ultimate",
        })
    }
}

////////////////////////////////////////////////////////////////////////
// RRSETS                                                             //
////////////////////////////////////////////////////////////////////////

/// A resource record set.
///
/// [RFC 2181 § 5] defined an RRset as a group of records with the same
/// label, class, and type, and also stipulated that all records in an
/// RRset have the same TTL. The label of an `Rrset` is not stored in
/// the structure itself, but rather is kept track of separately by its
/// owner.
///
/// Signatures are kept as separate RRSIG `Rrset`s whose `covers` field
/// names the type they sign. An `Rrset` synthesized from a wildcard in
/// a signed zone also carries the NSEC proof that the query name itself
/// does not exist ([RFC 4035 § 3.1.3.3]).
///
/// [RFC 2181 § 5]: https://datatracker.ietf.org/doc/html/rfc2181#section-5
/// [RFC 4035 § 3.1.3.3]: https://datatracker.ietf.org/doc/html/rfc4035#section-3.1.3.3
#[derive(Clone, Debug)]
pub struct Rrset {
    pub rr_type: Type,
    pub covers: Option<Type>,
    pub class: Class,
    pub ttl: Ttl,
    pub trust: Trust,
    pub noqname: Option<Arc<NoQnameProof>>,
    rdatas: Vec<Rdata>,
}

/// The NSEC RRset (and its signatures) proving that no name closer to
/// the query name than a wildcard's source exists.
#[derive(Clone, Debug)]
pub struct NoQnameProof {
    pub owner: Name,
    pub nsec: Rrset,
    pub sigs: Option<Rrset>,
}

impl Rrset {
    /// Creates a new `Rrset` with the given RR type, class, and TTL.
    /// It will initially contain no record data and be of
    /// [`Trust::Ultimate`].
    pub fn new(rr_type: Type, class: Class, ttl: Ttl) -> Self {
        Self {
            rr_type,
            covers: None,
            class,
            ttl,
            trust: Trust::Ultimate,
            noqname: None,
            rdatas: Vec::new(),
        }
    }

    /// Creates a new, empty RRSIG `Rrset` covering `covers`.
    pub fn new_signatures(covers: Type, class: Class, ttl: Ttl) -> Self {
        Self {
            covers: Some(covers),
            ..Self::new(Type::RRSIG, class, ttl)
        }
    }

    /// Returns this `Rrset` with its trust level set to `trust`.
    pub fn with_trust(mut self, trust: Trust) -> Self {
        self.trust = trust;
        self
    }

    /// Adds an [`Rdata`] to this `Rrset`. Following the behavior of
    /// other nameservers, we silently discard [`Rdata`] that is already
    /// present in the `Rrset`.
    pub fn push_rdata(&mut self, rdata: Rdata) {
        if !self
            .rdatas
            .iter()
            .any(|existing| existing.equals(&rdata, self.rr_type))
        {
            self.rdatas.push(rdata);
        }
    }

    /// Returns an iterator over the [`Rdata`] of this `Rrset`.
    pub fn rdatas(&self) -> slice::Iter<Rdata> {
        self.rdatas.iter()
    }

    /// Returns the first [`Rdata`], if any. This is convenient for
    /// singleton types such as SOA, CNAME, and DNAME.
    pub fn first(&self) -> Option<&Rdata> {
        self.rdatas.first()
    }

    /// Returns the number of records in the `Rrset`.
    pub fn len(&self) -> usize {
        self.rdatas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rdatas.is_empty()
    }

    /// Reorders the records according to `order`, which must be a
    /// permutation of `0..self.len()`.
    pub fn reorder(&mut self, order: &[usize]) {
        let mut reordered = Vec::with_capacity(self.rdatas.len());
        for &i in order {
            if let Some(rdata) = self.rdatas.get(i) {
                reordered.push(rdata.clone());
            }
        }
        if reordered.len() == self.rdatas.len() {
            self.rdatas = reordered;
        }
    }

    /// Returns whether this `Rrset` has type `rr_type` and (for
    /// signatures) covers `covers`.
    pub fn matches(&self, rr_type: Type, covers: Option<Type>) -> bool {
        self.rr_type == rr_type && self.covers == covers
    }

    /// Writes this `Rrset` in presentation format, one record per line.
    pub fn display<'a>(&'a self, owner: &'a Name) -> DisplayRrset<'a> {
        DisplayRrset { rrset: self, owner }
    }
}

/// Displays an [`Rrset`] in presentation format.
pub struct DisplayRrset<'a> {
    rrset: &'a Rrset,
    owner: &'a Name,
}

impl fmt::Display for DisplayRrset<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, rdata) in self.rrset.rdatas().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "{}\t{}\t{}\t{}\t{}",
                self.owner,
                self.rrset.ttl,
                self.rrset.class,
                self.rrset.rr_type,
                rdata.display(self.rrset.rr_type)
            )?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_rdata_is_discarded() {
        let mut rrset = Rrset::new(Type::NS, Class::IN, Ttl::from(3600));
        rrset.push_rdata(Rdata::from_name(&"ns1.example.test.".parse().unwrap()));
        rrset.push_rdata(Rdata::from_name(&"NS1.example.test.".parse().unwrap()));
        rrset.push_rdata(Rdata::from_name(&"ns2.example.test.".parse().unwrap()));
        assert_eq!(rrset.len(), 2);
    }

    #[test]
    fn trust_is_ordered() {
        assert!(Trust::PendingAnswer < Trust::Glue);
        assert!(Trust::Glue < Trust::Secure);
        assert!(Trust::Secure < Trust::Ultimate);
        assert!(Trust::PendingAdditional.is_pending());
        assert!(Trust::Glue.is_glue());
        assert!(!Trust::Answer.is_glue());
    }

    #[test]
    fn reorder_ignores_bad_permutations() {
        let mut rrset = Rrset::new(Type::A, Class::IN, Ttl::from(60));
        rrset.push_rdata(Rdata::new(vec![192, 0, 2, 1]).unwrap());
        rrset.push_rdata(Rdata::new(vec![192, 0, 2, 2]).unwrap());
        rrset.reorder(&[1, 0]);
        assert_eq!(rrset.first().unwrap().octets(), &[192, 0, 2, 2]);
        rrset.reorder(&[0]);
        assert_eq!(rrset.len(), 2);
    }
}
