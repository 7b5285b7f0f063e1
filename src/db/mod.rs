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

//! Facilities for storing and accessing DNS data.
//!
//! The query engine searches two kinds of database: authoritative zone
//! databases ([`ZoneDb`]), which hold the complete data for a zone, and
//! the cache ([`CacheDb`]), which holds whatever the resolver has
//! learned from other servers. Both are reached through the
//! [`Database`] trait, whose central operation is [`Database::find`].
//!
//! A find does more than fetch an RRset. Following the lookup algorithm
//! of [RFC 1034 § 4.3.2], it reports *why* the requested data is or is
//! not there: the name may lie below a zone cut, may be an alias, may
//! exist without the requested type, or may not exist at all. The
//! [`Lookup`] enumeration carries these outcomes along with the data the
//! query engine needs to act on them (NS RRsets for referrals, NSEC
//! records proving non-existence, and so on).
//!
//! ## Versions
//!
//! Zone databases are versioned. A [`Version`] obtained from
//! [`Database::current_version`] is a snapshot, and every lookup made
//! with it sees the same data even if the zone is updated in the
//! meantime. The cache is not versioned in this sense; its version is a
//! placeholder.
//!
//! [RFC 1034 § 4.3.2]: https://datatracker.ietf.org/doc/html/rfc1034#section-4.3.2

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::class::Class;
use crate::name::Name;
use crate::rr::rdata::Rrsig;
use crate::rr::text::Record;
use crate::rr::{Rrset, Ttl, Type};

mod cache;
mod error;
mod zone;

pub use cache::CacheDb;
pub use error::Error;
pub use zone::ZoneDb;

////////////////////////////////////////////////////////////////////////
// DATABASE TRAIT                                                     //
////////////////////////////////////////////////////////////////////////

/// Trait for DNS databases searched by the query engine.
pub trait Database: fmt::Debug + Send + Sync {
    /// Returns an identifier unique to this database instance.
    fn id(&self) -> DbId;

    /// Returns the name at the top of the database: the zone apex for
    /// zone databases and the root for the cache.
    fn origin(&self) -> &Name;

    fn class(&self) -> Class;

    /// Returns whether this is a cache database.
    fn is_cache(&self) -> bool {
        false
    }

    /// Opens a snapshot of the current contents of the database.
    fn current_version(&self) -> Version;

    /// Closes a version opened with [`Database::current_version`].
    fn close_version(&self, version: Version) {
        drop(version);
    }

    /// Returns whether the database (at `version`) is a signed zone.
    fn is_secure(&self, version: Option<&Version>) -> bool;

    /// Looks up data of type `rr_type` owned by `name`. Passing
    /// [`Type::ANY`] returns all of the RRsets at the name in
    /// [`Found::all`]. `now` is the current time in seconds, used to
    /// expire cached data.
    fn find(
        &self,
        name: &Name,
        version: Option<&Version>,
        rr_type: Type,
        options: FindOptions,
        now: u64,
    ) -> Lookup;

    /// Returns the deepest zone cut (NS RRset) at or above `name`.
    fn find_zonecut(&self, name: &Name, now: u64) -> Option<Found>;

    /// Returns the RRset of `rr_type` at exactly `name`, along with its
    /// signatures, without any of the interpretation performed by
    /// [`Database::find`].
    fn find_rrset(
        &self,
        name: &Name,
        version: Option<&Version>,
        rr_type: Type,
        now: u64,
    ) -> Option<(Rrset, Option<Rrset>)>;

    /// Adds (or replaces) an RRset owned by `name`.
    fn add_rrset(&self, name: &Name, rrset: Rrset, now: u64) -> Result<(), Error>;
}

/// An identifier unique to a database instance, used to tell whether
/// cached information refers to a particular database.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DbId(u64);

impl DbId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A snapshot of a database's contents.
#[derive(Clone)]
pub struct Version {
    db: DbId,
    serial: u64,
    snapshot: Arc<dyn Any + Send + Sync>,
}

impl Version {
    pub(crate) fn new(db: DbId, serial: u64, snapshot: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            db,
            serial,
            snapshot,
        }
    }

    /// Returns the database this version belongs to.
    pub fn db(&self) -> DbId {
        self.db
    }

    /// Returns the serial number of this version. Versions of the same
    /// database with the same serial have the same contents.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub(crate) fn snapshot<T: Any>(&self) -> Option<&T> {
        self.snapshot.downcast_ref()
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Version")
            .field("db", &self.db)
            .field("serial", &self.serial)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////
// LOOKUP TYPES                                                       //
////////////////////////////////////////////////////////////////////////

/// Options for [`Database::find`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FindOptions {
    /// Searches below zone cuts, returning glue data as
    /// [`Lookup::Glue`]. Glue-trust cache data is only returned when
    /// this is set.
    pub glue_ok: bool,

    /// Returns cached data that has not been DNSSEC-validated yet.
    pub pending_ok: bool,

    /// Disables wildcard matching.
    pub no_wild: bool,
}

/// The result of [`Database::find`].
#[derive(Clone, Debug)]
pub enum Lookup {
    /// The requested data was found.
    Success(Found),

    /// Glue data below a zone cut was found (only with
    /// [`FindOptions::glue_ok`]).
    Glue(Found),

    /// The name is a zone cut and NS or ANY data was requested with
    /// [`FindOptions::glue_ok`].
    ZoneCut(Found),

    /// The name is at or below a zone cut; the NS RRset of the cut is
    /// returned.
    Delegation(Found),

    /// The name owns a CNAME RRset.
    Cname(Found),

    /// A superdomain of the name owns a DNAME RRset.
    Dname(Found),

    /// The name exists, but has no data of the requested type.
    NxRrset(Negative),

    /// The name exists only as an empty non-terminal.
    EmptyName(Negative),

    /// The name does not exist.
    NxDomain(Negative),

    /// The name matches a wildcard that is an empty non-terminal.
    EmptyWild(Negative),

    /// The cache holds a negative response saying the name does not
    /// exist.
    NcacheNxDomain(NegativeCache),

    /// The cache holds a negative response saying the name has no data
    /// of the requested type.
    NcacheNxRrset(NegativeCache),

    /// The database has no relevant data at all.
    NotFound,
}

/// Data returned when a lookup finds an RRset.
#[derive(Clone, Debug)]
pub struct Found {
    /// The owner of the RRset. For answers synthesized from a wildcard
    /// this is the name that was looked up.
    pub name: Name,

    /// Whether the data was synthesized from a wildcard.
    pub wildcard: bool,

    /// The RRset found, or `None` for [`Type::ANY`] lookups.
    pub rrset: Option<Rrset>,

    /// Signatures covering `rrset`.
    pub sigs: Option<Rrset>,

    /// For [`Type::ANY`] lookups, every RRset at the name (signatures
    /// included).
    pub all: Vec<Rrset>,
}

impl Found {
    pub(crate) fn new(name: Name, rrset: Rrset, sigs: Option<Rrset>) -> Self {
        Self {
            name,
            wildcard: false,
            rrset: Some(rrset),
            sigs,
            all: Vec::new(),
        }
    }
}

/// Data returned for negative authoritative lookups.
#[derive(Clone, Debug)]
pub struct Negative {
    /// The owner of `nsec`, or the name looked up when there is none.
    pub name: Name,

    /// Whether the result concerns a wildcard match.
    pub wildcard: bool,

    /// The NSEC RRset proving the negative result, in signed zones.
    pub nsec: Option<Rrset>,
    pub sigs: Option<Rrset>,
}

/// A negative response held in the cache.
#[derive(Clone, Debug)]
pub struct NegativeCache {
    pub name: Name,

    /// The remaining TTL of the negative response.
    pub ttl: Ttl,

    /// The authority data of the original response (SOA and any NSEC
    /// records, with their signatures).
    pub records: Vec<(Name, Rrset)>,
}

////////////////////////////////////////////////////////////////////////
// HELPERS                                                            //
////////////////////////////////////////////////////////////////////////

/// Groups parsed records into RRsets. RRSIG records are grouped by the
/// type they cover. The TTL of each RRset is the smallest TTL among its
/// records.
pub fn group_records(records: Vec<Record>) -> Result<Vec<(Name, Rrset)>, Error> {
    let mut rrsets: BTreeMap<(Name, Type, Option<Type>), Rrset> = BTreeMap::new();
    for record in records {
        let covers = if record.rr_type == Type::RRSIG {
            Some(Rrsig::parse(&record.rdata)?.type_covered)
        } else {
            None
        };
        let rrset = rrsets
            .entry((record.owner, record.rr_type, covers))
            .or_insert_with(|| {
                let mut rrset = Rrset::new(record.rr_type, record.class, record.ttl);
                rrset.covers = covers;
                rrset
            });
        if rrset.class != record.class {
            return Err(Error::ClassMismatch);
        }
        rrset.ttl = rrset.ttl.min(record.ttl);
        rrset.push_rdata(record.rdata);
    }
    Ok(rrsets
        .into_iter()
        .map(|((owner, _, _), rrset)| (owner, rrset))
        .collect())
}

/// Returns whether a CNAME at a name hides data of `rr_type`. Types
/// that may coexist with CNAME ([RFC 4035 § 2.5]) are not hidden.
///
/// [RFC 4035 § 2.5]: https://datatracker.ietf.org/doc/html/rfc4035#section-2.5
pub(crate) fn cname_applies(rr_type: Type) -> bool {
    !matches!(
        rr_type,
        Type::CNAME | Type::ANY | Type::NSEC | Type::RRSIG | Type::SIG | Type::KEY | Type::NXT
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rr::text::parse_records;

    #[test]
    fn records_are_grouped() {
        let records = parse_records(
            "www.example.test. 300 IN A 192.0.2.1\n\
             www.example.test. 200 IN A 192.0.2.2\n\
             www.example.test. 300 IN RRSIG A 15 3 300 20300101000000 20200101000000 1 example.test. AAAA\n\
             www.example.test. 300 IN AAAA 2001:db8::1\n",
            None,
        )
        .unwrap();
        let grouped = group_records(records).unwrap();
        assert_eq!(grouped.len(), 3);
        let a = grouped
            .iter()
            .find(|(_, r)| r.rr_type == Type::A)
            .map(|(_, r)| r)
            .unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a.ttl, Ttl::from(200));
        assert!(grouped
            .iter()
            .any(|(_, r)| r.matches(Type::RRSIG, Some(Type::A))));
    }

    #[test]
    fn db_ids_are_unique() {
        assert_ne!(DbId::next(), DbId::next());
    }
}
