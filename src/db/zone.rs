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

//! Implementation of the [`ZoneDb`] authoritative zone database.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    cname_applies, group_records, Database, DbId, Error, FindOptions, Found, Lookup, Negative,
    Version,
};
use crate::class::Class;
use crate::name::{Label, Name};
use crate::rr::text::Record;
use crate::rr::{NoQnameProof, Rrset, Type};

////////////////////////////////////////////////////////////////////////
// NODES                                                              //
////////////////////////////////////////////////////////////////////////

/// The RRsets owned by one name. Signatures are stored as RRSIG RRsets
/// alongside the data they cover.
#[derive(Clone, Debug, Default)]
struct Node {
    rrsets: Vec<Rrset>,
}

impl Node {
    fn get(&self, rr_type: Type, covers: Option<Type>) -> Option<&Rrset> {
        self.rrsets.iter().find(|r| r.matches(rr_type, covers))
    }

    fn has(&self, rr_type: Type) -> bool {
        self.get(rr_type, None).is_some()
    }

    fn rrset_and_sigs(&self, rr_type: Type) -> Option<(Rrset, Option<Rrset>)> {
        let rrset = self.get(rr_type, None)?.clone();
        let sigs = self.get(Type::RRSIG, Some(rr_type)).cloned();
        Some((rrset, sigs))
    }

    fn found(&self, name: &Name, rr_type: Type) -> Option<Found> {
        self.rrset_and_sigs(rr_type)
            .map(|(rrset, sigs)| Found::new(name.clone(), rrset, sigs))
    }

    fn replace(&mut self, rrset: Rrset) {
        self.rrsets.retain(|r| !r.matches(rrset.rr_type, rrset.covers));
        self.rrsets.push(rrset);
    }
}

/// One version of a zone's contents. Names are kept in canonical order
/// ([RFC 4034 § 6.1]), which places every name directly before its
/// subdomains and makes NSEC lookups a range query.
///
/// [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1
#[derive(Clone, Debug)]
struct ZoneData {
    serial: u64,
    nodes: BTreeMap<Name, Node>,
}

impl ZoneData {
    /// Returns whether `name` is an empty non-terminal: it owns no
    /// data, but some name below it does.
    fn is_empty_nonterminal(&self, name: &Name) -> bool {
        !self.nodes.contains_key(name)
            && self
                .nodes
                .range::<Name, _>((Excluded(name), Unbounded))
                .next()
                .map_or(false, |(next, _)| next.eq_or_subdomain_of(name))
    }

    fn exists(&self, name: &Name) -> bool {
        self.nodes.contains_key(name) || self.is_empty_nonterminal(name)
    }

    /// Finds the NSEC RRset whose owner is the closest predecessor of
    /// `name` in canonical order, i.e. the NSEC covering `name`.
    fn covering_nsec(&self, name: &Name) -> Option<(Name, Rrset, Option<Rrset>)> {
        self.nodes
            .range::<Name, _>(..name)
            .rev()
            .find_map(|(owner, node)| {
                node.rrset_and_sigs(Type::NSEC)
                    .map(|(nsec, sigs)| (owner.clone(), nsec, sigs))
            })
    }

    fn negative(&self, name: &Name, wildcard: bool) -> Negative {
        match self.covering_nsec(name) {
            Some((owner, nsec, sigs)) => Negative {
                name: owner,
                wildcard,
                nsec: Some(nsec),
                sigs,
            },
            None => Negative {
                name: name.clone(),
                wildcard,
                nsec: None,
                sigs: None,
            },
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ZONE DATABASE                                                      //
////////////////////////////////////////////////////////////////////////

/// An in-memory, versioned authoritative zone database.
///
/// Updates never modify a version in place: each one copies the zone
/// data, applies the change and installs the copy under a new serial.
/// Lookups through an older [`Version`] keep seeing the older data.
#[derive(Debug)]
pub struct ZoneDb {
    id: DbId,
    origin: Name,
    class: Class,
    data: RwLock<Arc<ZoneData>>,
}

impl ZoneDb {
    /// Creates a zone from its RRsets. Every owner must be within the
    /// zone, and there must be an SOA RRset at the apex.
    pub fn new(origin: Name, class: Class, rrsets: Vec<(Name, Rrset)>) -> Result<Self, Error> {
        let db = Self::build(origin, class, rrsets)?;
        if !db.current().nodes.get(&db.origin).map_or(false, |apex| apex.has(Type::SOA)) {
            return Err(Error::MissingSoa);
        }
        Ok(db)
    }

    /// Creates a root hints database. This is a zone at the root that
    /// need not have an SOA RRset.
    pub fn hints(class: Class, records: Vec<Record>) -> Result<Self, Error> {
        Self::build(Name::root(), class, group_records(records)?)
    }

    fn build(origin: Name, class: Class, rrsets: Vec<(Name, Rrset)>) -> Result<Self, Error> {
        let mut nodes: BTreeMap<Name, Node> = BTreeMap::new();
        for (owner, rrset) in rrsets {
            if !owner.eq_or_subdomain_of(&origin) {
                return Err(Error::NotInZone);
            } else if rrset.class != class {
                return Err(Error::ClassMismatch);
            }
            nodes.entry(owner).or_default().replace(rrset);
        }
        Ok(Self {
            id: DbId::next(),
            origin,
            class,
            data: RwLock::new(Arc::new(ZoneData { serial: 1, nodes })),
        })
    }

    /// Creates a zone from parsed records.
    pub fn from_records(origin: Name, class: Class, records: Vec<Record>) -> Result<Self, Error> {
        Self::new(origin, class, group_records(records)?)
    }

    /// Returns the number of RRsets (signatures included) in the
    /// current version.
    pub fn rrset_count(&self) -> usize {
        self.current()
            .nodes
            .values()
            .map(|node| node.rrsets.len())
            .sum()
    }

    fn current(&self) -> Arc<ZoneData> {
        self.read().clone()
    }

    // The zone data behind the lock is only ever swapped whole, so a
    // poisoned lock still guards consistent data.
    fn read(&self) -> RwLockReadGuard<Arc<ZoneData>> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<Arc<ZoneData>> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }

    fn find_in(&self, data: &ZoneData, name: &Name, rr_type: Type, options: FindOptions) -> Lookup {
        if !name.eq_or_subdomain_of(&self.origin) {
            return Lookup::NotFound;
        }

        // Walk down from the apex through the ancestors of the name,
        // looking for zone cuts and DNAMEs. NS records at the apex do
        // not make a cut, but a DNAME there applies to everything below
        // it. When searching for glue, we note the first cut and carry
        // on.
        let mut cut: Option<Found> = None;
        for labels in self.origin.len()..name.len() {
            let Some(ancestor) = name.superdomain(name.len() - labels) else {
                continue;
            };
            let Some(node) = data.nodes.get(&ancestor) else {
                continue;
            };
            if ancestor != self.origin && node.has(Type::NS) {
                if !options.glue_ok {
                    if let Some(found) = node.found(&ancestor, Type::NS) {
                        return Lookup::Delegation(found);
                    }
                } else if cut.is_none() {
                    cut = node.found(&ancestor, Type::NS);
                }
            } else if cut.is_none() {
                if let Some(found) = node.found(&ancestor, Type::DNAME) {
                    return Lookup::Dname(found);
                }
            }
        }

        if let Some(node) = data.nodes.get(name) {
            if let Some(cut) = cut {
                if rr_type == Type::ANY {
                    return Lookup::Glue(Found {
                        name: name.clone(),
                        wildcard: false,
                        rrset: None,
                        sigs: None,
                        all: node.rrsets.clone(),
                    });
                }
                return match node.found(name, rr_type) {
                    Some(found) => Lookup::Glue(found),
                    None => Lookup::Delegation(cut),
                };
            }
            // DS and NSEC records at a delegation point belong to the
            // parent, so they are answered normally.
            if *name != self.origin
                && node.has(Type::NS)
                && rr_type != Type::DS
                && rr_type != Type::NSEC
            {
                return if options.glue_ok && (rr_type == Type::NS || rr_type == Type::ANY) {
                    node.found(name, Type::NS)
                        .map_or(Lookup::NotFound, Lookup::ZoneCut)
                } else if let (true, Some(found)) = (options.glue_ok, node.found(name, rr_type)) {
                    Lookup::Glue(found)
                } else {
                    node.found(name, Type::NS)
                        .map_or(Lookup::NotFound, Lookup::Delegation)
                };
            }
            return answer_at(node, name, rr_type, false, None);
        }

        if let Some(cut) = cut {
            return Lookup::Delegation(cut);
        }
        if data.is_empty_nonterminal(name) {
            return Lookup::EmptyName(data.negative(name, false));
        }

        // Wildcard matching ([RFC 4592 § 3.3.1]): find the closest
        // encloser and look for the wildcard directly below it.
        //
        // [RFC 4592 § 3.3.1]: https://datatracker.ietf.org/doc/html/rfc4592#section-3.3.1
        if !options.no_wild {
            for labels in (self.origin.len()..name.len()).rev() {
                let Some(encloser) = name.superdomain(name.len() - labels) else {
                    continue;
                };
                if !data.exists(&encloser) {
                    continue;
                }
                let Ok(wildcard) = encloser.prepend(Label::asterisk()) else {
                    break;
                };
                if let Some(node) = data.nodes.get(&wildcard) {
                    let noqname = data.covering_nsec(name).map(|(owner, nsec, sigs)| {
                        Arc::new(NoQnameProof { owner, nsec, sigs })
                    });
                    return answer_at(node, name, rr_type, true, noqname);
                } else if data.is_empty_nonterminal(&wildcard) {
                    return Lookup::EmptyWild(data.negative(name, true));
                }
                break;
            }
        }

        Lookup::NxDomain(data.negative(name, false))
    }
}

/// Produces the result of a lookup at an existing node. `name` is the
/// name being looked up, which differs from the node's own name when
/// the node is a matching wildcard.
fn answer_at(
    node: &Node,
    name: &Name,
    rr_type: Type,
    wildcard: bool,
    noqname: Option<Arc<NoQnameProof>>,
) -> Lookup {
    let found = |mut rrset: Rrset, sigs: Option<Rrset>| {
        rrset.noqname = noqname.clone();
        Found {
            name: name.clone(),
            wildcard,
            rrset: Some(rrset),
            sigs,
            all: Vec::new(),
        }
    };

    if rr_type == Type::ANY {
        return Lookup::Success(Found {
            name: name.clone(),
            wildcard,
            rrset: None,
            sigs: None,
            all: node.rrsets.clone(),
        });
    } else if let Some((rrset, sigs)) = node.rrset_and_sigs(rr_type) {
        return Lookup::Success(found(rrset, sigs));
    } else if cname_applies(rr_type) {
        if let Some((rrset, sigs)) = node.rrset_and_sigs(Type::CNAME) {
            return Lookup::Cname(found(rrset, sigs));
        }
    }

    // For a wildcard match, the NSEC is the wildcard's own; the query
    // engine rebuilds its owner from the RRSIG labels field.
    let (nsec, sigs) = match node.rrset_and_sigs(Type::NSEC) {
        Some((nsec, sigs)) => (Some(nsec), sigs),
        None => (None, None),
    };
    Lookup::NxRrset(Negative {
        name: name.clone(),
        wildcard,
        nsec,
        sigs,
    })
}

impl Database for ZoneDb {
    fn id(&self) -> DbId {
        self.id
    }

    fn origin(&self) -> &Name {
        &self.origin
    }

    fn class(&self) -> Class {
        self.class
    }

    fn current_version(&self) -> Version {
        let data = self.current();
        Version::new(self.id, data.serial, data)
    }

    fn is_secure(&self, version: Option<&Version>) -> bool {
        let check = |data: &ZoneData| {
            data.nodes
                .get(&self.origin)
                .map_or(false, |apex| apex.has(Type::DNSKEY) && apex.has(Type::NSEC))
        };
        match version.filter(|v| v.db() == self.id).and_then(|v| v.snapshot::<ZoneData>()) {
            Some(data) => check(data),
            None => check(&self.current()),
        }
    }

    fn find(
        &self,
        name: &Name,
        version: Option<&Version>,
        rr_type: Type,
        options: FindOptions,
        _now: u64,
    ) -> Lookup {
        match version.filter(|v| v.db() == self.id).and_then(|v| v.snapshot::<ZoneData>()) {
            Some(data) => self.find_in(data, name, rr_type, options),
            None => self.find_in(&self.current(), name, rr_type, options),
        }
    }

    fn find_zonecut(&self, name: &Name, _now: u64) -> Option<Found> {
        let data = self.current();
        (self.origin.len()..=name.len()).rev().find_map(|labels| {
            let ancestor = name.superdomain(name.len() - labels)?;
            data.nodes.get(&ancestor)?.found(&ancestor, Type::NS)
        })
    }

    fn find_rrset(
        &self,
        name: &Name,
        version: Option<&Version>,
        rr_type: Type,
        _now: u64,
    ) -> Option<(Rrset, Option<Rrset>)> {
        let lookup = |data: &ZoneData| data.nodes.get(name)?.rrset_and_sigs(rr_type);
        match version.filter(|v| v.db() == self.id).and_then(|v| v.snapshot::<ZoneData>()) {
            Some(data) => lookup(data),
            None => lookup(&self.current()),
        }
    }

    fn add_rrset(&self, name: &Name, rrset: Rrset, _now: u64) -> Result<(), Error> {
        if !name.eq_or_subdomain_of(&self.origin) {
            return Err(Error::NotInZone);
        } else if rrset.class != self.class {
            return Err(Error::ClassMismatch);
        }
        let mut guard = self.write();
        let mut data = ZoneData::clone(&guard);
        data.serial += 1;
        data.nodes.entry(name.clone()).or_default().replace(rrset);
        *guard = Arc::new(data);
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use lazy_static::lazy_static;

    use super::*;
    use crate::rr::text::parse_records;
    use crate::rr::{Rdata, Ttl};

    lazy_static! {
        static ref ORIGIN: Name = "example.test.".parse().unwrap();
    }

    const ZONE: &str = "\
example.test. 3600 IN SOA ns.example.test. hostmaster.example.test. 1 3600 900 604800 300
example.test. 3600 IN NS ns.example.test.
ns.example.test. 3600 IN A 192.0.2.53
www.example.test. 3600 IN CNAME host.example.test.
host.example.test. 3600 IN A 192.0.2.1
*.wild.example.test. 3600 IN A 192.0.2.3
a.b.ent.example.test. 3600 IN A 192.0.2.2
sub.example.test. 3600 IN NS ns.sub.example.test.
sub.example.test. 3600 IN DS 12345 15 2 abcd
ns.sub.example.test. 3600 IN A 192.0.2.54
dn.example.test. 3600 IN DNAME example.other.
";

    fn zone(text: &str) -> ZoneDb {
        ZoneDb::from_records(ORIGIN.clone(), Class::IN, parse_records(text, None).unwrap())
            .unwrap()
    }

    fn find(db: &ZoneDb, name: &str, rr_type: Type, options: FindOptions) -> Lookup {
        db.find(&name.parse().unwrap(), None, rr_type, options, 0)
    }

    fn name(text: &str) -> Name {
        text.parse().unwrap()
    }

    #[test]
    fn exact_match_and_cname() {
        let db = zone(ZONE);
        match find(&db, "host.example.test.", Type::A, FindOptions::default()) {
            Lookup::Success(found) => {
                assert_eq!(found.name, name("host.example.test."));
                assert_eq!(found.rrset.unwrap().rr_type, Type::A);
                assert!(!found.wildcard);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            find(&db, "www.example.test.", Type::A, FindOptions::default()),
            Lookup::Cname(_)
        ));
        assert!(matches!(
            find(&db, "www.example.test.", Type::CNAME, FindOptions::default()),
            Lookup::Success(_)
        ));
        assert!(matches!(
            find(&db, "host.example.test.", Type::MX, FindOptions::default()),
            Lookup::NxRrset(_)
        ));
    }

    #[test]
    fn delegations_and_glue() {
        let db = zone(ZONE);
        match find(&db, "www.sub.example.test.", Type::A, FindOptions::default()) {
            Lookup::Delegation(found) => {
                assert_eq!(found.name, name("sub.example.test."));
                assert_eq!(found.rrset.unwrap().rr_type, Type::NS);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            find(&db, "sub.example.test.", Type::DS, FindOptions::default()),
            Lookup::Success(_)
        ));
        let glue_ok = FindOptions {
            glue_ok: true,
            ..Default::default()
        };
        assert!(matches!(
            find(&db, "ns.sub.example.test.", Type::A, glue_ok),
            Lookup::Glue(_)
        ));
        assert!(matches!(
            find(&db, "ns.sub.example.test.", Type::AAAA, glue_ok),
            Lookup::Delegation(_)
        ));
        assert!(matches!(
            find(&db, "sub.example.test.", Type::NS, glue_ok),
            Lookup::ZoneCut(_)
        ));
        assert!(matches!(
            find(&db, "ns.sub.example.test.", Type::A, FindOptions::default()),
            Lookup::Delegation(_)
        ));
        // Apex NS records are not a cut.
        assert!(matches!(
            find(&db, "example.test.", Type::NS, FindOptions::default()),
            Lookup::Success(_)
        ));
    }

    #[test]
    fn empty_nonterminals_and_nxdomain() {
        let db = zone(ZONE);
        assert!(matches!(
            find(&db, "b.ent.example.test.", Type::A, FindOptions::default()),
            Lookup::EmptyName(_)
        ));
        assert!(matches!(
            find(&db, "ent.example.test.", Type::A, FindOptions::default()),
            Lookup::EmptyName(_)
        ));
        assert!(matches!(
            find(&db, "nosuch.example.test.", Type::A, FindOptions::default()),
            Lookup::NxDomain(_)
        ));
        assert!(matches!(
            find(&db, "other.test.", Type::A, FindOptions::default()),
            Lookup::NotFound
        ));
    }

    #[test]
    fn wildcards() {
        let db = zone(ZONE);
        match find(&db, "a.b.wild.example.test.", Type::A, FindOptions::default()) {
            Lookup::Success(found) => {
                assert_eq!(found.name, name("a.b.wild.example.test."));
                assert!(found.wildcard);
            }
            other => panic!("unexpected {other:?}"),
        }
        match find(&db, "x.wild.example.test.", Type::MX, FindOptions::default()) {
            Lookup::NxRrset(negative) => assert!(negative.wildcard),
            other => panic!("unexpected {other:?}"),
        }
        let no_wild = FindOptions {
            no_wild: true,
            ..Default::default()
        };
        assert!(matches!(
            find(&db, "x.wild.example.test.", Type::A, no_wild),
            Lookup::NxDomain(_)
        ));
    }

    #[test]
    fn empty_wildcard() {
        let db = zone(
            "example.test. 300 IN SOA ns.example.test. h.example.test. 1 2 3 4 5\n\
             a.*.example.test. 300 IN A 192.0.2.1\n",
        );
        assert!(matches!(
            find(&db, "nosuch.example.test.", Type::A, FindOptions::default()),
            Lookup::EmptyWild(_)
        ));
    }

    #[test]
    fn dname_applies_below_owner() {
        let db = zone(ZONE);
        match find(&db, "x.y.dn.example.test.", Type::A, FindOptions::default()) {
            Lookup::Dname(found) => assert_eq!(found.name, name("dn.example.test.")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            find(&db, "dn.example.test.", Type::DNAME, FindOptions::default()),
            Lookup::Success(_)
        ));
    }

    #[test]
    fn nsec_proofs() {
        let db = zone(
            "example.test. 300 IN SOA ns.example.test. h.example.test. 1 2 3 4 5\n\
             example.test. 300 IN NSEC b.example.test. SOA NSEC\n\
             b.example.test. 300 IN A 192.0.2.1\n\
             b.example.test. 300 IN NSEC example.test. A NSEC\n",
        );
        match find(&db, "a.example.test.", Type::A, FindOptions::default()) {
            Lookup::NxDomain(negative) => {
                assert_eq!(negative.name, *ORIGIN);
                assert!(negative.nsec.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
        match find(&db, "c.example.test.", Type::A, FindOptions::default()) {
            Lookup::NxDomain(negative) => assert_eq!(negative.name, name("b.example.test.")),
            other => panic!("unexpected {other:?}"),
        }
        match find(&db, "b.example.test.", Type::MX, FindOptions::default()) {
            Lookup::NxRrset(negative) => {
                assert_eq!(negative.name, name("b.example.test."));
                assert!(negative.nsec.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!db.is_secure(None));
        let mut dnskey = Rrset::new(Type::DNSKEY, Class::IN, Ttl::from(300));
        dnskey.push_rdata(Rdata::new(vec![1, 1, 3, 15, 0]).unwrap());
        db.add_rrset(&ORIGIN, dnskey, 0).unwrap();
        assert!(db.is_secure(None));
    }

    #[test]
    fn versions_are_snapshots() {
        let db = zone(ZONE);
        let old = db.current_version();
        let mut aaaa = Rrset::new(Type::AAAA, Class::IN, Ttl::from(300));
        aaaa.push_rdata(Rdata::new(vec![0x20, 1, 0xd, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]).unwrap());
        db.add_rrset(&name("host.example.test."), aaaa, 0).unwrap();
        let new = db.current_version();
        assert_ne!(old.serial(), new.serial());
        let host = name("host.example.test.");
        assert!(matches!(
            db.find(&host, Some(&old), Type::AAAA, FindOptions::default(), 0),
            Lookup::NxRrset(_)
        ));
        assert!(matches!(
            db.find(&host, Some(&new), Type::AAAA, FindOptions::default(), 0),
            Lookup::Success(_)
        ));
        db.close_version(old);
    }

    #[test]
    fn load_errors() {
        let records = parse_records("example.test. 300 IN A 192.0.2.1", None).unwrap();
        assert_eq!(
            ZoneDb::from_records(ORIGIN.clone(), Class::IN, records).unwrap_err(),
            Error::MissingSoa
        );
        let records = parse_records(
            "example.test. 300 IN SOA ns.example.test. h.example.test. 1 2 3 4 5\n\
             other.test. 300 IN A 192.0.2.1\n",
            None,
        )
        .unwrap();
        assert_eq!(
            ZoneDb::from_records(ORIGIN.clone(), Class::IN, records).unwrap_err(),
            Error::NotInZone
        );
    }
}
