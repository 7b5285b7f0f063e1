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

//! Implementation of the [`CacheDb`] resolver cache.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    cname_applies, Database, DbId, Error, FindOptions, Found, Lookup, NegativeCache, Version,
};
use crate::class::Class;
use crate::name::Name;
use crate::rr::{Rrset, Ttl, Type};

/// A cached RRset, stamped with the time it was inserted.
#[derive(Clone, Debug)]
struct Entry {
    rrset: Rrset,
    inserted: u64,
}

impl Entry {
    fn is_live(&self, now: u64) -> bool {
        !self.rrset.ttl.has_expired(now.saturating_sub(self.inserted))
    }

    /// Returns the RRset with its TTL decayed to what is left at `now`.
    fn decayed(&self, now: u64) -> Rrset {
        let mut rrset = self.rrset.clone();
        rrset.ttl = rrset.ttl.decayed(now.saturating_sub(self.inserted));
        rrset
    }
}

/// A cached negative response. An `rr_type` of `None` means the name
/// does not exist at all.
#[derive(Clone, Debug)]
struct NegativeEntry {
    rr_type: Option<Type>,
    records: Vec<(Name, Rrset)>,
    ttl: Ttl,
    inserted: u64,
}

impl NegativeEntry {
    fn is_live(&self, now: u64) -> bool {
        !self.ttl.has_expired(now.saturating_sub(self.inserted))
    }

    fn to_lookup(&self, name: &Name, now: u64) -> NegativeCache {
        NegativeCache {
            name: name.clone(),
            ttl: self.ttl.decayed(now.saturating_sub(self.inserted)),
            records: self.records.clone(),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct CacheNode {
    entries: Vec<Entry>,
    negatives: Vec<NegativeEntry>,
}

impl CacheNode {
    fn get(&self, rr_type: Type, covers: Option<Type>, now: u64) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| e.rrset.matches(rr_type, covers) && e.is_live(now))
    }

    /// Returns the RRset of `rr_type` and its signatures if they are
    /// visible under `options`. The second value is whether the data
    /// has glue trust.
    fn visible(
        &self,
        rr_type: Type,
        options: FindOptions,
        now: u64,
    ) -> Option<(Rrset, Option<Rrset>, bool)> {
        let entry = self.get(rr_type, None, now)?;
        let trust = entry.rrset.trust;
        if (trust.is_pending() && !options.pending_ok) || (trust.is_glue() && !options.glue_ok) {
            return None;
        }
        let sigs = self
            .get(Type::RRSIG, Some(rr_type), now)
            .map(|sigs| sigs.decayed(now));
        Some((entry.decayed(now), sigs, trust.is_glue()))
    }

    fn negative(&self, rr_type: Option<Type>, now: u64) -> Option<&NegativeEntry> {
        self.negatives
            .iter()
            .find(|n| n.rr_type == rr_type && n.is_live(now))
    }
}

////////////////////////////////////////////////////////////////////////
// CACHE DATABASE                                                     //
////////////////////////////////////////////////////////////////////////

/// The resolver cache.
///
/// Every RRset in the cache has a [`Trust`](crate::rr::Trust) level. New
/// data replaces cached data only if it is at least as trustworthy, or
/// if the cached data has expired ([RFC 2181 § 5.4.1]). Lookups hide
/// data that has not been validated unless
/// [`FindOptions::pending_ok`] is set, and glue unless
/// [`FindOptions::glue_ok`] is set. TTLs are counted down from the
/// time of insertion.
///
/// [RFC 2181 § 5.4.1]: https://datatracker.ietf.org/doc/html/rfc2181#section-5.4.1
#[derive(Debug)]
pub struct CacheDb {
    id: DbId,
    class: Class,
    origin: Name,
    nodes: RwLock<BTreeMap<Name, CacheNode>>,
}

impl CacheDb {
    pub fn new(class: Class) -> Self {
        Self {
            id: DbId::next(),
            class,
            origin: Name::root(),
            nodes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Caches a negative response for `name`: that it does not exist
    /// (`rr_type` of `None`) or has no data of `rr_type`. `records`
    /// holds the authority data of the response.
    pub fn add_negative(
        &self,
        name: &Name,
        rr_type: Option<Type>,
        records: Vec<(Name, Rrset)>,
        ttl: Ttl,
        now: u64,
    ) {
        let mut nodes = self.write();
        let node = nodes.entry(name.clone()).or_default();
        node.negatives
            .retain(|n| n.rr_type != rr_type && n.is_live(now));
        node.negatives.push(NegativeEntry {
            rr_type,
            records,
            ttl,
            inserted: now,
        });
    }

    /// Removes expired data from the cache.
    pub fn purge(&self, now: u64) {
        let mut nodes = self.write();
        nodes.retain(|_, node| {
            node.entries.retain(|e| e.is_live(now));
            node.negatives.retain(|n| n.is_live(now));
            !node.entries.is_empty() || !node.negatives.is_empty()
        });
    }

    // Cache nodes are only modified by single statements that leave
    // them consistent, so a poisoned lock still guards usable data.
    fn read(&self) -> RwLockReadGuard<BTreeMap<Name, CacheNode>> {
        self.nodes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<BTreeMap<Name, CacheNode>> {
        self.nodes.write().unwrap_or_else(|e| e.into_inner())
    }

    fn deepest_ns(
        nodes: &BTreeMap<Name, CacheNode>,
        name: &Name,
        options: FindOptions,
        now: u64,
    ) -> Option<Found> {
        (1..=name.len()).rev().find_map(|labels| {
            let ancestor = name.superdomain(name.len() - labels)?;
            let (rrset, sigs, _) = nodes.get(&ancestor)?.visible(Type::NS, options, now)?;
            Some(Found::new(ancestor, rrset, sigs))
        })
    }
}

impl Database for CacheDb {
    fn id(&self) -> DbId {
        self.id
    }

    fn origin(&self) -> &Name {
        &self.origin
    }

    fn class(&self) -> Class {
        self.class
    }

    fn is_cache(&self) -> bool {
        true
    }

    fn current_version(&self) -> Version {
        Version::new(self.id, 0, Arc::new(()))
    }

    fn is_secure(&self, _version: Option<&Version>) -> bool {
        false
    }

    fn find(
        &self,
        name: &Name,
        _version: Option<&Version>,
        rr_type: Type,
        options: FindOptions,
        now: u64,
    ) -> Lookup {
        let nodes = self.read();

        // A cached DNAME above the name applies to it.
        for labels in 1..name.len() {
            let Some(ancestor) = name.superdomain(name.len() - labels) else {
                continue;
            };
            if let Some((rrset, sigs, _)) = nodes
                .get(&ancestor)
                .and_then(|node| node.visible(Type::DNAME, options, now))
            {
                return Lookup::Dname(Found::new(ancestor, rrset, sigs));
            }
        }

        if let Some(node) = nodes.get(name) {
            if let Some(negative) = node.negative(None, now) {
                return Lookup::NcacheNxDomain(negative.to_lookup(name, now));
            }
            if rr_type == Type::ANY {
                let all: Vec<Rrset> = node
                    .entries
                    .iter()
                    .filter(|e| e.is_live(now))
                    .filter(|e| options.pending_ok || !e.rrset.trust.is_pending())
                    .map(|e| e.decayed(now))
                    .collect();
                if !all.is_empty() {
                    return Lookup::Success(Found {
                        name: name.clone(),
                        wildcard: false,
                        rrset: None,
                        sigs: None,
                        all,
                    });
                }
            } else if let Some((rrset, sigs, glue)) = node.visible(rr_type, options, now) {
                let found = Found::new(name.clone(), rrset, sigs);
                return if glue {
                    Lookup::Glue(found)
                } else {
                    Lookup::Success(found)
                };
            } else if let Some((rrset, sigs, _)) = cname_applies(rr_type)
                .then(|| node.visible(Type::CNAME, options, now))
                .flatten()
            {
                return Lookup::Cname(Found::new(name.clone(), rrset, sigs));
            } else if let Some(negative) = node.negative(Some(rr_type), now) {
                return Lookup::NcacheNxRrset(negative.to_lookup(name, now));
            }
        }

        match Self::deepest_ns(&nodes, name, options, now) {
            Some(found) => Lookup::Delegation(found),
            None => Lookup::NotFound,
        }
    }

    fn find_zonecut(&self, name: &Name, now: u64) -> Option<Found> {
        let options = FindOptions {
            glue_ok: true,
            pending_ok: true,
            no_wild: false,
        };
        Self::deepest_ns(&self.read(), name, options, now)
    }

    fn find_rrset(
        &self,
        name: &Name,
        _version: Option<&Version>,
        rr_type: Type,
        now: u64,
    ) -> Option<(Rrset, Option<Rrset>)> {
        let nodes = self.read();
        let node = nodes.get(name)?;
        let rrset = node.get(rr_type, None, now)?.decayed(now);
        let sigs = node
            .get(Type::RRSIG, Some(rr_type), now)
            .map(|sigs| sigs.decayed(now));
        Some((rrset, sigs))
    }

    fn add_rrset(&self, name: &Name, rrset: Rrset, now: u64) -> Result<(), Error> {
        if rrset.class != self.class {
            return Err(Error::ClassMismatch);
        }
        let mut nodes = self.write();
        let node = nodes.entry(name.clone()).or_default();
        if let Some(existing) = node
            .entries
            .iter_mut()
            .find(|e| e.rrset.matches(rrset.rr_type, rrset.covers))
        {
            if rrset.trust >= existing.rrset.trust || !existing.is_live(now) {
                existing.rrset = rrset;
                existing.inserted = now;
            }
            return Ok(());
        }

        // Positive data supersedes negative data for the same name.
        let rr_type = rrset.covers.unwrap_or(rrset.rr_type);
        node.negatives
            .retain(|n| n.rr_type.is_some() && n.rr_type != Some(rr_type));
        node.entries.push(Entry {
            rrset,
            inserted: now,
        });
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
