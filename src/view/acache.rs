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

//! The additional-data cache.
//!
//! Looking up the addresses of the name servers and mail exchangers
//! named in a response is repetitive work: the same few targets come up
//! in response after response. The [`AdditionalCache`] remembers, for a
//! target name and type, what an authoritative or glue lookup found
//! (including that it found nothing). Entries record the database and
//! version serial they were computed from and are discarded when that
//! version is no longer current.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::db::{DbId, Version};
use crate::name::Name;
use crate::rr::{Rrset, Type};

/// Where an additional-data lookup was answered from. Results from the
/// cache database are never memoized, since they age and change
/// independently of any version.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Source {
    Auth,
    Glue,
}

/// The RRsets (with signatures) found by an additional-data lookup.
pub type AdditionalData = Vec<(Rrset, Option<Rrset>)>;

type Key = (Name, Type, Source);

#[derive(Clone, Debug)]
struct Entry {
    db: DbId,
    serial: u64,
    found: Option<AdditionalData>,
}

/// A memo of additional-data lookups.
#[derive(Debug)]
pub struct AdditionalCache {
    capacity: usize,
    entries: Mutex<HashMap<Key, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AdditionalCache {
    /// Creates a cache that holds at most `capacity` entries. When it is
    /// full, the cache is emptied and starts over.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the memoized result for `(name, rr_type)` from `source`,
    /// provided it was computed from `version`. The outer `Option` is
    /// `None` on a miss; the inner one is `None` for a memoized
    /// negative result.
    pub fn get(
        &self,
        name: &Name,
        rr_type: Type,
        source: Source,
        version: &Version,
    ) -> Option<Option<AdditionalData>> {
        let mut entries = self.lock();
        let key = (name.clone(), rr_type, source);
        let result = match entries.get(&key) {
            Some(entry) if entry.db == version.db() && entry.serial == version.serial() => {
                Some(entry.found.clone())
            }
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        };
        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Memoizes the result of a lookup made with `version`.
    pub fn insert(
        &self,
        name: &Name,
        rr_type: Type,
        source: Source,
        version: &Version,
        found: Option<AdditionalData>,
    ) {
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            entries.clear();
        }
        entries.insert(
            (name.clone(), rr_type, source),
            Entry {
                db: version.db(),
                serial: version.serial(),
                found,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<HashMap<Key, Entry>> {
        // Entries are replaced whole, so a poisoned map is still sound.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for AdditionalCache {
    fn default() -> Self {
        Self::new(4096)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::class::Class;
    use crate::rr::Ttl;

    #[test]
    fn entries_follow_versions() {
        let cache = AdditionalCache::new(16);
        let db = DbId::next();
        let v1 = Version::new(db, 1, Arc::new(()));
        let v2 = Version::new(db, 2, Arc::new(()));
        let name: Name = "ns.example.test.".parse().unwrap();
        let rrset = Rrset::new(Type::A, Class::IN, Ttl::from(60));

        assert!(cache.get(&name, Type::A, Source::Auth, &v1).is_none());
        cache.insert(&name, Type::A, Source::Auth, &v1, Some(vec![(rrset, None)]));
        assert_eq!(
            cache
                .get(&name, Type::A, Source::Auth, &v1)
                .unwrap()
                .unwrap()
                .len(),
            1
        );
        assert!(cache.get(&name, Type::A, Source::Glue, &v1).is_none());
        assert!(cache.get(&name, Type::A, Source::Auth, &v2).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 3);
    }

    #[test]
    fn negative_results_are_memoized() {
        let cache = AdditionalCache::new(16);
        let version = Version::new(DbId::next(), 0, Arc::new(()));
        let name: Name = "nowhere.example.test.".parse().unwrap();
        cache.insert(&name, Type::A, Source::Glue, &version, None);
        assert!(matches!(
            cache.get(&name, Type::A, Source::Glue, &version),
            Some(None)
        ));
    }

    #[test]
    fn full_cache_starts_over() {
        let cache = AdditionalCache::new(2);
        let version = Version::new(DbId::next(), 0, Arc::new(()));
        for owner in ["a.test.", "b.test.", "c.test."] {
            let name: Name = owner.parse().unwrap();
            cache.insert(&name, Type::A, Source::Auth, &version, None);
        }
        assert_eq!(cache.len(), 1);
    }
}
