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

//! Implementation of the [`ZoneTable`] structure.

use std::collections::HashMap;
use std::sync::Arc;

use crate::acl::Acl;
use crate::db::Database;
use crate::name::Name;
use crate::stats::Counters;

/// An authoritative zone served by a view.
#[derive(Debug)]
pub struct Zone {
    db: Arc<dyn Database>,

    /// The zone's `allow-query` list. When `None`, the view's list
    /// applies.
    pub query_acl: Option<Acl>,

    /// Whether SOA records in negative answers to SOA queries get a
    /// TTL of zero, so that stub resolvers do not cache them.
    pub zero_no_soa_ttl: bool,

    /// Counters for the queries this zone answered.
    pub stats: Counters,
}

impl Zone {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            query_acl: None,
            zero_no_soa_ttl: false,
            stats: Counters::new(),
        }
    }

    pub fn name(&self) -> &Name {
        self.db.origin()
    }

    pub fn db(&self) -> &Arc<dyn Database> {
        &self.db
    }
}

/// The result of [`ZoneTable::find`].
#[derive(Clone, Debug)]
pub enum ZoneMatch {
    /// A zone whose apex is the name itself.
    Exact(Arc<Zone>),

    /// The nearest zone strictly above the name.
    Partial(Arc<Zone>),

    NotFound,
}

impl ZoneMatch {
    pub fn zone(&self) -> Option<&Arc<Zone>> {
        match self {
            Self::Exact(zone) | Self::Partial(zone) => Some(zone),
            Self::NotFound => None,
        }
    }
}

/// The authoritative zones of a view, indexed by apex.
#[derive(Debug, Default)]
pub struct ZoneTable {
    zones: HashMap<Name, Arc<Zone>>,
}

impl ZoneTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `zone`, replacing and returning the preexisting zone of that
    /// name (if any).
    pub fn insert(&mut self, zone: Zone) -> Option<Arc<Zone>> {
        self.zones.insert(zone.name().clone(), Arc::new(zone))
    }

    /// Looks up the zone that is the nearest ancestor of `name`: step 2
    /// of the lookup algorithm of [RFC 1034 § 4.3.2]. With `no_exact`,
    /// a zone whose apex is `name` itself is skipped in favor of its
    /// parent, which is where data for parent-side types such as DS
    /// lives.
    ///
    /// [RFC 1034 § 4.3.2]: https://datatracker.ietf.org/doc/html/rfc1034#section-4.3.2
    pub fn find(&self, name: &Name, no_exact: bool) -> ZoneMatch {
        let start = if no_exact && !name.is_root() { 1 } else { 0 };
        for skip in start..name.len() {
            let Some(candidate) = name.superdomain(skip) else {
                break;
            };
            if let Some(zone) = self.zones.get(&candidate) {
                return if skip == 0 {
                    ZoneMatch::Exact(zone.clone())
                } else {
                    ZoneMatch::Partial(zone.clone())
                };
            }
        }
        ZoneMatch::NotFound
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Returns an iterator over the zones, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Zone>> {
        self.zones.values()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
