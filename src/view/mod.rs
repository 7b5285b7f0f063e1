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

//! Views: the data and policy a query is answered with.
//!
//! A [`View`] bundles the authoritative zones ([`ZoneTable`]), the cache
//! and root hints, the access-control lists, the [`Options`] that switch
//! parts of query processing on and off, and the response-ordering
//! policies.

use std::sync::Arc;

use crate::acl::Acl;
use crate::class::Class;
use crate::db::{CacheDb, Database};
use crate::resolver::{NullResolver, Resolver};

mod acache;
mod sortlist;
mod zone_table;

pub use acache::{AdditionalCache, AdditionalData, Source};
pub use sortlist::{InvalidRrsetOrderError, RrsetOrder, RrsetOrdering, SortEntry, SortList};
pub use zone_table::{Zone, ZoneMatch, ZoneTable};

/// Switches for the optional behaviors of query processing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Options {
    /// Whether recursion is offered at all.
    pub recursion: bool,

    /// Whether DNSSEC records are returned to clients that ask for
    /// them.
    pub dnssec_enable: bool,

    /// Whether fetched data is validated.
    pub dnssec_validation: bool,

    /// Whether signatures that have expired are still accepted by the
    /// inline validator.
    pub accept_expired: bool,

    /// Whether additional data may come from authoritative zones other
    /// than the one answering the query.
    pub additional_from_auth: bool,

    /// Whether the cache may be used for additional data (and, if off,
    /// for anything at all).
    pub additional_from_cache: bool,

    /// Whether authority and additional sections are omitted where
    /// they are not required.
    pub minimal_responses: bool,

    /// Whether NXDOMAIN responses are always marked authoritative.
    pub auth_nxdomain: bool,

    /// Whether query names are checked against host-name syntax.
    pub check_names: bool,

    /// Whether the additional-data cache is used.
    pub acache: bool,

    /// Whether each query is logged.
    pub log_queries: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            recursion: true,
            dnssec_enable: true,
            dnssec_validation: true,
            accept_expired: false,
            additional_from_auth: true,
            additional_from_cache: true,
            minimal_responses: false,
            auth_nxdomain: false,
            check_names: false,
            acache: true,
            log_queries: false,
        }
    }
}

/// A view.
#[derive(Debug)]
pub struct View {
    pub class: Class,
    pub options: Options,
    pub zones: ZoneTable,

    /// The cache, if this view has one.
    pub cache: Option<Arc<CacheDb>>,

    /// The root hints, used to prime recursion when neither the zones
    /// nor the cache know anything about a name.
    pub hints: Option<Arc<dyn Database>>,

    /// The view's `allow-query` list; `None` allows everyone.
    pub query_acl: Option<Acl>,

    /// The view's `allow-recursion` list; `None` allows everyone.
    pub recursion_acl: Option<Acl>,

    pub sortlist: SortList,
    pub rrset_order: RrsetOrdering,
    pub acache: AdditionalCache,
    pub resolver: Arc<dyn Resolver>,
}

impl View {
    /// Creates a view of `class` with default options, no zones, no
    /// cache and a resolver that always fails.
    pub fn new(class: Class) -> Self {
        Self {
            class,
            options: Options::default(),
            zones: ZoneTable::new(),
            cache: None,
            hints: None,
            query_acl: None,
            recursion_acl: None,
            sortlist: SortList::default(),
            rrset_order: RrsetOrdering::default(),
            acache: AdditionalCache::default(),
            resolver: Arc::new(NullResolver),
        }
    }

    /// Returns the cache as a [`Database`].
    pub fn cache_db(&self) -> Option<Arc<dyn Database>> {
        self.cache.clone().map(|cache| cache as Arc<dyn Database>)
    }
}
