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

//! Choosing the database to search.
//!
//! A name is looked up in the authoritative zone that most closely
//! encloses it, if the view has one, and otherwise in the cache. Access
//! to either is subject to the query ACLs: a zone's own ACL if it has
//! one, the view's otherwise. The view's ACL is checked at most once
//! per query, and each zone's at most once per query.

use std::sync::Arc;

use log::{debug, info};

use super::Context;
use crate::acl::Acl;
use crate::db::{Database, Version};
use crate::name::Name;
use crate::rr::Type;
use crate::view::{Zone, ZoneMatch};

/// Options for [`Context::getdb`] and friends.
#[derive(Clone, Copy, Debug, Default)]
pub(super) struct DbOptions {
    /// Skips a zone whose apex is the name itself, as is needed to
    /// find the parent side of a zone cut.
    pub no_exact: bool,

    /// Fails with [`DbError::PartialMatch`] unless a zone exactly
    /// matches the name.
    pub partial: bool,

    /// Doesn't log ACL decisions.
    pub no_log: bool,
}

/// Why no database was selected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum DbError {
    /// The query may not use the database.
    Refused,

    /// No zone (or no usable cache) covers the name.
    NotFound,

    /// Only a zone above the name was found, and
    /// [`DbOptions::partial`] was given.
    PartialMatch,
}

/// The database chosen for a lookup.
#[derive(Clone, Debug)]
pub(super) struct Selected {
    pub db: Arc<dyn Database>,

    /// The version to search; `None` for the cache.
    pub version: Option<Version>,
    pub zone: Option<Arc<Zone>>,
    pub is_zone: bool,
}

impl Context {
    /// Selects the database in which to look up `name`: the closest
    /// enclosing zone or, if there is none, the cache.
    pub(super) fn getdb(
        &mut self,
        name: &Name,
        qtype: Type,
        options: DbOptions,
    ) -> Result<Selected, DbError> {
        match self.getzonedb(name, qtype, options) {
            Err(DbError::NotFound) => self.getcachedb(name, qtype, options),
            result => result,
        }
    }

    /// Selects the authoritative zone in which to look up `name`.
    pub(super) fn getzonedb(
        &mut self,
        name: &Name,
        qtype: Type,
        options: DbOptions,
    ) -> Result<Selected, DbError> {
        let (zone, partial) = match self.view.zones.find(name, options.no_exact) {
            ZoneMatch::Exact(zone) => (zone, false),
            ZoneMatch::Partial(zone) => (zone, true),
            ZoneMatch::NotFound => return Err(DbError::NotFound),
        };
        let version = self.validate_zone_db(name, qtype, options, &zone)?;
        if partial && options.partial {
            return Err(DbError::PartialMatch);
        }
        Ok(Selected {
            db: zone.db().clone(),
            version: Some(version),
            zone: Some(zone),
            is_zone: true,
        })
    }

    /// Checks that the query may use `zone`, returning the version of
    /// its database to search.
    fn validate_zone_db(
        &mut self,
        name: &Name,
        qtype: Type,
        options: DbOptions,
        zone: &Arc<Zone>,
    ) -> Result<Version, DbError> {
        let db = zone.db();

        // Unless additional data may come from other zones, a query
        // that started in a zone stays there.
        if !self.view.options.additional_from_auth
            && self.authdb_set
            && self.authdb.as_ref().map(|authdb| authdb.id()) != Some(db.id())
        {
            return Err(DbError::Refused);
        }

        let acquired = self.versions.acquire(db);
        if !acquired.new && !acquired.query_ok {
            return Err(DbError::Refused);
        }
        let mut check_acl = acquired.new;

        let view = self.view.clone();
        let acl = match zone.query_acl.as_ref() {
            Some(acl) => Some(acl),
            None => {
                match self.view_query_ok {
                    Some(true) => check_acl = false,
                    Some(false) => return Err(DbError::Refused),
                    None => check_acl = true,
                }
                view.query_acl.as_ref()
            }
        };

        if check_acl {
            let allowed = self.check_acl(acl, "query", name, qtype, options.no_log);
            if zone.query_acl.is_none() {
                self.view_query_ok = Some(allowed);
            }
            if !allowed {
                return Err(DbError::Refused);
            }
        }

        self.versions.approve(db.id());
        Ok(acquired.version)
    }

    /// Selects the cache for looking up `name`, if the query may use it.
    pub(super) fn getcachedb(
        &mut self,
        name: &Name,
        qtype: Type,
        options: DbOptions,
    ) -> Result<Selected, DbError> {
        let Some(db) = self.view.cache_db().filter(|_| self.attributes.cache_ok) else {
            return Err(DbError::Refused);
        };
        match self.view_query_ok {
            Some(true) => (),
            Some(false) => return Err(DbError::Refused),
            None => {
                let view = self.view.clone();
                let allowed = self.check_acl(
                    view.query_acl.as_ref(),
                    "query (cache)",
                    name,
                    qtype,
                    options.no_log,
                );
                self.view_query_ok = Some(allowed);
                if !allowed {
                    return Err(DbError::Refused);
                }
            }
        }
        Ok(Selected {
            db,
            version: None,
            zone: None,
            is_zone: false,
        })
    }

    /// Returns whether the client matches `acl`, logging the decision.
    /// A missing ACL allows everyone.
    fn check_acl(
        &self,
        acl: Option<&Acl>,
        what: &str,
        name: &Name,
        qtype: Type,
        no_log: bool,
    ) -> bool {
        let allowed = acl.map_or(true, |acl| acl.allows(self.client.peer().ip()));
        if !no_log {
            if allowed {
                debug!(
                    target: "security",
                    "{}: {} '{}/{}/{}' approved",
                    self.client, what, name, qtype, self.view.class,
                );
            } else {
                info!(
                    target: "security",
                    "{}: {} '{}/{}/{}' denied",
                    self.client, what, name, qtype, self.view.class,
                );
            }
        }
        allowed
    }

    /// Returns whether the query may use the cache.
    pub(super) fn use_cache(&self) -> bool {
        self.attributes.cache_ok && self.view.cache.is_some()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
