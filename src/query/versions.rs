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

//! Tracking of the database versions opened by a query.
//!
//! Every lookup a query makes in a given database must see the same
//! snapshot, so the first time a query touches a database it opens a
//! [`Version`] and keeps it until the query is finished. The tracker
//! also remembers whether the query was allowed to use each database,
//! so that access control is checked only once per database.
//!
//! Most queries touch one or two databases, so the first few versions
//! are kept inline.

use std::sync::Arc;

use arrayvec::ArrayVec;

use crate::db::{Database, DbId, Version};

/// The number of versions kept without allocating.
const INLINE_VERSIONS: usize = 3;

struct OpenVersion {
    db: Arc<dyn Database>,
    version: Version,
    query_ok: bool,
}

/// A version handed out by [`VersionTracker::acquire`].
#[derive(Debug)]
pub(super) struct Acquired {
    pub version: Version,

    /// Whether the version was opened by this call.
    pub new: bool,

    /// Whether the query has been approved to use the database.
    pub query_ok: bool,
}

/// The versions opened by one query. All of them are closed when the
/// tracker is dropped.
#[derive(Default)]
pub(super) struct VersionTracker {
    inline: ArrayVec<OpenVersion, INLINE_VERSIONS>,
    spilled: Vec<OpenVersion>,
}

impl VersionTracker {
    /// Returns the version of `db` used by this query, opening the
    /// current version if there is none yet.
    pub fn acquire(&mut self, db: &Arc<dyn Database>) -> Acquired {
        let id = db.id();
        if let Some(open) = self.find(id) {
            return Acquired {
                version: open.version.clone(),
                new: false,
                query_ok: open.query_ok,
            };
        }

        let open = OpenVersion {
            db: db.clone(),
            version: db.current_version(),
            query_ok: false,
        };
        let version = open.version.clone();
        if let Err(err) = self.inline.try_push(open) {
            self.spilled.push(err.element());
        }
        Acquired {
            version,
            new: true,
            query_ok: false,
        }
    }

    /// Records that the query may use the database `id`.
    pub fn approve(&mut self, id: DbId) {
        if let Some(open) = self.iter_mut().find(|open| open.db.id() == id) {
            open.query_ok = true;
        }
    }

    /// Returns the version of the database `id` in use by this query.
    pub fn get(&self, id: DbId) -> Option<&Version> {
        self.find(id).map(|open| &open.version)
    }

    pub fn len(&self) -> usize {
        self.inline.len() + self.spilled.len()
    }

    fn find(&self, id: DbId) -> Option<&OpenVersion> {
        self.inline
            .iter()
            .chain(self.spilled.iter())
            .find(|open| open.db.id() == id)
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut OpenVersion> {
        self.inline.iter_mut().chain(self.spilled.iter_mut())
    }
}

impl Drop for VersionTracker {
    fn drop(&mut self) {
        for open in self.inline.drain(..).chain(self.spilled.drain(..)) {
            open.db.close_version(open.version);
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
