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

//! Server-wide state shared by all queries.
//!
//! The [`Server`] structure holds what every query in the process sees:
//! the query counters, the recursive-clients quota, and the registry of
//! queries that are currently waiting on the resolver. The registry is
//! ordered by age so that, when the quota's soft limit is reached, the
//! oldest recursing query can be told to give up.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::quota::Quota;
use crate::stats::Counters;
use crate::util::unix_time;

////////////////////////////////////////////////////////////////////////
// SERVER                                                             //
////////////////////////////////////////////////////////////////////////

/// State shared by all queries handled by a server.
#[derive(Debug)]
pub struct Server {
    /// Server-wide query counters.
    pub stats: Counters,
    recursion_quota: Arc<Quota>,
    recursing: Mutex<VecDeque<(u64, Arc<Notify>)>>,
    next_id: AtomicU64,
    last_soft_warning: AtomicU64,
    last_hard_warning: AtomicU64,
}

/// Which recursive-clients warning is being rate limited.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum QuotaWarning {
    Soft,
    Hard,
}

impl Server {
    /// Creates a new `Server` allowing at most `recursive_clients`
    /// queries to recurse at once. Past `recursive_clients_soft`, the
    /// oldest recursing query is evicted to make room for each new one.
    /// Zero means "unlimited" for either limit.
    pub fn new(recursive_clients: usize, recursive_clients_soft: usize) -> Self {
        Self {
            stats: Counters::new(),
            recursion_quota: Arc::new(Quota::new(recursive_clients, recursive_clients_soft)),
            recursing: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(0),
            last_soft_warning: AtomicU64::new(0),
            last_hard_warning: AtomicU64::new(0),
        }
    }

    pub fn recursion_quota(&self) -> &Arc<Quota> {
        &self.recursion_quota
    }

    /// Returns the number of queries currently waiting on the resolver.
    pub fn recursing(&self) -> usize {
        self.lock_recursing().len()
    }

    /// Adds a query to the registry of recursing queries. The query is
    /// removed when the returned guard is dropped.
    pub(crate) fn register_recursing(self: &Arc<Self>) -> Recursing {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let notify = Arc::new(Notify::new());
        self.lock_recursing().push_back((id, notify.clone()));
        Recursing {
            server: self.clone(),
            id,
            notify,
        }
    }

    /// Tells the oldest recursing query to give up. Returns whether
    /// there was one.
    pub(crate) fn kill_oldest(&self) -> bool {
        match self.lock_recursing().pop_front() {
            Some((_, notify)) => {
                notify.notify_one();
                true
            }
            None => false,
        }
    }

    /// Returns whether a warning of the given kind may be logged now.
    /// Each kind is logged at most once per second.
    pub(crate) fn may_warn(&self, warning: QuotaWarning) -> bool {
        self.may_warn_at(warning, unix_time())
    }

    fn may_warn_at(&self, warning: QuotaWarning, now: u64) -> bool {
        let last = match warning {
            QuotaWarning::Soft => &self.last_soft_warning,
            QuotaWarning::Hard => &self.last_hard_warning,
        };
        let previous = last.load(Ordering::Relaxed);
        previous != now
            && last
                .compare_exchange(previous, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
    }

    fn lock_recursing(&self) -> MutexGuard<VecDeque<(u64, Arc<Notify>)>> {
        // The registry is always consistent, so a poisoned lock is safe
        // to reuse.
        self.recursing.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// A query's entry in the registry of recursing queries.
#[derive(Debug)]
pub(crate) struct Recursing {
    server: Arc<Server>,
    id: u64,
    notify: Arc<Notify>,
}

impl Recursing {
    /// Returns a future that completes when the query is evicted.
    pub(crate) fn killed(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

impl Drop for Recursing {
    fn drop(&mut self) {
        self.server
            .lock_recursing()
            .retain(|(id, _)| *id != self.id);
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_ordered_by_age() {
        let server = Arc::new(Server::new(0, 0));
        let first = server.register_recursing();
        let second = server.register_recursing();
        assert_eq!(server.recursing(), 2);
        assert!(server.kill_oldest());
        assert_eq!(server.recursing(), 1);
        drop(second);
        assert_eq!(server.recursing(), 0);
        drop(first);
        assert!(!server.kill_oldest());
    }

    #[tokio::test]
    async fn killed_query_is_notified() {
        let server = Arc::new(Server::new(0, 0));
        let query = server.register_recursing();
        server.kill_oldest();
        // The notification is stored until the query waits for it.
        query.killed().await;
    }

    #[test]
    fn warnings_are_rate_limited() {
        let server = Server::new(0, 0);
        assert!(server.may_warn_at(QuotaWarning::Soft, 100));
        assert!(server.may_warn_at(QuotaWarning::Hard, 100));
        assert!(!server.may_warn_at(QuotaWarning::Soft, 100));
        assert!(server.may_warn_at(QuotaWarning::Soft, 101));
    }
}
