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

//! Handing queries to the resolver.

use log::{debug, warn};
use tokio::time::timeout;

use super::{Context, QueryError, Step, FETCH_TIMEOUT};
use crate::name::Name;
use crate::quota::{Attach, QuotaGuard};
use crate::resolver::{Fetch, FetchError, FetchRequest};
use crate::rr::Rrset;
use crate::server::{QuotaWarning, Recursing};
use crate::stats::Counter;

/// What a query holds while the resolver works on its behalf: a unit
/// of the recursive-clients quota and its entry in the registry of
/// recursing queries.
pub(super) struct Recursion {
    _quota: QuotaGuard,
    registration: Recursing,
    pub(super) fetch: Option<Fetch>,
}

impl Context {
    /// Asks the resolver to fetch the current question. `qdomain` and
    /// `nameservers` describe the closest known zone cut, if any.
    pub(super) fn recurse(
        &mut self,
        qdomain: Option<Name>,
        nameservers: Option<Rrset>,
    ) -> Result<(), QueryError> {
        self.count(Counter::Recursion);

        if self.recursion.is_none() {
            let quota = match self.server.recursion_quota().attach() {
                Attach::Ok(guard) => guard,
                Attach::SoftLimit(guard) => {
                    if self.server.may_warn(QuotaWarning::Soft) {
                        warn!(
                            target: "client",
                            "{}: recursive-clients soft limit exceeded, aborting oldest query",
                            self.client,
                        );
                    }
                    self.server.kill_oldest();
                    guard
                }
                Attach::HardLimit => {
                    if self.server.may_warn(QuotaWarning::Hard) {
                        warn!(
                            target: "client",
                            "{}: no more recursive clients: quota reached",
                            self.client,
                        );
                    }
                    self.server.kill_oldest();
                    return Err(QueryError::ServFail);
                }
            };
            self.recursion = Some(Recursion {
                _quota: quota,
                registration: self.server.register_recursing(),
                fetch: None,
            });
        }

        let request = FetchRequest {
            qname: self.qname.clone(),
            qtype: self.qtype,
            qdomain,
            nameservers,
            peer: (!self.client.is_tcp()).then(|| self.client.peer()),
            id: self.response.id,
            options: self.fetch_options,
        };
        match self.view.resolver.create_fetch(request) {
            Ok(fetch) => {
                if let Some(ref mut recursion) = self.recursion {
                    recursion.fetch = Some(fetch);
                }
                self.attributes.recursing = true;
                Ok(())
            }
            Err(error) => {
                self.recursion = None;
                debug!("{}: fetch not started: {}", self.client, error);
                match error {
                    FetchError::Duplicate => Err(QueryError::Duplicate),
                    FetchError::Drop => Err(QueryError::Drop),
                    _ => Err(QueryError::ServFail),
                }
            }
        }
    }

    /// Waits for `fetch` to complete, or for the query to be evicted,
    /// and resumes the search from the result.
    pub(super) async fn wait(&mut self, fetch: Fetch) -> Step {
        // Only the registration is needed while waiting; the quota and
        // registration are released once the wait is over.
        let (quota, registration) = match self.recursion.take() {
            Some(Recursion {
                _quota: quota,
                registration,
                ..
            }) => (Some(quota), Some(registration)),
            None => (None, None),
        };
        let outcome = match registration {
            Some(ref registration) => {
                tokio::select! {
                    result = timeout(FETCH_TIMEOUT, fetch) => result.ok(),
                    _ = registration.killed() => Some(Err(FetchError::Canceled)),
                }
            }
            None => timeout(FETCH_TIMEOUT, fetch).await.ok(),
        };
        drop(registration);
        drop(quota);
        self.attributes.recursing = false;

        match outcome {
            None => {
                debug!("{}: fetch timed out", self.client);
                self.count(Counter::Failure);
                Step::Finished(None)
            }
            Some(Err(FetchError::Canceled)) => Step::Finished(self.fail(QueryError::ServFail)),
            Some(_) if self.client.is_shutting_down() => {
                Step::Finished(self.fail(QueryError::Canceled))
            }
            Some(result) => self.find(Some(result)),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::class::Class;
    use crate::db::{CacheDb, Database, FindOptions};
    use crate::message::{Rcode, Section};
    use crate::query::testing::*;
    use crate::query::{start, Client};
    use crate::resolver::{Fetch, FetchError, FetchRequest, FetchResponse, Resolver};
    use crate::rr::{Rdata, Rrset, Trust, Ttl, Type};
    use crate::server::Server;
    use crate::stats::Counter;
    use crate::util::unix_time;
    use crate::view::View;

    /// A resolver that records its requests and answers them according
    /// to `behavior`.
    #[derive(Debug)]
    struct TestResolver {
        behavior: Behavior,
        requests: Mutex<Vec<FetchRequest>>,
    }

    #[derive(Debug)]
    enum Behavior {
        /// Stores an A record for the query name in the cache and answers
        /// from there.
        Answer(Arc<CacheDb>),

        /// Never completes.
        Hang,

        /// Refuses to start the fetch.
        Refuse(FetchError),
    }

    impl TestResolver {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<FetchRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Resolver for TestResolver {
        fn create_fetch(&self, request: FetchRequest) -> Result<Fetch, FetchError> {
            self.requests.lock().unwrap().push(request.clone());
            match self.behavior {
                Behavior::Answer(ref cache) => {
                    let mut a = Rrset::new(Type::A, Class::IN, Ttl::from(300)).with_trust(Trust::Answer);
                    a.push_rdata(Rdata::new(vec![203, 0, 113, 1]).unwrap());
                    cache.add_rrset(&request.qname, a, unix_time()).unwrap();
                    let lookup = cache.find(
                        &request.qname,
                        None,
                        request.qtype,
                        FindOptions::default(),
                        unix_time(),
                    );
                    let response = FetchResponse {
                        db: cache.clone(),
                        found_name: request.qname,
                        lookup,
                    };
                    Ok(Box::pin(async move { Ok(response) }))
                }
                Behavior::Hang => Ok(Box::pin(std::future::pending::<Result<FetchResponse, FetchError>>())),
                Behavior::Refuse(error) => Err(error),
            }
        }
    }

    #[tokio::test]
    async fn recursion_answers_from_fetch() {
        let server = Arc::new(Server::default());
        let cache = Arc::new(CacheDb::new(Class::IN));
        let resolver = TestResolver::new(Behavior::Answer(cache.clone()));
        let mut view = View::new(Class::IN);
        view.cache = Some(cache);
        view.resolver = resolver.clone();
        let view = Arc::new(view);

        let response = ask_from(&server, &view, Client::udp(peer()), request("www.remote.test.", Type::A, true))
            .await
            .unwrap();
        assert_eq!(response.rcode, Rcode::NoError);
        assert!(response.ra);
        assert!(!response.aa);
        assert!(has(&response, Section::Answer, "www.remote.test.", Type::A));

        let requests = resolver.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].qname, name("www.remote.test."));
        assert_eq!(requests[0].peer, Some(peer()));
        assert_eq!(requests[0].id, 0x1234);
        assert_eq!(server.stats.get(Counter::Recursion), 1);
        assert_eq!(server.stats.get(Counter::Success), 1);
        assert_eq!(server.recursion_quota().used(), 0);
        assert_eq!(server.recursing(), 0);
    }

    #[tokio::test]
    async fn recursion_starts_at_cached_delegation() {
        let (apex, ns) = rrset("remote.test.", Type::NS, 3600, "ns.remote.test.");
        let cache = cache_with(vec![(apex, ns.with_trust(Trust::AuthAuthority))]);
        let resolver = TestResolver::new(Behavior::Answer(cache.clone()));
        let mut view = View::new(Class::IN);
        view.cache = Some(cache);
        view.resolver = resolver.clone();
        let view = Arc::new(view);

        let server = Arc::new(Server::default());
        let response = ask_from(&server, &view, Client::tcp(peer()), request("www.remote.test.", Type::A, true))
            .await
            .unwrap();
        assert!(has(&response, Section::Answer, "www.remote.test.", Type::A));
        let requests = resolver.requests();
        assert_eq!(requests[0].qdomain, Some(name("remote.test.")));
        assert!(requests[0].nameservers.is_some());
        assert_eq!(requests[0].peer, None);
    }

    #[tokio::test]
    async fn duplicate_fetch_gets_no_response() {
        let server = Arc::new(Server::default());
        let mut view = View::new(Class::IN);
        view.cache = Some(Arc::new(CacheDb::new(Class::IN)));
        view.resolver = TestResolver::new(Behavior::Refuse(FetchError::Duplicate));
        let view = Arc::new(view);
        let response = ask_from(&server, &view, Client::udp(peer()), request("www.remote.test.", Type::A, true)).await;
        assert!(response.is_none());
        assert_eq!(server.stats.get(Counter::Duplicate), 1);
        assert_eq!(server.recursion_quota().used(), 0);
    }

    #[tokio::test]
    async fn shut_down_client_gets_no_response() {
        let cache = Arc::new(CacheDb::new(Class::IN));
        let mut view = View::new(Class::IN);
        view.cache = Some(cache.clone());
        view.resolver = TestResolver::new(Behavior::Answer(cache));
        let view = Arc::new(view);
        let server = Arc::new(Server::default());
        let client = Client::udp(peer());
        client.shut_down();
        let response = ask_from(&server, &view, client, request("www.remote.test.", Type::A, true)).await;
        assert!(response.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_timeout_gets_no_response() {
        let mut view = View::new(Class::IN);
        view.cache = Some(Arc::new(CacheDb::new(Class::IN)));
        view.resolver = TestResolver::new(Behavior::Hang);
        let view = Arc::new(view);
        let server = Arc::new(Server::default());
        let response = ask_from(&server, &view, Client::udp(peer()), request("www.remote.test.", Type::A, true)).await;
        assert!(response.is_none());
        assert_eq!(server.stats.get(Counter::Failure), 1);
    }

    fn hanging_view() -> Arc<View> {
        let mut view = View::new(Class::IN);
        view.cache = Some(Arc::new(CacheDb::new(Class::IN)));
        view.resolver = TestResolver::new(Behavior::Hang);
        Arc::new(view)
    }

    #[tokio::test]
    async fn soft_quota_evicts_oldest_query() {
        let server = Arc::new(Server::new(10, 1));
        let view = hanging_view();
        let first = tokio::spawn(start(
            server.clone(),
            view.clone(),
            Client::udp(peer()),
            request("one.remote.test.", Type::A, true),
        ));
        while server.recursing() == 0 {
            tokio::task::yield_now().await;
        }
        let second = tokio::spawn(start(
            server.clone(),
            view.clone(),
            Client::udp(peer()),
            request("two.remote.test.", Type::A, true),
        ));

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.rcode, Rcode::ServFail);
        while server.recursing() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(server.recursion_quota().used(), 1);
        second.abort();
    }

    #[tokio::test]
    async fn hard_quota_fails_query() {
        let server = Arc::new(Server::new(1, 0));
        let view = hanging_view();
        let first = tokio::spawn(start(
            server.clone(),
            view.clone(),
            Client::udp(peer()),
            request("one.remote.test.", Type::A, true),
        ));
        while server.recursing() == 0 {
            tokio::task::yield_now().await;
        }

        let second = ask_from(&server, &view, Client::udp(peer()), request("two.remote.test.", Type::A, true))
            .await
            .unwrap();
        assert_eq!(second.rcode, Rcode::ServFail);

        // The oldest query was told to give up to make room.
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.rcode, Rcode::ServFail);
        assert_eq!(server.recursion_quota().used(), 0);
    }
}
