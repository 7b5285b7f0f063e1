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

//! The query engine.
//!
//! [`start`] answers one question. It searches the view's authoritative
//! zones and cache following the algorithm of [RFC 1034 § 4.3.2]:
//!
//! 1. Select the database to search: the zone that most closely
//!    encloses the query name, or failing that the cache.
//! 2. Look the name up and act on the result. Answers go into the
//!    answer section; referrals and negative answers are built in the
//!    authority section. A CNAME or DNAME changes the query name and
//!    the search *restarts* (at most [`MAX_RESTARTS`] times).
//! 3. If the local data cannot answer and the client may recurse, hand
//!    the question to the view's [`Resolver`](crate::resolver::Resolver)
//!    and wait for it, then carry on from its result.
//! 4. Fill in the authority section, add the additional data the
//!    records call for, and finish the response.
//!
//! DNSSEC records and proofs ([RFC 4035 § 3.1]) are added for clients
//! that set the DO bit, and data from the cache that has not been
//! validated yet is validated inline where the keys are at hand.
//!
//! [RFC 1034 § 4.3.2]: https://datatracker.ietf.org/doc/html/rfc1034#section-4.3.2
//! [RFC 4035 § 3.1]: https://datatracker.ietf.org/doc/html/rfc4035#section-3.1

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::db::{Database, FindOptions};
use crate::message::{Rcode, Request, Response};
use crate::name::Name;
use crate::resolver::{Fetch, FetchOptions};
use crate::rr::Type;
use crate::server::Server;
use crate::view::{View, Zone};

mod additional;
mod answer;
mod authority;
mod find;
mod getdb;
mod recurse;
mod rfc1918;
mod start;
mod validate;
mod versions;

use recurse::Recursion;
use versions::VersionTracker;

/// The maximum number of times a query restarts to follow CNAME and
/// DNAME records.
pub const MAX_RESTARTS: usize = 16;

/// How long a query waits for the resolver before giving up.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

////////////////////////////////////////////////////////////////////////
// PUBLIC INTERFACE                                                   //
////////////////////////////////////////////////////////////////////////

/// Answers `request`, received from `client`, with the data of `view`.
/// Returns `None` when no response should be sent at all.
pub async fn start(
    server: Arc<Server>,
    view: Arc<View>,
    client: Client,
    request: Request,
) -> Option<Response> {
    let mut context = match Context::begin(server, view, client, request) {
        Ok(context) => context,
        Err(response) => return response,
    };
    let mut step = context.find(None);
    loop {
        match step {
            Step::Finished(response) => return response,
            Step::Recursing(fetch) => step = context.wait(fetch).await,
        }
    }
}

/// The client a query came from.
///
/// Clones of a `Client` share its shutdown flag: once
/// [`Client::shut_down`] is called, queries waiting on the resolver
/// give up without responding.
#[derive(Clone, Debug)]
pub struct Client {
    peer: SocketAddr,
    tcp: bool,
    shutting_down: Arc<AtomicBool>,
}

impl Client {
    /// Creates a client that sent its query over UDP.
    pub fn udp(peer: SocketAddr) -> Self {
        Self {
            peer,
            tcp: false,
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a client that sent its query over TCP.
    pub fn tcp(peer: SocketAddr) -> Self {
        Self {
            tcp: true,
            ..Self::udp(peer)
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_tcp(&self) -> bool {
        self.tcp
    }

    /// Marks the client (and its connection) as going away.
    pub fn shut_down(&self) {
        self.shutting_down.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }
}

/// Identifies the client at the start of log messages.
impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "client {}#{}", self.peer.ip(), self.peer.port())
    }
}

/// The ways answering a query can fail.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueryError {
    /// Access to the data was denied by policy.
    Refused,

    /// Something went wrong inside the server.
    ServFail,

    /// The query was malformed.
    FormErr,

    /// The query asked for something we do not implement.
    NotImp,

    /// The resolver is already working on the same query from the same
    /// client; the earlier query will be answered.
    Duplicate,

    /// The resolver chose to drop the query.
    Drop,

    /// DNAME substitution produced a name that is too long.
    YxDomain,

    /// The query was abandoned.
    Canceled,
}

impl QueryError {
    /// Returns the RCODE of the response to send, or `None` if no
    /// response should be sent.
    pub fn rcode(self) -> Option<Rcode> {
        match self {
            Self::Refused => Some(Rcode::Refused),
            Self::ServFail => Some(Rcode::ServFail),
            Self::FormErr => Some(Rcode::FormErr),
            Self::NotImp => Some(Rcode::NotImp),
            Self::YxDomain => Some(Rcode::YxDomain),
            Self::Duplicate | Self::Drop | Self::Canceled => None,
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Refused => "query refused",
            Self::ServFail => "server failure",
            Self::FormErr => "format error",
            Self::NotImp => "not implemented",
            Self::Duplicate => "duplicate query",
            Self::Drop => "query dropped",
            Self::YxDomain => "name too long after DNAME substitution",
            Self::Canceled => "query canceled",
        })
    }
}

impl std::error::Error for QueryError {}

////////////////////////////////////////////////////////////////////////
// QUERY CONTEXT                                                      //
////////////////////////////////////////////////////////////////////////

/// Flags describing what a query may do and what it has done.
#[derive(Clone, Copy, Debug, Default)]
struct Attributes {
    /// The query may be answered by recursion.
    recursion_ok: bool,

    /// The query may use the cache.
    cache_ok: bool,

    /// Part of the answer (a CNAME or DNAME) has been added.
    partial_answer: bool,

    /// The client set RD.
    want_recursion: bool,

    /// The client set DO.
    want_dnssec: bool,

    no_authority: bool,
    no_additional: bool,

    /// Everything in the answer and authority sections is secure.
    secure: bool,

    /// The response is a referral.
    referral: bool,

    /// The query is waiting on the resolver.
    recursing: bool,
}

/// What the driver should do after the engine returns control.
enum Step {
    Finished(Option<Response>),
    Recursing(Fetch),
}

/// The state of one query.
struct Context {
    server: Arc<Server>,
    view: Arc<View>,
    client: Client,

    /// The current query name, which changes as CNAMEs and DNAMEs are
    /// followed.
    qname: Name,
    qtype: Type,
    response: Response,
    attributes: Attributes,
    find_options: FindOptions,
    fetch_options: FetchOptions,
    restarts: usize,

    /// The zone database that answered the original question.
    authdb: Option<Arc<dyn Database>>,
    authdb_set: bool,
    authzone: Option<Arc<Zone>>,

    /// The database searched for glue while a referral is built.
    gluedb: Option<Arc<dyn Database>>,
    versions: VersionTracker,

    /// The result of the view's query ACL, once checked.
    view_query_ok: Option<bool>,
    recursion: Option<Recursion>,

    /// The time the query started, in seconds since the epoch.
    now: u64,
}

////////////////////////////////////////////////////////////////////////
// TEST FIXTURES                                                      //
////////////////////////////////////////////////////////////////////////

/// Zones, views and helpers for tests that drive the engine through
/// [`start`].
#[cfg(test)]
mod testing {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use super::{start, Client};
    use crate::class::Class;
    use crate::db::{group_records, CacheDb, Database, ZoneDb};
    use crate::dnssec::testing::Signer;
    use crate::message::{Question, Request, Response, Section};
    use crate::name::Name;
    use crate::rr::text::parse_records;
    use crate::rr::{Rrset, Type};
    use crate::server::Server;
    use crate::util::unix_time;
    use crate::view::{View, Zone};

    pub(super) const EXAMPLE: &str = "\
example.test. 7200 IN SOA ns.example.test. hostmaster.example.test. 1 3600 900 604800 3600
example.test. 3600 IN NS ns.example.test.
ns.example.test. 3600 IN A 192.0.2.53
www.example.test. 3600 IN CNAME host.example.test.
host.example.test. 3600 IN A 192.0.2.1
mail.example.test. 3600 IN MX 10 host.example.test.
multi.example.test. 3600 IN A 192.0.2.10
multi.example.test. 3600 IN A 198.51.100.10
sub.example.test. 3600 IN NS ns1.sub.example.test.
sub.example.test. 3600 IN NS ns2.sub.example.test.
sub.example.test. 3600 IN DS 12345 15 2 abcd
ns1.sub.example.test. 3600 IN A 192.0.2.54
ns2.sub.example.test. 3600 IN A 192.0.2.55
dn.example.test. 3600 IN DNAME example.other.
other.example.test. 3600 IN CNAME www.refused.test.
";

    pub(super) const REFUSED: &str = "\
refused.test. 3600 IN SOA ns.refused.test. hostmaster.refused.test. 1 3600 900 604800 300
refused.test. 3600 IN NS ns.refused.test.
www.refused.test. 3600 IN A 192.0.2.99
";

    pub(super) fn name(text: &str) -> Name {
        text.parse().unwrap()
    }

    pub(super) fn zone_db(origin: &str, text: &str) -> Arc<dyn Database> {
        let records = parse_records(text, None).unwrap();
        Arc::new(ZoneDb::from_records(name(origin), Class::IN, records).unwrap())
    }

    /// Builds a zone with every RRset signed by `signer`.
    pub(super) fn signed_zone_db(signer: &Signer, text: &str) -> Arc<dyn Database> {
        let mut rrsets = group_records(parse_records(text, None).unwrap()).unwrap();
        rrsets.push((signer.zone.clone(), signer.dnskey_rrset(3600)));
        let sigs: Vec<(Name, Rrset)> = rrsets
            .iter()
            .map(|(owner, rrset)| (owner.clone(), signer.sign(owner, rrset)))
            .collect();
        rrsets.extend(sigs);
        Arc::new(ZoneDb::new(signer.zone.clone(), Class::IN, rrsets).unwrap())
    }

    pub(super) fn view_with_zones(zones: Vec<Arc<dyn Database>>) -> View {
        let mut view = View::new(Class::IN);
        for db in zones {
            view.zones.insert(Zone::new(db));
        }
        view
    }

    pub(super) fn rrset(owner: &str, rr_type: Type, ttl: u32, rdata: &str) -> (Name, Rrset) {
        let text = format!("{owner} {ttl} IN {rr_type} {rdata}");
        group_records(parse_records(&text, None).unwrap())
            .unwrap()
            .pop()
            .unwrap()
    }

    pub(super) fn cache_with(rrsets: Vec<(Name, Rrset)>) -> Arc<CacheDb> {
        let cache = Arc::new(CacheDb::new(Class::IN));
        for (owner, rrset) in rrsets {
            cache.add_rrset(&owner, rrset, unix_time()).unwrap();
        }
        cache
    }

    /// Builds a view answering from `cache` alone.
    pub(super) fn cache_view(cache: Arc<CacheDb>) -> Arc<View> {
        let mut view = View::new(Class::IN);
        view.cache = Some(cache);
        Arc::new(view)
    }

    pub(super) fn peer() -> SocketAddr {
        "192.0.2.100:5300".parse().unwrap()
    }

    pub(super) fn request(qname: &str, qtype: Type, rd: bool) -> Request {
        Request {
            rd,
            ..Request::new(0x1234, Question::new(name(qname), qtype, Class::IN))
        }
    }

    pub(super) fn dnssec_request(qname: &str, qtype: Type) -> Request {
        Request {
            dnssec_ok: true,
            ..request(qname, qtype, false)
        }
    }

    pub(super) async fn ask_from(server: &Arc<Server>, view: &Arc<View>, client: Client, request: Request) -> Option<Response> {
        start(server.clone(), view.clone(), client, request).await
    }

    pub(super) async fn ask(view: &Arc<View>, request: Request) -> Response {
        let server = Arc::new(Server::default());
        ask_from(&server, view, Client::udp(peer()), request)
            .await
            .expect("no response")
    }

    pub(super) fn types_in(response: &Response, section: Section) -> Vec<(String, Type)> {
        response
            .entries(section)
            .iter()
            .flat_map(|entry| {
                entry
                    .rrsets
                    .iter()
                    .map(move |rrset| (entry.name.to_string(), rrset.rr_type))
            })
            .collect()
    }

    pub(super) fn has(response: &Response, section: Section, owner: &str, rr_type: Type) -> bool {
        types_in(response, section)
            .iter()
            .any(|(o, t)| o == owner && *t == rr_type)
    }

    pub(super) const SIGNED: &str = "\
signed.test. 3600 IN SOA ns.signed.test. hostmaster.signed.test. 1 3600 900 604800 300
signed.test. 3600 IN NS ns.signed.test.
signed.test. 300 IN NSEC ns.signed.test. SOA NS DNSKEY NSEC RRSIG
ns.signed.test. 3600 IN A 192.0.2.53
ns.signed.test. 300 IN NSEC *.w.signed.test. A NSEC RRSIG
*.w.signed.test. 3600 IN A 192.0.2.7
*.w.signed.test. 300 IN NSEC signed.test. A NSEC RRSIG
";
}
