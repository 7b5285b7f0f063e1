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

//! Adding RRsets to the response, and finishing it.

use log::debug;

use super::{Context, QueryError};
use crate::message::{FindName, Rcode, Response, Section};
use crate::name::Name;
use crate::rr::{Rrset, Trust, Type};
use crate::stats::Counter;
use crate::view::SortList;

impl Context {
    /// Adds `rrset`, owned by `name`, to `section` of the response, along
    /// with its signatures (if the client wants them) and the additional
    /// data its records call for. Nothing is done if the response already
    /// has the RRset in that section.
    pub(super) fn add_rrset(
        &mut self,
        section: Section,
        name: &Name,
        mut rrset: Rrset,
        sigs: Option<Rrset>,
    ) {
        if self
            .response
            .find_name(section, name, rrset.rr_type, rrset.covers)
            == FindName::RrsetExists
        {
            return;
        }
        if rrset.trust != Trust::Secure && section != Section::Additional {
            self.attributes.secure = false;
        }

        self.view.rrset_order.apply(&mut rrset);
        let targets: Vec<(Name, Type)> = if self.attributes.no_additional {
            Vec::new()
        } else {
            rrset
                .rdatas()
                .filter_map(|rdata| rdata.additional_target(rrset.rr_type))
                .collect()
        };
        self.response.add_rrset(section, name, rrset);
        for (target, qtype) in targets {
            self.add_additional(&target, qtype);
        }

        if let Some(sigs) = sigs.filter(|sigs| self.attributes.want_dnssec && !sigs.is_empty()) {
            self.response.add_rrset(section, name, sigs);
        }
    }

    /// Increments `counter` for the server and for the zone that
    /// answered the original question.
    pub(super) fn count(&self, counter: Counter) {
        self.server.stats.increment(counter);
        if let Some(zone) = self.authzone.as_ref() {
            zone.stats.increment(counter);
        }
    }

    /// Handles a failed query, returning the response to send (if any).
    pub(super) fn fail(&mut self, error: QueryError) -> Option<Response> {
        debug!("{}: query failed ({})", self.client, error);
        match error {
            QueryError::Duplicate => {
                self.count(Counter::Duplicate);
                None
            }
            QueryError::Drop => {
                self.count(Counter::Dropped);
                None
            }
            error => {
                self.count(Counter::Failure);
                let rcode = error.rcode()?;
                let mut response = Response::new(self.response.id, self.response.question.clone());
                response.rcode = rcode;
                response.rd = self.response.rd;
                response.cd = self.response.cd;
                response.ra = self.response.ra;
                Some(response)
            }
        }
    }

    /// Puts the final touches on the response and returns it.
    pub(super) fn finish(&mut self) -> Response {
        if let Some(prefer) = self.view.sortlist.select(self.client.peer().ip()) {
            self.response
                .for_each_rrset_mut(|_, _, rrset| SortList::sort(prefer, rrset));
        }

        // A referral for the address of a name we have glue for: put the
        // glue first, so that resolvers which only look at the first
        // additional record find it.
        if self.response.count(Section::Answer) == 0
            && self.response.rcode == Rcode::NoError
            && (self.qtype == Type::A || self.qtype == Type::AAAA)
        {
            self.response
                .move_to_front(Section::Additional, &self.qname, self.qtype);
        }

        if self.response.rcode == Rcode::NxDomain && self.view.options.auth_nxdomain {
            self.response.aa = true;
        }
        if !self.attributes.secure {
            self.response.ad = false;
        }

        let counter = match self.response.rcode {
            Rcode::NoError if self.response.count(Section::Answer) == 0 => {
                if self.attributes.referral {
                    Counter::Referral
                } else {
                    Counter::NxRrset
                }
            }
            Rcode::NoError => Counter::Success,
            Rcode::NxDomain => Counter::NxDomain,
            _ => Counter::Failure,
        };
        self.count(counter);

        let id = self.response.id;
        std::mem::replace(&mut self.response, Response::new(id, None))
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::dnssec::testing::Signer;
    use crate::message::{Rcode, Section};
    use crate::query::testing::*;
    use crate::query::Client;
    use crate::rr::Type;
    use crate::server::Server;
    use crate::stats::Counter;
    use crate::view::{SortEntry, SortList};

    #[tokio::test]
    async fn nodata_and_counters() {
        let server = Arc::new(Server::default());
        let view = Arc::new(view_with_zones(vec![zone_db("example.test.", EXAMPLE)]));
        let response = ask_from(&server, &view, Client::udp(peer()), request("host.example.test.", Type::MX, false))
            .await
            .unwrap();
        assert_eq!(response.rcode, Rcode::NoError);
        assert_eq!(response.count(Section::Answer), 0);
        assert!(has(&response, Section::Authority, "example.test.", Type::SOA));
        assert_eq!(server.stats.get(Counter::NxRrset), 1);

        let zone = view.zones.find(&name("example.test."), false);
        assert_eq!(zone.zone().unwrap().stats.get(Counter::NxRrset), 1);
    }

    #[tokio::test]
    async fn repeated_queries_get_identical_responses() {
        let view = Arc::new(view_with_zones(vec![zone_db("example.test.", EXAMPLE)]));
        let first = ask(&view, request("www.example.test.", Type::A, false)).await;
        let second = ask(&view, request("www.example.test.", Type::A, false)).await;
        assert_eq!(first.to_string(), second.to_string());
    }

    #[tokio::test]
    async fn sortlist_prefers_client_network() {
        let mut view = view_with_zones(vec![zone_db("example.test.", EXAMPLE)]);
        view.sortlist = SortList::new(vec![SortEntry {
            client: "198.51.100.0/24".parse().unwrap(),
            prefer: None,
        }]);
        let view = Arc::new(view);
        let server = Arc::new(Server::default());
        let client = Client::udp("198.51.100.77:5300".parse().unwrap());
        let response = ask_from(&server, &view, client, request("multi.example.test.", Type::A, false))
            .await
            .unwrap();
        let a = response
            .rrset(Section::Answer, &name("multi.example.test."), Type::A)
            .unwrap();
        assert_eq!(a.first().unwrap().octets(), &[198, 51, 100, 10]);
    }

    #[tokio::test]
    async fn answer_in_glue_is_moved_to_front() {
        let view = Arc::new(view_with_zones(vec![zone_db("example.test.", EXAMPLE)]));
        let response = ask(&view, request("ns2.sub.example.test.", Type::A, false)).await;
        let additional = response.entries(Section::Additional);
        assert_eq!(additional[0].name, name("ns2.sub.example.test."));
    }

    #[tokio::test]
    async fn signed_answer_includes_signatures() {
        let signer = Signer::new("signed.test.");
        let view = Arc::new(view_with_zones(vec![signed_zone_db(&signer, SIGNED)]));

        let response = ask(&view, dnssec_request("ns.signed.test.", Type::A)).await;
        assert!(has(&response, Section::Answer, "ns.signed.test.", Type::RRSIG));

        let response = ask(&view, request("ns.signed.test.", Type::A, false)).await;
        assert!(!has(&response, Section::Answer, "ns.signed.test.", Type::RRSIG));
    }
}
