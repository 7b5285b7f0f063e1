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

//! Setting up a query from a request.

use std::sync::Arc;

use log::{debug, info};

use super::versions::VersionTracker;
use super::{Attributes, Client, Context, QueryError};
use crate::db::FindOptions;
use crate::message::{Rcode, Request, Response};
use crate::resolver::FetchOptions;
use crate::rr::Type;
use crate::server::Server;
use crate::stats::Counter;
use crate::util::unix_time;
use crate::view::View;

impl Context {
    /// Checks `request` and sets up the state to answer it. If the
    /// request cannot be answered, the error response (or `None` for no
    /// response) is returned instead.
    pub(super) fn begin(
        server: Arc<Server>,
        view: Arc<View>,
        client: Client,
        mut request: Request,
    ) -> Result<Self, Option<Response>> {
        if !view.options.dnssec_enable {
            request.cd = false;
            request.dnssec_ok = false;
        }

        let mut attributes = Attributes {
            recursion_ok: true,
            cache_ok: true,
            secure: true,
            want_recursion: request.rd,
            want_dnssec: request.dnssec_ok,
            ..Default::default()
        };
        if view.options.minimal_responses {
            attributes.no_authority = true;
            attributes.no_additional = true;
        }

        let recursion_available = view.options.recursion
            && view
                .recursion_acl
                .as_ref()
                .map_or(true, |acl| acl.allows(client.peer.ip()));
        if view.cache.is_none() || !view.options.additional_from_cache {
            attributes.recursion_ok = false;
            attributes.cache_ok = false;
        } else if !recursion_available || !request.rd {
            attributes.recursion_ok = false;
        }

        let mut response = Response::new(request.id, None);
        response.rd = request.rd;
        response.cd = request.cd;
        response.ra = recursion_available;
        let reject = |mut response: Response, error: QueryError| {
            debug!("{}: {}", client, error);
            server.stats.increment(Counter::Failure);
            response.rcode = error.rcode().unwrap_or(Rcode::ServFail);
            Some(response)
        };

        let question = match request.questions.as_slice() {
            [question] => question.clone(),
            _ => return Err(reject(response, QueryError::FormErr)),
        };
        response.question = Some(question.clone());

        if view.options.log_queries {
            info!(
                target: "queries",
                "{}: query: {} {} {} {}{}",
                client,
                question.qname,
                question.qclass,
                question.qtype,
                if request.rd { '+' } else { '-' },
                if request.dnssec_ok { "E" } else { "" },
            );
        }

        // Zone transfers and transaction keys are handled elsewhere, if
        // at all, and MAILA and MAILB are obsolete.
        let qtype = question.qtype;
        if qtype.is_meta() && qtype != Type::ANY {
            let error = match qtype {
                Type::AXFR | Type::IXFR | Type::TKEY | Type::MAILA | Type::MAILB => {
                    QueryError::NotImp
                }
                _ => QueryError::FormErr,
            };
            return Err(reject(response, error));
        }
        if question.qclass != view.class {
            return Err(reject(response, QueryError::Refused));
        }

        let mut find_options = FindOptions::default();
        let mut fetch_options = FetchOptions::default();
        if request.cd || qtype == Type::RRSIG {
            find_options.pending_ok = true;
            fetch_options.no_validate = true;
        } else if !view.options.dnssec_validation {
            fetch_options.no_validate = true;
        }
        if request.cd {
            attributes.secure = false;
        }

        response.aa = true;
        response.ad = attributes.want_dnssec;

        Ok(Self {
            server,
            view,
            client,
            qname: question.qname,
            qtype,
            response,
            attributes,
            find_options,
            fetch_options,
            restarts: 0,
            authdb: None,
            authdb_set: false,
            authzone: None,
            gluedb: None,
            versions: VersionTracker::default(),
            view_query_ok: None,
            recursion: None,
            now: unix_time(),
        })
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::class::Class;
    use crate::message::{Question, Rcode, Section};
    use crate::query::testing::*;
    use crate::rr::Type;

    #[tokio::test]
    async fn malformed_and_unsupported_questions() {
        let view = Arc::new(view_with_zones(vec![zone_db("example.test.", EXAMPLE)]));

        let mut two = request("host.example.test.", Type::A, false);
        two.questions.push(Question::new(name("www.example.test."), Type::A, Class::IN));
        assert_eq!(ask(&view, two).await.rcode, Rcode::FormErr);

        let axfr = request("example.test.", Type::AXFR, false);
        assert_eq!(ask(&view, axfr).await.rcode, Rcode::NotImp);

        let mut chaos = request("host.example.test.", Type::A, false);
        chaos.questions[0].qclass = Class::CH;
        assert_eq!(ask(&view, chaos).await.rcode, Rcode::Refused);
    }

    #[tokio::test]
    async fn minimal_responses_omit_authority_and_additional() {
        let mut view = view_with_zones(vec![zone_db("example.test.", EXAMPLE)]);
        view.options.minimal_responses = true;
        let view = Arc::new(view);
        let response = ask(&view, request("mail.example.test.", Type::MX, false)).await;
        assert_eq!(response.count(Section::Answer), 1);
        assert_eq!(response.count(Section::Authority), 0);
        assert_eq!(response.count(Section::Additional), 0);
    }
}
