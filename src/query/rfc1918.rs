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

//! Detection of leaked RFC 1918 reverse lookups.
//!
//! The reverse zones for the private address space of [RFC 1918] are
//! served on the Internet by the AS112 project ([RFC 7534]), whose
//! servers answer every query with NXDOMAIN under an SOA naming
//! `prisoner.iana.org`. A cached negative answer carrying that SOA means
//! a private reverse lookup leaked out of the site, which is worth a
//! warning: the site should serve these zones itself.
//!
//! [RFC 1918]: https://datatracker.ietf.org/doc/html/rfc1918
//! [RFC 7534]: https://datatracker.ietf.org/doc/html/rfc7534

use lazy_static::lazy_static;
use log::warn;

use super::Context;
use crate::db::NegativeCache;
use crate::name::Name;
use crate::rr::rdata::Soa;
use crate::rr::Type;

lazy_static! {
    static ref RFC1918_ZONES: Vec<Name> = {
        let mut zones = vec!["10.IN-ADDR.ARPA.".to_owned()];
        zones.extend((16..32).map(|octet| format!("{octet}.172.IN-ADDR.ARPA.")));
        zones.push("168.192.IN-ADDR.ARPA.".to_owned());
        zones.iter().filter_map(|zone| zone.parse().ok()).collect()
    };
    static ref PRISONER: Option<Name> = "prisoner.iana.org.".parse().ok();
    static ref HOSTMASTER: Option<Name> = "hostmaster.root-servers.org.".parse().ok();
}

impl Context {
    /// Logs a warning if `negative` is an AS112 answer for a private
    /// reverse zone.
    pub(super) fn warn_rfc1918(&self, negative: &NegativeCache) {
        let Some(zone) = RFC1918_ZONES
            .iter()
            .find(|zone| negative.name.eq_or_subdomain_of(zone))
        else {
            return;
        };
        let from_as112 = negative.records.iter().any(|(owner, rrset)| {
            owner == zone
                && rrset.rr_type == Type::SOA
                && rrset
                    .first()
                    .and_then(|rdata| Soa::parse(rdata).ok())
                    .map_or(false, |soa| {
                        PRISONER.as_ref() == Some(&soa.mname)
                            && HOSTMASTER.as_ref() == Some(&soa.rname)
                    })
        });
        if from_as112 {
            warn!(
                target: "security",
                "{}: RFC 1918 response from Internet for {}",
                self.client, negative.name,
            );
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::{Arc, Once};

    use log::{LevelFilter, Log, Metadata, Record};

    use super::*;
    use crate::class::Class;
    use crate::db::CacheDb;
    use crate::message::{Rcode, Section};
    use crate::query::testing::*;
    use crate::rr::{Trust, Ttl};
    use crate::util::unix_time;
    use crate::view::View;

    #[test]
    fn private_reverse_zones() {
        assert_eq!(RFC1918_ZONES.len(), 18);
        let name: Name = "1.0.20.172.in-addr.arpa.".parse().unwrap();
        assert!(RFC1918_ZONES.iter().any(|zone| name.eq_or_subdomain_of(zone)));
        let name: Name = "1.0.32.172.in-addr.arpa.".parse().unwrap();
        assert!(!RFC1918_ZONES.iter().any(|zone| name.eq_or_subdomain_of(zone)));
        assert!(PRISONER.is_some() && HOSTMASTER.is_some());
    }

    /// A logger collecting the records logged on the current thread.
    struct Capture;

    thread_local! {
        static CAPTURED: RefCell<Vec<(String, String)>> = RefCell::new(Vec::new());
    }

    impl Log for Capture {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            CAPTURED.with(|captured| {
                captured
                    .borrow_mut()
                    .push((record.target().to_owned(), record.args().to_string()))
            });
        }

        fn flush(&self) {}
    }

    static CAPTURE: Capture = Capture;

    fn capture_logs() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            log::set_logger(&CAPTURE).unwrap();
            log::set_max_level(LevelFilter::Trace);
        });
        CAPTURED.with(|captured| captured.borrow_mut().clear());
    }

    fn captured(target: &str) -> Vec<String> {
        CAPTURED.with(|captured| {
            captured
                .borrow()
                .iter()
                .filter(|(t, _)| t == target)
                .map(|(_, message)| message.clone())
                .collect()
        })
    }

    fn as112_view(mname: &str) -> Arc<View> {
        let (zone, soa) = rrset(
            "10.in-addr.arpa.",
            Type::SOA,
            300,
            &format!("{mname} hostmaster.root-servers.org. 1 604800 60 604800 604800"),
        );
        let cache = Arc::new(CacheDb::new(Class::IN));
        cache.add_negative(
            &name("4.3.2.10.in-addr.arpa."),
            None,
            vec![(zone, soa.with_trust(Trust::AuthAuthority))],
            Ttl::from(300),
            unix_time(),
        );
        let mut view = View::new(Class::IN);
        view.cache = Some(cache);
        Arc::new(view)
    }

    #[tokio::test]
    async fn rfc1918_leak_is_logged() {
        capture_logs();
        let view = as112_view("prisoner.iana.org.");
        let response = ask(&view, request("4.3.2.10.in-addr.arpa.", Type::PTR, false)).await;
        assert_eq!(response.rcode, Rcode::NxDomain);
        assert!(has(&response, Section::Authority, "10.in-addr.arpa.", Type::SOA));
        assert_eq!(
            captured("security"),
            vec!["client 192.0.2.100#5300: RFC 1918 response from Internet for 4.3.2.10.in-addr.arpa.".to_owned()]
        );
    }

    #[tokio::test]
    async fn other_negative_answers_are_not_logged() {
        capture_logs();
        let view = as112_view("ns.example.test.");
        let response = ask(&view, request("4.3.2.10.in-addr.arpa.", Type::PTR, false)).await;
        assert_eq!(response.rcode, Rcode::NxDomain);
        assert!(captured("security").is_empty());
    }
}
