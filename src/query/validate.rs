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

//! Inline validation of pending data.
//!
//! Data the resolver has cached but not yet validated is *pending*. If
//! the keys needed to validate it are already cached and secure, the
//! query engine validates it on the spot ([RFC 4035 § 5.3]) instead of
//! waiting for the resolver, and stores the result back in the cache.
//!
//! [RFC 4035 § 5.3]: https://datatracker.ietf.org/doc/html/rfc4035#section-5.3

use std::sync::Arc;

use log::debug;

use super::Context;
use crate::db::Database;
use crate::dnssec::{self, Error};
use crate::name::Name;
use crate::rr::rdata::{Dnskey, Rrsig};
use crate::rr::{Rrset, Trust, Type};

impl Context {
    /// Tries to validate `rrset`, owned by `name`, with the signatures
    /// in `sigs` and the secure keys in `db`. On success, both RRsets
    /// are marked secure (here and in `db`) and `true` is returned.
    pub(super) fn validate(
        &self,
        db: &Arc<dyn Database>,
        name: &Name,
        rrset: &mut Rrset,
        sigs: Option<&mut Rrset>,
    ) -> bool {
        let Some(sigs) = sigs else {
            return false;
        };
        if sigs.is_empty() {
            return false;
        }

        for rrsig in sigs.rdatas().filter_map(|rdata| Rrsig::parse(rdata).ok()) {
            if !dnssec::is_supported(rrsig.algorithm) || !name.eq_or_subdomain_of(&rrsig.signer) {
                continue;
            }
            let Some((keys, _)) = db.find_rrset(&rrsig.signer, None, Type::DNSKEY, self.now) else {
                continue;
            };
            if keys.trust != Trust::Secure {
                continue;
            }
            let verified = keys
                .rdatas()
                .filter_map(|rdata| Dnskey::parse(rdata).ok())
                .filter(|key| {
                    key.algorithm == rrsig.algorithm
                        && key.key_tag == rrsig.key_tag
                        && key.is_zone_key()
                })
                .any(|key| self.verify(name, rrset, &rrsig, &key));
            if verified {
                rrset.trust = Trust::Secure;
                sigs.trust = Trust::Secure;
                for secured in [&*rrset, &*sigs] {
                    if let Err(err) = db.add_rrset(name, secured.clone(), self.now) {
                        debug!("failed to store validated {name}/{}: {err}", secured.rr_type);
                    }
                }
                return true;
            }
        }
        false
    }

    fn verify(&self, name: &Name, rrset: &Rrset, rrsig: &Rrsig, key: &Dnskey) -> bool {
        let now = self.now as u32;
        match dnssec::verify(name, rrset, rrsig, key, now, false) {
            Ok(()) => true,
            Err(Error::Expired) if self.view.options.accept_expired => {
                dnssec::verify(name, rrset, rrsig, key, now, true).is_ok()
            }
            Err(_) => false,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;
    use crate::db::CacheDb;
    use crate::dnssec::testing::{Signer, INCEPTION};
    use crate::message::{Rcode, Section};
    use crate::query::testing::*;
    use crate::rr::Ttl;
    use crate::util::unix_time;
    use crate::view::View;

    #[tokio::test]
    async fn pending_cache_data_is_validated() {
        let signer = Signer::new("secure.test.");
        let (www, a) = rrset("www.secure.test.", Type::A, 300, "203.0.113.7");
        let sigs = signer.sign(&www, &a);
        let cache = cache_with(vec![
            (signer.zone.clone(), signer.dnskey_rrset(3600).with_trust(Trust::Secure)),
            (
                signer.zone.clone(),
                signer
                    .sign(&signer.zone, &signer.dnskey_rrset(3600))
                    .with_trust(Trust::Secure),
            ),
            (www.clone(), a.with_trust(Trust::PendingAnswer)),
            (www.clone(), sigs.with_trust(Trust::PendingAnswer)),
        ]);
        let mut view = View::new(Class::IN);
        view.cache = Some(cache.clone());
        let view = Arc::new(view);

        let response = ask(&view, request("www.secure.test.", Type::A, false)).await;
        assert!(has(&response, Section::Answer, "www.secure.test.", Type::A));
        let (stored, _) = cache
            .find_rrset(&www, None, Type::A, unix_time())
            .unwrap();
        assert_eq!(stored.trust, Trust::Secure);

        // Now that it is secure, DNSSEC clients see it too, with AD set.
        let response = ask(&view, dnssec_request("www.secure.test.", Type::A)).await;
        assert!(has(&response, Section::Answer, "www.secure.test.", Type::RRSIG));
        assert!(response.ad);
    }

    /// Builds a cache holding the secure keys of `signer`'s zone, a
    /// delegation to it, and `a` as pending data signed by `sigs`.
    fn pending_cache(signer: &Signer, www: &Name, a: Rrset, sigs: Rrset) -> Arc<CacheDb> {
        let (apex, ns) = rrset("secure.test.", Type::NS, 3600, "ns.secure.test.");
        cache_with(vec![
            (signer.zone.clone(), signer.dnskey_rrset(3600).with_trust(Trust::Secure)),
            (apex, ns.with_trust(Trust::AuthAuthority)),
            (www.clone(), a.with_trust(Trust::PendingAnswer)),
            (www.clone(), sigs.with_trust(Trust::PendingAnswer)),
        ])
    }

    #[tokio::test]
    async fn failed_validation_hides_pending_data() {
        let signer = Signer::new("secure.test.");
        let (www, a) = rrset("www.secure.test.", Type::A, 300, "203.0.113.7");
        let forged = Signer::new("secure.test.").sign(&www, &a);
        let cache = pending_cache(&signer, &www, a, forged);
        let response = ask(&cache_view(cache.clone()), request("www.secure.test.", Type::A, false)).await;

        // The lookup is repeated without pending data and finds only the
        // delegation.
        assert_eq!(response.rcode, Rcode::NoError);
        assert_eq!(response.count(Section::Answer), 0);
        assert!(has(&response, Section::Authority, "secure.test.", Type::NS));
        let (stored, _) = cache.find_rrset(&www, None, Type::A, unix_time()).unwrap();
        assert_eq!(stored.trust, Trust::PendingAnswer);
    }

    #[tokio::test]
    async fn expired_signatures_can_be_accepted() {
        let signer = Signer::new("secure.test.");
        let (www, a) = rrset("www.secure.test.", Type::A, 300, "203.0.113.7");
        let mut expired = Rrset::new_signatures(Type::A, Class::IN, Ttl::from(300));
        expired.push_rdata(signer.rrsig(&www, &a, INCEPTION + 1).to_rdata().unwrap());

        let cache = pending_cache(&signer, &www, a.clone(), expired.clone());
        let response = ask(&cache_view(cache), request("www.secure.test.", Type::A, false)).await;
        assert_eq!(response.count(Section::Answer), 0);

        let cache = pending_cache(&signer, &www, a, expired);
        let mut view = View::new(Class::IN);
        view.options.accept_expired = true;
        view.cache = Some(cache.clone());
        let response = ask(&Arc::new(view), request("www.secure.test.", Type::A, false)).await;
        assert!(has(&response, Section::Answer, "www.secure.test.", Type::A));
        let (stored, _) = cache.find_rrset(&www, None, Type::A, unix_time()).unwrap();
        assert_eq!(stored.trust, Trust::Secure);
    }
}
