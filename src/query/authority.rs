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

//! Building the authority section.
//!
//! Besides the SOA of negative answers and the NS RRset naming the
//! servers for the answer, DNSSEC clients get the NSEC records proving
//! what does not exist ([RFC 4035 § 3.1.3]) and the DS records of
//! secure delegations ([RFC 4035 § 3.1.4]).
//!
//! [RFC 4035 § 3.1.3]: https://datatracker.ietf.org/doc/html/rfc4035#section-3.1.3
//! [RFC 4035 § 3.1.4]: https://datatracker.ietf.org/doc/html/rfc4035#section-3.1.4

use std::sync::Arc;

use super::getdb::DbOptions;
use super::{Context, QueryError};
use crate::db::{Database, FindOptions, Found, Lookup, Version};
use crate::message::Section;
use crate::name::{Label, Name};
use crate::rr::rdata::{Nsec, Rrsig, Soa};
use crate::rr::{NoQnameProof, Rrset, Ttl, Type};

impl Context {
    /// Adds the SOA RRset of the zone in `db` to the authority section.
    /// As [RFC 2308 § 3] requires, its TTL is no more than the SOA
    /// MINIMUM field; with `zero_ttl` it is zero.
    ///
    /// [RFC 2308 § 3]: https://datatracker.ietf.org/doc/html/rfc2308#section-3
    pub(super) fn add_soa(
        &mut self,
        db: &Arc<dyn Database>,
        version: Option<&Version>,
        zero_ttl: bool,
    ) -> Result<(), QueryError> {
        let origin = db.origin().clone();
        let (mut soa, sigs) = db
            .find_rrset(&origin, version, Type::SOA, self.now)
            .ok_or(QueryError::ServFail)?;
        let minimum = soa
            .first()
            .and_then(|rdata| Soa::parse(rdata).ok())
            .map(|soa| Ttl::from(soa.minimum))
            .ok_or(QueryError::ServFail)?;
        let cap = |ttl: Ttl| if zero_ttl { Ttl::ZERO } else { ttl.min(minimum) };
        soa.ttl = cap(soa.ttl);
        let sigs = sigs.map(|mut sigs| {
            sigs.ttl = cap(sigs.ttl);
            sigs
        });
        self.add_rrset(Section::Authority, &origin, soa, sigs);
        Ok(())
    }

    /// Adds the apex NS RRset of the zone in `db` to the authority
    /// section.
    pub(super) fn add_ns(
        &mut self,
        db: &Arc<dyn Database>,
        version: Option<&Version>,
    ) -> Result<(), QueryError> {
        let origin = db.origin().clone();
        let (ns, sigs) = db
            .find_rrset(&origin, version, Type::NS, self.now)
            .ok_or(QueryError::ServFail)?;
        self.add_rrset(Section::Authority, &origin, ns, sigs);
        Ok(())
    }

    /// Adds the best NS RRset we know for the query name to the
    /// authority section: the deepest zone cut found in the cache, unless
    /// a zone we are authoritative for has a deeper delegation.
    pub(super) fn add_best_ns(&mut self) {
        let qname = self.qname.clone();
        let Ok(mut selected) = self.getdb(&qname, Type::NS, DbOptions::default()) else {
            return;
        };

        let mut zone_cut: Option<Found> = None;
        if selected.is_zone {
            let lookup = selected.db.find(
                &qname,
                selected.version.as_ref(),
                Type::NS,
                self.find_options,
                self.now,
            );
            let Lookup::Delegation(found) = lookup else {
                return;
            };
            if !self.use_cache() {
                if let Some(rrset) = found.rrset {
                    let sigs = found.sigs.filter(|_| self.attributes.want_dnssec);
                    self.add_rrset(Section::Authority, &found.name, rrset, sigs);
                }
                return;
            }
            let Some(cache) = self.view.cache_db() else {
                return;
            };
            zone_cut = Some(found);
            selected.db = cache;
        }

        let found = match (selected.db.find_zonecut(&qname, self.now), zone_cut) {
            (Some(found), Some(zone_cut)) if !found.name.eq_or_subdomain_of(&zone_cut.name) => {
                zone_cut
            }
            (Some(found), _) => found,
            (None, Some(zone_cut)) => zone_cut,
            (None, None) => return,
        };

        let Some(mut rrset) = found.rrset else {
            return;
        };
        let mut sigs = found.sigs;
        let trust = rrset.trust;
        if (trust.is_pending() || trust.is_glue())
            && !self.validate(&selected.db, &found.name, &mut rrset, sigs.as_mut())
        {
            if trust.is_pending() && !self.find_options.pending_ok {
                return;
            }
            if trust.is_glue() && self.attributes.secure && self.attributes.want_dnssec {
                return;
            }
        }
        let sigs = sigs.filter(|_| self.attributes.want_dnssec);
        self.add_rrset(Section::Authority, &found.name, rrset, sigs);
    }

    /// After a referral to `name`, adds the DS RRset for the delegation,
    /// or else the NSEC proving there is none, to the authority section.
    /// Both must be signed.
    pub(super) fn add_ds(&mut self, db: &Arc<dyn Database>, version: Option<&Version>, name: &Name) {
        let found = db
            .find_rrset(name, version, Type::DS, self.now)
            .or_else(|| db.find_rrset(name, version, Type::NSEC, self.now));
        let Some((rrset, Some(sigs))) = found else {
            return;
        };

        // The NS RRset of the referral is already in place.
        let Some(entry) = self.response.first_entry_mut(Section::Authority) else {
            return;
        };
        if entry.rrsets.iter().any(|r| r.matches(Type::NS, None)) {
            entry.rrsets.push(rrset);
            entry.rrsets.push(sigs);
        }
    }

    /// Adds the NSEC records proving that `name` does not exist. Unless
    /// `positive` is set (the answer came from a wildcard and only the
    /// nonexistence of `name` itself needs proving), the NSEC proving
    /// that no wildcard could have matched is added as well.
    pub(super) fn add_wildcard_proof(
        &mut self,
        db: &Arc<dyn Database>,
        version: Option<&Version>,
        name: &Name,
        mut positive: bool,
    ) {
        let mut name = name.clone();
        loop {
            let options = FindOptions {
                no_wild: true,
                ..self.find_options
            };
            let Lookup::NxDomain(negative) = db.find(&name, version, Type::NSEC, options, self.now)
            else {
                return;
            };
            let Some(nsec) = negative.nsec else {
                return;
            };

            // The closest encloser is the longer of the suffixes the
            // name shares with the NSEC's owner and next name, and the
            // wildcard that could have matched sits directly below it.
            let wildcard = if positive {
                None
            } else {
                nsec.first()
                    .and_then(|rdata| Nsec::parse(rdata).ok())
                    .and_then(|parsed| {
                        let labels = name
                            .common_labels(&negative.name)
                            .max(name.common_labels(&parsed.next));
                        name.superdomain(name.len() - labels)
                    })
                    .and_then(|encloser| encloser.prepend(Label::asterisk()).ok())
            };

            self.add_rrset(Section::Authority, &negative.name, nsec, negative.sigs);
            match wildcard {
                Some(wildcard) if wildcard != name => {
                    positive = true;
                    name = wildcard;
                }
                _ => return,
            }
        }
    }

    /// Adds the NSEC proving that `name` has no data of the query type.
    /// For a name matched by a wildcard, the NSEC belongs to the
    /// wildcard, whose name is rebuilt from the labels field of the
    /// NSEC's signature; the proof that `name` itself does not exist is
    /// added too.
    pub(super) fn add_nxrrset_nsec(
        &mut self,
        db: &Arc<dyn Database>,
        version: Option<&Version>,
        name: &Name,
        wildcard: bool,
        nsec: Rrset,
        sigs: Option<Rrset>,
    ) {
        if !wildcard {
            self.add_rrset(Section::Authority, name, nsec, sigs);
            return;
        }
        let Some(sigs) = sigs else {
            return;
        };
        let Some(rrsig) = sigs.first().and_then(|rdata| Rrsig::parse(rdata).ok()) else {
            return;
        };
        let labels = rrsig.labels as usize + 1;
        if labels >= name.len() {
            return;
        }
        let qname = self.qname.clone();
        self.add_wildcard_proof(db, version, &qname, true);
        let Some(owner) = name
            .superdomain(name.len() - labels)
            .and_then(|encloser| encloser.prepend(Label::asterisk()).ok())
        else {
            return;
        };
        self.add_rrset(Section::Authority, &owner, nsec, Some(sigs));
    }

    /// Adds the NSEC proving that the name an RRset was synthesized for
    /// does not exist itself.
    pub(super) fn add_noqname_proof(&mut self, proof: &NoQnameProof) {
        self.add_rrset(
            Section::Authority,
            &proof.owner,
            proof.nsec.clone(),
            proof.sigs.clone(),
        );
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::class::Class;
    use crate::dnssec::testing::Signer;
    use crate::message::Rcode;
    use crate::query::testing::*;
    use crate::rr::Trust;
    use crate::util::unix_time;
    use crate::view::{View, Zone};

    #[tokio::test]
    async fn nxdomain_soa_ttl_is_capped_by_minimum() {
        let view = Arc::new(view_with_zones(vec![zone_db("example.test.", EXAMPLE)]));
        let response = ask(&view, request("nosuch.example.test.", Type::A, false)).await;
        assert_eq!(response.rcode, Rcode::NxDomain);
        assert!(response.aa);
        let soa = response
            .rrset(Section::Authority, &name("example.test."), Type::SOA)
            .unwrap();
        assert_eq!(soa.ttl, Ttl::from(3600));
        assert_eq!(response.count(Section::Answer), 0);
    }

    #[tokio::test]
    async fn soa_query_for_missing_name_can_get_zero_ttl() {
        let mut view = View::new(Class::IN);
        let mut zone = Zone::new(zone_db("example.test.", EXAMPLE));
        zone.zero_no_soa_ttl = true;
        view.zones.insert(zone);
        let view = Arc::new(view);
        let response = ask(&view, request("nosuch.example.test.", Type::SOA, false)).await;
        let soa = response
            .rrset(Section::Authority, &name("example.test."), Type::SOA)
            .unwrap();
        assert_eq!(soa.ttl, Ttl::ZERO);
    }

    #[tokio::test]
    async fn signed_nxdomain_proves_no_wildcard() {
        let signer = Signer::new("signed.test.");
        let view = Arc::new(view_with_zones(vec![signed_zone_db(&signer, SIGNED)]));
        let response = ask(&view, dnssec_request("nx.signed.test.", Type::A)).await;
        assert_eq!(response.rcode, Rcode::NxDomain);
        assert!(has(&response, Section::Authority, "signed.test.", Type::SOA));
        // The NSEC covering the name, and the one covering *.signed.test.
        assert!(has(&response, Section::Authority, "ns.signed.test.", Type::NSEC));
        assert!(has(&response, Section::Authority, "signed.test.", Type::NSEC));
    }

    #[tokio::test]
    async fn wildcard_answer_proves_no_closer_match() {
        let signer = Signer::new("signed.test.");
        let view = Arc::new(view_with_zones(vec![signed_zone_db(&signer, SIGNED)]));
        let response = ask(&view, dnssec_request("x.w.signed.test.", Type::A)).await;
        assert_eq!(response.rcode, Rcode::NoError);
        assert!(has(&response, Section::Answer, "x.w.signed.test.", Type::A));
        assert!(has(&response, Section::Authority, "*.w.signed.test.", Type::NSEC));
    }

    #[tokio::test]
    async fn wildcard_nodata_uses_wildcard_nsec() {
        let signer = Signer::new("signed.test.");
        let view = Arc::new(view_with_zones(vec![signed_zone_db(&signer, SIGNED)]));
        let response = ask(&view, dnssec_request("x.w.signed.test.", Type::MX)).await;
        assert_eq!(response.rcode, Rcode::NoError);
        assert_eq!(response.count(Section::Answer), 0);
        assert!(has(&response, Section::Authority, "*.w.signed.test.", Type::NSEC));
    }

    #[tokio::test]
    async fn best_ns_is_validated_for_any_client() {
        let signer = Signer::new("remote.test.");
        let (www, a) = rrset("www.remote.test.", Type::A, 300, "203.0.113.5");
        let (apex, ns) = rrset("remote.test.", Type::NS, 3600, "ns.remote.test.");
        let sigs = signer.sign(&apex, &ns);
        let cache = cache_with(vec![
            (www, a.with_trust(Trust::Answer)),
            (apex.clone(), signer.dnskey_rrset(3600).with_trust(Trust::Secure)),
            (apex.clone(), ns.with_trust(Trust::Glue)),
            (apex.clone(), sigs.with_trust(Trust::Glue)),
        ]);
        let response = ask(&cache_view(cache.clone()), request("www.remote.test.", Type::A, false)).await;
        assert!(has(&response, Section::Answer, "www.remote.test.", Type::A));
        assert!(has(&response, Section::Authority, "remote.test.", Type::NS));

        // The client did not ask for DNSSEC, but the NS RRset was
        // validated anyway.
        let (stored, _) = cache.find_rrset(&apex, None, Type::NS, unix_time()).unwrap();
        assert_eq!(stored.trust, Trust::Secure);
    }
}
