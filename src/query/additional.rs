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

//! Additional section processing.
//!
//! Records such as NS, MX and SRV name hosts whose addresses the client
//! will probably want next, so we add what we know of those addresses
//! to the additional section ([RFC 1035 § 3.3]). Each name is looked up
//! in three places, in order of preference:
//!
//! 1. the authoritative zone for the name, if we have one;
//! 2. the cache, where glue and pending data must first be validated;
//! 3. while a referral is being built, the zone holding the delegation,
//!    which may have glue below the cut ([RFC 1034 § 4.3.2]).
//!
//! Results from the first and last sources depend only on the version
//! of a zone, so they are memoized in the view's
//! [`AdditionalCache`](crate::view::AdditionalCache).
//!
//! [RFC 1035 § 3.3]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.3
//! [RFC 1034 § 4.3.2]: https://datatracker.ietf.org/doc/html/rfc1034#section-4.3.2

use super::getdb::DbOptions;
use super::Context;
use crate::db::{FindOptions, Found, Lookup, Version};
use crate::message::Section;
use crate::name::Name;
use crate::rr::Type;
use crate::view::{AdditionalData, Source};

impl Context {
    /// Adds the data of type `qtype` owned by `name` to the additional
    /// section. [`Type::A`] means both A and AAAA.
    pub(super) fn add_additional(&mut self, name: &Name, qtype: Type) {
        if !self.attributes.want_dnssec && qtype.is_dnssec() {
            return;
        }
        let found = self
            .additional_from_auth(name, qtype)
            .or_else(|| self.additional_from_cache(name, qtype))
            .or_else(|| self.additional_from_glue(name, qtype));
        let Some(found) = found else {
            return;
        };

        for (mut rrset, sigs) in found {
            if self.response.is_duplicate(name, rrset.rr_type) {
                continue;
            }
            let rr_type = rrset.rr_type;
            self.view.rrset_order.apply(&mut rrset);
            let targets: Vec<Name> = if rr_type == Type::SRV {
                rrset
                    .rdatas()
                    .filter_map(|rdata| rdata.target_name(rr_type).ok())
                    .collect()
            } else {
                Vec::new()
            };
            self.response.add_rrset(Section::Additional, name, rrset);
            if let Some(sigs) = sigs.filter(|_| self.attributes.want_dnssec) {
                self.response.add_rrset(Section::Additional, name, sigs);
            }

            // SRV records found here (for a NAPTR) get their own
            // additional data. Their targets are addresses, so this goes
            // no deeper.
            for target in targets {
                self.add_additional(&target, Type::A);
            }
        }
    }

    /// Looks for authoritative data.
    fn additional_from_auth(&mut self, name: &Name, qtype: Type) -> Option<AdditionalData> {
        let options = DbOptions {
            no_log: true,
            ..Default::default()
        };
        let selected = self.getzonedb(name, qtype, options).ok()?;
        let version = selected.version?;
        self.memoized(name, qtype, Source::Auth, &version, |context| {
            let lookup = selected.db.find(
                name,
                Some(&version),
                lookup_type(qtype),
                context.find_options,
                context.now,
            );
            match lookup {
                Lookup::Success(found) => extract(found, qtype),
                _ => None,
            }
        })
    }

    /// Looks for data in the cache. Pending data and glue are only used
    /// if they can be validated.
    fn additional_from_cache(&mut self, name: &Name, qtype: Type) -> Option<AdditionalData> {
        let options = DbOptions {
            no_log: true,
            ..Default::default()
        };
        let db = self.getcachedb(name, qtype, options).ok()?.db;
        let find_options = FindOptions {
            glue_ok: true,
            ..self.find_options
        };
        let found = match db.find(name, None, lookup_type(qtype), find_options, self.now) {
            Lookup::Success(found) | Lookup::Glue(found) => extract(found, qtype)?,
            _ => return None,
        };
        let validated: AdditionalData = found
            .into_iter()
            .filter_map(|(mut rrset, mut sigs)| {
                if rrset.trust.is_pending() || rrset.trust.is_glue() {
                    self.validate(&db, name, &mut rrset, sigs.as_mut())
                        .then_some((rrset, sigs))
                } else {
                    Some((rrset, sigs))
                }
            })
            .collect();
        (!validated.is_empty()).then_some(validated)
    }

    /// Looks for glue in the zone a referral is being built from.
    fn additional_from_glue(&mut self, name: &Name, qtype: Type) -> Option<AdditionalData> {
        let gluedb = self.gluedb.clone()?;
        if !name.eq_or_subdomain_of(gluedb.origin()) {
            return None;
        }
        let version = self.versions.get(gluedb.id()).cloned();
        let search = |context: &mut Self| {
            let find_options = FindOptions {
                glue_ok: true,
                ..context.find_options
            };
            let lookup = gluedb.find(
                name,
                version.as_ref(),
                lookup_type(qtype),
                find_options,
                context.now,
            );
            match lookup {
                Lookup::Success(found) | Lookup::Glue(found) | Lookup::ZoneCut(found) => {
                    extract(found, qtype)
                }
                _ => None,
            }
        };
        match version.clone() {
            Some(version) => self.memoized(name, qtype, Source::Glue, &version, search),
            None => search(self),
        }
    }

    /// Returns the memoized result of `search` if there is one for
    /// `version`, and otherwise runs it and memoizes the result.
    fn memoized<F>(
        &mut self,
        name: &Name,
        qtype: Type,
        source: Source,
        version: &Version,
        search: F,
    ) -> Option<AdditionalData>
    where
        F: FnOnce(&mut Self) -> Option<AdditionalData>,
    {
        if !self.view.options.acache {
            return search(self);
        }
        if let Some(found) = self.view.acache.get(name, qtype, source, version) {
            return found;
        }
        let found = search(self);
        self.view
            .acache
            .insert(name, qtype, source, version, found.clone());
        found
    }
}

/// Returns the type to search for when `qtype` is wanted. Addresses are
/// looked for with an ANY search, so that a name with only AAAA records
/// is still found.
fn lookup_type(qtype: Type) -> Type {
    if qtype == Type::A {
        Type::ANY
    } else {
        qtype
    }
}

/// Picks the RRsets for `qtype` out of the result of a search made with
/// [`lookup_type`].
fn extract(found: Found, qtype: Type) -> Option<AdditionalData> {
    let data: AdditionalData = if qtype == Type::A {
        [Type::A, Type::AAAA]
            .into_iter()
            .filter_map(|rr_type| {
                let rrset = found.all.iter().find(|r| r.matches(rr_type, None))?;
                let sigs = found
                    .all
                    .iter()
                    .find(|r| r.matches(Type::RRSIG, Some(rr_type)))
                    .cloned();
                Some((rrset.clone(), sigs))
            })
            .collect()
    } else {
        found.rrset.map(|rrset| (rrset, found.sigs)).into_iter().collect()
    };
    (!data.is_empty()).then_some(data)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::db::Database;
    use crate::dnssec::testing::Signer;
    use crate::message::Section;
    use crate::query::testing::*;
    use crate::rr::{Trust, Type};
    use crate::util::unix_time;

    #[tokio::test]
    async fn additional_data_for_mx() {
        let view = Arc::new(view_with_zones(vec![zone_db("example.test.", EXAMPLE)]));
        let response = ask(&view, request("mail.example.test.", Type::MX, false)).await;
        assert!(has(&response, Section::Answer, "mail.example.test.", Type::MX));
        assert!(has(&response, Section::Additional, "host.example.test.", Type::A));
    }

    #[tokio::test]
    async fn additional_cache_is_used() {
        let view = Arc::new(view_with_zones(vec![zone_db("example.test.", EXAMPLE)]));
        ask(&view, request("mail.example.test.", Type::MX, false)).await;
        let hits = view.acache.hits();
        let response = ask(&view, request("mail.example.test.", Type::MX, false)).await;
        assert!(view.acache.hits() > hits);
        assert!(has(&response, Section::Additional, "host.example.test.", Type::A));
    }

    #[tokio::test]
    async fn cached_glue_must_validate() {
        let (apex, ns) = rrset("remote.test.", Type::NS, 3600, "ns.remote.test.");
        let (host, glue) = rrset("ns.remote.test.", Type::A, 3600, "192.0.2.53");
        let unsigned = cache_with(vec![
            (apex.clone(), ns.clone().with_trust(Trust::AuthAuthority)),
            (host.clone(), glue.clone().with_trust(Trust::Glue)),
        ]);
        let response = ask(&cache_view(unsigned), request("www.remote.test.", Type::A, false)).await;
        assert!(has(&response, Section::Authority, "remote.test.", Type::NS));
        assert_eq!(response.count(Section::Additional), 0);

        // Glue with a good signature is validated and then used.
        let signer = Signer::new("remote.test.");
        let sigs = signer.sign(&host, &glue);
        let signed = cache_with(vec![
            (apex.clone(), signer.dnskey_rrset(3600).with_trust(Trust::Secure)),
            (apex, ns.with_trust(Trust::AuthAuthority)),
            (host.clone(), glue.with_trust(Trust::Glue)),
            (host.clone(), sigs.with_trust(Trust::Glue)),
        ]);
        let response = ask(&cache_view(signed.clone()), request("www.remote.test.", Type::A, false)).await;
        assert!(has(&response, Section::Additional, "ns.remote.test.", Type::A));
        let (stored, _) = signed.find_rrset(&host, None, Type::A, unix_time()).unwrap();
        assert_eq!(stored.trust, Trust::Secure);
    }
}
