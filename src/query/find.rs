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

//! The search itself: looking the query name up and acting on what
//! the database returns.

use std::sync::Arc;

use log::{debug, error};

use super::getdb::{DbError, DbOptions};
use super::{Context, QueryError, Step, MAX_RESTARTS};
use crate::class::Class;
use crate::db::{Database, FindOptions, Found, Lookup, Negative, NegativeCache, Version};
use crate::message::{Rcode, Section};
use crate::name::Name;
use crate::resolver::{FetchError, FetchResponse};
use crate::rr::{Rdata, Rrset, Trust, Ttl, Type};
use crate::view::Zone;

/// What one pass through the search found out about the response.
#[derive(Debug, Default)]
struct Outcome {
    /// The data came from an authoritative zone.
    authoritative: bool,

    /// The query name changed; the search starts over.
    want_restart: bool,

    /// Don't log ACL decisions on the restart.
    no_log: bool,
}

/// Where a pass goes after handling a lookup result.
enum Next {
    /// Search `Pass::db` again.
    Refind,
    AddAuthority,
    Cleanup,
}

/// The database being searched and what the search has picked up.
struct Pass {
    db: Arc<dyn Database>,
    version: Option<Version>,
    zone: Option<Arc<Zone>>,
    is_zone: bool,
    no_exact: bool,

    /// The type to look up: [`Type::ANY`] when signatures are queried,
    /// since they are gathered from the whole node.
    lookup_type: Type,

    /// A delegation found in a zone, kept while the cache is searched
    /// for a better one.
    zone_delegation: Option<(Arc<dyn Database>, Found)>,

    /// The name of an answer synthesized from a wildcard.
    wildcard: Option<Name>,
}

impl Pass {
    fn new(db: Arc<dyn Database>, version: Option<Version>, zone: Option<Arc<Zone>>, qtype: Type) -> Self {
        Self {
            db,
            version,
            is_zone: zone.is_some(),
            zone,
            no_exact: false,
            lookup_type: if qtype.is_signature() { Type::ANY } else { qtype },
            zone_delegation: None,
            wildcard: None,
        }
    }
}

impl Context {
    /// Runs the search until the response is complete or the resolver
    /// must be waited on. `event` is the result of a fetch, when the
    /// search resumes after recursion.
    pub(super) fn find(&mut self, mut event: Option<Result<FetchResponse, FetchError>>) -> Step {
        let mut no_log = false;
        loop {
            let mut outcome = Outcome::default();
            let result = match event.take() {
                Some(event) => self.resume_lookup(&mut outcome, event),
                None => self.restart_lookup(&mut outcome, no_log),
            };

            if self.restarts == 0 && !outcome.authoritative {
                self.response.aa = false;
            }
            if outcome.want_restart && self.restarts < MAX_RESTARTS {
                self.restarts += 1;
                no_log |= outcome.no_log;
                continue;
            }

            // With a partial answer in hand, a client that didn't ask
            // for recursion gets what we have.
            if let Err(error) = result {
                if !self.attributes.partial_answer || self.attributes.want_recursion {
                    return Step::Finished(self.fail(error));
                }
            }
            if self.attributes.recursing {
                if let Some(fetch) = self.recursion.as_mut().and_then(|r| r.fetch.take()) {
                    return Step::Recursing(fetch);
                }
            }
            return Step::Finished(Some(self.finish()));
        }
    }

    /// Starts the search for the current query name from the top:
    /// selects a database and looks the name up there.
    fn restart_lookup(&mut self, outcome: &mut Outcome, no_log: bool) -> Result<(), QueryError> {
        if self.view.options.check_names && !check_owner(&self.qname, self.qtype) {
            error!(
                target: "security",
                "{}: check-names failure {}/{}/{}",
                self.client, self.qname, self.qtype, self.view.class,
            );
            return Err(QueryError::Refused);
        }

        let qname = self.qname.clone();
        let mut options = DbOptions {
            no_exact: self.qtype.is_at_parent() && !qname.is_root(),
            no_log,
            ..Default::default()
        };
        let mut selected = self.getdb(&qname, self.qtype, options);

        // Without recursion, a DS query is answered from the child zone
        // if we are authoritative for it but not for the parent.
        if !matches!(selected, Ok(ref s) if s.is_zone)
            && !self.attributes.recursion_ok
            && options.no_exact
            && self.qtype == Type::DS
        {
            let partial = DbOptions {
                partial: true,
                ..Default::default()
            };
            if let Ok(child) = self.getzonedb(&qname, self.qtype, partial) {
                options.no_exact = false;
                selected = Ok(child);
            }
        }

        let selected = match selected {
            Ok(selected) => selected,
            Err(DbError::Refused) if self.attributes.partial_answer => return Ok(()),
            Err(DbError::Refused) => return Err(QueryError::Refused),
            Err(_) => return Err(QueryError::ServFail),
        };

        outcome.authoritative = selected.is_zone;
        if self.restarts == 0 {
            if selected.is_zone {
                self.authdb = Some(selected.db.clone());
                self.authzone = selected.zone.clone();
            }
            self.authdb_set = true;
        }

        let mut pass = Pass::new(selected.db, selected.version, selected.zone, self.qtype);
        pass.is_zone = selected.is_zone;
        pass.no_exact = options.no_exact;
        self.search(outcome, pass)
    }

    /// Picks the search up from the result of a fetch.
    fn resume_lookup(
        &mut self,
        outcome: &mut Outcome,
        event: Result<FetchResponse, FetchError>,
    ) -> Result<(), QueryError> {
        let event = event.map_err(|error| {
            debug!("{}: fetch failed: {}", self.client, error);
            QueryError::ServFail
        })?;
        debug!("{}: resuming at {}", self.client, event.found_name);
        let mut pass = Pass::new(event.db, None, None, self.qtype);
        match self.dispatch(outcome, &mut pass, event.lookup)? {
            Next::Refind => self.search(outcome, pass),
            Next::AddAuthority => {
                self.add_authority(outcome, &pass);
                Ok(())
            }
            Next::Cleanup => Ok(()),
        }
    }

    fn search(&mut self, outcome: &mut Outcome, mut pass: Pass) -> Result<(), QueryError> {
        loop {
            let lookup = self.db_find(&pass);
            match self.dispatch(outcome, &mut pass, lookup)? {
                Next::Refind => continue,
                Next::AddAuthority => {
                    self.add_authority(outcome, &pass);
                    return Ok(());
                }
                Next::Cleanup => return Ok(()),
            }
        }
    }

    /// Looks the query name up in the pass's database. Pending data that
    /// is found is validated on the spot; if it fails and unvalidated
    /// data may not be used, the lookup is repeated without pending data.
    fn db_find(&self, pass: &Pass) -> Lookup {
        let mut options = self.find_options;
        if !self.attributes.want_dnssec && self.view.options.dnssec_enable {
            // Pending data may still save a fetch for a client that
            // doesn't do DNSSEC.
            options.pending_ok = true;
        }
        loop {
            let mut lookup = pass.db.find(
                &self.qname,
                pass.version.as_ref(),
                pass.lookup_type,
                options,
                self.now,
            );
            let pending = match &mut lookup {
                Lookup::Success(found) => match found.rrset.as_mut() {
                    Some(rrset) if rrset.trust.is_pending() => {
                        let valid = self.validate(&pass.db, &found.name, rrset, found.sigs.as_mut());
                        Some((valid, rrset.trust))
                    }
                    _ => None,
                },
                _ => None,
            };
            match pending {
                Some((false, trust))
                    if options.pending_ok
                        && (trust != Trust::PendingAnswer || !self.find_options.pending_ok) =>
                {
                    options.pending_ok = false;
                }
                _ => return lookup,
            }
        }
    }

    fn dispatch(
        &mut self,
        outcome: &mut Outcome,
        pass: &mut Pass,
        lookup: Lookup,
    ) -> Result<Next, QueryError> {
        match lookup {
            Lookup::Success(found) => self.found_answer(outcome, pass, found),
            Lookup::Glue(found) | Lookup::ZoneCut(found) => {
                outcome.authoritative = false;
                self.found_answer(outcome, pass, found)
            }
            Lookup::NotFound => self.not_found(outcome, pass),
            Lookup::Delegation(found) => self.delegation(outcome, pass, found),
            Lookup::EmptyName(negative) | Lookup::NxRrset(negative) => {
                self.nxrrset(pass, negative)
            }
            Lookup::EmptyWild(negative) => self.nxdomain(pass, negative, Rcode::NoError),
            Lookup::NxDomain(negative) => self.nxdomain(pass, negative, Rcode::NxDomain),
            Lookup::NcacheNxDomain(negative) => self.ncache(outcome, negative, true),
            Lookup::NcacheNxRrset(negative) => self.ncache(outcome, negative, false),
            Lookup::Cname(found) => self.cname(outcome, pass, found),
            Lookup::Dname(found) => self.dname(outcome, pass, found),
        }
    }

    ////////////////////////////////////////////////////////////////////
    // POSITIVE ANSWERS                                               //
    ////////////////////////////////////////////////////////////////////

    fn found_answer(
        &mut self,
        outcome: &mut Outcome,
        pass: &mut Pass,
        found: Found,
    ) -> Result<Next, QueryError> {
        self.note_wildcard(pass, &found);

        if pass.lookup_type == Type::ANY {
            let mut matched = 0;
            for rrset in found.all {
                if self.qtype == Type::ANY || rrset.rr_type == self.qtype {
                    self.add_rrset(Section::Answer, &found.name, rrset, None);
                    matched += 1;
                }
            }
            if matched == 0 {
                if !self.qtype.is_signature() {
                    return Err(QueryError::ServFail);
                }
                if !pass.is_zone {
                    outcome.authoritative = false;
                    if self.attributes.recursion_ok {
                        self.recurse(None, None).map_err(|_| QueryError::ServFail)?;
                    }
                    return Ok(Next::AddAuthority);
                }
                // Signatures were asked of an unsigned zone.
                self.add_soa(&pass.db, pass.version.as_ref(), false)?;
            }
            return Ok(Next::AddAuthority);
        }

        let Some(rrset) = found.rrset else {
            return Err(QueryError::ServFail);
        };
        // BIND 8 priming queries need the additional section.
        if pass.is_zone && self.qtype == Type::NS && self.qname.is_root() {
            self.attributes.no_additional = false;
        }
        let noqname = rrset.noqname.clone().filter(|_| self.attributes.want_dnssec);
        self.add_rrset(Section::Answer, &found.name, rrset, found.sigs);
        if let Some(proof) = noqname {
            self.add_noqname_proof(&proof);
        }
        Ok(Next::AddAuthority)
    }

    fn cname(&mut self, outcome: &mut Outcome, pass: &mut Pass, found: Found) -> Result<Next, QueryError> {
        self.note_wildcard(pass, &found);
        let Some(rrset) = found.rrset else {
            return Ok(Next::Cleanup);
        };
        let target = rrset
            .first()
            .and_then(|rdata| rdata.target_name(Type::CNAME).ok());
        let noqname = rrset.noqname.clone().filter(|_| self.attributes.want_dnssec);
        self.add_rrset(Section::Answer, &found.name, rrset, found.sigs);
        if let Some(proof) = noqname {
            self.add_noqname_proof(&proof);
        }

        // If anything goes wrong from here on, the client still gets the
        // answer so far.
        self.attributes.partial_answer = true;

        let Some(target) = target else {
            return Ok(Next::Cleanup);
        };
        self.qname = target;
        outcome.want_restart = true;
        outcome.no_log |= !self.attributes.want_recursion;
        Ok(Next::AddAuthority)
    }

    /// Follows a DNAME as described in [RFC 6672 § 3.2]: the DNAME goes
    /// into the answer along with a CNAME synthesized from it, for the
    /// benefit of clients that don't understand DNAME, and the search
    /// restarts at the rewritten name.
    ///
    /// [RFC 6672 § 3.2]: https://datatracker.ietf.org/doc/html/rfc6672#section-3.2
    fn dname(&mut self, outcome: &mut Outcome, pass: &mut Pass, found: Found) -> Result<Next, QueryError> {
        self.note_wildcard(pass, &found);
        let Some(rrset) = found.rrset else {
            return Ok(Next::Cleanup);
        };
        let target = rrset
            .first()
            .and_then(|rdata| rdata.target_name(Type::DNAME).ok());
        let (class, trust) = (rrset.class, rrset.trust);
        self.add_rrset(Section::Answer, &found.name, rrset, found.sigs);
        self.attributes.partial_answer = true;

        let Some(target) = target else {
            return Ok(Next::Cleanup);
        };
        let keep = self.qname.len().saturating_sub(found.name.len());
        let Ok(new_qname) = self.qname.with_suffix(keep, &target) else {
            self.response.rcode = Rcode::YxDomain;
            return Ok(Next::Cleanup);
        };

        // The synthesized CNAME is not signed, and its TTL is zero so
        // that it is never cached apart from the DNAME.
        let mut cname = Rrset::new(Type::CNAME, class, Ttl::ZERO).with_trust(trust);
        cname.push_rdata(Rdata::from_name(&new_qname));
        let owner = self.qname.clone();
        self.add_rrset(Section::Answer, &owner, cname, None);

        self.qname = new_qname;
        outcome.want_restart = true;
        outcome.no_log |= !self.attributes.want_recursion;
        Ok(Next::AddAuthority)
    }

    /// Remembers a wildcard answer, whose proof that no closer match
    /// exists goes in the authority section.
    fn note_wildcard(&self, pass: &mut Pass, found: &Found) {
        if self.attributes.want_dnssec && found.wildcard {
            pass.wildcard = Some(found.name.clone());
        }
    }

    ////////////////////////////////////////////////////////////////////
    // REFERRALS AND RECURSION                                        //
    ////////////////////////////////////////////////////////////////////

    /// Handles the cache not even knowing the root servers: refer to
    /// (or recurse from) the root hints.
    fn not_found(&mut self, outcome: &mut Outcome, pass: &mut Pass) -> Result<Next, QueryError> {
        let root_ns = self.view.hints.clone().and_then(|hints| {
            match hints.find(&Name::root(), None, Type::NS, FindOptions::default(), self.now) {
                Lookup::Success(found) => Some((hints, found)),
                _ => None,
            }
        });
        let Some((hints, found)) = root_ns else {
            // There may still be forwarders.
            if self.attributes.recursion_ok {
                self.recurse(None, None)?;
                return Ok(Next::Cleanup);
            }
            return Err(QueryError::ServFail);
        };
        pass.db = hints;
        pass.version = None;
        pass.zone = None;
        pass.is_zone = false;
        self.delegation(outcome, pass, found)
    }

    fn delegation(&mut self, outcome: &mut Outcome, pass: &mut Pass, found: Found) -> Result<Next, QueryError> {
        outcome.authoritative = false;

        if pass.is_zone {
            if !self.attributes.recursion_ok && pass.no_exact && self.qtype == Type::DS {
                let qname = self.qname.clone();
                let partial = DbOptions {
                    partial: true,
                    ..Default::default()
                };
                if let Ok(child) = self.getzonedb(&qname, self.qtype, partial) {
                    pass.no_exact = false;
                    pass.db = child.db;
                    pass.version = child.version;
                    pass.zone = child.zone;
                    outcome.authoritative = true;
                    return Ok(Next::Refind);
                }
            }

            // A client that isn't recursing always gets the delegation
            // from our zone, whatever the cache holds.
            if !self.use_cache() || !self.attributes.recursion_ok {
                let Some(rrset) = found.rrset else {
                    return Ok(Next::Cleanup);
                };
                self.gluedb = Some(pass.db.clone());
                self.refer(&found.name, rrset, found.sigs);
                self.gluedb = None;
                if self.attributes.want_dnssec && pass.db.is_secure(pass.version.as_ref()) {
                    self.add_ds(&pass.db, pass.version.as_ref(), &found.name);
                }
                return Ok(Next::Cleanup);
            }

            let Some(cache) = self.view.cache_db() else {
                return Err(QueryError::ServFail);
            };
            pass.zone_delegation = Some((pass.db.clone(), found));
            pass.db = cache;
            pass.version = None;
            pass.zone = None;
            pass.is_zone = false;
            return Ok(Next::Refind);
        }

        // The zone's delegation wins unless the cache knows a deeper one.
        let (found, zone_db) = match pass.zone_delegation.take() {
            Some((zone_db, zone_found)) if !found.name.eq_or_subdomain_of(&zone_found.name) => {
                (zone_found, Some(zone_db))
            }
            Some((zone_db, _)) => (found, Some(zone_db)),
            None => (found, None),
        };

        if self.attributes.recursion_ok {
            if pass.lookup_type.is_at_parent() {
                self.recurse(None, None)?;
            } else {
                self.recurse(Some(found.name), found.rrset)?;
            }
            return Ok(Next::Cleanup);
        }

        let Some(rrset) = found.rrset else {
            return Ok(Next::Cleanup);
        };
        self.gluedb = zone_db;
        self.refer(&found.name, rrset, found.sigs);
        self.gluedb = None;
        if self.attributes.want_dnssec {
            self.add_ds(&pass.db, pass.version.as_ref(), &found.name);
        }
        Ok(Next::Cleanup)
    }

    /// Adds the NS RRset of a referral to the authority section.
    fn refer(&mut self, name: &Name, rrset: Rrset, sigs: Option<Rrset>) {
        self.attributes.referral = true;
        // Referrals need their glue.
        self.attributes.no_additional = false;
        self.add_rrset(Section::Authority, name, rrset, sigs);
    }

    ////////////////////////////////////////////////////////////////////
    // NEGATIVE ANSWERS                                               //
    ////////////////////////////////////////////////////////////////////

    fn nxrrset(&mut self, pass: &Pass, negative: Negative) -> Result<Next, QueryError> {
        self.add_soa(&pass.db, pass.version.as_ref(), false)?;
        if self.attributes.want_dnssec {
            if let Some(nsec) = negative.nsec {
                self.add_nxrrset_nsec(
                    &pass.db,
                    pass.version.as_ref(),
                    &negative.name,
                    negative.wildcard,
                    nsec,
                    negative.sigs,
                );
            }
        }
        Ok(Next::Cleanup)
    }

    /// Builds an NXDOMAIN response, or a NOERROR one when the name is an
    /// empty non-terminal created by a wildcard.
    fn nxdomain(&mut self, pass: &Pass, negative: Negative, rcode: Rcode) -> Result<Next, QueryError> {
        // A zero TTL on the SOA lets stub resolvers find the enclosing
        // zone of any name without caching the answer.
        let zero_ttl = self.qtype == Type::SOA
            && pass.zone.as_ref().map_or(false, |zone| zone.zero_no_soa_ttl);
        self.add_soa(&pass.db, pass.version.as_ref(), zero_ttl)?;

        if let Some(nsec) = negative.nsec.filter(|_| self.attributes.want_dnssec) {
            self.add_rrset(Section::Authority, &negative.name, nsec, negative.sigs);
            let qname = self.qname.clone();
            self.add_wildcard_proof(&pass.db, pass.version.as_ref(), &qname, false);
        }
        self.response.rcode = rcode;
        Ok(Next::Cleanup)
    }

    /// Copies a negative response from the cache. Its records go into
    /// the authority section as they are, with the remaining TTL.
    fn ncache(&mut self, outcome: &mut Outcome, negative: NegativeCache, nxdomain: bool) -> Result<Next, QueryError> {
        outcome.authoritative = false;
        if nxdomain {
            self.response.rcode = Rcode::NxDomain;
            if self.qtype == Type::PTR && self.view.class == Class::IN && negative.name.len() == 7 {
                self.warn_rfc1918(&negative);
            }
        }
        for (owner, mut rrset) in negative.records {
            if rrset.rr_type.is_dnssec() && !self.attributes.want_dnssec {
                continue;
            }
            rrset.ttl = negative.ttl;
            self.response.add_rrset(Section::Authority, &owner, rrset);
        }
        Ok(Next::Cleanup)
    }

    ////////////////////////////////////////////////////////////////////
    // AUTHORITY                                                      //
    ////////////////////////////////////////////////////////////////////

    fn add_authority(&mut self, outcome: &Outcome, pass: &Pass) {
        if !outcome.want_restart && !self.attributes.no_authority {
            if pass.is_zone {
                // The apex NS RRset may already be the answer.
                let in_answer = (self.qtype == Type::NS || self.qtype == Type::ANY)
                    && self.qname == *pass.db.origin();
                if !in_answer {
                    self.add_ns(&pass.db, pass.version.as_ref()).ok();
                }
            } else if self.qtype != Type::NS {
                self.add_best_ns();
            }
        }

        if let Some(ref wildcard) = pass.wildcard {
            if pass.db.is_secure(pass.version.as_ref()) {
                self.add_wildcard_proof(&pass.db, pass.version.as_ref(), wildcard, true);
            }
        }
    }
}

/// Checks that `name` is a valid owner for a record of type `qtype`:
/// addresses and mail exchangers must belong to host names as defined by
/// [RFC 952] and [RFC 1123 § 2.1]. A leading `*` label is allowed.
///
/// [RFC 952]: https://datatracker.ietf.org/doc/html/rfc952
/// [RFC 1123 § 2.1]: https://datatracker.ietf.org/doc/html/rfc1123#section-2.1
fn check_owner(name: &Name, qtype: Type) -> bool {
    if !matches!(qtype, Type::A | Type::AAAA | Type::MX) {
        return true;
    }
    name.labels().enumerate().all(|(i, label)| {
        label.is_null() || (i == 0 && label.is_asterisk()) || is_host_label(label.octets())
    })
}

fn is_host_label(octets: &[u8]) -> bool {
    match (octets.first(), octets.last()) {
        (Some(&first), Some(&last)) => {
            first != b'-'
                && last != b'-'
                && octets.iter().all(|&o| o.is_ascii_alphanumeric() || o == b'-')
        }
        _ => false,
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CacheDb, ZoneDb};
    use crate::dnssec::testing::Signer;
    use crate::query::testing::*;
    use crate::query::Client;
    use crate::rr::text::parse_records;
    use crate::server::Server;
    use crate::stats::Counter;
    use crate::util::unix_time;
    use crate::view::View;

    #[test]
    fn check_owner_works() {
        let check = |name: &str, qtype| check_owner(&name.parse().unwrap(), qtype);
        assert!(check("www.example.test.", Type::A));
        assert!(check("*.example.test.", Type::AAAA));
        assert!(check("x-1.example.test.", Type::MX));
        assert!(!check("under_score.example.test.", Type::A));
        assert!(!check("-lead.example.test.", Type::A));
        assert!(!check("trail-.example.test.", Type::MX));
        assert!(!check("www.*.example.test.", Type::A));
        assert!(check("under_score.example.test.", Type::TXT));
        assert!(check(".", Type::A));
    }

    #[tokio::test]
    async fn cname_is_followed_within_zone() {
        let view = Arc::new(view_with_zones(vec![zone_db("example.test.", EXAMPLE)]));
        let response = ask(&view, request("www.example.test.", Type::A, false)).await;
        assert_eq!(response.rcode, Rcode::NoError);
        assert!(response.aa);
        assert_eq!(
            types_in(&response, Section::Answer),
            vec![
                ("www.example.test.".to_owned(), Type::CNAME),
                ("host.example.test.".to_owned(), Type::A),
            ]
        );
        assert!(has(&response, Section::Authority, "example.test.", Type::NS));
        assert!(has(&response, Section::Additional, "ns.example.test.", Type::A));
    }

    #[tokio::test]
    async fn cname_chains_stop_after_max_restarts() {
        let mut text = String::from(
            "chain.test. 3600 IN SOA ns.chain.test. hostmaster.chain.test. 1 3600 900 604800 300\n",
        );
        for i in 0..20 {
            text.push_str(&format!("c{i}.chain.test. 3600 IN CNAME c{}.chain.test.\n", i + 1));
        }
        text.push_str("c20.chain.test. 3600 IN A 192.0.2.20\n");
        let view = Arc::new(view_with_zones(vec![zone_db("chain.test.", &text)]));
        let response = ask(&view, request("c0.chain.test.", Type::A, false)).await;
        assert_eq!(response.rcode, Rcode::NoError);
        assert_eq!(response.count(Section::Answer), MAX_RESTARTS + 1);
        assert!(has(&response, Section::Answer, "c16.chain.test.", Type::CNAME));
        assert!(!has(&response, Section::Answer, "c17.chain.test.", Type::CNAME));
    }

    #[tokio::test]
    async fn dname_synthesizes_cname() {
        let view = Arc::new(view_with_zones(vec![zone_db("example.test.", EXAMPLE)]));
        let response = ask(&view, request("www.dn.example.test.", Type::A, false)).await;
        assert_eq!(response.rcode, Rcode::NoError);
        assert!(has(&response, Section::Answer, "dn.example.test.", Type::DNAME));
        let cname = response
            .rrset(Section::Answer, &name("www.dn.example.test."), Type::CNAME)
            .unwrap();
        assert_eq!(cname.ttl, Ttl::ZERO);
        assert_eq!(
            cname.first().unwrap().target_name(Type::CNAME).unwrap(),
            name("www.example.other.")
        );
    }

    #[tokio::test]
    async fn dname_overflow_is_yxdomain() {
        let long = ["a", "b", "c"].map(|c| c.repeat(63)).join(".");
        let text = format!(
            "long.test. 3600 IN SOA ns.long.test. hostmaster.long.test. 1 3600 900 604800 300\n\
             dn.long.test. 3600 IN DNAME {long}.other.\n"
        );
        let view = Arc::new(view_with_zones(vec![zone_db("long.test.", &text)]));
        let qname = format!("{}.{}.dn.long.test.", "x".repeat(50), "y".repeat(50));
        let response = ask(&view, request(&qname, Type::A, false)).await;
        assert_eq!(response.rcode, Rcode::YxDomain);
        assert!(has(&response, Section::Answer, "dn.long.test.", Type::DNAME));
    }

    #[tokio::test]
    async fn referral_from_zone_includes_glue() {
        let server = Arc::new(Server::default());
        let view = Arc::new(view_with_zones(vec![zone_db("example.test.", EXAMPLE)]));
        let response = ask_from(&server, &view, Client::udp(peer()), request("www.sub.example.test.", Type::A, false))
            .await
            .unwrap();
        assert_eq!(response.rcode, Rcode::NoError);
        assert!(!response.aa);
        assert_eq!(response.count(Section::Answer), 0);
        assert!(has(&response, Section::Authority, "sub.example.test.", Type::NS));
        assert!(has(&response, Section::Additional, "ns1.sub.example.test.", Type::A));
        assert!(has(&response, Section::Additional, "ns2.sub.example.test.", Type::A));
        assert_eq!(server.stats.get(Counter::Referral), 1);
    }

    #[tokio::test]
    async fn ds_is_answered_from_parent() {
        let view = Arc::new(view_with_zones(vec![zone_db("example.test.", EXAMPLE)]));
        let response = ask(&view, request("sub.example.test.", Type::DS, false)).await;
        assert!(response.aa);
        assert!(has(&response, Section::Answer, "sub.example.test.", Type::DS));
    }

    #[tokio::test]
    async fn ds_query_falls_back_to_child_zone() {
        let child = "\
child.test. 3600 IN SOA ns.child.test. hostmaster.child.test. 1 3600 900 604800 300
child.test. 3600 IN NS ns.child.test.
";
        let view = Arc::new(view_with_zones(vec![zone_db("child.test.", child)]));
        let response = ask(&view, request("child.test.", Type::DS, false)).await;
        assert_eq!(response.rcode, Rcode::NoError);
        assert!(response.aa);
        assert!(has(&response, Section::Authority, "child.test.", Type::SOA));
    }

    #[tokio::test]
    async fn ds_query_prefers_parent_when_both_zones_are_served() {
        let child = "\
sub.example.test. 3600 IN SOA ns1.sub.example.test. hostmaster.sub.example.test. 1 3600 900 604800 300
sub.example.test. 3600 IN NS ns1.sub.example.test.
";
        let view = Arc::new(view_with_zones(vec![
            zone_db("example.test.", EXAMPLE),
            zone_db("sub.example.test.", child),
        ]));
        let response = ask(&view, request("sub.example.test.", Type::DS, false)).await;
        assert!(response.aa);
        assert!(has(&response, Section::Answer, "sub.example.test.", Type::DS));

        // Other types at the cut come from the child.
        let response = ask(&view, request("sub.example.test.", Type::SOA, false)).await;
        assert!(has(&response, Section::Answer, "sub.example.test.", Type::SOA));
    }

    #[tokio::test]
    async fn check_names_refuses_bad_hostnames() {
        let mut view = view_with_zones(vec![zone_db("example.test.", EXAMPLE)]);
        view.options.check_names = true;
        let view = Arc::new(view);
        let response = ask(&view, request("bad_name.example.test.", Type::A, false)).await;
        assert_eq!(response.rcode, Rcode::Refused);
    }

    #[tokio::test]
    async fn cached_answer_gets_best_ns() {
        let (www, a) = rrset("www.remote.test.", Type::A, 300, "203.0.113.5");
        let (apex, ns) = rrset("remote.test.", Type::NS, 3600, "ns.remote.test.");
        let cache = cache_with(vec![
            (www, a.with_trust(Trust::Answer)),
            (apex, ns.with_trust(Trust::AuthAuthority)),
        ]);
        let mut view = View::new(Class::IN);
        view.cache = Some(cache);
        let view = Arc::new(view);
        let response = ask(&view, request("www.remote.test.", Type::A, false)).await;
        assert_eq!(response.rcode, Rcode::NoError);
        assert!(!response.aa);
        assert!(has(&response, Section::Answer, "www.remote.test.", Type::A));
        assert!(has(&response, Section::Authority, "remote.test.", Type::NS));
    }

    #[tokio::test]
    async fn root_hints_give_referral() {
        let hints = "\
. 3600 IN NS a.root-servers.test.
a.root-servers.test. 3600 IN A 192.0.2.254
";
        let server = Arc::new(Server::default());
        let mut view = View::new(Class::IN);
        view.cache = Some(Arc::new(CacheDb::new(Class::IN)));
        let records = parse_records(hints, None).unwrap();
        view.hints = Some(Arc::new(ZoneDb::hints(Class::IN, records).unwrap()));
        let view = Arc::new(view);
        let response = ask_from(&server, &view, Client::udp(peer()), request("www.remote.test.", Type::A, false))
            .await
            .unwrap();
        assert_eq!(response.rcode, Rcode::NoError);
        assert!(has(&response, Section::Authority, ".", Type::NS));
        assert_eq!(server.stats.get(Counter::Referral), 1);
    }

    #[tokio::test]
    async fn any_query_returns_every_type() {
        let view = Arc::new(view_with_zones(vec![zone_db("example.test.", EXAMPLE)]));
        let response = ask(&view, request("example.test.", Type::ANY, false)).await;
        assert_eq!(response.rcode, Rcode::NoError);
        assert!(response.aa);
        assert!(has(&response, Section::Answer, "example.test.", Type::SOA));
        assert!(has(&response, Section::Answer, "example.test.", Type::NS));
        assert_eq!(response.count(Section::Answer), 2);

        // The NS RRset is already in the answer.
        assert!(!has(&response, Section::Authority, "example.test.", Type::NS));
    }

    #[tokio::test]
    async fn rrsig_query_in_unsigned_zone_is_nodata() {
        let view = Arc::new(view_with_zones(vec![zone_db("example.test.", EXAMPLE)]));
        let response = ask(&view, request("host.example.test.", Type::RRSIG, false)).await;
        assert_eq!(response.rcode, Rcode::NoError);
        assert!(response.aa);
        assert_eq!(response.count(Section::Answer), 0);
        assert!(has(&response, Section::Authority, "example.test.", Type::SOA));
    }

    #[tokio::test]
    async fn cached_nxrrset_is_replayed() {
        let signer = Signer::new("remote.test.");
        let (apex, soa) = rrset(
            "remote.test.",
            Type::SOA,
            3600,
            "ns.remote.test. hostmaster.remote.test. 1 3600 900 604800 300",
        );
        let (host, nsec) = rrset("host.remote.test.", Type::NSEC, 300, "z.remote.test. A NSEC RRSIG");
        let sigs = signer.sign(&host, &nsec);
        let cache = Arc::new(CacheDb::new(Class::IN));
        cache.add_negative(
            &host,
            Some(Type::MX),
            vec![
                (apex, soa.with_trust(Trust::AuthAuthority)),
                (host.clone(), nsec.with_trust(Trust::AuthAuthority)),
                (host.clone(), sigs.with_trust(Trust::AuthAuthority)),
            ],
            Ttl::from(300),
            unix_time(),
        );
        let mut view = View::new(Class::IN);
        view.cache = Some(cache);
        let view = Arc::new(view);

        let response = ask(&view, request("host.remote.test.", Type::MX, false)).await;
        assert_eq!(response.rcode, Rcode::NoError);
        assert!(!response.aa);
        assert_eq!(response.count(Section::Answer), 0);
        let soa = response
            .rrset(Section::Authority, &name("remote.test."), Type::SOA)
            .unwrap();
        assert!(soa.ttl <= Ttl::from(300));
        assert!(!has(&response, Section::Authority, "host.remote.test.", Type::NSEC));
        assert!(!has(&response, Section::Authority, "host.remote.test.", Type::RRSIG));

        let response = ask(&view, dnssec_request("host.remote.test.", Type::MX)).await;
        assert!(has(&response, Section::Authority, "host.remote.test.", Type::NSEC));
        assert!(has(&response, Section::Authority, "host.remote.test.", Type::RRSIG));
    }
}
