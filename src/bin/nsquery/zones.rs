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

//! Implements loading a view: its zones, root hints and cache.

use std::fmt::Write;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{debug, error};

use nsquery::db::{group_records, CacheDb, Database, ZoneDb};
use nsquery::name::Name;
use nsquery::rr::text::parse_records;
use nsquery::rr::Trust;
use nsquery::view::{RrsetOrdering, View, Zone};

use crate::config::{CacheConfig, Config, ZoneConfig};

/// Builds the view described by `config`. Zones that fail to load are
/// logged and left out; problems with the hints or the cache are fatal.
pub fn load(config: &Config, now: u64) -> Result<View> {
    let mut view = View::new(config.class.0);
    view.options = config.options();
    view.query_acl = config.allow_query.as_ref().map(|acl| acl.0.clone());
    view.recursion_acl = config.allow_recursion.as_ref().map(|acl| acl.0.clone());
    view.sortlist = config.sortlist();
    view.rrset_order = RrsetOrdering::new(config.rrset_order.0);

    let mut zones_failed = 0;
    for zone_config in &config.zones {
        debug!("Loading {}/{}.", zone_config.name.0, config.class.0);
        match load_zone(zone_config, &view) {
            Ok(zone) => {
                view.zones.insert(zone);
            }
            Err(e) => {
                let mut message = format!(
                    "Failed to load {}/{}:",
                    zone_config.name.0, config.class.0
                );
                for (i, cause) in e.chain().enumerate() {
                    write!(message, "\n[{}] {}", i + 1, cause).unwrap();
                }
                error!("{}", message);
                zones_failed += 1;
            }
        }
    }
    if zones_failed == 1 {
        error!("1 zone failed to load.");
    } else if zones_failed > 1 {
        error!("{} zones failed to load.", zones_failed);
    }

    if let Some(ref hints) = config.hints {
        let text = hints.text().context("failed to read the root hints")?;
        let records = parse_records(&text, Some(&Name::root()))
            .context("failed to parse the root hints")?;
        let db = ZoneDb::hints(view.class, records).context("failed to load the root hints")?;
        view.hints = Some(Arc::new(db));
    }

    let cache = Arc::new(CacheDb::new(view.class));
    for cache_config in &config.cache {
        preload_cache(&cache, cache_config, now).context("failed to preload the cache")?;
    }
    view.cache = Some(cache);
    Ok(view)
}

/// Loads a single zone.
fn load_zone(zone_config: &ZoneConfig, view: &View) -> Result<Zone> {
    let origin = zone_config.name.0.clone();
    let text = zone_config.text()?;
    let records = parse_records(&text, Some(&origin)).context("failed to parse the records")?;
    if let Some(record) = records.iter().find(|record| record.class != view.class) {
        return Err(anyhow!(
            "the record for {}/{} is not of class {}",
            record.owner,
            record.rr_type,
            view.class,
        ));
    }
    let db = ZoneDb::from_records(origin, view.class, records)
        .context("failed to build the zone")?;

    let mut zone = Zone::new(Arc::new(db));
    zone.query_acl = zone_config.allow_query.as_ref().map(|acl| acl.0.clone());
    zone.zero_no_soa_ttl = zone_config.zero_no_soa_ttl;
    Ok(zone)
}

/// Adds the records of `cache_config` to `cache`.
fn preload_cache(cache: &CacheDb, cache_config: &CacheConfig, now: u64) -> Result<()> {
    let trust = Trust::from(cache_config.trust);
    let text = cache_config.text()?;
    let records = parse_records(&text, None).context("failed to parse the records")?;
    for (owner, rrset) in group_records(records)? {
        cache
            .add_rrset(&owner, rrset.with_trust(trust), now)
            .with_context(|| format!("failed to add {}", owner))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(text: &str) -> Config {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn view_is_built_from_inline_records() {
        let config = config(
            r#"
check_names = true

[[zones]]
name = "example.test."
records = """
@ 3600 IN SOA ns hostmaster 1 3600 900 604800 300
@ 3600 IN NS ns
ns 3600 IN A 192.0.2.53
"""

[[cache]]
trust = "authauthority"
records = "remote.test. 3600 IN NS ns.remote.test."
"#,
        );
        let view = load(&config, 1_700_000_000).unwrap();
        assert!(view.options.check_names);
        assert_eq!(view.zones.len(), 1);
        let cache = view.cache.unwrap();
        let (ns, _) = cache
            .find_rrset(&"remote.test.".parse().unwrap(), None, nsquery::rr::Type::NS, 1_700_000_000)
            .unwrap();
        assert_eq!(ns.trust, Trust::AuthAuthority);
    }

    #[test]
    fn broken_zone_is_left_out() {
        let config = config(
            r#"
[[zones]]
name = "example.test."
records = "www 3600 IN A 192.0.2.1"
"#,
        );
        let view = load(&config, 1_700_000_000).unwrap();
        assert!(view.zones.is_empty());
    }
}
