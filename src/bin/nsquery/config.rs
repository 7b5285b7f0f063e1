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

//! Implements the view configuration file.

use std::fmt::{self, Write};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use paste::paste;
use serde::{de, Deserialize};

use nsquery::acl::Acl;
use nsquery::class::Class;
use nsquery::name::Name;
use nsquery::rr::Trust;
use nsquery::view::{Options, RrsetOrder, SortEntry, SortList};

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the view configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let dir = match path.as_ref().parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let raw_config =
        fs::read_to_string(path.as_ref()).context("failed to read the configuration file")?;
    let mut config: Config =
        toml::from_str(&raw_config).context("failed to parse the configuration file")?;

    // Record file paths are interpreted relative to the configuration
    // file's directory.
    let paths = config
        .zones
        .iter_mut()
        .map(|zone| &mut zone.path)
        .chain(config.hints.iter_mut().map(|hints| &mut hints.path))
        .chain(config.cache.iter_mut().map(|cache| &mut cache.path));
    for path in paths.flatten() {
        if path.is_relative() {
            *path = dir.join(&*path);
        }
    }

    log_config_summary(&config);
    Ok(config)
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        return;
    }

    let mut message = format!(
        "Configuration loaded:\n\
         Class:             {}\n\
         Recursion:         {}\n\
         Recursive clients: {} (soft {})\n\
         Root hints:        {}\n\
         Cache preloads:    {}\n\
         Zones:             ",
        config.class.0,
        if config.options().recursion { "enabled" } else { "disabled" },
        config.recursive_clients,
        config.recursive_clients_soft,
        if config.hints.is_some() { "present" } else { "absent" },
        config.cache.len(),
    );
    if config.zones.is_empty() {
        message.push_str("none to load");
    } else {
        write!(message, "{} to load", config.zones.len()).unwrap();
        for zone_config in &config.zones {
            write!(message, "\n  {}", zone_config.name.0).unwrap();
        }
    }
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file, which describes one view.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_class")]
    pub class: ConfigClass,

    pub recursion: Option<bool>,
    pub dnssec_enable: Option<bool>,
    pub dnssec_validation: Option<bool>,
    pub dnssec_accept_expired: Option<bool>,
    pub additional_from_auth: Option<bool>,
    pub additional_from_cache: Option<bool>,
    pub minimal_responses: Option<bool>,
    pub auth_nxdomain: Option<bool>,
    pub check_names: Option<bool>,
    pub acache: Option<bool>,
    pub log_queries: Option<bool>,

    pub allow_query: Option<ConfigAcl>,
    pub allow_recursion: Option<ConfigAcl>,
    #[serde(default)]
    pub sortlist: Vec<SortlistConfig>,
    #[serde(default = "default_rrset_order")]
    pub rrset_order: ConfigRrsetOrder,

    #[serde(default = "default_recursive_clients")]
    pub recursive_clients: usize,
    #[serde(default = "default_recursive_clients_soft")]
    pub recursive_clients_soft: usize,

    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    pub hints: Option<RecordsConfig>,
    #[serde(default)]
    pub cache: Vec<CacheConfig>,
}

impl Config {
    /// Returns the view options, with the configured switches applied
    /// over the defaults.
    pub fn options(&self) -> Options {
        let defaults = Options::default();
        Options {
            recursion: self.recursion.unwrap_or(defaults.recursion),
            dnssec_enable: self.dnssec_enable.unwrap_or(defaults.dnssec_enable),
            dnssec_validation: self
                .dnssec_validation
                .unwrap_or(defaults.dnssec_validation),
            accept_expired: self.dnssec_accept_expired.unwrap_or(defaults.accept_expired),
            additional_from_auth: self
                .additional_from_auth
                .unwrap_or(defaults.additional_from_auth),
            additional_from_cache: self
                .additional_from_cache
                .unwrap_or(defaults.additional_from_cache),
            minimal_responses: self
                .minimal_responses
                .unwrap_or(defaults.minimal_responses),
            auth_nxdomain: self.auth_nxdomain.unwrap_or(defaults.auth_nxdomain),
            check_names: self.check_names.unwrap_or(defaults.check_names),
            acache: self.acache.unwrap_or(defaults.acache),
            log_queries: self.log_queries.unwrap_or(defaults.log_queries),
        }
    }

    /// Returns the configured sort list.
    pub fn sortlist(&self) -> SortList {
        SortList::new(
            self.sortlist
                .iter()
                .map(|entry| SortEntry {
                    client: entry.client.0.clone(),
                    prefer: entry.prefer.as_ref().map(|prefer| prefer.0.clone()),
                })
                .collect(),
        )
    }
}

fn default_class() -> ConfigClass {
    ConfigClass(Class::IN)
}

fn default_rrset_order() -> ConfigRrsetOrder {
    ConfigRrsetOrder(RrsetOrder::Fixed)
}

fn default_recursive_clients() -> usize {
    1000
}

fn default_recursive_clients_soft() -> usize {
    900
}

/// One entry of the sort list: clients matching `client` get addresses
/// matching `prefer` (or `client` itself, if absent) first.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortlistConfig {
    pub client: ConfigAcl,
    pub prefer: Option<ConfigAcl>,
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: RECORDS                                     //
////////////////////////////////////////////////////////////////////////

/// Returns the text of a set of records given inline, in a file, or
/// both: the inline records come first.
fn records_text(records: Option<&str>, path: Option<&Path>) -> Result<String> {
    let mut text = records.unwrap_or_default().to_owned();
    if let Some(path) = path {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        text.push('\n');
        text.push_str(&contents);
    }
    Ok(text)
}

/// Records given inline, in a file, or both.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordsConfig {
    pub records: Option<String>,
    pub path: Option<PathBuf>,
}

impl RecordsConfig {
    pub fn text(&self) -> Result<String> {
        records_text(self.records.as_deref(), self.path.as_deref())
    }
}

/// The configuration of a single zone.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneConfig {
    pub name: ConfigName,
    pub records: Option<String>,
    pub path: Option<PathBuf>,
    pub allow_query: Option<ConfigAcl>,
    #[serde(default)]
    pub zero_no_soa_ttl: bool,
}

impl ZoneConfig {
    pub fn text(&self) -> Result<String> {
        records_text(self.records.as_deref(), self.path.as_deref())
    }
}

/// Records to preload into the cache at the given trust level.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "default_trust")]
    pub trust: ConfigTrust,
    pub records: Option<String>,
    pub path: Option<PathBuf>,
}

impl CacheConfig {
    pub fn text(&self) -> Result<String> {
        records_text(self.records.as_deref(), self.path.as_deref())
    }
}

/// A deserializable wrapper over the [`nsquery::rr::Trust`] type.
#[derive(Clone, Copy, Debug, Deserialize)]
pub enum ConfigTrust {
    #[serde(rename = "pending-additional")]
    PendingAdditional,
    #[serde(rename = "pending-answer")]
    PendingAnswer,
    #[serde(rename = "additional")]
    Additional,
    #[serde(rename = "glue")]
    Glue,
    #[serde(rename = "answer")]
    Answer,
    #[serde(rename = "authauthority")]
    AuthAuthority,
    #[serde(rename = "authanswer")]
    AuthAnswer,
    #[serde(rename = "secure")]
    Secure,
}

fn default_trust() -> ConfigTrust {
    ConfigTrust::Answer
}

impl From<ConfigTrust> for Trust {
    fn from(config_trust: ConfigTrust) -> Self {
        match config_trust {
            ConfigTrust::PendingAdditional => Self::PendingAdditional,
            ConfigTrust::PendingAnswer => Self::PendingAnswer,
            ConfigTrust::Additional => Self::Additional,
            ConfigTrust::Glue => Self::Glue,
            ConfigTrust::Answer => Self::Answer,
            ConfigTrust::AuthAuthority => Self::AuthAuthority,
            ConfigTrust::AuthAnswer => Self::AuthAnswer,
            ConfigTrust::Secure => Self::Secure,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER NSQUERY TYPES FOR SERDE                              //
////////////////////////////////////////////////////////////////////////

/// Generates a deserializable `ConfigX` structure wrapping an `X` type
/// from [`nsquery`], using its [`FromStr`](std::str::FromStr)
/// implementation.
macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $description:literal) => {
        /// A macro-generated deserializable wrapper over an [`nsquery`]
        /// type.
        #[derive(Clone, Debug)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value
                    .parse()
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigName, Name, "domain name");
make_serde_wrapper!(ConfigClass, Class, "DNS class");
make_serde_wrapper!(ConfigAcl, Acl, "address match list");
make_serde_wrapper!(ConfigRrsetOrder, RrsetOrder, "RRset order");

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
