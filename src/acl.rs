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

//! Address-match lists.
//!
//! An [`Acl`] is an ordered list of [`Element`]s. Elements are tried in
//! order, and the first one that matches an address decides whether the
//! address is allowed: a plain element allows it, while a negated
//! element (written with a leading `!`) denies it. Addresses that match
//! no element are denied.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

////////////////////////////////////////////////////////////////////////
// ELEMENTS                                                           //
////////////////////////////////////////////////////////////////////////

/// An element of an address-match list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Element {
    /// Matches every address.
    Any,

    /// Matches no address.
    None,

    /// Matches a single address.
    Address(IpAddr),

    /// Matches every address within a prefix.
    Prefix(IpNet),

    /// Matches whatever the inner element matches, but with the
    /// opposite verdict.
    Negated(Box<Element>),
}

impl Element {
    /// Returns `Some(allowed)` if this element matches `addr`.
    fn check(&self, addr: IpAddr) -> Option<bool> {
        match self {
            Self::Any => Some(true),
            Self::None => None,
            Self::Address(a) => (canonical(*a) == canonical(addr)).then_some(true),
            Self::Prefix(net) => net.contains(&canonical(addr)).then_some(true),
            Self::Negated(inner) => inner.check(addr).map(|allowed| !allowed),
        }
    }
}

/// Maps IPv4-mapped IPv6 addresses to IPv4, so that `10.0.0.0/8` also
/// matches `::ffff:10.0.0.1` (as seen on dual-stack sockets).
fn canonical(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => addr,
        },
        v4 => v4,
    }
}

impl FromStr for Element {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if let Some(rest) = text.strip_prefix('!') {
            return Ok(Self::Negated(Box::new(rest.parse()?)));
        }
        match text {
            "" => Err(Error::Empty),
            "any" => Ok(Self::Any),
            "none" => Ok(Self::None),
            _ if text.contains('/') => text
                .parse()
                .map(Self::Prefix)
                .or_else(|_| Err(Error::InvalidElement(text.into()))),
            _ => text
                .parse()
                .map(Self::Address)
                .or_else(|_| Err(Error::InvalidElement(text.into()))),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::None => f.write_str("none"),
            Self::Address(addr) => addr.fmt(f),
            Self::Prefix(net) => net.fmt(f),
            Self::Negated(inner) => write!(f, "!{inner}"),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ADDRESS-MATCH LISTS                                                //
////////////////////////////////////////////////////////////////////////

/// An address-match list.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Acl {
    elements: Vec<Element>,
}

impl Acl {
    /// An ACL that allows every address.
    pub fn any() -> Self {
        Self {
            elements: vec![Element::Any],
        }
    }

    /// An ACL that denies every address.
    pub fn none() -> Self {
        Self {
            elements: vec![Element::None],
        }
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Returns the index of the first element matching `addr`, along
    /// with whether that element allows it.
    pub fn first_match(&self, addr: IpAddr) -> Option<(usize, bool)> {
        self.elements
            .iter()
            .enumerate()
            .find_map(|(i, element)| element.check(addr).map(|allowed| (i, allowed)))
    }

    /// Returns whether `addr` is allowed by this ACL.
    pub fn allows(&self, addr: IpAddr) -> bool {
        matches!(self.first_match(addr), Some((_, true)))
    }
}

impl FromIterator<Element> for Acl {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}

/// Parses a list of elements separated by semicolons or commas, for
/// example `"!192.0.2.1; 192.0.2.0/24; 10.0.0.0/8"`.
impl FromStr for Acl {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        text.split(|c| c == ';' || c == ',')
            .filter(|element| !element.trim().is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            element.fmt(f)?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that an address-match list could not be parsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    Empty,
    InvalidElement(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty address-match list element"),
            Self::InvalidElement(text) => {
                write!(f, "invalid address-match list element: {text}")
            }
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(text: &str) -> IpAddr {
        text.parse().unwrap()
    }

    #[test]
    fn first_match_decides() {
        let acl: Acl = "!192.0.2.1; 192.0.2.0/24".parse().unwrap();
        assert!(!acl.allows(addr("192.0.2.1")));
        assert!(acl.allows(addr("192.0.2.2")));
        assert!(!acl.allows(addr("198.51.100.1")));
        assert_eq!(acl.first_match(addr("192.0.2.9")), Some((1, true)));
    }

    #[test]
    fn any_and_none() {
        assert!(Acl::any().allows(addr("2001:db8::1")));
        assert!(!Acl::none().allows(addr("2001:db8::1")));
        assert!(!Acl::default().allows(addr("127.0.0.1")));
        let acl: Acl = "!any".parse().unwrap();
        assert_eq!(acl.first_match(addr("127.0.0.1")), Some((0, false)));
    }

    #[test]
    fn mapped_addresses_match_ipv4_elements() {
        let acl: Acl = "10.0.0.0/8".parse().unwrap();
        assert!(acl.allows(addr("::ffff:10.1.2.3")));
    }

    #[test]
    fn bad_elements_are_rejected() {
        assert_eq!(
            "10.0.0.0/33".parse::<Acl>(),
            Err(Error::InvalidElement("10.0.0.0/33".into()))
        );
        assert_eq!("!".parse::<Element>(), Err(Error::Empty));
        assert_eq!("any; none".parse::<Acl>().unwrap().to_string(), "any; none");
    }
}
