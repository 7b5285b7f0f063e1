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

//! Address sorting and RRset ordering.
//!
//! A [`SortList`] reorders the address records of a response according
//! to where the client is: each entry names a set of clients and a
//! preference list of address sets, and addresses are sorted by the
//! position of the first preference element they match. An
//! [`RrsetOrdering`] rotates or shuffles the records of every RRset
//! added to a response.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::SliceRandom;

use crate::acl::Acl;
use crate::rr::{Rrset, Type};

////////////////////////////////////////////////////////////////////////
// SORT LISTS                                                         //
////////////////////////////////////////////////////////////////////////

/// One entry of a [`SortList`].
#[derive(Clone, Debug)]
pub struct SortEntry {
    /// The clients this entry applies to.
    pub client: Acl,

    /// The preference list. When `None`, the addresses matching
    /// `client` itself are preferred (so clients see addresses on
    /// their own networks first).
    pub prefer: Option<Acl>,
}

/// A view's sort list.
#[derive(Clone, Debug, Default)]
pub struct SortList {
    pub entries: Vec<SortEntry>,
}

impl SortList {
    pub fn new(entries: Vec<SortEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the preference list that applies to `client`, if any.
    pub fn select(&self, client: IpAddr) -> Option<&Acl> {
        self.entries
            .iter()
            .find(|entry| entry.client.allows(client))
            .map(|entry| entry.prefer.as_ref().unwrap_or(&entry.client))
    }

    /// Sorts the A and AAAA records of `rrset` for a client whose
    /// preference list is `prefer`. Records of other types are left
    /// alone. The sort is stable, so addresses of equal preference keep
    /// their relative order.
    pub fn sort(prefer: &Acl, rrset: &mut Rrset) {
        if rrset.rr_type != Type::A && rrset.rr_type != Type::AAAA {
            return;
        }
        let mut keys: Vec<(usize, usize)> = rrset
            .rdatas()
            .enumerate()
            .map(|(i, rdata)| {
                let key = address(rdata.octets())
                    .and_then(|addr| prefer.first_match(addr))
                    .filter(|(_, allowed)| *allowed)
                    .map_or(usize::MAX, |(index, _)| index);
                (key, i)
            })
            .collect();
        keys.sort_by_key(|(key, _)| *key);
        let order: Vec<usize> = keys.into_iter().map(|(_, i)| i).collect();
        rrset.reorder(&order);
    }
}

/// Interprets A or AAAA RDATA as an address.
fn address(octets: &[u8]) -> Option<IpAddr> {
    if let Ok(v4) = <[u8; 4]>::try_from(octets) {
        Some(IpAddr::V4(Ipv4Addr::from(v4)))
    } else if let Ok(v6) = <[u8; 16]>::try_from(octets) {
        Some(IpAddr::V6(Ipv6Addr::from(v6)))
    } else {
        None
    }
}

////////////////////////////////////////////////////////////////////////
// RRSET ORDERING                                                     //
////////////////////////////////////////////////////////////////////////

/// The order in which the records of an RRset are returned.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RrsetOrder {
    /// The order in which the records are stored.
    #[default]
    Fixed,

    /// A random permutation for each response.
    Random,

    /// A rotation that advances with each response.
    Cyclic,
}

impl FromStr for RrsetOrder {
    type Err = InvalidRrsetOrderError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "fixed" => Ok(Self::Fixed),
            "random" => Ok(Self::Random),
            "cyclic" => Ok(Self::Cyclic),
            _ => Err(InvalidRrsetOrderError),
        }
    }
}

impl fmt::Display for RrsetOrder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Fixed => "fixed",
            Self::Random => "random",
            Self::Cyclic => "cyclic",
        })
    }
}

/// An error signaling that an RRset order is not one of `fixed`,
/// `random` or `cyclic`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InvalidRrsetOrderError;

impl fmt::Display for InvalidRrsetOrderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("RRset order must be fixed, random or cyclic")
    }
}

impl std::error::Error for InvalidRrsetOrderError {}

/// Applies an [`RrsetOrder`] to the RRsets of responses.
#[derive(Debug, Default)]
pub struct RrsetOrdering {
    order: RrsetOrder,
    next: AtomicUsize,
}

impl RrsetOrdering {
    pub fn new(order: RrsetOrder) -> Self {
        Self {
            order,
            next: AtomicUsize::new(0),
        }
    }

    pub fn order(&self) -> RrsetOrder {
        self.order
    }

    pub fn apply(&self, rrset: &mut Rrset) {
        let len = rrset.len();
        if len < 2 {
            return;
        }
        let mut order: Vec<usize> = (0..len).collect();
        match self.order {
            RrsetOrder::Fixed => return,
            RrsetOrder::Random => order.shuffle(&mut rand::thread_rng()),
            RrsetOrder::Cyclic => {
                let start = self.next.fetch_add(1, Ordering::Relaxed);
                order.rotate_left(start % len);
            }
        }
        rrset.reorder(&order);
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;
    use crate::rr::{Rdata, Ttl};

    fn a_rrset(addrs: &[[u8; 4]]) -> Rrset {
        let mut rrset = Rrset::new(Type::A, Class::IN, Ttl::from(300));
        for addr in addrs {
            rrset.push_rdata(Rdata::new(addr.to_vec()).unwrap());
        }
        rrset
    }

    fn firsts(rrset: &Rrset) -> Vec<u8> {
        rrset.rdatas().map(|r| r.octets()[0]).collect()
    }

    #[test]
    fn sort_by_preference() {
        let list = SortList::new(vec![SortEntry {
            client: "192.0.2.0/24".parse().unwrap(),
            prefer: Some("10.0.0.0/8; 172.16.0.0/12".parse().unwrap()),
        }]);
        assert!(list.select("198.51.100.1".parse().unwrap()).is_none());
        let prefer = list.select("192.0.2.7".parse().unwrap()).unwrap();

        let mut rrset = a_rrset(&[[8, 8, 8, 8], [172, 16, 0, 1], [10, 0, 0, 1], [9, 9, 9, 9]]);
        SortList::sort(prefer, &mut rrset);
        assert_eq!(firsts(&rrset), vec![10, 172, 8, 9]);
    }

    #[test]
    fn one_element_entry_prefers_client_networks() {
        let list = SortList::new(vec![SortEntry {
            client: "10.0.0.0/8".parse().unwrap(),
            prefer: None,
        }]);
        let prefer = list.select("10.1.2.3".parse().unwrap()).unwrap();
        let mut rrset = a_rrset(&[[192, 0, 2, 1], [10, 9, 9, 9]]);
        SortList::sort(prefer, &mut rrset);
        assert_eq!(firsts(&rrset), vec![10, 192]);
    }

    #[test]
    fn cyclic_order_rotates() {
        let ordering = RrsetOrdering::new(RrsetOrder::Cyclic);
        let mut first = a_rrset(&[[1, 0, 0, 0], [2, 0, 0, 0], [3, 0, 0, 0]]);
        ordering.apply(&mut first);
        let mut second = a_rrset(&[[1, 0, 0, 0], [2, 0, 0, 0], [3, 0, 0, 0]]);
        ordering.apply(&mut second);
        assert_eq!(firsts(&first), vec![1, 2, 3]);
        assert_eq!(firsts(&second), vec![2, 3, 1]);
    }

    #[test]
    fn random_order_is_a_permutation() {
        let ordering = RrsetOrdering::new(RrsetOrder::Random);
        let mut rrset = a_rrset(&[[1, 0, 0, 0], [2, 0, 0, 0], [3, 0, 0, 0]]);
        ordering.apply(&mut rrset);
        let mut seen = firsts(&rrset);
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn order_parses() {
        assert_eq!("cyclic".parse::<RrsetOrder>(), Ok(RrsetOrder::Cyclic));
        assert_eq!("sorted".parse::<RrsetOrder>(), Err(InvalidRrsetOrderError));
    }
}
