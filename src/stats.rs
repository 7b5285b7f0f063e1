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

//! Query statistics counters.
//!
//! The server keeps one set of [`Counters`], and each zone keeps its
//! own for the queries it answered. Counters are updated with relaxed
//! atomics and read through a [`Snapshot`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// The outcomes counted for each answered (or abandoned) query.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Counter {
    Success,
    Referral,
    NxRrset,
    NxDomain,
    Recursion,
    Failure,
    Duplicate,
    Dropped,
}

impl Counter {
    pub const ALL: [Counter; 8] = [
        Self::Success,
        Self::Referral,
        Self::NxRrset,
        Self::NxDomain,
        Self::Recursion,
        Self::Failure,
        Self::Duplicate,
        Self::Dropped,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Referral => "referral",
            Self::NxRrset => "nxrrset",
            Self::NxDomain => "nxdomain",
            Self::Recursion => "recursion",
            Self::Failure => "failure",
            Self::Duplicate => "duplicate",
            Self::Dropped => "dropped",
        })
    }
}

/// A table of query counters.
#[derive(Debug, Default)]
pub struct Counters {
    values: [AtomicU64; 8],
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, counter: Counter) {
        self.values[counter.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter.index()].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut values = [0; 8];
        for counter in Counter::ALL {
            values[counter.index()] = self.get(counter);
        }
        Snapshot { values }
    }
}

/// A point-in-time copy of [`Counters`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Snapshot {
    values: [u64; 8],
}

impl Snapshot {
    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter.index()]
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, counter) in Counter::ALL.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", counter, self.get(*counter))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_independently() {
        let counters = Counters::new();
        counters.increment(Counter::NxDomain);
        counters.increment(Counter::NxDomain);
        counters.increment(Counter::Dropped);
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.get(Counter::NxDomain), 2);
        assert_eq!(snapshot.get(Counter::Dropped), 1);
        assert_eq!(snapshot.get(Counter::Success), 0);
        assert!(snapshot.to_string().starts_with("success=0 referral=0"));
    }
}
