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

//! The recursive-clients quota.
//!
//! A [`Quota`] bounds the number of queries that may be recursing at
//! once. It has a hard limit, beyond which attaching fails, and an
//! optional soft limit, beyond which attaching succeeds but the caller
//! is expected to shed load (by evicting the oldest recursing query).
//! A limit of zero means "unlimited".

use std::sync::{Arc, Mutex};

/// A counting quota with soft and hard limits.
#[derive(Debug)]
pub struct Quota {
    max: usize,
    soft: usize,
    used: Mutex<usize>,
}

/// The result of [`Quota::attach`].
#[derive(Debug)]
pub enum Attach {
    /// The quota was attached and is below its soft limit.
    Ok(QuotaGuard),

    /// The quota was attached, but the soft limit has been reached.
    SoftLimit(QuotaGuard),

    /// The hard limit has been reached; the quota was not attached.
    HardLimit,
}

impl Quota {
    pub fn new(max: usize, soft: usize) -> Self {
        Self {
            max,
            soft,
            used: Mutex::new(0),
        }
    }

    /// Returns the number of attached guards.
    pub fn used(&self) -> usize {
        *self.lock()
    }

    /// Attempts to take one unit of the quota.
    pub fn attach(self: &Arc<Self>) -> Attach {
        let mut used = self.lock();
        if self.max != 0 && *used >= self.max {
            return Attach::HardLimit;
        }
        let soft_limited = self.soft != 0 && *used >= self.soft;
        *used += 1;
        let guard = QuotaGuard {
            quota: self.clone(),
        };
        if soft_limited {
            Attach::SoftLimit(guard)
        } else {
            Attach::Ok(guard)
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<usize> {
        // The counter is always consistent, so a poisoned lock is safe
        // to reuse.
        self.used.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One attached unit of a [`Quota`], released when dropped.
#[derive(Debug)]
pub struct QuotaGuard {
    quota: Arc<Quota>,
}

impl Drop for QuotaGuard {
    fn drop(&mut self) {
        let mut used = self.quota.lock();
        *used = used.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_then_hard_limit() {
        let quota = Arc::new(Quota::new(3, 2));
        let first = quota.attach();
        let second = quota.attach();
        assert!(matches!(first, Attach::Ok(_)));
        assert!(matches!(second, Attach::Ok(_)));
        let third = quota.attach();
        assert!(matches!(third, Attach::SoftLimit(_)));
        assert!(matches!(quota.attach(), Attach::HardLimit));
        assert_eq!(quota.used(), 3);
        drop(third);
        assert_eq!(quota.used(), 2);
        assert!(matches!(quota.attach(), Attach::SoftLimit(_)));
        assert_eq!(quota.used(), 2);
    }

    #[test]
    fn zero_means_unlimited() {
        let quota = Arc::new(Quota::new(0, 0));
        let guards: Vec<_> = (0..100).map(|_| quota.attach()).collect();
        assert!(guards.iter().all(|g| matches!(g, Attach::Ok(_))));
    }
}
