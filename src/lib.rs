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

//! `nsquery` is the query-answering core of a DNS nameserver.
//!
//! Given a parsed question, the [`query`] module decides which
//! authoritative zone or cache database to search, interprets what the
//! search found (answers, referrals, negative results and aliases),
//! chains through CNAME and DNAME records, hands off to a recursive
//! [resolver](resolver::Resolver) when the local data cannot answer, and
//! assembles the answer, authority and additional sections of the
//! [response](message::Response), including DNSSEC proofs.
//!
//! The collaborators the engine depends on are implemented here as
//! well: [zone and cache databases](db), [views](view) with their zone
//! tables and policies, [address-match lists](acl),
//! [DNSSEC signature verification](dnssec), the
//! [recursion quota](quota) and [counters](stats).

pub mod acl;
pub mod class;
pub mod db;
pub mod dnssec;
pub mod message;
pub mod name;
pub mod query;
pub mod quota;
pub mod resolver;
pub mod rr;
pub mod server;
pub mod stats;
mod util;
pub mod view;

pub use util::unix_time;
