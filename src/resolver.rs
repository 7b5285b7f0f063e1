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

//! The interface to the recursive resolver.
//!
//! When neither the authoritative zones nor the cache can answer a
//! question and the client may recurse, the query engine asks a
//! [`Resolver`] to fetch the answer from other servers. The fetch runs
//! as a future; when it completes, the resolver has stored what it
//! learned in a database (normally the cache) and reports where the
//! answer is, and the engine resumes from that point.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use crate::db::{Database, Lookup};
use crate::name::Name;
use crate::rr::{Rrset, Type};

/// Options for a fetch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FetchOptions {
    /// Don't validate the answer (the client set CD, or validation is
    /// disabled).
    pub no_validate: bool,
}

/// A request to fetch `qname`/`qtype`.
#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub qname: Name,
    pub qtype: Type,

    /// The deepest known zone cut above `qname`, if one is known.
    pub qdomain: Option<Name>,

    /// The name servers for `qdomain`.
    pub nameservers: Option<Rrset>,

    /// The client's address, passed only for UDP clients.
    pub peer: Option<SocketAddr>,

    /// The ID of the client's query.
    pub id: u16,

    pub options: FetchOptions,
}

/// The outcome of a successful fetch: the database now holding the
/// answer, and the result of looking the answer up there.
#[derive(Clone, Debug)]
pub struct FetchResponse {
    pub db: Arc<dyn Database>,
    pub found_name: Name,
    pub lookup: Lookup,
}

/// Reasons a fetch could not be made or did not complete.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchError {
    /// An identical query from the same client is already being
    /// resolved.
    Duplicate,

    /// The resolver chose to drop the query.
    Drop,

    /// The fetch failed.
    Failure,

    /// The fetch was canceled before it completed.
    Canceled,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Duplicate => "duplicate query",
            Self::Drop => "query dropped",
            Self::Failure => "fetch failed",
            Self::Canceled => "fetch canceled",
        })
    }
}

impl std::error::Error for FetchError {}

/// A fetch in progress.
pub type Fetch = Pin<Box<dyn Future<Output = Result<FetchResponse, FetchError>> + Send>>;

/// Trait for recursive resolvers.
pub trait Resolver: fmt::Debug + Send + Sync {
    /// Starts a fetch. Errors returned here mean that no fetch was
    /// started at all.
    fn create_fetch(&self, request: FetchRequest) -> Result<Fetch, FetchError>;
}

/// A [`Resolver`] that cannot reach other servers, for views that only
/// answer from local data.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullResolver;

impl Resolver for NullResolver {
    fn create_fetch(&self, _request: FetchRequest) -> Result<Fetch, FetchError> {
        Err(FetchError::Failure)
    }
}
