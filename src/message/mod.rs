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

//! DNS message types used by the query engine.
//!
//! Wire-format parsing and rendering happen outside this crate; here a
//! query arrives as a [`Request`] and leaves as a [`Response`] holding
//! whole RRsets.

mod question;
mod rcode;
mod response;
pub use question::Question;
pub use rcode::{IntoRcodeError, Rcode};
pub use response::{Entry, FindName, Request, Response, Section};
