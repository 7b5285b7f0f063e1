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

//! Implementation of the [`Question`] type.

use std::fmt;
use std::str::FromStr;

use crate::class::Class;
use crate::name::Name;
use crate::rr::Type;

/// The question of a DNS query.
///
/// Defined in [RFC 1035 § 4.1.2], a DNS question includes
///
/// * the QNAME, which is the domain name whose records are being
///   queried;
/// * the QTYPE, which specifies what types of records are desired; and
/// * the QCLASS, which specifies which DNS class(es) to search.
///
/// QTYPE values are a superset of data TYPEs, so [`Type`] (which also
/// defines the meta-types such as `ANY` and `AXFR`) serves for both. The
/// same holds for [`Class`].
///
/// [RFC 1035 § 4.1.2]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.2
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Question {
    pub qname: Name,
    pub qtype: Type,
    pub qclass: Class,
}

impl Question {
    pub fn new(qname: Name, qtype: Type, qclass: Class) -> Self {
        Self {
            qname,
            qtype,
            qclass,
        }
    }
}

/// Formats the question as `qname/qtype/qclass`, the form used in
/// server logs.
impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}/{}", self.qname, self.qtype, self.qclass)
    }
}

/// Parses a question from `qname [qtype [qclass]]`. The QTYPE defaults
/// to A and the QCLASS to IN, as with `dig`.
impl FromStr for Question {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut fields = text.split_ascii_whitespace();
        let qname = fields
            .next()
            .ok_or("question is empty")?
            .parse::<Name>()
            .or(Err("question name is invalid"))?;
        let qtype = fields.next().map_or(Ok(Type::A), str::parse)?;
        let qclass = fields.next().map_or(Ok(Class::IN), str::parse)?;
        if fields.next().is_some() {
            return Err("question has too many fields");
        }
        Ok(Self::new(qname, qtype, qclass))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_parses_with_defaults() {
        let question: Question = "www.example.test.".parse().unwrap();
        assert_eq!(question.qtype, Type::A);
        assert_eq!(question.qclass, Class::IN);
        let question: Question = "example.test. mx ch".parse().unwrap();
        assert_eq!(question.qtype, Type::MX);
        assert_eq!(question.qclass, Class::CH);
        assert!("example.test. A IN extra".parse::<Question>().is_err());
    }

    #[test]
    fn question_displays_for_logs() {
        let question = Question::new("example.test.".parse().unwrap(), Type::AAAA, Class::IN);
        assert_eq!(question.to_string(), "example.test./AAAA/IN");
    }
}
