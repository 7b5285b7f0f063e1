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

//! The [`Request`] and [`Response`] types.
//!
//! Responses are built up section by section while a query is answered.
//! Records are grouped by owner name and then by RRset, in the order
//! they were added, so that the rendered response keeps the order the
//! query engine chose (for instance a CNAME before its target's data).

use std::fmt;

use super::{Question, Rcode};
use crate::name::Name;
use crate::rr::{Rrset, Type};

////////////////////////////////////////////////////////////////////////
// REQUESTS                                                           //
////////////////////////////////////////////////////////////////////////

/// The parts of a parsed DNS query that matter for answering it.
#[derive(Clone, Debug)]
pub struct Request {
    pub id: u16,

    /// The RD (recursion desired) header bit.
    pub rd: bool,

    /// The CD (checking disabled) header bit.
    pub cd: bool,

    /// The DO (DNSSEC OK) bit of the EDNS OPT record.
    pub dnssec_ok: bool,

    pub questions: Vec<Question>,
}

impl Request {
    /// Creates a request with a single question and RD set.
    pub fn new(id: u16, question: Question) -> Self {
        Self {
            id,
            rd: true,
            cd: false,
            dnssec_ok: false,
            questions: vec![question],
        }
    }
}

////////////////////////////////////////////////////////////////////////
// SECTIONS                                                           //
////////////////////////////////////////////////////////////////////////

/// The resource record sections of a DNS message.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Section {
    Answer,
    Authority,
    Additional,
}

impl Section {
    pub const ALL: [Section; 3] = [Self::Answer, Self::Authority, Self::Additional];

    fn index(self) -> usize {
        match self {
            Self::Answer => 0,
            Self::Authority => 1,
            Self::Additional => 2,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Answer => "ANSWER",
            Self::Authority => "AUTHORITY",
            Self::Additional => "ADDITIONAL",
        })
    }
}

/// An owner name and the RRsets added for it to one section.
#[derive(Clone, Debug)]
pub struct Entry {
    pub name: Name,
    pub rrsets: Vec<Rrset>,
}

/// The result of [`Response::find_name`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FindName {
    /// The name is present with an RRset of the requested type.
    RrsetExists,

    /// The name is present, but without an RRset of the requested type.
    NameExists,

    /// The name is not present in the section.
    NoName,
}

////////////////////////////////////////////////////////////////////////
// RESPONSES                                                          //
////////////////////////////////////////////////////////////////////////

/// A DNS response under construction.
#[derive(Clone, Debug)]
pub struct Response {
    pub id: u16,
    pub rcode: Rcode,
    pub aa: bool,
    pub ad: bool,
    pub cd: bool,
    pub ra: bool,
    pub rd: bool,
    pub question: Option<Question>,
    sections: [Vec<Entry>; 3],
}

impl Response {
    /// Creates an empty NOERROR response to `question`.
    pub fn new(id: u16, question: Option<Question>) -> Self {
        Self {
            id,
            rcode: Rcode::NoError,
            aa: false,
            ad: false,
            cd: false,
            ra: false,
            rd: false,
            question,
            sections: Default::default(),
        }
    }

    /// Returns the entries of `section`, in order.
    pub fn entries(&self, section: Section) -> &[Entry] {
        &self.sections[section.index()]
    }

    /// Returns the first entry of `section`, if any.
    pub fn first_entry_mut(&mut self, section: Section) -> Option<&mut Entry> {
        self.sections[section.index()].first_mut()
    }

    /// Looks for `name` and an RRset of the given type (and covered
    /// type, for signatures) in `section`.
    pub fn find_name(
        &self,
        section: Section,
        name: &Name,
        rr_type: Type,
        covers: Option<Type>,
    ) -> FindName {
        match self.entry(section, name) {
            Some(entry) => {
                if entry.rrsets.iter().any(|r| r.matches(rr_type, covers)) {
                    FindName::RrsetExists
                } else {
                    FindName::NameExists
                }
            }
            None => FindName::NoName,
        }
    }

    /// Returns whether an RRset of `rr_type` owned by `name` is already
    /// present in any section.
    pub fn is_duplicate(&self, name: &Name, rr_type: Type) -> bool {
        Section::ALL
            .iter()
            .any(|&s| self.find_name(s, name, rr_type, None) == FindName::RrsetExists)
    }

    /// Returns the RRset of `rr_type` owned by `name` in `section`.
    pub fn rrset(&self, section: Section, name: &Name, rr_type: Type) -> Option<&Rrset> {
        self.entry(section, name)?
            .rrsets
            .iter()
            .find(|r| r.matches(rr_type, None))
    }

    /// Appends `rrset` to `section` under `name`. RRsets for a name
    /// already present are grouped with that name.
    pub fn add_rrset(&mut self, section: Section, name: &Name, rrset: Rrset) {
        let entries = &mut self.sections[section.index()];
        match entries.iter_mut().find(|e| e.name == *name) {
            Some(entry) => entry.rrsets.push(rrset),
            None => entries.push(Entry {
                name: name.clone(),
                rrsets: vec![rrset],
            }),
        }
    }

    /// Returns the number of records in `section`.
    pub fn count(&self, section: Section) -> usize {
        self.sections[section.index()]
            .iter()
            .flat_map(|e| e.rrsets.iter())
            .map(Rrset::len)
            .sum()
    }

    /// Moves the RRset of `rr_type` owned by `name` to the very front of
    /// `section`: its entry becomes the first, and the RRset the first
    /// in that entry. Returns whether the RRset was found.
    pub fn move_to_front(&mut self, section: Section, name: &Name, rr_type: Type) -> bool {
        let entries = &mut self.sections[section.index()];
        let Some(index) = entries.iter().position(|e| e.name == *name) else {
            return false;
        };
        let entry = &mut entries[index];
        let Some(rrset_index) = entry.rrsets.iter().position(|r| r.matches(rr_type, None)) else {
            return false;
        };
        let rrset = entry.rrsets.remove(rrset_index);
        entry.rrsets.insert(0, rrset);
        let entry = entries.remove(index);
        entries.insert(0, entry);
        true
    }

    /// Calls `f` for every RRset of every section.
    pub fn for_each_rrset_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(Section, &Name, &mut Rrset),
    {
        for section in Section::ALL {
            for entry in self.sections[section.index()].iter_mut() {
                for rrset in entry.rrsets.iter_mut() {
                    f(section, &entry.name, rrset);
                }
            }
        }
    }

    fn entry(&self, section: Section, name: &Name) -> Option<&Entry> {
        self.sections[section.index()]
            .iter()
            .find(|e| e.name == *name)
    }
}

/// Renders the response in the style of `dig`.
impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            ";; ->>HEADER<<- opcode: QUERY, status: {}, id: {}",
            self.rcode, self.id
        )?;
        write!(f, ";; flags: qr")?;
        for (set, flag) in [
            (self.aa, "aa"),
            (self.rd, "rd"),
            (self.ra, "ra"),
            (self.ad, "ad"),
            (self.cd, "cd"),
        ] {
            if set {
                write!(f, " {flag}")?;
            }
        }
        writeln!(
            f,
            "; QUERY: {}, ANSWER: {}, AUTHORITY: {}, ADDITIONAL: {}",
            self.question.is_some() as u8,
            self.count(Section::Answer),
            self.count(Section::Authority),
            self.count(Section::Additional),
        )?;
        if let Some(ref question) = self.question {
            writeln!(f, "\n;; QUESTION SECTION:")?;
            writeln!(
                f,
                ";{}\t\t{}\t{}",
                question.qname, question.qclass, question.qtype
            )?;
        }
        for section in Section::ALL {
            if self.count(section) == 0 {
                continue;
            }
            writeln!(f, "\n;; {section} SECTION:")?;
            for entry in self.entries(section) {
                for rrset in entry.rrsets.iter() {
                    writeln!(f, "{}", rrset.display(&entry.name))?;
                }
            }
        }
        Ok(())
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

    fn a_rrset(last: u8) -> Rrset {
        let mut rrset = Rrset::new(Type::A, Class::IN, Ttl::from(300));
        rrset.push_rdata(Rdata::new(vec![192, 0, 2, last]).unwrap());
        rrset
    }

    #[test]
    fn rrsets_are_grouped_by_name() {
        let mut response = Response::new(1, None);
        let name: Name = "host.example.test.".parse().unwrap();
        let other: Name = "other.example.test.".parse().unwrap();
        response.add_rrset(Section::Additional, &name, a_rrset(1));
        response.add_rrset(Section::Additional, &other, a_rrset(2));
        let mut aaaa = Rrset::new(Type::AAAA, Class::IN, Ttl::from(300));
        aaaa.push_rdata(Rdata::new(vec![0; 16]).unwrap());
        response.add_rrset(Section::Additional, &name, aaaa);
        assert_eq!(response.entries(Section::Additional).len(), 2);
        assert_eq!(response.count(Section::Additional), 3);
        assert_eq!(
            response.find_name(Section::Additional, &name, Type::AAAA, None),
            FindName::RrsetExists
        );
        assert_eq!(
            response.find_name(Section::Additional, &other, Type::AAAA, None),
            FindName::NameExists
        );
        assert_eq!(
            response.find_name(Section::Answer, &name, Type::A, None),
            FindName::NoName
        );
        assert!(response.is_duplicate(&name, Type::A));
        assert!(!response.is_duplicate(&name, Type::MX));
    }

    #[test]
    fn move_to_front_reorders_entry_and_rrset() {
        let mut response = Response::new(1, None);
        let first: Name = "a.example.test.".parse().unwrap();
        let second: Name = "b.example.test.".parse().unwrap();
        response.add_rrset(Section::Additional, &first, a_rrset(1));
        let mut aaaa = Rrset::new(Type::AAAA, Class::IN, Ttl::from(300));
        aaaa.push_rdata(Rdata::new(vec![0; 16]).unwrap());
        response.add_rrset(Section::Additional, &second, aaaa);
        response.add_rrset(Section::Additional, &second, a_rrset(2));
        assert!(response.move_to_front(Section::Additional, &second, Type::A));
        let entries = response.entries(Section::Additional);
        assert_eq!(entries[0].name, second);
        assert_eq!(entries[0].rrsets[0].rr_type, Type::A);
        assert!(!response.move_to_front(Section::Additional, &first, Type::MX));
    }
}
