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

//! Implementation of data structures related to domain names.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;
use std::ops::Index;
use std::str::FromStr;

use arrayvec::ArrayVec;

mod error;
mod label;
pub use error::Error;
pub use label::Label;

/// The maximum number of labels in a domain name.
const MAX_N_LABELS: usize = 128;

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
pub const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label in a domain name (not including the
/// octet that provides the length).
const MAX_LABEL_LEN: usize = 63;

////////////////////////////////////////////////////////////////////////
// NAME STRUCTURE                                                     //
////////////////////////////////////////////////////////////////////////

/// A domain name.
///
/// A `Name` owns the uncompressed on-the-wire representation of the
/// name ([RFC 1035 § 3.1]) together with the offset of each label in
/// that representation, so that label access, superdomain extraction,
/// and right-to-left comparison do not need to rescan the name. The
/// label-offset idea follows the [NSD] authoritative nameserver.
///
/// `Name`s can be constructed
///
/// * through the [`FromStr`] implementation;
/// * from a sequence of labels through [`Name::from_labels`]; and
/// * from uncompressed on-the-wire names through
///   [`Name::try_from_uncompressed`] and
///   [`Name::try_from_uncompressed_all`].
///
/// [NSD]: https://www.nlnetlabs.nl/projects/nsd/about/
/// [RFC 1035 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.1
#[derive(Clone)]
pub struct Name {
    wire: Box<[u8]>,
    offsets: Box<[u8]>,
}

#[allow(clippy::len_without_is_empty)] // A domain name is never empty!
impl Name {
    /// Returns a `Name` representing the DNS root, `.`.
    pub fn root() -> Self {
        Self {
            wire: Box::new([0]),
            offsets: Box::new([0]),
        }
    }

    /// Builds a `Name` from its non-null labels, in order from the
    /// leftmost label to the one just below the root.
    pub fn from_labels<'a, I>(labels: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut builder = Builder::new();
        for label in labels {
            if label.is_empty() {
                return Err(Error::NullNonTerminal);
            }
            for &octet in label {
                builder.try_push(octet)?;
            }
            builder.next_label()?;
        }
        builder.finish()
    }

    /// Tries to parse an uncompressed name present at the start of the
    /// provided buffer. The name need not occupy the entire buffer;
    /// extra data is ignored. If the name is valid, a new `Name` is
    /// returned along with the length of the name in octets.
    pub fn try_from_uncompressed(octets: &[u8]) -> Result<(Self, usize), Error> {
        let mut offsets = ArrayVec::<u8, MAX_N_LABELS>::new();
        let mut cursor = 0;
        loop {
            let len = *octets.get(cursor).ok_or(Error::UnexpectedEnd)? as usize;
            if len > MAX_LABEL_LEN {
                return Err(Error::LabelTooLong);
            }
            offsets
                .try_push(cursor as u8)
                .or(Err(Error::NameTooLong))?;
            let next = cursor + 1 + len;
            if next > MAX_WIRE_LEN {
                return Err(Error::NameTooLong);
            } else if next > octets.len() {
                return Err(Error::UnexpectedEnd);
            }
            cursor = next;
            if len == 0 {
                break;
            }
        }
        let name = Self {
            wire: octets[..cursor].into(),
            offsets: offsets.as_slice().into(),
        };
        Ok((name, cursor))
    }

    /// Like [`Name::try_from_uncompressed`], but in addition fails if
    /// there is extra data in the buffer after the name.
    pub fn try_from_uncompressed_all(octets: &[u8]) -> Result<Self, Error> {
        let (name, len) = Self::try_from_uncompressed(octets)?;
        if len == octets.len() {
            Ok(name)
        } else {
            Err(Error::ExtraData)
        }
    }

    /// Returns the number of labels in this `Name`, including the null
    /// label.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns whether the `Name` is the DNS root `.`.
    pub fn is_root(&self) -> bool {
        self.len() == 1
    }

    /// Returns whether the `Name` is a wildcard domain name (i.e.,
    /// whether its first label is `*`).
    pub fn is_wildcard(&self) -> bool {
        self[0].is_asterisk()
    }

    /// Returns an iterator over labels in this `Name`.
    pub fn labels(&self) -> Labels {
        Labels {
            name: self,
            front: 0,
            back: self.len(),
        }
    }

    /// Returns whether this `Name` is equal to or a subdomain of
    /// `other`.
    pub fn eq_or_subdomain_of(&self, other: &Name) -> bool {
        self.len() >= other.len() && self.common_labels(other) == other.len()
    }

    /// Returns the number of labels, counted from the right and
    /// including the null label, that this `Name` shares with `other`.
    pub fn common_labels(&self, other: &Name) -> usize {
        self.labels()
            .rev()
            .zip(other.labels().rev())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Returns the superdomain obtained by skipping the first `skip`
    /// labels of the `Name`, or `None` if there aren't enough labels.
    pub fn superdomain(&self, skip: usize) -> Option<Name> {
        if skip < self.len() {
            let start = self.offsets[skip];
            Some(Self {
                wire: self.wire[start as usize..].into(),
                offsets: self.offsets[skip..].iter().map(|o| o - start).collect(),
            })
        } else {
            None
        }
    }

    /// Returns the `Name` formed by placing `label` in front of this
    /// one. Passing [`Label::asterisk`] yields the wildcard name whose
    /// closest encloser is this `Name`.
    pub fn prepend(&self, label: &Label) -> Result<Name, Error> {
        let mut builder = Builder::new();
        for &octet in label.octets() {
            builder.try_push(octet)?;
        }
        builder.next_label()?;
        builder.extend_from(self)
    }

    /// Returns the `Name` formed by keeping the first `keep` labels of
    /// this `Name` and then appending all of `suffix`. This is the name
    /// rewrite performed by DNAME substitution ([RFC 6672 § 2.2]), and
    /// it fails with [`Error::NameTooLong`] if the result would exceed
    /// 255 octets.
    ///
    /// [RFC 6672 § 2.2]: https://datatracker.ietf.org/doc/html/rfc6672#section-2.2
    pub fn with_suffix(&self, keep: usize, suffix: &Name) -> Result<Name, Error> {
        let mut builder = Builder::new();
        for label in self.labels().take(keep.min(self.len() - 1)) {
            for &octet in label.octets() {
                builder.try_push(octet)?;
            }
            builder.next_label()?;
        }
        builder.extend_from(suffix)
    }

    /// Returns a copy of this `Name` with all ASCII letters made
    /// lowercase, as required by the canonical RR form of
    /// [RFC 4034 § 6.2].
    ///
    /// [RFC 4034 § 6.2]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.2
    pub fn to_lowercase(&self) -> Name {
        let mut lowered = self.clone();
        lowered.wire.make_ascii_lowercase();
        lowered
    }

    /// Returns the (uncompressed) on-the-wire representation of the
    /// `Name`.
    pub fn wire_repr(&self) -> &[u8] {
        &self.wire
    }

    /// Returns the on-the-wire representation of the first `n` labels
    /// of the `Name`. This will panic if `n > self.len()`.
    pub fn wire_repr_to(&self, n: usize) -> &[u8] {
        if n == self.len() {
            self.wire_repr()
        } else {
            &self.wire[0..self.offsets[n] as usize]
        }
    }

    /// Returns the on-the-wire representation of the `Name` starting
    /// with the `n`-th label. If `n == self.len()`, this returns an
    /// empty slice; if `n > self.len()`, this panics.
    pub fn wire_repr_from(&self, n: usize) -> &[u8] {
        if n == self.len() {
            &[]
        } else {
            &self.wire[self.offsets[n] as usize..]
        }
    }
}

impl Index<usize> for Name {
    type Output = Label;

    fn index(&self, index: usize) -> &Self::Output {
        let offset = self.offsets[index] as usize;
        let len = self.wire[offset] as usize;
        Label::from_unchecked(&self.wire[offset + 1..offset + 1 + len])
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        for label in self.labels().take(self.len() - 1) {
            write!(f, "{}.", label)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.wire.eq_ignore_ascii_case(&other.wire)
    }
}

impl Eq for Name {}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The [`Ord`] implementation for `Name` employs DNSSEC's canonical
/// ordering of domain names. Per [RFC 4034 § 6.1], `Name`s are ordered
/// as strings of labels read from right to left.
///
/// [RFC 4034 § 6.1]: https://datatracker.ietf.org/doc/html/rfc4034#section-6.1
impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.labels()
            .rev()
            .zip(other.labels().rev())
            .find_map(|(a, b)| Some(a.cmp(b)).filter(|ordering| ordering.is_ne()))
            .unwrap_or_else(|| self.len().cmp(&other.len()))
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for label in self.labels() {
            label.hash(state);
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ITERATION OVER A NAME'S LABELS                                     //
////////////////////////////////////////////////////////////////////////

/// An iterator over the [`Label`]s in a [`Name`], constructed with
/// [`Name::labels`].
#[derive(Clone, Debug)]
pub struct Labels<'a> {
    name: &'a Name,
    front: usize,
    back: usize,
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a Label;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            let this_one = self.front;
            self.front += 1;
            Some(&self.name[this_one])
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back - self.front;
        (len, Some(len))
    }
}

impl DoubleEndedIterator for Labels<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.back > self.front {
            self.back -= 1;
            Some(&self.name[self.back])
        } else {
            None
        }
    }
}

impl ExactSizeIterator for Labels<'_> {}

impl FusedIterator for Labels<'_> {}

////////////////////////////////////////////////////////////////////////
// NAME CONSTRUCTION                                                  //
////////////////////////////////////////////////////////////////////////

/// Incrementally builds a [`Name`] one octet at a time, enforcing the
/// label and name length limits as it goes.
struct Builder {
    wire: ArrayVec<u8, MAX_WIRE_LEN>,
    offsets: ArrayVec<u8, MAX_N_LABELS>,
    label_start: usize,
}

impl Builder {
    fn new() -> Self {
        let mut wire = ArrayVec::new();
        let mut offsets = ArrayVec::new();
        wire.push(0);
        offsets.push(0);
        Self {
            wire,
            offsets,
            label_start: 0,
        }
    }

    /// Appends an octet to the current label.
    fn try_push(&mut self, octet: u8) -> Result<(), Error> {
        if self.wire[self.label_start] as usize == MAX_LABEL_LEN {
            return Err(Error::LabelTooLong);
        }
        self.wire.try_push(octet).or(Err(Error::NameTooLong))?;
        self.wire[self.label_start] += 1;
        Ok(())
    }

    /// Ends the current label, which must be non-null, and starts a
    /// new one.
    fn next_label(&mut self) -> Result<(), Error> {
        if self.wire[self.label_start] == 0 {
            return Err(Error::NullNonTerminal);
        }
        self.label_start = self.wire.len();
        self.wire.try_push(0).or(Err(Error::NameTooLong))?;
        self.offsets
            .try_push(self.label_start as u8)
            .or(Err(Error::NameTooLong))
    }

    /// Appends the labels of `suffix` (which is a complete name) and
    /// finishes.
    fn extend_from(mut self, suffix: &Name) -> Result<Name, Error> {
        // The current label is null at this point; it is replaced by
        // the suffix's first label.
        self.wire.pop();
        self.offsets.pop();
        let base = self.wire.len();
        if base + suffix.wire.len() > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }
        self.wire
            .try_extend_from_slice(&suffix.wire)
            .or(Err(Error::NameTooLong))?;
        for &offset in suffix.offsets.iter() {
            self.offsets
                .try_push((base + offset as usize) as u8)
                .or(Err(Error::NameTooLong))?;
        }
        Ok(Name {
            wire: self.wire.as_slice().into(),
            offsets: self.offsets.as_slice().into(),
        })
    }

    fn finish(self) -> Result<Name, Error> {
        if self.wire[self.label_start] != 0 {
            Err(Error::NonNullTerminal)
        } else {
            Ok(Name {
                wire: self.wire.as_slice().into(),
                offsets: self.offsets.as_slice().into(),
            })
        }
    }
}

////////////////////////////////////////////////////////////////////////
// PARSING OF NAMES FROM RUST STRINGS                                 //
////////////////////////////////////////////////////////////////////////

/// Allows for conversion of a Rust [`str`] into a [`Name`]. The passed
/// string must be strictly ASCII and fully qualified. Escape sequences
/// as defined by [RFC 4343 § 2.1] are supported.
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(Error::StrEmpty);
        } else if s == "." {
            return Ok(Name::root());
        }

        let mut remaining_octets: &[u8] = s.as_ref();
        let mut builder = Builder::new();

        // NOTE: to check that the string is ASCII, it suffices to check
        // that each octet is ASCII as we go. This is because all
        // multi-byte characters start with an octet that is not ASCII.
        while let Some(&octet) = remaining_octets.first() {
            if octet == b'\\' {
                let (value, consumed) = parse_escape(&remaining_octets[1..])?;
                builder.try_push(value)?;
                remaining_octets = &remaining_octets[consumed + 1..];
            } else if octet == b'.' {
                builder.next_label()?;
                remaining_octets = &remaining_octets[1..];
            } else if !octet.is_ascii() {
                return Err(Error::StrNotAscii);
            } else {
                builder.try_push(octet)?;
                remaining_octets = &remaining_octets[1..];
            }
        }
        builder.finish()
    }
}

/// Parses an escape sequence. We expect `remaining_octets` to start
/// with the octet immediately *after* the backslash that introduces the
/// escape sequence.
fn parse_escape(remaining_octets: &[u8]) -> Result<(u8, usize), Error> {
    match remaining_octets {
        [] => Err(Error::InvalidEscape),
        [first, ..] if first.is_ascii_digit() => {
            let digits = remaining_octets.get(0..3).ok_or(Error::InvalidEscape)?;
            if !digits.iter().all(u8::is_ascii_digit) {
                return Err(Error::InvalidEscape);
            }
            let value = digits
                .iter()
                .fold(0usize, |acc, digit| 10 * acc + (digit - b'0') as usize);
            u8::try_from(value)
                .map(|value| (value, 3))
                .or(Err(Error::InvalidEscape))
        }
        [first, ..] => Ok((*first, 1)),
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
