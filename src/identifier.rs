//! Hierarchical identifiers for plugin/socket routing and data types
//!
//! An identifier is an ordered sequence of interned segments, written
//! `svc.greet` in string form. Matching is pure ordered-prefix comparison:
//! no wildcards, no regex, O(length), independent of declaration order.
//! The same comparison serves plugin/socket matchmaking and connection
//! data-type compatibility.

use std::fmt;
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

use crate::interner::intern;

/// Segment separator in string form
pub const SEPARATOR: char = '.';

/// How empty (untyped) identifiers participate in matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// An empty identifier matches anything
    #[default]
    UntypedMatches,
    /// An empty identifier matches only another empty identifier
    Strict,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentifierError {
    #[error("Identifier '{0}' contains an empty segment")]
    EmptySegment(String),
}

/// Ordered segment sequence
///
/// Most identifiers are short; four inline segments cover them without
/// heap allocation. Segments are interned, so clones are pointer copies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Identifier {
    segments: SmallVec<[Arc<str>; 4]>,
}

impl Identifier {
    /// The empty (untyped) identifier
    pub fn untyped() -> Self {
        Self::default()
    }

    /// Parse a dot-delimited string form.
    ///
    /// The empty string parses to the untyped identifier; a non-empty
    /// string must not contain empty segments.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        if s.is_empty() {
            return Ok(Self::untyped());
        }

        let mut segments = SmallVec::new();
        for seg in s.split(SEPARATOR) {
            if seg.is_empty() {
                return Err(IdentifierError::EmptySegment(s.to_string()));
            }
            segments.push(intern(seg));
        }
        Ok(Self { segments })
    }

    /// Build from pre-split segments (tuple form passed through).
    pub fn from_segments<I, S>(segments: I) -> Result<Self, IdentifierError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = SmallVec::new();
        for seg in segments {
            let seg = seg.as_ref();
            if seg.is_empty() {
                return Err(IdentifierError::EmptySegment(String::new()));
            }
            out.push(intern(seg));
        }
        Ok(Self { segments: out })
    }

    #[inline]
    pub fn segments(&self) -> &[Arc<str>] {
        &self.segments
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if the shorter identifier is an elementwise prefix of the longer.
    ///
    /// Symmetric. Empty identifiers match per the policy flag.
    pub fn matches(&self, other: &Identifier, policy: MatchPolicy) -> bool {
        if self.is_empty() || other.is_empty() {
            return match policy {
                MatchPolicy::UntypedMatches => true,
                MatchPolicy::Strict => self.is_empty() && other.is_empty(),
            };
        }
        let n = self.len().min(other.len());
        self.segments[..n] == other.segments[..n]
    }

    /// True if `base` prefixes `self` (every `base` ⊑ `self` pair matches).
    pub fn is_subtype(&self, base: &Identifier) -> bool {
        if base.len() > self.len() {
            return false;
        }
        self.segments[..base.len()] == base.segments[..]
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::parse(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Identifier::parse(&s).map_err(D::Error::custom)
    }
}
