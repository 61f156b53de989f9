//! Inclusion filters over identifiers.
//!
//! Ranges are written as a comma-separated list of spans (`"3..5"`) and
//! single labels (`"8"`, `"Oneshot"`). A leading `!` negates the whole set.

use std::fmt;
use std::str::FromStr;

use crate::identifier::Identifier;

/// One span of identifiers. Without an `end` it matches a single label.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Range {
    pub start: Identifier,
    pub end: Option<Identifier>,
}

impl Range {
    pub fn single(id: Identifier) -> Self {
        Self {
            start: id,
            end: None,
        }
    }

    pub fn span(start: Identifier, end: Identifier) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Span endpoints are inclusive; a single label uses [`Identifier::matches`].
    pub fn contains(&self, id: &Identifier) -> bool {
        match &self.end {
            Some(end) => {
                (self.start.matches(id) || self.start < *id) && (id.matches(end) || id < end)
            }
            None => self.start.matches(id),
        }
    }
}

/// An optionally negated union of [`Range`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeSet {
    pub ranges: Vec<Range>,
    pub negated: bool,
}

impl RangeSet {
    /// Parses a range expression such as `"1..3,5,Extra"` or `"!3..5"`.
    ///
    /// Blank items are skipped. Span endpoints that are not numeric become
    /// unknown, which sorts after everything, so `"10.."` reaches to the end.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let (negated, body) = match text.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let ranges = body
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| match item.split_once("..") {
                Some((start, end)) => Range::span(
                    Identifier::with_fallback(start, ""),
                    Identifier::with_fallback(end, ""),
                ),
                None => Range::single(Identifier::parse(item)),
            })
            .collect();

        Self { ranges, negated }
    }

    /// True when `id` falls in any range, inverted for a negated set.
    pub fn contains(&self, id: &Identifier) -> bool {
        self.ranges.iter().any(|range| range.contains(id)) != self.negated
    }
}

impl FromStr for RangeSet {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RangeSet::parse(s))
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            f.write_str("!")?;
        }
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match &range.end {
                Some(end) => write!(f, "{}..{}", range.start, end)?,
                None => write!(f, "{}", range.start)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_and_singles() {
        let set = RangeSet::parse("3..5, 8");
        assert!(set.contains(&Identifier::numeric(3, 0)));
        assert!(set.contains(&Identifier::numeric(4, 5)));
        assert!(set.contains(&Identifier::numeric(5, 0)));
        assert!(set.contains(&Identifier::numeric(8, 0)));
        assert!(!set.contains(&Identifier::numeric(5, 1)));
        assert!(!set.contains(&Identifier::numeric(7, 0)));
        assert!(!set.contains(&Identifier::Unknown));
    }

    #[test]
    fn test_negated() {
        let set = RangeSet::parse("!3..5");
        assert!(set.negated);
        assert!(!set.contains(&Identifier::numeric(4, 0)));
        assert!(set.contains(&Identifier::numeric(6, 0)));
    }

    #[test]
    fn test_open_end() {
        let set = RangeSet::parse("10..");
        assert!(set.contains(&Identifier::numeric(250, 0)));
        assert!(!set.contains(&Identifier::numeric(9, 9)));
    }

    #[test]
    fn test_special_label() {
        let set = RangeSet::parse("1..3,Oneshot");
        assert!(set.contains(&Identifier::special("Oneshot")));
        assert!(!set.contains(&Identifier::special("Extra")));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let set = RangeSet::parse(" , ");
        assert!(set.ranges.is_empty());
        assert!(!set.contains(&Identifier::numeric(1, 0)));
    }
}
