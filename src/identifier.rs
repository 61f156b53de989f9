//! Ordered volume and chapter labels.
//!
//! An [`Identifier`] is either a dotted numeric pair (`"12.5"`), a textual
//! special label (`"Oneshot"`), or unknown. Numeric identifiers sort first,
//! special ones after them in lexicographic order, and unknown sorts last.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// A totally ordered, partially numeric label for a volume or chapter.
///
/// `Eq`, `Hash` and `Ord` are structural so identifiers can key maps; two
/// unknown identifiers therefore share a key. The looser "same label"
/// relation used by range filters is [`Identifier::matches`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Identifier {
    Numeric { major: u32, minor: u32 },
    Special(String),
    Unknown,
}

impl Identifier {
    /// Creates a numeric identifier.
    pub const fn numeric(major: u32, minor: u32) -> Self {
        Identifier::Numeric { major, minor }
    }

    /// Parses `text` as a dotted number, keeping the text itself as the
    /// fallback label when it is not numeric.
    pub fn parse(text: &str) -> Self {
        Self::with_fallback(text, text)
    }

    /// Parses `text` as a dotted number, falling back to a special
    /// identifier labelled `fallback` (or unknown when that is blank).
    pub fn with_fallback(text: &str, fallback: &str) -> Self {
        match parse_numeric(text.trim()) {
            Some((major, minor)) => Identifier::Numeric { major, minor },
            None => Self::special(fallback),
        }
    }

    /// Creates a special identifier; a blank label yields [`Identifier::Unknown`].
    pub fn special(label: &str) -> Self {
        let label = label.trim();
        if label.is_empty() {
            Identifier::Unknown
        } else {
            Identifier::Special(label.to_string())
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Identifier::Numeric { .. })
    }

    /// True for every non-numeric identifier, unknown included.
    pub fn is_special(&self) -> bool {
        !self.is_numeric()
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Identifier::Unknown)
    }

    /// Label equality: numeric pairs compare by value, special labels by
    /// text, and unknown matches nothing (not even another unknown).
    pub fn matches(&self, other: &Identifier) -> bool {
        match (self, other) {
            (Identifier::Numeric { .. }, Identifier::Numeric { .. }) => self == other,
            (Identifier::Special(a), Identifier::Special(b)) => a == b,
            _ => false,
        }
    }

    /// Whether `other` directly follows `self` with no gap.
    ///
    /// Any special identifier on either side counts as adjacent. This only
    /// suppresses gap reports and never implies equality.
    pub fn is_next(&self, other: &Identifier) -> bool {
        match (self, other) {
            (
                Identifier::Numeric { major, minor },
                Identifier::Numeric {
                    major: next_major,
                    minor: next_minor,
                },
            ) => {
                (next_major == major && next_minor > minor)
                    || (major.checked_add(1) == Some(*next_major) && *next_minor == 0)
            }
            _ => true,
        }
    }

    /// Renders the identifier with zero padding so file names sort
    /// lexicographically in identifier order.
    ///
    /// The minor part is appended when it is non-zero or `force_minor` is
    /// set. Special and unknown identifiers render as with `Display`.
    ///
    /// ```
    /// use tankobon::identifier::Identifier;
    ///
    /// assert_eq!(Identifier::numeric(3, 0).string_filled(4, 2, false), "0003");
    /// assert_eq!(Identifier::numeric(3, 5).string_filled(4, 2, false), "0003.05");
    /// assert_eq!(Identifier::numeric(3, 0).string_filled(2, 1, true), "03.0");
    /// ```
    pub fn string_filled(&self, major_width: usize, minor_width: usize, force_minor: bool) -> String {
        match self {
            Identifier::Numeric { major, minor } if *minor != 0 || force_minor => {
                format!("{major:0major_width$}.{minor:0minor_width$}")
            }
            Identifier::Numeric { major, .. } => format!("{major:0major_width$}"),
            _ => self.to_string(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Identifier::Numeric { .. } => 0,
            Identifier::Special(_) => 1,
            Identifier::Unknown => 2,
        }
    }
}

fn parse_numeric(text: &str) -> Option<(u32, u32)> {
    let (major, minor) = match text.split_once('.') {
        Some((major, minor)) => (major, Some(minor)),
        None => (text, None),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(major) {
        return None;
    }
    let major = major.parse().ok()?;
    let minor = match minor {
        Some(minor) if digits(minor) => minor.parse().ok()?,
        Some(_) => return None,
        None => 0,
    };
    Some((major, minor))
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (
                Identifier::Numeric { major, minor },
                Identifier::Numeric {
                    major: other_major,
                    minor: other_minor,
                },
            ) => (major, minor).cmp(&(other_major, other_minor)),
            (Identifier::Special(a), Identifier::Special(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric { major, minor: 0 } => write!(f, "{major}"),
            Identifier::Numeric { major, minor } => write!(f, "{major}.{minor}"),
            Identifier::Special(label) => f.write_str(label),
            Identifier::Unknown => f.write_str("Unknown"),
        }
    }
}

impl FromStr for Identifier {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Identifier::parse(s))
    }
}

impl From<u32> for Identifier {
    fn from(major: u32) -> Self {
        Identifier::numeric(major, 0)
    }
}
