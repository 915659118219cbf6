//! Interpretation context: the set of broadcasting standards in force.
//!
//! Identical table ids and descriptor tags mean different things under
//! different standards. The active set is supplied by the host and used by
//! the registry to pick the right record type.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A set of standards, stored as bit flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Standards(u16);

impl Standards {
    pub const NONE: Standards = Standards(0x0000);
    pub const MPEG: Standards = Standards(0x0001);
    pub const DVB: Standards = Standards(0x0002);
    pub const SCTE: Standards = Standards(0x0004);
    pub const ATSC: Standards = Standards(0x0008);
    pub const ISDB: Standards = Standards(0x0010);

    const NAMES: [(Standards, &'static str); 5] = [
        (Standards::MPEG, "mpeg"),
        (Standards::DVB, "dvb"),
        (Standards::SCTE, "scte"),
        (Standards::ATSC, "atsc"),
        (Standards::ISDB, "isdb"),
    ];

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Standards) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Standards) -> bool {
        self.0 & other.0 != 0
    }

    /// Add the standards implied by the ones present. MPEG always applies
    /// and ISDB reuses the DVB SI tables and descriptors.
    pub fn with_implied(self) -> Standards {
        let mut s = self | Standards::MPEG;
        if s.contains(Standards::ISDB) {
            s |= Standards::DVB;
        }
        s
    }
}

impl BitOr for Standards {
    type Output = Standards;

    fn bitor(self, rhs: Standards) -> Standards {
        Standards(self.0 | rhs.0)
    }
}

impl BitOrAssign for Standards {
    fn bitor_assign(&mut self, rhs: Standards) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Standards {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(s, _)| self.contains(*s))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join(","))
        }
    }
}

impl fmt::Debug for Standards {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Standards({})", self)
    }
}

impl FromStr for Standards {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut result = Standards::NONE;
        for word in s.split([',', '|', ' ']).map(str::trim).filter(|w| !w.is_empty()) {
            if word.eq_ignore_ascii_case("none") {
                continue;
            }
            let found = Self::NAMES
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(word))
                .map(|(s, _)| *s)
                .ok_or_else(|| format!("unknown standard '{}'", word))?;
            result |= found;
        }
        Ok(result)
    }
}

impl TryFrom<String> for Standards {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Standards> for String {
    fn from(value: Standards) -> Self {
        value.to_string()
    }
}

/// Supplies the standards currently in force.
pub trait ContextProvider: Send {
    fn standards(&self) -> Standards;
}

impl ContextProvider for Standards {
    fn standards(&self) -> Standards {
        *self
    }
}

impl<F> ContextProvider for F
where
    F: Fn() -> Standards + Send,
{
    fn standards(&self) -> Standards {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let s: Standards = "DVB, isdb".parse().unwrap();
        assert!(s.contains(Standards::DVB));
        assert!(s.contains(Standards::ISDB));
        assert!(!s.contains(Standards::ATSC));
        assert_eq!(s.to_string(), "dvb,isdb");
        assert_eq!(Standards::NONE.to_string(), "none");
        assert!("dvb,foo".parse::<Standards>().is_err());
    }

    #[test]
    fn test_isdb_implies_dvb() {
        let s = Standards::ISDB.with_implied();
        assert!(s.contains(Standards::DVB));
        assert!(!s.contains(Standards::ATSC));
        assert_eq!(Standards::ATSC.with_implied(), Standards::ATSC | Standards::MPEG);
    }

    #[test]
    fn test_provider() {
        let provider = || Standards::ATSC;
        assert_eq!(ContextProvider::standards(&provider), Standards::ATSC);
        assert_eq!(Standards::DVB.standards(), Standards::DVB);
    }
}
