//! Debug trace flags.
//!
//! A flag set is written as a string of lowercase letters, e.g. `"cst"`.
//! The engine only queries flags; trace lines go through the `log` facade.
//!
//! Letters in use:
//! - `c`: tile computation and partitioning
//! - `s`: scheduler activity
//! - `p`: one line per driver call
//! - `t`: timing

use serde::{Deserialize, Serialize};

/// Set of enabled single-letter trace flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TraceFlags(u32);

impl TraceFlags {
    /// No flag enabled.
    pub const NONE: Self = Self(0);

    /// Parse a flag string. Only `a`-`z` are accepted.
    pub fn parse(flags: &str) -> Result<Self, InvalidTraceFlag> {
        let mut bits = 0u32;
        for c in flags.chars() {
            if !c.is_ascii_lowercase() {
                return Err(InvalidTraceFlag(c));
            }
            bits |= 1 << (c as u32 - 'a' as u32);
        }
        Ok(Self(bits))
    }

    /// Whether `flag` is enabled. Unknown characters are never enabled.
    #[inline]
    pub fn is_enabled(self, flag: char) -> bool {
        flag.is_ascii_lowercase() && self.0 & (1 << (flag as u32 - 'a' as u32)) != 0
    }
}

impl TryFrom<String> for TraceFlags {
    type Error = InvalidTraceFlag;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TraceFlags> for String {
    fn from(flags: TraceFlags) -> Self {
        ('a'..='z').filter(|&c| flags.is_enabled(c)).collect()
    }
}

/// A trace flag outside `a`-`z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid debug flag '{0}' (expected a lowercase letter)")]
pub struct InvalidTraceFlag(pub char);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_query() {
        let flags = TraceFlags::parse("cs").unwrap();
        assert!(flags.is_enabled('c'));
        assert!(flags.is_enabled('s'));
        assert!(!flags.is_enabled('t'));
        assert!(!flags.is_enabled('C'));
    }

    #[test]
    fn test_rejects_non_letters() {
        assert_eq!(TraceFlags::parse("c1"), Err(InvalidTraceFlag('1')));
    }

    #[test]
    fn test_string_form_is_sorted() {
        let flags = TraceFlags::parse("tpc").unwrap();
        assert_eq!(String::from(flags), "cpt");
    }
}
