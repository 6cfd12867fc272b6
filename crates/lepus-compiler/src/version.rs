//! Target SDK versions and the features they enable

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};

/// Target SDK version
///
/// Dotted numeric versions compare component-wise; missing components are
/// zero. An empty string or `"null"` selects the newest SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SdkVersion {
    parts: [u32; 3],
    newest: bool,
}

impl SdkVersion {
    /// Newest SDK; every feature enabled
    pub const NEWEST: Self = Self {
        parts: [u32::MAX; 3],
        newest: true,
    };

    /// First version compiling builtin namespace lookups
    pub const BUILTINS: Self = Self::new(1, 1, 0);
    /// First version with nested closures and exceptions
    pub const CLOSURES: Self = Self::new(1, 4, 0);
    /// First version with block-level contexts
    pub const BLOCK_CONTEXTS: Self = Self::new(2, 6, 0);
    /// First version exposing the `lynx` global object
    pub const LYNX_GLOBAL: Self = Self::new(2, 8, 0);

    /// Create a version
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            parts: [major, minor, patch],
            newest: false,
        }
    }

    /// Parse a dotted version string
    pub fn parse(s: &str) -> CompileResult<Self> {
        let s = s.trim();
        if s.is_empty() || s == "null" {
            return Ok(Self::NEWEST);
        }

        let mut parts = [0u32; 3];
        let mut count = 0;
        for piece in s.split('.') {
            if count == parts.len() {
                return Err(CompileError::InvalidVersion(s.to_string()));
            }
            parts[count] = piece
                .parse()
                .map_err(|_| CompileError::InvalidVersion(s.to_string()))?;
            count += 1;
        }
        Ok(Self {
            parts,
            newest: false,
        })
    }

    /// Whether this version is `other` or newer
    pub fn is_at_least(&self, other: SdkVersion) -> bool {
        *self >= other
    }

    /// Whether this is the newest-SDK marker
    pub fn is_newest(&self) -> bool {
        self.newest
    }
}

impl Default for SdkVersion {
    fn default() -> Self {
        Self::NEWEST
    }
}

impl Ord for SdkVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.newest, other.newest) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.parts.cmp(&other.parts),
        }
    }
}

impl PartialOrd for SdkVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for SdkVersion {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SdkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.newest {
            return f.write_str("null");
        }
        let [major, minor, patch] = self.parts;
        if patch == 0 {
            write!(f, "{major}.{minor}")
        } else {
            write!(f, "{major}.{minor}.{patch}")
        }
    }
}

impl Serialize for SdkVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SdkVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Code generation features selected by the target version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    /// Target version, kept for error messages
    pub target: SdkVersion,
    /// Context-slot closures, exceptions and the extended operator set
    ///
    /// Without it `** & | ^ ??` are compile errors. `??` is not lowered to
    /// `||`: the two differ on falsy non-nullish values such as `0` and `""`.
    pub closures: bool,
    /// Captured variables of non-root blocks live in per-block contexts
    pub block_contexts: bool,
    /// `lynx` resolves to the SDK global object
    pub lynx_global: bool,
    /// Names of the builtin namespace resolve to builtin lookups
    pub builtins: bool,
}

impl Features {
    /// Features for a target version
    pub fn for_version(target: SdkVersion) -> Self {
        Self {
            target,
            closures: target.is_at_least(SdkVersion::CLOSURES),
            block_contexts: target.is_at_least(SdkVersion::BLOCK_CONTEXTS),
            lynx_global: target.is_at_least(SdkVersion::LYNX_GLOBAL),
            builtins: target.is_at_least(SdkVersion::BUILTINS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_compare() {
        let v = SdkVersion::parse("2.6").unwrap();
        assert_eq!(v, SdkVersion::new(2, 6, 0));
        assert!(v.is_at_least(SdkVersion::BLOCK_CONTEXTS));
        assert!(!v.is_at_least(SdkVersion::LYNX_GLOBAL));
        assert!(SdkVersion::parse("1.10").unwrap() > SdkVersion::parse("1.4").unwrap());
        assert_eq!(SdkVersion::parse("2").unwrap(), SdkVersion::new(2, 0, 0));
    }

    #[test]
    fn test_newest() {
        assert!(SdkVersion::parse("").unwrap().is_newest());
        assert!(SdkVersion::parse("null").unwrap().is_newest());
        assert!(SdkVersion::NEWEST > SdkVersion::new(99, 0, 0));
        assert_eq!(SdkVersion::NEWEST.to_string(), "null");
    }

    #[test]
    fn test_invalid() {
        for bad in ["abc", "1.x", "1..2", "1.2.3.4", "-1"] {
            assert!(
                matches!(SdkVersion::parse(bad), Err(CompileError::InvalidVersion(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(SdkVersion::new(2, 8, 0).to_string(), "2.8");
        assert_eq!(SdkVersion::new(1, 4, 2).to_string(), "1.4.2");
    }

    #[test]
    fn test_features() {
        let legacy = Features::for_version(SdkVersion::new(1, 3, 0));
        assert!(!legacy.closures);
        assert!(legacy.builtins);

        let mid = Features::for_version(SdkVersion::new(2, 0, 0));
        assert!(mid.closures);
        assert!(!mid.block_contexts);

        let newest = Features::for_version(SdkVersion::NEWEST);
        assert!(newest.closures && newest.block_contexts && newest.lynx_global);

        let ancient = Features::for_version(SdkVersion::new(1, 0, 0));
        assert!(!ancient.builtins);
    }

    #[test]
    fn test_serde_as_string() {
        let v: SdkVersion = serde_json::from_str("\"2.6\"").unwrap();
        assert_eq!(v, SdkVersion::BLOCK_CONTEXTS);
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"2.6\"");
    }
}
