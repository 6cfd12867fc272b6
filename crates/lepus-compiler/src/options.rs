//! Compile options: target version and name namespaces

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::version::SdkVersion;

/// Builtins every Lepus runtime registers
pub const LEPUS_BUILTINS: &[&str] = &[
    "Array",
    "Date",
    "JSON",
    "Math",
    "Number",
    "Object",
    "RegExp",
    "String",
    "console",
    "isNaN",
    "parseFloat",
    "parseInt",
];

/// Ordered set of names; a name's index is its lookup operand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Namespace {
    names: Vec<String>,
    index: FxHashMap<String, u32>,
}

impl Namespace {
    /// Create an empty namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// The default builtin namespace
    pub fn lepus_builtins() -> Self {
        LEPUS_BUILTINS.iter().copied().collect()
    }

    /// Add a name, returning its index
    pub fn insert(&mut self, name: impl Into<String>) -> u32 {
        let name = name.into();
        if let Some(&idx) = self.index.get(&name) {
            return idx;
        }
        let idx = self.names.len() as u32;
        self.index.insert(name.clone(), idx);
        self.names.push(name);
        idx
    }

    /// Index of a name
    pub fn search(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    /// Number of names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the namespace is empty
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in index order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Namespace {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut ns = Self::new();
        for name in iter {
            ns.insert(name);
        }
        ns
    }
}

impl From<Vec<String>> for Namespace {
    fn from(names: Vec<String>) -> Self {
        names.into_iter().collect()
    }
}

impl From<Namespace> for Vec<String> {
    fn from(ns: Namespace) -> Self {
        ns.names
    }
}

/// Options for one compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Target SDK version
    pub sdk_version: SdkVersion,
    /// Host-provided globals, resolved with `GetGlobal`
    pub globals: Namespace,
    /// Builtin namespace, resolved with `GetBuiltin`
    pub builtins: Namespace,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            sdk_version: SdkVersion::NEWEST,
            globals: Namespace::new(),
            builtins: Namespace::lepus_builtins(),
        }
    }
}

impl CompileOptions {
    /// Options targeting the newest SDK
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target version
    pub fn with_sdk_version(mut self, version: SdkVersion) -> Self {
        self.sdk_version = version;
        self
    }

    /// Add host globals
    pub fn with_globals<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.globals.insert(name);
        }
        self
    }

    /// Replace the builtin namespace
    pub fn with_builtins(mut self, builtins: Namespace) -> Self {
        self.builtins = builtins;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_indices_are_stable() {
        let mut ns = Namespace::new();
        assert_eq!(ns.insert("a"), 0);
        assert_eq!(ns.insert("b"), 1);
        assert_eq!(ns.insert("a"), 0);
        assert_eq!(ns.search("b"), Some(1));
        assert_eq!(ns.search("c"), None);
        assert_eq!(ns.len(), 2);
    }

    #[test]
    fn test_namespace_serde() {
        let ns: Namespace = serde_json::from_str(r#"["x", "y", "x"]"#).unwrap();
        assert_eq!(ns.len(), 2);
        assert_eq!(serde_json::to_string(&ns).unwrap(), r#"["x","y"]"#);
    }

    #[test]
    fn test_options_builder() {
        let opts = CompileOptions::new()
            .with_sdk_version(SdkVersion::new(2, 6, 0))
            .with_globals(["__globalProps", "SystemInfo"]);
        assert_eq!(opts.globals.search("SystemInfo"), Some(1));
        assert!(opts.builtins.search("Math").is_some());
        assert_eq!(opts.sdk_version, SdkVersion::BLOCK_CONTEXTS);
    }
}
