//! Compiled unit: the artifact handed to the interpreter and serializer

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::function::Function;

/// A compiled Lepus unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    /// SDK version the unit was compiled for
    pub sdk_version: String,

    /// Top-level function; every other function is a descendant
    pub root: Function,

    /// Variables declared in the top-level scope, by register
    pub top_level_variables: BTreeMap<String, u8>,
}

impl CompiledUnit {
    /// Create a new compiled unit
    pub fn new(sdk_version: impl Into<String>, root: Function) -> Self {
        Self {
            sdk_version: sdk_version.into(),
            root,
            top_level_variables: BTreeMap::new(),
        }
    }

    /// Number of functions in the tree
    pub fn function_count(&self) -> usize {
        let mut count = 0;
        self.root.walk(&mut |_| count += 1);
        count
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
