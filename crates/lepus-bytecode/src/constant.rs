//! Constant pool for bytecode functions

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A constant value in the constant pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// 64-bit floating point number
    Number(f64),
    /// String value
    String(String),
    /// Boolean value
    Bool(bool),
    /// Regular expression
    RegExp {
        /// The regex pattern
        pattern: String,
        /// The regex flags (e.g., "gi")
        flags: String,
    },
}

impl Constant {
    /// Create a RegExp constant
    #[inline]
    pub fn regexp(pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        Self::RegExp {
            pattern: pattern.into(),
            flags: flags.into(),
        }
    }

    /// Get as number if this is a number constant
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string if this is a string constant
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    fn key(&self) -> ConstantKey {
        match self {
            Self::Number(n) => ConstantKey::Number(n.to_bits()),
            Self::String(s) => ConstantKey::String(s.clone()),
            Self::Bool(b) => ConstantKey::Bool(*b),
            Self::RegExp { pattern, flags } => ConstantKey::RegExp(pattern.clone(), flags.clone()),
        }
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::RegExp { pattern, flags } => write!(f, "/{pattern}/{flags}"),
        }
    }
}

/// Hashable identity of a constant; numbers compare by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstantKey {
    Number(u64),
    String(String),
    Bool(bool),
    RegExp(String, String),
}

/// Constant pool with deduplication
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Constant>", into = "Vec<Constant>")]
pub struct ConstantPool {
    constants: Vec<Constant>,
    index: FxHashMap<ConstantKey, u32>,
}

impl ConstantPool {
    /// Create a new empty constant pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constant to the pool, returns its index
    ///
    /// Deduplicates identical constants to save space.
    pub fn add(&mut self, constant: Constant) -> u32 {
        let key = constant.key();
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }

        let idx = self.constants.len() as u32;
        self.constants.push(constant);
        self.index.insert(key, idx);
        idx
    }

    /// Add a number constant
    #[inline]
    pub fn add_number(&mut self, n: f64) -> u32 {
        self.add(Constant::Number(n))
    }

    /// Add a string constant
    #[inline]
    pub fn add_string(&mut self, s: &str) -> u32 {
        self.add(Constant::String(s.to_string()))
    }

    /// Add a boolean constant
    #[inline]
    pub fn add_bool(&mut self, b: bool) -> u32 {
        self.add(Constant::Bool(b))
    }

    /// Add a regular expression constant
    #[inline]
    pub fn add_regexp(&mut self, pattern: &str, flags: &str) -> u32 {
        self.add(Constant::regexp(pattern, flags))
    }

    /// Get a constant by index
    #[inline]
    pub fn get(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    /// Number of constants in the pool
    #[inline]
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// Check if the pool is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Iterate over constants
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.constants.iter()
    }
}

impl PartialEq for ConstantPool {
    fn eq(&self, other: &Self) -> bool {
        self.constants.len() == other.constants.len()
            && self
                .constants
                .iter()
                .zip(&other.constants)
                .all(|(a, b)| a.key() == b.key())
    }
}

impl From<Vec<Constant>> for ConstantPool {
    fn from(constants: Vec<Constant>) -> Self {
        let mut pool = Self::new();
        for constant in constants {
            pool.add(constant);
        }
        pool
    }
}

impl From<ConstantPool> for Vec<Constant> {
    fn from(pool: ConstantPool) -> Self {
        pool.constants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_pool_dedup() {
        let mut pool = ConstantPool::new();

        let idx1 = pool.add_string("hello");
        let idx2 = pool.add_string("world");
        let idx3 = pool.add_string("hello");

        assert_eq!(idx1, 0);
        assert_eq!(idx2, 1);
        assert_eq!(idx3, 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_constant_pool_kinds_do_not_collide() {
        let mut pool = ConstantPool::new();

        let n = pool.add_number(1.0);
        let b = pool.add_bool(true);
        let s = pool.add_string("1");
        let r = pool.add_regexp("a+", "g");

        assert_eq!([n, b, s, r], [0, 1, 2, 3]);
        assert_eq!(pool.add_regexp("a+", "g"), 3);
        assert_eq!(pool.add_regexp("a+", "i"), 4);
    }

    #[test]
    fn test_nan_dedups_by_bits() {
        let mut pool = ConstantPool::new();
        let a = pool.add_number(f64::NAN);
        let b = pool.add_number(f64::NAN);
        let zero = pool.add_number(0.0);
        let neg_zero = pool.add_number(-0.0);

        assert_eq!(a, b);
        assert_ne!(zero, neg_zero);
    }

    #[test]
    fn test_serde_rebuilds_index() {
        let mut pool = ConstantPool::new();
        pool.add_string("test");
        pool.add_number(123.0);

        let json = serde_json::to_string(&pool).unwrap();
        let mut restored: ConstantPool = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, pool);
        assert_eq!(restored.add_number(123.0), 1);
        assert_eq!(restored.get(0), Some(&Constant::String("test".to_string())));
        assert_eq!(restored.get(2), None);
    }
}
