//! Bytecode operands

use serde::{Deserialize, Serialize};

/// Virtual register (0-255)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Register(pub u8);

impl Register {
    /// Highest register id a function may use
    pub const MAX: u8 = u8::MAX;

    /// Create a new register
    #[inline]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Get register index
    #[inline]
    pub const fn index(self) -> u8 {
        self.0
    }
}

impl From<u8> for Register {
    fn from(index: u8) -> Self {
        Self(index)
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Index into a function's constant pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ConstantIndex(pub u32);

impl ConstantIndex {
    /// Create a new constant index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Index into a function's child function list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FunctionIndex(pub u32);

impl FunctionIndex {
    /// Create a new function index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Jump offset relative to the jump instruction itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct JumpOffset(pub i32);

impl JumpOffset {
    /// Create a new jump offset
    #[inline]
    pub const fn new(offset: i32) -> Self {
        Self(offset)
    }

    /// Offset from `from` to `to`
    #[inline]
    pub fn between(from: usize, to: usize) -> Self {
        Self(to as i32 - from as i32)
    }

    /// Get offset value
    #[inline]
    pub const fn offset(self) -> i32 {
        self.0
    }

    /// Absolute target of a jump located at `at`
    #[inline]
    pub fn target(self, at: usize) -> i64 {
        at as i64 + self.0 as i64
    }
}
