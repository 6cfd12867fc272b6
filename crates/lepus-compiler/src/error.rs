//! Compilation errors

use thiserror::Error;

use lepus_bytecode::BytecodeError;

use crate::ast::Position;
use crate::version::SdkVersion;

/// Compilation errors
///
/// Every variant aborts the compilation of the whole unit.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Identifier not found as local, global, builtin or captured variable
    #[error("{name} is not defined at {line}:{column}")]
    UnresolvedBinding {
        /// Identifier name
        name: String,
        /// Source line
        line: u32,
        /// Source column
        column: u32,
    },

    /// A function needs more registers than the interpreter provides
    #[error("Register ID is overflow at {line}:{column}! The max register id is {limit}")]
    RegisterOverflow {
        /// Highest usable register id
        limit: u8,
        /// Source line
        line: u32,
        /// Source column
        column: u32,
    },

    /// Construct needs a newer SDK version than the target
    #[error(
        "{construct} is not supported: the current Sdk Version {target} is less than {min_version} at {line}:{column}"
    )]
    UnsupportedFeature {
        /// Operator or construct
        construct: String,
        /// First SDK version supporting it
        min_version: SdkVersion,
        /// Requested target version
        target: SdkVersion,
        /// Source line
        line: u32,
        /// Source column
        column: u32,
    },

    /// Name declared twice in one block
    #[error("Identifier '{name}' has already been declared at {line}:{column}")]
    DuplicateDeclaration {
        /// Identifier name
        name: String,
        /// Source line
        line: u32,
        /// Source column
        column: u32,
    },

    /// Assignment to something that is neither an identifier nor a member access
    #[error("Invalid assignment target at {line}:{column}")]
    InvalidAssignmentTarget {
        /// Source line
        line: u32,
        /// Source column
        column: u32,
    },

    /// `break` or `continue` outside of a loop
    #[error("Illegal {statement} statement at {line}:{column}")]
    IllegalStatement {
        /// `break` or `continue`
        statement: &'static str,
        /// Source line
        line: u32,
        /// Source column
        column: u32,
    },

    /// Target SDK version string could not be parsed
    #[error("Invalid sdk version: {0:?}")]
    InvalidVersion(String),

    /// Internal compiler error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Create an unresolved binding error
    pub fn unresolved(name: impl Into<String>, pos: Position) -> Self {
        Self::UnresolvedBinding {
            name: name.into(),
            line: pos.line,
            column: pos.column,
        }
    }

    /// Create a register overflow error
    pub fn register_overflow(pos: Position) -> Self {
        Self::RegisterOverflow {
            limit: lepus_bytecode::Register::MAX,
            line: pos.line,
            column: pos.column,
        }
    }

    /// Create a version-gated feature error
    pub fn unsupported(
        construct: impl Into<String>,
        min_version: SdkVersion,
        target: SdkVersion,
        pos: Position,
    ) -> Self {
        Self::UnsupportedFeature {
            construct: construct.into(),
            min_version,
            target,
            line: pos.line,
            column: pos.column,
        }
    }

    /// Create a duplicate declaration error
    pub fn duplicate(name: impl Into<String>, pos: Position) -> Self {
        Self::DuplicateDeclaration {
            name: name.into(),
            line: pos.line,
            column: pos.column,
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<BytecodeError> for CompileError {
    fn from(err: BytecodeError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;
