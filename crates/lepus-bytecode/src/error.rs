//! Bytecode errors

use thiserror::Error;

/// Errors that can occur during bytecode operations
#[derive(Debug, Error)]
pub enum BytecodeError {
    /// Invalid opcode
    #[error("Invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),

    /// Operand does not fit the instruction's field
    #[error("Invalid operand for {opcode}: {value}")]
    InvalidOperand {
        /// Opcode name
        opcode: &'static str,
        /// Offending operand value
        value: i64,
    },

    /// Attempt to backpatch an instruction that has no patchable field
    #[error("{0} cannot be backpatched")]
    NotPatchable(&'static str),

    /// JSON error while (de)serializing a compiled unit
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for bytecode operations
pub type Result<T> = std::result::Result<T, BytecodeError>;
