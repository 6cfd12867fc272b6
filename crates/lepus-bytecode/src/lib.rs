//! # Lepus Bytecode
//!
//! This crate defines the register bytecode produced by the Lepus code
//! generator and consumed by the Lepus interpreters.
//!
//! ## Design Principles
//!
//! - **Register-based**: Operations work on up to 256 virtual registers per function
//! - **Fixed-width**: Every instruction encodes to one tagged 64-bit word
//! - **Tree-shaped**: Each function owns its constants and its child functions
//! - **Inspectable**: Function trees serialize to JSON and disassemble to text

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod constant;
pub mod disasm;
pub mod error;
pub mod function;
pub mod instruction;
pub mod module;
pub mod operand;

pub use constant::{Constant, ConstantPool};
pub use disasm::disassemble;
pub use error::BytecodeError;
pub use function::{Function, FunctionBuilder, LineCol, UpvalueDescriptor};
pub use instruction::{Instruction, Opcode, OperandShape};
pub use module::CompiledUnit;
pub use operand::{ConstantIndex, FunctionIndex, JumpOffset, Register};
