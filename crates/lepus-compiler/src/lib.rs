//! # Lepus Compiler
//!
//! Compiles a parsed Lepus script tree to register bytecode.
//!
//! ## Pipeline
//!
//! 1. Deserialize or build the AST ([`ast`])
//! 2. Compute lexical facts: bindings, captures, context layouts ([`analysis`])
//! 3. Walk the AST and generate bytecode ([`compiler`])
//! 4. Hand the [`lepus_bytecode::CompiledUnit`] to the interpreter or serializer
//!
//! The target SDK version selects the closure scheme and which operators are
//! legal; see [`version::Features`].

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod analysis;
pub mod ast;
pub mod closure;
pub mod codegen;
pub mod compiler;
pub mod control;
pub mod error;
pub mod options;
pub mod scope;
pub mod version;

pub use analysis::LexicalFacts;
pub use ast::{AstBuilder, Node, NodeKind};
pub use compiler::{Compiler, compile};
pub use error::{CompileError, CompileResult};
pub use options::{CompileOptions, Namespace};
pub use version::{Features, SdkVersion};
