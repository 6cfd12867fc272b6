//! Function bytecode representation

use serde::{Deserialize, Serialize};

use crate::constant::ConstantPool;
use crate::instruction::Instruction;
use crate::operand::FunctionIndex;

/// One entry of a function's upvalue table (legacy closures)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpvalueDescriptor {
    /// Captured variable name
    pub name: String,
    /// Register in the parent (when `from_parent_locals`) or the parent's upvalue index
    pub index: u32,
    /// Whether `index` names a parent register rather than a parent upvalue
    pub from_parent_locals: bool,
}

/// Source position recorded for an emitted instruction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineCol {
    /// Line number (1-indexed, 0 when unknown)
    pub line: u32,
    /// Column number (1-indexed, 0 when unknown)
    pub column: u32,
}

impl LineCol {
    /// Create a new position
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Pack into one integer the way scope descriptors store positions
    pub const fn encode(self) -> u64 {
        (self.line as u64) << 32 | self.column as u64
    }

    /// Inverse of [`LineCol::encode`]
    pub const fn decode(value: u64) -> Self {
        Self {
            line: (value >> 32) as u32,
            column: value as u32,
        }
    }
}

/// A bytecode function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Unit-unique, monotonically increasing function id
    pub id: u32,

    /// Function name (`<anonymous>` for the top level and unnamed literals)
    pub name: String,

    /// Number of parameters
    pub param_count: u8,

    /// Parameter names (kept only when closures are enabled)
    pub param_names: Vec<String>,

    /// Number of registers needed
    pub register_count: u16,

    /// Upvalue table
    pub upvalues: Vec<UpvalueDescriptor>,

    /// Bytecode instructions
    pub instructions: Vec<Instruction>,

    /// Source position of every instruction
    pub positions: Vec<LineCol>,

    /// Constant pool
    pub constants: ConstantPool,

    /// Child functions, referenced by `Closure` instructions
    pub children: Vec<Function>,

    /// Scope descriptor tree
    pub scope: serde_json::Value,
}

impl Function {
    /// Create a new function builder
    pub fn builder() -> FunctionBuilder {
        FunctionBuilder::new()
    }

    /// Get a child function
    pub fn child(&self, index: FunctionIndex) -> Option<&Function> {
        self.children.get(index.0 as usize)
    }

    /// Encoded instruction stream
    pub fn code(&self) -> Vec<u64> {
        self.instructions.iter().map(Instruction::encode).collect()
    }

    /// Visit this function and all descendants in pre-order
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Function)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Find a function in this tree by id
    pub fn find(&self, id: u32) -> Option<&Function> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}

/// Builder for creating functions
#[derive(Debug, Default)]
pub struct FunctionBuilder {
    id: u32,
    name: Option<String>,
    param_count: u8,
    param_names: Vec<String>,
    register_count: u16,
    upvalues: Vec<UpvalueDescriptor>,
    instructions: Vec<Instruction>,
    positions: Vec<LineCol>,
    constants: ConstantPool,
    children: Vec<Function>,
    scope: serde_json::Value,
}

impl FunctionBuilder {
    /// Create a new function builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set function id
    pub fn id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    /// Set function name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set parameter count
    pub fn param_count(mut self, count: u8) -> Self {
        self.param_count = count;
        self
    }

    /// Set parameter names
    pub fn param_names(mut self, names: Vec<String>) -> Self {
        self.param_names = names;
        self
    }

    /// Set register count
    pub fn register_count(mut self, count: u16) -> Self {
        self.register_count = count;
        self
    }

    /// Set all upvalue descriptors
    pub fn upvalues(mut self, upvalues: Vec<UpvalueDescriptor>) -> Self {
        self.upvalues = upvalues;
        self
    }

    /// Set all instructions together with their positions
    pub fn instructions(mut self, instructions: Vec<Instruction>, positions: Vec<LineCol>) -> Self {
        self.instructions = instructions;
        self.positions = positions;
        self
    }

    /// Add a single instruction without a source position
    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self.positions.push(LineCol::default());
        self
    }

    /// Set constant pool
    pub fn constants(mut self, constants: ConstantPool) -> Self {
        self.constants = constants;
        self
    }

    /// Set child functions
    pub fn children(mut self, children: Vec<Function>) -> Self {
        self.children = children;
        self
    }

    /// Set scope descriptor
    pub fn scope(mut self, scope: serde_json::Value) -> Self {
        self.scope = scope;
        self
    }

    /// Build the function
    pub fn build(self) -> Function {
        Function {
            id: self.id,
            name: self.name.unwrap_or_else(|| "<anonymous>".to_string()),
            param_count: self.param_count,
            param_names: self.param_names,
            register_count: self.register_count,
            upvalues: self.upvalues,
            instructions: self.instructions,
            positions: self.positions,
            constants: self.constants,
            children: self.children,
            scope: self.scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::Register;

    #[test]
    fn test_function_builder() {
        let func = Function::builder()
            .id(3)
            .name("add")
            .param_count(2)
            .register_count(3)
            .instruction(Instruction::Add {
                dst: Register(0),
                lhs: Register(1),
                rhs: Register(2),
            })
            .instruction(Instruction::Return { src: Register(0) })
            .build();

        assert_eq!(func.name, "add");
        assert_eq!(func.param_count, 2);
        assert_eq!(func.instructions.len(), 2);
        assert_eq!(func.positions.len(), 2);
        assert_eq!(func.code().len(), 2);
    }

    #[test]
    fn test_anonymous_default_name() {
        assert_eq!(Function::builder().build().name, "<anonymous>");
    }

    #[test]
    fn test_walk_and_find() {
        let leaf = Function::builder().id(2).name("leaf").build();
        let mid = Function::builder().id(1).children(vec![leaf]).build();
        let root = Function::builder().id(0).children(vec![mid]).build();

        let mut ids = Vec::new();
        root.walk(&mut |f| ids.push(f.id));
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(root.find(2).map(|f| f.name.as_str()), Some("leaf"));
        assert!(root.child(FunctionIndex(0)).is_some());
        assert!(root.child(FunctionIndex(1)).is_none());
    }

    #[test]
    fn test_line_col_encoding() {
        let pos = LineCol::new(12, 7);
        assert_eq!(pos.encode(), (12u64 << 32) | 7);
        assert_eq!(LineCol::decode(pos.encode()), pos);
    }
}
