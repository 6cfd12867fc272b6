//! Lexical analysis
//!
//! A pre-pass over the tree that decides, for every identifier reference,
//! whether it names a local of the current function, a variable captured
//! from an enclosing function, or a global. It also lays out the context
//! slots of every captured declaration.
//!
//! The pass opens blocks and functions in exactly the order the code
//! generator does, so block and function numbers agree between the two.
//! Each block records the node that opened it and the generator checks
//! this as it goes.

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::ast::{CatchClause, Node, NodeId, NodeKind, Position, sorted_properties};
use crate::error::{CompileError, CompileResult};
use crate::version::Features;

/// Pre-order number of a block within the unit
pub type BlockNumber = u32;

/// Pre-order number of a function within the unit (top level is 0)
pub type FunctionNumber = u32;

/// A declaration: its name and the block that declares it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeclKey {
    /// Declared name
    pub name: String,
    /// Declaring block
    pub block: BlockNumber,
}

impl DeclKey {
    /// Create a declaration key
    pub fn new(name: impl Into<String>, block: BlockNumber) -> Self {
        Self {
            name: name.into(),
            block,
        }
    }
}

/// How an identifier reference resolves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Declared in the current function
    Local(DeclKey),
    /// Declared in an enclosing function
    Captured {
        /// The captured declaration
        decl: DeclKey,
        /// Function that declares it
        function: FunctionNumber,
    },
    /// Not declared anywhere in the unit
    Global,
}

/// Slot assignment of one context
///
/// Slot 0 of every context links to the parent context; variables start at 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextLayout {
    slots: Vec<DeclKey>,
}

impl ContextLayout {
    /// Create an empty layout
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a declaration, returning its slot
    pub fn push(&mut self, decl: DeclKey) -> u16 {
        if let Some(slot) = self.slot_of(&decl) {
            return slot;
        }
        self.slots.push(decl);
        self.slots.len() as u16
    }

    /// Slot of a declaration
    pub fn slot_of(&self, decl: &DeclKey) -> Option<u16> {
        self.slots
            .iter()
            .position(|d| d == decl)
            .map(|i| i as u16 + 1)
    }

    /// Number of variable slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no variable lives in this context
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Declarations in slot order
    pub fn iter(&self) -> impl Iterator<Item = &DeclKey> {
        self.slots.iter()
    }
}

/// Read-only facts the code generator consults
#[derive(Debug, Clone, Default)]
pub struct LexicalFacts {
    bindings: FxHashMap<NodeId, Binding>,
    function_contexts: FxHashMap<FunctionNumber, ContextLayout>,
    block_contexts: FxHashMap<BlockNumber, ContextLayout>,
    block_openers: Vec<NodeId>,
    function_count: u32,
}

impl LexicalFacts {
    /// Create empty facts, for producers outside this crate
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze a `Chunk` tree
    pub fn analyze(root: &Node, features: &Features) -> CompileResult<Self> {
        let NodeKind::Chunk { body } = &root.kind else {
            return Err(CompileError::internal("expected a Chunk node at the root"));
        };
        if let Some(id) = root.duplicate_id() {
            return Err(CompileError::internal(format!(
                "node id {} appears more than once",
                id.0
            )));
        }

        let mut analyzer = Analyzer::new(features);
        analyzer.enter_function();
        analyzer.enter_block(root.id);
        for stmt in body {
            analyzer.statement(stmt)?;
        }
        analyzer.leave_block();
        analyzer.leave_function();
        Ok(analyzer.finish())
    }

    /// Binding of an identifier node
    pub fn binding(&self, id: NodeId) -> Option<&Binding> {
        self.bindings.get(&id)
    }

    /// Context layout of a function, if any of its variables are captured
    pub fn function_context(&self, function: FunctionNumber) -> Option<&ContextLayout> {
        self.function_contexts.get(&function)
    }

    /// Context layout of a block, if it owns a block context
    pub fn block_context(&self, block: BlockNumber) -> Option<&ContextLayout> {
        self.block_contexts.get(&block)
    }

    /// Node that opens a block
    pub fn block_opener(&self, block: BlockNumber) -> Option<NodeId> {
        self.block_openers.get(block as usize).copied()
    }

    /// Number of blocks in the unit
    pub fn block_count(&self) -> usize {
        self.block_openers.len()
    }

    /// Number of functions in the unit, including the top level
    pub fn function_count(&self) -> u32 {
        self.function_count
    }

    /// Record the binding of an identifier node
    pub fn set_binding(&mut self, id: NodeId, binding: Binding) {
        self.bindings.insert(id, binding);
    }

    /// Record a function's context layout
    pub fn set_function_context(&mut self, function: FunctionNumber, layout: ContextLayout) {
        self.function_contexts.insert(function, layout);
    }

    /// Record a block's context layout
    pub fn set_block_context(&mut self, block: BlockNumber, layout: ContextLayout) {
        self.block_contexts.insert(block, layout);
    }
}

struct DeclInfo {
    key: DeclKey,
    function: FunctionNumber,
    root_block: bool,
    captured: bool,
}

struct BlockFrame {
    number: BlockNumber,
    root: bool,
    names: FxHashMap<String, usize>,
}

struct FunctionFrame {
    number: FunctionNumber,
    blocks: Vec<BlockFrame>,
}

struct Analyzer<'a> {
    features: &'a Features,
    facts: LexicalFacts,
    functions: Vec<FunctionFrame>,
    decls: Vec<DeclInfo>,
    next_block: BlockNumber,
    next_function: FunctionNumber,
}

impl<'a> Analyzer<'a> {
    fn new(features: &'a Features) -> Self {
        Self {
            features,
            facts: LexicalFacts::new(),
            functions: Vec::new(),
            decls: Vec::new(),
            next_block: 0,
            next_function: 0,
        }
    }

    fn enter_function(&mut self) {
        let number = self.next_function;
        self.next_function += 1;
        self.functions.push(FunctionFrame {
            number,
            blocks: Vec::new(),
        });
    }

    fn leave_function(&mut self) {
        self.functions.pop();
    }

    fn enter_block(&mut self, opener: NodeId) {
        let number = self.next_block;
        self.next_block += 1;
        self.facts.block_openers.push(opener);
        if let Some(func) = self.functions.last_mut() {
            let root = func.blocks.is_empty();
            func.blocks.push(BlockFrame {
                number,
                root,
                names: FxHashMap::default(),
            });
        }
    }

    fn leave_block(&mut self) {
        if let Some(func) = self.functions.last_mut() {
            func.blocks.pop();
        }
    }

    fn declare(&mut self, name: &str, pos: Position) -> CompileResult<()> {
        let Some(func) = self.functions.last_mut() else {
            return Err(CompileError::internal("declaration outside of a function"));
        };
        let function = func.number;
        let Some(block) = func.blocks.last_mut() else {
            return Err(CompileError::internal("declaration outside of a block"));
        };
        if block.names.contains_key(name) {
            return Err(CompileError::duplicate(name, pos));
        }

        block.names.insert(name.to_string(), self.decls.len());
        self.decls.push(DeclInfo {
            key: DeclKey::new(name, block.number),
            function,
            root_block: block.root,
            captured: false,
        });
        Ok(())
    }

    fn resolve(&mut self, id: NodeId, name: &str) {
        let current = self.functions.len().saturating_sub(1);
        for (level, func) in self.functions.iter().enumerate().rev() {
            for block in func.blocks.iter().rev() {
                let Some(&idx) = block.names.get(name) else {
                    continue;
                };
                let decl = &mut self.decls[idx];
                let binding = if level == current {
                    Binding::Local(decl.key.clone())
                } else {
                    decl.captured = true;
                    Binding::Captured {
                        decl: decl.key.clone(),
                        function: decl.function,
                    }
                };
                self.facts.bindings.insert(id, binding);
                return;
            }
        }
        self.facts.bindings.insert(id, Binding::Global);
    }

    fn scoped(&mut self, node: &Node) -> CompileResult<()> {
        self.enter_block(node.id);
        for stmt in node.as_statements() {
            self.statement(stmt)?;
        }
        self.leave_block();
        Ok(())
    }

    fn catch_clause(&mut self, handler: &CatchClause) -> CompileResult<()> {
        self.enter_block(handler.body.id);
        if let Some(param) = &handler.param {
            self.declare(param, handler.body.pos)?;
        }
        for stmt in handler.body.as_statements() {
            self.statement(stmt)?;
        }
        self.leave_block();
        Ok(())
    }

    /// Named functions in statement position declare their name in the
    /// enclosing block; function expressions bind nothing outside.
    fn function(&mut self, node: &Node, declare_name: bool) -> CompileResult<()> {
        let NodeKind::Function { name, params, body } = &node.kind else {
            return Err(CompileError::internal("expected a Function node"));
        };
        if let (true, Some(name)) = (declare_name, name) {
            self.declare(name, node.pos)?;
        }
        self.enter_function();
        self.enter_block(node.id);
        for param in params {
            self.declare(param, node.pos)?;
        }
        for stmt in body.as_statements() {
            self.statement(stmt)?;
        }
        self.leave_block();
        self.leave_function();
        Ok(())
    }

    fn statement(&mut self, node: &Node) -> CompileResult<()> {
        match &node.kind {
            NodeKind::Chunk { .. } => Err(CompileError::internal("nested Chunk node")),
            NodeKind::Block { .. } => self.scoped(node),
            NodeKind::If {
                test,
                consequent,
                alternate,
            } => {
                self.expression(test)?;
                self.scoped(consequent)?;
                if let Some(alternate) = alternate {
                    self.scoped(alternate)?;
                }
                Ok(())
            }
            NodeKind::For {
                init,
                test,
                update,
                body,
            } => {
                self.enter_block(node.id);
                if let Some(init) = init {
                    self.statement(init)?;
                }
                if let Some(test) = test {
                    self.expression(test)?;
                }
                self.scoped(body)?;
                for expr in update {
                    self.expression(expr)?;
                }
                self.leave_block();
                Ok(())
            }
            NodeKind::While { test, body } => {
                self.expression(test)?;
                self.scoped(body)
            }
            NodeKind::DoWhile { body, test } => {
                self.scoped(body)?;
                self.expression(test)
            }
            NodeKind::Try {
                block,
                handler,
                finalizer,
            } => {
                self.scoped(block)?;
                if let Some(handler) = handler {
                    self.catch_clause(handler)?;
                }
                if let Some(finalizer) = finalizer {
                    self.scoped(finalizer)?;
                }
                Ok(())
            }
            NodeKind::Throw { argument } | NodeKind::Return { argument } => match argument {
                Some(argument) => self.expression(argument),
                None => Ok(()),
            },
            NodeKind::Break | NodeKind::Continue => Ok(()),
            NodeKind::Function { .. } => self.function(node, true),
            NodeKind::Variable { name, init } => {
                self.declare(name, node.pos)?;
                match init {
                    Some(init) => self.expression(init),
                    None => Ok(()),
                }
            }
            NodeKind::VariableList { declarations } => {
                for decl in declarations {
                    self.statement(decl)?;
                }
                Ok(())
            }
            _ => self.expression(node),
        }
    }

    fn expression(&mut self, node: &Node) -> CompileResult<()> {
        match &node.kind {
            NodeKind::Identifier { name, .. } => {
                self.resolve(node.id, name);
                Ok(())
            }
            NodeKind::Function { .. } => self.function(node, false),
            NodeKind::Assign { target, value, .. } => match &target.kind {
                NodeKind::Member {
                    object, property, ..
                } => {
                    self.expression(object)?;
                    self.expression(property)?;
                    self.expression(value)
                }
                _ => {
                    self.expression(value)?;
                    self.expression(target)
                }
            },
            NodeKind::Object { properties } => {
                for prop in sorted_properties(properties) {
                    self.expression(&prop.value)?;
                }
                Ok(())
            }
            NodeKind::Binary { .. }
            | NodeKind::Unary { .. }
            | NodeKind::Ternary { .. }
            | NodeKind::Member { .. }
            | NodeKind::Call { .. }
            | NodeKind::Array { .. }
            | NodeKind::Sequence { .. } => {
                for child in node.children() {
                    self.expression(child)?;
                }
                Ok(())
            }
            NodeKind::Literal { .. } => Ok(()),
            _ => Err(CompileError::internal(format!(
                "statement node {:?} in expression position",
                node.id
            ))),
        }
    }

    fn finish(mut self) -> LexicalFacts {
        if self.features.closures {
            for decl in self.decls.iter().filter(|d| d.captured) {
                let layout = if self.features.block_contexts && !decl.root_block {
                    self.facts.block_contexts.entry(decl.key.block).or_default()
                } else {
                    self.facts
                        .function_contexts
                        .entry(decl.function)
                        .or_default()
                };
                let slot = layout.push(decl.key.clone());
                trace!(name = %decl.key.name, block = decl.key.block, slot, "captured declaration");
            }
        }
        self.facts.function_count = self.next_function;
        self.facts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstBuilder, BinaryOp};
    use crate::version::SdkVersion;

    fn newest() -> Features {
        Features::for_version(SdkVersion::NEWEST)
    }

    #[test]
    fn test_local_and_global() {
        let mut b = AstBuilder::new();
        let one = b.number(1.0);
        let decl = b.var("x", Some(one));
        let x = b.ident("x");
        let x_id = x.id;
        let y = b.ident("y");
        let y_id = y.id;
        let sum = b.binary(BinaryOp::Add, x, y);
        let chunk = b.chunk(vec![decl, sum]);

        let facts = LexicalFacts::analyze(&chunk, &newest()).unwrap();
        assert_eq!(
            facts.binding(x_id),
            Some(&Binding::Local(DeclKey::new("x", 0)))
        );
        assert_eq!(facts.binding(y_id), Some(&Binding::Global));
        assert!(facts.function_context(0).is_none());
        assert_eq!(facts.function_count(), 1);
    }

    #[test]
    fn test_captured_param_gets_function_slot() {
        // function f(a) { function g() { return a; } return g; }
        let mut b = AstBuilder::new();
        let a = b.ident("a");
        let a_id = a.id;
        let ret_a = b.ret(Some(a));
        let g = b.function(Some("g"), &[], vec![ret_a]);
        let g_ref = b.ident("g");
        let ret_g = b.ret(Some(g_ref));
        let f = b.function(Some("f"), &["a"], vec![g, ret_g]);
        let chunk = b.chunk(vec![f]);

        let facts = LexicalFacts::analyze(&chunk, &newest()).unwrap();
        let decl = DeclKey::new("a", 1);
        assert_eq!(
            facts.binding(a_id),
            Some(&Binding::Captured {
                decl: decl.clone(),
                function: 1
            })
        );
        assert_eq!(facts.function_context(1).unwrap().slot_of(&decl), Some(1));
        assert!(facts.function_context(2).is_none());
        assert_eq!(facts.function_count(), 3);
        assert_eq!(facts.block_count(), 3);
    }

    #[test]
    fn test_block_context_only_with_block_contexts() {
        // { let x = 1; function h() { return x; } }
        let build = || {
            let mut b = AstBuilder::new();
            let one = b.number(1.0);
            let decl = b.var("x", Some(one));
            let x = b.ident("x");
            let ret = b.ret(Some(x));
            let h = b.function(Some("h"), &[], vec![ret]);
            let block = b.block(vec![decl, h]);
            b.chunk(vec![block])
        };

        let newest = LexicalFacts::analyze(&build(), &newest()).unwrap();
        assert!(newest.block_context(1).is_some());
        assert!(newest.function_context(0).is_none());

        let old = Features::for_version(SdkVersion::new(2, 0, 0));
        let facts = LexicalFacts::analyze(&build(), &old).unwrap();
        assert!(facts.block_context(1).is_none());
        assert_eq!(
            facts
                .function_context(0)
                .unwrap()
                .slot_of(&DeclKey::new("x", 1)),
            Some(1)
        );
    }

    #[test]
    fn test_duplicate_declaration() {
        let mut b = AstBuilder::new();
        let first = b.var("x", None);
        b.at_line(2);
        let second = b.var("x", None);
        let chunk = b.chunk(vec![first, second]);

        let err = LexicalFacts::analyze(&chunk, &newest()).unwrap_err();
        assert!(matches!(
            err,
            CompileError::DuplicateDeclaration { ref name, line: 2, .. } if name == "x"
        ));
    }

    #[test]
    fn test_shadowing_in_nested_block_is_allowed() {
        let mut b = AstBuilder::new();
        let outer = b.var("x", None);
        let inner = b.var("x", None);
        let block = b.block(vec![inner]);
        let chunk = b.chunk(vec![outer, block]);
        assert!(LexicalFacts::analyze(&chunk, &newest()).is_ok());
    }

    #[test]
    fn test_legacy_has_no_layouts() {
        let mut b = AstBuilder::new();
        let decl = b.var("x", None);
        let x = b.ident("x");
        let ret = b.ret(Some(x));
        let f = b.function(None, &[], vec![ret]);
        let chunk = b.chunk(vec![decl, f]);

        let legacy = Features::for_version(SdkVersion::new(1, 0, 0));
        let facts = LexicalFacts::analyze(&chunk, &legacy).unwrap();
        assert!(facts.function_context(0).is_none());
    }

    #[test]
    fn test_block_openers_are_preorder() {
        let mut b = AstBuilder::new();
        let t = b.bool(true);
        let then = b.block(vec![]);
        let then_id = then.id;
        let other = b.block(vec![]);
        let other_id = other.id;
        let stmt = b.if_(t, then, Some(other));
        let chunk = b.chunk(vec![stmt]);

        let facts = LexicalFacts::analyze(&chunk, &newest()).unwrap();
        assert_eq!(facts.block_opener(0), Some(chunk.id));
        assert_eq!(facts.block_opener(1), Some(then_id));
        assert_eq!(facts.block_opener(2), Some(other_id));
    }

    #[test]
    fn test_root_must_be_chunk() {
        let mut b = AstBuilder::new();
        let x = b.ident("x");
        assert!(matches!(
            LexicalFacts::analyze(&x, &newest()),
            Err(CompileError::Internal(_))
        ));
    }
}
