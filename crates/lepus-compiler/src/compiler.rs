//! Main compiler implementation

use lepus_bytecode::{CompiledUnit, Instruction, JumpOffset, LineCol, Opcode, Register};
use std::collections::BTreeMap;
use tracing::debug;

use crate::analysis::{Binding, DeclKey, FunctionNumber, LexicalFacts};
use crate::ast::{
    AssignOp, BinaryOp, CatchClause, Literal, Node, NodeKind, Position, UnaryOp, Update,
    sorted_properties,
};
use crate::closure::{Capture, CaptureLocation, ClosureStrategy, strategy_for};
use crate::codegen::CodeGen;
use crate::control::{ChainLink, LoopJump};
use crate::error::{CompileError, CompileResult};
use crate::options::CompileOptions;
use crate::scope::NameBinding;
use crate::version::{Features, SdkVersion};

/// Compile a `Chunk` tree with the given options
pub fn compile(ast: &Node, options: &CompileOptions) -> CompileResult<CompiledUnit> {
    Compiler::new(options.clone()).compile(ast)
}

/// AST to bytecode compiler
///
/// One compiler compiles one unit. The closure scheme and every
/// version-gated feature are fixed at construction from the target version.
#[derive(Debug)]
pub struct Compiler {
    codegen: CodeGen,
    strategy: Box<dyn ClosureStrategy>,
    facts: LexicalFacts,
    features: Features,
    options: CompileOptions,
}

impl Compiler {
    /// Create a new compiler
    pub fn new(options: CompileOptions) -> Self {
        let features = Features::for_version(options.sdk_version);
        Self {
            codegen: CodeGen::new(),
            strategy: strategy_for(&features),
            facts: LexicalFacts::new(),
            features,
            options,
        }
    }

    /// Analyze and compile a `Chunk` tree
    ///
    /// A tree with repeated node ids (for example a JSON dump without ids)
    /// is renumbered on a copy first.
    pub fn compile(self, ast: &Node) -> CompileResult<CompiledUnit> {
        if let Some(id) = ast.duplicate_id() {
            debug!(id = id.0, "renumbering tree with repeated node ids");
            let mut ast = ast.clone();
            ast.renumber();
            let facts = LexicalFacts::analyze(&ast, &self.features)?;
            return self.compile_with_facts(&ast, facts);
        }
        let facts = LexicalFacts::analyze(ast, &self.features)?;
        self.compile_with_facts(ast, facts)
    }

    /// Compile a `Chunk` tree using lexical facts computed elsewhere
    ///
    /// The facts are keyed by node id, so the tree's ids must be unique.
    pub fn compile_with_facts(
        mut self,
        ast: &Node,
        facts: LexicalFacts,
    ) -> CompileResult<CompiledUnit> {
        let NodeKind::Chunk { body } = &ast.kind else {
            return Err(CompileError::internal("expected a Chunk node at the root"));
        };
        if let Some(id) = ast.duplicate_id() {
            return Err(CompileError::internal(format!(
                "node id {} appears more than once",
                id.0
            )));
        }
        self.facts = facts;
        debug!(
            version = %self.features.target,
            scheme = %self.strategy.scheme(),
            "compiling unit"
        );

        self.at(ast, |this| {
            this.enter_block(ast)?;
            this.open_function_context(0)?;
            for stmt in body {
                this.compile_statement(stmt)?;
            }
            this.codegen.emit_return(None);
            Ok(())
        })?;

        let top_level_variables = self.top_level_variables();
        self.codegen.leave_block();
        let root = self.codegen.finish()?;

        let mut unit = CompiledUnit::new(self.features.target.to_string(), root);
        unit.top_level_variables = top_level_variables;
        debug!(
            functions = unit.function_count(),
            variables = unit.top_level_variables.len(),
            "compiled unit"
        );
        Ok(unit)
    }

    fn top_level_variables(&self) -> BTreeMap<String, u8> {
        self.codegen
            .current
            .blocks
            .root()
            .map(|block| {
                block
                    .names
                    .iter()
                    .filter_map(|(name, binding)| {
                        binding.register().map(|reg| (name.clone(), reg.index()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Run `f` with the line marker at `node`, restoring it afterwards
    fn at<T>(
        &mut self,
        node: &Node,
        f: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<T> {
        let previous = self
            .codegen
            .set_position(LineCol::new(node.pos.line, node.pos.column));
        let result = f(self);
        self.codegen.set_position(previous);
        result
    }

    /// Run `f`, releasing every register it allocated
    fn with_registers<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<T> {
        let mark = self.codegen.register_mark();
        let result = f(self);
        self.codegen.restore_registers(mark);
        result
    }

    fn require_closures(&self, construct: impl Into<String>, pos: Position) -> CompileResult<()> {
        if self.features.closures {
            Ok(())
        } else {
            Err(CompileError::unsupported(
                construct,
                SdkVersion::CLOSURES,
                self.features.target,
                pos,
            ))
        }
    }

    // ==================== Blocks and contexts ====================

    fn enter_block(&mut self, opener: &Node) -> CompileResult<()> {
        let number = self.codegen.enter_block(
            LineCol::new(opener.pos.line, opener.pos.column),
            LineCol::new(opener.end.line, opener.end.column),
        );
        if let Some(expected) = self.facts.block_opener(number)
            && expected != opener.id
        {
            return Err(CompileError::internal(format!(
                "block {number} opened by {:?}, lexical facts expect {expected:?}",
                opener.id
            )));
        }

        if self.features.closures && self.features.block_contexts {
            let layout = self
                .facts
                .block_context(number)
                .filter(|layout| !layout.is_empty())
                .cloned();
            if let Some(layout) = layout {
                self.codegen.open_block_context(layout)?;
            }
        }
        Ok(())
    }

    fn open_function_context(&mut self, number: FunctionNumber) -> CompileResult<()> {
        if !self.features.closures {
            return Ok(());
        }
        let layout = self
            .facts
            .function_context(number)
            .filter(|layout| !layout.is_empty())
            .cloned();
        if let Some(layout) = layout {
            self.codegen.open_function_context(layout)?;
        }
        Ok(())
    }

    /// Compile a branch or body in its own block
    fn compile_scoped(&mut self, node: &Node) -> CompileResult<()> {
        self.with_registers(|this| {
            this.enter_block(node)?;
            for stmt in node.as_statements() {
                this.compile_statement(stmt)?;
            }
            this.codegen.leave_block();
            Ok(())
        })
    }

    fn declare_local(&mut self, name: &str, pos: Position) -> CompileResult<Register> {
        let register = self.codegen.alloc_reg()?;
        self.codegen
            .declare(name, NameBinding::Local(register), pos)?;
        Ok(register)
    }

    /// Mirror a freshly initialized local into its context slot when captured
    fn publish(&mut self, name: &str, register: Register) -> CompileResult<()> {
        if !self.features.closures {
            return Ok(());
        }
        let block = self
            .codegen
            .current
            .blocks
            .current_block()
            .map(|b| b.number)
            .ok_or_else(|| CompileError::internal("declaration outside of a block"))?;
        let decl = DeclKey::new(name, block);
        if let Some((slot, context)) = self.codegen.own_context_slot(&decl) {
            self.codegen.rebind(
                name,
                NameBinding::Exported {
                    register,
                    slot,
                    context,
                },
            )?;
            self.codegen.emit(Instruction::StoreContextSlot {
                context,
                slot,
                src: register,
            });
        }
        Ok(())
    }

    // ==================== Statements ====================

    fn compile_statement(&mut self, node: &Node) -> CompileResult<()> {
        self.at(node, |this| match &node.kind {
            NodeKind::Chunk { .. } => Err(CompileError::internal("nested Chunk node")),
            NodeKind::Block { .. } => this.compile_scoped(node),
            NodeKind::If {
                test,
                consequent,
                alternate,
            } => this.compile_if(test, consequent, alternate.as_deref()),
            NodeKind::For {
                init,
                test,
                update,
                body,
            } => this.compile_for(node, init.as_deref(), test.as_deref(), update, body),
            NodeKind::While { test, body } => this.compile_while(node, test, body),
            NodeKind::DoWhile { body, test } => this.compile_do_while(node, body, test),
            NodeKind::Try {
                block,
                handler,
                finalizer,
            } => this.compile_try(node, block, handler.as_ref(), finalizer.as_deref()),
            NodeKind::Throw { argument } => this.compile_throw(node, argument.as_deref()),
            NodeKind::Break => this.codegen.emit_loop_jump(LoopJump::Break, node.pos),
            NodeKind::Continue => this.codegen.emit_loop_jump(LoopJump::Continue, node.pos),
            NodeKind::Return { argument } => this.compile_return(argument.as_deref()),
            NodeKind::Variable { name, init } => this.compile_variable(node, name, init.as_deref()),
            NodeKind::VariableList { declarations } => {
                for decl in declarations {
                    this.compile_statement(decl)?;
                }
                Ok(())
            }
            NodeKind::Function { .. } => this.compile_function(node, None, true).map(|_| ()),
            _ => this.compile_effect(node),
        })
    }

    /// Evaluate an expression for its side effects
    fn compile_effect(&mut self, node: &Node) -> CompileResult<()> {
        self.with_registers(|this| {
            let dst = this.codegen.alloc_reg()?;
            this.compile_expression(node, dst)
        })
    }

    fn compile_condition(&mut self, test: &Node) -> CompileResult<usize> {
        self.with_registers(|this| {
            let cond = this.codegen.alloc_reg()?;
            this.compile_expression(test, cond)?;
            Ok(this.codegen.emit_jump_if_false(cond))
        })
    }

    fn compile_if(
        &mut self,
        test: &Node,
        consequent: &Node,
        alternate: Option<&Node>,
    ) -> CompileResult<()> {
        let jump_else = self.compile_condition(test)?;
        self.compile_scoped(consequent)?;
        match alternate {
            Some(alternate) => {
                let jump_end = self.codegen.emit_jump();
                self.codegen.patch_jump_here(jump_else)?;
                self.compile_scoped(alternate)?;
                self.codegen.patch_jump_here(jump_end)
            }
            None => self.codegen.patch_jump_here(jump_else),
        }
    }

    fn compile_for(
        &mut self,
        node: &Node,
        init: Option<&Node>,
        test: Option<&Node>,
        update: &[Node],
        body: &Node,
    ) -> CompileResult<()> {
        self.with_registers(|this| {
            this.enter_block(node)?;
            if let Some(init) = init {
                this.compile_statement(init)?;
            }

            this.codegen.enter_loop();
            let exit = match test {
                Some(test) => Some(this.compile_condition(test)?),
                None => None,
            };
            this.compile_scoped(body)?;
            this.codegen.set_continue_point()?;
            for expr in update {
                this.at(expr, |this| this.compile_effect(expr))?;
            }
            this.codegen.emit_loop_jump(LoopJump::BackEdge, node.pos)?;
            if let Some(exit) = exit {
                this.codegen.patch_jump_here(exit)?;
            }
            this.codegen.leave_loop()?;

            this.codegen.leave_block();
            Ok(())
        })
    }

    fn compile_while(&mut self, node: &Node, test: &Node, body: &Node) -> CompileResult<()> {
        self.codegen.enter_loop();
        let exit = self.compile_condition(test)?;
        self.compile_scoped(body)?;
        self.codegen.set_continue_point()?;
        self.codegen.emit_loop_jump(LoopJump::BackEdge, node.pos)?;
        self.codegen.patch_jump_here(exit)?;
        self.codegen.leave_loop()
    }

    fn compile_do_while(&mut self, node: &Node, body: &Node, test: &Node) -> CompileResult<()> {
        self.codegen.enter_loop();
        self.compile_scoped(body)?;
        self.codegen.set_continue_point()?;
        self.with_registers(|this| {
            let cond = this.codegen.alloc_reg()?;
            this.compile_expression(test, cond)?;
            // Skip the back edge that follows.
            this.codegen.emit(Instruction::JumpIfFalse {
                cond,
                offset: JumpOffset(2),
            });
            Ok(())
        })?;
        self.codegen.emit_loop_jump(LoopJump::BackEdge, node.pos)?;
        self.codegen.leave_loop()
    }

    fn compile_try(
        &mut self,
        node: &Node,
        block: &Node,
        handler: Option<&CatchClause>,
        finalizer: Option<&Node>,
    ) -> CompileResult<()> {
        self.require_closures("try statement", node.pos)?;

        self.codegen.enter_try();
        self.compile_scoped(block)?;
        self.codegen.emit_finally_jump()?;
        if let Some(handler) = handler {
            self.codegen.emit(Instruction::Catch);
            self.compile_catch(handler)?;
        }
        self.codegen.leave_try()?;

        if let Some(finalizer) = finalizer {
            self.compile_scoped(finalizer)?;
        }
        Ok(())
    }

    fn compile_catch(&mut self, handler: &CatchClause) -> CompileResult<()> {
        let body = &*handler.body;
        self.with_registers(|this| {
            this.enter_block(body)?;
            if let Some(param) = &handler.param {
                let register = this.declare_local(param, body.pos)?;
                this.codegen.emit(Instruction::SetCatchId { dst: register });
                this.publish(param, register)?;
            }
            for stmt in body.as_statements() {
                this.compile_statement(stmt)?;
            }
            this.codegen.leave_block();
            Ok(())
        })
    }

    fn compile_throw(&mut self, node: &Node, argument: Option<&Node>) -> CompileResult<()> {
        self.require_closures("throw statement", node.pos)?;
        let Some(argument) = argument else {
            return Ok(());
        };
        self.with_registers(|this| {
            let src = this.codegen.alloc_reg()?;
            this.compile_expression(argument, src)?;
            this.codegen.emit(Instruction::Throw { src });
            Ok(())
        })
    }

    fn compile_return(&mut self, argument: Option<&Node>) -> CompileResult<()> {
        self.with_registers(|this| {
            match argument {
                Some(argument) => {
                    let src = this.codegen.alloc_reg()?;
                    this.compile_expression(argument, src)?;
                    this.codegen.emit_return(Some(src));
                }
                None => this.codegen.emit_return(None),
            }
            Ok(())
        })
    }

    fn compile_variable(&mut self, node: &Node, name: &str, init: Option<&Node>) -> CompileResult<()> {
        let register = self.declare_local(name, node.pos)?;
        match init {
            Some(init) => self.compile_expression(init, register)?,
            None => {
                self.codegen.emit(Instruction::LoadUndefined { dst: register });
            }
        }
        self.publish(name, register)
    }

    /// Compile a function literal into `dst` (or a fresh register)
    fn compile_function(
        &mut self,
        node: &Node,
        dst: Option<Register>,
        declare_name: bool,
    ) -> CompileResult<Register> {
        let NodeKind::Function { name, params, body } = &node.kind else {
            return Err(CompileError::internal("expected a Function node"));
        };
        let dst = match dst {
            Some(dst) => dst,
            None => self.codegen.alloc_reg()?,
        };
        let declared = match name {
            Some(name) if declare_name => {
                self.codegen
                    .declare(name, NameBinding::Local(dst), node.pos)?;
                Some(name.as_str())
            }
            _ => None,
        };

        let number = self
            .codegen
            .enter_function(name.as_deref().unwrap_or("<anonymous>"));
        self.enter_block(node)?;

        let mut param_registers = Vec::with_capacity(params.len());
        for param in params {
            param_registers.push(self.declare_local(param, node.pos)?);
        }
        self.codegen.current.param_count =
            u8::try_from(params.len()).map_err(|_| CompileError::register_overflow(node.pos))?;
        if self.features.closures {
            self.codegen.current.param_names = params.clone();
        }
        self.open_function_context(number)?;
        for (param, register) in params.iter().zip(param_registers) {
            self.publish(param, register)?;
        }

        for stmt in body.as_statements() {
            self.compile_statement(stmt)?;
        }
        self.codegen.emit_return(None);
        self.codegen.leave_block();
        let func = self.codegen.exit_function()?;

        self.codegen.emit(Instruction::Closure { dst, func });
        if let Some(name) = declared {
            self.publish(name, dst)?;
        }
        Ok(dst)
    }

    // ==================== Expressions ====================

    /// Compile an expression, leaving its value in `dst`
    fn compile_expression(&mut self, node: &Node, dst: Register) -> CompileResult<()> {
        self.at(node, |this| match &node.kind {
            NodeKind::Literal { value } => this.compile_literal(value, dst),
            NodeKind::Identifier { name, update } => {
                this.compile_identifier(node, name, *update, dst)
            }
            NodeKind::Function { .. } => this.compile_function(node, Some(dst), false).map(|_| ()),
            NodeKind::Assign { op, target, value } => {
                this.compile_assign(node, *op, target, value, dst)
            }
            NodeKind::Binary { op, left, right } => this.compile_binary(node, *op, left, right, dst),
            NodeKind::Unary { op, argument } => this.compile_unary(node, *op, argument, dst),
            NodeKind::Ternary {
                test,
                consequent,
                alternate,
            } => this.compile_ternary(test, consequent, alternate, dst),
            NodeKind::Member {
                object,
                property,
                optional,
            } => this.compile_member(node, object, property, *optional, dst),
            NodeKind::Call {
                callee,
                arguments,
                optional,
            } => this.compile_call(node, callee, arguments, *optional, dst),
            NodeKind::Object { .. } => this.compile_object(node, dst),
            NodeKind::Array { elements } => this.compile_array(elements, dst),
            NodeKind::Sequence { expressions } => this.compile_sequence(expressions, dst),
            _ => Err(CompileError::internal(format!(
                "statement node {:?} in expression position",
                node.id
            ))),
        })
    }

    fn compile_literal(&mut self, value: &Literal, dst: Register) -> CompileResult<()> {
        let instruction = match value {
            Literal::Number(n) => Instruction::LoadConst {
                dst,
                idx: self.codegen.add_number(*n),
            },
            Literal::String(s) => Instruction::LoadConst {
                dst,
                idx: self.codegen.add_string(s),
            },
            Literal::Bool(b) => Instruction::LoadConst {
                dst,
                idx: self.codegen.add_bool(*b),
            },
            Literal::RegExp { pattern, flags } => Instruction::LoadConst {
                dst,
                idx: self.codegen.add_regexp(pattern, flags),
            },
            Literal::Null => Instruction::LoadNull { dst },
            Literal::Undefined => Instruction::LoadUndefined { dst },
        };
        self.codegen.emit(instruction);
        Ok(())
    }

    fn binding_of(&self, node: &Node) -> CompileResult<Binding> {
        self.facts.binding(node.id).cloned().ok_or_else(|| {
            CompileError::internal(format!("no binding recorded for identifier {:?}", node.id))
        })
    }

    fn local_binding(&self, node: &Node, name: &str) -> CompileResult<NameBinding> {
        self.codegen
            .lookup_local(name)
            .ok_or_else(|| CompileError::unresolved(name, node.pos))
    }

    fn resolve_capture(
        &mut self,
        node: &Node,
        name: &str,
        decl: &DeclKey,
        function: FunctionNumber,
    ) -> CompileResult<CaptureLocation> {
        let capture = Capture {
            name,
            decl,
            function,
            pos: node.pos,
        };
        self.strategy.resolve_capture(&mut self.codegen, &capture)
    }

    fn compile_identifier(
        &mut self,
        node: &Node,
        name: &str,
        update: Option<Update>,
        dst: Register,
    ) -> CompileResult<()> {
        match self.binding_of(node)? {
            Binding::Local(_) => match self.local_binding(node, name)? {
                NameBinding::Local(register) => self.load_local(register, update, dst),
                NameBinding::Exported {
                    register,
                    slot,
                    context,
                } => {
                    self.codegen.emit(Instruction::LoadContextSlot {
                        dst: register,
                        slot,
                        context,
                    });
                    self.load_local(register, update, dst)?;
                    if update.is_some() {
                        self.codegen.emit(Instruction::StoreContextSlot {
                            context,
                            slot,
                            src: register,
                        });
                    }
                    Ok(())
                }
                NameBinding::Captured { .. } => Err(CompileError::internal(format!(
                    "{name} resolved to a capture cache entry"
                ))),
            },
            Binding::Captured { decl, function } => {
                let location = self.resolve_capture(node, name, &decl, function)?;
                self.load_capture(location, update, dst)
            }
            Binding::Global => {
                if update.is_some() {
                    return Err(CompileError::InvalidAssignmentTarget {
                        line: node.pos.line,
                        column: node.pos.column,
                    });
                }
                self.load_global(node, name, dst)
            }
        }
    }

    fn step(update: Update, reg: Register) -> Instruction {
        if update.is_increment() {
            Instruction::Inc { reg }
        } else {
            Instruction::Dec { reg }
        }
    }

    fn emit_move(&mut self, dst: Register, src: Register) {
        if dst != src {
            self.codegen.emit(Instruction::Move { dst, src });
        }
    }

    fn load_local(
        &mut self,
        register: Register,
        update: Option<Update>,
        dst: Register,
    ) -> CompileResult<()> {
        match update {
            None => self.emit_move(dst, register),
            Some(update) if update.is_prefix() => {
                self.codegen.emit(Self::step(update, register));
                self.emit_move(dst, register);
            }
            Some(update) => {
                self.emit_move(dst, register);
                self.codegen.emit(Self::step(update, register));
            }
        }
        Ok(())
    }

    fn load_capture(
        &mut self,
        location: CaptureLocation,
        update: Option<Update>,
        dst: Register,
    ) -> CompileResult<()> {
        let Some(update) = update else {
            return self
                .strategy
                .emit_capture_read(&mut self.codegen, location, dst);
        };
        self.with_registers(|this| {
            let tmp = this.codegen.alloc_reg()?;
            this.strategy
                .emit_capture_read(&mut this.codegen, location, tmp)?;
            if update.is_prefix() {
                this.codegen.emit(Self::step(update, tmp));
                this.emit_move(dst, tmp);
            } else {
                this.emit_move(dst, tmp);
                this.codegen.emit(Self::step(update, tmp));
            }
            this.strategy
                .emit_capture_write(&mut this.codegen, location, tmp)
        })
    }

    fn load_global(&mut self, node: &Node, name: &str, dst: Register) -> CompileResult<()> {
        let instruction = if let Some(idx) = self.options.globals.search(name) {
            Instruction::GetGlobal { dst, idx }
        } else if name == "globalThis" {
            Instruction::LoadGlobalThis { dst }
        } else if name == "lynx" && self.features.lynx_global {
            Instruction::LoadLynx { dst }
        } else if let Some(idx) = self
            .options
            .builtins
            .search(name)
            .filter(|_| self.features.builtins)
        {
            Instruction::GetBuiltin { dst, idx }
        } else {
            return Err(CompileError::unresolved(name, node.pos));
        };
        self.codegen.emit(instruction);
        Ok(())
    }

    fn is_global_identifier(&self, node: &Node) -> bool {
        matches!(node.kind, NodeKind::Identifier { .. })
            && matches!(self.facts.binding(node.id), Some(Binding::Global))
    }

    fn binary_opcode(&self, op: BinaryOp) -> Option<Opcode> {
        Some(match op {
            BinaryOp::Add => Opcode::Add,
            BinaryOp::Sub => Opcode::Sub,
            BinaryOp::Mul => Opcode::Mul,
            BinaryOp::Div => Opcode::Div,
            BinaryOp::Mod => Opcode::Mod,
            BinaryOp::Pow => Opcode::Pow,
            BinaryOp::BitAnd => Opcode::BitAnd,
            BinaryOp::BitOr => Opcode::BitOr,
            BinaryOp::BitXor => Opcode::BitXor,
            BinaryOp::Eq => Opcode::Eq,
            BinaryOp::Ne => Opcode::Ne,
            BinaryOp::StrictEq if self.features.closures => Opcode::StrictEq,
            BinaryOp::StrictEq => Opcode::Eq,
            BinaryOp::StrictNe if self.features.closures => Opcode::StrictNe,
            BinaryOp::StrictNe => Opcode::Ne,
            BinaryOp::Lt => Opcode::Lt,
            BinaryOp::Le => Opcode::Le,
            BinaryOp::Gt => Opcode::Gt,
            BinaryOp::Ge => Opcode::Ge,
            BinaryOp::And => Opcode::And,
            BinaryOp::Or => Opcode::Or,
            BinaryOp::Nullish => return None,
        })
    }

    fn emit_binary(
        &mut self,
        op: BinaryOp,
        dst: Register,
        lhs: Register,
        rhs: Register,
    ) -> CompileResult<()> {
        let instruction = self
            .binary_opcode(op)
            .and_then(|opcode| Instruction::binary(opcode, dst, lhs, rhs))
            .ok_or_else(|| {
                CompileError::internal(format!("operator {} has no binary opcode", op.symbol()))
            })?;
        self.codegen.emit(instruction);
        Ok(())
    }

    /// Reject operators the legacy VM lacks; `??` is rejected rather than lowered to `||`
    fn check_operator(&self, op: BinaryOp, spelling: &str, pos: Position) -> CompileResult<()> {
        match op {
            BinaryOp::Pow
            | BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
            | BinaryOp::Nullish => self.require_closures(format!("operator {spelling}"), pos),
            _ => Ok(()),
        }
    }

    fn compile_binary(
        &mut self,
        node: &Node,
        op: BinaryOp,
        left: &Node,
        right: &Node,
        dst: Register,
    ) -> CompileResult<()> {
        self.check_operator(op, op.symbol(), node.pos)?;
        self.with_registers(|this| {
            let lhs = this.codegen.alloc_reg()?;
            this.compile_expression(left, lhs)?;
            match op {
                BinaryOp::And | BinaryOp::Or | BinaryOp::Nullish if this.features.closures => {
                    this.compile_short_circuit(op, lhs, right, dst)
                }
                _ => {
                    let rhs = this.codegen.alloc_reg()?;
                    this.compile_expression(right, rhs)?;
                    this.emit_binary(op, dst, lhs, rhs)
                }
            }
        })
    }

    /// `&&`, `||` and `??`: the right side runs only when needed
    fn compile_short_circuit(
        &mut self,
        op: BinaryOp,
        lhs: Register,
        right: &Node,
        dst: Register,
    ) -> CompileResult<()> {
        let eval_right = match op {
            BinaryOp::And => vec![self.codegen.emit_jump_if_true(lhs)],
            BinaryOp::Or => vec![self.codegen.emit_jump_if_false(lhs)],
            BinaryOp::Nullish => {
                let tmp = self.codegen.alloc_reg()?;
                let mut sites = Vec::with_capacity(2);
                for load in [
                    Instruction::LoadNull { dst: tmp },
                    Instruction::LoadUndefined { dst: tmp },
                ] {
                    self.codegen.emit(load);
                    self.codegen.emit(Instruction::StrictEq {
                        dst: tmp,
                        lhs,
                        rhs: tmp,
                    });
                    sites.push(self.codegen.emit_jump_if_true(tmp));
                }
                sites
            }
            _ => {
                return Err(CompileError::internal(format!(
                    "operator {} does not short-circuit",
                    op.symbol()
                )));
            }
        };

        self.emit_move(dst, lhs);
        let jump_end = self.codegen.emit_jump();
        for site in eval_right {
            self.codegen.patch_jump_here(site)?;
        }
        self.compile_expression(right, dst)?;
        self.codegen.patch_jump_here(jump_end)
    }

    fn compile_unary(
        &mut self,
        node: &Node,
        op: UnaryOp,
        argument: &Node,
        dst: Register,
    ) -> CompileResult<()> {
        if matches!(op, UnaryOp::Plus | UnaryOp::BitNot) {
            self.require_closures(format!("unary operator {}", op.symbol()), node.pos)?;
        }
        self.compile_expression(argument, dst)?;
        let opcode = match op {
            UnaryOp::Neg => Opcode::Neg,
            UnaryOp::Plus => Opcode::ToNumber,
            UnaryOp::Not => Opcode::Not,
            UnaryOp::BitNot => Opcode::BitNot,
            UnaryOp::TypeOf => Opcode::TypeOf,
        };
        let instruction = Instruction::unary(opcode, dst)
            .ok_or_else(|| CompileError::internal(format!("{opcode} is not unary")))?;
        self.codegen.emit(instruction);
        Ok(())
    }

    fn compile_ternary(
        &mut self,
        test: &Node,
        consequent: &Node,
        alternate: &Node,
        dst: Register,
    ) -> CompileResult<()> {
        let jump_else = self.compile_condition(test)?;
        self.compile_expression(consequent, dst)?;
        let jump_end = self.codegen.emit_jump();
        self.codegen.patch_jump_here(jump_else)?;
        self.compile_expression(alternate, dst)?;
        self.codegen.patch_jump_here(jump_end)
    }

    fn compile_assign(
        &mut self,
        node: &Node,
        op: AssignOp,
        target: &Node,
        value: &Node,
        dst: Register,
    ) -> CompileResult<()> {
        if let Some(bin) = op.binary() {
            self.check_operator(bin, op.symbol(), node.pos)?;
        }

        match &target.kind {
            NodeKind::Member {
                object, property, ..
            } => self.with_registers(|this| {
                let table = this.codegen.alloc_reg()?;
                this.compile_expression(object, table)?;
                let key = this.codegen.alloc_reg()?;
                this.compile_expression(property, key)?;
                match op.binary() {
                    None => this.compile_expression(value, dst)?,
                    Some(bin) => {
                        this.codegen.emit(Instruction::GetProp {
                            dst,
                            object: table,
                            key,
                        });
                        let rhs = this.codegen.alloc_reg()?;
                        this.compile_expression(value, rhs)?;
                        this.emit_binary(bin, dst, dst, rhs)?;
                    }
                }
                this.codegen.emit(Instruction::SetProp {
                    object: table,
                    key,
                    value: dst,
                });
                Ok(())
            }),
            NodeKind::Identifier { name, update: None } => {
                self.compile_expression(value, dst)?;
                let result = self.write_identifier(target, name, op, dst)?;
                self.emit_move(dst, result);
                Ok(())
            }
            _ => Err(CompileError::InvalidAssignmentTarget {
                line: target.pos.line,
                column: target.pos.column,
            }),
        }
    }

    /// Store `src` into an identifier; returns the register holding the new value
    fn write_identifier(
        &mut self,
        target: &Node,
        name: &str,
        op: AssignOp,
        src: Register,
    ) -> CompileResult<Register> {
        match self.binding_of(target)? {
            Binding::Local(_) => {
                let binding = self.local_binding(target, name)?;
                let Some(register) = binding.register() else {
                    return Err(CompileError::internal(format!(
                        "{name} resolved to a capture cache entry"
                    )));
                };
                let exported = match binding {
                    NameBinding::Exported { slot, context, .. } => Some((slot, context)),
                    _ => None,
                };

                let result = match op.binary() {
                    None => {
                        self.emit_move(register, src);
                        src
                    }
                    Some(bin) => {
                        if let Some((slot, context)) = exported {
                            self.codegen.emit(Instruction::LoadContextSlot {
                                dst: register,
                                slot,
                                context,
                            });
                        }
                        self.emit_binary(bin, register, register, src)?;
                        register
                    }
                };
                if let Some((slot, context)) = exported {
                    self.codegen.emit(Instruction::StoreContextSlot {
                        context,
                        slot,
                        src: register,
                    });
                }
                Ok(result)
            }
            Binding::Captured { decl, function } => {
                let location = self.resolve_capture(target, name, &decl, function)?;
                if let Some(bin) = op.binary() {
                    self.with_registers(|this| {
                        let current = this.codegen.alloc_reg()?;
                        this.strategy
                            .emit_capture_read(&mut this.codegen, location, current)?;
                        this.emit_binary(bin, src, current, src)
                    })?;
                }
                self.strategy
                    .emit_capture_write(&mut self.codegen, location, src)?;
                Ok(src)
            }
            Binding::Global => Err(CompileError::unresolved(name, target.pos)),
        }
    }

    /// Emit the null and undefined checks of an optional link and record it
    fn begin_chain_link(
        &mut self,
        node: &Node,
        base: &Node,
        optional: bool,
        value: Register,
    ) -> CompileResult<()> {
        let mut link = ChainLink {
            optional,
            ..ChainLink::default()
        };
        if optional {
            self.with_registers(|this| {
                let tmp = this.codegen.alloc_reg()?;
                for load in [
                    Instruction::LoadNull { dst: tmp },
                    Instruction::LoadUndefined { dst: tmp },
                ] {
                    this.codegen.emit(load);
                    this.codegen.emit(Instruction::StrictEq {
                        dst: tmp,
                        lhs: value,
                        rhs: tmp,
                    });
                    link.load_sites.push(this.codegen.emit_load_placeholder());
                    link.jump_sites.push(this.codegen.emit_jump_if_true(tmp));
                }
                Ok(())
            })?;
        }
        self.codegen.current.chains.record(node.id, base.id, link)
    }

    fn finish_chain_link(&mut self, node: &Node, result: Register) -> CompileResult<()> {
        let end = self.codegen.current_index();
        self.codegen.current.chains.finish(node.id, end, result)
    }

    fn compile_member(
        &mut self,
        node: &Node,
        object: &Node,
        property: &Node,
        optional: bool,
        dst: Register,
    ) -> CompileResult<()> {
        self.with_registers(|this| {
            let table = this.codegen.alloc_reg()?;
            this.compile_expression(object, table)?;
            this.begin_chain_link(node, object, optional, table)?;
            let key = this.codegen.alloc_reg()?;
            this.compile_expression(property, key)?;
            this.codegen.emit(Instruction::GetProp {
                dst,
                object: table,
                key,
            });
            this.finish_chain_link(node, dst)
        })
    }

    /// Calls use consecutive registers: `this`, callee, arguments, then a
    /// copy of `this` when the callee is a method.
    fn compile_call(
        &mut self,
        node: &Node,
        callee: &Node,
        arguments: &[Node],
        optional: bool,
        dst: Register,
    ) -> CompileResult<()> {
        self.with_registers(|this| {
            let this_reg = this.codegen.alloc_reg()?;
            let callee_reg = this.codegen.alloc_reg()?;

            let method = match &callee.kind {
                NodeKind::Member {
                    object,
                    property,
                    optional,
                } if !this.is_global_identifier(object) => Some((&**object, &**property, *optional)),
                _ => None,
            };

            match method {
                Some((object, property, member_optional)) => this.at(callee, |this| {
                    this.with_registers(|this| {
                        this.compile_expression(object, this_reg)?;
                        this.begin_chain_link(callee, object, member_optional, this_reg)?;
                        let key = this.codegen.alloc_reg()?;
                        this.compile_expression(property, key)?;
                        this.codegen.emit(Instruction::GetProp {
                            dst: callee_reg,
                            object: this_reg,
                            key,
                        });
                        this.finish_chain_link(callee, callee_reg)
                    })
                })?,
                None => this.compile_expression(callee, callee_reg)?,
            }
            this.begin_chain_link(node, callee, optional, callee_reg)?;

            for argument in arguments {
                let register = this.codegen.alloc_reg()?;
                let mark = this.codegen.register_mark();
                this.compile_expression(argument, register)?;
                this.codegen.restore_registers(mark);
            }
            let mut argc = arguments.len();
            if method.is_some() {
                let copy = this.codegen.alloc_reg()?;
                this.codegen.emit(Instruction::Move {
                    dst: copy,
                    src: this_reg,
                });
                argc += 1;
            }

            this.codegen.emit(Instruction::Call {
                callee: callee_reg,
                argc: argc as u16,
                dst,
            });
            this.finish_chain_link(node, dst)
        })
    }

    fn compile_object(&mut self, node: &Node, dst: Register) -> CompileResult<()> {
        let NodeKind::Object { properties } = &node.kind else {
            return Err(CompileError::internal("expected an Object node"));
        };
        self.codegen.emit(Instruction::NewObject { dst });
        self.with_registers(|this| {
            let key = this.codegen.alloc_reg()?;
            let value = this.codegen.alloc_reg()?;
            for property in sorted_properties(properties) {
                let idx = this.codegen.add_string(&property.key);
                this.codegen.emit(Instruction::LoadConst { dst: key, idx });
                this.compile_expression(&property.value, value)?;
                this.codegen.emit(Instruction::SetProp {
                    object: dst,
                    key,
                    value,
                });
            }
            Ok(())
        })
    }

    /// Elements are evaluated into the registers following the array register
    fn compile_array(&mut self, elements: &[Node], dst: Register) -> CompileResult<()> {
        let adjacent = self.codegen.register_mark() == dst.index() as u16 + 1;
        self.with_registers(|this| {
            let base = if adjacent {
                dst
            } else {
                this.codegen.alloc_reg()?
            };
            for element in elements {
                let register = this.codegen.alloc_reg()?;
                let mark = this.codegen.register_mark();
                this.compile_expression(element, register)?;
                this.codegen.restore_registers(mark);
            }
            this.codegen.emit(Instruction::NewArray {
                dst: base,
                count: elements.len() as u16,
            });
            this.emit_move(dst, base);
            Ok(())
        })
    }

    fn compile_sequence(&mut self, expressions: &[Node], dst: Register) -> CompileResult<()> {
        let Some((last, rest)) = expressions.split_last() else {
            self.codegen.emit(Instruction::LoadUndefined { dst });
            return Ok(());
        };
        for expr in rest {
            self.compile_effect(expr)?;
        }
        self.compile_expression(last, dst)
    }
}
