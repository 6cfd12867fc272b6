//! Bytecode generation state
//!
//! [`CodeGen`] owns the function being generated and the stack of its
//! enclosing functions. It knows nothing about syntax: the compiler drives
//! it with instructions, blocks, loops and contexts.

use lepus_bytecode::{
    ConstantIndex, ConstantPool, Function, FunctionIndex, Instruction, JumpOffset, LineCol,
    Register, UpvalueDescriptor,
};
use tracing::{debug, trace};

use crate::analysis::{BlockNumber, ContextLayout, DeclKey, FunctionNumber};
use crate::ast::Position;
use crate::control::{LoopFrame, LoopJump, OptionalChains, PatchLedger, TryFrame};
use crate::error::{CompileError, CompileResult};
use crate::scope::{BlockTree, NameBinding};

/// Register allocator
///
/// Registers are handed out stack-wise; callers release everything above a
/// mark with [`RegisterAllocator::restore`].
#[derive(Debug, Default)]
pub struct RegisterAllocator {
    /// Next available register
    next: u16,
    /// Registers ever in use
    max: u16,
}

impl RegisterAllocator {
    /// Create a new register allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a register, or `None` past the last register id
    pub fn alloc(&mut self) -> Option<Register> {
        if self.next > Register::MAX as u16 {
            return None;
        }
        let reg = Register(self.next as u8);
        self.next += 1;
        self.max = self.max.max(self.next);
        Some(reg)
    }

    /// Get current position (for restoring later)
    pub fn position(&self) -> u16 {
        self.next
    }

    /// Release every register allocated after `pos`
    pub fn restore(&mut self, pos: u16) {
        self.next = pos;
    }

    /// Get maximum registers used
    pub fn max_used(&self) -> u16 {
        self.max
    }
}

/// A context visible to the code being generated
#[derive(Debug)]
pub struct ContextFrame {
    /// Nesting level of the function that created it
    pub level: usize,
    /// Slots of the context
    pub layout: ContextLayout,
    /// Register holding the context in its creating function
    pub register: Register,
}

/// Function being compiled
#[derive(Debug)]
pub struct FunctionState {
    /// Unit-unique function id
    pub id: u32,
    /// Pre-order function number
    pub number: FunctionNumber,
    /// Function name
    pub name: String,
    /// Instructions
    pub instructions: Vec<Instruction>,
    /// Source position of every instruction
    pub positions: Vec<LineCol>,
    /// Constant pool
    pub constants: ConstantPool,
    /// Register allocator
    pub registers: RegisterAllocator,
    /// Block tree
    pub blocks: BlockTree,
    /// Upvalue table (legacy closures)
    pub upvalues: Vec<UpvalueDescriptor>,
    /// Finished child functions
    pub children: Vec<Function>,
    /// Number of parameters
    pub param_count: u8,
    /// Parameter names
    pub param_names: Vec<String>,
    /// Enclosing loops
    pub loops: Vec<LoopFrame>,
    /// Enclosing try statements
    pub trys: Vec<TryFrame>,
    /// Unpatched placeholders
    pub patches: PatchLedger,
    /// Optional chains
    pub chains: OptionalChains,
    /// Function context register
    pub context: Option<Register>,
    /// Block contexts currently open
    pub open_block_contexts: usize,
}

impl FunctionState {
    /// Create a new function state
    pub fn new(id: u32, number: FunctionNumber, name: impl Into<String>) -> Self {
        Self {
            id,
            number,
            name: name.into(),
            instructions: Vec::new(),
            positions: Vec::new(),
            constants: ConstantPool::new(),
            registers: RegisterAllocator::new(),
            blocks: BlockTree::new(),
            upvalues: Vec::new(),
            children: Vec::new(),
            param_count: 0,
            param_names: Vec::new(),
            loops: Vec::new(),
            trys: Vec::new(),
            patches: PatchLedger::new(),
            chains: OptionalChains::new(),
            context: None,
            open_block_contexts: 0,
        }
    }

    /// Index of an upvalue by name
    pub fn upvalue_index(&self, name: &str) -> Option<u32> {
        self.upvalues
            .iter()
            .position(|u| u.name == name)
            .map(|i| i as u32)
    }

    /// Add an upvalue unless one of that name exists; returns its index
    pub fn add_upvalue(&mut self, name: &str, index: u32, from_parent_locals: bool) -> u32 {
        if let Some(existing) = self.upvalue_index(name) {
            return existing;
        }
        self.upvalues.push(UpvalueDescriptor {
            name: name.to_string(),
            index,
            from_parent_locals,
        });
        self.upvalues.len() as u32 - 1
    }

    /// Register of a local visible from the current block
    pub fn lookup_local(&self, name: &str) -> Option<Register> {
        self.blocks.lookup_local(name).and_then(NameBinding::register)
    }

    fn build(self) -> Function {
        Function::builder()
            .id(self.id)
            .name(self.name)
            .param_count(self.param_count)
            .param_names(self.param_names)
            .register_count(self.registers.max_used())
            .upvalues(self.upvalues)
            .instructions(self.instructions, self.positions)
            .constants(self.constants)
            .children(self.children)
            .scope(self.blocks.descriptor())
            .build()
    }
}

/// Code generator state
#[derive(Debug)]
pub struct CodeGen {
    /// Current function
    pub current: FunctionState,
    /// Enclosing functions, outermost first
    func_stack: Vec<FunctionState>,
    /// Contexts visible from the current point, outermost first
    frames: Vec<ContextFrame>,
    next_function_id: u32,
    next_function_number: FunctionNumber,
    next_block_number: BlockNumber,
    position: LineCol,
}

impl CodeGen {
    /// Create a new code generator positioned in the top-level function
    pub fn new() -> Self {
        Self {
            current: FunctionState::new(0, 0, "main"),
            func_stack: Vec::new(),
            frames: Vec::new(),
            next_function_id: 1,
            next_function_number: 1,
            next_block_number: 0,
            position: LineCol::default(),
        }
    }

    /// Nesting level of the current function (top level is 0)
    pub fn level(&self) -> usize {
        self.func_stack.len()
    }

    /// Function at a nesting level
    pub fn function_at(&self, level: usize) -> Option<&FunctionState> {
        if level == self.func_stack.len() {
            Some(&self.current)
        } else {
            self.func_stack.get(level)
        }
    }

    /// Function at a nesting level, mutably
    pub fn function_at_mut(&mut self, level: usize) -> Option<&mut FunctionState> {
        if level == self.func_stack.len() {
            Some(&mut self.current)
        } else {
            self.func_stack.get_mut(level)
        }
    }

    /// Position recorded for emitted instructions
    pub fn position(&self) -> LineCol {
        self.position
    }

    /// Move the line marker, returning the previous one
    pub fn set_position(&mut self, position: LineCol) -> LineCol {
        std::mem::replace(&mut self.position, position)
    }

    fn source_position(&self) -> Position {
        Position::new(self.position.line, self.position.column)
    }

    /// Emit an instruction, returning its index
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let idx = self.current.instructions.len();
        self.current.instructions.push(instruction);
        self.current.positions.push(self.position);
        idx
    }

    /// Get current instruction index
    pub fn current_index(&self) -> usize {
        self.current.instructions.len()
    }

    /// Allocate a register
    pub fn alloc_reg(&mut self) -> CompileResult<Register> {
        self.current
            .registers
            .alloc()
            .ok_or_else(|| CompileError::register_overflow(self.source_position()))
    }

    /// Allocation mark for [`CodeGen::restore_registers`]
    pub fn register_mark(&self) -> u16 {
        self.current.registers.position()
    }

    /// Release every register allocated after `mark`
    pub fn restore_registers(&mut self, mark: u16) {
        self.current.registers.restore(mark);
    }

    /// Add a number constant
    pub fn add_number(&mut self, n: f64) -> ConstantIndex {
        ConstantIndex(self.current.constants.add_number(n))
    }

    /// Add a string constant
    pub fn add_string(&mut self, s: &str) -> ConstantIndex {
        ConstantIndex(self.current.constants.add_string(s))
    }

    /// Add a boolean constant
    pub fn add_bool(&mut self, b: bool) -> ConstantIndex {
        ConstantIndex(self.current.constants.add_bool(b))
    }

    /// Add a regular expression constant
    pub fn add_regexp(&mut self, pattern: &str, flags: &str) -> ConstantIndex {
        ConstantIndex(self.current.constants.add_regexp(pattern, flags))
    }

    /// Emit an instruction whose operand is patched later
    pub fn emit_placeholder(&mut self, instruction: Instruction) -> usize {
        let idx = self.emit(instruction);
        self.current.patches.register(idx);
        idx
    }

    /// Emit a placeholder jump (returns index for patching)
    pub fn emit_jump(&mut self) -> usize {
        self.emit_placeholder(Instruction::Jump {
            offset: JumpOffset(0),
        })
    }

    /// Emit a placeholder conditional jump taken when `cond` is falsy
    pub fn emit_jump_if_false(&mut self, cond: Register) -> usize {
        self.emit_placeholder(Instruction::JumpIfFalse {
            cond,
            offset: JumpOffset(0),
        })
    }

    /// Emit a placeholder conditional jump taken when `cond` is truthy
    pub fn emit_jump_if_true(&mut self, cond: Register) -> usize {
        self.emit_placeholder(Instruction::JumpIfTrue {
            cond,
            offset: JumpOffset(0),
        })
    }

    /// Emit a `LoadUndefined` whose destination is patched later
    pub fn emit_load_placeholder(&mut self) -> usize {
        self.emit_placeholder(Instruction::LoadUndefined { dst: Register(0) })
    }

    /// Point a placeholder jump at `target`
    pub fn patch_jump(&mut self, site: usize, target: usize) -> CompileResult<()> {
        self.current.patches.resolve(site)?;
        let instruction = self
            .current
            .instructions
            .get_mut(site)
            .ok_or_else(|| CompileError::internal(format!("no instruction at {site}")))?;
        instruction.set_jump_offset(JumpOffset::between(site, target))?;
        trace!(site, target, "patched jump");
        Ok(())
    }

    /// Patch a placeholder jump to the current index
    pub fn patch_jump_here(&mut self, site: usize) -> CompileResult<()> {
        let here = self.current_index();
        self.patch_jump(site, here)
    }

    /// Point a placeholder load at `target`
    pub fn patch_load(&mut self, site: usize, target: Register) -> CompileResult<()> {
        self.current.patches.resolve(site)?;
        let instruction = self
            .current
            .instructions
            .get_mut(site)
            .ok_or_else(|| CompileError::internal(format!("no instruction at {site}")))?;
        instruction.set_load_target(target)?;
        trace!(site, %target, "patched load");
        Ok(())
    }

    /// Start a loop at the current index
    pub fn enter_loop(&mut self) {
        let head = self.current_index();
        let depth = self.current.open_block_contexts;
        self.current.loops.push(LoopFrame::new(head, depth));
    }

    /// Mark the current index as the innermost loop's continue point
    pub fn set_continue_point(&mut self) -> CompileResult<()> {
        let here = self.current_index();
        let frame = self
            .current
            .loops
            .last_mut()
            .ok_or_else(|| CompileError::internal("continue point outside of a loop"))?;
        frame.continue_point = Some(here);
        Ok(())
    }

    /// Emit a placeholder jump of `kind` for the innermost loop.
    ///
    /// `break` and `continue` first leave the block contexts opened inside
    /// the loop.
    pub fn emit_loop_jump(&mut self, kind: LoopJump, pos: Position) -> CompileResult<()> {
        let Some(depth) = self.current.loops.last().map(|l| l.context_depth) else {
            let statement = match kind {
                LoopJump::Break => "break",
                LoopJump::Continue => "continue",
                LoopJump::BackEdge => {
                    return Err(CompileError::internal("back edge outside of a loop"));
                }
            };
            return Err(CompileError::IllegalStatement {
                statement,
                line: pos.line,
                column: pos.column,
            });
        };

        if kind != LoopJump::BackEdge {
            for _ in depth..self.current.open_block_contexts {
                self.emit(Instruction::LeaveBlockScope);
            }
        }
        let site = self.emit_jump();
        if let Some(frame) = self.current.loops.last_mut() {
            frame.sites.push((kind, site));
        }
        Ok(())
    }

    /// Close the innermost loop, patching its jumps
    pub fn leave_loop(&mut self) -> CompileResult<()> {
        let frame = self
            .current
            .loops
            .pop()
            .ok_or_else(|| CompileError::internal("loop stack underflow"))?;
        let end = self.current_index();
        for (site, target) in frame.targets(end)? {
            self.patch_jump(site, target)?;
        }
        Ok(())
    }

    /// Start a try statement
    pub fn enter_try(&mut self) {
        self.current.trys.push(TryFrame::default());
    }

    /// Emit a placeholder jump to the innermost try's finally block
    pub fn emit_finally_jump(&mut self) -> CompileResult<()> {
        let site = self.emit_jump();
        let frame = self
            .current
            .trys
            .last_mut()
            .ok_or_else(|| CompileError::internal("finally jump outside of a try"))?;
        frame.finally_jumps.push(site);
        Ok(())
    }

    /// Close the innermost try, pointing its jumps at the current index
    pub fn leave_try(&mut self) -> CompileResult<()> {
        let frame = self
            .current
            .trys
            .pop()
            .ok_or_else(|| CompileError::internal("try stack underflow"))?;
        for site in frame.finally_jumps {
            self.patch_jump_here(site)?;
        }
        Ok(())
    }

    /// Open a block; returns its number
    pub fn enter_block(&mut self, start: LineCol, end: LineCol) -> BlockNumber {
        let number = self.next_block_number;
        self.next_block_number += 1;
        self.current.blocks.enter(number, start, end);
        trace!(block = number, function = self.current.id, "enter block");
        number
    }

    /// Close the current block, leaving its block context if it has one
    pub fn leave_block(&mut self) {
        let context = self.current.blocks.current_block().and_then(|b| b.context);
        if context.is_some() {
            self.emit(Instruction::LeaveBlockScope);
            self.frames.pop();
            self.current.open_block_contexts -= 1;
        }
        if let Some(idx) = self.current.blocks.exit() {
            trace!(block = idx, "leave block");
        }
    }

    /// Declare a name in the current block
    pub fn declare(&mut self, name: &str, binding: NameBinding, pos: Position) -> CompileResult<()> {
        if self.current.blocks.declare(name, binding) {
            Ok(())
        } else {
            Err(CompileError::duplicate(name, pos))
        }
    }

    /// Local or exported binding visible from the current block
    pub fn lookup_local(&self, name: &str) -> Option<NameBinding> {
        self.current.blocks.lookup_local(name)
    }

    /// Replace a visible local binding
    pub fn rebind(&mut self, name: &str, binding: NameBinding) -> CompileResult<()> {
        if self.current.blocks.rebind(name, binding) {
            Ok(())
        } else {
            Err(CompileError::internal(format!("{name} is not a local")))
        }
    }

    /// Capture cached in the current block
    pub fn cached_capture(&self, name: &str) -> Option<(u16, u16)> {
        self.current.blocks.cached_capture(name)
    }

    /// Cache a capture in the current block; a local of the same name wins
    pub fn cache_capture(&mut self, name: &str, slot: u16, depth: u16) -> CompileResult<()> {
        if self
            .current
            .blocks
            .declare(name, NameBinding::Captured { slot, depth })
        {
            Ok(())
        } else {
            Err(CompileError::internal(format!(
                "capture of {name} would shadow a local of the same block"
            )))
        }
    }

    /// Create and enter the current function's context
    pub fn open_function_context(&mut self, layout: ContextLayout) -> CompileResult<Register> {
        let register = self.alloc_reg()?;
        self.emit(Instruction::CreateContext {
            dst: register,
            size: layout.len() as u16,
        });
        self.emit(Instruction::PushContext { context: register });
        self.current.context = Some(register);
        self.frames.push(ContextFrame {
            level: self.level(),
            layout,
            register,
        });
        Ok(register)
    }

    /// Create a context for the current block
    pub fn open_block_context(&mut self, layout: ContextLayout) -> CompileResult<Register> {
        let register = self.alloc_reg()?;
        self.emit(Instruction::CreateBlockContext {
            dst: register,
            size: layout.len() as u16,
        });
        let block = self
            .current
            .blocks
            .current_block_mut()
            .ok_or_else(|| CompileError::internal("block context outside of a block"))?;
        block.context = Some(register);
        self.current.open_block_contexts += 1;
        self.frames.push(ContextFrame {
            level: self.level(),
            layout,
            register,
        });
        Ok(register)
    }

    /// Slot and context register of a declaration owned by the current function
    pub fn own_context_slot(&self, decl: &DeclKey) -> Option<(u16, Register)> {
        let level = self.level();
        self.frames
            .iter()
            .rev()
            .take_while(|f| f.level == level)
            .find_map(|f| f.layout.slot_of(decl).map(|slot| (slot, f.register)))
    }

    /// Slot and depth of a declaration owned by an enclosing function.
    ///
    /// Depth counts the enclosing contexts skipped, innermost first.
    pub fn enclosing_context_slot(&self, decl: &DeclKey) -> Option<(u16, u16)> {
        let level = self.level();
        self.frames
            .iter()
            .rev()
            .filter(|f| f.level < level)
            .enumerate()
            .find_map(|(depth, f)| f.layout.slot_of(decl).map(|slot| (slot, depth as u16)))
    }

    /// Leave every open context of the current function
    pub fn emit_context_exit(&mut self) {
        for _ in 0..self.current.open_block_contexts {
            self.emit(Instruction::LeaveBlockScope);
        }
        if self.current.context.is_some() {
            self.emit(Instruction::PopContext);
        }
    }

    /// Leave the current function's contexts and return `src`
    pub fn emit_return(&mut self, src: Option<Register>) {
        self.emit_context_exit();
        match src {
            Some(src) => self.emit(Instruction::Return { src }),
            None => self.emit(Instruction::ReturnUndefined),
        };
    }

    /// Start compiling a nested function; returns its number
    pub fn enter_function(&mut self, name: &str) -> FunctionNumber {
        let id = self.next_function_id;
        self.next_function_id += 1;
        let number = self.next_function_number;
        self.next_function_number += 1;

        let state = FunctionState::new(id, number, name);
        let parent = std::mem::replace(&mut self.current, state);
        self.func_stack.push(parent);
        debug!(id, name, level = self.level(), "enter function");
        number
    }

    /// Finish the current nested function and attach it to its parent
    pub fn exit_function(&mut self) -> CompileResult<FunctionIndex> {
        let level = self.level();
        self.seal()?;
        let parent = self
            .func_stack
            .pop()
            .ok_or_else(|| CompileError::internal("function stack underflow"))?;
        let func = std::mem::replace(&mut self.current, parent);
        self.frames.retain(|f| f.level < level);

        debug!(
            id = func.id,
            name = %func.name,
            instructions = func.instructions.len(),
            registers = func.registers.max_used(),
            "leave function"
        );
        let idx = FunctionIndex(self.current.children.len() as u32);
        self.current.children.push(func.build());
        Ok(idx)
    }

    /// Finish the top-level function
    pub fn finish(mut self) -> CompileResult<Function> {
        if !self.func_stack.is_empty() {
            return Err(CompileError::internal("unfinished nested function"));
        }
        self.seal()?;
        Ok(self.current.build())
    }

    /// Resolve optional chains and verify nothing is left unpatched
    fn seal(&mut self) -> CompileResult<()> {
        for patch in self.current.chains.complete()? {
            for site in patch.load_sites {
                self.patch_load(site, patch.result)?;
            }
            for site in patch.jump_sites {
                self.patch_jump(site, patch.end)?;
            }
        }
        self.current.patches.ensure_empty()
    }
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_allocator() {
        let mut alloc = RegisterAllocator::new();

        let r0 = alloc.alloc().unwrap();
        let r1 = alloc.alloc().unwrap();
        let mark = alloc.position();
        let r2 = alloc.alloc().unwrap();

        assert_eq!(r0.0, 0);
        assert_eq!(r1.0, 1);
        assert_eq!(r2.0, 2);
        assert_eq!(alloc.max_used(), 3);

        alloc.restore(mark);
        assert_eq!(alloc.alloc().unwrap().0, 2);
    }

    #[test]
    fn test_register_limit() {
        let mut alloc = RegisterAllocator::new();
        for i in 0..=255u16 {
            assert_eq!(alloc.alloc().unwrap().0 as u16, i);
        }
        assert!(alloc.alloc().is_none());
        assert_eq!(alloc.max_used(), 256);
    }

    #[test]
    fn test_overflow_reports_line() {
        let mut cg = CodeGen::new();
        cg.set_position(LineCol::new(7, 3));
        for _ in 0..256 {
            cg.alloc_reg().unwrap();
        }
        assert!(matches!(
            cg.alloc_reg(),
            Err(CompileError::RegisterOverflow {
                limit: 255,
                line: 7,
                column: 3
            })
        ));
    }

    #[test]
    fn test_loop_patching() {
        let mut cg = CodeGen::new();
        cg.enter_block(LineCol::default(), LineCol::default());
        cg.emit(Instruction::Nop);
        cg.enter_loop();
        cg.emit_loop_jump(LoopJump::Break, Position::default()).unwrap();
        cg.set_continue_point().unwrap();
        cg.emit_loop_jump(LoopJump::BackEdge, Position::default()).unwrap();
        cg.leave_loop().unwrap();
        cg.leave_block();

        assert_eq!(
            cg.current.instructions[1].jump_offset(),
            Some(JumpOffset(2))
        );
        assert_eq!(
            cg.current.instructions[2].jump_offset(),
            Some(JumpOffset(-1))
        );
        assert!(cg.finish().is_ok());
    }

    #[test]
    fn test_break_outside_loop() {
        let mut cg = CodeGen::new();
        assert!(matches!(
            cg.emit_loop_jump(LoopJump::Continue, Position::new(4, 2)),
            Err(CompileError::IllegalStatement {
                statement: "continue",
                line: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_unpatched_placeholder_fails_finish() {
        let mut cg = CodeGen::new();
        cg.emit_jump();
        assert!(matches!(cg.finish(), Err(CompileError::Internal(_))));
    }

    #[test]
    fn test_double_patch_fails() {
        let mut cg = CodeGen::new();
        let site = cg.emit_jump();
        cg.patch_jump_here(site).unwrap();
        assert!(cg.patch_jump_here(site).is_err());
    }

    #[test]
    fn test_break_leaves_block_contexts() {
        let mut cg = CodeGen::new();
        cg.enter_block(LineCol::default(), LineCol::default());
        cg.enter_loop();
        cg.enter_block(LineCol::default(), LineCol::default());
        let mut layout = ContextLayout::new();
        layout.push(DeclKey::new("x", 1));
        cg.open_block_context(layout).unwrap();
        cg.emit_loop_jump(LoopJump::Break, Position::default()).unwrap();
        cg.leave_block();
        cg.leave_loop().unwrap();
        cg.leave_block();

        let ops: Vec<_> = cg.current.instructions.iter().map(|i| i.opcode()).collect();
        use lepus_bytecode::Opcode;
        assert_eq!(
            ops,
            vec![
                Opcode::CreateBlockContext,
                Opcode::LeaveBlockScope,
                Opcode::Jump,
                Opcode::LeaveBlockScope,
            ]
        );
    }

    #[test]
    fn test_nested_function_is_attached_to_parent() {
        let mut cg = CodeGen::new();
        cg.enter_block(LineCol::default(), LineCol::default());
        let number = cg.enter_function("inner");
        assert_eq!(number, 1);
        assert_eq!(cg.level(), 1);
        cg.enter_block(LineCol::default(), LineCol::default());
        cg.emit_return(None);
        cg.leave_block();
        let idx = cg.exit_function().unwrap();
        assert_eq!(idx, FunctionIndex(0));
        cg.leave_block();

        let root = cg.finish().unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name, "inner");
        assert_eq!(root.children[0].id, 1);
    }

    #[test]
    fn test_cached_capture_never_replaces_local() {
        let mut cg = CodeGen::new();
        cg.enter_block(LineCol::default(), LineCol::default());
        cg.cache_capture("a", 1, 0).unwrap();
        assert_eq!(cg.cached_capture("a"), Some((1, 0)));

        let reg = cg.alloc_reg().unwrap();
        cg.declare("b", NameBinding::Local(reg), Position::default())
            .unwrap();
        assert!(matches!(
            cg.cache_capture("b", 2, 0),
            Err(CompileError::Internal(_))
        ));
        assert_eq!(cg.cached_capture("b"), None);
    }

    #[test]
    fn test_enclosing_slot_depth() {
        let mut cg = CodeGen::new();
        cg.enter_block(LineCol::default(), LineCol::default());
        let mut outer = ContextLayout::new();
        outer.push(DeclKey::new("a", 0));
        cg.open_function_context(outer).unwrap();
        cg.enter_block(LineCol::default(), LineCol::default());
        let mut inner = ContextLayout::new();
        inner.push(DeclKey::new("b", 1));
        cg.open_block_context(inner).unwrap();

        assert_eq!(
            cg.own_context_slot(&DeclKey::new("a", 0)),
            Some((1, Register(0)))
        );
        cg.enter_function("f");
        assert_eq!(cg.enclosing_context_slot(&DeclKey::new("b", 1)), Some((1, 0)));
        assert_eq!(cg.enclosing_context_slot(&DeclKey::new("a", 0)), Some((1, 1)));
        assert_eq!(cg.own_context_slot(&DeclKey::new("a", 0)), None);
    }
}
