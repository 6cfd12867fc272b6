//! Bytecode instructions (opcodes)
//!
//! Every instruction encodes to one tagged 64-bit word in one of four operand
//! shapes. Registers always occupy 8 bits; the B and C fields are 16 bits wide
//! and the extended Bx field is 32 bits wide.

use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};
use crate::operand::{ConstantIndex, FunctionIndex, JumpOffset, Register};

/// Operand layout of an instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// Single register (or no operand, encoded as A = 0)
    A,
    /// Two registers, or a register and a 16-bit immediate
    AB,
    /// Three operands
    ABC,
    /// A register and a 32-bit extended index or signed jump offset
    ABx,
}

/// Bytecode opcodes
///
/// Register-based instruction set. Most instructions take a destination register
/// and one or more source registers/operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // ==================== Loads ====================
    /// dst = null
    LoadNull = 0x00,
    /// dst = undefined
    LoadUndefined = 0x01,
    /// dst = globalThis
    LoadGlobalThis = 0x02,
    /// dst = lynx (the engine's global object, 2.8 and later)
    LoadLynx = 0x03,
    /// dst = constants\[idx\]
    LoadConst = 0x04,
    /// dst = src
    Move = 0x05,

    // ==================== Bindings ====================
    /// dst = upvalues\[idx\]
    GetUpvalue = 0x10,
    /// upvalues\[idx\] = src
    SetUpvalue = 0x11,
    /// dst = globals\[idx\]
    GetGlobal = 0x12,
    /// dst = builtins\[idx\]
    GetBuiltin = 0x13,

    // ==================== Contexts ====================
    /// dst = closure environment at `depth`, slot `slot`
    GetContextSlot = 0x20,
    /// closure environment at `depth`, slot `slot` = src
    SetContextSlot = 0x21,
    /// dst = context register's slot (refresh a captured local)
    LoadContextSlot = 0x22,
    /// context register's slot = src (publish a captured local)
    StoreContextSlot = 0x23,
    /// dst = new function context of `size` slots
    CreateContext = 0x24,
    /// dst = new block context of `size` slots, entered immediately
    CreateBlockContext = 0x25,
    /// Enter the function context held in a register
    PushContext = 0x26,
    /// Leave the function context
    PopContext = 0x27,
    /// Leave the innermost block context
    LeaveBlockScope = 0x28,

    // ==================== Arithmetic ====================
    /// dst = lhs + rhs
    Add = 0x30,
    /// dst = lhs - rhs
    Sub = 0x31,
    /// dst = lhs * rhs
    Mul = 0x32,
    /// dst = lhs / rhs
    Div = 0x33,
    /// dst = lhs % rhs
    Mod = 0x34,
    /// dst = lhs ** rhs
    Pow = 0x35,
    /// dst = lhs & rhs
    BitAnd = 0x38,
    /// dst = lhs | rhs
    BitOr = 0x39,
    /// dst = lhs ^ rhs
    BitXor = 0x3A,

    // ==================== Comparison ====================
    /// dst = lhs == rhs
    Eq = 0x40,
    /// dst = lhs === rhs
    StrictEq = 0x41,
    /// dst = lhs != rhs
    Ne = 0x42,
    /// dst = lhs !== rhs
    StrictNe = 0x43,
    /// dst = lhs < rhs
    Lt = 0x44,
    /// dst = lhs <= rhs
    Le = 0x45,
    /// dst = lhs > rhs
    Gt = 0x46,
    /// dst = lhs >= rhs
    Ge = 0x47,
    /// dst = lhs && rhs (both operands already evaluated)
    And = 0x48,
    /// dst = lhs || rhs (both operands already evaluated)
    Or = 0x49,

    // ==================== Unary (in place) ====================
    /// reg = -reg
    Neg = 0x50,
    /// reg = !reg
    Not = 0x51,
    /// reg = ~reg
    BitNot = 0x52,
    /// reg = +reg
    ToNumber = 0x53,
    /// reg = typeof reg
    TypeOf = 0x54,
    /// reg = reg + 1
    Inc = 0x55,
    /// reg = reg - 1
    Dec = 0x56,

    // ==================== Tables ====================
    /// dst = {}
    NewObject = 0x60,
    /// dst = \[dst+1 .. dst+count\]
    NewArray = 0x61,
    /// dst = object\[key\]
    GetProp = 0x62,
    /// object\[key\] = value
    SetProp = 0x63,

    // ==================== Functions ====================
    /// dst = closure(children\[func\])
    Closure = 0x70,
    /// dst = callee(args...)
    Call = 0x71,
    /// Return value from function
    Return = 0x72,
    /// Return undefined from function
    ReturnUndefined = 0x73,

    // ==================== Control Flow ====================
    /// Unconditional jump
    Jump = 0x80,
    /// Jump if true
    JumpIfTrue = 0x81,
    /// Jump if false
    JumpIfFalse = 0x82,

    // ==================== Exception Handling ====================
    /// Throw exception
    Throw = 0x90,
    /// Start of a catch handler
    Catch = 0x91,
    /// Store the caught exception into a register
    SetCatchId = 0x92,

    // ==================== Misc ====================
    /// No operation
    Nop = 0xF0,
}

impl Opcode {
    /// Convert from raw byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::LoadNull,
            0x01 => Self::LoadUndefined,
            0x02 => Self::LoadGlobalThis,
            0x03 => Self::LoadLynx,
            0x04 => Self::LoadConst,
            0x05 => Self::Move,

            0x10 => Self::GetUpvalue,
            0x11 => Self::SetUpvalue,
            0x12 => Self::GetGlobal,
            0x13 => Self::GetBuiltin,

            0x20 => Self::GetContextSlot,
            0x21 => Self::SetContextSlot,
            0x22 => Self::LoadContextSlot,
            0x23 => Self::StoreContextSlot,
            0x24 => Self::CreateContext,
            0x25 => Self::CreateBlockContext,
            0x26 => Self::PushContext,
            0x27 => Self::PopContext,
            0x28 => Self::LeaveBlockScope,

            0x30 => Self::Add,
            0x31 => Self::Sub,
            0x32 => Self::Mul,
            0x33 => Self::Div,
            0x34 => Self::Mod,
            0x35 => Self::Pow,
            0x38 => Self::BitAnd,
            0x39 => Self::BitOr,
            0x3A => Self::BitXor,

            0x40 => Self::Eq,
            0x41 => Self::StrictEq,
            0x42 => Self::Ne,
            0x43 => Self::StrictNe,
            0x44 => Self::Lt,
            0x45 => Self::Le,
            0x46 => Self::Gt,
            0x47 => Self::Ge,
            0x48 => Self::And,
            0x49 => Self::Or,

            0x50 => Self::Neg,
            0x51 => Self::Not,
            0x52 => Self::BitNot,
            0x53 => Self::ToNumber,
            0x54 => Self::TypeOf,
            0x55 => Self::Inc,
            0x56 => Self::Dec,

            0x60 => Self::NewObject,
            0x61 => Self::NewArray,
            0x62 => Self::GetProp,
            0x63 => Self::SetProp,

            0x70 => Self::Closure,
            0x71 => Self::Call,
            0x72 => Self::Return,
            0x73 => Self::ReturnUndefined,

            0x80 => Self::Jump,
            0x81 => Self::JumpIfTrue,
            0x82 => Self::JumpIfFalse,

            0x90 => Self::Throw,
            0x91 => Self::Catch,
            0x92 => Self::SetCatchId,

            0xF0 => Self::Nop,

            _ => return None,
        })
    }

    /// Convert to raw byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Operand layout used by this opcode
    pub const fn shape(self) -> OperandShape {
        match self {
            Self::LoadNull
            | Self::LoadUndefined
            | Self::LoadGlobalThis
            | Self::LoadLynx
            | Self::PushContext
            | Self::PopContext
            | Self::LeaveBlockScope
            | Self::Neg
            | Self::Not
            | Self::BitNot
            | Self::ToNumber
            | Self::TypeOf
            | Self::Inc
            | Self::Dec
            | Self::NewObject
            | Self::Return
            | Self::ReturnUndefined
            | Self::Throw
            | Self::Catch
            | Self::SetCatchId
            | Self::Nop => OperandShape::A,

            Self::Move | Self::CreateContext | Self::CreateBlockContext | Self::NewArray => {
                OperandShape::AB
            }

            Self::LoadConst
            | Self::GetUpvalue
            | Self::SetUpvalue
            | Self::GetGlobal
            | Self::GetBuiltin
            | Self::Closure
            | Self::Jump
            | Self::JumpIfTrue
            | Self::JumpIfFalse => OperandShape::ABx,

            _ => OperandShape::ABC,
        }
    }

    /// Whether this opcode is a three-register binary operator
    pub const fn is_binary(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Sub
                | Self::Mul
                | Self::Div
                | Self::Mod
                | Self::Pow
                | Self::BitAnd
                | Self::BitOr
                | Self::BitXor
                | Self::Eq
                | Self::StrictEq
                | Self::Ne
                | Self::StrictNe
                | Self::Lt
                | Self::Le
                | Self::Gt
                | Self::Ge
                | Self::And
                | Self::Or
        )
    }

    /// Get the name of this opcode
    pub const fn name(self) -> &'static str {
        match self {
            Self::LoadNull => "LoadNull",
            Self::LoadUndefined => "LoadUndefined",
            Self::LoadGlobalThis => "LoadGlobalThis",
            Self::LoadLynx => "LoadLynx",
            Self::LoadConst => "LoadConst",
            Self::Move => "Move",
            Self::GetUpvalue => "GetUpvalue",
            Self::SetUpvalue => "SetUpvalue",
            Self::GetGlobal => "GetGlobal",
            Self::GetBuiltin => "GetBuiltin",
            Self::GetContextSlot => "GetContextSlot",
            Self::SetContextSlot => "SetContextSlot",
            Self::LoadContextSlot => "LoadContextSlot",
            Self::StoreContextSlot => "StoreContextSlot",
            Self::CreateContext => "CreateContext",
            Self::CreateBlockContext => "CreateBlockContext",
            Self::PushContext => "PushContext",
            Self::PopContext => "PopContext",
            Self::LeaveBlockScope => "LeaveBlockScope",
            Self::Add => "Add",
            Self::Sub => "Sub",
            Self::Mul => "Mul",
            Self::Div => "Div",
            Self::Mod => "Mod",
            Self::Pow => "Pow",
            Self::BitAnd => "BitAnd",
            Self::BitOr => "BitOr",
            Self::BitXor => "BitXor",
            Self::Eq => "Eq",
            Self::StrictEq => "StrictEq",
            Self::Ne => "Ne",
            Self::StrictNe => "StrictNe",
            Self::Lt => "Lt",
            Self::Le => "Le",
            Self::Gt => "Gt",
            Self::Ge => "Ge",
            Self::And => "And",
            Self::Or => "Or",
            Self::Neg => "Neg",
            Self::Not => "Not",
            Self::BitNot => "BitNot",
            Self::ToNumber => "ToNumber",
            Self::TypeOf => "TypeOf",
            Self::Inc => "Inc",
            Self::Dec => "Dec",
            Self::NewObject => "NewObject",
            Self::NewArray => "NewArray",
            Self::GetProp => "GetProp",
            Self::SetProp => "SetProp",
            Self::Closure => "Closure",
            Self::Call => "Call",
            Self::Return => "Return",
            Self::ReturnUndefined => "ReturnUndefined",
            Self::Jump => "Jump",
            Self::JumpIfTrue => "JumpIfTrue",
            Self::JumpIfFalse => "JumpIfFalse",
            Self::Throw => "Throw",
            Self::Catch => "Catch",
            Self::SetCatchId => "SetCatchId",
            Self::Nop => "Nop",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded instruction with its operands
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Instruction {
    // Loads
    LoadNull {
        dst: Register,
    },
    LoadUndefined {
        dst: Register,
    },
    LoadGlobalThis {
        dst: Register,
    },
    LoadLynx {
        dst: Register,
    },
    LoadConst {
        dst: Register,
        idx: ConstantIndex,
    },
    Move {
        dst: Register,
        src: Register,
    },

    // Bindings
    GetUpvalue {
        dst: Register,
        idx: u32,
    },
    SetUpvalue {
        src: Register,
        idx: u32,
    },
    GetGlobal {
        dst: Register,
        idx: u32,
    },
    GetBuiltin {
        dst: Register,
        idx: u32,
    },

    // Contexts
    GetContextSlot {
        dst: Register,
        slot: u16,
        depth: u16,
    },
    SetContextSlot {
        src: Register,
        slot: u16,
        depth: u16,
    },
    LoadContextSlot {
        dst: Register,
        slot: u16,
        context: Register,
    },
    StoreContextSlot {
        context: Register,
        slot: u16,
        src: Register,
    },
    CreateContext {
        dst: Register,
        size: u16,
    },
    CreateBlockContext {
        dst: Register,
        size: u16,
    },
    PushContext {
        context: Register,
    },
    PopContext,
    LeaveBlockScope,

    // Arithmetic
    Add {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    Sub {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    Mul {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    Div {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    Mod {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    Pow {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    BitAnd {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    BitOr {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    BitXor {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },

    // Comparison
    Eq {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    StrictEq {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    Ne {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    StrictNe {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    Lt {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    Le {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    Gt {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    Ge {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    And {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },
    Or {
        dst: Register,
        lhs: Register,
        rhs: Register,
    },

    // Unary
    Neg {
        reg: Register,
    },
    Not {
        reg: Register,
    },
    BitNot {
        reg: Register,
    },
    ToNumber {
        reg: Register,
    },
    TypeOf {
        reg: Register,
    },
    Inc {
        reg: Register,
    },
    Dec {
        reg: Register,
    },

    // Tables
    NewObject {
        dst: Register,
    },
    NewArray {
        dst: Register,
        count: u16,
    },
    GetProp {
        dst: Register,
        object: Register,
        key: Register,
    },
    SetProp {
        object: Register,
        key: Register,
        value: Register,
    },

    // Functions
    Closure {
        dst: Register,
        func: FunctionIndex,
    },
    Call {
        callee: Register,
        argc: u16,
        dst: Register,
    },
    Return {
        src: Register,
    },
    ReturnUndefined,

    // Control flow
    Jump {
        offset: JumpOffset,
    },
    JumpIfTrue {
        cond: Register,
        offset: JumpOffset,
    },
    JumpIfFalse {
        cond: Register,
        offset: JumpOffset,
    },

    // Exceptions
    Throw {
        src: Register,
    },
    Catch,
    SetCatchId {
        dst: Register,
    },

    Nop,
}

/// Raw operand fields of an instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fields {
    A(u8),
    AB(u8, u16),
    ABC(u8, u16, u16),
    ABx(u8, u32),
}

impl Instruction {
    /// Build a three-register binary instruction for a binary opcode.
    ///
    /// Returns `None` when `op` is not a binary opcode.
    pub fn binary(op: Opcode, dst: Register, lhs: Register, rhs: Register) -> Option<Self> {
        Some(match op {
            Opcode::Add => Self::Add { dst, lhs, rhs },
            Opcode::Sub => Self::Sub { dst, lhs, rhs },
            Opcode::Mul => Self::Mul { dst, lhs, rhs },
            Opcode::Div => Self::Div { dst, lhs, rhs },
            Opcode::Mod => Self::Mod { dst, lhs, rhs },
            Opcode::Pow => Self::Pow { dst, lhs, rhs },
            Opcode::BitAnd => Self::BitAnd { dst, lhs, rhs },
            Opcode::BitOr => Self::BitOr { dst, lhs, rhs },
            Opcode::BitXor => Self::BitXor { dst, lhs, rhs },
            Opcode::Eq => Self::Eq { dst, lhs, rhs },
            Opcode::StrictEq => Self::StrictEq { dst, lhs, rhs },
            Opcode::Ne => Self::Ne { dst, lhs, rhs },
            Opcode::StrictNe => Self::StrictNe { dst, lhs, rhs },
            Opcode::Lt => Self::Lt { dst, lhs, rhs },
            Opcode::Le => Self::Le { dst, lhs, rhs },
            Opcode::Gt => Self::Gt { dst, lhs, rhs },
            Opcode::Ge => Self::Ge { dst, lhs, rhs },
            Opcode::And => Self::And { dst, lhs, rhs },
            Opcode::Or => Self::Or { dst, lhs, rhs },
            _ => return None,
        })
    }

    /// Build an in-place unary instruction for a unary opcode.
    ///
    /// Returns `None` when `op` is not a unary opcode.
    pub fn unary(op: Opcode, reg: Register) -> Option<Self> {
        Some(match op {
            Opcode::Neg => Self::Neg { reg },
            Opcode::Not => Self::Not { reg },
            Opcode::BitNot => Self::BitNot { reg },
            Opcode::ToNumber => Self::ToNumber { reg },
            Opcode::TypeOf => Self::TypeOf { reg },
            Opcode::Inc => Self::Inc { reg },
            Opcode::Dec => Self::Dec { reg },
            _ => return None,
        })
    }

    /// Opcode of this instruction
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::LoadNull { .. } => Opcode::LoadNull,
            Self::LoadUndefined { .. } => Opcode::LoadUndefined,
            Self::LoadGlobalThis { .. } => Opcode::LoadGlobalThis,
            Self::LoadLynx { .. } => Opcode::LoadLynx,
            Self::LoadConst { .. } => Opcode::LoadConst,
            Self::Move { .. } => Opcode::Move,
            Self::GetUpvalue { .. } => Opcode::GetUpvalue,
            Self::SetUpvalue { .. } => Opcode::SetUpvalue,
            Self::GetGlobal { .. } => Opcode::GetGlobal,
            Self::GetBuiltin { .. } => Opcode::GetBuiltin,
            Self::GetContextSlot { .. } => Opcode::GetContextSlot,
            Self::SetContextSlot { .. } => Opcode::SetContextSlot,
            Self::LoadContextSlot { .. } => Opcode::LoadContextSlot,
            Self::StoreContextSlot { .. } => Opcode::StoreContextSlot,
            Self::CreateContext { .. } => Opcode::CreateContext,
            Self::CreateBlockContext { .. } => Opcode::CreateBlockContext,
            Self::PushContext { .. } => Opcode::PushContext,
            Self::PopContext => Opcode::PopContext,
            Self::LeaveBlockScope => Opcode::LeaveBlockScope,
            Self::Add { .. } => Opcode::Add,
            Self::Sub { .. } => Opcode::Sub,
            Self::Mul { .. } => Opcode::Mul,
            Self::Div { .. } => Opcode::Div,
            Self::Mod { .. } => Opcode::Mod,
            Self::Pow { .. } => Opcode::Pow,
            Self::BitAnd { .. } => Opcode::BitAnd,
            Self::BitOr { .. } => Opcode::BitOr,
            Self::BitXor { .. } => Opcode::BitXor,
            Self::Eq { .. } => Opcode::Eq,
            Self::StrictEq { .. } => Opcode::StrictEq,
            Self::Ne { .. } => Opcode::Ne,
            Self::StrictNe { .. } => Opcode::StrictNe,
            Self::Lt { .. } => Opcode::Lt,
            Self::Le { .. } => Opcode::Le,
            Self::Gt { .. } => Opcode::Gt,
            Self::Ge { .. } => Opcode::Ge,
            Self::And { .. } => Opcode::And,
            Self::Or { .. } => Opcode::Or,
            Self::Neg { .. } => Opcode::Neg,
            Self::Not { .. } => Opcode::Not,
            Self::BitNot { .. } => Opcode::BitNot,
            Self::ToNumber { .. } => Opcode::ToNumber,
            Self::TypeOf { .. } => Opcode::TypeOf,
            Self::Inc { .. } => Opcode::Inc,
            Self::Dec { .. } => Opcode::Dec,
            Self::NewObject { .. } => Opcode::NewObject,
            Self::NewArray { .. } => Opcode::NewArray,
            Self::GetProp { .. } => Opcode::GetProp,
            Self::SetProp { .. } => Opcode::SetProp,
            Self::Closure { .. } => Opcode::Closure,
            Self::Call { .. } => Opcode::Call,
            Self::Return { .. } => Opcode::Return,
            Self::ReturnUndefined => Opcode::ReturnUndefined,
            Self::Jump { .. } => Opcode::Jump,
            Self::JumpIfTrue { .. } => Opcode::JumpIfTrue,
            Self::JumpIfFalse { .. } => Opcode::JumpIfFalse,
            Self::Throw { .. } => Opcode::Throw,
            Self::Catch => Opcode::Catch,
            Self::SetCatchId { .. } => Opcode::SetCatchId,
            Self::Nop => Opcode::Nop,
        }
    }

    fn fields(&self) -> Fields {
        match *self {
            Self::LoadNull { dst }
            | Self::LoadUndefined { dst }
            | Self::LoadGlobalThis { dst }
            | Self::LoadLynx { dst }
            | Self::NewObject { dst }
            | Self::SetCatchId { dst } => Fields::A(dst.0),
            Self::PushContext { context } => Fields::A(context.0),
            Self::Return { src } | Self::Throw { src } => Fields::A(src.0),
            Self::Neg { reg }
            | Self::Not { reg }
            | Self::BitNot { reg }
            | Self::ToNumber { reg }
            | Self::TypeOf { reg }
            | Self::Inc { reg }
            | Self::Dec { reg } => Fields::A(reg.0),
            Self::PopContext
            | Self::LeaveBlockScope
            | Self::ReturnUndefined
            | Self::Catch
            | Self::Nop => Fields::A(0),

            Self::Move { dst, src } => Fields::AB(dst.0, src.0 as u16),
            Self::CreateContext { dst, size } | Self::CreateBlockContext { dst, size } => {
                Fields::AB(dst.0, size)
            }
            Self::NewArray { dst, count } => Fields::AB(dst.0, count),

            Self::LoadConst { dst, idx } => Fields::ABx(dst.0, idx.0),
            Self::GetUpvalue { dst, idx }
            | Self::GetGlobal { dst, idx }
            | Self::GetBuiltin { dst, idx } => Fields::ABx(dst.0, idx),
            Self::SetUpvalue { src, idx } => Fields::ABx(src.0, idx),
            Self::Closure { dst, func } => Fields::ABx(dst.0, func.0),
            Self::Jump { offset } => Fields::ABx(0, offset.0 as u32),
            Self::JumpIfTrue { cond, offset } | Self::JumpIfFalse { cond, offset } => {
                Fields::ABx(cond.0, offset.0 as u32)
            }

            Self::GetContextSlot { dst, slot, depth } => Fields::ABC(dst.0, slot, depth),
            Self::SetContextSlot { src, slot, depth } => Fields::ABC(src.0, slot, depth),
            Self::LoadContextSlot { dst, slot, context } => {
                Fields::ABC(dst.0, slot, context.0 as u16)
            }
            Self::StoreContextSlot { context, slot, src } => {
                Fields::ABC(context.0, slot, src.0 as u16)
            }
            Self::GetProp { dst, object, key } => {
                Fields::ABC(dst.0, object.0 as u16, key.0 as u16)
            }
            Self::SetProp { object, key, value } => {
                Fields::ABC(object.0, key.0 as u16, value.0 as u16)
            }
            Self::Call { callee, argc, dst } => Fields::ABC(callee.0, argc, dst.0 as u16),

            Self::Add { dst, lhs, rhs }
            | Self::Sub { dst, lhs, rhs }
            | Self::Mul { dst, lhs, rhs }
            | Self::Div { dst, lhs, rhs }
            | Self::Mod { dst, lhs, rhs }
            | Self::Pow { dst, lhs, rhs }
            | Self::BitAnd { dst, lhs, rhs }
            | Self::BitOr { dst, lhs, rhs }
            | Self::BitXor { dst, lhs, rhs }
            | Self::Eq { dst, lhs, rhs }
            | Self::StrictEq { dst, lhs, rhs }
            | Self::Ne { dst, lhs, rhs }
            | Self::StrictNe { dst, lhs, rhs }
            | Self::Lt { dst, lhs, rhs }
            | Self::Le { dst, lhs, rhs }
            | Self::Gt { dst, lhs, rhs }
            | Self::Ge { dst, lhs, rhs }
            | Self::And { dst, lhs, rhs }
            | Self::Or { dst, lhs, rhs } => Fields::ABC(dst.0, lhs.0 as u16, rhs.0 as u16),
        }
    }

    /// Encode into a tagged 64-bit word
    pub fn encode(&self) -> u64 {
        let op = self.opcode().to_byte() as u64;
        match self.fields() {
            Fields::A(a) => op | (a as u64) << 8,
            Fields::AB(a, b) => op | (a as u64) << 8 | (b as u64) << 16,
            Fields::ABC(a, b, c) => op | (a as u64) << 8 | (b as u64) << 16 | (c as u64) << 32,
            Fields::ABx(a, bx) => op | (a as u64) << 8 | (bx as u64) << 16,
        }
    }

    /// Decode a tagged 64-bit word
    pub fn decode(word: u64) -> Result<Self> {
        let byte = (word & 0xFF) as u8;
        let op = Opcode::from_byte(byte).ok_or(BytecodeError::InvalidOpcode(byte))?;
        let a = Register(((word >> 8) & 0xFF) as u8);
        let b = ((word >> 16) & 0xFFFF) as u16;
        let c = ((word >> 32) & 0xFFFF) as u16;
        let bx = ((word >> 16) & 0xFFFF_FFFF) as u32;
        let reg = |value: u16| -> Result<Register> {
            u8::try_from(value)
                .map(Register)
                .map_err(|_| BytecodeError::InvalidOperand {
                    opcode: op.name(),
                    value: value as i64,
                })
        };

        if op.is_binary() {
            return Self::binary(op, a, reg(b)?, reg(c)?).ok_or(BytecodeError::InvalidOpcode(byte));
        }
        if let Some(instruction) = Self::unary(op, a) {
            return Ok(instruction);
        }

        Ok(match op {
            Opcode::LoadNull => Self::LoadNull { dst: a },
            Opcode::LoadUndefined => Self::LoadUndefined { dst: a },
            Opcode::LoadGlobalThis => Self::LoadGlobalThis { dst: a },
            Opcode::LoadLynx => Self::LoadLynx { dst: a },
            Opcode::LoadConst => Self::LoadConst {
                dst: a,
                idx: ConstantIndex(bx),
            },
            Opcode::Move => Self::Move { dst: a, src: reg(b)? },
            Opcode::GetUpvalue => Self::GetUpvalue { dst: a, idx: bx },
            Opcode::SetUpvalue => Self::SetUpvalue { src: a, idx: bx },
            Opcode::GetGlobal => Self::GetGlobal { dst: a, idx: bx },
            Opcode::GetBuiltin => Self::GetBuiltin { dst: a, idx: bx },
            Opcode::GetContextSlot => Self::GetContextSlot {
                dst: a,
                slot: b,
                depth: c,
            },
            Opcode::SetContextSlot => Self::SetContextSlot {
                src: a,
                slot: b,
                depth: c,
            },
            Opcode::LoadContextSlot => Self::LoadContextSlot {
                dst: a,
                slot: b,
                context: reg(c)?,
            },
            Opcode::StoreContextSlot => Self::StoreContextSlot {
                context: a,
                slot: b,
                src: reg(c)?,
            },
            Opcode::CreateContext => Self::CreateContext { dst: a, size: b },
            Opcode::CreateBlockContext => Self::CreateBlockContext { dst: a, size: b },
            Opcode::PushContext => Self::PushContext { context: a },
            Opcode::PopContext => Self::PopContext,
            Opcode::LeaveBlockScope => Self::LeaveBlockScope,
            Opcode::NewObject => Self::NewObject { dst: a },
            Opcode::NewArray => Self::NewArray { dst: a, count: b },
            Opcode::GetProp => Self::GetProp {
                dst: a,
                object: reg(b)?,
                key: reg(c)?,
            },
            Opcode::SetProp => Self::SetProp {
                object: a,
                key: reg(b)?,
                value: reg(c)?,
            },
            Opcode::Closure => Self::Closure {
                dst: a,
                func: FunctionIndex(bx),
            },
            Opcode::Call => Self::Call {
                callee: a,
                argc: b,
                dst: reg(c)?,
            },
            Opcode::Return => Self::Return { src: a },
            Opcode::ReturnUndefined => Self::ReturnUndefined,
            Opcode::Jump => Self::Jump {
                offset: JumpOffset(bx as i32),
            },
            Opcode::JumpIfTrue => Self::JumpIfTrue {
                cond: a,
                offset: JumpOffset(bx as i32),
            },
            Opcode::JumpIfFalse => Self::JumpIfFalse {
                cond: a,
                offset: JumpOffset(bx as i32),
            },
            Opcode::Throw => Self::Throw { src: a },
            Opcode::Catch => Self::Catch,
            Opcode::SetCatchId => Self::SetCatchId { dst: a },
            Opcode::Nop => Self::Nop,
            _ => return Err(BytecodeError::InvalidOpcode(byte)),
        })
    }

    /// Jump offset, if this is a jump
    pub fn jump_offset(&self) -> Option<JumpOffset> {
        match self {
            Self::Jump { offset }
            | Self::JumpIfTrue { offset, .. }
            | Self::JumpIfFalse { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Rewrite a jump's offset
    pub fn set_jump_offset(&mut self, new: JumpOffset) -> Result<()> {
        match self {
            Self::Jump { offset }
            | Self::JumpIfTrue { offset, .. }
            | Self::JumpIfFalse { offset, .. } => {
                *offset = new;
                Ok(())
            }
            other => Err(BytecodeError::NotPatchable(other.opcode().name())),
        }
    }

    /// Rewrite the destination of a placeholder `LoadUndefined`
    pub fn set_load_target(&mut self, target: Register) -> Result<()> {
        match self {
            Self::LoadUndefined { dst } => {
                *dst = target;
                Ok(())
            }
            other => Err(BytecodeError::NotPatchable(other.opcode().name())),
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.opcode().name();
        match self.fields() {
            Fields::A(_)
                if matches!(
                    self,
                    Self::PopContext
                        | Self::LeaveBlockScope
                        | Self::ReturnUndefined
                        | Self::Catch
                        | Self::Nop
                ) =>
            {
                write!(f, "{name}")
            }
            Fields::A(a) => write!(f, "{name:<18} r{a}"),
            Fields::AB(a, b) => match self {
                Self::Move { .. } => write!(f, "{name:<18} r{a}, r{b}"),
                _ => write!(f, "{name:<18} r{a}, {b}"),
            },
            Fields::ABx(_, _) => match self {
                Self::Jump { offset } => write!(f, "{name:<18} {:+}", offset.0),
                Self::JumpIfTrue { cond, offset } | Self::JumpIfFalse { cond, offset } => {
                    write!(f, "{name:<18} {cond}, {:+}", offset.0)
                }
                Self::SetUpvalue { src, idx } => write!(f, "{name:<18} {src}, u{idx}"),
                Self::GetUpvalue { dst, idx } => write!(f, "{name:<18} {dst}, u{idx}"),
                Self::LoadConst { dst, idx } => write!(f, "{name:<18} {dst}, k{}", idx.0),
                Self::Closure { dst, func } => write!(f, "{name:<18} {dst}, f{}", func.0),
                Self::GetGlobal { dst, idx } | Self::GetBuiltin { dst, idx } => {
                    write!(f, "{name:<18} {dst}, #{idx}")
                }
                _ => write!(f, "{name}"),
            },
            Fields::ABC(a, b, c) => match self {
                Self::GetContextSlot { .. } | Self::SetContextSlot { .. } => {
                    write!(f, "{name:<18} r{a}, slot {b}, depth {c}")
                }
                Self::LoadContextSlot { .. } => write!(f, "{name:<18} r{a}, slot {b}, ctx r{c}"),
                Self::StoreContextSlot { .. } => write!(f, "{name:<18} ctx r{a}, slot {b}, r{c}"),
                Self::Call { .. } => write!(f, "{name:<18} r{a}, argc {b}, r{c}"),
                _ => write!(f, "{name:<18} r{a}, r{b}, r{c}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        let ops = [
            Opcode::LoadUndefined,
            Opcode::Add,
            Opcode::Call,
            Opcode::Jump,
            Opcode::Return,
            Opcode::LeaveBlockScope,
        ];

        for op in ops {
            let byte = op.to_byte();
            let decoded = Opcode::from_byte(byte);
            assert_eq!(decoded, Some(op));
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_byte(0xFF), None);
        assert!(matches!(
            Instruction::decode(0xFF),
            Err(BytecodeError::InvalidOpcode(0xFF))
        ));
    }

    #[test]
    fn test_opcode_shape() {
        assert_eq!(Opcode::Inc.shape(), OperandShape::A);
        assert_eq!(Opcode::Move.shape(), OperandShape::AB);
        assert_eq!(Opcode::GetContextSlot.shape(), OperandShape::ABC);
        assert_eq!(Opcode::JumpIfFalse.shape(), OperandShape::ABx);
    }

    #[test]
    fn test_encode_layout() {
        let word = Instruction::Add {
            dst: Register(1),
            lhs: Register(2),
            rhs: Register(3),
        }
        .encode();
        assert_eq!(word & 0xFF, Opcode::Add.to_byte() as u64);
        assert_eq!((word >> 8) & 0xFF, 1);
        assert_eq!((word >> 16) & 0xFFFF, 2);
        assert_eq!((word >> 32) & 0xFFFF, 3);
    }

    #[test]
    fn test_negative_jump_survives_encoding() {
        let jump = Instruction::JumpIfFalse {
            cond: Register(4),
            offset: JumpOffset(-12),
        };
        assert_eq!(Instruction::decode(jump.encode()).unwrap(), jump);
    }

    #[test]
    fn test_decode_rejects_wide_register() {
        let word = Opcode::Move.to_byte() as u64 | 300 << 16;
        assert!(matches!(
            Instruction::decode(word),
            Err(BytecodeError::InvalidOperand { value: 300, .. })
        ));
    }

    #[test]
    fn test_patch_jump_and_load() {
        let mut jump = Instruction::Jump {
            offset: JumpOffset(0),
        };
        jump.set_jump_offset(JumpOffset(5)).unwrap();
        assert_eq!(jump.jump_offset(), Some(JumpOffset(5)));

        let mut load = Instruction::LoadUndefined { dst: Register(0) };
        load.set_load_target(Register(9)).unwrap();
        assert_eq!(load, Instruction::LoadUndefined { dst: Register(9) });

        let mut add = Instruction::Nop;
        assert!(matches!(
            add.set_jump_offset(JumpOffset(1)),
            Err(BytecodeError::NotPatchable("Nop"))
        ));
    }

    #[test]
    fn test_display() {
        let get = Instruction::GetContextSlot {
            dst: Register(2),
            slot: 1,
            depth: 0,
        };
        assert_eq!(get.to_string(), "GetContextSlot     r2, slot 1, depth 0");
        assert_eq!(Instruction::PopContext.to_string(), "PopContext");
    }
}
