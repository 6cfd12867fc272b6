//! Access to variables captured from enclosing functions
//!
//! Two schemes exist and one is chosen per compilation unit from the target
//! version:
//!
//! - [`LegacyUpvalues`]: each function carries an upvalue table whose
//!   entries point either at a parent register or at a parent upvalue.
//!   Only top-level variables may be captured.
//! - [`ContextSlots`]: captured variables live in heap contexts addressed
//!   by `(slot, depth)`.

use std::fmt;

use lepus_bytecode::{Instruction, Register};

use crate::analysis::{DeclKey, FunctionNumber};
use crate::ast::Position;
use crate::codegen::CodeGen;
use crate::error::{CompileError, CompileResult};
use crate::version::{Features, SdkVersion};

/// Closure scheme of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureScheme {
    /// Upvalue tables
    LegacyUpvalues,
    /// Context slots
    ContextSlots,
}

impl fmt::Display for ClosureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LegacyUpvalues => f.write_str("legacy upvalues"),
            Self::ContextSlots => f.write_str("context slots"),
        }
    }
}

/// Where a captured variable lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureLocation {
    /// Index into the current function's upvalue table
    Upvalue(u32),
    /// Slot of an enclosing context
    ContextSlot {
        /// Slot within the context
        slot: u16,
        /// Contexts to skip from the closure's environment
        depth: u16,
    },
}

impl CaptureLocation {
    /// Scheme that produces this location
    pub fn scheme(self) -> ClosureScheme {
        match self {
            Self::Upvalue(_) => ClosureScheme::LegacyUpvalues,
            Self::ContextSlot { .. } => ClosureScheme::ContextSlots,
        }
    }
}

/// A reference to a variable declared in an enclosing function
#[derive(Debug, Clone, Copy)]
pub struct Capture<'a> {
    /// Referenced name
    pub name: &'a str,
    /// Declaration it resolves to
    pub decl: &'a DeclKey,
    /// Function declaring it
    pub function: FunctionNumber,
    /// Reference position
    pub pos: Position,
}

/// Closure scheme behavior
pub trait ClosureStrategy: fmt::Debug {
    /// Scheme implemented
    fn scheme(&self) -> ClosureScheme;

    /// Find (and register, if needed) the location of a captured variable
    fn resolve_capture(
        &self,
        codegen: &mut CodeGen,
        capture: &Capture<'_>,
    ) -> CompileResult<CaptureLocation>;

    /// Emit a read of `location` into `dst`
    fn emit_capture_read(
        &self,
        codegen: &mut CodeGen,
        location: CaptureLocation,
        dst: Register,
    ) -> CompileResult<()>;

    /// Emit a write of `src` into `location`
    fn emit_capture_write(
        &self,
        codegen: &mut CodeGen,
        location: CaptureLocation,
        src: Register,
    ) -> CompileResult<()>;

    /// Reject locations produced by the other scheme
    fn check(&self, location: CaptureLocation) -> CompileResult<()> {
        if location.scheme() == self.scheme() {
            Ok(())
        } else {
            Err(CompileError::internal(format!(
                "{} location used with the {} scheme",
                location.scheme(),
                self.scheme()
            )))
        }
    }
}

/// Strategy for a unit's features
pub fn strategy_for(features: &Features) -> Box<dyn ClosureStrategy> {
    if features.closures {
        Box::new(ContextSlots)
    } else {
        Box::new(LegacyUpvalues {
            target: features.target,
        })
    }
}

/// Upvalue-table closures
#[derive(Debug, Clone, Copy)]
pub struct LegacyUpvalues {
    /// Target version, for error messages
    pub target: SdkVersion,
}

impl ClosureStrategy for LegacyUpvalues {
    fn scheme(&self) -> ClosureScheme {
        ClosureScheme::LegacyUpvalues
    }

    fn resolve_capture(
        &self,
        codegen: &mut CodeGen,
        capture: &Capture<'_>,
    ) -> CompileResult<CaptureLocation> {
        if capture.function != 0 {
            return Err(CompileError::unsupported(
                format!("capturing non-top-level variable {}", capture.name),
                SdkVersion::CLOSURES,
                self.target,
                capture.pos,
            ));
        }

        let level = codegen.level();
        if let Some(idx) = codegen
            .function_at(level)
            .and_then(|f| f.upvalue_index(capture.name))
        {
            return Ok(CaptureLocation::Upvalue(idx));
        }

        // Nearest ancestor that already has the name as upvalue or local.
        let mut found = None;
        for ancestor in (0..level).rev() {
            let Some(func) = codegen.function_at(ancestor) else {
                continue;
            };
            if let Some(idx) = func.upvalue_index(capture.name) {
                found = Some((ancestor, idx, false));
                break;
            }
            if let Some(reg) = func.lookup_local(capture.name) {
                found = Some((ancestor, reg.index() as u32, true));
                break;
            }
        }
        let (owner, mut index, mut from_parent_locals) =
            found.ok_or_else(|| CompileError::unresolved(capture.name, capture.pos))?;

        for descendant in owner + 1..=level {
            let func = codegen
                .function_at_mut(descendant)
                .ok_or_else(|| CompileError::internal("function stack underflow"))?;
            index = func.add_upvalue(capture.name, index, from_parent_locals);
            from_parent_locals = false;
        }
        Ok(CaptureLocation::Upvalue(index))
    }

    fn emit_capture_read(
        &self,
        codegen: &mut CodeGen,
        location: CaptureLocation,
        dst: Register,
    ) -> CompileResult<()> {
        self.check(location)?;
        if let CaptureLocation::Upvalue(idx) = location {
            codegen.emit(Instruction::GetUpvalue { dst, idx });
        }
        Ok(())
    }

    fn emit_capture_write(
        &self,
        codegen: &mut CodeGen,
        location: CaptureLocation,
        src: Register,
    ) -> CompileResult<()> {
        self.check(location)?;
        if let CaptureLocation::Upvalue(idx) = location {
            codegen.emit(Instruction::SetUpvalue { src, idx });
        }
        Ok(())
    }
}

/// Context-slot closures
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextSlots;

impl ClosureStrategy for ContextSlots {
    fn scheme(&self) -> ClosureScheme {
        ClosureScheme::ContextSlots
    }

    fn resolve_capture(
        &self,
        codegen: &mut CodeGen,
        capture: &Capture<'_>,
    ) -> CompileResult<CaptureLocation> {
        if let Some((slot, depth)) = codegen.cached_capture(capture.name) {
            return Ok(CaptureLocation::ContextSlot { slot, depth });
        }
        let (slot, depth) = codegen
            .enclosing_context_slot(capture.decl)
            .ok_or_else(|| CompileError::unresolved(capture.name, capture.pos))?;
        codegen.cache_capture(capture.name, slot, depth)?;
        Ok(CaptureLocation::ContextSlot { slot, depth })
    }

    fn emit_capture_read(
        &self,
        codegen: &mut CodeGen,
        location: CaptureLocation,
        dst: Register,
    ) -> CompileResult<()> {
        self.check(location)?;
        if let CaptureLocation::ContextSlot { slot, depth } = location {
            codegen.emit(Instruction::GetContextSlot { dst, slot, depth });
        }
        Ok(())
    }

    fn emit_capture_write(
        &self,
        codegen: &mut CodeGen,
        location: CaptureLocation,
        src: Register,
    ) -> CompileResult<()> {
        self.check(location)?;
        if let CaptureLocation::ContextSlot { slot, depth } = location {
            codegen.emit(Instruction::SetContextSlot { src, slot, depth });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ContextLayout;
    use crate::scope::NameBinding;
    use lepus_bytecode::{LineCol, UpvalueDescriptor};

    fn capture<'a>(name: &'a str, decl: &'a DeclKey, function: u32) -> Capture<'a> {
        Capture {
            name,
            decl,
            function,
            pos: Position::new(1, 1),
        }
    }

    #[test]
    fn test_upvalues_chain_through_intermediate_functions() {
        let mut cg = CodeGen::new();
        cg.enter_block(LineCol::default(), LineCol::default());
        let reg = cg.alloc_reg().unwrap();
        cg.declare("x", NameBinding::Local(reg), Position::default())
            .unwrap();
        cg.enter_function("outer");
        cg.enter_block(LineCol::default(), LineCol::default());
        cg.enter_function("inner");
        cg.enter_block(LineCol::default(), LineCol::default());

        let strategy = LegacyUpvalues {
            target: SdkVersion::new(1, 0, 0),
        };
        let decl = DeclKey::new("x", 0);
        let loc = strategy
            .resolve_capture(&mut cg, &capture("x", &decl, 0))
            .unwrap();
        assert_eq!(loc, CaptureLocation::Upvalue(0));

        assert_eq!(
            cg.function_at(1).unwrap().upvalues,
            vec![UpvalueDescriptor {
                name: "x".to_string(),
                index: 0,
                from_parent_locals: true
            }]
        );
        assert_eq!(
            cg.function_at(2).unwrap().upvalues,
            vec![UpvalueDescriptor {
                name: "x".to_string(),
                index: 0,
                from_parent_locals: false
            }]
        );

        // Second resolution reuses the entry.
        let again = strategy
            .resolve_capture(&mut cg, &capture("x", &decl, 0))
            .unwrap();
        assert_eq!(again, loc);
        assert_eq!(cg.function_at(2).unwrap().upvalues.len(), 1);
    }

    #[test]
    fn test_legacy_rejects_nested_capture() {
        let mut cg = CodeGen::new();
        let strategy = LegacyUpvalues {
            target: SdkVersion::new(1, 2, 0),
        };
        let decl = DeclKey::new("y", 3);
        let err = strategy
            .resolve_capture(&mut cg, &capture("y", &decl, 2))
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnsupportedFeature { min_version, .. } if min_version == SdkVersion::CLOSURES
        ));
    }

    #[test]
    fn test_legacy_unresolved() {
        let mut cg = CodeGen::new();
        cg.enter_block(LineCol::default(), LineCol::default());
        cg.enter_function("f");
        let strategy = LegacyUpvalues {
            target: SdkVersion::new(1, 0, 0),
        };
        let decl = DeclKey::new("nope", 0);
        assert!(matches!(
            strategy.resolve_capture(&mut cg, &capture("nope", &decl, 0)),
            Err(CompileError::UnresolvedBinding { .. })
        ));
    }

    #[test]
    fn test_context_slot_resolution_is_cached() {
        let mut cg = CodeGen::new();
        cg.enter_block(LineCol::default(), LineCol::default());
        let decl = DeclKey::new("a", 0);
        let mut layout = ContextLayout::new();
        layout.push(DeclKey::new("other", 0));
        layout.push(decl.clone());
        cg.open_function_context(layout).unwrap();
        cg.enter_function("g");
        cg.enter_block(LineCol::default(), LineCol::default());

        let loc = ContextSlots
            .resolve_capture(&mut cg, &capture("a", &decl, 0))
            .unwrap();
        assert_eq!(loc, CaptureLocation::ContextSlot { slot: 2, depth: 0 });
        assert_eq!(cg.cached_capture("a"), Some((2, 0)));

        ContextSlots.emit_capture_read(&mut cg, loc, Register(0)).unwrap();
        assert_eq!(
            cg.current.instructions.last(),
            Some(&Instruction::GetContextSlot {
                dst: Register(0),
                slot: 2,
                depth: 0
            })
        );
    }

    #[test]
    fn test_scheme_mismatch_is_internal_error() {
        let mut cg = CodeGen::new();
        let err = ContextSlots
            .emit_capture_write(&mut cg, CaptureLocation::Upvalue(0), Register(0))
            .unwrap_err();
        assert!(matches!(err, CompileError::Internal(_)));
        assert!(cg.current.instructions.is_empty());
    }

    #[test]
    fn test_strategy_for_version() {
        let legacy = strategy_for(&Features::for_version(SdkVersion::new(1, 3, 0)));
        assert_eq!(legacy.scheme(), ClosureScheme::LegacyUpvalues);
        let modern = strategy_for(&Features::for_version(SdkVersion::NEWEST));
        assert_eq!(modern.scheme(), ClosureScheme::ContextSlots);
    }
}
