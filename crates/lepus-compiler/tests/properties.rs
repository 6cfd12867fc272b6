//! Property tests: register limit, determinism, JSON input

use lepus_bytecode::{Instruction, Opcode};
use lepus_compiler::ast::{BinaryOp, Update};
use lepus_compiler::{
    AstBuilder, CompileError, CompileOptions, Compiler, LexicalFacts, Node, SdkVersion, compile,
};
use proptest::prelude::*;

fn declarations(count: usize) -> Node {
    let mut b = AstBuilder::new();
    let body = (0..count)
        .map(|i| b.var(&format!("v{i}"), None))
        .collect();
    b.chunk(body)
}

/// Small statement forms combined into random programs
#[derive(Debug, Clone)]
enum Stmt {
    Declare(f64),
    Add(usize, usize),
    Increment(usize),
    Loop(usize),
    Closure(usize),
}

fn stmt() -> impl Strategy<Value = Stmt> {
    prop_oneof![
        (-1000.0f64..1000.0).prop_map(Stmt::Declare),
        (0usize..8, 0usize..8).prop_map(|(a, b)| Stmt::Add(a, b)),
        (0usize..8).prop_map(Stmt::Increment),
        (0usize..8).prop_map(Stmt::Loop),
        (0usize..8).prop_map(Stmt::Closure),
    ]
}

/// Build a program; variable references wrap around the declared names
fn program(stmts: &[Stmt]) -> Node {
    let mut b = AstBuilder::new();
    let mut body = Vec::new();
    let mut names: Vec<String> = Vec::new();
    let mut functions = 0;

    let zero = b.number(0.0);
    body.push(b.var("v0", Some(zero)));
    names.push("v0".to_string());

    for stmt in stmts {
        let pick = |i: usize| names[i % names.len()].clone();
        match stmt {
            Stmt::Declare(value) => {
                let name = format!("v{}", names.len());
                let init = b.number(*value);
                body.push(b.var(&name, Some(init)));
                names.push(name);
            }
            Stmt::Add(lhs, rhs) => {
                let (lhs, rhs) = (pick(*lhs), pick(*rhs));
                let l = b.ident(&lhs);
                let r = b.ident(&rhs);
                let sum = b.binary(BinaryOp::Add, l, r);
                let target = b.ident(&lhs);
                body.push(b.assign(target, sum));
            }
            Stmt::Increment(i) => {
                let name = pick(*i);
                body.push(b.update(&name, Update::PreIncrement));
            }
            Stmt::Loop(i) => {
                let name = pick(*i);
                let cond = b.ident(&name);
                let brk = b.break_();
                let step = b.update(&name, Update::PostDecrement);
                let inner = b.block(vec![step, brk]);
                body.push(b.while_(cond, inner));
            }
            Stmt::Closure(i) => {
                let name = pick(*i);
                let read = b.ident(&name);
                let ret = b.ret(Some(read));
                let fname = format!("f{functions}");
                functions += 1;
                body.push(b.function(Some(&fname), &[], vec![ret]));
            }
        }
    }
    b.chunk(body)
}

#[test]
fn test_register_limit_boundary() {
    let unit = compile(&declarations(256), &CompileOptions::new()).unwrap();
    assert_eq!(unit.root.register_count, 256);
    assert_eq!(unit.top_level_variables.get("v255"), Some(&255));

    let err = compile(&declarations(257), &CompileOptions::new()).unwrap_err();
    assert!(matches!(err, CompileError::RegisterOverflow { limit: 255, .. }));
}

#[test]
fn test_register_overflow_in_nested_function() {
    let mut b = AstBuilder::new();
    let body = (0..300).map(|i| b.var(&format!("w{i}"), None)).collect();
    let f = b.function(Some("f"), &[], body);
    let chunk = b.chunk(vec![f]);
    assert!(matches!(
        compile(&chunk, &CompileOptions::new()),
        Err(CompileError::RegisterOverflow { .. })
    ));
}

#[test]
fn test_compile_from_json() {
    let json = r#"{
        "type": "Chunk",
        "body": [
            {"type": "Variable", "name": "x",
             "init": {"type": "Literal", "value": {"kind": "number", "value": 2.0}}},
            {"type": "Function", "name": "get", "params": [],
             "body": {"type": "Block", "body": [
                {"type": "Return", "argument": {"type": "Identifier", "name": "x"}}
             ]}},
            {"type": "Member", "optional": true,
             "object": {"type": "Identifier", "name": "x"},
             "property": {"type": "Literal", "value": {"kind": "string", "value": "y"}}}
        ]
    }"#;
    let mut ast: Node = serde_json::from_str(json).unwrap();
    ast.renumber();

    let unit = compile(&ast, &CompileOptions::new()).unwrap();
    assert_eq!(unit.sdk_version, "null");
    assert_eq!(unit.function_count(), 2);
    assert_eq!(unit.top_level_variables.len(), 2);

    let text = unit.to_json().unwrap();
    let back = lepus_bytecode::CompiledUnit::from_json(&text).unwrap();
    assert_eq!(back, unit);
}

/// var a = 1; function f() { var a = 5; return a; } function g() { return a; }
const SHADOWING_WITHOUT_IDS: &str = r#"{
    "type": "Chunk",
    "body": [
        {"type": "Variable", "name": "a",
         "init": {"type": "Literal", "value": {"kind": "number", "value": 1.0}}},
        {"type": "Function", "name": "f", "params": [],
         "body": {"type": "Block", "body": [
            {"type": "Variable", "name": "a",
             "init": {"type": "Literal", "value": {"kind": "number", "value": 5.0}}},
            {"type": "Return", "argument": {"type": "Identifier", "name": "a"}}
         ]}},
        {"type": "Function", "name": "g", "params": [],
         "body": {"type": "Block", "body": [
            {"type": "Return", "argument": {"type": "Identifier", "name": "a"}}
         ]}}
    ]
}"#;

fn context_accesses(func: &lepus_bytecode::Function) -> Vec<(u16, u16)> {
    func.instructions
        .iter()
        .filter_map(|i| match *i {
            Instruction::GetContextSlot { slot, depth, .. }
            | Instruction::SetContextSlot { slot, depth, .. } => Some((slot, depth)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_tree_without_ids_resolves_shadowed_local() {
    let ast: Node = serde_json::from_str(SHADOWING_WITHOUT_IDS).unwrap();
    assert!(ast.duplicate_id().is_some());

    let unit = compile(&ast, &CompileOptions::new()).unwrap();
    let f = unit.root.child(lepus_bytecode::FunctionIndex(0)).unwrap();
    let g = unit.root.child(lepus_bytecode::FunctionIndex(1)).unwrap();
    assert_eq!(f.name, "f");
    assert_eq!(g.name, "g");
    // f reads its own local; only g reaches the top-level context
    assert!(context_accesses(f).is_empty());
    assert_eq!(context_accesses(g), vec![(1, 0)]);

    let mut numbered = ast.clone();
    numbered.renumber();
    assert_eq!(compile(&numbered, &CompileOptions::new()).unwrap(), unit);
}

#[test]
fn test_facts_reject_repeated_ids() {
    let ast: Node = serde_json::from_str(SHADOWING_WITHOUT_IDS).unwrap();
    let options = CompileOptions::new();
    let features = lepus_compiler::Features::for_version(options.sdk_version);

    assert!(matches!(
        LexicalFacts::analyze(&ast, &features),
        Err(CompileError::Internal(_))
    ));
    assert!(matches!(
        Compiler::new(options).compile_with_facts(&ast, LexicalFacts::new()),
        Err(CompileError::Internal(_))
    ));
}

#[test]
fn test_external_facts_match_builtin_analysis() {
    let ast = program(&[Stmt::Closure(0), Stmt::Loop(0), Stmt::Add(0, 0)]);
    let options = CompileOptions::new().with_sdk_version(SdkVersion::new(2, 6, 0));
    let features = lepus_compiler::Features::for_version(options.sdk_version);
    let facts = LexicalFacts::analyze(&ast, &features).unwrap();

    let direct = Compiler::new(options.clone()).compile(&ast).unwrap();
    let supplied = Compiler::new(options)
        .compile_with_facts(&ast, facts)
        .unwrap();
    assert_eq!(direct, supplied);
}

proptest! {
    #[test]
    fn prop_register_limit(count in 1usize..320) {
        let result = compile(&declarations(count), &CompileOptions::new());
        if count <= 256 {
            let unit = result.unwrap();
            prop_assert_eq!(unit.root.register_count as usize, count);
        } else {
            let is_overflow = matches!(result, Err(CompileError::RegisterOverflow { limit: 255, .. }));
            prop_assert!(is_overflow);
        }
    }

    #[test]
    fn prop_compilation_is_deterministic(
        stmts in prop::collection::vec(stmt(), 0..24),
        legacy in any::<bool>(),
    ) {
        let version = if legacy { SdkVersion::new(1, 2, 0) } else { SdkVersion::NEWEST };
        let options = CompileOptions::new().with_sdk_version(version);
        let ast = program(&stmts);

        let first = compile(&ast, &options).unwrap();
        let second = compile(&ast, &options).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn prop_every_jump_lands_inside_its_function(
        stmts in prop::collection::vec(stmt(), 0..24),
    ) {
        let unit = compile(&program(&stmts), &CompileOptions::new()).unwrap();
        let mut functions = Vec::new();
        unit.root.walk(&mut |f| functions.push(f));
        for func in functions {
            let len = func.instructions.len() as i64;
            prop_assert_eq!(func.positions.len(), func.instructions.len());
            prop_assert_eq!(func.instructions.last(), Some(&Instruction::ReturnUndefined));
            for (at, instruction) in func.instructions.iter().enumerate() {
                if let Some(offset) = instruction.jump_offset() {
                    prop_assert_ne!(offset.offset(), 0);
                    let target = offset.target(at);
                    prop_assert!(target >= 0 && target < len);
                }
                prop_assert_ne!(instruction.opcode(), Opcode::Nop);
            }
        }
    }
}
