//! Backpatching of loops, try statements and optional chains
//!
//! Every placeholder must be patched exactly once; these tests check the
//! patched targets against the instruction layout.

use lepus_bytecode::{Function, Instruction, Opcode, Register};
use lepus_compiler::ast::{BinaryOp, Update};
use lepus_compiler::{AstBuilder, CompileError, CompileOptions, compile};

/// (site, target) of every jump in `func`
fn jumps(func: &Function) -> Vec<(usize, usize)> {
    func.instructions
        .iter()
        .enumerate()
        .filter_map(|(at, instruction)| {
            instruction
                .jump_offset()
                .map(|offset| (at, offset.target(at) as usize))
        })
        .collect()
}

fn opcodes(func: &Function) -> Vec<Opcode> {
    func.instructions.iter().map(Instruction::opcode).collect()
}

#[test]
fn test_infinite_loop_break() {
    // var x = true; for (;;) { if (x) break; }
    let mut b = AstBuilder::new();
    let t = b.bool(true);
    let decl = b.var("x", Some(t));
    let x = b.ident("x");
    let brk = b.break_();
    let then = b.block(vec![brk]);
    let cond = b.if_(x, then, None);
    let body = b.block(vec![cond]);
    let lp = b.for_(None, None, vec![], body);
    let chunk = b.chunk(vec![decl, lp]);

    let unit = compile(&chunk, &CompileOptions::new()).unwrap();
    let root = &unit.root;
    assert_eq!(
        opcodes(root),
        vec![
            Opcode::LoadConst,
            Opcode::Move,
            Opcode::JumpIfFalse,
            Opcode::Jump,
            Opcode::Jump,
            Opcode::ReturnUndefined,
        ]
    );

    let after_loop = 5;
    let jumps = jumps(root);
    let breaks: Vec<_> = jumps
        .iter()
        .filter(|&&(at, target)| root.instructions[at].opcode() == Opcode::Jump && target > at)
        .collect();
    assert_eq!(breaks, vec![&(3, after_loop)]);
    // back edge to the loop head, skipped `if` body
    assert!(jumps.contains(&(4, 1)));
    assert!(jumps.contains(&(2, 4)));
    assert!(jumps.iter().all(|&(at, target)| at != target));
}

#[test]
fn test_continue_lands_on_update() {
    // var i = 0; for (; i < 3; i++) { if (i) continue; }
    let mut b = AstBuilder::new();
    let zero = b.number(0.0);
    let decl = b.var("i", Some(zero));
    let i = b.ident("i");
    let three = b.number(3.0);
    let test = b.binary(BinaryOp::Lt, i, three);
    let step = b.update("i", Update::PostIncrement);
    let i2 = b.ident("i");
    let cont = b.continue_();
    let then = b.block(vec![cont]);
    let cond = b.if_(i2, then, None);
    let body = b.block(vec![cond]);
    let lp = b.for_(None, Some(test), vec![step], body);
    let chunk = b.chunk(vec![decl, lp]);

    let unit = compile(&chunk, &CompileOptions::new()).unwrap();
    let root = &unit.root;
    assert_eq!(
        opcodes(root),
        vec![
            Opcode::LoadConst,   // 0  i = 0
            Opcode::Move,        // 1  loop head
            Opcode::LoadConst,   // 2
            Opcode::Lt,          // 3
            Opcode::JumpIfFalse, // 4  exit
            Opcode::Move,        // 5
            Opcode::JumpIfFalse, // 6
            Opcode::Jump,        // 7  continue
            Opcode::Move,        // 8  continue point: i++
            Opcode::Inc,         // 9
            Opcode::Jump,        // 10 back edge
            Opcode::ReturnUndefined,
        ]
    );
    let jumps = jumps(root);
    assert!(jumps.contains(&(7, 8)));
    assert!(jumps.contains(&(4, 11)));
    assert!(jumps.contains(&(10, 1)));
    assert_eq!(root.instructions[9], Instruction::Inc { reg: Register(0) });
}

#[test]
fn test_while_and_do_while() {
    // var n = 3; while (n) { n = n - 1; } do { n = n + 1; } while (n < 2);
    let mut b = AstBuilder::new();
    let three = b.number(3.0);
    let decl = b.var("n", Some(three));

    let n = b.ident("n");
    let n1 = b.ident("n");
    let one = b.number(1.0);
    let sub = b.binary(BinaryOp::Sub, n1, one);
    let target = b.ident("n");
    let assign = b.assign(target, sub);
    let body = b.block(vec![assign]);
    let wh = b.while_(n, body);

    let n2 = b.ident("n");
    let one2 = b.number(1.0);
    let add = b.binary(BinaryOp::Add, n2, one2);
    let target2 = b.ident("n");
    let assign2 = b.assign(target2, add);
    let body2 = b.block(vec![assign2]);
    let n3 = b.ident("n");
    let two = b.number(2.0);
    let test = b.binary(BinaryOp::Lt, n3, two);
    let dw = b.do_while(body2, test);

    let chunk = b.chunk(vec![decl, wh, dw]);
    let unit = compile(&chunk, &CompileOptions::new()).unwrap();
    let root = &unit.root;

    let last = root.instructions.len() - 1;
    assert_eq!(root.instructions[last], Instruction::ReturnUndefined);
    for (at, target) in jumps(root) {
        assert!(target <= last, "jump at {at} leaves the function");
        assert_ne!(at, target);
    }
    // the do-while condition skips exactly its own back edge
    let back = last - 1;
    assert_eq!(root.instructions[back].opcode(), Opcode::Jump);
    assert_eq!(root.instructions[back - 1].opcode(), Opcode::JumpIfFalse);
    assert!(jumps(root).contains(&(back - 1, last)));
}

#[test]
fn test_break_outside_loop() {
    let mut b = AstBuilder::new();
    b.at_line(4);
    let brk = b.break_();
    let chunk = b.chunk(vec![brk]);
    assert!(matches!(
        compile(&chunk, &CompileOptions::new()),
        Err(CompileError::IllegalStatement {
            statement: "break",
            line: 4,
            ..
        })
    ));
}

#[test]
fn test_try_finally_jumps_to_finalizer() {
    // try { throw 1 } catch (e) { } finally { var z = 2 }
    let mut b = AstBuilder::new();
    let one = b.number(1.0);
    let throw = b.throw(one);
    let block = b.block(vec![throw]);
    let handler = b.block(vec![]);
    let two = b.number(2.0);
    let z = b.var("z", Some(two));
    let finalizer = b.block(vec![z]);
    let stmt = b.try_(block, Some((Some("e"), handler)), Some(finalizer));
    let chunk = b.chunk(vec![stmt]);

    let unit = compile(&chunk, &CompileOptions::new()).unwrap();
    let root = &unit.root;
    assert_eq!(
        opcodes(root),
        vec![
            Opcode::LoadConst,
            Opcode::Throw,
            Opcode::Jump,
            Opcode::Catch,
            Opcode::SetCatchId,
            Opcode::LoadConst,
            Opcode::ReturnUndefined,
        ]
    );
    assert_eq!(jumps(root), vec![(2, 5)]);
}

#[test]
fn test_optional_chain_sites_share_target() {
    // var a = null; a?.b?.c
    let mut b = AstBuilder::new();
    let null = b.null();
    let decl = b.var("a", Some(null));
    let a = b.ident("a");
    let ab = b.opt_member(a, "b");
    let abc = b.opt_member(ab, "c");
    let chunk = b.chunk(vec![decl, abc]);

    let unit = compile(&chunk, &CompileOptions::new()).unwrap();
    let root = &unit.root;

    let get_props: Vec<usize> = root
        .instructions
        .iter()
        .enumerate()
        .filter(|(_, i)| i.opcode() == Opcode::GetProp)
        .map(|(at, _)| at)
        .collect();
    assert_eq!(get_props.len(), 2);
    let chain_end = get_props[1] + 1;
    let Instruction::GetProp { dst: result, .. } = root.instructions[get_props[1]] else {
        panic!("expected GetProp");
    };

    let short_circuits: Vec<(usize, usize)> = jumps(root)
        .into_iter()
        .filter(|&(at, _)| root.instructions[at].opcode() == Opcode::JumpIfTrue)
        .collect();
    // null and undefined checks for each `?.`
    assert_eq!(short_circuits.len(), 4);
    for &(at, target) in &short_circuits {
        assert_eq!(target, chain_end);
        assert_eq!(
            root.instructions[at - 1],
            Instruction::LoadUndefined { dst: result }
        );
    }
    // the checks on `a` run before `b` is read
    assert!(short_circuits[0].0 < get_props[0]);
    assert!(short_circuits[1].0 < get_props[0]);
}

#[test]
fn test_optional_call() {
    // var f = null; f?.(1)
    let mut b = AstBuilder::new();
    let null = b.null();
    let decl = b.var("f", Some(null));
    let f = b.ident("f");
    let one = b.number(1.0);
    let call = b.opt_call(f, vec![one]);
    let chunk = b.chunk(vec![decl, call]);

    let unit = compile(&chunk, &CompileOptions::new()).unwrap();
    let root = &unit.root;
    let call_at = root
        .instructions
        .iter()
        .position(|i| i.opcode() == Opcode::Call)
        .unwrap();
    let short_circuits: Vec<_> = jumps(root)
        .into_iter()
        .filter(|&(at, _)| root.instructions[at].opcode() == Opcode::JumpIfTrue)
        .collect();
    assert_eq!(short_circuits.len(), 2);
    assert!(short_circuits.iter().all(|&(at, t)| at < call_at && t == call_at + 1));
}

#[test]
fn test_nullish_coalescing() {
    // var a = null; var b = a ?? 1;
    let build = || {
        let mut b = AstBuilder::new();
        let null = b.null();
        let decl = b.var("a", Some(null));
        let a = b.ident("a");
        let one = b.number(1.0);
        let coalesce = b.binary(BinaryOp::Nullish, a, one);
        let decl2 = b.var("b", Some(coalesce));
        b.chunk(vec![decl, decl2])
    };

    let unit = compile(&build(), &CompileOptions::new()).unwrap();
    let root = &unit.root;
    let checks: Vec<_> = jumps(root)
        .into_iter()
        .filter(|&(at, _)| root.instructions[at].opcode() == Opcode::JumpIfTrue)
        .collect();
    assert_eq!(checks.len(), 2);
    assert_eq!(checks[0].1, checks[1].1);
    // the right side is only reached through the checks
    assert_eq!(root.instructions[checks[0].1].opcode(), Opcode::LoadConst);

    let legacy = CompileOptions::new().with_sdk_version("1.3".parse().unwrap());
    assert!(matches!(
        compile(&build(), &legacy),
        Err(CompileError::UnsupportedFeature { .. })
    ));
}
