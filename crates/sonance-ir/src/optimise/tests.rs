//! Optimiser tests over hand-built programs.

use super::*;
use crate::function::{
    Block, Expr, IrFnId, IrFunction, IrFunctionKind, IrVariable, Statement, Terminator, VarRole,
};
use crate::optimise::inline::{can_inline, inline_all_calls_to_function};
use crate::program::{Module, Program, ROOT_NAMESPACE};
use sonance_ast::ast::ModuleKind;
use sonance_ast::types::{BinaryOp, StructMember, Type, Value};
use std::sync::Arc;

fn program_with_processor(name: &str) -> Program {
    let mut p = Program::new();
    p.modules.push(Module::new(
        name,
        format!("{ROOT_NAMESPACE}::{name}"),
        ModuleKind::Processor,
    ));
    p
}

fn exported_function(name: &str) -> IrFunction {
    IrFunction {
        name: name.to_string(),
        kind: IrFunctionKind::Run,
        return_type: Type::void(),
        parameters: Vec::new(),
        blocks: vec![Block::new("entry")],
        annotation: sonance_ast::foundation::Annotation::new(),
        is_exported: true,
    }
}

fn plain_function(name: &str, return_type: Type) -> IrFunction {
    IrFunction {
        name: name.to_string(),
        kind: IrFunctionKind::Normal,
        return_type,
        parameters: Vec::new(),
        blocks: vec![Block::new("entry")],
        annotation: sonance_ast::foundation::Annotation::new(),
        is_exported: false,
    }
}

#[test]
fn test_dead_store_to_local_is_removed() {
    let mut p = program_with_processor("P");
    let unused = p.add_variable(IrVariable::new("unused", Type::int32(), VarRole::MutableLocal));
    let mut run = exported_function("run");
    run.blocks[0].statements.push(Statement::Assign {
        target: Expr::Variable(unused),
        source: Expr::Constant(Value::from_i32(1)),
    });
    let f = p.add_function(run);
    p.modules[0].functions.push(f);

    remove_unused_variables(&mut p);
    assert!(p.function(f).blocks[0].statements.is_empty());
}

#[test]
fn test_write_once_local_becomes_constant() {
    let mut p = program_with_processor("P");
    let once = p.add_variable(IrVariable::new("once", Type::int32(), VarRole::MutableLocal));
    let sink = p.add_variable(IrVariable::new("sink", Type::int32(), VarRole::State));
    let mut run = exported_function("run");
    run.blocks[0].statements.push(Statement::Assign {
        target: Expr::Variable(once),
        source: Expr::Constant(Value::from_i32(7)),
    });
    run.blocks[0].statements.push(Statement::Assign {
        target: Expr::Variable(sink),
        source: Expr::Variable(once),
    });
    let f = p.add_function(run);
    p.modules[0].functions.push(f);
    p.modules[0].state_variables.push(sink);

    remove_unused_variables(&mut p);
    assert_eq!(p.variable(once).role, VarRole::Constant);
}

#[test]
fn test_duplicate_constants_collapse() {
    let mut p = program_with_processor("P");
    let a = p.add_variable(IrVariable::new("a", Type::int32(), VarRole::Constant));
    let bv = p.add_variable(IrVariable::new("b", Type::int32(), VarRole::Constant));
    let sink = p.add_variable(IrVariable::new("sink", Type::int32(), VarRole::State));
    let mut run = exported_function("run");
    run.blocks[0].statements.push(Statement::Assign {
        target: Expr::Variable(a),
        source: Expr::Constant(Value::from_i32(3)),
    });
    run.blocks[0].statements.push(Statement::Assign {
        target: Expr::Variable(bv),
        source: Expr::Variable(a),
    });
    run.blocks[0].statements.push(Statement::Assign {
        target: Expr::Variable(sink),
        source: Expr::Variable(bv),
    });
    let f = p.add_function(run);
    p.modules[0].functions.push(f);
    p.modules[0].state_variables.push(sink);

    remove_unused_variables(&mut p);
    // b's defining copy is gone and the sink reads a directly.
    let statements = &p.function(f).blocks[0].statements;
    assert_eq!(statements.len(), 2, "{statements:?}");
    match &statements[1] {
        Statement::Assign { source, .. } => {
            assert!(matches!(source, Expr::Variable(v) if *v == a));
        }
        other => panic!("unexpected statement {other:?}"),
    }
}

#[test]
fn test_pure_void_call_with_discarded_result_is_removed() {
    let mut p = program_with_processor("P");
    let pure = p.add_function(plain_function("pure", Type::void()));
    let mut effectful_fn = plain_function("effectful", Type::void());
    effectful_fn.blocks[0].statements.push(Statement::WriteStream {
        output: 0,
        element: None,
        value: Expr::Constant(Value::from_f32(0.0)),
    });
    let effectful = p.add_function(effectful_fn);

    let mut run = exported_function("run");
    run.blocks[0].statements.push(Statement::Call {
        target: None,
        function: pure,
        args: Vec::new(),
    });
    run.blocks[0].statements.push(Statement::Call {
        target: None,
        function: effectful,
        args: Vec::new(),
    });
    let f = p.add_function(run);
    p.modules[0].functions.extend([pure, effectful, f]);

    remove_calls_to_void_functions_without_side_effects(&mut p);
    let statements = &p.function(f).blocks[0].statements;
    assert_eq!(statements.len(), 1);
    assert!(matches!(
        &statements[0],
        Statement::Call { function, .. } if *function == effectful
    ));
}

#[test]
fn test_unreachable_and_empty_blocks_are_eliminated() {
    let mut p = program_with_processor("P");
    let mut run = exported_function("run");
    // entry -> empty(1) -> end(2); orphan(3) is unreachable.
    run.blocks[0].terminator = Terminator::Branch(1);
    run.blocks.push(Block::new("empty"));
    run.blocks[1].terminator = Terminator::Branch(2);
    let mut end = Block::new("end");
    end.statements.push(Statement::AdvanceClock);
    end.terminator = Terminator::ReturnVoid;
    run.blocks.push(end);
    let mut orphan = Block::new("orphan");
    orphan.statements.push(Statement::AdvanceClock);
    orphan.terminator = Terminator::Branch(3);
    run.blocks.push(orphan);

    let f = p.add_function(run);
    p.modules[0].functions.push(f);

    blocks::optimise_function_blocks(&mut p);
    let func = p.function(f);
    // Everything folds into the entry block.
    assert_eq!(func.blocks.len(), 1, "{:?}", func.blocks);
    assert_eq!(func.blocks[0].statements.len(), 1);
    assert!(matches!(func.blocks[0].terminator, Terminator::ReturnVoid));
}

#[test]
fn test_inlining_replaces_call_with_body() {
    let mut p = program_with_processor("P");

    // helper(x) { return x + 1; }
    let x = p.add_variable(IrVariable::new("x", Type::int32(), VarRole::Parameter));
    let mut helper = plain_function("helper", Type::int32());
    helper.parameters.push(x);
    helper.blocks[0].terminator = Terminator::ReturnValue(Expr::Binary {
        op: BinaryOp::Add,
        lhs: Box::new(Expr::Variable(x)),
        rhs: Box::new(Expr::Constant(Value::from_i32(1))),
        ty: Type::int32(),
    });
    let helper_id = p.add_function(helper);

    // run { result = helper(41); }
    let result = p.add_variable(IrVariable::new("result", Type::int32(), VarRole::State));
    let mut run = exported_function("run");
    run.blocks[0].statements.push(Statement::Call {
        target: Some(Expr::Variable(result)),
        function: helper_id,
        args: vec![Expr::Constant(Value::from_i32(41))],
    });
    let run_id = p.add_function(run);
    p.modules[0].functions.extend([helper_id, run_id]);
    p.modules[0].state_variables.push(result);

    assert!(can_inline(&p, run_id, helper_id));
    assert!(inline_all_calls_to_function(&mut p, helper_id));

    // No call remains and the callee is unregistered.
    assert!(!p.modules[0].functions.contains(&helper_id));
    let run = p.function(run_id);
    for block in &run.blocks {
        for s in &block.statements {
            assert!(!matches!(s, Statement::Call { .. }));
        }
    }
    // The add survives somewhere in the inlined blocks.
    let mut found_add = false;
    run.visit_exprs(|e, _| {
        if matches!(e, Expr::Binary { op: BinaryOp::Add, .. }) {
            found_add = true;
        }
    });
    assert!(found_add);
}

#[test]
fn test_recursive_function_is_not_inlineable() {
    let mut p = program_with_processor("P");
    let mut rec = plain_function("rec", Type::void());
    let rec_id = IrFnId(0);
    rec.blocks[0].statements.push(Statement::Call {
        target: None,
        function: rec_id,
        args: Vec::new(),
    });
    let actual = p.add_function(rec);
    assert_eq!(actual, rec_id);
    let run = p.add_function(exported_function("run"));
    p.modules[0].functions.extend([actual, run]);

    assert!(!can_inline(&p, run, actual));
}

#[test]
fn test_unused_structs_are_dropped_and_unread_members_reported() {
    let mut p = program_with_processor("P");
    let used = Arc::new(sonance_ast::types::Structure {
        name: "Voice".to_string(),
        members: vec![
            StructMember {
                name: "level".to_string(),
                ty: Type::float32(),
            },
            StructMember {
                name: "pan".to_string(),
                ty: Type::float32(),
            },
        ],
    });
    let unused = Arc::new(sonance_ast::types::Structure {
        name: "Orphan".to_string(),
        members: vec![],
    });
    p.modules[0].structs.push(used.clone());
    p.modules[0].structs.push(unused);

    let voice = p.add_variable(IrVariable::new(
        "voice",
        Type::structure(used.clone()),
        VarRole::State,
    ));
    let sink = p.add_variable(IrVariable::new("sink", Type::float32(), VarRole::State));
    let mut run = exported_function("run");
    run.blocks[0].statements.push(Statement::Assign {
        target: Expr::Variable(sink),
        source: Expr::Member {
            parent: Box::new(Expr::Variable(voice)),
            member: "level".to_string(),
            ty: Type::float32(),
        },
    });
    let f = p.add_function(run);
    p.modules[0].functions.push(f);
    p.modules[0].state_variables.extend([voice, sink]);

    remove_unused_structs(&mut p);
    assert_eq!(p.modules[0].structs.len(), 1);
    assert_eq!(p.modules[0].structs[0].name, "Voice");

    let reports = find_unread_struct_members(&p);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].unread_members, vec!["pan".to_string()]);
}

#[test]
fn test_empty_processor_is_removed() {
    let mut p = program_with_processor("Empty");
    p.modules.push(Module::new(
        "Keep",
        format!("{ROOT_NAMESPACE}::Keep"),
        ModuleKind::Processor,
    ));
    let f = p.add_function(exported_function("run"));
    p.modules[1].functions.push(f);

    remove_unused_processors(&mut p);
    assert_eq!(p.modules.len(), 1);
    assert_eq!(p.modules[0].name, "Keep");
}
