//! End-to-end pipeline tests: small programs built the way the parser would
//! build them, compiled all the way to optimised IR.

use crate::{compile_with_options, CompileResult};
use sonance_ast::ast::{
    AstBuilder, EndpointDirection, EndpointKind, ExprId, FunctionKind, ModuleId, ModuleKind,
    ScopeId, StmtKind,
};
use sonance_ast::types::{BinaryOp, Type, Value};
use sonance_ast::ErrorKind;
use sonance_resolve::ResolverOptions;
use sonance_ir::{Expr, Statement};

fn compile(builder: &mut AstBuilder) -> CompileResult {
    compile_with_options(&mut builder.arena, &ResolverOptions::default())
}

/// `processor <name> { input stream float32 audioIn; output stream float32
/// audioOut; run { loop { audioOut <- audioIn; advance; } } }`
fn pass_through_processor(b: &mut AstBuilder, name: &str) -> ModuleId {
    let p = b.add_module(ModuleKind::Processor, name, None);
    let scope = b.module_scope(p);
    let in_ty = b.type_expr(scope, Type::float32());
    b.add_endpoint(
        p,
        "audioIn",
        EndpointDirection::Input,
        EndpointKind::Stream,
        vec![in_ty],
    );
    let out_ty = b.type_expr(scope, Type::float32());
    b.add_endpoint(
        p,
        "audioOut",
        EndpointDirection::Output,
        EndpointKind::Stream,
        vec![out_ty],
    );

    let run = b.add_function(p, "run", FunctionKind::Run, None);
    let fscope = b.function_scope(run);
    let (body, body_scope) = b.open_block(fscope);
    let target = b.name_expr(body_scope, &["audioOut"]);
    let value = b.name_expr(body_scope, &["audioIn"]);
    let write = b.write_endpoint(body_scope, target, value);
    let write_stmt = b.stmt(body_scope, StmtKind::Expression(write));
    b.push_to_block(body, write_stmt);
    let advance = b.advance(body_scope);
    let advance_stmt = b.stmt(body_scope, StmtKind::Expression(advance));
    b.push_to_block(body, advance_stmt);
    let loop_stmt = b.stmt(
        fscope,
        StmtKind::Loop {
            initialiser: None,
            condition: None,
            iterator: None,
            count: None,
            body,
            is_do_while: false,
        },
    );
    b.set_body(run, vec![loop_stmt]);
    p
}

/// A run function that writes `value` to `audioOut` under the given
/// condition shape, used by the branch-elimination tests.
fn run_writing_constant(
    b: &mut AstBuilder,
    p: ModuleId,
    then_value: f32,
    else_value: f32,
    condition: impl FnOnce(&mut AstBuilder, ScopeId) -> ExprId,
    is_const: bool,
) {
    let run = b.add_function(p, "run", FunctionKind::Run, None);
    let fscope = b.function_scope(run);

    let (loop_body, loop_scope) = b.open_block(fscope);

    let cond = condition(b, loop_scope);

    let (then_block, then_scope) = b.open_block(loop_scope);
    let target = b.name_expr(then_scope, &["audioOut"]);
    let value = b.constant(then_scope, Value::from_f32(then_value));
    let write = b.write_endpoint(then_scope, target, value);
    let write_stmt = b.stmt(then_scope, StmtKind::Expression(write));
    b.push_to_block(then_block, write_stmt);

    let (else_block, else_scope) = b.open_block(loop_scope);
    let target = b.name_expr(else_scope, &["audioOut"]);
    let value = b.constant(else_scope, Value::from_f32(else_value));
    let write = b.write_endpoint(else_scope, target, value);
    let write_stmt = b.stmt(else_scope, StmtKind::Expression(write));
    b.push_to_block(else_block, write_stmt);

    let if_stmt = b.stmt(
        loop_scope,
        StmtKind::If {
            condition: cond,
            then_branch: then_block,
            else_branch: Some(else_block),
            is_const,
        },
    );
    b.push_to_block(loop_body, if_stmt);
    let advance = b.advance(loop_scope);
    let advance_stmt = b.stmt(loop_scope, StmtKind::Expression(advance));
    b.push_to_block(loop_body, advance_stmt);

    let loop_stmt = b.stmt(
        fscope,
        StmtKind::Loop {
            initialiser: None,
            condition: None,
            iterator: None,
            count: None,
            body: loop_body,
            is_do_while: false,
        },
    );
    b.set_body(run, vec![loop_stmt]);
}

fn constant_writes(result: &CompileResult) -> Vec<f64> {
    let program = result.program.as_ref().expect("program");
    let mut writes = Vec::new();
    for module in &program.modules {
        for &f in &module.functions {
            for block in &program.function(f).blocks {
                for s in &block.statements {
                    if let Statement::WriteStream { value, .. } = s {
                        if let Expr::Constant(v) = value {
                            if let Some(d) = v.as_f64() {
                                writes.push(d);
                            }
                        }
                    }
                }
            }
        }
    }
    writes
}

#[test]
fn test_minimal_processor_compiles() {
    let mut b = AstBuilder::new();
    pass_through_processor(&mut b, "Gain");
    let result = compile(&mut b);
    assert!(result.messages.is_empty(), "{:?}", result.messages);

    let program = result.program.expect("compilation should succeed");
    let main = program.main_module().expect("main processor");
    assert_eq!(main.name, "Gain");
    assert_eq!(main.input_details().len(), 1);
    assert_eq!(main.output_details().len(), 1);
    assert_eq!(main.input_details()[0].id, "in:audioIn");
    assert_eq!(
        main.input_details()[0].kind,
        EndpointKind::Stream
    );
}

#[test]
fn test_feedback_without_delay_is_rejected() {
    let mut b = AstBuilder::new();
    pass_through_processor(&mut b, "A");
    pass_through_processor(&mut b, "B");

    let g = b.add_module(ModuleKind::Graph, "Loop", None);
    let gscope = b.module_scope(g);
    let out_ty = b.type_expr(gscope, Type::float32());
    b.add_endpoint(
        g,
        "mix",
        EndpointDirection::Output,
        EndpointKind::Stream,
        vec![out_ty],
    );
    let a_path = b.path(&["A"]);
    b.add_instance(g, "a", a_path);
    let b_path = b.path(&["B"]);
    b.add_instance(g, "b", b_path);
    b.add_connection(g, (Some("a"), "audioOut"), (Some("b"), "audioIn"), None);
    b.add_connection(g, (Some("b"), "audioOut"), (Some("a"), "audioIn"), None);
    b.add_connection(g, (Some("b"), "audioOut"), (None, "mix"), None);

    let result = compile(&mut b);
    assert!(result.program.is_none());
    let feedback = result
        .messages
        .iter()
        .find(|m| m.kind == ErrorKind::FeedbackInGraph)
        .expect("feedback diagnostic");
    assert!(feedback.message.contains("a -> b -> a"), "{}", feedback.message);
}

#[test]
fn test_feedback_with_delay_is_accepted() {
    let mut b = AstBuilder::new();
    pass_through_processor(&mut b, "A");
    pass_through_processor(&mut b, "B");

    let g = b.add_module(ModuleKind::Graph, "Loop", None);
    let gscope = b.module_scope(g);
    let out_ty = b.type_expr(gscope, Type::float32());
    b.add_endpoint(
        g,
        "mix",
        EndpointDirection::Output,
        EndpointKind::Stream,
        vec![out_ty],
    );
    let a_path = b.path(&["A"]);
    b.add_instance(g, "a", a_path);
    let b_path = b.path(&["B"]);
    b.add_instance(g, "b", b_path);
    b.add_connection(g, (Some("a"), "audioOut"), (Some("b"), "audioIn"), None);
    let delay = b.constant(gscope, Value::from_i32(1));
    b.add_connection(g, (Some("b"), "audioOut"), (Some("a"), "audioIn"), Some(delay));
    b.add_connection(g, (Some("b"), "audioOut"), (None, "mix"), None);
    b.arena.module_mut(g).annotation.set("main", Value::from_bool(true));

    let result = compile(&mut b);
    assert!(result.program.is_some(), "{:?}", result.messages);
    let program = result.program.unwrap();
    let main = program.main_module().unwrap();
    assert_eq!(main.name, "Loop");
    assert_eq!(main.connections.len(), 3);
    assert_eq!(main.connections[1].delay_length, 1);
}

#[test]
fn test_generic_function_specialises_per_argument_type() {
    let mut b = AstBuilder::new();
    let p = pass_through_processor(&mut b, "P");

    // f<T> (T x) -> T { return x; }
    let wildcard = b.ident("T");
    let f = b.add_function(p, "f", FunctionKind::Normal, None);
    let fscope = b.function_scope(f);
    let ret_ty = b.name_expr(fscope, &["T"]);
    b.arena.function_mut(f).return_type = Some(ret_ty);
    b.arena.function_mut(f).generic_wildcards.push(wildcard);
    let param_ty = b.name_expr(fscope, &["T"]);
    b.add_parameter(f, "x", param_ty);
    let (body, body_scope) = b.open_block(fscope);
    let ret_value = b.name_expr(body_scope, &["x"]);
    let ret_stmt = b.stmt(body_scope, StmtKind::Return(Some(ret_value)));
    b.push_to_block(body, ret_stmt);
    b.arena.function_mut(f).body = Some(body);

    // In run: let a = f(0.5f); let c = f(2); audioOut <- a;
    let run_id = b.arena.module(p).functions[0];
    let run_body = b.arena.function(run_id).body.unwrap();
    let loop_stmt = match &b.arena.stmt(run_body).kind {
        StmtKind::Block { statements, .. } => statements[0],
        _ => panic!("expected block body"),
    };
    let loop_body = match &b.arena.stmt(loop_stmt).kind {
        StmtKind::Loop { body, .. } => *body,
        _ => panic!("expected loop"),
    };
    let loop_scope = match &b.arena.stmt(loop_body).kind {
        StmtKind::Block { body_scope, .. } => *body_scope,
        _ => panic!("expected loop block"),
    };

    let callee = b.name_expr(loop_scope, &["f"]);
    let arg = b.constant(loop_scope, Value::from_f32(0.5));
    let call_f32 = b.call(loop_scope, callee, vec![arg]);
    let (decl_a, _) = b.local_variable(loop_scope, "a", None, Some(call_f32), false);

    let callee = b.name_expr(loop_scope, &["f"]);
    let arg = b.constant(loop_scope, Value::from_i32(2));
    let call_i32 = b.call(loop_scope, callee, vec![arg]);
    let (decl_c, _) = b.local_variable(loop_scope, "c", None, Some(call_i32), false);

    // Prepend the declarations so the loop still ends with advance.
    if let StmtKind::Block { statements, .. } = &mut b.arena.stmt_mut(loop_body).kind {
        statements.insert(0, decl_a);
        statements.insert(1, decl_c);
    }

    let result = compile(&mut b);
    assert!(result.program.is_some(), "{:?}", result.messages);

    let specialised: Vec<String> = b
        .arena
        .functions
        .iter()
        .filter(|f| f.original_generic_function.is_some())
        .map(|f| b.arena.idents.name(f.name).to_string())
        .collect();
    assert_eq!(specialised.len(), 2, "{specialised:?}");
    assert!(specialised.contains(&"_f_specialised_f32".to_string()));
    assert!(specialised.contains(&"_f_specialised_i32".to_string()));
}

#[test]
fn test_constant_false_branch_is_eliminated() {
    let mut b = AstBuilder::new();
    let p = b.add_module(ModuleKind::Processor, "P", None);
    let scope = b.module_scope(p);
    let out_ty = b.type_expr(scope, Type::float32());
    b.add_endpoint(
        p,
        "audioOut",
        EndpointDirection::Output,
        EndpointKind::Stream,
        vec![out_ty],
    );
    run_writing_constant(
        &mut b,
        p,
        1.0,
        2.0,
        |b, scope| b.constant(scope, Value::from_bool(false)),
        false,
    );

    let result = compile(&mut b);
    assert!(result.program.is_some(), "{:?}", result.messages);
    // Only the else arm's write survives lowering.
    assert_eq!(constant_writes(&result), vec![2.0]);
}

#[test]
fn test_const_if_keeps_live_arm() {
    let mut b = AstBuilder::new();
    let p = b.add_module(ModuleKind::Processor, "P", None);
    let scope = b.module_scope(p);
    let out_ty = b.type_expr(scope, Type::float32());
    b.add_endpoint(
        p,
        "audioOut",
        EndpointDirection::Output,
        EndpointKind::Stream,
        vec![out_ty],
    );
    // const if (2 + 3 == 5) writes 1.0 else 2.0
    run_writing_constant(
        &mut b,
        p,
        1.0,
        2.0,
        |b, scope| {
            let two = b.constant(scope, Value::from_i32(2));
            let three = b.constant(scope, Value::from_i32(3));
            let sum = b.binary(scope, BinaryOp::Add, two, three);
            let five = b.constant(scope, Value::from_i32(5));
            b.binary(scope, BinaryOp::Equals, sum, five)
        },
        true,
    );

    let result = compile(&mut b);
    assert!(result.program.is_some(), "{:?}", result.messages);
    assert_eq!(constant_writes(&result), vec![1.0]);
}

fn add_helper_function(b: &mut AstBuilder, p: ModuleId, name: &str) {
    let scope = b.module_scope(p);
    let ret_ty = b.type_expr(scope, Type::float32());
    let f = b.add_function(p, name, FunctionKind::Normal, Some(ret_ty));
    let fscope = b.function_scope(f);
    let (body, body_scope) = b.open_block(fscope);
    let value = b.constant(body_scope, Value::from_f32(0.5));
    let ret = b.stmt(body_scope, StmtKind::Return(Some(value)));
    b.push_to_block(body, ret);
    b.arena.function_mut(f).body = Some(body);
}

#[test]
fn test_uncalled_private_function_is_removed() {
    let mut b = AstBuilder::new();
    let p = pass_through_processor(&mut b, "P");
    add_helper_function(&mut b, p, "unusedHelper");

    let result = compile(&mut b);
    let program = result.program.expect("compiles");
    let main = program.main_module().unwrap();
    assert!(main.find_function(&program, "unusedHelper").is_none());
    assert!(main.find_function(&program, "run").is_some());
}

#[test]
fn test_do_not_optimise_function_is_retained() {
    let mut b = AstBuilder::new();
    let p = pass_through_processor(&mut b, "P");
    add_helper_function(&mut b, p, "keepMe");
    let f = *b.arena.module(p).functions.last().unwrap();
    b.arena
        .function_mut(f)
        .annotation
        .set("do_not_optimise", Value::from_bool(true));

    let result = compile(&mut b);
    let program = result.program.expect("compiles");
    let main = program.main_module().unwrap();
    assert!(main.find_function(&program, "keepMe").is_some());
}

#[test]
fn test_string_dictionary_is_garbage_collected_soundly() {
    let mut b = AstBuilder::new();
    let p = pass_through_processor(&mut b, "P");
    let scope = b.module_scope(p);
    let string_ty = b.type_expr(scope, Type::string());
    b.add_endpoint(
        p,
        "_console",
        EndpointDirection::Output,
        EndpointKind::Event,
        vec![string_ty],
    );

    // Reach into the run loop and add one used and one unused literal.
    let run_id = b.arena.module(p).functions[0];
    let run_body = b.arena.function(run_id).body.unwrap();
    let loop_body = {
        let first = match &b.arena.stmt(run_body).kind {
            StmtKind::Block { statements, .. } => statements[0],
            _ => panic!("expected block"),
        };
        match &b.arena.stmt(first).kind {
            StmtKind::Loop { body, .. } => *body,
            _ => panic!("expected loop"),
        }
    };
    let loop_scope = match &b.arena.stmt(loop_body).kind {
        StmtKind::Block { body_scope, .. } => *body_scope,
        _ => panic!("expected loop block"),
    };

    let console = b.name_expr(loop_scope, &["_console"]);
    let hello = b.string_literal(loop_scope, "hello");
    let write = b.write_endpoint(loop_scope, console, hello);
    let write_stmt = b.stmt(loop_scope, StmtKind::Expression(write));
    let unused = b.string_literal(loop_scope, "never shown");
    let (unused_decl, _) = b.local_variable(loop_scope, "s", None, Some(unused), false);
    if let StmtKind::Block { statements, .. } = &mut b.arena.stmt_mut(loop_body).kind {
        statements.insert(0, write_stmt);
        statements.insert(1, unused_decl);
    }

    let result = compile(&mut b);
    let program = result.program.expect("compiles");

    // Soundness: every handle still referenced resolves.
    for module in &program.modules {
        for &f in &module.functions {
            program.function(f).visit_exprs(|e, _| {
                if let Expr::Constant(v) = e {
                    if let Some(h) = v.string_handle() {
                        assert!(
                            program.string_dictionary.get(h).is_some(),
                            "dangling string handle after GC"
                        );
                    }
                }
            });
        }
    }
    // The unused literal is gone.
    assert_eq!(program.string_dictionary.len(), 1);
}

#[test]
fn test_compilation_is_deterministic() {
    let build = || {
        let mut b = AstBuilder::new();
        pass_through_processor(&mut b, "P");
        compile(&mut b).program.expect("compiles")
    };
    assert_eq!(build().hash(), build().hash());
}

#[test]
fn test_processor_without_output_is_rejected() {
    let mut b = AstBuilder::new();
    let p = b.add_module(ModuleKind::Processor, "Silent", None);
    let scope = b.module_scope(p);
    let in_ty = b.type_expr(scope, Type::float32());
    b.add_endpoint(
        p,
        "audioIn",
        EndpointDirection::Input,
        EndpointKind::Stream,
        vec![in_ty],
    );
    let result = compile(&mut b);
    assert!(result.program.is_none());
    assert!(result
        .messages
        .iter()
        .any(|m| m.kind == ErrorKind::ProcessorNeedsOutput));
}
