//! Resolution and validation tests over programmatically built trees.

use crate::resolve::{resolve_compilation, ResolverOptions};
use crate::validate::{validate_post_resolution, validate_pre_resolution};
use sonance_ast::ast::{
    AstBuilder, EndpointDirection, EndpointKind, ExprKind, FunctionKind, ModuleId, ModuleKind,
    StmtKind,
};
use sonance_ast::types::{BinaryOp, BoundedIntMode, Type, Value};
use sonance_ast::ErrorKind;

fn resolve(b: &mut AstBuilder) -> Result<(), Vec<sonance_ast::CompileError>> {
    resolve_compilation(&mut b.arena, &ResolverOptions::default())
}

/// Minimal valid processor shell: one float output and a run function whose
/// body is supplied by the caller as statements in the run scope.
fn processor_shell(b: &mut AstBuilder, name: &str) -> (ModuleId, sonance_ast::ast::FunctionId) {
    let p = b.add_module(ModuleKind::Processor, name, None);
    let scope = b.module_scope(p);
    let out_ty = b.type_expr(scope, Type::float32());
    b.add_endpoint(
        p,
        "audioOut",
        EndpointDirection::Output,
        EndpointKind::Stream,
        vec![out_ty],
    );
    let run = b.add_function(p, "run", FunctionKind::Run, None);
    (p, run)
}

fn simple_run_body(b: &mut AstBuilder, run: sonance_ast::ast::FunctionId) {
    let fscope = b.function_scope(run);
    let (body, body_scope) = b.open_block(fscope);
    let target = b.name_expr(body_scope, &["audioOut"]);
    let value = b.constant(body_scope, Value::from_f32(0.0));
    let write = b.write_endpoint(body_scope, target, value);
    let stmt = b.stmt(body_scope, StmtKind::Expression(write));
    b.push_to_block(body, stmt);
    let advance = b.advance(body_scope);
    let stmt = b.stmt(body_scope, StmtKind::Expression(advance));
    b.push_to_block(body, stmt);
    b.arena.function_mut(run).body = Some(body);
}

#[test]
fn test_duplicate_endpoint_names_are_rejected() {
    let mut b = AstBuilder::new();
    let (p, run) = processor_shell(&mut b, "P");
    simple_run_body(&mut b, run);
    let scope = b.module_scope(p);
    let ty = b.type_expr(scope, Type::float32());
    b.add_endpoint(
        p,
        "audioOut",
        EndpointDirection::Input,
        EndpointKind::Stream,
        vec![ty],
    );

    let errors = validate_pre_resolution(&b.arena);
    assert!(errors.iter().any(|e| e.kind == ErrorKind::DuplicateName));
}

#[test]
fn test_static_assertion_failure_carries_its_message() {
    let mut b = AstBuilder::new();
    let (_, run) = processor_shell(&mut b, "P");
    let fscope = b.function_scope(run);
    let (body, body_scope) = b.open_block(fscope);
    let condition = b.constant(body_scope, Value::from_bool(false));
    let assertion = b.expr(
        body_scope,
        ExprKind::StaticAssertion {
            condition,
            message: Some("the wavetable must be a power of two".to_string()),
        },
    );
    let stmt = b.stmt(body_scope, StmtKind::Expression(assertion));
    b.push_to_block(body, stmt);
    let advance = b.advance(body_scope);
    let stmt = b.stmt(body_scope, StmtKind::Expression(advance));
    b.push_to_block(body, stmt);
    b.arena.function_mut(run).body = Some(body);

    resolve(&mut b).unwrap();
    let errors = validate_post_resolution(&b.arena);
    let failure = errors
        .iter()
        .find(|e| e.kind == ErrorKind::StaticAssertionFailure)
        .expect("assertion failure");
    assert!(failure.message.contains("power of two"));
}

#[test]
fn test_meta_function_chain_resolves_to_constants() {
    // static_assert(float32<4>.size == 4) resolves and holds.
    let mut b = AstBuilder::new();
    let (_, run) = processor_shell(&mut b, "P");
    let fscope = b.function_scope(run);
    let (body, body_scope) = b.open_block(fscope);

    let base = b.type_expr(body_scope, Type::float32());
    let four = b.constant(body_scope, Value::from_i32(4));
    let vector = b.expr(
        body_scope,
        ExprKind::ChevronSubscript {
            parent: base,
            size: four,
        },
    );
    let size_name = b.ident("size");
    let size = b.expr(
        body_scope,
        ExprKind::Dot {
            parent: vector,
            member: size_name,
        },
    );
    let four_again = b.constant(body_scope, Value::from_i64(4));
    let condition = b.binary(body_scope, BinaryOp::Equals, size, four_again);
    let assertion = b.expr(
        body_scope,
        ExprKind::StaticAssertion {
            condition,
            message: None,
        },
    );
    let stmt = b.stmt(body_scope, StmtKind::Expression(assertion));
    b.push_to_block(body, stmt);
    let advance = b.advance(body_scope);
    let stmt = b.stmt(body_scope, StmtKind::Expression(advance));
    b.push_to_block(body, stmt);
    b.arena.function_mut(run).body = Some(body);

    resolve(&mut b).unwrap();
    let errors = validate_post_resolution(&b.arena);
    assert!(
        !errors.iter().any(|e| e.kind == ErrorKind::StaticAssertionFailure),
        "{errors:?}"
    );
}

#[test]
fn test_comparison_outside_bounded_range_is_flagged() {
    // A wrap<8> state variable can never be >= 9.
    let mut b = AstBuilder::new();
    let (p, run) = processor_shell(&mut b, "P");
    let scope = b.module_scope(p);
    let wrap_ty = b.type_expr(scope, Type::bounded(BoundedIntMode::Wrap, 8));
    b.add_state_variable(p, "step", Some(wrap_ty), None);

    let fscope = b.function_scope(run);
    let (body, body_scope) = b.open_block(fscope);
    let step = b.name_expr(body_scope, &["step"]);
    let nine = b.constant(body_scope, Value::from_i32(9));
    let cmp = b.binary(body_scope, BinaryOp::GreaterThanOrEqual, step, nine);
    let (decl, _) = b.local_variable(body_scope, "x", None, Some(cmp), false);
    b.push_to_block(body, decl);
    let advance = b.advance(body_scope);
    let stmt = b.stmt(body_scope, StmtKind::Expression(advance));
    b.push_to_block(body, stmt);
    b.arena.function_mut(run).body = Some(body);

    resolve(&mut b).unwrap();
    let errors = validate_post_resolution(&b.arena);
    assert!(
        errors.iter().any(|e| e.kind == ErrorKind::ComparisonAlwaysFalse),
        "{errors:?}"
    );
}

#[test]
fn test_parameterised_processor_specialises_per_type() {
    // processor Template (using T) { output stream T audioOut; run ... }
    let mut b = AstBuilder::new();
    let template = b.add_module(ModuleKind::Processor, "Template", None);
    b.add_type_param(template, "T");
    let scope = b.module_scope(template);
    let out_ty = b.name_expr(scope, &["T"]);
    b.add_endpoint(
        template,
        "audioOut",
        EndpointDirection::Output,
        EndpointKind::Stream,
        vec![out_ty],
    );
    let run = b.add_function(template, "run", FunctionKind::Run, None);
    let fscope = b.function_scope(run);
    let (body, body_scope) = b.open_block(fscope);
    let target = b.name_expr(body_scope, &["audioOut"]);
    let value = b.constant(body_scope, Value::from_f32(0.0));
    let write = b.write_endpoint(body_scope, target, value);
    let stmt = b.stmt(body_scope, StmtKind::Expression(write));
    b.push_to_block(body, stmt);
    let advance = b.advance(body_scope);
    let stmt = b.stmt(body_scope, StmtKind::Expression(advance));
    b.push_to_block(body, stmt);
    b.arena.function_mut(run).body = Some(body);

    // graph Main { output stream float32 mix; node t = Template<float32>; }
    let g = b.add_module(ModuleKind::Graph, "Main", None);
    let gscope = b.module_scope(g);
    let mix_ty = b.type_expr(gscope, Type::float32());
    b.add_endpoint(
        g,
        "mix",
        EndpointDirection::Output,
        EndpointKind::Stream,
        vec![mix_ty],
    );
    let target_path = b.path(&["Template"]);
    let instance = b.add_instance(g, "t", target_path);
    let arg = b.type_expr(gscope, Type::float32());
    b.arena.instance_mut(instance).args.push(arg);
    b.add_connection(g, (Some("t"), "audioOut"), (None, "mix"), None);

    resolve(&mut b).unwrap();

    let clone = b
        .arena
        .instance(instance)
        .resolved_target
        .expect("instance resolves to a specialisation");
    let clone_module = b.arena.module(clone);
    assert_eq!(clone_module.specialised_from, Some(template));
    let endpoint = b.arena.endpoint(clone_module.endpoints[0]);
    assert_eq!(
        endpoint.resolved_types.as_ref().unwrap()[0],
        Type::float32()
    );

    // The same arguments reuse the memoised clone.
    let memo = &b.arena.module(template).specialisations;
    assert_eq!(memo.len(), 1);
    assert_eq!(*memo.values().next().unwrap(), clone);
}

#[test]
fn test_resolution_is_idempotent() {
    let mut b = AstBuilder::new();
    let (_, run) = processor_shell(&mut b, "P");
    simple_run_body(&mut b, run);

    resolve(&mut b).unwrap();
    // A second drive over the resolved tree settles immediately.
    resolve(&mut b).unwrap();
    assert!(validate_post_resolution(&b.arena).is_empty());
}

#[test]
fn test_unknown_name_reports_unresolved_symbol() {
    let mut b = AstBuilder::new();
    let (_, run) = processor_shell(&mut b, "P");
    let fscope = b.function_scope(run);
    let (body, body_scope) = b.open_block(fscope);
    let target = b.name_expr(body_scope, &["audioOut"]);
    let value = b.name_expr(body_scope, &["noSuchThing"]);
    let write = b.write_endpoint(body_scope, target, value);
    let stmt = b.stmt(body_scope, StmtKind::Expression(write));
    b.push_to_block(body, stmt);
    b.arena.function_mut(run).body = Some(body);

    let errors = resolve(&mut b).unwrap_err();
    assert!(
        errors.iter().any(|e| e.kind == ErrorKind::UnresolvedSymbol
            && e.message.contains("noSuchThing")),
        "{errors:?}"
    );
}
