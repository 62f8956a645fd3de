//! Pre-resolution structural checks.

use sonance_ast::ast::{
    scope, AstArena, EndpointKind, ExprId, ExprKind, FunctionId, FunctionKind, ModuleId,
    SearchMask, StructId, Symbol, UsingId,
};
use sonance_ast::foundation::{Ident, Span};
use sonance_ast::{CompileError, ErrorKind};
use std::collections::HashMap;

pub fn check(arena: &AstArena, errors: &mut Vec<CompileError>) {
    let mut stack: Vec<ModuleId> = arena.root_modules.clone();
    while let Some(m) = stack.pop() {
        check_module(arena, m, errors);
        stack.extend(&arena.module(m).sub_modules);
    }
}

fn check_module(arena: &AstArena, module: ModuleId, errors: &mut Vec<CompileError>) {
    check_duplicate_names(arena, module, errors);
    check_processor_shape(arena, module, errors);
    check_recursive_types(arena, module, errors);
}

/// Endpoints, state variables, structs, usings, aliases, instances and
/// sub-modules share one namespace within a module.
fn check_duplicate_names(arena: &AstArena, module: ModuleId, errors: &mut Vec<CompileError>) {
    let m = arena.module(module);
    let mut seen: HashMap<Ident, Span> = HashMap::new();
    let mut check = |name: Ident, span: Span, errors: &mut Vec<CompileError>| {
        if let Some(first) = seen.get(&name) {
            errors.push(
                CompileError::new(
                    ErrorKind::DuplicateName,
                    span,
                    format!("'{}' is already declared in this scope", arena.name(name)),
                )
                .with_label(*first, "first declared here"),
            );
        } else {
            seen.insert(name, span);
        }
    };

    for &e in &m.endpoints {
        let d = arena.endpoint(e);
        check(d.name, d.span, errors);
    }
    for &v in &m.state_variables {
        let d = arena.variable(v);
        check(d.name, d.span, errors);
    }
    for &s in &m.structs {
        let d = arena.structure(s);
        check(d.name, d.span, errors);
    }
    for &u in &m.usings {
        let d = arena.using(u);
        check(d.name, d.span, errors);
    }
    for &a in &m.aliases {
        let d = arena.alias(a);
        check(d.name, d.span, errors);
    }
    for &i in &m.instances {
        let d = arena.instance(i);
        check(d.name, d.span, errors);
    }
    for &sub in &m.sub_modules {
        let d = arena.module(sub);
        check(d.name, d.span, errors);
    }
}

fn check_processor_shape(arena: &AstArena, module: ModuleId, errors: &mut Vec<CompileError>) {
    let m = arena.module(module);
    if !m.is_processor_base() {
        return;
    }

    if !m.endpoints.iter().any(|&e| arena.endpoint(e).is_output()) {
        errors.push(CompileError::new(
            ErrorKind::ProcessorNeedsOutput,
            m.span,
            format!(
                "processor '{}' must declare at least one output",
                arena.name(m.name)
            ),
        ));
    }

    let mut run_functions: Vec<FunctionId> = Vec::new();
    for &f in &m.functions {
        let func = arena.function(f);
        match func.kind {
            FunctionKind::Run => {
                run_functions.push(f);
                check_void_niladic(arena, f, errors);
            }
            FunctionKind::Init => check_void_niladic(arena, f, errors),
            _ => {}
        }
    }

    if run_functions.len() > 1 {
        errors.push(CompileError::new(
            ErrorKind::MultipleRunFunctions,
            arena.function(run_functions[1]).span,
            "a processor can only have one run function",
        ));
    }

    // Graphs run their children; a processor with any non-event endpoint
    // needs a run function of its own.
    if m.kind == sonance_ast::ast::ModuleKind::Processor && run_functions.is_empty() {
        let has_non_event = m
            .endpoints
            .iter()
            .any(|&e| arena.endpoint(e).kind != EndpointKind::Event);
        if has_non_event {
            errors.push(CompileError::new(
                ErrorKind::ProcessorNeedsRunFunction,
                m.span,
                format!(
                    "processor '{}' needs a run function",
                    arena.name(m.name)
                ),
            ));
        }
    }
}

fn check_void_niladic(arena: &AstArena, function: FunctionId, errors: &mut Vec<CompileError>) {
    let func = arena.function(function);
    let name = arena.name(func.name);
    if func.return_type.is_some() {
        errors.push(CompileError::new(
            ErrorKind::FunctionMustBeVoid,
            func.span,
            format!("'{name}' must return void"),
        ));
    }
    if !func.parameters.is_empty() {
        errors.push(CompileError::new(
            ErrorKind::FunctionHasParams,
            func.span,
            format!("'{name}' must not take parameters"),
        ));
    }
}

/// Struct and using declarations may not reach themselves through their own
/// member or target types. Detected with an explicit visit stack so mutual
/// recursion reports cleanly instead of overflowing.
fn check_recursive_types(arena: &AstArena, module: ModuleId, errors: &mut Vec<CompileError>) {
    let m = arena.module(module);
    for &s in &m.structs {
        let mut stack = Vec::new();
        visit_struct(arena, s, &mut stack, errors);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeDecl {
    Struct(StructId),
    Using(UsingId),
}

fn visit_struct(
    arena: &AstArena,
    s: StructId,
    stack: &mut Vec<TypeDecl>,
    errors: &mut Vec<CompileError>,
) {
    if stack.contains(&TypeDecl::Struct(s)) {
        let decl = arena.structure(s);
        let kind = if stack.len() == 1 {
            ErrorKind::TypeContainsItself
        } else {
            ErrorKind::RecursiveTypes
        };
        errors.push(CompileError::new(
            kind,
            decl.span,
            format!("type '{}' contains itself", arena.name(decl.name)),
        ));
        return;
    }
    stack.push(TypeDecl::Struct(s));
    let members: Vec<ExprId> = arena.structure(s).members.iter().map(|m| m.ty).collect();
    for ty in members {
        visit_type_expr(arena, ty, stack, errors);
    }
    stack.pop();
}

fn visit_using(
    arena: &AstArena,
    u: UsingId,
    stack: &mut Vec<TypeDecl>,
    errors: &mut Vec<CompileError>,
) {
    if stack.contains(&TypeDecl::Using(u)) {
        let decl = arena.using(u);
        errors.push(CompileError::new(
            ErrorKind::RecursiveTypes,
            decl.span,
            format!(
                "type alias '{}' refers back to itself",
                arena.name(decl.name)
            ),
        ));
        return;
    }
    stack.push(TypeDecl::Using(u));
    visit_type_expr(arena, arena.using(u).target, stack, errors);
    stack.pop();
}

fn visit_type_expr(
    arena: &AstArena,
    expr: ExprId,
    stack: &mut Vec<TypeDecl>,
    errors: &mut Vec<CompileError>,
) {
    match &arena.expr(expr).kind {
        ExprKind::Name(path) => {
            let start = arena.expr(expr).scope;
            let symbols = scope::find_symbols(arena, start, path, &SearchMask::types());
            for sym in symbols {
                match sym {
                    Symbol::Struct(s) => visit_struct(arena, s, stack, errors),
                    Symbol::Using(u) => visit_using(arena, u, stack, errors),
                    _ => {}
                }
            }
        }
        ExprKind::BracketSubscript { parent, .. }
        | ExprKind::ChevronSubscript { parent, .. }
        | ExprKind::MetaFunction { source: parent, .. } => {
            visit_type_expr(arena, *parent, stack, errors);
        }
        _ => {}
    }
}
