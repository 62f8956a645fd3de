//! Declaration resolution: variables, usings, structs, endpoints, aliases,
//! processor instances and connections.
//!
//! Each of these waits for the expressions it depends on to settle, then
//! fills in its own resolved form. Setting a previously empty field counts
//! as progress for the fixed-point driver.

use super::fold::constant_of;
use super::specialise::{specialise_module, SpecArg};
use super::types::{const_index, result_type, type_of_type_expr};
use super::PassContext;
use sonance_ast::ast::{
    scope, walk, AstArena, ExprKind, FunctionId, ModuleId, SearchMask, StmtKind, Symbol, VarId,
};
use sonance_ast::types::{Structure, StructMember, Type};
use sonance_ast::{CompileError, ErrorKind};
use std::sync::Arc;

/// Run one declaration-resolution sweep over a module.
pub fn resolve_declarations(arena: &mut AstArena, module: ModuleId, ctx: &mut PassContext) {
    resolve_usings(arena, module, ctx);
    resolve_structs(arena, module, ctx);
    resolve_module_variables(arena, module, ctx);
    resolve_endpoints(arena, module, ctx);
    resolve_aliases(arena, module, ctx);
    resolve_functions(arena, module, ctx);
    resolve_instances(arena, module, ctx);
    resolve_connections(arena, module, ctx);
}

fn resolve_usings(arena: &mut AstArena, module: ModuleId, ctx: &mut PassContext) {
    let usings = arena.module(module).usings.clone();
    for u in usings {
        if arena.using(u).resolved.is_some() {
            continue;
        }
        let target = arena.using(u).target;
        match type_of_type_expr(arena, target) {
            Some(ty) => {
                arena.using_mut(u).resolved = Some(ty);
                ctx.replaced();
            }
            None => {
                let span = arena.using(u).span;
                let name = arena.name(arena.using(u).name).to_string();
                ctx.fail(|| {
                    CompileError::new(
                        ErrorKind::UnresolvedSymbol,
                        span,
                        format!("cannot resolve the target type of 'using {name}'"),
                    )
                });
            }
        }
    }
}

fn resolve_structs(arena: &mut AstArena, module: ModuleId, ctx: &mut PassContext) {
    let structs = arena.module(module).structs.clone();
    for s in structs {
        if arena.structure(s).structure.is_some() {
            continue;
        }
        let decl = arena.structure(s).clone();
        let mut members = Vec::with_capacity(decl.members.len());
        let mut ready = true;
        for m in &decl.members {
            match type_of_type_expr(arena, m.ty) {
                Some(ty) => members.push(StructMember {
                    name: arena.name(m.name).to_string(),
                    ty,
                }),
                None => {
                    ready = false;
                    break;
                }
            }
        }
        if !ready {
            let span = decl.span;
            let name = arena.name(decl.name).to_string();
            ctx.fail(|| {
                CompileError::new(
                    ErrorKind::UnresolvedSymbol,
                    span,
                    format!("cannot resolve the members of struct '{name}'"),
                )
            });
            continue;
        }
        let structure = Arc::new(Structure {
            name: arena.name(decl.name).to_string(),
            members,
        });
        arena.structure_mut(s).structure = Some(structure);
        ctx.replaced();
    }
}

fn resolve_variable(arena: &mut AstArena, var: VarId, ctx: &mut PassContext) {
    if arena.variable(var).resolved_type.is_some() {
        return;
    }
    let decl = arena.variable(var).clone();
    let ty = match decl.declared_type {
        Some(t) => type_of_type_expr(arena, t),
        None => decl
            .initial_value
            .and_then(|init| result_type(arena, init))
            .map(|t| t.remove_reference().remove_const()),
    };
    match ty {
        Some(ty) => {
            arena.variable_mut(var).resolved_type = Some(ty);
            ctx.replaced();
        }
        None => {
            let name = arena.name(decl.name).to_string();
            ctx.fail(|| {
                CompileError::new(
                    ErrorKind::UnresolvedSymbol,
                    decl.span,
                    format!("cannot resolve the type of '{name}'"),
                )
            });
        }
    }
}

fn resolve_module_variables(arena: &mut AstArena, module: ModuleId, ctx: &mut PassContext) {
    let vars = arena.module(module).state_variables.clone();
    for v in vars {
        resolve_variable(arena, v, ctx);
    }
}

fn resolve_functions(arena: &mut AstArena, module: ModuleId, ctx: &mut PassContext) {
    let functions = arena.module(module).functions.clone();
    for f in functions {
        if arena.function(f).is_generic() {
            continue;
        }
        let params = arena.function(f).parameters.clone();
        for p in params {
            resolve_variable(arena, p, ctx);
        }
        if arena.function(f).resolved_return_type.is_none() {
            match arena.function(f).return_type {
                None => {
                    arena.function_mut(f).resolved_return_type = Some(Type::void());
                    ctx.replaced();
                }
                Some(rt) => match type_of_type_expr(arena, rt) {
                    Some(ty) => {
                        arena.function_mut(f).resolved_return_type = Some(ty);
                        ctx.replaced();
                    }
                    None => {
                        let span = arena.function(f).span;
                        let name = arena.name(arena.function(f).name).to_string();
                        ctx.fail(|| {
                            CompileError::new(
                                ErrorKind::UnresolvedSymbol,
                                span,
                                format!("cannot resolve the return type of '{name}'"),
                            )
                        });
                    }
                },
            }
        }
        resolve_locals(arena, f, ctx);
    }
}

fn resolve_locals(arena: &mut AstArena, function: FunctionId, ctx: &mut PassContext) {
    let Some(body) = arena.function(function).body else {
        return;
    };
    let mut stack = vec![body];
    while let Some(stmt) = stack.pop() {
        if let StmtKind::VariableDeclaration(v) = arena.stmt(stmt).kind {
            resolve_variable(arena, v, ctx);
        }
        stack.extend(walk::stmt_child_stmts(arena, stmt));
    }
}

fn resolve_endpoints(arena: &mut AstArena, module: ModuleId, ctx: &mut PassContext) {
    let endpoints = arena.module(module).endpoints.clone();
    for e in endpoints {
        let decl = arena.endpoint(e).clone();
        if decl.resolved_types.is_none() {
            let mut types = Vec::with_capacity(decl.data_types.len());
            let mut ready = true;
            for &t in &decl.data_types {
                match type_of_type_expr(arena, t) {
                    Some(ty) => types.push(ty),
                    None => {
                        ready = false;
                        break;
                    }
                }
            }
            if ready {
                arena.endpoint_mut(e).resolved_types = Some(types);
                ctx.replaced();
            } else {
                let name = arena.name(decl.name).to_string();
                ctx.fail(|| {
                    CompileError::new(
                        ErrorKind::UnresolvedSymbol,
                        decl.span,
                        format!("cannot resolve the data types of endpoint '{name}'"),
                    )
                });
            }
        }
        if decl.resolved_array_size.is_none() {
            if let Some(size) = decl.array_size {
                match const_index(arena, size) {
                    Some(n) if n >= 1 && n <= u32::MAX as i64 => {
                        arena.endpoint_mut(e).resolved_array_size = Some(n as u32);
                        ctx.replaced();
                    }
                    Some(_) => {
                        ctx.fail(|| {
                            CompileError::new(
                                ErrorKind::IllegalEndpointArraySize,
                                decl.span,
                                "endpoint array size out of range",
                            )
                        });
                    }
                    None => {
                        ctx.fail(|| {
                            CompileError::new(
                                ErrorKind::NonConstArraySize,
                                decl.span,
                                "endpoint array size must be a constant",
                            )
                        });
                    }
                }
            }
        }
    }
}

fn resolve_aliases(arena: &mut AstArena, module: ModuleId, ctx: &mut PassContext) {
    let aliases = arena.module(module).aliases.clone();
    for a in aliases {
        if arena.alias(a).resolved.is_some() {
            continue;
        }
        let decl = arena.alias(a).clone();
        let symbols = scope::find_symbols(arena, decl.scope, &decl.target, &SearchMask::modules());
        match resolve_module_symbol(arena, &symbols) {
            Some(m) => {
                arena.alias_mut(a).resolved = Some(m);
                ctx.replaced();
            }
            None => {
                let shown = decl.target.display(&arena.idents);
                ctx.fail(|| {
                    CompileError::new(
                        ErrorKind::UnresolvedSymbol,
                        decl.span,
                        format!("cannot find a processor called '{shown}'"),
                    )
                });
            }
        }
    }
}

fn resolve_module_symbol(arena: &AstArena, symbols: &[Symbol]) -> Option<ModuleId> {
    match symbols {
        [Symbol::Module(m)] => Some(*m),
        [Symbol::ProcessorAlias(a)] => arena.alias(*a).resolved,
        _ => None,
    }
}

fn resolve_instances(arena: &mut AstArena, module: ModuleId, ctx: &mut PassContext) {
    let instances = arena.module(module).instances.clone();
    for i in instances {
        let decl = arena.instance(i).clone();

        if decl.resolved_array_size.is_none() {
            if let Some(size) = decl.array_size {
                if let Some(n) = const_index(arena, size) {
                    if n >= 1 && n <= u32::MAX as i64 {
                        arena.instance_mut(i).resolved_array_size = Some(n as u32);
                        ctx.replaced();
                    }
                }
            }
        }

        if decl.resolved_target.is_some() {
            continue;
        }
        let symbols = scope::find_symbols(arena, decl.scope, &decl.target, &SearchMask::modules());
        let Some(target) = resolve_module_symbol(arena, &symbols) else {
            let shown = decl.target.display(&arena.idents);
            ctx.fail(|| {
                CompileError::new(
                    ErrorKind::UnresolvedSymbol,
                    decl.span,
                    format!("cannot find a processor called '{shown}'"),
                )
            });
            continue;
        };

        if !arena.module(target).is_generic() {
            if !decl.args.is_empty() {
                let shown = decl.target.display(&arena.idents);
                ctx.fail(|| {
                    CompileError::new(
                        ErrorKind::UnresolvedSymbol,
                        decl.span,
                        format!("'{shown}' takes no specialisation arguments"),
                    )
                });
                continue;
            }
            arena.instance_mut(i).resolved_target = Some(target);
            ctx.replaced();
            continue;
        }

        // A parameterised target: every argument must have settled first.
        let mut args = Vec::with_capacity(decl.args.len());
        let mut ready = true;
        for &a in &decl.args {
            match &arena.expr(a).kind {
                ExprKind::ConcreteType(t) => args.push(SpecArg::Type(t.clone())),
                ExprKind::Constant(v) => args.push(SpecArg::Value(v.clone())),
                ExprKind::ProcessorRef(m) => args.push(SpecArg::Processor(*m)),
                _ => {
                    ready = false;
                    break;
                }
            }
        }
        if !ready {
            ctx.retry();
            continue;
        }
        match specialise_module(arena, target, decl.span, &args) {
            Ok(clone) => {
                arena.instance_mut(i).resolved_target = Some(clone);
                ctx.replaced();
            }
            Err(e) => {
                ctx.fail(|| e.clone());
            }
        }
    }
}

fn resolve_connections(arena: &mut AstArena, module: ModuleId, ctx: &mut PassContext) {
    let connections = arena.module(module).connections.clone();
    for c in connections {
        let decl = arena.connection(c).clone();
        if decl.resolved_delay.is_some() {
            continue;
        }
        if let Some(delay) = decl.delay {
            match constant_of(arena, delay).and_then(|v| v.as_i64()) {
                Some(n) => {
                    arena.connection_mut(c).resolved_delay = Some(n);
                    ctx.replaced();
                }
                None => {
                    ctx.fail(|| {
                        CompileError::new(
                            ErrorKind::DelayLineNotInteger,
                            decl.span,
                            "delay length must be an integer constant",
                        )
                    });
                }
            }
        }
    }
}
