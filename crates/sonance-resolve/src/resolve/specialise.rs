//! Cloning and specialisation.
//!
//! Generic functions and parameterised processors are never resolved in
//! template form; a call or instance with concrete arguments clones the
//! declaration, substitutes the parameters, and lets the normal passes
//! resolve the clone. Specialisations are memoised per argument tuple so the
//! same arguments always share one clone.

use sonance_ast::ast::{
    AstArena, ConnectionDecl, EndpointDecl, ExprId, ExprKind, FunctionDecl, FunctionId,
    ModuleDecl, ModuleId, ProcessorAliasDecl, ProcessorInstanceDecl, Scope, ScopeId, ScopeOwner,
    SpecialisationParam, Stmt, StmtId, StmtKind, StructDecl, StructMemberDecl, UsingDecl,
    UsingId, VarId, VariableDecl,
};
use sonance_ast::foundation::{Ident, Span};
use sonance_ast::types::{Type, Value};
use sonance_ast::{CompileError, ErrorKind};
use std::collections::HashMap;

/// A concrete specialisation argument.
#[derive(Debug, Clone)]
pub enum SpecArg {
    Type(Type),
    Value(Value),
    Processor(ModuleId),
}

impl SpecArg {
    fn key_fragment(&self, arena: &AstArena) -> String {
        match self {
            SpecArg::Type(t) => t.mangled_name(),
            SpecArg::Value(v) => v.describe(None).replace(['.', '-'], "_"),
            SpecArg::Processor(m) => arena.name(arena.module(*m).name).to_string(),
        }
    }
}

/// Id remapping collected while cloning a declaration subtree.
#[derive(Debug, Default)]
struct CloneMap {
    vars: HashMap<VarId, VarId>,
    scopes: HashMap<ScopeId, ScopeId>,
    functions: HashMap<FunctionId, FunctionId>,
    usings: HashMap<UsingId, UsingId>,
}

impl CloneMap {
    fn scope(&self, old: ScopeId) -> ScopeId {
        self.scopes.get(&old).copied().unwrap_or(old)
    }
}

fn clone_expr(arena: &mut AstArena, map: &CloneMap, id: ExprId) -> ExprId {
    let node = arena.expr(id).clone();
    let kind = match node.kind {
        ExprKind::Binary { op, lhs, rhs, resolved_types } => ExprKind::Binary {
            op,
            lhs: clone_expr(arena, map, lhs),
            rhs: clone_expr(arena, map, rhs),
            resolved_types,
        },
        ExprKind::Unary { op, operand } => ExprKind::Unary {
            op,
            operand: clone_expr(arena, map, operand),
        },
        ExprKind::Ternary {
            condition,
            true_value,
            false_value,
        } => ExprKind::Ternary {
            condition: clone_expr(arena, map, condition),
            true_value: clone_expr(arena, map, true_value),
            false_value: clone_expr(arena, map, false_value),
        },
        ExprKind::Assignment { target, value } => ExprKind::Assignment {
            target: clone_expr(arena, map, target),
            value: clone_expr(arena, map, value),
        },
        ExprKind::PreOrPostIncDec {
            target,
            is_increment,
            is_post,
        } => ExprKind::PreOrPostIncDec {
            target: clone_expr(arena, map, target),
            is_increment,
            is_post,
        },
        ExprKind::CallOrCast {
            target,
            args,
            is_method_call,
        } => ExprKind::CallOrCast {
            target: clone_expr(arena, map, target),
            args: args.into_iter().map(|a| clone_expr(arena, map, a)).collect(),
            is_method_call,
        },
        ExprKind::FunctionCall { function, args } => ExprKind::FunctionCall {
            function: map.functions.get(&function).copied().unwrap_or(function),
            args: args.into_iter().map(|a| clone_expr(arena, map, a)).collect(),
        },
        ExprKind::TypeCast { dest, source } => ExprKind::TypeCast {
            dest,
            source: clone_expr(arena, map, source),
        },
        ExprKind::ArrayElement { parent, start, end } => ExprKind::ArrayElement {
            parent: clone_expr(arena, map, parent),
            start: clone_expr(arena, map, start),
            end: end.map(|e| clone_expr(arena, map, e)),
        },
        ExprKind::StructMember { parent, member } => ExprKind::StructMember {
            parent: clone_expr(arena, map, parent),
            member,
        },
        ExprKind::Dot { parent, member } => ExprKind::Dot {
            parent: clone_expr(arena, map, parent),
            member,
        },
        ExprKind::BracketSubscript {
            parent,
            index,
            index_end,
        } => ExprKind::BracketSubscript {
            parent: clone_expr(arena, map, parent),
            index: index.map(|e| clone_expr(arena, map, e)),
            index_end: index_end.map(|e| clone_expr(arena, map, e)),
        },
        ExprKind::ChevronSubscript { parent, size } => ExprKind::ChevronSubscript {
            parent: clone_expr(arena, map, parent),
            size: clone_expr(arena, map, size),
        },
        ExprKind::MetaFunction { op, source } => ExprKind::MetaFunction {
            op,
            source: clone_expr(arena, map, source),
        },
        ExprKind::CommaList(items) => ExprKind::CommaList(
            items.into_iter().map(|e| clone_expr(arena, map, e)).collect(),
        ),
        ExprKind::WriteToEndpoint { target, value } => ExprKind::WriteToEndpoint {
            target: clone_expr(arena, map, target),
            value: clone_expr(arena, map, value),
        },
        ExprKind::StaticAssertion { condition, message } => ExprKind::StaticAssertion {
            condition: clone_expr(arena, map, condition),
            message,
        },
        ExprKind::VariableRef(v) => {
            ExprKind::VariableRef(map.vars.get(&v).copied().unwrap_or(v))
        }
        other @ (ExprKind::Constant(_)
        | ExprKind::ConcreteType(_)
        | ExprKind::EndpointRef(_)
        | ExprKind::ProcessorRef(_)
        | ExprKind::InstanceRef(_)
        | ExprKind::Name(_)
        | ExprKind::AdvanceClock
        | ExprKind::ProcessorProperty(_)) => other,
    };
    arena.alloc_expr(sonance_ast::ast::Expr {
        span: node.span,
        scope: map.scope(node.scope),
        kind,
    })
}

fn clone_opt_expr(arena: &mut AstArena, map: &CloneMap, id: Option<ExprId>) -> Option<ExprId> {
    id.map(|e| clone_expr(arena, map, e))
}

fn clone_variable(arena: &mut AstArena, map: &mut CloneMap, id: VarId) -> VarId {
    let decl = arena.variable(id).clone();
    let declared_type = clone_opt_expr(arena, map, decl.declared_type);
    let initial_value = clone_opt_expr(arena, map, decl.initial_value);
    let new = arena.alloc_variable(VariableDecl {
        span: decl.span,
        scope: map.scope(decl.scope),
        name: decl.name,
        declared_type,
        initial_value,
        is_constant: decl.is_constant,
        is_external: decl.is_external,
        annotation: decl.annotation,
        resolved_type: decl.resolved_type,
    });
    map.vars.insert(id, new);
    new
}

fn clone_stmt(arena: &mut AstArena, map: &mut CloneMap, id: StmtId) -> StmtId {
    let node = arena.stmt(id).clone();
    match node.kind {
        StmtKind::Block {
            body_scope,
            statements,
        } => {
            let new_block = arena.alloc_stmt(Stmt {
                span: node.span,
                scope: map.scope(node.scope),
                kind: StmtKind::Noop, // patched below
            });
            let new_scope = arena.alloc_scope(Scope {
                parent: Some(map.scope(node.scope)),
                owner: ScopeOwner::Block(new_block),
            });
            map.scopes.insert(body_scope, new_scope);
            let statements = statements
                .into_iter()
                .map(|s| clone_stmt(arena, map, s))
                .collect();
            arena.stmt_mut(new_block).kind = StmtKind::Block {
                body_scope: new_scope,
                statements,
            };
            new_block
        }
        StmtKind::Expression(e) => {
            let e = clone_expr(arena, map, e);
            arena.alloc_stmt(Stmt {
                span: node.span,
                scope: map.scope(node.scope),
                kind: StmtKind::Expression(e),
            })
        }
        StmtKind::If {
            condition,
            then_branch,
            else_branch,
            is_const,
        } => {
            let condition = clone_expr(arena, map, condition);
            let then_branch = clone_stmt(arena, map, then_branch);
            let else_branch = else_branch.map(|s| clone_stmt(arena, map, s));
            arena.alloc_stmt(Stmt {
                span: node.span,
                scope: map.scope(node.scope),
                kind: StmtKind::If {
                    condition,
                    then_branch,
                    else_branch,
                    is_const,
                },
            })
        }
        StmtKind::Loop {
            initialiser,
            condition,
            iterator,
            count,
            body,
            is_do_while,
        } => {
            let initialiser = initialiser.map(|s| clone_stmt(arena, map, s));
            let condition = clone_opt_expr(arena, map, condition);
            let iterator = iterator.map(|s| clone_stmt(arena, map, s));
            let count = clone_opt_expr(arena, map, count);
            let body = clone_stmt(arena, map, body);
            arena.alloc_stmt(Stmt {
                span: node.span,
                scope: map.scope(node.scope),
                kind: StmtKind::Loop {
                    initialiser,
                    condition,
                    iterator,
                    count,
                    body,
                    is_do_while,
                },
            })
        }
        StmtKind::Return(value) => {
            let value = clone_opt_expr(arena, map, value);
            arena.alloc_stmt(Stmt {
                span: node.span,
                scope: map.scope(node.scope),
                kind: StmtKind::Return(value),
            })
        }
        StmtKind::VariableDeclaration(v) => {
            let v = clone_variable(arena, map, v);
            arena.alloc_stmt(Stmt {
                span: node.span,
                scope: map.scope(node.scope),
                kind: StmtKind::VariableDeclaration(v),
            })
        }
        kind @ (StmtKind::Break | StmtKind::Continue | StmtKind::Noop) => {
            arena.alloc_stmt(Stmt {
                span: node.span,
                scope: map.scope(node.scope),
                kind,
            })
        }
    }
}

fn clone_function(
    arena: &mut AstArena,
    map: &mut CloneMap,
    id: FunctionId,
    new_name: Ident,
    decl_scope: ScopeId,
) -> FunctionId {
    let decl = arena.function(id).clone();
    let new_fn = arena.alloc_function(FunctionDecl {
        span: decl.span,
        scope: decl_scope,
        local_scope: ScopeId(0), // patched below
        name: new_name,
        kind: decl.kind,
        return_type: None, // patched below
        resolved_return_type: decl.resolved_return_type.clone(),
        parameters: Vec::new(),
        body: None,
        annotation: decl.annotation.clone(),
        generic_wildcards: decl.generic_wildcards.clone(),
        original_generic_function: None,
        original_call: None,
        specialisations: indexmap::IndexMap::new(),
        local_usings: Vec::new(),
    });
    let local_scope = arena.alloc_scope(Scope {
        parent: Some(decl_scope),
        owner: ScopeOwner::Function(new_fn),
    });
    map.scopes.insert(decl.local_scope, local_scope);
    map.functions.insert(id, new_fn);
    arena.function_mut(new_fn).local_scope = local_scope;

    let return_type = clone_opt_expr(arena, map, decl.return_type);
    let parameters: Vec<VarId> = decl
        .parameters
        .iter()
        .map(|&p| clone_variable(arena, map, p))
        .collect();
    let body = decl.body.map(|b| clone_stmt(arena, map, b));

    let f = arena.function_mut(new_fn);
    f.return_type = return_type;
    f.parameters = parameters;
    f.body = body;
    new_fn
}

/// Clone a generic function for one set of wildcard bindings.
///
/// The clone gets a mangled name carrying the bound parameter types, using
/// declarations pinning each wildcard, and back-links to the original and
/// the triggering call for diagnostic chaining. Memoised per binding tuple.
pub fn specialise_generic_function(
    arena: &mut AstArena,
    function: FunctionId,
    call: ExprId,
    bindings: &[(Ident, Type)],
) -> FunctionId {
    let key: String = bindings
        .iter()
        .map(|(_, t)| t.mangled_name())
        .collect::<Vec<_>>()
        .join("_");

    if let Some(&existing) = arena.function(function).specialisations.get(&key) {
        return existing;
    }

    let base_name = arena.name(arena.function(function).name).to_string();
    let mangled = arena.idents.get(&format!("_{base_name}_specialised_{key}"));
    let decl_scope = arena.function(function).scope;

    let mut map = CloneMap::default();
    let clone = clone_function(arena, &mut map, function, mangled, decl_scope);

    let local_scope = arena.function(clone).local_scope;
    for (wildcard, ty) in bindings {
        let target = arena.alloc_expr(sonance_ast::ast::Expr {
            span: Span::none(),
            scope: local_scope,
            kind: ExprKind::ConcreteType(ty.clone()),
        });
        let using = arena.alloc_using(UsingDecl {
            span: Span::none(),
            scope: local_scope,
            name: *wildcard,
            target,
            resolved: Some(ty.clone()),
        });
        arena.function_mut(clone).local_usings.push(using);
    }

    {
        let f = arena.function_mut(clone);
        f.generic_wildcards.clear();
        f.original_generic_function = Some(function);
        f.original_call = Some(call);
    }

    arena
        .function_mut(function)
        .specialisations
        .insert(key, clone);

    // Register the clone beside its original so lookups can find it.
    if let Some(module) = sonance_ast::ast::scope::enclosing_module(arena, decl_scope) {
        arena.module_mut(module).functions.push(clone);
    }
    clone
}

/// Clone a parameterised processor or graph for one argument tuple.
///
/// Returns the memoised clone if these arguments were seen before.
pub fn specialise_module(
    arena: &mut AstArena,
    module: ModuleId,
    instance_span: Span,
    args: &[SpecArg],
) -> Result<ModuleId, CompileError> {
    let params = arena.module(module).specialisation_params.clone();
    if params.len() != args.len() {
        return Err(CompileError::new(
            ErrorKind::UnresolvedSymbol,
            instance_span,
            format!(
                "'{}' expects {} specialisation arguments, got {}",
                arena.name(arena.module(module).name),
                params.len(),
                args.len()
            ),
        ));
    }

    let key: String = args
        .iter()
        .map(|a| a.key_fragment(arena))
        .collect::<Vec<_>>()
        .join("_");

    if let Some(&existing) = arena.module(module).specialisations.get(&key) {
        return Ok(existing);
    }

    let base_name = arena.name(arena.module(module).name).to_string();
    let new_name = arena.idents.get(&format!("{base_name}_{key}"));
    let clone = clone_module(arena, module, new_name);
    arena.module_mut(clone).specialised_at = Some(instance_span);

    // Bind each parameter to its argument.
    for (param, arg) in params.iter().zip(args) {
        match (param, arg) {
            (SpecialisationParam::Type(u), SpecArg::Type(ty)) => {
                // The clone's using list parallels the original's.
                let index = arena
                    .module(module)
                    .usings
                    .iter()
                    .position(|x| x == u)
                    .expect("specialisation param not in module");
                let clone_using = arena.module(clone).usings[index];
                arena.using_mut(clone_using).resolved = Some(ty.clone());
            }
            (SpecialisationParam::Value(v), SpecArg::Value(value)) => {
                let index = arena
                    .module(module)
                    .state_variables
                    .iter()
                    .position(|x| x == v)
                    .expect("specialisation param not in module");
                let clone_var = arena.module(clone).state_variables[index];
                let scope = arena.variable(clone_var).scope;
                let constant = arena.alloc_expr(sonance_ast::ast::Expr {
                    span: instance_span,
                    scope,
                    kind: ExprKind::Constant(value.clone()),
                });
                let var = arena.variable_mut(clone_var);
                var.initial_value = Some(constant);
                var.is_constant = true;
            }
            (SpecialisationParam::Processor(a), SpecArg::Processor(target)) => {
                let index = arena
                    .module(module)
                    .aliases
                    .iter()
                    .position(|x| x == a)
                    .expect("specialisation param not in module");
                let clone_alias = arena.module(clone).aliases[index];
                arena.alias_mut(clone_alias).resolved = Some(*target);
            }
            _ => {
                return Err(CompileError::new(
                    ErrorKind::CannotCast,
                    instance_span,
                    "specialisation argument does not match the parameter kind",
                ));
            }
        }
    }

    arena.module_mut(clone).specialisation_params.clear();
    arena
        .module_mut(module)
        .specialisations
        .insert(key, clone);
    Ok(clone)
}

fn clone_module(arena: &mut AstArena, id: ModuleId, new_name: Ident) -> ModuleId {
    let decl = arena.module(id).clone();
    let mut map = CloneMap::default();

    let new_module = arena.alloc_module(ModuleDecl::new(
        decl.span,
        decl.scope,
        ScopeId(0), // patched below
        new_name,
        decl.kind,
    ));
    let local_scope = arena.alloc_scope(Scope {
        parent: Some(decl.scope),
        owner: ScopeOwner::Module(new_module),
    });
    map.scopes.insert(decl.local_scope, local_scope);
    {
        let m = arena.module_mut(new_module);
        m.local_scope = local_scope;
        m.parent = decl.parent;
        m.annotation = decl.annotation.clone();
        m.specialised_from = Some(id);
    }

    for &u in &decl.usings {
        let old = arena.using(u).clone();
        let target = clone_expr(arena, &map, old.target);
        let new = arena.alloc_using(UsingDecl {
            span: old.span,
            scope: local_scope,
            name: old.name,
            target,
            resolved: old.resolved,
        });
        map.usings.insert(u, new);
        arena.module_mut(new_module).usings.push(new);
    }

    for &s in &decl.structs {
        let old = arena.structure(s).clone();
        let members = old
            .members
            .iter()
            .map(|m| StructMemberDecl {
                name: m.name,
                ty: clone_expr(arena, &map, m.ty),
            })
            .collect();
        let new = arena.alloc_struct(StructDecl {
            span: old.span,
            scope: local_scope,
            name: old.name,
            members,
            structure: None,
        });
        arena.module_mut(new_module).structs.push(new);
    }

    for &a in &decl.aliases {
        let old = arena.alias(a).clone();
        let new = arena.alloc_alias(ProcessorAliasDecl {
            span: old.span,
            scope: local_scope,
            name: old.name,
            target: old.target,
            resolved: old.resolved,
        });
        arena.module_mut(new_module).aliases.push(new);
    }

    for &e in &decl.endpoints {
        let old = arena.endpoint(e).clone();
        let data_types = old
            .data_types
            .iter()
            .map(|&t| clone_expr(arena, &map, t))
            .collect();
        let array_size = clone_opt_expr(arena, &map, old.array_size);
        let new = arena.alloc_endpoint(EndpointDecl {
            span: old.span,
            scope: local_scope,
            name: old.name,
            direction: old.direction,
            kind: old.kind,
            data_types,
            resolved_types: None,
            array_size,
            resolved_array_size: None,
            annotation: old.annotation,
        });
        arena.module_mut(new_module).endpoints.push(new);
    }

    for &v in &decl.state_variables {
        let new = clone_variable(arena, &mut map, v);
        arena.variable_mut(new).scope = local_scope;
        arena.module_mut(new_module).state_variables.push(new);
    }

    for &i in &decl.instances {
        let old = arena.instance(i).clone();
        let args = old.args.iter().map(|&a| clone_expr(arena, &map, a)).collect();
        let clock_multiplier = clone_opt_expr(arena, &map, old.clock_multiplier);
        let clock_divider = clone_opt_expr(arena, &map, old.clock_divider);
        let array_size = clone_opt_expr(arena, &map, old.array_size);
        let new = arena.alloc_instance(ProcessorInstanceDecl {
            span: old.span,
            scope: local_scope,
            name: old.name,
            target: old.target,
            args,
            clock_multiplier,
            clock_divider,
            array_size,
            resolved_target: None,
            resolved_array_size: None,
        });
        arena.module_mut(new_module).instances.push(new);
    }

    for &c in &decl.connections {
        let old = arena.connection(c).clone();
        let delay = clone_opt_expr(arena, &map, old.delay);
        let mut source = old.source.clone();
        source.endpoint_index = clone_opt_expr(arena, &map, source.endpoint_index);
        let mut dest = old.dest.clone();
        dest.endpoint_index = clone_opt_expr(arena, &map, dest.endpoint_index);
        let new = arena.alloc_connection(ConnectionDecl {
            span: old.span,
            scope: local_scope,
            interpolation: old.interpolation,
            source,
            dest,
            delay,
            resolved_delay: old.resolved_delay,
        });
        arena.module_mut(new_module).connections.push(new);
    }

    for &f in &decl.functions {
        let name = arena.function(f).name;
        let new = clone_function(arena, &mut map, f, name, local_scope);
        arena.module_mut(new_module).functions.push(new);
    }

    // The clone keeps no specialisation params; specialise_module binds the
    // parallel cloned declarations directly by index.

    // Register beside the original.
    match decl.parent {
        Some(p) => arena.module_mut(p).sub_modules.push(new_module),
        None => arena.root_modules.push(new_module),
    }
    new_module
}
