//! Call resolution: casts, method calls, overloads and generics.
//!
//! A `CallOrCast` settles in one of three ways: the target turns out to be a
//! type (the node becomes a cast), the target is a method-style dot (the
//! receiver is folded into the argument list and the call retried), or the
//! target names an overload set and a single viable candidate is picked.
//! Wildcard functions join the candidate set through unification and win by
//! being cloned into a concrete specialisation.

use super::specialise::specialise_generic_function;
use super::types::{const_index, result_type, type_of_type_expr};
use super::PassContext;
use sonance_ast::ast::{
    scope, AstArena, ExprId, ExprKind, ExpressionKind, FunctionId, SearchMask, Symbol,
};
use sonance_ast::foundation::{Ident, Path};
use sonance_ast::types::{can_pass_as_argument, EqualityFlags, Type};
use sonance_ast::{CompileError, ErrorKind};

/// Try to settle one `CallOrCast`; returns true if it was rewritten.
pub fn resolve_call(arena: &mut AstArena, id: ExprId, ctx: &mut PassContext) -> bool {
    let (target, args, _is_method_call) = match &arena.expr(id).kind {
        ExprKind::CallOrCast {
            target,
            args,
            is_method_call,
        } => (*target, args.clone(), *is_method_call),
        _ => return false,
    };
    let span = arena.expr(id).span;

    // Method sugar: x.f(a) -> f(x, a), resolved from the call's scope.
    if let ExprKind::Dot { parent, member } = arena.expr(target).kind {
        if arena.expr(parent).expression_kind() == ExpressionKind::Value {
            let scope = arena.expr(id).scope;
            let name = arena.alloc_expr(sonance_ast::ast::Expr {
                span: arena.expr(target).span,
                scope,
                kind: ExprKind::Name(Path::single(member)),
            });
            let mut new_args = vec![parent];
            new_args.extend(args.iter().copied());
            arena.expr_mut(id).kind = ExprKind::CallOrCast {
                target: name,
                args: new_args,
                is_method_call: true,
            };
            ctx.replaced();
            return true;
        }
    }

    // A call whose target is a type is a cast (or aggregate construction).
    if arena.expr(target).expression_kind() == ExpressionKind::Type {
        let Some(dest) = type_of_type_expr(arena, target) else {
            ctx.retry();
            return false;
        };
        let source = match args.len() {
            0 => {
                ctx.fail(|| {
                    CompileError::new(
                        ErrorKind::WrongNumberOfArgsForAggregate,
                        span,
                        format!("cast to '{}' needs a value", dest.description()),
                    )
                });
                return false;
            }
            1 => args[0],
            _ => {
                let scope = arena.expr(id).scope;
                arena.alloc_expr(sonance_ast::ast::Expr {
                    span,
                    scope,
                    kind: ExprKind::CommaList(args.clone()),
                })
            }
        };
        arena.expr_mut(id).kind = ExprKind::TypeCast { dest, source };
        ctx.replaced();
        return true;
    }

    // Otherwise the target must name a function.
    let ExprKind::Name(path) = arena.expr(target).kind.clone() else {
        ctx.retry();
        return false;
    };

    // Argument types must all be known before overloads can be judged.
    let mut arg_types = Vec::with_capacity(args.len());
    for &a in &args {
        match result_type(arena, a) {
            Some(t) => arg_types.push(t),
            None => {
                ctx.retry();
                return false;
            }
        }
    }

    let scope_id = arena.expr(id).scope;
    let shown = path.display(&arena.idents);
    let candidates = scope::find_symbols(
        arena,
        scope_id,
        &path,
        &SearchMask::functions(args.len()),
    );
    let candidates: Vec<FunctionId> = candidates
        .into_iter()
        .filter_map(|s| match s {
            Symbol::Function(f) => Some(f),
            _ => None,
        })
        .collect();

    if candidates.is_empty() {
        ctx.fail(|| {
            CompileError::new(
                ErrorKind::UnresolvedSymbol,
                span,
                format!("no function '{shown}' takes {} arguments", args.len()),
            )
        });
        return false;
    }

    // Judge viability.
    let mut viable: Vec<Candidate> = Vec::new();
    let mut not_ready = false;
    for f in candidates {
        match judge(arena, f, &args, &arg_types) {
            Judgement::Viable(c) => viable.push(c),
            Judgement::NotViable => {}
            Judgement::NotReady => not_ready = true,
        }
    }

    if viable.is_empty() {
        if not_ready {
            ctx.retry();
        } else {
            let types: Vec<String> = arg_types.iter().map(|t| t.description()).collect();
            ctx.fail(|| {
                CompileError::new(
                    ErrorKind::CannotImplicitlyCast,
                    span,
                    format!("no overload of '{shown}' matches ({})", types.join(", ")),
                )
            });
        }
        return false;
    }

    // Prefer exact matches, and concrete functions over generics.
    let pick = if viable.len() == 1 {
        Some(0)
    } else {
        let exact: Vec<usize> = (0..viable.len()).filter(|&i| viable[i].exact).collect();
        match exact.len() {
            1 => Some(exact[0]),
            0 => {
                let concrete: Vec<usize> =
                    (0..viable.len()).filter(|&i| viable[i].bindings.is_none()).collect();
                if concrete.len() == 1 {
                    Some(concrete[0])
                } else {
                    None
                }
            }
            _ => None,
        }
    };

    let Some(pick) = pick else {
        ctx.fail(|| {
            CompileError::new(
                ErrorKind::AmbiguousSymbol,
                span,
                format!("ambiguous call to '{shown}'"),
            )
        });
        return false;
    };

    let chosen = viable.swap_remove(pick);
    let function = match chosen.bindings {
        Some(bindings) => specialise_generic_function(arena, chosen.function, id, &bindings),
        None => chosen.function,
    };
    arena.expr_mut(id).kind = ExprKind::FunctionCall { function, args };
    ctx.replaced();
    true
}

struct Candidate {
    function: FunctionId,
    exact: bool,
    /// Present for generic candidates: wildcard bindings from unification.
    bindings: Option<Vec<(Ident, Type)>>,
}

enum Judgement {
    Viable(Candidate),
    NotViable,
    /// Parameter types not resolved yet; try again next pass.
    NotReady,
}

fn judge(arena: &AstArena, f: FunctionId, args: &[ExprId], arg_types: &[Type]) -> Judgement {
    let func = arena.function(f);

    if func.is_generic() {
        return judge_generic(arena, f, arg_types);
    }
    // Specialisation clones only take part through their originals.
    if func.is_specialisation() {
        return Judgement::NotViable;
    }

    let mut exact = true;
    for (i, &param) in func.parameters.iter().enumerate() {
        let Some(param_ty) = arena.variable(param).resolved_type.clone() else {
            return Judgement::NotReady;
        };
        let arg_ty = &arg_types[i];
        if param_ty.is_equal(arg_ty, EqualityFlags::DUCK) {
            continue;
        }
        exact = false;
        if can_pass_as_argument(&param_ty, arg_ty, false) {
            continue;
        }
        // A constant argument may still fit by value.
        if let ExprKind::Constant(v) = &arena.expr(args[i]).kind {
            if v.can_silently_cast_to(&param_ty) {
                continue;
            }
        }
        return Judgement::NotViable;
    }
    Judgement::Viable(Candidate {
        function: f,
        exact,
        bindings: None,
    })
}

fn judge_generic(arena: &AstArena, f: FunctionId, arg_types: &[Type]) -> Judgement {
    let func = arena.function(f);
    let mut bindings: Vec<(Ident, Type)> = Vec::new();

    for (i, &param) in func.parameters.iter().enumerate() {
        let Some(type_expr) = arena.variable(param).declared_type else {
            return Judgement::NotViable;
        };
        if !unify(arena, &func.generic_wildcards, type_expr, &arg_types[i], &mut bindings) {
            return Judgement::NotViable;
        }
    }
    if bindings.is_empty() {
        return Judgement::NotViable;
    }
    Judgement::Viable(Candidate {
        function: f,
        exact: false,
        bindings: Some(bindings),
    })
}

/// Structural unification of a (possibly unresolved) parameter type
/// expression against a concrete argument type.
fn unify(
    arena: &AstArena,
    wildcards: &[Ident],
    type_expr: ExprId,
    arg: &Type,
    bindings: &mut Vec<(Ident, Type)>,
) -> bool {
    match &arena.expr(type_expr).kind {
        ExprKind::Name(path) if path.is_unqualified() && wildcards.contains(&path.first()) => {
            let bound = arg.remove_reference().remove_const();
            let name = path.first();
            match bindings.iter().find(|(w, _)| *w == name) {
                Some((_, existing)) => existing.is_identical(&bound),
                None => {
                    bindings.push((name, bound));
                    true
                }
            }
        }
        ExprKind::ConcreteType(t) => can_pass_as_argument(t, arg, false),
        ExprKind::BracketSubscript {
            parent,
            index,
            index_end: None,
        } => {
            let Some(element) = arg.element_type() else {
                return false;
            };
            match index {
                None if arg.is_array() => {
                    unify(arena, wildcards, *parent, &element, bindings)
                }
                Some(size_expr) if arg.is_fixed_array() => {
                    match const_index(arena, *size_expr) {
                        Some(n) if Some(n as u32) == arg.array_or_vector_size() => {
                            unify(arena, wildcards, *parent, &element, bindings)
                        }
                        _ => false,
                    }
                }
                _ => false,
            }
        }
        ExprKind::ChevronSubscript { parent, size } => {
            if !arg.is_vector() {
                return false;
            }
            match const_index(arena, *size) {
                Some(n) if Some(n as u32) == arg.array_or_vector_size() => {
                    let element = Type::primitive(arg.vector_element().expect("vector"));
                    unify(arena, wildcards, *parent, &element, bindings)
                }
                _ => false,
            }
        }
        _ => false,
    }
}
