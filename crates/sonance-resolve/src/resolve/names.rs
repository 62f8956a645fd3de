//! Name and shape resolution for individual expressions.
//!
//! Rewrites the loose parser shapes in place: qualified names become concrete
//! references, dots become member accesses or type meta-functions, bracket
//! and chevron subscripts become array, vector and bounded-int types or
//! element accesses. Every rewrite counts as progress; anything that cannot
//! be decided yet counts as a failure and is retried on the next pass.

use super::types::{const_index, result_type, type_of_type_expr};
use super::PassContext;
use sonance_ast::ast::{
    scope, AstArena, ExprId, ExprKind, ExpressionKind, SearchMask, Symbol, TypeMetaOp,
};
use sonance_ast::foundation::{Ident, Span};
use sonance_ast::types::{BoundedIntMode, Type};
use sonance_ast::{CompileError, ErrorKind};

/// Try to settle one expression node; returns true if it was rewritten.
pub fn resolve_expr(arena: &mut AstArena, id: ExprId, ctx: &mut PassContext) -> bool {
    match arena.expr(id).kind.clone() {
        ExprKind::Name(path) => {
            let span = arena.expr(id).span;
            let start = arena.expr(id).scope;
            let shown = path.display(&arena.idents);
            let symbols = scope::find_symbols(arena, start, &path, &SearchMask::everything());
            match symbols.as_slice() {
                [] => {
                    ctx.fail(|| {
                        CompileError::new(
                            ErrorKind::UnresolvedSymbol,
                            span,
                            format!("cannot find symbol '{shown}'"),
                        )
                    });
                    false
                }
                [single] => rewrite_symbol(arena, id, *single, span, ctx),
                many => {
                    if many.iter().all(|s| matches!(s, Symbol::Function(_))) {
                        // Overload sets are consumed by call resolution.
                        false
                    } else {
                        ctx.fail(|| {
                            CompileError::new(
                                ErrorKind::AmbiguousSymbol,
                                span,
                                format!("'{shown}' could refer to several declarations"),
                            )
                        });
                        false
                    }
                }
            }
        }

        ExprKind::Dot { parent, member } => resolve_dot(arena, id, parent, member, ctx),

        ExprKind::BracketSubscript {
            parent,
            index,
            index_end,
        } => resolve_bracket(arena, id, parent, index, index_end, ctx),

        ExprKind::ChevronSubscript { parent, size } => {
            resolve_chevron(arena, id, parent, size, ctx)
        }

        _ => false,
    }
}

fn rewrite_symbol(
    arena: &mut AstArena,
    id: ExprId,
    symbol: Symbol,
    span: Span,
    ctx: &mut PassContext,
) -> bool {
    let new_kind = match symbol {
        Symbol::Variable(v) => Some(ExprKind::VariableRef(v)),
        Symbol::Endpoint(e) => Some(ExprKind::EndpointRef(e)),
        Symbol::Module(m) => Some(ExprKind::ProcessorRef(m)),
        Symbol::Instance(i) => Some(ExprKind::InstanceRef(i)),
        Symbol::Struct(s) => arena
            .structure(s)
            .structure
            .clone()
            .map(|arc| ExprKind::ConcreteType(Type::structure(arc))),
        Symbol::Using(u) => arena.using(u).resolved.clone().map(ExprKind::ConcreteType),
        Symbol::ProcessorAlias(a) => arena.alias(a).resolved.map(ExprKind::ProcessorRef),
        Symbol::Function(_) => {
            // A bare function name is only meaningful as a call target.
            ctx.fail(|| {
                CompileError::new(
                    ErrorKind::ExpectedValue,
                    span,
                    "a function name cannot be used as a value",
                )
            });
            return false;
        }
    };
    match new_kind {
        Some(kind) => {
            arena.expr_mut(id).kind = kind;
            ctx.replaced();
            true
        }
        None => {
            // The declaration it names has not resolved yet; retry.
            ctx.retry();
            false
        }
    }
}

fn resolve_dot(
    arena: &mut AstArena,
    id: ExprId,
    parent: ExprId,
    member: Ident,
    ctx: &mut PassContext,
) -> bool {
    let span = arena.expr(id).span;
    match arena.expr(parent).expression_kind() {
        ExpressionKind::Type => {
            let member_name = arena.name(member).to_string();
            match TypeMetaOp::from_name(&member_name) {
                Some(op) => {
                    arena.expr_mut(id).kind = ExprKind::MetaFunction { op, source: parent };
                    ctx.replaced();
                    true
                }
                None => {
                    ctx.fail(|| {
                        CompileError::new(
                            ErrorKind::UnresolvedSymbol,
                            span,
                            format!("no type meta-function called '{member_name}'"),
                        )
                    });
                    false
                }
            }
        }
        ExpressionKind::Value => {
            let Some(parent_ty) = result_type(arena, parent) else {
                ctx.retry();
                return false;
            };
            let member_name = arena.name(member).to_string();
            if let Some(s) = parent_ty.struct_ref() {
                if s.member_index(&member_name).is_some() {
                    arena.expr_mut(id).kind = ExprKind::StructMember { parent, member };
                    ctx.replaced();
                    return true;
                }
            }
            // Meta-functions that yield values also apply through a value.
            if let Some(op) = TypeMetaOp::from_name(&member_name) {
                if !op.produces_type() {
                    arena.expr_mut(id).kind = ExprKind::MetaFunction { op, source: parent };
                    ctx.replaced();
                    return true;
                }
            }
            // Could still be a method call; the call resolver rewrites the
            // enclosing CallOrCast before this becomes a hard error.
            ctx.fail(|| {
                CompileError::new(
                    ErrorKind::UnresolvedSymbol,
                    span,
                    format!(
                        "type '{}' has no member called '{member_name}'",
                        parent_ty.description()
                    ),
                )
            });
            false
        }
        _ => {
            ctx.retry();
            false
        }
    }
}

fn resolve_bracket(
    arena: &mut AstArena,
    id: ExprId,
    parent: ExprId,
    index: Option<ExprId>,
    index_end: Option<ExprId>,
    ctx: &mut PassContext,
) -> bool {
    let span = arena.expr(id).span;
    match arena.expr(parent).expression_kind() {
        ExpressionKind::Type => {
            let Some(element) = type_of_type_expr(arena, parent) else {
                ctx.retry();
                return false;
            };
            if index_end.is_some() {
                ctx.fail(|| {
                    CompileError::new(
                        ErrorKind::IllegalArraySize,
                        span,
                        "a type cannot take a slice subscript",
                    )
                });
                return false;
            }
            if element.is_unsized_array() {
                ctx.fail(|| {
                    CompileError::new(
                        ErrorKind::IllegalArraySize,
                        span,
                        "array elements cannot be unsized arrays",
                    )
                });
                return false;
            }
            match index {
                None => {
                    arena.expr_mut(id).kind = ExprKind::ConcreteType(Type::unsized_array(element));
                    ctx.replaced();
                    true
                }
                Some(size_expr) => match const_index(arena, size_expr) {
                    Some(n) if Type::is_valid_array_size(n) => {
                        arena.expr_mut(id).kind =
                            ExprKind::ConcreteType(Type::fixed_array(element, n as u32));
                        ctx.replaced();
                        true
                    }
                    Some(_) => {
                        ctx.fail(|| {
                            CompileError::new(
                                ErrorKind::IllegalArraySize,
                                span,
                                "array size must be a positive integer",
                            )
                        });
                        false
                    }
                    None => {
                        ctx.fail(|| {
                            CompileError::new(
                                ErrorKind::NonConstArraySize,
                                span,
                                "array sizes must be compile-time constants",
                            )
                        });
                        false
                    }
                },
            }
        }
        ExpressionKind::Value | ExpressionKind::Endpoint => match index {
            Some(start) => {
                arena.expr_mut(id).kind = ExprKind::ArrayElement {
                    parent,
                    start,
                    end: index_end,
                };
                ctx.replaced();
                true
            }
            None => {
                ctx.fail(|| {
                    CompileError::new(ErrorKind::ExpectedValue, span, "subscript needs an index")
                });
                false
            }
        },
        _ => {
            ctx.retry();
            false
        }
    }
}

fn resolve_chevron(
    arena: &mut AstArena,
    id: ExprId,
    parent: ExprId,
    size: ExprId,
    ctx: &mut PassContext,
) -> bool {
    let span = arena.expr(id).span;

    // wrap<N> and clamp<N> are spelled like sized types.
    if let ExprKind::Name(path) = &arena.expr(parent).kind {
        if path.is_unqualified() {
            let head = arena.name(path.first()).to_string();
            let mode = match head.as_str() {
                "wrap" => Some(BoundedIntMode::Wrap),
                "clamp" => Some(BoundedIntMode::Clamp),
                _ => None,
            };
            if let Some(mode) = mode {
                return match const_index(arena, size) {
                    Some(limit) if limit > 1 && limit <= i32::MAX as i64 => {
                        arena.expr_mut(id).kind =
                            ExprKind::ConcreteType(Type::bounded(mode, limit as u32));
                        ctx.replaced();
                        true
                    }
                    Some(_) => {
                        ctx.fail(|| {
                            CompileError::new(
                                ErrorKind::IllegalArraySize,
                                span,
                                format!("'{head}' needs a limit greater than 1"),
                            )
                        });
                        false
                    }
                    None => {
                        ctx.retry();
                        false
                    }
                };
            }
        }
    }

    let Some(element) = type_of_type_expr(arena, parent) else {
        ctx.retry();
        return false;
    };
    let Some(p) = element.primitive_type().filter(|_| element.is_primitive()) else {
        ctx.fail(|| {
            CompileError::new(
                ErrorKind::ExpectedType,
                span,
                format!(
                    "vector elements must be primitive, not '{}'",
                    element.description()
                ),
            )
        });
        return false;
    };
    match const_index(arena, size) {
        Some(n) if Type::is_valid_vector_size(n) => {
            arena.expr_mut(id).kind = ExprKind::ConcreteType(Type::vector(p, n as u32));
            ctx.replaced();
            true
        }
        Some(_) => {
            ctx.fail(|| {
                CompileError::new(ErrorKind::IllegalArraySize, span, "illegal vector size")
            });
            false
        }
        None => {
            ctx.retry();
            false
        }
    }
}
