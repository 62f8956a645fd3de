//! Compile-time constant folding.
//!
//! Any expression whose operands are all compile-time constants collapses to
//! a `Constant` node. Folding runs interleaved with the other passes, so a
//! constant produced here can unlock an array size, a specialisation
//! argument or a static assertion on the next iteration.

use super::PassContext;
use sonance_ast::ast::{AstArena, ExprId, ExprKind};
use sonance_ast::types::{normalise_bounded, BoundedIntMode, ConstFoldError, Type, Value};
use sonance_ast::{CompileError, ErrorKind};

/// Try to fold one expression; returns true if it became a constant.
pub fn fold_expr(arena: &mut AstArena, id: ExprId, ctx: &mut PassContext) -> bool {
    let span = arena.expr(id).span;
    match arena.expr(id).kind.clone() {
        ExprKind::Binary { op, lhs, rhs, .. } => {
            let (Some(a), Some(b)) = (constant_of(arena, lhs), constant_of(arena, rhs)) else {
                return false;
            };
            match Value::apply_binary(op, &a, &b) {
                Ok(v) => {
                    arena.expr_mut(id).kind = ExprKind::Constant(v);
                    ctx.replaced();
                    true
                }
                Err(ConstFoldError::DivisionByZero) => {
                    ctx.fail(|| {
                        CompileError::new(ErrorKind::ExpectedConstant, span, "division by zero")
                    });
                    false
                }
                Err(ConstFoldError::ModuloZero) => {
                    ctx.fail(|| {
                        CompileError::new(ErrorKind::ExpectedConstant, span, "modulo by zero")
                    });
                    false
                }
                Err(ConstFoldError::Incompatible) => false,
            }
        }

        ExprKind::Unary { op, operand } => {
            let Some(v) = constant_of(arena, operand) else {
                return false;
            };
            match Value::apply_unary(op, &v) {
                Some(folded) => {
                    arena.expr_mut(id).kind = ExprKind::Constant(folded);
                    ctx.replaced();
                    true
                }
                None => false,
            }
        }

        ExprKind::Ternary {
            condition,
            true_value,
            false_value,
        } => {
            let Some(cond) = constant_of(arena, condition) else {
                return false;
            };
            let Some(cond) = cond.as_bool() else {
                return false;
            };
            let taken = if cond { true_value } else { false_value };
            let taken_kind = arena.expr(taken).kind.clone();
            arena.expr_mut(id).kind = taken_kind;
            ctx.replaced();
            true
        }

        ExprKind::VariableRef(var) => {
            // Compile-time constants propagate by value.
            let decl = arena.variable(var);
            if !decl.is_compile_time_constant() {
                return false;
            }
            let Some(init) = decl.initial_value else {
                return false;
            };
            let target_ty = decl.resolved_type.clone();
            let Some(v) = constant_of(arena, init) else {
                return false;
            };
            let folded = match target_ty {
                Some(ty) if !ty.is_identical(v.ty()) => match v.try_cast_to(&ty) {
                    Some(cast) => cast,
                    None => return false,
                },
                _ => v,
            };
            arena.expr_mut(id).kind = ExprKind::Constant(folded);
            ctx.replaced();
            true
        }

        ExprKind::TypeCast { dest, source } => fold_cast(arena, id, &dest, source, ctx),

        ExprKind::ArrayElement { parent, start, end } => {
            let Some(v) = constant_of(arena, parent) else {
                return false;
            };
            let Some(start_v) = constant_of(arena, start) else {
                return false;
            };
            let Some(start_i) = start_v.as_i64() else {
                return false;
            };
            let Some(size) = v.ty().array_or_vector_size() else {
                return false;
            };
            match end {
                None => {
                    let index = match effective_index(start_v.ty(), start_i, size) {
                        Some(i) => i,
                        None => {
                            ctx.fail(|| {
                                CompileError::new(
                                    ErrorKind::IndexOutOfRange,
                                    span,
                                    format!("index {start_i} is out of range for size {size}"),
                                )
                            });
                            return false;
                        }
                    };
                    match v.sub_element(index) {
                        Some(element) => {
                            arena.expr_mut(id).kind = ExprKind::Constant(element);
                            ctx.replaced();
                            true
                        }
                        None => false,
                    }
                }
                Some(end) => {
                    let Some(end_i) = constant_of(arena, end).and_then(|v| v.as_i64()) else {
                        return false;
                    };
                    match v.slice(start_i.max(0) as usize, end_i.max(0) as usize) {
                        Some(sliced) => {
                            arena.expr_mut(id).kind = ExprKind::Constant(sliced);
                            ctx.replaced();
                            true
                        }
                        None => {
                            ctx.fail(|| {
                                CompileError::new(
                                    ErrorKind::IndexOutOfRange,
                                    span,
                                    format!("slice [{start_i}:{end_i}] is out of range"),
                                )
                            });
                            false
                        }
                    }
                }
            }
        }

        ExprKind::StructMember { parent, member } => {
            let Some(v) = constant_of(arena, parent) else {
                return false;
            };
            let member_name = arena.name(member).to_string();
            let Some(index) = v.ty().struct_ref().and_then(|s| s.member_index(&member_name))
            else {
                return false;
            };
            match v.sub_element(index) {
                Some(element) => {
                    arena.expr_mut(id).kind = ExprKind::Constant(element);
                    ctx.replaced();
                    true
                }
                None => false,
            }
        }

        _ => false,
    }
}

/// The constant held by an expression, if it has already folded.
pub fn constant_of(arena: &AstArena, id: ExprId) -> Option<Value> {
    match &arena.expr(id).kind {
        ExprKind::Constant(v) => Some(v.clone()),
        _ => None,
    }
}

/// Single-index subscripts honour the index type's bounded-int policy; a
/// plain integer must be in range.
fn effective_index(index_ty: &Type, index: i64, size: u32) -> Option<usize> {
    if index_ty.is_bounded_int() {
        let mode = if index_ty.is_wrapped() {
            BoundedIntMode::Wrap
        } else {
            BoundedIntMode::Clamp
        };
        // The index is already normalised to the type's own limit; clamp it
        // into the array's range as well.
        return Some(normalise_bounded(mode, size, index) as usize);
    }
    if index >= 0 && (index as u64) < size as u64 {
        Some(index as usize)
    } else {
        None
    }
}

fn fold_cast(
    arena: &mut AstArena,
    id: ExprId,
    dest: &Type,
    source: ExprId,
    ctx: &mut PassContext,
) -> bool {
    let span = arena.expr(id).span;

    // Aggregate literal: Type(a, b, c).
    if let ExprKind::CommaList(items) = arena.expr(source).kind.clone() {
        let arity = aggregate_arity(dest);
        match arity {
            Some(n) if n != items.len() => {
                ctx.fail(|| {
                    CompileError::new(
                        ErrorKind::WrongNumberOfArgsForAggregate,
                        span,
                        format!(
                            "'{}' needs {} values, got {}",
                            dest.description(),
                            n,
                            items.len()
                        ),
                    )
                });
                return false;
            }
            _ => {}
        }
        let mut elements = Vec::with_capacity(items.len());
        for (i, &item) in items.iter().enumerate() {
            let Some(v) = constant_of(arena, item) else {
                return false;
            };
            let member_ty = aggregate_member_type(dest, i);
            let Some(member_ty) = member_ty else {
                return false;
            };
            if !v.can_silently_cast_to(&member_ty)
                && !sonance_ast::types::can_silently_cast_to(&member_ty, v.ty())
            {
                ctx.fail(|| {
                    CompileError::new(
                        ErrorKind::CannotImplicitlyCast,
                        span,
                        format!(
                            "cannot implicitly convert '{}' to '{}'",
                            v.ty().description(),
                            member_ty.description()
                        ),
                    )
                });
                return false;
            }
            match v.try_cast_to(&member_ty) {
                Some(cast) => elements.push(cast),
                None => return false,
            }
        }
        arena.expr_mut(id).kind = ExprKind::Constant(Value::aggregate(dest.clone(), elements));
        ctx.replaced();
        return true;
    }

    let Some(v) = constant_of(arena, source) else {
        return false;
    };
    match v.try_cast_to(dest) {
        Some(cast) => {
            arena.expr_mut(id).kind = ExprKind::Constant(cast);
            ctx.replaced();
            true
        }
        None => {
            ctx.fail(|| {
                CompileError::new(
                    ErrorKind::CannotCast,
                    span,
                    format!(
                        "cannot cast '{}' to '{}'",
                        v.ty().description(),
                        dest.description()
                    ),
                )
            });
            false
        }
    }
}

fn aggregate_arity(ty: &Type) -> Option<usize> {
    if let Some(s) = ty.struct_ref() {
        return Some(s.members.len());
    }
    ty.array_or_vector_size().map(|n| n as usize)
}

fn aggregate_member_type(ty: &Type, index: usize) -> Option<Type> {
    if let Some(s) = ty.struct_ref() {
        return s.members.get(index).map(|m| m.ty.clone());
    }
    ty.element_type()
}
