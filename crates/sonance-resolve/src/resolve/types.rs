//! Expression type computation.
//!
//! `result_type` answers "what type does this value expression have right
//! now"; it returns `None` while anything underneath is still unresolved,
//! which is what the fixed-point driver uses to decide whether a pass made
//! progress. Binary operators cache their unified operand/result pair so
//! deep expression trees do not re-unify on every query.

use sonance_ast::ast::{walk, AstArena, EndpointId, ExprId, ExprKind};
use sonance_ast::types::{binary_op_types, unary_op_type, Type};

/// The type a value expression produces, or `None` if not yet known.
pub fn result_type(arena: &AstArena, id: ExprId) -> Option<Type> {
    match &arena.expr(id).kind {
        ExprKind::Constant(v) => Some(v.ty().clone()),
        ExprKind::VariableRef(var) => {
            let decl = arena.variable(*var);
            let ty = decl.resolved_type.clone()?;
            if decl.is_constant {
                Some(ty.make_const())
            } else {
                Some(ty)
            }
        }
        ExprKind::EndpointRef(e) => endpoint_value_type(arena, *e),
        ExprKind::Binary {
            op,
            lhs,
            rhs,
            resolved_types,
        } => {
            if let Some(cached) = resolved_types {
                return Some(cached.result.clone());
            }
            let lt = result_type(arena, *lhs)?;
            let rt = result_type(arena, *rhs)?;
            Some(binary_op_types(*op, &lt, &rt)?.result)
        }
        ExprKind::Unary { op, operand } => {
            let t = result_type(arena, *operand)?;
            unary_op_type(*op, &t)
        }
        ExprKind::Ternary { true_value, .. } => result_type(arena, *true_value),
        ExprKind::Assignment { target, .. } => result_type(arena, *target),
        ExprKind::PreOrPostIncDec { target, .. } => result_type(arena, *target),
        ExprKind::FunctionCall { function, .. } => {
            let f = arena.function(*function);
            match f.return_type {
                Some(_) => f.resolved_return_type.clone(),
                None => Some(Type::void()),
            }
        }
        ExprKind::TypeCast { dest, .. } => Some(dest.clone()),
        ExprKind::ArrayElement { parent, start, end } => {
            let parent_ty = result_type(arena, *parent)?;
            match end {
                None => {
                    if parent_ty.is_primitive() {
                        Some(parent_ty)
                    } else {
                        parent_ty.element_type()
                    }
                }
                Some(end) => {
                    // Slices need compile-time bounds for their length.
                    let s = const_index(arena, *start)?;
                    let e = const_index(arena, *end)?;
                    if e > s {
                        Some(parent_ty.with_array_size((e - s) as u32))
                    } else {
                        None
                    }
                }
            }
        }
        ExprKind::StructMember { parent, member } => {
            let parent_ty = result_type(arena, *parent)?;
            let s = parent_ty.struct_ref()?;
            let index = s.member_index(arena.name(*member))?;
            Some(s.member_type(index).clone())
        }
        ExprKind::MetaFunction { .. } => None, // rewritten by the meta pass
        ExprKind::WriteToEndpoint { .. }
        | ExprKind::AdvanceClock
        | ExprKind::StaticAssertion { .. } => Some(Type::void()),
        ExprKind::ProcessorProperty(p) => Some(p.result_type()),
        ExprKind::ConcreteType(_)
        | ExprKind::ProcessorRef(_)
        | ExprKind::InstanceRef(_)
        | ExprKind::Name(_)
        | ExprKind::Dot { .. }
        | ExprKind::CallOrCast { .. }
        | ExprKind::BracketSubscript { .. }
        | ExprKind::ChevronSubscript { .. }
        | ExprKind::CommaList(_) => None,
    }
}

/// The concrete type named by a type expression, once resolution has
/// rewritten it to one.
pub fn type_of_type_expr(arena: &AstArena, id: ExprId) -> Option<Type> {
    match &arena.expr(id).kind {
        ExprKind::ConcreteType(t) => Some(t.clone()),
        _ => None,
    }
}

/// A compile-time integer, for array sizes and slice bounds.
pub fn const_index(arena: &AstArena, id: ExprId) -> Option<i64> {
    match &arena.expr(id).kind {
        ExprKind::Constant(v) if v.ty().is_integer() => v.as_i64(),
        _ => None,
    }
}

/// The type a read of this endpoint produces: the single data type, wrapped
/// in an array for endpoint gangs.
pub fn endpoint_value_type(arena: &AstArena, id: EndpointId) -> Option<Type> {
    let decl = arena.endpoint(id);
    let types = decl.resolved_types.as_ref()?;
    let single = types.first()?.clone();
    match decl.resolved_array_size {
        Some(n) => Some(Type::fixed_array(single, n)),
        None if decl.array_size.is_some() => None, // size not folded yet
        None => Some(single),
    }
}

/// Refresh the cached operand/result types on every binary operator under
/// the given roots. A cache is replaced whenever the operand types it was
/// computed from have changed.
pub fn refresh_binary_caches(arena: &mut AstArena, roots: &[ExprId]) {
    let mut all = Vec::new();
    for &root in roots {
        walk::collect_exprs(arena, root, &mut all);
    }
    for id in all {
        let (op, lhs, rhs) = match &arena.expr(id).kind {
            ExprKind::Binary { op, lhs, rhs, .. } => (*op, *lhs, *rhs),
            _ => continue,
        };
        let fresh = match (result_type(arena, lhs), result_type(arena, rhs)) {
            (Some(lt), Some(rt)) => binary_op_types(op, &lt, &rt),
            _ => None,
        };
        if let ExprKind::Binary { resolved_types, .. } = &mut arena.expr_mut(id).kind {
            if resolved_types.as_ref() != fresh.as_ref() {
                *resolved_types = fresh;
            }
        }
    }
}
