//! Type meta-function evaluation.
//!
//! Meta-functions interrogate or transform a type at compile time:
//! `float<4>.elementType` is `float`, `int[3].size` is `3`,
//! `MyType.isVector` is a bool constant. Each has a precondition on its
//! source; violating it is a typed error rather than a silent no-op.

use super::types::{result_type, type_of_type_expr};
use super::PassContext;
use sonance_ast::ast::{AstArena, ExprId, ExprKind, TypeMetaOp};
use sonance_ast::types::{Type, Value};
use sonance_ast::{CompileError, ErrorKind};

/// Try to evaluate one meta-function node; returns true if it was rewritten.
pub fn resolve_meta(arena: &mut AstArena, id: ExprId, ctx: &mut PassContext) -> bool {
    let (op, source) = match &arena.expr(id).kind {
        ExprKind::MetaFunction { op, source } => (*op, *source),
        _ => return false,
    };
    let span = arena.expr(id).span;

    // The source may be a type expression or a value whose type we use.
    let source_ty = match type_of_type_expr(arena, source) {
        Some(t) => Some(t),
        None => result_type(arena, source),
    };
    let Some(ty) = source_ty else {
        ctx.retry();
        return false;
    };

    use TypeMetaOp::*;
    let new_kind = match op {
        MakeConst | MakeConstSilent => ExprKind::ConcreteType(ty.make_const()),
        MakeReference => ExprKind::ConcreteType(ty.make_reference()),
        RemoveReference => ExprKind::ConcreteType(ty.remove_reference()),
        ElementType => match ty.element_type() {
            Some(e) => ExprKind::ConcreteType(e),
            None => {
                ctx.fail(|| {
                    CompileError::new(
                        ErrorKind::ExpectedType,
                        span,
                        format!("'{}' has no element type", ty.description()),
                    )
                });
                return false;
            }
        },
        PrimitiveType => match ty.primitive_type() {
            Some(p) => ExprKind::ConcreteType(Type::primitive(p)),
            None => {
                ctx.fail(|| {
                    CompileError::new(
                        ErrorKind::ExpectedType,
                        span,
                        format!("'{}' has no primitive type", ty.description()),
                    )
                });
                return false;
            }
        },
        Size => {
            let size = if let Some(n) = ty.array_or_vector_size() {
                Some(n as i64)
            } else if let Some(l) = ty.bounded_int_limit() {
                Some(l as i64)
            } else {
                None
            };
            match size {
                Some(n) => ExprKind::Constant(Value::from_i64(n)),
                None => {
                    ctx.fail(|| {
                        CompileError::new(
                            ErrorKind::CannotTakeSizeOfType,
                            span,
                            format!("cannot take the size of '{}'", ty.description()),
                        )
                    });
                    return false;
                }
            }
        }
        IsArray => ExprKind::Constant(Value::from_bool(ty.is_array())),
        IsFixedSizeArray => ExprKind::Constant(Value::from_bool(ty.is_fixed_array())),
        IsVector => ExprKind::Constant(Value::from_bool(ty.is_vector())),
        IsStruct => ExprKind::Constant(Value::from_bool(ty.is_struct())),
        IsString => ExprKind::Constant(Value::from_bool(ty.is_string())),
        IsBool => ExprKind::Constant(Value::from_bool(ty.is_bool())),
        IsInt => ExprKind::Constant(Value::from_bool(ty.is_primitive_integer())),
        IsInt32 => ExprKind::Constant(Value::from_bool(ty.is_integer32())),
        IsInt64 => ExprKind::Constant(Value::from_bool(ty.is_integer64())),
        IsFloat => ExprKind::Constant(Value::from_bool(ty.is_primitive_float())),
        IsFloat32 => ExprKind::Constant(Value::from_bool(ty.is_float32())),
        IsFloat64 => ExprKind::Constant(Value::from_bool(ty.is_float64())),
        IsScalar => ExprKind::Constant(Value::from_bool(ty.is_scalar())),
        IsPrimitive => ExprKind::Constant(Value::from_bool(ty.is_primitive())),
        IsReference => ExprKind::Constant(Value::from_bool(ty.is_reference)),
        IsConst => ExprKind::Constant(Value::from_bool(ty.is_const)),
    };

    arena.expr_mut(id).kind = new_kind;
    ctx.replaced();
    true
}
