//! Binary and unary operators and their typing rules.
//!
//! Each operator family has its own rule for unifying operand types and
//! producing a result type. The rules only ever insert silent casts; anything
//! lossy must be written as an explicit cast in the source.

use super::{can_silently_cast_to, PrimitiveType, Type};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    LeftShift,
    RightShift,
    LogicalAnd,
    LogicalOr,
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        use BinaryOp::*;
        matches!(self, Add | Subtract | Multiply | Divide | Modulo)
    }

    pub fn is_bitwise(self) -> bool {
        use BinaryOp::*;
        matches!(self, BitwiseAnd | BitwiseOr | BitwiseXor | LeftShift | RightShift)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::LogicalAnd | BinaryOp::LogicalOr)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOp::Equals | BinaryOp::NotEquals)
    }

    pub fn is_comparison(self) -> bool {
        use BinaryOp::*;
        matches!(
            self,
            Equals | NotEquals | LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual
        )
    }

    pub fn symbol(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "+",
            Subtract => "-",
            Multiply => "*",
            Divide => "/",
            Modulo => "%",
            BitwiseAnd => "&",
            BitwiseOr => "|",
            BitwiseXor => "^",
            LeftShift => "<<",
            RightShift => ">>",
            LogicalAnd => "&&",
            LogicalOr => "||",
            Equals => "==",
            NotEquals => "!=",
            LessThan => "<",
            LessThanOrEqual => "<=",
            GreaterThan => ">",
            GreaterThanOrEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    LogicalNot,
    BitwiseNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::LogicalNot => "!",
            UnaryOp::BitwiseNot => "~",
        }
    }
}

/// Result type plus the type both operands must be coerced to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryOpTypes {
    pub result: Type,
    pub operand: Type,
}

fn suitable_for_binary_op(t: &Type) -> bool {
    !(t.is_struct() || t.is_array() || t.is_string())
}

fn arithmetic_op_types(a: &Type, b: &Type) -> Option<BinaryOpTypes> {
    if a.is_reference {
        return arithmetic_op_types(&a.remove_reference(), b);
    }
    if b.is_reference {
        return arithmetic_op_types(a, &b.remove_reference());
    }
    if !(suitable_for_binary_op(a) && suitable_for_binary_op(b)) {
        return None;
    }

    if a.is_identical(b) {
        return Some(BinaryOpTypes {
            result: a.clone(),
            operand: a.clone(),
        });
    }

    // A bounded int only combines with a plain integer, and keeps its bound.
    if a.is_bounded_int() {
        return b.is_primitive_integer().then(|| BinaryOpTypes {
            result: a.clone(),
            operand: a.clone(),
        });
    }
    if b.is_bounded_int() {
        return a.is_primitive_integer().then(|| BinaryOpTypes {
            result: b.clone(),
            operand: b.clone(),
        });
    }

    if can_silently_cast_to(a, b) {
        return Some(BinaryOpTypes {
            result: a.clone(),
            operand: a.clone(),
        });
    }
    if can_silently_cast_to(b, a) {
        return Some(BinaryOpTypes {
            result: b.clone(),
            operand: b.clone(),
        });
    }

    // Ints promote silently to either float width in arithmetic.
    if a.is_primitive_float() && b.is_integer() {
        return Some(BinaryOpTypes {
            result: a.clone(),
            operand: a.clone(),
        });
    }
    if b.is_primitive_float() && a.is_integer() {
        return Some(BinaryOpTypes {
            result: b.clone(),
            operand: b.clone(),
        });
    }

    None
}

fn logical_op_types(a: &Type, b: &Type) -> Option<BinaryOpTypes> {
    if suitable_for_binary_op(a) && suitable_for_binary_op(b) && a.vector_size() == b.vector_size()
    {
        return Some(BinaryOpTypes {
            result: Type::bool(),
            operand: Type::bool(),
        });
    }
    None
}

fn comparison_op_types(a: &Type, b: &Type) -> Option<BinaryOpTypes> {
    if a.is_bounded_int() {
        return comparison_op_types(&Type::int32(), b);
    }
    if b.is_bounded_int() {
        return comparison_op_types(a, &Type::int32());
    }

    let operand = arithmetic_op_types(a, b)?.operand;
    if a.vector_size() != b.vector_size() {
        return None;
    }
    let result = if a.is_vector() || b.is_vector() {
        Type::vector(PrimitiveType::Bool, a.vector_size())
    } else {
        Type::bool()
    };
    Some(BinaryOpTypes { result, operand })
}

fn equality_op_types(a: &Type, b: &Type) -> Option<BinaryOpTypes> {
    // String literals compare for equality but have no ordering.
    if a.is_string() && b.is_string() {
        return Some(BinaryOpTypes {
            result: Type::bool(),
            operand: a.clone(),
        });
    }
    comparison_op_types(a, b)
}

fn bitwise_op_types(a: &Type, b: &Type) -> Option<BinaryOpTypes> {
    if a.is_reference {
        return bitwise_op_types(&a.remove_reference(), b);
    }
    if b.is_reference {
        return bitwise_op_types(a, &b.remove_reference());
    }
    if a.is_bounded_int() {
        return bitwise_op_types(&Type::int32(), b);
    }
    if b.is_bounded_int() {
        return bitwise_op_types(a, &Type::int32());
    }

    let suitable = |t: &Type| {
        (t.is_primitive_integer()
            || (t.is_vector() && t.vector_element().is_some_and(|e| e.is_integer())))
            && suitable_for_binary_op(t)
    };

    if suitable(a)
        && suitable(b)
        && a.vector_size() == b.vector_size()
        && a.is_vector() == b.is_vector()
    {
        let int = if a.is_integer64()
            || b.is_integer64()
            || a.vector_element() == Some(PrimitiveType::Int64)
            || b.vector_element() == Some(PrimitiveType::Int64)
        {
            PrimitiveType::Int64
        } else {
            PrimitiveType::Int32
        };
        let ty = if a.is_vector() {
            Type::vector(int, a.vector_size())
        } else {
            Type::primitive(int)
        };
        return Some(BinaryOpTypes {
            result: ty.clone(),
            operand: ty,
        });
    }
    None
}

/// Operand and result types for a binary operator, or `None` when the
/// operand types are incompatible.
pub fn binary_op_types(op: BinaryOp, a: &Type, b: &Type) -> Option<BinaryOpTypes> {
    if op.is_arithmetic() {
        arithmetic_op_types(a, b)
    } else if op.is_bitwise() {
        bitwise_op_types(a, b)
    } else if op.is_logical() {
        logical_op_types(a, b)
    } else if op.is_equality() {
        equality_op_types(a, b)
    } else {
        comparison_op_types(a, b)
    }
}

/// Result type for a unary operator applied to `operand`.
pub fn unary_op_type(op: UnaryOp, operand: &Type) -> Option<Type> {
    let t = operand.remove_reference().remove_const();
    match op {
        UnaryOp::Negate => {
            (t.is_primitive_integer() || t.is_primitive_float() || t.is_vector()).then_some(t)
        }
        UnaryOp::LogicalNot => t.is_bool().then_some(t),
        UnaryOp::BitwiseNot => {
            (t.is_primitive_integer()
                || (t.is_vector() && t.vector_element().is_some_and(|e| e.is_integer())))
            .then_some(t)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundedIntMode;

    #[test]
    fn test_arithmetic_unification() {
        let t = binary_op_types(BinaryOp::Add, &Type::int32(), &Type::int64()).unwrap();
        assert_eq!(t.result, Type::int64());

        let t = binary_op_types(BinaryOp::Multiply, &Type::float32(), &Type::int32()).unwrap();
        assert_eq!(t.result, Type::float32());

        assert!(binary_op_types(BinaryOp::Add, &Type::string(), &Type::int32()).is_none());
    }

    #[test]
    fn test_bounded_int_arithmetic_keeps_the_bound() {
        let wrap8 = Type::bounded(BoundedIntMode::Wrap, 8);
        let t = binary_op_types(BinaryOp::Add, &wrap8, &Type::int32()).unwrap();
        assert_eq!(t.result, wrap8);
        assert!(binary_op_types(BinaryOp::Add, &wrap8, &Type::float32()).is_none());
    }

    #[test]
    fn test_comparisons_produce_bool() {
        let t = binary_op_types(BinaryOp::LessThan, &Type::int32(), &Type::float64()).unwrap();
        assert_eq!(t.result, Type::bool());

        let v = Type::vector(PrimitiveType::Float32, 4);
        let t = binary_op_types(BinaryOp::Equals, &v, &v).unwrap();
        assert_eq!(t.result, Type::vector(PrimitiveType::Bool, 4));
    }

    #[test]
    fn test_strings_compare_but_do_not_order() {
        assert!(binary_op_types(BinaryOp::Equals, &Type::string(), &Type::string()).is_some());
        assert!(binary_op_types(BinaryOp::LessThan, &Type::string(), &Type::string()).is_none());
    }

    #[test]
    fn test_bitwise_requires_integers() {
        let t = binary_op_types(BinaryOp::BitwiseAnd, &Type::int32(), &Type::int64()).unwrap();
        assert_eq!(t.result, Type::int64());
        assert!(binary_op_types(BinaryOp::BitwiseAnd, &Type::float32(), &Type::int32()).is_none());
    }

    #[test]
    fn test_unary_typing() {
        assert_eq!(unary_op_type(UnaryOp::Negate, &Type::float32()), Some(Type::float32()));
        assert_eq!(unary_op_type(UnaryOp::LogicalNot, &Type::bool()), Some(Type::bool()));
        assert_eq!(unary_op_type(UnaryOp::LogicalNot, &Type::int32()), None);
        assert_eq!(unary_op_type(UnaryOp::BitwiseNot, &Type::float64()), None);
    }
}
