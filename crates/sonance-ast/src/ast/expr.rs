//! Expression nodes.
//!
//! Expressions start out as the loose shapes the parser can see (qualified
//! names, dot operators, call-or-cast) and are narrowed by the resolver into
//! concrete references, calls, casts and constants. [`ExpressionKind`]
//! records which syntactic category a node has settled into.

use super::{EndpointId, ExprId, FunctionId, InstanceId, ModuleId, ScopeId, VarId};
use crate::foundation::{Ident, Path, Span};
use crate::types::{BinaryOp, BinaryOpTypes, Type, UnaryOp, Value};

/// What an expression denotes once resolution has settled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionKind {
    Value,
    Type,
    Endpoint,
    Processor,
    Unknown,
}

/// The closed set of type meta-functions, applied as `T.op` or `op(T)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeMetaOp {
    MakeConst,
    MakeConstSilent,
    MakeReference,
    RemoveReference,
    ElementType,
    PrimitiveType,
    Size,
    IsArray,
    IsFixedSizeArray,
    IsVector,
    IsStruct,
    IsString,
    IsBool,
    IsInt,
    IsInt32,
    IsInt64,
    IsFloat,
    IsFloat32,
    IsFloat64,
    IsScalar,
    IsPrimitive,
    IsReference,
    IsConst,
}

impl TypeMetaOp {
    pub fn from_name(name: &str) -> Option<TypeMetaOp> {
        use TypeMetaOp::*;
        Some(match name {
            "makeConst" => MakeConst,
            "makeConstSilent" => MakeConstSilent,
            "makeReference" => MakeReference,
            "removeReference" => RemoveReference,
            "elementType" => ElementType,
            "primitiveType" => PrimitiveType,
            "size" => Size,
            "isArray" => IsArray,
            "isFixedSizeArray" => IsFixedSizeArray,
            "isVector" => IsVector,
            "isStruct" => IsStruct,
            "isString" => IsString,
            "isBool" => IsBool,
            "isInt" => IsInt,
            "isInt32" => IsInt32,
            "isInt64" => IsInt64,
            "isFloat" => IsFloat,
            "isFloat32" => IsFloat32,
            "isFloat64" => IsFloat64,
            "isScalar" => IsScalar,
            "isPrimitive" => IsPrimitive,
            "isReference" => IsReference,
            "isConst" => IsConst,
            _ => return None,
        })
    }

    /// Meta-functions either produce a type or a compile-time value.
    pub fn produces_type(self) -> bool {
        use TypeMetaOp::*;
        matches!(
            self,
            MakeConst | MakeConstSilent | MakeReference | RemoveReference | ElementType
                | PrimitiveType
        )
    }
}

/// Built-in properties of the enclosing processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorPropertyKind {
    /// Seconds per frame, as float64.
    Period,
    /// Frames per second, as float64.
    Frequency,
    /// Unique id of this processor instance, as int32.
    Id,
    /// Session id, as int32.
    Session,
}

impl ProcessorPropertyKind {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "period" => Self::Period,
            "frequency" => Self::Frequency,
            "id" => Self::Id,
            "session" => Self::Session,
            _ => return None,
        })
    }

    pub fn result_type(self) -> Type {
        match self {
            Self::Period | Self::Frequency => Type::float64(),
            Self::Id | Self::Session => Type::int32(),
        }
    }
}

/// An expression node: a span, the scope it appears in, and its shape.
#[derive(Debug, Clone)]
pub struct Expr {
    pub span: Span,
    pub scope: ScopeId,
    pub kind: ExprKind,
}

/// All expression shapes, resolved and unresolved.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// A folded compile-time constant.
    Constant(Value),
    /// A fully resolved type used in expression position.
    ConcreteType(Type),
    VariableRef(VarId),
    EndpointRef(EndpointId),
    ProcessorRef(ModuleId),
    InstanceRef(InstanceId),
    /// Unresolved qualified identifier.
    Name(Path),
    Binary {
        op: BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
        /// Cached operand/result types; reset if an operand's type changes.
        resolved_types: Option<BinaryOpTypes>,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Ternary {
        condition: ExprId,
        true_value: ExprId,
        false_value: ExprId,
    },
    Assignment {
        target: ExprId,
        value: ExprId,
    },
    PreOrPostIncDec {
        target: ExprId,
        is_increment: bool,
        is_post: bool,
    },
    /// `f(...)` before we know whether `f` is a function or a type.
    CallOrCast {
        target: ExprId,
        args: Vec<ExprId>,
        /// True when written as a method call `x.f(...)`; the receiver is
        /// already the first argument.
        is_method_call: bool,
    },
    /// A resolved call.
    FunctionCall {
        function: FunctionId,
        args: Vec<ExprId>,
    },
    /// A resolved cast to a concrete type.
    TypeCast {
        dest: Type,
        source: ExprId,
    },
    /// `parent[start]` or the slice `parent[start:end]` once the parent is
    /// known to be a value.
    ArrayElement {
        parent: ExprId,
        start: ExprId,
        end: Option<ExprId>,
    },
    /// Resolved struct member access.
    StructMember {
        parent: ExprId,
        member: Ident,
    },
    /// Unresolved `lhs.rhs`.
    Dot {
        parent: ExprId,
        member: Ident,
    },
    /// Unresolved `parent[...]`: array type, element access or slice.
    BracketSubscript {
        parent: ExprId,
        index: Option<ExprId>,
        /// Present for slice syntax `parent[index : index_end]`.
        index_end: Option<ExprId>,
    },
    /// `parent<size>`: a sized type such as `float<4>` or `wrap<8>`.
    ChevronSubscript {
        parent: ExprId,
        size: ExprId,
    },
    MetaFunction {
        op: TypeMetaOp,
        source: ExprId,
    },
    /// Aggregate literals and argument lists.
    CommaList(Vec<ExprId>),
    WriteToEndpoint {
        target: ExprId,
        value: ExprId,
    },
    AdvanceClock,
    StaticAssertion {
        condition: ExprId,
        message: Option<String>,
    },
    ProcessorProperty(ProcessorPropertyKind),
}

impl Expr {
    pub fn new(span: Span, scope: ScopeId, kind: ExprKind) -> Self {
        Self { span, scope, kind }
    }

    /// The syntactic category this node has settled into.
    pub fn expression_kind(&self) -> ExpressionKind {
        match &self.kind {
            ExprKind::ConcreteType(_) => ExpressionKind::Type,
            ExprKind::EndpointRef(_) => ExpressionKind::Endpoint,
            ExprKind::ProcessorRef(_) | ExprKind::InstanceRef(_) => ExpressionKind::Processor,
            ExprKind::Constant(_)
            | ExprKind::VariableRef(_)
            | ExprKind::Binary { .. }
            | ExprKind::Unary { .. }
            | ExprKind::Ternary { .. }
            | ExprKind::Assignment { .. }
            | ExprKind::PreOrPostIncDec { .. }
            | ExprKind::FunctionCall { .. }
            | ExprKind::TypeCast { .. }
            | ExprKind::ArrayElement { .. }
            | ExprKind::StructMember { .. }
            | ExprKind::WriteToEndpoint { .. }
            | ExprKind::AdvanceClock
            | ExprKind::StaticAssertion { .. }
            | ExprKind::ProcessorProperty(_) => ExpressionKind::Value,
            ExprKind::MetaFunction { op, .. } => {
                if op.produces_type() {
                    ExpressionKind::Type
                } else {
                    ExpressionKind::Value
                }
            }
            ExprKind::Name(_)
            | ExprKind::Dot { .. }
            | ExprKind::CallOrCast { .. }
            | ExprKind::BracketSubscript { .. }
            | ExprKind::ChevronSubscript { .. }
            | ExprKind::CommaList(_) => ExpressionKind::Unknown,
        }
    }

    /// True once the resolver has nothing left to do on this node itself.
    ///
    /// Children may still be unresolved; the resolver walks them separately.
    pub fn is_resolved(&self) -> bool {
        self.expression_kind() != ExpressionKind::Unknown
    }
}
