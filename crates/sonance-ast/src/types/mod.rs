//! The Sonance type model and casting rules.
//!
//! Types form a closed variant set: primitives, vectors of primitives, fixed
//! and unsized arrays, nominal structs, bounded integers, and strings, plus
//! `const` and reference modifier flags. Casting between them is classified
//! by [`CastKind`]; the subset of kinds that never lose information are the
//! *silent* casts, which the resolver may insert implicitly.

pub mod ops;
pub mod value;

pub use ops::{binary_op_types, unary_op_type, BinaryOp, BinaryOpTypes, UnaryOp};
pub use value::{
    is_midi_message_struct, normalise_bounded, ConstFoldError, ConstantHandle, ConstantTable,
    StringDictionary, StringHandle, Value,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Largest packed size of a single value, in bytes.
pub const MAX_PACKED_OBJECT_SIZE: usize = 10 * 1024 * 1024;
/// Largest vector width.
pub const MAX_VECTOR_SIZE: u32 = 256;
/// Largest fixed array size.
pub const MAX_ARRAY_SIZE: u32 = 1 << 30;

/// Scalar primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Void,
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl PrimitiveType {
    pub fn is_void(self) -> bool {
        self == PrimitiveType::Void
    }

    pub fn is_integer(self) -> bool {
        matches!(self, PrimitiveType::Int32 | PrimitiveType::Int64)
    }

    pub fn is_floating_point(self) -> bool {
        matches!(self, PrimitiveType::Float32 | PrimitiveType::Float64)
    }

    pub fn can_be_vector_element(self) -> bool {
        self.is_integer() || self.is_floating_point() || self == PrimitiveType::Bool
    }

    pub fn packed_size(self) -> usize {
        match self {
            PrimitiveType::Void => 0,
            PrimitiveType::Bool => 1,
            PrimitiveType::Int32 | PrimitiveType::Float32 => 4,
            PrimitiveType::Int64 | PrimitiveType::Float64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Void => "void",
            PrimitiveType::Bool => "bool",
            PrimitiveType::Int32 => "int32",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::Float32 => "float32",
            PrimitiveType::Float64 => "float64",
        }
    }
}

/// Overflow policy of a bounded integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundedIntMode {
    /// Values normalise into `[0, limit)` with Euclidean modulo.
    Wrap,
    /// Values saturate into `[0, limit)`.
    Clamp,
}

/// A nominal struct type: identity is the declaration, not the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    pub name: String,
    pub members: Vec<StructMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructMember {
    pub name: String,
    pub ty: Type,
}

impl Structure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }

    pub fn member_type(&self, index: usize) -> &Type {
        &self.members[index].ty
    }

    pub fn packed_size(&self) -> usize {
        self.members.iter().map(|m| m.ty.packed_size()).sum()
    }
}

/// The structural part of a [`Type`], without modifier flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeKind {
    Primitive(PrimitiveType),
    Vector { element: PrimitiveType, size: u32 },
    FixedArray { element: Box<Type>, size: u32 },
    UnsizedArray { element: Box<Type> },
    Struct(Arc<Structure>),
    BoundedInt { mode: BoundedIntMode, limit: u32 },
    String,
}

/// A complete type: a kind plus `const` and reference flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Type {
    pub kind: TypeKind,
    pub is_const: bool,
    pub is_reference: bool,
}

/// Which differences [`Type::is_equal`] should overlook.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualityFlags {
    pub ignore_const: bool,
    pub ignore_references: bool,
    pub ignore_vector_size_1: bool,
}

impl EqualityFlags {
    pub const EXACT: EqualityFlags = EqualityFlags {
        ignore_const: false,
        ignore_references: false,
        ignore_vector_size_1: false,
    };

    pub const IGNORE_CONST: EqualityFlags = EqualityFlags {
        ignore_const: true,
        ignore_references: false,
        ignore_vector_size_1: false,
    };

    pub const IGNORE_CONST_AND_REF: EqualityFlags = EqualityFlags {
        ignore_const: true,
        ignore_references: true,
        ignore_vector_size_1: false,
    };

    pub const DUCK: EqualityFlags = EqualityFlags {
        ignore_const: true,
        ignore_references: true,
        ignore_vector_size_1: true,
    };
}

impl Type {
    pub fn primitive(p: PrimitiveType) -> Self {
        Type {
            kind: TypeKind::Primitive(p),
            is_const: false,
            is_reference: false,
        }
    }

    pub fn void() -> Self {
        Self::primitive(PrimitiveType::Void)
    }

    pub fn bool() -> Self {
        Self::primitive(PrimitiveType::Bool)
    }

    pub fn int32() -> Self {
        Self::primitive(PrimitiveType::Int32)
    }

    pub fn int64() -> Self {
        Self::primitive(PrimitiveType::Int64)
    }

    pub fn float32() -> Self {
        Self::primitive(PrimitiveType::Float32)
    }

    pub fn float64() -> Self {
        Self::primitive(PrimitiveType::Float64)
    }

    pub fn string() -> Self {
        Type {
            kind: TypeKind::String,
            is_const: false,
            is_reference: false,
        }
    }

    /// A vector of a numeric or bool primitive.
    ///
    /// # Panics
    /// Panics if the element cannot be a vector element.
    pub fn vector(element: PrimitiveType, size: u32) -> Self {
        assert!(
            element.can_be_vector_element(),
            "{} cannot be a vector element",
            element.name()
        );
        Type {
            kind: TypeKind::Vector { element, size },
            is_const: false,
            is_reference: false,
        }
    }

    pub fn fixed_array(element: Type, size: u32) -> Self {
        Type {
            kind: TypeKind::FixedArray {
                element: Box::new(element),
                size,
            },
            is_const: false,
            is_reference: false,
        }
    }

    pub fn unsized_array(element: Type) -> Self {
        Type {
            kind: TypeKind::UnsizedArray {
                element: Box::new(element),
            },
            is_const: false,
            is_reference: false,
        }
    }

    pub fn structure(s: Arc<Structure>) -> Self {
        Type {
            kind: TypeKind::Struct(s),
            is_const: false,
            is_reference: false,
        }
    }

    pub fn bounded(mode: BoundedIntMode, limit: u32) -> Self {
        Type {
            kind: TypeKind::BoundedInt { mode, limit },
            is_const: false,
            is_reference: false,
        }
    }

    // --- predicates -------------------------------------------------------

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(PrimitiveType::Void))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(p) if p != PrimitiveType::Void)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(PrimitiveType::Bool))
    }

    pub fn is_primitive_integer(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(p) if p.is_integer())
    }

    pub fn is_primitive_float(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(p) if p.is_floating_point())
    }

    pub fn is_float32(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(PrimitiveType::Float32))
    }

    pub fn is_float64(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(PrimitiveType::Float64))
    }

    pub fn is_integer32(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(PrimitiveType::Int32))
    }

    pub fn is_integer64(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(PrimitiveType::Int64))
    }

    /// Integer-valued: a primitive integer or a bounded int.
    pub fn is_integer(&self) -> bool {
        self.is_primitive_integer() || self.is_bounded_int()
    }

    pub fn is_string(&self) -> bool {
        matches!(self.kind, TypeKind::String)
    }

    pub fn is_vector(&self) -> bool {
        matches!(self.kind, TypeKind::Vector { .. })
    }

    pub fn is_vector_of_size_1(&self) -> bool {
        matches!(self.kind, TypeKind::Vector { size: 1, .. })
    }

    pub fn is_fixed_array(&self) -> bool {
        matches!(self.kind, TypeKind::FixedArray { .. })
    }

    pub fn is_unsized_array(&self) -> bool {
        matches!(self.kind, TypeKind::UnsizedArray { .. })
    }

    pub fn is_array(&self) -> bool {
        self.is_fixed_array() || self.is_unsized_array()
    }

    pub fn is_array_or_vector(&self) -> bool {
        self.is_array() || self.is_vector()
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, TypeKind::Struct(_))
    }

    pub fn is_bounded_int(&self) -> bool {
        matches!(self.kind, TypeKind::BoundedInt { .. })
    }

    pub fn is_wrapped(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::BoundedInt {
                mode: BoundedIntMode::Wrap,
                ..
            }
        )
    }

    pub fn is_clamped(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::BoundedInt {
                mode: BoundedIntMode::Clamp,
                ..
            }
        )
    }

    pub fn is_scalar(&self) -> bool {
        self.is_primitive() || self.is_vector()
    }

    pub fn is_non_const_reference(&self) -> bool {
        self.is_reference && !self.is_const
    }

    // --- accessors --------------------------------------------------------

    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self.kind {
            TypeKind::Primitive(p) => Some(p),
            TypeKind::Vector { element, size: 1 } => Some(element),
            TypeKind::BoundedInt { .. } => Some(PrimitiveType::Int32),
            _ => None,
        }
    }

    /// Element type of an array or vector.
    pub fn element_type(&self) -> Option<Type> {
        match &self.kind {
            TypeKind::Vector { element, .. } => Some(Type::primitive(*element)),
            TypeKind::FixedArray { element, .. } | TypeKind::UnsizedArray { element } => {
                Some((**element).clone())
            }
            _ => None,
        }
    }

    pub fn vector_element(&self) -> Option<PrimitiveType> {
        match self.kind {
            TypeKind::Vector { element, .. } => Some(element),
            _ => None,
        }
    }

    /// 1 for non-vectors, the width for vectors.
    pub fn vector_size(&self) -> u32 {
        match self.kind {
            TypeKind::Vector { size, .. } => size,
            _ => 1,
        }
    }

    pub fn array_or_vector_size(&self) -> Option<u32> {
        match self.kind {
            TypeKind::Vector { size, .. } | TypeKind::FixedArray { size, .. } => Some(size),
            _ => None,
        }
    }

    pub fn bounded_int_limit(&self) -> Option<u32> {
        match self.kind {
            TypeKind::BoundedInt { limit, .. } => Some(limit),
            _ => None,
        }
    }

    pub fn struct_ref(&self) -> Option<&Arc<Structure>> {
        match &self.kind {
            TypeKind::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Same kind with a different array/vector size.
    pub fn with_array_size(&self, new_size: u32) -> Type {
        let kind = match &self.kind {
            TypeKind::Vector { element, .. } => TypeKind::Vector {
                element: *element,
                size: new_size,
            },
            TypeKind::FixedArray { element, .. } | TypeKind::UnsizedArray { element } => {
                TypeKind::FixedArray {
                    element: element.clone(),
                    size: new_size,
                }
            }
            other => other.clone(),
        };
        Type {
            kind,
            is_const: self.is_const,
            is_reference: self.is_reference,
        }
    }

    // --- modifier flags ---------------------------------------------------

    pub fn make_const(&self) -> Type {
        Type {
            is_const: true,
            ..self.clone()
        }
    }

    pub fn remove_const(&self) -> Type {
        Type {
            is_const: false,
            ..self.clone()
        }
    }

    pub fn make_reference(&self) -> Type {
        Type {
            is_reference: true,
            ..self.clone()
        }
    }

    pub fn remove_reference(&self) -> Type {
        Type {
            is_reference: false,
            ..self.clone()
        }
    }

    pub fn without_flags(&self) -> Type {
        Type {
            is_const: false,
            is_reference: false,
            kind: self.kind.clone(),
        }
    }

    // --- equality and layout ----------------------------------------------

    /// Exact equality, including modifier flags. Structs compare nominally.
    pub fn is_identical(&self, other: &Type) -> bool {
        self.is_equal(other, EqualityFlags::EXACT)
    }

    pub fn is_equal(&self, other: &Type, flags: EqualityFlags) -> bool {
        if !flags.ignore_const && self.is_const != other.is_const {
            return false;
        }
        if !flags.ignore_references && self.is_reference != other.is_reference {
            return false;
        }
        kinds_equal(&self.kind, &other.kind, flags)
    }

    /// True if two types have byte-for-byte the same packed layout.
    pub fn has_identical_layout(&self, other: &Type) -> bool {
        fn layout(t: &Type, out: &mut Vec<(PrimitiveType, u32)>) {
            match &t.kind {
                TypeKind::Primitive(p) => out.push((*p, 1)),
                TypeKind::Vector { element, size } => out.push((*element, *size)),
                TypeKind::BoundedInt { .. } => out.push((PrimitiveType::Int32, 1)),
                TypeKind::String => out.push((PrimitiveType::Int32, 1)),
                TypeKind::FixedArray { element, size } => {
                    for _ in 0..*size {
                        layout(element, out);
                    }
                }
                TypeKind::UnsizedArray { .. } => out.push((PrimitiveType::Int64, 1)),
                TypeKind::Struct(s) => {
                    for m in &s.members {
                        layout(&m.ty, out);
                    }
                }
            }
        }
        let mut a = Vec::new();
        let mut b = Vec::new();
        layout(self, &mut a);
        layout(other, &mut b);
        a == b
    }

    // --- sizes ------------------------------------------------------------

    pub fn packed_size(&self) -> usize {
        match &self.kind {
            TypeKind::Primitive(p) => p.packed_size(),
            TypeKind::Vector { element, size } => element.packed_size() * *size as usize,
            TypeKind::FixedArray { element, size } => element.packed_size() * *size as usize,
            TypeKind::UnsizedArray { .. } => 8,
            TypeKind::Struct(s) => s.packed_size(),
            TypeKind::BoundedInt { .. } => 4,
            TypeKind::String => 4,
        }
    }

    pub fn is_too_big(&self) -> bool {
        self.packed_size() > MAX_PACKED_OBJECT_SIZE
    }

    pub fn is_valid_vector_size(size: i64) -> bool {
        size > 0 && size <= MAX_VECTOR_SIZE as i64
    }

    pub fn is_valid_array_size(size: i64) -> bool {
        size > 0 && size < MAX_ARRAY_SIZE as i64
    }

    /// True if `index` lands inside `[0, limit)` for a bounded-int type.
    pub fn is_valid_bounded_int_value(&self, index: i64) -> bool {
        match self.kind {
            TypeKind::BoundedInt { limit, .. } => index >= 0 && index < limit as i64,
            _ => false,
        }
    }

    // --- description ------------------------------------------------------

    /// Human-readable description, e.g. `const float32<4>&`.
    pub fn description(&self) -> String {
        let mut s = String::new();
        if self.is_const {
            s.push_str("const ");
        }
        s.push_str(&kind_description(&self.kind));
        if self.is_reference {
            s.push('&');
        }
        s
    }

    /// Compact identifier-safe description used in mangled names, e.g. `f32`,
    /// `v4_f32`, `a8_i32`, `s_Message`.
    pub fn mangled_name(&self) -> String {
        match &self.kind {
            TypeKind::Primitive(PrimitiveType::Void) => "void".to_string(),
            TypeKind::Primitive(PrimitiveType::Bool) => "b".to_string(),
            TypeKind::Primitive(PrimitiveType::Int32) => "i32".to_string(),
            TypeKind::Primitive(PrimitiveType::Int64) => "i64".to_string(),
            TypeKind::Primitive(PrimitiveType::Float32) => "f32".to_string(),
            TypeKind::Primitive(PrimitiveType::Float64) => "f64".to_string(),
            TypeKind::Vector { element, size } => {
                format!("v{}_{}", size, Type::primitive(*element).mangled_name())
            }
            TypeKind::FixedArray { element, size } => {
                format!("a{}_{}", size, element.mangled_name())
            }
            TypeKind::UnsizedArray { element } => format!("ua_{}", element.mangled_name()),
            TypeKind::Struct(s) => format!("s_{}", s.name),
            TypeKind::BoundedInt {
                mode: BoundedIntMode::Wrap,
                limit,
            } => format!("wrap{limit}"),
            TypeKind::BoundedInt {
                mode: BoundedIntMode::Clamp,
                limit,
            } => format!("clamp{limit}"),
            TypeKind::String => "string".to_string(),
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.is_identical(other)
    }
}

fn kinds_equal(a: &TypeKind, b: &TypeKind, flags: EqualityFlags) -> bool {
    if flags.ignore_vector_size_1 {
        if let (TypeKind::Vector { element, size: 1 }, TypeKind::Primitive(p))
        | (TypeKind::Primitive(p), TypeKind::Vector { element, size: 1 }) = (a, b)
        {
            return element == p;
        }
    }
    match (a, b) {
        (TypeKind::Primitive(x), TypeKind::Primitive(y)) => x == y,
        (
            TypeKind::Vector {
                element: e1,
                size: s1,
            },
            TypeKind::Vector {
                element: e2,
                size: s2,
            },
        ) => e1 == e2 && s1 == s2,
        (
            TypeKind::FixedArray {
                element: e1,
                size: s1,
            },
            TypeKind::FixedArray {
                element: e2,
                size: s2,
            },
        ) => s1 == s2 && e1.is_equal(e2, flags),
        (TypeKind::UnsizedArray { element: e1 }, TypeKind::UnsizedArray { element: e2 }) => {
            e1.is_equal(e2, flags)
        }
        (TypeKind::Struct(s1), TypeKind::Struct(s2)) => Arc::ptr_eq(s1, s2),
        (
            TypeKind::BoundedInt {
                mode: m1,
                limit: l1,
            },
            TypeKind::BoundedInt {
                mode: m2,
                limit: l2,
            },
        ) => m1 == m2 && l1 == l2,
        (TypeKind::String, TypeKind::String) => true,
        _ => false,
    }
}

fn kind_description(kind: &TypeKind) -> String {
    match kind {
        TypeKind::Primitive(p) => p.name().to_string(),
        TypeKind::Vector { element, size } => format!("{}<{}>", element.name(), size),
        TypeKind::FixedArray { element, size } => {
            format!("{}[{}]", element.description(), size)
        }
        TypeKind::UnsizedArray { element } => format!("{}[]", element.description()),
        TypeKind::Struct(s) => s.name.clone(),
        TypeKind::BoundedInt {
            mode: BoundedIntMode::Wrap,
            limit,
        } => format!("wrap<{limit}>"),
        TypeKind::BoundedInt {
            mode: BoundedIntMode::Clamp,
            limit,
        } => format!("clamp<{limit}>"),
        TypeKind::String => "string".to_string(),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// How a cast from one type to another is performed, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    NotPossible,
    Identity,
    NumericLossless,
    NumericReduction,
    ArrayElementLossless,
    ArrayElementReduction,
    ValueToArray,
    SingleElementVectorToScalar,
    FixedToUnsizedArray,
    Wrap,
    Clamp,
}

impl CastKind {
    /// Silent casts may be inserted implicitly by the resolver.
    pub fn is_silent(self) -> bool {
        matches!(
            self,
            CastKind::Identity
                | CastKind::NumericLossless
                | CastKind::ArrayElementLossless
                | CastKind::ValueToArray
                | CastKind::SingleElementVectorToScalar
                | CastKind::FixedToUnsizedArray
        )
    }

    pub fn is_possible(self) -> bool {
        self != CastKind::NotPossible
    }
}

/// Cast classification between two primitives.
pub fn primitive_cast_kind(dest: PrimitiveType, source: PrimitiveType) -> CastKind {
    use PrimitiveType::*;
    if dest == source {
        return CastKind::Identity;
    }
    if dest == Void || source == Void {
        return CastKind::NotPossible;
    }
    if dest == Int32 && source == Int64 {
        return CastKind::NumericReduction;
    }
    if dest.is_integer() {
        return if source.is_floating_point() {
            CastKind::NumericReduction
        } else {
            CastKind::NumericLossless
        };
    }
    if dest == Float32 {
        return CastKind::NumericReduction;
    }
    if dest == Float64 {
        return if source == Bool {
            CastKind::NumericReduction
        } else {
            CastKind::NumericLossless
        };
    }
    debug_assert_eq!(dest, Bool);
    CastKind::NumericReduction
}

/// Cast classification between two full types.
pub fn cast_kind(dest: &Type, source: &Type) -> CastKind {
    if dest.is_identical(source) {
        return CastKind::Identity;
    }
    if dest.is_void() || source.is_void() {
        return CastKind::NotPossible;
    }

    if (dest.is_primitive() || dest.is_vector_of_size_1())
        && source.is_primitive()
        && !dest.is_reference
    {
        if let (Some(d), Some(s)) = (dest.primitive_type(), source.primitive_type()) {
            return primitive_cast_kind(d, s);
        }
    }

    if source.is_equal(dest, EqualityFlags::IGNORE_CONST)
        && !dest.is_reference
        && !source.is_reference
    {
        return CastKind::Identity;
    }

    if dest.is_array() {
        if dest.is_unsized_array() && source.is_fixed_array() {
            if let (Some(de), Some(se)) = (dest.element_type(), source.element_type()) {
                if de.is_identical(&se) {
                    return CastKind::FixedToUnsizedArray;
                }
            }
        }

        if source.is_primitive() || source.is_vector_of_size_1() {
            if let (Some(elem), Some(s)) = (dest.element_type(), source.primitive_type()) {
                if cast_kind(&elem, &Type::primitive(s)).is_possible() {
                    return CastKind::ValueToArray;
                }
            }
        }

        if source.is_fixed_array() && source.array_or_vector_size() == dest.array_or_vector_size()
        {
            if let (Some(de), Some(se)) = (dest.element_type(), source.element_type()) {
                return match cast_kind(&de, &se) {
                    CastKind::NumericReduction => CastKind::ArrayElementReduction,
                    CastKind::NumericLossless
                    | CastKind::SingleElementVectorToScalar
                    | CastKind::ValueToArray => CastKind::ArrayElementLossless,
                    CastKind::Identity => CastKind::Identity,
                    _ => CastKind::NotPossible,
                };
            }
        }

        return CastKind::NotPossible;
    }

    if dest.is_vector() {
        if source.is_primitive() || source.is_vector_of_size_1() {
            if let (Some(elem), Some(s)) = (dest.vector_element(), source.primitive_type()) {
                if primitive_cast_kind(elem, s).is_possible() {
                    return CastKind::ValueToArray;
                }
            }
        }

        if source.is_vector() && source.array_or_vector_size() == dest.array_or_vector_size() {
            if let (Some(de), Some(se)) = (dest.vector_element(), source.vector_element()) {
                return match primitive_cast_kind(de, se) {
                    CastKind::Identity => CastKind::Identity,
                    CastKind::NumericReduction => CastKind::ArrayElementReduction,
                    CastKind::NumericLossless => CastKind::ArrayElementLossless,
                    _ => CastKind::NotPossible,
                };
            }
        }

        return CastKind::NotPossible;
    }

    if dest.is_struct() || source.is_struct() {
        return CastKind::NotPossible;
    }

    if dest.is_bounded_int() {
        if source.is_bounded_int() && dest.bounded_int_limit() >= source.bounded_int_limit() {
            return CastKind::Identity;
        }
        let source_is_numeric =
            source.is_bounded_int() || source.is_primitive_integer() || source.is_primitive_float();
        if source_is_numeric {
            return if dest.is_wrapped() {
                CastKind::Wrap
            } else {
                CastKind::Clamp
            };
        }
        return CastKind::NotPossible;
    }

    if source.is_bounded_int() {
        return cast_kind(dest, &Type::int32());
    }

    if dest.is_string() && source.is_string() {
        return CastKind::Identity;
    }

    if dest.is_primitive() && source.is_vector_of_size_1() {
        let equal_enough = dest.is_equal(source, EqualityFlags::DUCK);
        let element_silent = match (dest.primitive_type(), source.primitive_type()) {
            (Some(d), Some(s)) => primitive_cast_kind(d, s).is_silent(),
            _ => false,
        };
        if equal_enough || element_silent {
            return CastKind::SingleElementVectorToScalar;
        }
    }

    CastKind::NotPossible
}

/// Any cast, silent or explicit.
pub fn can_cast_to(dest: &Type, source: &Type) -> bool {
    cast_kind(dest, source).is_possible()
}

/// Implicit conversions only.
pub fn can_silently_cast_to(dest: &Type, source: &Type) -> bool {
    cast_kind(dest, source).is_silent()
}

/// Argument-passing compatibility: exact for references, silent otherwise,
/// with fixed arrays decaying to unsized parameters.
pub fn can_pass_as_argument(dest: &Type, source: &Type, must_be_exact: bool) -> bool {
    if dest.is_non_const_reference() && source.is_const {
        return false;
    }
    if dest.is_unsized_array() && source.is_array() {
        if let (Some(de), Some(se)) = (dest.element_type(), source.element_type()) {
            if de.is_identical(&se) {
                return true;
            }
        }
    }
    if dest.is_equal(source, EqualityFlags::DUCK) {
        return true;
    }
    if !(must_be_exact || dest.is_reference) && can_silently_cast_to(dest, source) {
        return true;
    }
    if source.is_bounded_int() && dest.is_primitive_integer() {
        return dest.primitive_type() == source.primitive_type();
    }
    false
}

/// Outcome of picking a cast target from a list of candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastTargetChoice {
    /// Index of the single winning candidate.
    Unique(usize),
    /// Several candidates accept the source and none is exact.
    Ambiguous(Vec<usize>),
    NonePossible,
}

/// Pick which of `candidates` a value of type `source` should convert to.
///
/// An exactly equal candidate always wins; otherwise a single silent cast
/// wins; several silent casts with no exact match are ambiguous.
pub fn choose_cast_target(candidates: &[Type], source: &Type) -> CastTargetChoice {
    for (i, c) in candidates.iter().enumerate() {
        if c.is_equal(source, EqualityFlags::IGNORE_CONST) {
            return CastTargetChoice::Unique(i);
        }
    }
    let viable: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| can_silently_cast_to(c, source))
        .map(|(i, _)| i)
        .collect();
    match viable.len() {
        0 => CastTargetChoice::NonePossible,
        1 => CastTargetChoice::Unique(viable[0]),
        _ => CastTargetChoice::Ambiguous(viable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_implies_explicit() {
        let types = [
            Type::bool(),
            Type::int32(),
            Type::int64(),
            Type::float32(),
            Type::float64(),
            Type::vector(PrimitiveType::Float32, 4),
            Type::vector(PrimitiveType::Float32, 1),
            Type::fixed_array(Type::int32(), 3),
            Type::bounded(BoundedIntMode::Wrap, 8),
            Type::string(),
        ];
        for dest in &types {
            for source in &types {
                if can_silently_cast_to(dest, source) {
                    assert!(
                        can_cast_to(dest, source),
                        "silent cast {} -> {} must also be explicit",
                        source.description(),
                        dest.description()
                    );
                }
            }
        }
    }

    #[test]
    fn test_widening_is_silent_narrowing_is_not() {
        assert!(can_silently_cast_to(&Type::int64(), &Type::int32()));
        assert!(can_silently_cast_to(&Type::float64(), &Type::int32()));
        assert!(!can_silently_cast_to(&Type::int32(), &Type::int64()));
        assert!(!can_silently_cast_to(&Type::float32(), &Type::float64()));
        assert!(can_cast_to(&Type::int32(), &Type::float64()));
        assert!(can_cast_to(&Type::float32(), &Type::float64()));
    }

    #[test]
    fn test_vector_of_one_is_interchangeable_with_scalar() {
        let v1 = Type::vector(PrimitiveType::Float32, 1);
        assert!(can_silently_cast_to(&Type::float32(), &v1));
        assert!(can_silently_cast_to(&v1, &Type::float32()));
        let v4 = Type::vector(PrimitiveType::Float32, 4);
        assert!(!can_silently_cast_to(&Type::float32(), &v4));
    }

    #[test]
    fn test_bounded_int_casts() {
        let wrap8 = Type::bounded(BoundedIntMode::Wrap, 8);
        let wrap16 = Type::bounded(BoundedIntMode::Wrap, 16);
        // widening the limit is an identity cast, narrowing wraps
        assert_eq!(cast_kind(&wrap16, &wrap8), CastKind::Identity);
        assert_eq!(cast_kind(&wrap8, &wrap16), CastKind::Wrap);
        assert_eq!(cast_kind(&wrap8, &Type::int32()), CastKind::Wrap);
        let clamp8 = Type::bounded(BoundedIntMode::Clamp, 8);
        assert_eq!(cast_kind(&clamp8, &Type::int32()), CastKind::Clamp);
        // a bounded int reads as an int32
        assert!(can_silently_cast_to(&Type::int64(), &wrap8));
    }

    #[test]
    fn test_struct_casts_are_nominal() {
        let a = Arc::new(Structure {
            name: "Frame".to_string(),
            members: vec![StructMember {
                name: "left".to_string(),
                ty: Type::float32(),
            }],
        });
        let b = Arc::new(Structure {
            name: "Frame".to_string(),
            members: vec![StructMember {
                name: "left".to_string(),
                ty: Type::float32(),
            }],
        });
        let ta = Type::structure(a.clone());
        let tb = Type::structure(b);
        assert!(ta.is_identical(&Type::structure(a)));
        assert!(!ta.is_identical(&tb));
        assert!(ta.has_identical_layout(&tb));
        assert!(!can_cast_to(&ta, &tb));
    }

    #[test]
    fn test_fixed_array_decays_to_unsized() {
        let fixed = Type::fixed_array(Type::float32(), 16);
        let unsized_ = Type::unsized_array(Type::float32());
        assert_eq!(cast_kind(&unsized_, &fixed), CastKind::FixedToUnsizedArray);
        assert!(can_silently_cast_to(&unsized_, &fixed));
        assert!(!can_silently_cast_to(&fixed, &unsized_));
    }

    #[test]
    fn test_packed_sizes() {
        assert_eq!(Type::float32().packed_size(), 4);
        assert_eq!(Type::vector(PrimitiveType::Float64, 4).packed_size(), 32);
        assert_eq!(
            Type::fixed_array(Type::vector(PrimitiveType::Int32, 2), 8).packed_size(),
            64
        );
        let s = Arc::new(Structure {
            name: "S".to_string(),
            members: vec![
                StructMember {
                    name: "a".to_string(),
                    ty: Type::int64(),
                },
                StructMember {
                    name: "b".to_string(),
                    ty: Type::bool(),
                },
            ],
        });
        assert_eq!(Type::structure(s).packed_size(), 9);
    }

    #[test]
    fn test_cast_target_ambiguity() {
        let candidates = [Type::float32(), Type::float64()];
        // an int32 silently casts to both -> ambiguous
        match choose_cast_target(&candidates, &Type::int32()) {
            CastTargetChoice::Ambiguous(v) => assert_eq!(v.len(), 2),
            other => panic!("expected ambiguity, got {other:?}"),
        }
        // an exact match beats other viable candidates
        assert_eq!(
            choose_cast_target(&candidates, &Type::float32()),
            CastTargetChoice::Unique(0)
        );
        assert_eq!(
            choose_cast_target(&candidates, &Type::string()),
            CastTargetChoice::NonePossible
        );
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(Type::float32().description(), "float32");
        assert_eq!(
            Type::vector(PrimitiveType::Float32, 4).make_const().description(),
            "const float32<4>"
        );
        assert_eq!(
            Type::bounded(BoundedIntMode::Wrap, 8).description(),
            "wrap<8>"
        );
        assert_eq!(Type::fixed_array(Type::int32(), 3).mangled_name(), "a3_i32");
    }
}
