//! Constant values and their packed byte representation.
//!
//! A [`Value`] owns a type and a little-endian packed buffer whose layout is
//! fully determined by the type. Strings are 32-bit handles into the
//! program-wide [`StringDictionary`]; unsized-array values hold a handle into
//! the [`ConstantTable`].

use super::ops::{binary_op_types, BinaryOp, UnaryOp};
use super::{
    can_silently_cast_to, cast_kind, BoundedIntMode, CastKind, PrimitiveType, Type, TypeKind,
};
use serde::{Deserialize, Serialize};

/// Handle into a [`StringDictionary`]. Zero is reserved for "no string".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StringHandle(pub u32);

/// Handle into a [`ConstantTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConstantHandle(pub u32);

/// A typed constant with its packed byte image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    ty: Type,
    bytes: Vec<u8>,
}

/// Why a constant-folding step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstFoldError {
    DivisionByZero,
    ModuloZero,
    Incompatible,
}

impl Value {
    /// All-zero value of any type.
    pub fn zero(ty: Type) -> Self {
        let size = ty.packed_size();
        Value {
            ty,
            bytes: vec![0; size],
        }
    }

    pub fn from_bool(v: bool) -> Self {
        Value {
            ty: Type::bool(),
            bytes: vec![v as u8],
        }
    }

    pub fn from_i32(v: i32) -> Self {
        Value {
            ty: Type::int32(),
            bytes: v.to_le_bytes().to_vec(),
        }
    }

    pub fn from_i64(v: i64) -> Self {
        Value {
            ty: Type::int64(),
            bytes: v.to_le_bytes().to_vec(),
        }
    }

    pub fn from_f32(v: f32) -> Self {
        Value {
            ty: Type::float32(),
            bytes: v.to_le_bytes().to_vec(),
        }
    }

    pub fn from_f64(v: f64) -> Self {
        Value {
            ty: Type::float64(),
            bytes: v.to_le_bytes().to_vec(),
        }
    }

    pub fn from_string_handle(handle: StringHandle) -> Self {
        Value {
            ty: Type::string(),
            bytes: handle.0.to_le_bytes().to_vec(),
        }
    }

    /// A bounded-int value, normalised per the type's mode.
    pub fn bounded(mode: BoundedIntMode, limit: u32, v: i64) -> Self {
        let stored = normalise_bounded(mode, limit, v);
        Value {
            ty: Type::bounded(mode, limit),
            bytes: (stored as i32).to_le_bytes().to_vec(),
        }
    }

    /// An unsized-array value referencing packed element data in the
    /// constant table.
    pub fn unsized_array(element: Type, handle: ConstantHandle) -> Self {
        let mut bytes = vec![0u8; 8];
        bytes[..4].copy_from_slice(&handle.0.to_le_bytes());
        Value {
            ty: Type::unsized_array(element),
            bytes,
        }
    }

    /// Pack a sequence of element values into one aggregate.
    ///
    /// The element count must match the aggregate's arity; each element must
    /// already have the member/element type.
    pub fn aggregate(ty: Type, elements: Vec<Value>) -> Self {
        let mut bytes = Vec::with_capacity(ty.packed_size());
        for e in &elements {
            bytes.extend_from_slice(&e.bytes);
        }
        debug_assert_eq!(bytes.len(), ty.packed_size());
        Value { ty, bytes }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    // --- scalar accessors -------------------------------------------------

    pub fn as_bool(&self) -> Option<bool> {
        match self.ty.kind {
            TypeKind::Primitive(PrimitiveType::Bool) => Some(self.bytes[0] != 0),
            _ => None,
        }
    }

    /// Integer reading with numeric coercion from any scalar numeric type.
    pub fn as_i64(&self) -> Option<i64> {
        match self.ty.kind {
            TypeKind::Primitive(PrimitiveType::Bool) => Some((self.bytes[0] != 0) as i64),
            TypeKind::Primitive(PrimitiveType::Int32) | TypeKind::BoundedInt { .. } => {
                Some(i32::from_le_bytes(self.bytes[..4].try_into().ok()?) as i64)
            }
            TypeKind::Primitive(PrimitiveType::Int64) => {
                Some(i64::from_le_bytes(self.bytes[..8].try_into().ok()?))
            }
            TypeKind::Primitive(PrimitiveType::Float32) => {
                Some(f32::from_le_bytes(self.bytes[..4].try_into().ok()?) as i64)
            }
            TypeKind::Primitive(PrimitiveType::Float64) => {
                Some(f64::from_le_bytes(self.bytes[..8].try_into().ok()?) as i64)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.ty.kind {
            TypeKind::Primitive(PrimitiveType::Float32) => {
                Some(f32::from_le_bytes(self.bytes[..4].try_into().ok()?) as f64)
            }
            TypeKind::Primitive(PrimitiveType::Float64) => {
                Some(f64::from_le_bytes(self.bytes[..8].try_into().ok()?))
            }
            _ => self.as_i64().map(|i| i as f64),
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self.ty.kind {
            TypeKind::Primitive(PrimitiveType::Float32) => {
                Some(f32::from_le_bytes(self.bytes[..4].try_into().ok()?))
            }
            _ => self.as_f64().map(|d| d as f32),
        }
    }

    pub fn string_handle(&self) -> Option<StringHandle> {
        match self.ty.kind {
            TypeKind::String => Some(StringHandle(u32::from_le_bytes(
                self.bytes[..4].try_into().ok()?,
            ))),
            _ => None,
        }
    }

    pub fn constant_handle(&self) -> Option<ConstantHandle> {
        match self.ty.kind {
            TypeKind::UnsizedArray { .. } => Some(ConstantHandle(u32::from_le_bytes(
                self.bytes[..4].try_into().ok()?,
            ))),
            _ => None,
        }
    }

    /// True for zero/false of any scalar type.
    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }

    // --- aggregates -------------------------------------------------------

    /// Number of packed sub-elements (array/vector size, struct arity).
    pub fn element_count(&self) -> Option<usize> {
        match &self.ty.kind {
            TypeKind::Vector { size, .. } | TypeKind::FixedArray { size, .. } => {
                Some(*size as usize)
            }
            TypeKind::Struct(s) => Some(s.members.len()),
            _ => None,
        }
    }

    /// Extract one packed sub-element of an aggregate.
    pub fn sub_element(&self, index: usize) -> Option<Value> {
        match &self.ty.kind {
            TypeKind::Vector { element, size } => {
                if index >= *size as usize {
                    return None;
                }
                let esize = element.packed_size();
                let start = index * esize;
                Some(Value {
                    ty: Type::primitive(*element),
                    bytes: self.bytes[start..start + esize].to_vec(),
                })
            }
            TypeKind::FixedArray { element, size } => {
                if index >= *size as usize {
                    return None;
                }
                let esize = element.packed_size();
                let start = index * esize;
                Some(Value {
                    ty: (**element).clone(),
                    bytes: self.bytes[start..start + esize].to_vec(),
                })
            }
            TypeKind::Struct(s) => {
                let member = s.members.get(index)?;
                let start: usize = s.members[..index]
                    .iter()
                    .map(|m| m.ty.packed_size())
                    .sum();
                let esize = member.ty.packed_size();
                Some(Value {
                    ty: member.ty.clone(),
                    bytes: self.bytes[start..start + esize].to_vec(),
                })
            }
            _ => None,
        }
    }

    /// Extract the `[start, end)` slice of an array or vector value.
    pub fn slice(&self, start: usize, end: usize) -> Option<Value> {
        let size = self.ty.array_or_vector_size()? as usize;
        if start >= end || end > size {
            return None;
        }
        let esize = self.ty.element_type()?.packed_size();
        Some(Value {
            ty: self.ty.with_array_size((end - start) as u32),
            bytes: self.bytes[start * esize..end * esize].to_vec(),
        })
    }

    // --- casting ----------------------------------------------------------

    /// Convert to another type, if the cast is possible for this value.
    ///
    /// Handles every explicit cast; lossy numeric conversions truncate the
    /// way a runtime cast would, and bounded-int targets normalise.
    pub fn try_cast_to(&self, dest: &Type) -> Option<Value> {
        match cast_kind(dest, &self.ty) {
            CastKind::NotPossible => None,
            CastKind::Identity => Some(Value {
                ty: dest.clone(),
                bytes: self.bytes.clone(),
            }),
            CastKind::NumericLossless | CastKind::NumericReduction => {
                let p = dest.primitive_type()?;
                let v = self.cast_scalar(p)?;
                if dest.is_vector_of_size_1() {
                    Some(Value {
                        ty: dest.clone(),
                        bytes: v.bytes,
                    })
                } else {
                    Some(v)
                }
            }
            CastKind::SingleElementVectorToScalar => {
                let inner = self.sub_element(0)?;
                inner.try_cast_to(dest)
            }
            CastKind::ValueToArray => {
                let count = dest.array_or_vector_size()? as usize;
                let elem_ty = dest.element_type()?;
                let scalar = if self.ty.is_vector_of_size_1() {
                    self.sub_element(0)?
                } else {
                    self.clone()
                };
                let element = scalar.try_cast_to(&elem_ty)?;
                let mut bytes = Vec::with_capacity(dest.packed_size());
                for _ in 0..count {
                    bytes.extend_from_slice(&element.bytes);
                }
                Some(Value {
                    ty: dest.clone(),
                    bytes,
                })
            }
            CastKind::ArrayElementLossless | CastKind::ArrayElementReduction => {
                let count = self.element_count()?;
                let elem_ty = dest.element_type()?;
                let mut bytes = Vec::with_capacity(dest.packed_size());
                for i in 0..count {
                    bytes.extend_from_slice(&self.sub_element(i)?.try_cast_to(&elem_ty)?.bytes);
                }
                Some(Value {
                    ty: dest.clone(),
                    bytes,
                })
            }
            CastKind::Wrap | CastKind::Clamp => {
                let limit = dest.bounded_int_limit()?;
                let mode = if dest.is_wrapped() {
                    BoundedIntMode::Wrap
                } else {
                    BoundedIntMode::Clamp
                };
                Some(Value::bounded(mode, limit, self.as_i64()?))
            }
            CastKind::FixedToUnsizedArray => None, // needs a constant table slot
        }
    }

    fn cast_scalar(&self, dest: PrimitiveType) -> Option<Value> {
        match dest {
            PrimitiveType::Bool => Some(Value::from_bool(self.as_f64()? != 0.0)),
            PrimitiveType::Int32 => Some(Value::from_i32(self.as_i64()? as i32)),
            PrimitiveType::Int64 => Some(Value::from_i64(self.as_i64()?)),
            PrimitiveType::Float32 => Some(Value::from_f32(self.as_f64()? as f32)),
            PrimitiveType::Float64 => Some(Value::from_f64(self.as_f64()?)),
            PrimitiveType::Void => None,
        }
    }

    /// True if this particular constant survives an implicit conversion to
    /// `dest`, even when the type alone would not.
    pub fn can_silently_cast_to(&self, dest: &Type) -> bool {
        if dest.is_unsized_array() {
            return false;
        }
        if can_silently_cast_to(dest, &self.ty) {
            return true;
        }
        if dest.is_bounded_int() && self.ty.is_integer() {
            return self
                .as_i64()
                .is_some_and(|v| dest.is_valid_bounded_int_value(v));
        }
        if dest.is_float32() {
            if self.ty.is_float64() {
                return self
                    .as_f64()
                    .is_some_and(|d| (d as f32) as f64 == d);
            }
            if self.ty.is_primitive_integer() {
                return self
                    .as_i64()
                    .is_some_and(|i| (i as f32) as i64 == i);
            }
        }
        if dest.is_primitive_integer() {
            if self.ty.is_primitive_float() {
                return self
                    .as_f64()
                    .is_some_and(|d| d.trunc() == d && (d as i64) as f64 == d);
            }
            // int64 literal fitting into int32
            if self.ty.is_integer64() && dest.is_integer32() {
                return self
                    .as_i64()
                    .is_some_and(|i| i >= i32::MIN as i64 && i <= i32::MAX as i64);
            }
        }
        false
    }

    // --- constant arithmetic ----------------------------------------------

    /// Apply a binary operator to two constants.
    pub fn apply_binary(op: BinaryOp, a: &Value, b: &Value) -> Result<Value, ConstFoldError> {
        let types =
            binary_op_types(op, a.ty(), b.ty()).ok_or(ConstFoldError::Incompatible)?;
        let lhs = a
            .try_cast_to(&types.operand)
            .ok_or(ConstFoldError::Incompatible)?;
        let rhs = b
            .try_cast_to(&types.operand)
            .ok_or(ConstFoldError::Incompatible)?;

        if types.operand.is_primitive_float() {
            let (x, y) = (
                lhs.as_f64().ok_or(ConstFoldError::Incompatible)?,
                rhs.as_f64().ok_or(ConstFoldError::Incompatible)?,
            );
            return fold_float(op, x, y, &types.result);
        }

        if types.operand.is_bool() {
            let (x, y) = (
                lhs.as_bool().ok_or(ConstFoldError::Incompatible)?,
                rhs.as_bool().ok_or(ConstFoldError::Incompatible)?,
            );
            return fold_bool(op, x, y);
        }

        if types.operand.is_string() {
            return match op {
                BinaryOp::Equals => Ok(Value::from_bool(lhs.bytes == rhs.bytes)),
                BinaryOp::NotEquals => Ok(Value::from_bool(lhs.bytes != rhs.bytes)),
                _ => Err(ConstFoldError::Incompatible),
            };
        }

        let (x, y) = (
            lhs.as_i64().ok_or(ConstFoldError::Incompatible)?,
            rhs.as_i64().ok_or(ConstFoldError::Incompatible)?,
        );
        fold_int(op, x, y, &types.result)
    }

    /// Apply a unary operator to a constant.
    pub fn apply_unary(op: UnaryOp, v: &Value) -> Option<Value> {
        match op {
            UnaryOp::Negate => {
                if v.ty.is_primitive_float() {
                    let d = v.as_f64()?;
                    Value::from_f64(-d).try_cast_to(&v.ty)
                } else if v.ty.is_primitive_integer() {
                    let i = v.as_i64()?;
                    Value::from_i64(i.wrapping_neg()).try_cast_to(&v.ty)
                } else {
                    None
                }
            }
            UnaryOp::LogicalNot => Some(Value::from_bool(!v.as_bool()?)),
            UnaryOp::BitwiseNot => {
                if v.ty.is_primitive_integer() {
                    Value::from_i64(!v.as_i64()?).try_cast_to(&v.ty)
                } else {
                    None
                }
            }
        }
    }

    /// Render for diagnostics; resolves string handles when a dictionary is
    /// supplied, and shows MIDI messages as their packed bytes.
    pub fn describe(&self, dictionary: Option<&StringDictionary>) -> String {
        if let Some(h) = self.string_handle() {
            if let Some(s) = dictionary.and_then(|d| d.get(h)) {
                return format!("\"{s}\"");
            }
            return format!("string#{}", h.0);
        }
        if is_midi_message_struct(&self.ty) {
            if let Some(packed) = self.sub_element(0).and_then(|v| v.as_i64()) {
                return format!(
                    "midi({:#04x} {:#04x} {:#04x})",
                    (packed >> 16) & 0xff,
                    (packed >> 8) & 0xff,
                    packed & 0xff
                );
            }
        }
        match self.ty.kind {
            TypeKind::Primitive(PrimitiveType::Bool) => {
                return if self.bytes[0] != 0 { "true" } else { "false" }.to_string()
            }
            TypeKind::Primitive(PrimitiveType::Float32)
            | TypeKind::Primitive(PrimitiveType::Float64) => {
                if let Some(d) = self.as_f64() {
                    return format!("{d}");
                }
            }
            _ => {
                if let Some(i) = self.as_i64() {
                    return format!("{i}");
                }
            }
        }
        if let Some(count) = self.element_count() {
            let parts: Vec<String> = (0..count)
                .filter_map(|i| self.sub_element(i))
                .map(|v| v.describe(dictionary))
                .collect();
            return format!("({})", parts.join(", "));
        }
        format!("<{}>", self.ty.description())
    }
}

fn fold_int(op: BinaryOp, x: i64, y: i64, result: &Type) -> Result<Value, ConstFoldError> {
    use BinaryOp::*;
    let v = match op {
        Add => x.wrapping_add(y),
        Subtract => x.wrapping_sub(y),
        Multiply => x.wrapping_mul(y),
        Divide => {
            if y == 0 {
                return Err(ConstFoldError::DivisionByZero);
            }
            x.wrapping_div(y)
        }
        Modulo => {
            if y == 0 {
                return Err(ConstFoldError::ModuloZero);
            }
            x.wrapping_rem(y)
        }
        BitwiseAnd => x & y,
        BitwiseOr => x | y,
        BitwiseXor => x ^ y,
        LeftShift => x.wrapping_shl(y as u32),
        RightShift => x.wrapping_shr(y as u32),
        Equals => return Ok(Value::from_bool(x == y)),
        NotEquals => return Ok(Value::from_bool(x != y)),
        LessThan => return Ok(Value::from_bool(x < y)),
        LessThanOrEqual => return Ok(Value::from_bool(x <= y)),
        GreaterThan => return Ok(Value::from_bool(x > y)),
        GreaterThanOrEqual => return Ok(Value::from_bool(x >= y)),
        LogicalAnd | LogicalOr => return Err(ConstFoldError::Incompatible),
    };
    Value::from_i64(v)
        .try_cast_to(result)
        .ok_or(ConstFoldError::Incompatible)
}

fn fold_float(op: BinaryOp, x: f64, y: f64, result: &Type) -> Result<Value, ConstFoldError> {
    use BinaryOp::*;
    let v = match op {
        Add => x + y,
        Subtract => x - y,
        Multiply => x * y,
        Divide => {
            if y == 0.0 {
                return Err(ConstFoldError::DivisionByZero);
            }
            x / y
        }
        Modulo => {
            if y == 0.0 {
                return Err(ConstFoldError::ModuloZero);
            }
            x % y
        }
        Equals => return Ok(Value::from_bool(x == y)),
        NotEquals => return Ok(Value::from_bool(x != y)),
        LessThan => return Ok(Value::from_bool(x < y)),
        LessThanOrEqual => return Ok(Value::from_bool(x <= y)),
        GreaterThan => return Ok(Value::from_bool(x > y)),
        GreaterThanOrEqual => return Ok(Value::from_bool(x >= y)),
        _ => return Err(ConstFoldError::Incompatible),
    };
    if result.is_float32() {
        Ok(Value::from_f32(v as f32))
    } else {
        Ok(Value::from_f64(v))
    }
}

fn fold_bool(op: BinaryOp, x: bool, y: bool) -> Result<Value, ConstFoldError> {
    use BinaryOp::*;
    let v = match op {
        LogicalAnd => x && y,
        LogicalOr => x || y,
        Equals => x == y,
        NotEquals => x != y,
        _ => return Err(ConstFoldError::Incompatible),
    };
    Ok(Value::from_bool(v))
}

/// Normalise an integer into `[0, limit)` per the bounded-int mode.
pub fn normalise_bounded(mode: BoundedIntMode, limit: u32, v: i64) -> i64 {
    let l = limit as i64;
    match mode {
        BoundedIntMode::Wrap => ((v % l) + l) % l,
        BoundedIntMode::Clamp => v.clamp(0, l - 1),
    }
}

/// True for the MIDI message struct: a single `midiBytes: int32` member
/// holding three packed bytes.
pub fn is_midi_message_struct(ty: &Type) -> bool {
    ty.struct_ref().is_some_and(|s| {
        s.name == "Message"
            && s.members.len() == 1
            && s.members[0].name == "midiBytes"
            && s.members[0].ty.is_integer32()
    })
}

/// Interned string literals shared by a whole program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringDictionary {
    items: Vec<(StringHandle, String)>,
    next_handle: u32,
}

impl Default for StringDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl StringDictionary {
    pub fn new() -> Self {
        StringDictionary {
            items: Vec::new(),
            next_handle: 1,
        }
    }

    /// Intern a string, reusing the handle of an equal existing entry.
    pub fn get_or_add(&mut self, s: &str) -> StringHandle {
        if let Some((h, _)) = self.items.iter().find(|(_, existing)| existing == s) {
            return *h;
        }
        let handle = StringHandle(self.next_handle);
        self.next_handle += 1;
        self.items.push((handle, s.to_string()));
        handle
    }

    pub fn get(&self, handle: StringHandle) -> Option<&str> {
        self.items
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, s)| s.as_str())
    }

    /// Drop every entry whose handle is not in `live`.
    pub fn retain_handles(&mut self, live: &[StringHandle]) {
        self.items.retain(|(h, _)| live.contains(h));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = StringHandle> + '_ {
        self.items.iter().map(|(h, _)| *h)
    }
}

/// Out-of-line packed data for unsized-array constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantTable {
    items: Vec<(ConstantHandle, Value)>,
    next_handle: u32,
}

impl Default for ConstantTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantTable {
    pub fn new() -> Self {
        ConstantTable {
            items: Vec::new(),
            next_handle: 1,
        }
    }

    /// Store a value, reusing the handle of an equal existing entry.
    pub fn get_or_add(&mut self, v: Value) -> ConstantHandle {
        if let Some((h, _)) = self.items.iter().find(|(_, existing)| *existing == v) {
            return *h;
        }
        let handle = ConstantHandle(self.next_handle);
        self.next_handle += 1;
        self.items.push((handle, v));
        handle
    }

    pub fn get(&self, handle: ConstantHandle) -> Option<&Value> {
        self.items
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StructMember, Structure};
    use std::sync::Arc;

    #[test]
    fn test_round_trip_through_wider_types() {
        let v = Value::from_i32(123456);
        let widened = v.try_cast_to(&Type::int64()).unwrap();
        let back = widened.try_cast_to(&Type::int32()).unwrap();
        assert_eq!(back, v);

        let f = Value::from_f32(0.25);
        let widened = f.try_cast_to(&Type::float64()).unwrap();
        let back = widened.try_cast_to(&Type::float32()).unwrap();
        assert_eq!(back, f);

        let b = Value::from_bool(true);
        let widened = b.try_cast_to(&Type::int64()).unwrap();
        assert_eq!(widened.as_i64(), Some(1));
    }

    #[test]
    fn test_wrap_normalisation_is_euclidean() {
        for n in [-17i64, -8, -1, 0, 1, 7, 8, 23] {
            let v = Value::bounded(BoundedIntMode::Wrap, 8, n);
            assert_eq!(v.as_i64(), Some(((n % 8) + 8) % 8), "wrap of {n}");
        }
        // non-power-of-two limit behaves the same way
        let v = Value::bounded(BoundedIntMode::Wrap, 5, -7);
        assert_eq!(v.as_i64(), Some(3));
    }

    #[test]
    fn test_clamp_normalisation_saturates() {
        assert_eq!(Value::bounded(BoundedIntMode::Clamp, 8, -3).as_i64(), Some(0));
        assert_eq!(Value::bounded(BoundedIntMode::Clamp, 8, 3).as_i64(), Some(3));
        assert_eq!(Value::bounded(BoundedIntMode::Clamp, 8, 99).as_i64(), Some(7));
    }

    #[test]
    fn test_literal_aware_narrowing() {
        // 2.0 survives float64 -> float32, 0.1 does not
        assert!(Value::from_f64(2.0).can_silently_cast_to(&Type::float32()));
        assert!(!Value::from_f64(0.1).can_silently_cast_to(&Type::float32()));
        // 7 fits wrap<8>, 8 does not
        let wrap8 = Type::bounded(BoundedIntMode::Wrap, 8);
        assert!(Value::from_i32(7).can_silently_cast_to(&wrap8));
        assert!(!Value::from_i32(8).can_silently_cast_to(&wrap8));
        // an int64 literal in int32 range narrows silently
        assert!(Value::from_i64(42).can_silently_cast_to(&Type::int32()));
        assert!(!Value::from_i64(1 << 40).can_silently_cast_to(&Type::int32()));
    }

    #[test]
    fn test_constant_arithmetic() {
        let five = Value::apply_binary(BinaryOp::Add, &Value::from_i32(2), &Value::from_i32(3))
            .unwrap();
        assert_eq!(five.as_i64(), Some(5));
        assert_eq!(five.ty(), &Type::int32());

        let cmp =
            Value::apply_binary(BinaryOp::Equals, &five, &Value::from_i32(5)).unwrap();
        assert_eq!(cmp.as_bool(), Some(true));

        assert_eq!(
            Value::apply_binary(BinaryOp::Divide, &Value::from_i32(1), &Value::from_i32(0)),
            Err(ConstFoldError::DivisionByZero)
        );
    }

    #[test]
    fn test_mixed_arithmetic_promotes() {
        let v = Value::apply_binary(
            BinaryOp::Multiply,
            &Value::from_f32(0.5),
            &Value::from_i32(4),
        )
        .unwrap();
        assert_eq!(v.ty(), &Type::float32());
        assert_eq!(v.as_f64(), Some(2.0));
    }

    #[test]
    fn test_aggregate_packing_and_extraction() {
        let vec4 = Type::vector(PrimitiveType::Float32, 4);
        let v = Value::aggregate(
            vec4.clone(),
            (0..4).map(|i| Value::from_f32(i as f32)).collect(),
        );
        assert_eq!(v.bytes().len(), 16);
        assert_eq!(v.sub_element(2).unwrap().as_f64(), Some(2.0));
        let sliced = v.slice(1, 3).unwrap();
        assert_eq!(sliced.ty().array_or_vector_size(), Some(2));
        assert_eq!(sliced.sub_element(0).unwrap().as_f64(), Some(1.0));
    }

    #[test]
    fn test_value_to_array_splat() {
        let vec3 = Type::vector(PrimitiveType::Float32, 3);
        let v = Value::from_i32(1).try_cast_to(&vec3).unwrap();
        for i in 0..3 {
            assert_eq!(v.sub_element(i).unwrap().as_f64(), Some(1.0));
        }
    }

    #[test]
    fn test_string_dictionary_interning() {
        let mut dict = StringDictionary::new();
        let a = dict.get_or_add("hello");
        let b = dict.get_or_add("hello");
        let c = dict.get_or_add("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(dict.get(a), Some("hello"));
        dict.retain_handles(&[c]);
        assert_eq!(dict.get(a), None);
        assert_eq!(dict.get(c), Some("world"));
    }

    #[test]
    fn test_midi_message_rendering() {
        let msg = Arc::new(Structure {
            name: "Message".to_string(),
            members: vec![StructMember {
                name: "midiBytes".to_string(),
                ty: Type::int32(),
            }],
        });
        let ty = Type::structure(msg);
        assert!(is_midi_message_struct(&ty));
        let v = Value::aggregate(ty, vec![Value::from_i32(0x90_3C_7F)]);
        assert_eq!(v.describe(None), "midi(0x90 0x3c 0x7f)");
    }
}
