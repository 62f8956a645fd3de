//! Declarations that live inside modules: variables, structs, usings,
//! endpoints, processor instances, connections and aliases.

use super::{AliasId, ExprId, ModuleId, ScopeId, UsingId, VarId};
use crate::foundation::{Annotation, Ident, Path, Span};
use crate::types::Type;
use std::sync::Arc;

/// A state variable, local, constant or parameter.
#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub span: Span,
    pub scope: ScopeId,
    pub name: Ident,
    /// Explicit declared type; at least one of this and `initial_value` is
    /// present.
    pub declared_type: Option<ExprId>,
    pub initial_value: Option<ExprId>,
    /// Constants cannot be assigned after initialisation.
    pub is_constant: bool,
    /// External state: filled in by the host before linking.
    pub is_external: bool,
    pub annotation: Annotation,
    /// Written once by the resolver.
    pub resolved_type: Option<Type>,
}

impl VariableDecl {
    /// Compile-time constness: constant and initialised by a constant (or
    /// left to the host as an external).
    pub fn is_compile_time_constant(&self) -> bool {
        self.is_constant && (self.initial_value.is_some() || self.is_external)
    }
}

/// A struct declaration; `structure` is the write-once resolved form shared
/// by every type that references it.
#[derive(Debug, Clone)]
pub struct StructDecl {
    pub span: Span,
    pub scope: ScopeId,
    pub name: Ident,
    pub members: Vec<StructMemberDecl>,
    pub structure: Option<Arc<crate::types::Structure>>,
}

#[derive(Debug, Clone)]
pub struct StructMemberDecl {
    pub name: Ident,
    pub ty: ExprId,
}

/// `using Name = Type;`
#[derive(Debug, Clone)]
pub struct UsingDecl {
    pub span: Span,
    pub scope: ScopeId,
    pub name: Ident,
    pub target: ExprId,
    pub resolved: Option<Type>,
}

/// `processor Name = Some::Processor;`
#[derive(Debug, Clone)]
pub struct ProcessorAliasDecl {
    pub span: Span,
    pub scope: ScopeId,
    pub name: Ident,
    pub target: Path,
    pub resolved: Option<ModuleId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EndpointKind {
    /// One primitive or vector frame per clock tick.
    Stream,
    /// A single possibly-aggregate value with ramping.
    Value,
    /// Discrete timestamped payloads.
    Event,
}

/// An input or output port of a processor or graph.
#[derive(Debug, Clone)]
pub struct EndpointDecl {
    pub span: Span,
    pub scope: ScopeId,
    pub name: Ident,
    pub direction: EndpointDirection,
    pub kind: EndpointKind,
    /// One or more permitted data types (events may take several).
    pub data_types: Vec<ExprId>,
    /// Written once all data types have resolved.
    pub resolved_types: Option<Vec<Type>>,
    /// Endpoint gangs: `input stream float in[4]`.
    pub array_size: Option<ExprId>,
    pub resolved_array_size: Option<u32>,
    pub annotation: Annotation,
}

impl EndpointDecl {
    pub fn is_input(&self) -> bool {
        self.direction == EndpointDirection::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == EndpointDirection::Output
    }

    pub fn is_event(&self) -> bool {
        self.kind == EndpointKind::Event
    }

    pub fn is_stream(&self) -> bool {
        self.kind == EndpointKind::Stream
    }
}

/// How a stream connection interpolates when crossing clock domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InterpolationMode {
    None,
    Latch,
    Linear,
    Sinc,
    Fast,
    Best,
}

/// One endpoint of a connection: an optional instance, an endpoint name, and
/// an optional gang index.
#[derive(Debug, Clone)]
pub struct ConnectionEnd {
    /// None means an endpoint of the enclosing graph itself.
    pub instance: Option<Ident>,
    pub endpoint: Ident,
    pub endpoint_index: Option<ExprId>,
}

/// A directed edge between two endpoints in a graph.
#[derive(Debug, Clone)]
pub struct ConnectionDecl {
    pub span: Span,
    pub scope: ScopeId,
    pub interpolation: InterpolationMode,
    pub source: ConnectionEnd,
    pub dest: ConnectionEnd,
    /// `-> [n] ->` delay; must resolve to an integer constant in range.
    pub delay: Option<ExprId>,
    pub resolved_delay: Option<i64>,
}

/// A named instantiation of a processor or graph inside a graph.
#[derive(Debug, Clone)]
pub struct ProcessorInstanceDecl {
    pub span: Span,
    pub scope: ScopeId,
    pub name: Ident,
    pub target: Path,
    /// Specialisation arguments (types, constants or processor refs).
    pub args: Vec<ExprId>,
    pub clock_multiplier: Option<ExprId>,
    pub clock_divider: Option<ExprId>,
    pub array_size: Option<ExprId>,
    pub resolved_target: Option<ModuleId>,
    pub resolved_array_size: Option<u32>,
}

/// A parameter a processor or namespace can be specialised over.
#[derive(Debug, Clone, Copy)]
pub enum SpecialisationParam {
    /// `using T` — bound to a type argument.
    Type(UsingId),
    /// `int n` — bound to a constant argument.
    Value(VarId),
    /// `processor P` — bound to a processor argument.
    Processor(AliasId),
}
