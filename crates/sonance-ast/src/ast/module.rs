//! Modules (namespaces, processors, graphs) and functions.

use super::{
    AliasId, ConnectionId, EndpointId, ExprId, FunctionId, InstanceId, ModuleId, ScopeId,
    SpecialisationParam, StmtId, StructId, UsingId, VarId,
};
use crate::foundation::{Annotation, Ident, Span};
use crate::types::Type;
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ModuleKind {
    Namespace,
    Processor,
    Graph,
}

impl ModuleKind {
    /// Processors and graphs both present endpoints and can be instantiated.
    pub fn is_processor_base(self) -> bool {
        matches!(self, ModuleKind::Processor | ModuleKind::Graph)
    }
}

/// A namespace, processor or graph declaration.
#[derive(Debug, Clone)]
pub struct ModuleDecl {
    pub span: Span,
    /// Scope this module is declared in.
    pub scope: ScopeId,
    /// Scope owned by this module; members are looked up here.
    pub local_scope: ScopeId,
    pub name: Ident,
    pub kind: ModuleKind,
    pub annotation: Annotation,
    pub parent: Option<ModuleId>,
    pub specialisation_params: Vec<SpecialisationParam>,

    pub endpoints: Vec<EndpointId>,
    pub state_variables: Vec<VarId>,
    pub functions: Vec<FunctionId>,
    pub structs: Vec<StructId>,
    pub usings: Vec<UsingId>,
    pub aliases: Vec<AliasId>,
    pub instances: Vec<InstanceId>,
    pub connections: Vec<ConnectionId>,
    pub sub_modules: Vec<ModuleId>,

    /// Memoised specialisations: canonical argument key -> clone.
    pub specialisations: IndexMap<String, ModuleId>,
    /// Set on clones produced by specialisation.
    pub specialised_from: Option<ModuleId>,
    /// The instance that triggered the specialisation, for diagnostics.
    pub specialised_at: Option<Span>,
}

impl ModuleDecl {
    pub fn new(span: Span, scope: ScopeId, local_scope: ScopeId, name: Ident, kind: ModuleKind) -> Self {
        Self {
            span,
            scope,
            local_scope,
            name,
            kind,
            annotation: Annotation::new(),
            parent: None,
            specialisation_params: Vec::new(),
            endpoints: Vec::new(),
            state_variables: Vec::new(),
            functions: Vec::new(),
            structs: Vec::new(),
            usings: Vec::new(),
            aliases: Vec::new(),
            instances: Vec::new(),
            connections: Vec::new(),
            sub_modules: Vec::new(),
            specialisations: IndexMap::new(),
            specialised_from: None,
            specialised_at: None,
        }
    }

    pub fn is_processor_base(&self) -> bool {
        self.kind.is_processor_base()
    }

    pub fn is_generic(&self) -> bool {
        !self.specialisation_params.is_empty()
    }
}

/// What role a function plays in its processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Normal,
    /// The per-frame body of a processor.
    Run,
    /// One-time initialisation.
    Init,
    /// Handler for an input event endpoint.
    Event,
}

/// A function declaration.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub span: Span,
    /// Scope the function is declared in.
    pub scope: ScopeId,
    /// Scope owned by the function; holds the parameters.
    pub local_scope: ScopeId,
    pub name: Ident,
    pub kind: FunctionKind,
    /// Type expression for the return type; None means void.
    pub return_type: Option<ExprId>,
    pub resolved_return_type: Option<Type>,
    pub parameters: Vec<VarId>,
    pub body: Option<StmtId>,
    pub annotation: Annotation,

    /// Free type variables of a generic function, in declaration order.
    pub generic_wildcards: Vec<Ident>,
    /// For a specialised clone: the generic it came from.
    pub original_generic_function: Option<FunctionId>,
    /// For a specialised clone: the call that triggered the specialisation,
    /// used to chain diagnostics.
    pub original_call: Option<ExprId>,
    /// Memoised specialisations of a generic: mangled type key -> clone.
    pub specialisations: IndexMap<String, FunctionId>,
    /// Using declarations injected into the function's own scope when a
    /// generic is specialised; they bind the wildcards to concrete types.
    pub local_usings: Vec<UsingId>,
}

impl FunctionDecl {
    pub fn is_generic(&self) -> bool {
        !self.generic_wildcards.is_empty()
    }

    pub fn is_specialisation(&self) -> bool {
        self.original_generic_function.is_some()
    }
}
