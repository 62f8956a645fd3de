//! The AST node arena and its node categories.
//!
//! Every node of a compilation lives in one [`AstArena`], keyed by a small
//! typed id. Nodes reference each other by id, never by pointer, so the
//! resolver can rewrite sub-trees in place while other ids stay stable. Each
//! node records the scope it was declared in; scopes form a tree rooted at a
//! synthetic top-level namespace.

pub mod build;
pub mod decl;
pub mod expr;
pub mod module;
pub mod scope;
pub mod stmt;
pub mod walk;

pub use build::AstBuilder;

pub use decl::{
    ConnectionDecl, ConnectionEnd, EndpointDecl, EndpointDirection, EndpointKind,
    InterpolationMode, ProcessorAliasDecl, ProcessorInstanceDecl, SpecialisationParam,
    StructDecl, StructMemberDecl, UsingDecl, VariableDecl,
};
pub use expr::{Expr, ExprKind, ExpressionKind, ProcessorPropertyKind, TypeMetaOp};
pub use module::{FunctionDecl, FunctionKind, ModuleDecl, ModuleKind};
pub use scope::{Scope, ScopeOwner, SearchMask, Symbol};
pub use stmt::{Stmt, StmtKind};

use crate::foundation::IdentPool;
use crate::types::{ConstantTable, StringDictionary};

macro_rules! define_node_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

define_node_id!(
    /// Id of an expression node.
    ExprId
);
define_node_id!(
    /// Id of a statement node.
    StmtId
);
define_node_id!(
    /// Id of a variable declaration (state, local, constant or parameter).
    VarId
);
define_node_id!(
    /// Id of a function declaration.
    FunctionId
);
define_node_id!(
    /// Id of a struct declaration.
    StructId
);
define_node_id!(
    /// Id of a using (type alias) declaration.
    UsingId
);
define_node_id!(
    /// Id of an endpoint declaration.
    EndpointId
);
define_node_id!(
    /// Id of a processor instance inside a graph.
    InstanceId
);
define_node_id!(
    /// Id of a connection inside a graph.
    ConnectionId
);
define_node_id!(
    /// Id of a processor alias declaration.
    AliasId
);
define_node_id!(
    /// Id of a namespace, processor or graph.
    ModuleId
);
define_node_id!(
    /// Id of a scope in the scope tree.
    ScopeId
);

/// Owns every AST node of one compilation.
#[derive(Debug, Default)]
pub struct AstArena {
    pub idents: IdentPool,
    /// String literals, shared with the lowered program.
    pub strings: StringDictionary,
    /// Packed data for unsized-array constants.
    pub constants: ConstantTable,
    /// Top-level modules, in declaration order.
    pub root_modules: Vec<ModuleId>,
    pub exprs: Vec<Expr>,
    pub stmts: Vec<Stmt>,
    pub variables: Vec<VariableDecl>,
    pub functions: Vec<FunctionDecl>,
    pub structs: Vec<StructDecl>,
    pub usings: Vec<UsingDecl>,
    pub endpoints: Vec<EndpointDecl>,
    pub instances: Vec<ProcessorInstanceDecl>,
    pub connections: Vec<ConnectionDecl>,
    pub aliases: Vec<ProcessorAliasDecl>,
    pub modules: Vec<ModuleDecl>,
    pub scopes: Vec<Scope>,
}

macro_rules! arena_accessors {
    ($field:ident, $id:ty, $node:ty, $get:ident, $get_mut:ident, $alloc:ident) => {
        pub fn $get(&self, id: $id) -> &$node {
            &self.$field[id.index()]
        }

        pub fn $get_mut(&mut self, id: $id) -> &mut $node {
            &mut self.$field[id.index()]
        }

        pub fn $alloc(&mut self, node: $node) -> $id {
            let id = <$id>::try_from_len(self.$field.len());
            self.$field.push(node);
            id
        }
    };
}

macro_rules! impl_from_len {
    ($($id:ty),* $(,)?) => {
        $(impl $id {
            fn try_from_len(len: usize) -> Self {
                assert!(len < u32::MAX as usize, "arena overflow");
                Self(len as u32)
            }
        })*
    };
}

impl_from_len!(
    ExprId,
    StmtId,
    VarId,
    FunctionId,
    StructId,
    UsingId,
    EndpointId,
    InstanceId,
    ConnectionId,
    AliasId,
    ModuleId,
    ScopeId,
);

impl AstArena {
    pub fn new() -> Self {
        Self::default()
    }

    arena_accessors!(exprs, ExprId, Expr, expr, expr_mut, alloc_expr);
    arena_accessors!(stmts, StmtId, Stmt, stmt, stmt_mut, alloc_stmt);
    arena_accessors!(
        variables,
        VarId,
        VariableDecl,
        variable,
        variable_mut,
        alloc_variable
    );
    arena_accessors!(
        functions,
        FunctionId,
        FunctionDecl,
        function,
        function_mut,
        alloc_function
    );
    arena_accessors!(structs, StructId, StructDecl, structure, structure_mut, alloc_struct);
    arena_accessors!(usings, UsingId, UsingDecl, using, using_mut, alloc_using);
    arena_accessors!(
        endpoints,
        EndpointId,
        EndpointDecl,
        endpoint,
        endpoint_mut,
        alloc_endpoint
    );
    arena_accessors!(
        instances,
        InstanceId,
        ProcessorInstanceDecl,
        instance,
        instance_mut,
        alloc_instance
    );
    arena_accessors!(
        connections,
        ConnectionId,
        ConnectionDecl,
        connection,
        connection_mut,
        alloc_connection
    );
    arena_accessors!(aliases, AliasId, ProcessorAliasDecl, alias, alias_mut, alloc_alias);
    arena_accessors!(modules, ModuleId, ModuleDecl, module, module_mut, alloc_module);
    arena_accessors!(scopes, ScopeId, Scope, scope, scope_mut, alloc_scope);

    /// The synthetic root scope; allocated first in every compilation.
    pub fn root_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Render an identifier through the pool.
    pub fn name(&self, ident: crate::foundation::Ident) -> &str {
        self.idents.name(ident)
    }
}
