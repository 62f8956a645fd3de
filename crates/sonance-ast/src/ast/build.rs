//! Construction API over the arena.
//!
//! The parser drives this builder to assemble a compilation; tests use it to
//! put together small programs directly. It keeps the scope tree consistent:
//! every node is created inside an explicit scope, and modules, functions and
//! blocks open their own scopes as they are created.

use super::{
    AliasId, AstArena, ConnectionDecl, ConnectionEnd, EndpointDecl, EndpointDirection,
    EndpointId, EndpointKind, Expr, ExprId, ExprKind, FunctionDecl, FunctionId, FunctionKind,
    InstanceId, InterpolationMode, ModuleDecl, ModuleId, ModuleKind, ProcessorAliasDecl,
    ProcessorInstanceDecl, Scope, ScopeId, ScopeOwner, Stmt, StmtId, StmtKind, StructDecl,
    StructId, StructMemberDecl, UsingDecl, UsingId, VarId, VariableDecl,
};
use crate::foundation::{Annotation, Ident, Path, Span};
use crate::types::{Type, Value};

/// Builds a compilation's AST, keeping scope bookkeeping in one place.
#[derive(Debug, Default)]
pub struct AstBuilder {
    pub arena: AstArena,
}

impl AstBuilder {
    /// A fresh arena with the synthetic root scope allocated.
    pub fn new() -> Self {
        let mut arena = AstArena::new();
        arena.alloc_scope(Scope {
            parent: None,
            owner: ScopeOwner::Root,
        });
        Self { arena }
    }

    pub fn ident(&mut self, name: &str) -> Ident {
        self.arena.idents.get(name)
    }

    pub fn path(&mut self, segments: &[&str]) -> Path {
        let ids = segments.iter().map(|s| self.arena.idents.get(s)).collect();
        Path::new(ids)
    }

    // --- modules ----------------------------------------------------------

    /// Declare a namespace, processor or graph; `parent` of `None` puts it at
    /// the top level.
    pub fn add_module(
        &mut self,
        kind: ModuleKind,
        name: &str,
        parent: Option<ModuleId>,
    ) -> ModuleId {
        let name = self.ident(name);
        let parent_scope = match parent {
            Some(p) => self.arena.module(p).local_scope,
            None => self.arena.root_scope(),
        };
        // Allocate the module first so its scope can name it as owner.
        let module_id = self.arena.alloc_module(ModuleDecl::new(
            Span::none(),
            parent_scope,
            ScopeId(0), // patched below
            name,
            kind,
        ));
        let local_scope = self.arena.alloc_scope(Scope {
            parent: Some(parent_scope),
            owner: ScopeOwner::Module(module_id),
        });
        self.arena.module_mut(module_id).local_scope = local_scope;
        self.arena.module_mut(module_id).parent = parent;
        match parent {
            Some(p) => self.arena.module_mut(p).sub_modules.push(module_id),
            None => self.arena.root_modules.push(module_id),
        }
        module_id
    }

    pub fn module_scope(&self, module: ModuleId) -> ScopeId {
        self.arena.module(module).local_scope
    }

    pub fn set_module_annotation(&mut self, module: ModuleId, annotation: Annotation) {
        self.arena.module_mut(module).annotation = annotation;
    }

    // --- functions --------------------------------------------------------

    pub fn add_function(
        &mut self,
        module: ModuleId,
        name: &str,
        kind: FunctionKind,
        return_type: Option<ExprId>,
    ) -> FunctionId {
        let name = self.ident(name);
        let decl_scope = self.arena.module(module).local_scope;
        let function_id = self.arena.alloc_function(FunctionDecl {
            span: Span::none(),
            scope: decl_scope,
            local_scope: ScopeId(0), // patched below
            name,
            kind,
            return_type,
            resolved_return_type: None,
            parameters: Vec::new(),
            body: None,
            annotation: Annotation::new(),
            generic_wildcards: Vec::new(),
            original_generic_function: None,
            original_call: None,
            specialisations: indexmap::IndexMap::new(),
            local_usings: Vec::new(),
        });
        let local_scope = self.arena.alloc_scope(Scope {
            parent: Some(decl_scope),
            owner: ScopeOwner::Function(function_id),
        });
        self.arena.function_mut(function_id).local_scope = local_scope;
        self.arena.module_mut(module).functions.push(function_id);
        function_id
    }

    pub fn function_scope(&self, function: FunctionId) -> ScopeId {
        self.arena.function(function).local_scope
    }

    pub fn add_parameter(&mut self, function: FunctionId, name: &str, ty: ExprId) -> VarId {
        let name = self.ident(name);
        let scope = self.arena.function(function).local_scope;
        let var = self.arena.alloc_variable(VariableDecl {
            span: Span::none(),
            scope,
            name,
            declared_type: Some(ty),
            initial_value: None,
            is_constant: false,
            is_external: false,
            annotation: Annotation::new(),
            resolved_type: None,
        });
        self.arena.function_mut(function).parameters.push(var);
        var
    }

    /// Wrap `statements` in a block and make it the function's body.
    pub fn set_body(&mut self, function: FunctionId, statements: Vec<StmtId>) -> StmtId {
        let scope = self.arena.function(function).local_scope;
        let block = self.block_with(scope, statements);
        self.arena.function_mut(function).body = Some(block);
        block
    }

    // --- declarations -----------------------------------------------------

    pub fn add_state_variable(
        &mut self,
        module: ModuleId,
        name: &str,
        declared_type: Option<ExprId>,
        initial_value: Option<ExprId>,
    ) -> VarId {
        let name = self.ident(name);
        let scope = self.arena.module(module).local_scope;
        let var = self.arena.alloc_variable(VariableDecl {
            span: Span::none(),
            scope,
            name,
            declared_type,
            initial_value,
            is_constant: false,
            is_external: false,
            annotation: Annotation::new(),
            resolved_type: None,
        });
        self.arena.module_mut(module).state_variables.push(var);
        var
    }

    pub fn add_constant(
        &mut self,
        module: ModuleId,
        name: &str,
        declared_type: Option<ExprId>,
        initial_value: ExprId,
    ) -> VarId {
        let var = self.add_state_variable(module, name, declared_type, Some(initial_value));
        self.arena.variable_mut(var).is_constant = true;
        var
    }

    pub fn add_endpoint(
        &mut self,
        module: ModuleId,
        name: &str,
        direction: EndpointDirection,
        kind: EndpointKind,
        data_types: Vec<ExprId>,
    ) -> EndpointId {
        let name = self.ident(name);
        let scope = self.arena.module(module).local_scope;
        let endpoint = self.arena.alloc_endpoint(EndpointDecl {
            span: Span::none(),
            scope,
            name,
            direction,
            kind,
            data_types,
            resolved_types: None,
            array_size: None,
            resolved_array_size: None,
            annotation: Annotation::new(),
        });
        self.arena.module_mut(module).endpoints.push(endpoint);
        endpoint
    }

    pub fn add_struct(
        &mut self,
        module: ModuleId,
        name: &str,
        members: Vec<(&str, ExprId)>,
    ) -> StructId {
        let name = self.ident(name);
        let members = members
            .into_iter()
            .map(|(n, ty)| StructMemberDecl {
                name: self.arena.idents.get(n),
                ty,
            })
            .collect();
        let scope = self.arena.module(module).local_scope;
        let s = self.arena.alloc_struct(StructDecl {
            span: Span::none(),
            scope,
            name,
            members,
            structure: None,
        });
        self.arena.module_mut(module).structs.push(s);
        s
    }

    pub fn add_using(&mut self, module: ModuleId, name: &str, target: ExprId) -> UsingId {
        let name = self.ident(name);
        let scope = self.arena.module(module).local_scope;
        let u = self.arena.alloc_using(UsingDecl {
            span: Span::none(),
            scope,
            name,
            target,
            resolved: None,
        });
        self.arena.module_mut(module).usings.push(u);
        u
    }

    /// Declare `processor P (using T)`-style type parameter. The using's
    /// resolved type is bound when the module is specialised.
    pub fn add_type_param(&mut self, module: ModuleId, name: &str) -> UsingId {
        let scope = self.arena.module(module).local_scope;
        let target = self.name_expr(scope, &[name]);
        let using = self.add_using(module, name, target);
        self.arena
            .module_mut(module)
            .specialisation_params
            .push(super::SpecialisationParam::Type(using));
        using
    }

    pub fn add_alias(&mut self, module: ModuleId, name: &str, target: Path) -> AliasId {
        let name = self.ident(name);
        let scope = self.arena.module(module).local_scope;
        let a = self.arena.alloc_alias(ProcessorAliasDecl {
            span: Span::none(),
            scope,
            name,
            target,
            resolved: None,
        });
        self.arena.module_mut(module).aliases.push(a);
        a
    }

    pub fn add_instance(&mut self, graph: ModuleId, name: &str, target: Path) -> InstanceId {
        let name = self.ident(name);
        let scope = self.arena.module(graph).local_scope;
        let i = self.arena.alloc_instance(ProcessorInstanceDecl {
            span: Span::none(),
            scope,
            name,
            target,
            args: Vec::new(),
            clock_multiplier: None,
            clock_divider: None,
            array_size: None,
            resolved_target: None,
            resolved_array_size: None,
        });
        self.arena.module_mut(graph).instances.push(i);
        i
    }

    pub fn add_connection(
        &mut self,
        graph: ModuleId,
        source: (Option<&str>, &str),
        dest: (Option<&str>, &str),
        delay: Option<ExprId>,
    ) -> super::ConnectionId {
        let scope = self.arena.module(graph).local_scope;
        let source = ConnectionEnd {
            instance: source.0.map(|s| self.arena.idents.get(s)),
            endpoint: self.arena.idents.get(source.1),
            endpoint_index: None,
        };
        let dest = ConnectionEnd {
            instance: dest.0.map(|s| self.arena.idents.get(s)),
            endpoint: self.arena.idents.get(dest.1),
            endpoint_index: None,
        };
        let c = self.arena.alloc_connection(ConnectionDecl {
            span: Span::none(),
            scope,
            interpolation: InterpolationMode::None,
            source,
            dest,
            delay,
            resolved_delay: None,
        });
        self.arena.module_mut(graph).connections.push(c);
        c
    }

    // --- statements -------------------------------------------------------

    pub fn stmt(&mut self, scope: ScopeId, kind: StmtKind) -> StmtId {
        self.arena.alloc_stmt(Stmt::new(Span::none(), scope, kind))
    }

    /// A block statement owning a fresh scope containing `statements`.
    ///
    /// Statements intended for this block should be created with the block's
    /// scope; use [`AstBuilder::open_block`] to get the scope first.
    pub fn block_with(&mut self, parent_scope: ScopeId, statements: Vec<StmtId>) -> StmtId {
        let stmt = self.stmt(
            parent_scope,
            StmtKind::Block {
                body_scope: ScopeId(0), // patched below
                statements,
            },
        );
        let body_scope = self.arena.alloc_scope(Scope {
            parent: Some(parent_scope),
            owner: ScopeOwner::Block(stmt),
        });
        if let StmtKind::Block { body_scope: s, .. } = &mut self.arena.stmt_mut(stmt).kind {
            *s = body_scope;
        }
        stmt
    }

    /// Create an empty block and return `(block, its scope)` so the caller
    /// can build statements inside it, then push them with
    /// [`AstBuilder::push_to_block`].
    pub fn open_block(&mut self, parent_scope: ScopeId) -> (StmtId, ScopeId) {
        let block = self.block_with(parent_scope, Vec::new());
        let scope = match &self.arena.stmt(block).kind {
            StmtKind::Block { body_scope, .. } => *body_scope,
            _ => unreachable!(),
        };
        (block, scope)
    }

    pub fn push_to_block(&mut self, block: StmtId, stmt: StmtId) {
        if let StmtKind::Block { statements, .. } = &mut self.arena.stmt_mut(block).kind {
            statements.push(stmt);
        }
    }

    /// A local variable declaration statement inside a block scope.
    pub fn local_variable(
        &mut self,
        scope: ScopeId,
        name: &str,
        declared_type: Option<ExprId>,
        initial_value: Option<ExprId>,
        is_constant: bool,
    ) -> (StmtId, VarId) {
        let name = self.ident(name);
        let var = self.arena.alloc_variable(VariableDecl {
            span: Span::none(),
            scope,
            name,
            declared_type,
            initial_value,
            is_constant,
            is_external: false,
            annotation: Annotation::new(),
            resolved_type: None,
        });
        let stmt = self.stmt(scope, StmtKind::VariableDeclaration(var));
        (stmt, var)
    }

    // --- expressions ------------------------------------------------------

    pub fn expr(&mut self, scope: ScopeId, kind: ExprKind) -> ExprId {
        self.arena.alloc_expr(Expr::new(Span::none(), scope, kind))
    }

    pub fn constant(&mut self, scope: ScopeId, value: Value) -> ExprId {
        self.expr(scope, ExprKind::Constant(value))
    }

    /// Intern a string literal and wrap it as a constant.
    pub fn string_literal(&mut self, scope: ScopeId, text: &str) -> ExprId {
        let handle = self.arena.strings.get_or_add(text);
        self.constant(scope, Value::from_string_handle(handle))
    }

    pub fn type_expr(&mut self, scope: ScopeId, ty: Type) -> ExprId {
        self.expr(scope, ExprKind::ConcreteType(ty))
    }

    pub fn name_expr(&mut self, scope: ScopeId, segments: &[&str]) -> ExprId {
        let path = self.path(segments);
        self.expr(scope, ExprKind::Name(path))
    }

    pub fn binary(
        &mut self,
        scope: ScopeId,
        op: crate::types::BinaryOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> ExprId {
        self.expr(
            scope,
            ExprKind::Binary {
                op,
                lhs,
                rhs,
                resolved_types: None,
            },
        )
    }

    pub fn assign(&mut self, scope: ScopeId, target: ExprId, value: ExprId) -> ExprId {
        self.expr(scope, ExprKind::Assignment { target, value })
    }

    pub fn call(&mut self, scope: ScopeId, target: ExprId, args: Vec<ExprId>) -> ExprId {
        self.expr(
            scope,
            ExprKind::CallOrCast {
                target,
                args,
                is_method_call: false,
            },
        )
    }

    pub fn write_endpoint(&mut self, scope: ScopeId, target: ExprId, value: ExprId) -> ExprId {
        self.expr(scope, ExprKind::WriteToEndpoint { target, value })
    }

    pub fn advance(&mut self, scope: ScopeId) -> ExprId {
        self.expr(scope, ExprKind::AdvanceClock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::scope::{find_symbols, SearchMask, Symbol};
    use crate::types::Type;

    #[test]
    fn test_lookup_walks_outward_through_scopes() {
        let mut b = AstBuilder::new();
        let ns = b.add_module(ModuleKind::Namespace, "dsp", None);
        let p = b.add_module(ModuleKind::Processor, "Osc", Some(ns));
        let scope = b.module_scope(p);
        let ty = b.type_expr(scope, Type::float32());
        let phase = b.add_state_variable(p, "phase", Some(ty), None);

        let f = b.add_function(p, "run", FunctionKind::Run, None);
        let (_, block_scope) = b.open_block(b.function_scope(f));

        // A name declared on the processor is visible from a nested block.
        let path = b.path(&["phase"]);
        let found = find_symbols(&b.arena, block_scope, &path, &SearchMask::everything());
        assert_eq!(found, vec![Symbol::Variable(phase)]);

        // Qualified lookup descends through the namespace.
        let path = b.path(&["dsp", "Osc"]);
        let found = find_symbols(&b.arena, b.arena.root_scope(), &path, &SearchMask::modules());
        assert_eq!(found, vec![Symbol::Module(p)]);

        // An unknown name finds nothing.
        let path = b.path(&["missing"]);
        assert!(find_symbols(&b.arena, block_scope, &path, &SearchMask::everything()).is_empty());
    }

    #[test]
    fn test_block_scope_sees_only_its_own_locals() {
        let mut b = AstBuilder::new();
        let p = b.add_module(ModuleKind::Processor, "P", None);
        let f = b.add_function(p, "run", FunctionKind::Run, None);
        let (block, block_scope) = b.open_block(b.function_scope(f));
        let (stmt, local) = b.local_variable(block_scope, "x", None, None, false);
        b.push_to_block(block, stmt);

        let path = b.path(&["x"]);
        let found = find_symbols(&b.arena, block_scope, &path, &SearchMask::local_variables());
        assert_eq!(found, vec![Symbol::Variable(local)]);

        // The enclosing function scope cannot see the block's local.
        let found = find_symbols(
            &b.arena,
            b.function_scope(f),
            &path,
            &SearchMask::local_variables(),
        );
        assert!(found.is_empty());
    }
}
