//! The scope tree and name lookup.
//!
//! Scopes form a tree rooted at a synthetic top-level namespace. A lookup
//! walks outward from the scope a name appears in; the first scope that
//! yields any candidate wins, and all candidates from that scope are
//! returned so callers can run overload resolution over them.

use super::{
    AliasId, AstArena, EndpointId, FunctionId, InstanceId, ModuleId, ScopeId, StmtId, StmtKind,
    StructId, UsingId, VarId,
};
use crate::foundation::{Ident, Path};

/// One node of the scope tree.
#[derive(Debug, Clone)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub owner: ScopeOwner,
}

/// What declares a scope, and therefore what names it can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOwner {
    /// The synthetic root namespace.
    Root,
    Module(ModuleId),
    Function(FunctionId),
    Block(StmtId),
}

/// A name-lookup hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Variable(VarId),
    Function(FunctionId),
    Struct(StructId),
    Using(UsingId),
    Module(ModuleId),
    Endpoint(EndpointId),
    Instance(InstanceId),
    ProcessorAlias(AliasId),
}

/// What kinds of symbol a lookup should consider.
#[derive(Debug, Clone, Copy)]
pub struct SearchMask {
    pub variables: bool,
    pub functions: bool,
    pub types: bool,
    pub endpoints: bool,
    pub modules: bool,
    pub instances: bool,
    /// For functions, only accept this parameter count.
    pub required_arity: Option<usize>,
    /// Do not walk outward past the starting scope.
    pub only_local: bool,
}

impl SearchMask {
    pub fn everything() -> Self {
        Self {
            variables: true,
            functions: true,
            types: true,
            endpoints: true,
            modules: true,
            instances: true,
            required_arity: None,
            only_local: false,
        }
    }

    pub fn values() -> Self {
        Self {
            variables: true,
            functions: false,
            types: false,
            endpoints: true,
            modules: false,
            instances: false,
            required_arity: None,
            only_local: false,
        }
    }

    pub fn types() -> Self {
        Self {
            variables: false,
            functions: false,
            types: true,
            endpoints: false,
            modules: true,
            instances: false,
            required_arity: None,
            only_local: false,
        }
    }

    pub fn functions(arity: usize) -> Self {
        Self {
            variables: false,
            functions: true,
            types: false,
            endpoints: false,
            modules: false,
            instances: false,
            required_arity: Some(arity),
            only_local: false,
        }
    }

    pub fn modules() -> Self {
        Self {
            variables: false,
            functions: false,
            types: false,
            endpoints: false,
            modules: true,
            instances: false,
            required_arity: None,
            only_local: false,
        }
    }

    pub fn local_variables() -> Self {
        Self {
            variables: true,
            functions: false,
            types: false,
            endpoints: false,
            modules: false,
            instances: false,
            required_arity: None,
            only_local: true,
        }
    }
}

/// Find all candidates for `path`, walking outward from `start`.
///
/// A qualified path descends through sub-modules after its first segment
/// matches; the remaining segments are then looked up inside that module
/// without walking outward again.
pub fn find_symbols(arena: &AstArena, start: ScopeId, path: &Path, mask: &SearchMask) -> Vec<Symbol> {
    if path.is_empty() {
        return Vec::new();
    }

    let mut scope = Some(start);
    while let Some(current) = scope {
        let found = find_in_scope(arena, current, path, mask);
        if !found.is_empty() {
            return found;
        }
        if mask.only_local {
            break;
        }
        scope = arena.scope(current).parent;
    }
    Vec::new()
}

fn find_in_scope(arena: &AstArena, scope: ScopeId, path: &Path, mask: &SearchMask) -> Vec<Symbol> {
    if path.is_unqualified() {
        return symbols_named(arena, scope, path.leaf(), mask);
    }

    // Qualified: the first segment must name a module visible here, the rest
    // resolves inside it.
    let module_mask = SearchMask::modules();
    let heads = symbols_named(arena, scope, path.first(), &module_mask);
    let mut results = Vec::new();
    for head in heads {
        let module = match head {
            Symbol::Module(m) => m,
            Symbol::ProcessorAlias(a) => match arena.alias(a).resolved {
                Some(m) => m,
                None => continue,
            },
            _ => continue,
        };
        let inner_scope = arena.module(module).local_scope;
        results.extend(find_in_scope(arena, inner_scope, &path.tail(), mask));
    }
    results
}

/// All symbols called `name` declared directly in `scope`, filtered by mask.
pub fn symbols_named(
    arena: &AstArena,
    scope: ScopeId,
    name: Ident,
    mask: &SearchMask,
) -> Vec<Symbol> {
    let mut out = Vec::new();
    match arena.scope(scope).owner {
        ScopeOwner::Root => {
            if mask.modules {
                for &m in &arena.root_modules {
                    if arena.module(m).name == name {
                        out.push(Symbol::Module(m));
                    }
                }
            }
        }
        ScopeOwner::Module(m) => {
            let module = arena.module(m);
            if mask.variables {
                for &v in &module.state_variables {
                    if arena.variable(v).name == name {
                        out.push(Symbol::Variable(v));
                    }
                }
            }
            if mask.functions {
                for &f in &module.functions {
                    let func = arena.function(f);
                    if func.name == name {
                        if let Some(arity) = mask.required_arity {
                            if func.parameters.len() != arity {
                                continue;
                            }
                        }
                        out.push(Symbol::Function(f));
                    }
                }
            }
            if mask.types {
                for &s in &module.structs {
                    if arena.structure(s).name == name {
                        out.push(Symbol::Struct(s));
                    }
                }
                for &u in &module.usings {
                    if arena.using(u).name == name {
                        out.push(Symbol::Using(u));
                    }
                }
            }
            if mask.endpoints {
                for &e in &module.endpoints {
                    if arena.endpoint(e).name == name {
                        out.push(Symbol::Endpoint(e));
                    }
                }
            }
            if mask.modules {
                for &sub in &module.sub_modules {
                    if arena.module(sub).name == name {
                        out.push(Symbol::Module(sub));
                    }
                }
                for &a in &module.aliases {
                    if arena.alias(a).name == name {
                        out.push(Symbol::ProcessorAlias(a));
                    }
                }
            }
            if mask.instances {
                for &i in &module.instances {
                    if arena.instance(i).name == name {
                        out.push(Symbol::Instance(i));
                    }
                }
            }
        }
        ScopeOwner::Function(f) => {
            let func = arena.function(f);
            if mask.variables {
                for &p in &func.parameters {
                    if arena.variable(p).name == name {
                        out.push(Symbol::Variable(p));
                    }
                }
            }
            if mask.types {
                for &u in &func.local_usings {
                    if arena.using(u).name == name {
                        out.push(Symbol::Using(u));
                    }
                }
            }
        }
        ScopeOwner::Block(stmt) => {
            if mask.variables {
                if let StmtKind::Block { statements, .. } = &arena.stmt(stmt).kind {
                    for &s in statements {
                        if let StmtKind::VariableDeclaration(v) = arena.stmt(s).kind {
                            if arena.variable(v).name == name {
                                out.push(Symbol::Variable(v));
                            }
                        }
                    }
                }
            }
        }
    }
    out
}

/// The module a scope belongs to, walking outward past functions and blocks.
pub fn enclosing_module(arena: &AstArena, mut scope: ScopeId) -> Option<ModuleId> {
    loop {
        match arena.scope(scope).owner {
            ScopeOwner::Module(m) => return Some(m),
            ScopeOwner::Root => return None,
            _ => scope = arena.scope(scope).parent?,
        }
    }
}

/// The function a scope belongs to, if any.
pub fn enclosing_function(arena: &AstArena, mut scope: ScopeId) -> Option<FunctionId> {
    loop {
        match arena.scope(scope).owner {
            ScopeOwner::Function(f) => return Some(f),
            ScopeOwner::Root => return None,
            ScopeOwner::Module(_) => return None,
            ScopeOwner::Block(_) => scope = arena.scope(scope).parent?,
        }
    }
}
