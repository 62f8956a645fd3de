//! Traversal helpers over the node arena.
//!
//! The resolver and validator repeatedly need "every expression under this
//! statement" and "the direct children of this expression"; both are defined
//! here once so traversal order is consistent everywhere: children first,
//! parents after.

use super::{AstArena, ExprId, ExprKind, ModuleId, StmtId, StmtKind};

/// Direct child expressions of an expression node.
pub fn expr_children(kind: &ExprKind) -> Vec<ExprId> {
    match kind {
        ExprKind::Constant(_)
        | ExprKind::ConcreteType(_)
        | ExprKind::VariableRef(_)
        | ExprKind::EndpointRef(_)
        | ExprKind::ProcessorRef(_)
        | ExprKind::InstanceRef(_)
        | ExprKind::Name(_)
        | ExprKind::AdvanceClock
        | ExprKind::ProcessorProperty(_) => Vec::new(),
        ExprKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
        ExprKind::Unary { operand, .. } => vec![*operand],
        ExprKind::Ternary {
            condition,
            true_value,
            false_value,
        } => vec![*condition, *true_value, *false_value],
        ExprKind::Assignment { target, value } => vec![*target, *value],
        ExprKind::PreOrPostIncDec { target, .. } => vec![*target],
        ExprKind::CallOrCast { target, args, .. } => {
            let mut v = vec![*target];
            v.extend(args);
            v
        }
        ExprKind::FunctionCall { args, .. } => args.clone(),
        ExprKind::TypeCast { source, .. } => vec![*source],
        ExprKind::ArrayElement { parent, start, end } => {
            let mut v = vec![*parent, *start];
            v.extend(end);
            v
        }
        ExprKind::StructMember { parent, .. } | ExprKind::Dot { parent, .. } => vec![*parent],
        ExprKind::BracketSubscript {
            parent,
            index,
            index_end,
        } => {
            let mut v = vec![*parent];
            v.extend(index);
            v.extend(index_end);
            v
        }
        ExprKind::ChevronSubscript { parent, size } => vec![*parent, *size],
        ExprKind::MetaFunction { source, .. } => vec![*source],
        ExprKind::CommaList(items) => items.clone(),
        ExprKind::WriteToEndpoint { target, value } => vec![*target, *value],
        ExprKind::StaticAssertion { condition, .. } => vec![*condition],
    }
}

/// Append `id` and all expressions beneath it, children before parents.
pub fn collect_exprs(arena: &AstArena, id: ExprId, out: &mut Vec<ExprId>) {
    for child in expr_children(&arena.expr(id).kind) {
        collect_exprs(arena, child, out);
    }
    out.push(id);
}

/// Direct child expressions of a statement.
pub fn stmt_child_exprs(arena: &AstArena, stmt: StmtId) -> Vec<ExprId> {
    match &arena.stmt(stmt).kind {
        StmtKind::Block { .. } | StmtKind::Break | StmtKind::Continue | StmtKind::Noop => {
            Vec::new()
        }
        StmtKind::Expression(e) => vec![*e],
        StmtKind::If { condition, .. } => vec![*condition],
        StmtKind::Loop {
            condition, count, ..
        } => {
            let mut v = Vec::new();
            v.extend(condition);
            v.extend(count);
            v
        }
        StmtKind::Return(value) => value.iter().copied().collect(),
        StmtKind::VariableDeclaration(var) => {
            let decl = arena.variable(*var);
            let mut v = Vec::new();
            v.extend(decl.declared_type);
            v.extend(decl.initial_value);
            v
        }
    }
}

/// Direct child statements of a statement.
pub fn stmt_child_stmts(arena: &AstArena, stmt: StmtId) -> Vec<StmtId> {
    match &arena.stmt(stmt).kind {
        StmtKind::Block { statements, .. } => statements.clone(),
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            let mut v = vec![*then_branch];
            v.extend(else_branch);
            v
        }
        StmtKind::Loop {
            initialiser,
            iterator,
            body,
            ..
        } => {
            let mut v = Vec::new();
            v.extend(initialiser);
            v.extend(iterator);
            v.push(*body);
            v
        }
        _ => Vec::new(),
    }
}

/// Every expression under a statement tree, children before parents.
pub fn collect_exprs_in_stmt(arena: &AstArena, stmt: StmtId, out: &mut Vec<ExprId>) {
    for e in stmt_child_exprs(arena, stmt) {
        collect_exprs(arena, e, out);
    }
    for s in stmt_child_stmts(arena, stmt) {
        collect_exprs_in_stmt(arena, s, out);
    }
}

/// Every expression referenced by a module's declarations and function
/// bodies, children before parents.
pub fn collect_exprs_in_module(arena: &AstArena, module: ModuleId, out: &mut Vec<ExprId>) {
    let m = arena.module(module);

    for &v in &m.state_variables {
        let decl = arena.variable(v);
        let roots: Vec<ExprId> = decl
            .declared_type
            .into_iter()
            .chain(decl.initial_value)
            .collect();
        for e in roots {
            collect_exprs(arena, e, out);
        }
    }
    for &e in &m.endpoints {
        let decl = arena.endpoint(e);
        let roots: Vec<ExprId> = decl
            .data_types
            .iter()
            .copied()
            .chain(decl.array_size)
            .collect();
        for r in roots {
            collect_exprs(arena, r, out);
        }
    }
    for &s in &m.structs {
        let members: Vec<ExprId> = arena.structure(s).members.iter().map(|mm| mm.ty).collect();
        for e in members {
            collect_exprs(arena, e, out);
        }
    }
    for &u in &m.usings {
        collect_exprs(arena, arena.using(u).target, out);
    }
    for &i in &m.instances {
        let decl = arena.instance(i);
        let roots: Vec<ExprId> = decl
            .args
            .iter()
            .copied()
            .chain(decl.clock_multiplier)
            .chain(decl.clock_divider)
            .chain(decl.array_size)
            .collect();
        for r in roots {
            collect_exprs(arena, r, out);
        }
    }
    for &c in &m.connections {
        let decl = arena.connection(c);
        let roots: Vec<ExprId> = decl
            .source
            .endpoint_index
            .into_iter()
            .chain(decl.dest.endpoint_index)
            .chain(decl.delay)
            .collect();
        for r in roots {
            collect_exprs(arena, r, out);
        }
    }
    for &f in &m.functions {
        let func = arena.function(f);
        let mut roots: Vec<ExprId> = func.return_type.into_iter().collect();
        for &p in &func.parameters {
            let param = arena.variable(p);
            roots.extend(param.declared_type);
            roots.extend(param.initial_value);
        }
        let body = func.body;
        for r in roots {
            collect_exprs(arena, r, out);
        }
        if let Some(b) = body {
            collect_exprs_in_stmt(arena, b, out);
        }
    }
    for &sub in &m.sub_modules {
        collect_exprs_in_module(arena, sub, out);
    }
}
