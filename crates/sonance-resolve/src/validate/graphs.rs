//! Graph recursion and feedback-cycle detection.
//!
//! Both traversals thread an explicit visit stack: hitting a node that is
//! already on the stack is a cycle, reported with the full path rather than
//! crashing on unbounded recursion.

use crate::resolve::gather_modules;
use sonance_ast::ast::{AstArena, InstanceId, ModuleId, ModuleKind};
use sonance_ast::foundation::Ident;
use sonance_ast::{CompileError, ErrorKind};

pub fn check(arena: &AstArena, errors: &mut Vec<CompileError>) {
    for module in gather_modules(arena) {
        let m = arena.module(module);
        if m.kind != ModuleKind::Graph {
            continue;
        }
        let mut stack = Vec::new();
        check_recursion(arena, module, &mut stack, errors);
        check_feedback(arena, module, errors);
    }
}

/// A graph may not instantiate itself, directly or through other graphs.
fn check_recursion(
    arena: &AstArena,
    module: ModuleId,
    stack: &mut Vec<ModuleId>,
    errors: &mut Vec<CompileError>,
) {
    if stack.contains(&module) {
        let cycle: Vec<&str> = stack
            .iter()
            .chain(std::iter::once(&module))
            .map(|&m| arena.name(arena.module(m).name))
            .collect();
        errors.push(CompileError::new(
            ErrorKind::RecursiveGraph,
            arena.module(module).span,
            format!("processor instances recurse: {}", cycle.join(" -> ")),
        ));
        return;
    }
    stack.push(module);
    for &i in &arena.module(module).instances {
        if let Some(target) = arena.instance(i).resolved_target {
            check_recursion(arena, target, stack, errors);
        }
    }
    stack.pop();
}

/// Zero-delay connections between instances must not form a cycle; a delay
/// of one frame or more breaks the loop.
fn check_feedback(arena: &AstArena, graph: ModuleId, errors: &mut Vec<CompileError>) {
    let m = arena.module(graph);
    let instances: Vec<InstanceId> = m.instances.clone();

    // Edges between instance indexes, zero-delay only.
    let mut edges: Vec<(usize, usize)> = Vec::new();
    for &c in &m.connections {
        let conn = arena.connection(c);
        if conn.resolved_delay.unwrap_or(0) > 0 {
            continue;
        }
        let (Some(src), Some(dst)) = (conn.source.instance, conn.dest.instance) else {
            continue; // edges to the graph's own endpoints cannot cycle
        };
        if let (Some(a), Some(b)) = (
            instance_index(arena, &instances, src),
            instance_index(arena, &instances, dst),
        ) {
            edges.push((a, b));
        }
    }

    let mut visited = vec![false; instances.len()];
    let mut on_stack: Vec<usize> = Vec::new();

    for start in 0..instances.len() {
        if !visited[start] {
            dfs(
                arena, graph, &instances, &edges, start, &mut visited, &mut on_stack, errors,
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn dfs(
    arena: &AstArena,
    graph: ModuleId,
    instances: &[InstanceId],
    edges: &[(usize, usize)],
    node: usize,
    visited: &mut Vec<bool>,
    on_stack: &mut Vec<usize>,
    errors: &mut Vec<CompileError>,
) {
    if let Some(pos) = on_stack.iter().position(|&n| n == node) {
        let mut path: Vec<&str> = on_stack[pos..]
            .iter()
            .map(|&n| arena.name(arena.instance(instances[n]).name))
            .collect();
        path.push(arena.name(arena.instance(instances[node]).name));
        errors.push(CompileError::new(
            ErrorKind::FeedbackInGraph,
            arena.module(graph).span,
            format!(
                "feedback cycle without a delay: {}",
                path.join(" -> ")
            ),
        ));
        return;
    }
    if visited[node] {
        return;
    }
    visited[node] = true;
    on_stack.push(node);
    for &(from, to) in edges {
        if from == node {
            dfs(
                arena, graph, instances, edges, to, visited, on_stack, errors,
            );
        }
    }
    on_stack.pop();
}

fn instance_index(
    arena: &AstArena,
    instances: &[InstanceId],
    name: Ident,
) -> Option<usize> {
    instances
        .iter()
        .position(|&i| arena.instance(i).name == name)
}
