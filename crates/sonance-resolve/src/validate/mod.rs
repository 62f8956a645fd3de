//! Structural and semantic validation.
//!
//! Pre-resolution checks look only at declaration shape: duplicate names,
//! missing outputs, malformed run/init functions, recursive type
//! declarations. Post-resolution checks need resolved types and constants:
//! size limits, signatures, event handlers, provable comparisons, endpoint
//! writes, graph recursion and feedback cycles.

mod graphs;
mod post;
mod pre;

use sonance_ast::ast::AstArena;
use sonance_ast::CompileError;

/// Checks that run before the resolver. Collects every sibling failure
/// rather than stopping at the first.
pub fn validate_pre_resolution(arena: &AstArena) -> Vec<CompileError> {
    let mut errors = Vec::new();
    pre::check(arena, &mut errors);
    errors
}

/// Checks that run after the resolver reports a fixed point.
pub fn validate_post_resolution(arena: &AstArena) -> Vec<CompileError> {
    let mut errors = Vec::new();
    post::check(arena, &mut errors);
    graphs::check(arena, &mut errors);
    errors
}
