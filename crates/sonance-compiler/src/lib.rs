// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Sonance compiler
//!
//! Unified entry point for the compilation pipeline: structural validation,
//! fixed-point resolution, semantic validation, lowering and optimisation.
//! The parser hands over an [`AstArena`]; a successful compilation produces
//! a [`Program`] the performer can execute.

#[cfg(test)]
mod tests;

use sonance_ast::ast::AstArena;
use sonance_ast::foundation::Span;
use sonance_ast::{CompileError, ErrorKind};
use sonance_ir::Program;
use sonance_resolve::{
    resolve_compilation, validate_post_resolution, validate_pre_resolution, ResolverOptions,
};
use tracing::debug;

/// Compilation outcome: a program or the diagnostics that stopped it.
///
/// A `None` program implies at least one error in the list; a present
/// program may still carry warnings.
pub struct CompileResult {
    pub program: Option<Program>,
    pub messages: Vec<CompileError>,
}

impl CompileResult {
    fn failure(messages: Vec<CompileError>) -> Self {
        Self {
            program: None,
            messages,
        }
    }
}

/// Run the full pipeline over a parsed arena.
pub fn compile(mut arena: AstArena) -> CompileResult {
    compile_with_options(&mut arena, &ResolverOptions::default())
}

/// As [`compile`], with explicit resolver options.
pub fn compile_with_options(
    arena: &mut AstArena,
    options: &ResolverOptions,
) -> CompileResult {
    // 1. Structure must hold before resolution is worth attempting.
    let errors = validate_pre_resolution(arena);
    if !errors.is_empty() {
        return CompileResult::failure(errors);
    }

    // 2. Resolve to a fixed point.
    if let Err(errors) = resolve_compilation(arena, options) {
        return CompileResult::failure(errors);
    }
    debug!("resolution reached a fixed point");

    // 3. Semantic checks over the resolved tree.
    let errors = validate_post_resolution(arena);
    let has_errors = errors
        .iter()
        .any(|e| e.severity == sonance_ast::Severity::Error);
    if has_errors {
        return CompileResult::failure(errors);
    }
    let warnings = errors;

    // 4. Lower and optimise.
    let mut program = match sonance_ir::lower_compilation(arena) {
        Ok(p) => p,
        Err(e) => {
            let mut messages = warnings;
            messages.push(CompileError::new(
                ErrorKind::Internal,
                Span::none(),
                e.to_string(),
            ));
            return CompileResult::failure(messages);
        }
    };
    sonance_ir::optimise::optimise(&mut program);

    CompileResult {
        program: Some(program),
        messages: warnings,
    }
}
