//! The fixed-point resolution driver.
//!
//! Resolution is iterative: each pass sweeps every expression and declaration
//! of every non-template module, rewriting whatever has become decidable.
//! A pass that rewrites nothing has reached a fixed point: either everything
//! is resolved, or the leftovers are genuine errors, which a final reporting
//! pass turns into diagnostics. Generic functions and parameterised
//! processors are templates; only their specialised clones are resolved.

pub mod decls;
pub mod fold;
pub mod meta;
pub mod names;
pub mod overloads;
pub mod specialise;
pub mod types;

use sonance_ast::ast::{walk, AstArena, ExprId, ModuleId};
use sonance_ast::foundation::Span;
use sonance_ast::{CompileError, ErrorKind};
use tracing::debug;

/// Knobs for the driver.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Hard cap on fixed-point iterations; hitting it is an internal error.
    pub max_iterations: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
        }
    }
}

/// Shared bookkeeping for one pass.
pub struct PassContext {
    /// Nodes rewritten this pass.
    pub replaced: usize,
    /// Nodes that could not be settled this pass.
    pub failed: usize,
    report: bool,
    pub errors: Vec<CompileError>,
    /// Call site to blame when resolving inside a specialised clone.
    current_origin: Option<(Span, String)>,
}

impl PassContext {
    fn new(report: bool) -> Self {
        Self {
            replaced: 0,
            failed: 0,
            report,
            errors: Vec::new(),
            current_origin: None,
        }
    }

    /// A node was rewritten; the pass made progress.
    pub fn replaced(&mut self) {
        self.replaced += 1;
    }

    /// A node could not be settled yet; benign unless the pass stalls.
    pub fn retry(&mut self) {
        self.failed += 1;
    }

    /// A node could not be settled; in the reporting pass this also emits
    /// the diagnostic, chained to the specialisation call site if any.
    pub fn fail(&mut self, make: impl FnOnce() -> CompileError) {
        self.failed += 1;
        if self.report {
            let mut error = make();
            if let Some((span, what)) = &self.current_origin {
                error = error.prepend_call_site(*span, what);
            }
            self.errors.push(error);
        }
    }
}

/// Drive the arena to a fixed point.
///
/// Returns the accumulated diagnostics if anything failed to resolve, or if
/// the iteration cap was hit (an internal error on any valid input).
pub fn resolve_compilation(
    arena: &mut AstArena,
    options: &ResolverOptions,
) -> Result<(), Vec<CompileError>> {
    for iteration in 1..=options.max_iterations {
        let mut ctx = PassContext::new(false);
        run_pass(arena, &mut ctx);
        debug!(
            iteration,
            replaced = ctx.replaced,
            unsettled = ctx.failed,
            "resolution pass"
        );
        if ctx.replaced == 0 {
            if ctx.failed == 0 {
                return Ok(());
            }
            // Fixed point with leftovers: run once more, reporting.
            let mut reporting = PassContext::new(true);
            run_pass(arena, &mut reporting);
            if reporting.errors.is_empty() {
                reporting.errors.push(CompileError::new(
                    ErrorKind::Internal,
                    Span::none(),
                    "resolution stalled without a reportable cause",
                ));
            }
            return Err(reporting.errors);
        }
    }
    Err(vec![CompileError::new(
        ErrorKind::ResolutionDidNotConverge,
        Span::none(),
        "resolution did not reach a fixed point within the iteration limit",
    )])
}

fn run_pass(arena: &mut AstArena, ctx: &mut PassContext) {
    let modules = gather_modules(arena);
    for module in modules {
        ctx.current_origin = module_origin(arena, module);

        let mut roots = module_decl_expr_roots(arena, module);
        let mut exprs = Vec::new();
        for &root in &roots {
            walk::collect_exprs(arena, root, &mut exprs);
        }
        process_exprs(arena, &exprs, ctx);

        let functions = arena.module(module).functions.clone();
        for function in functions {
            if arena.function(function).is_generic() {
                continue;
            }
            ctx.current_origin =
                function_origin(arena, function).or_else(|| module_origin(arena, module));

            let mut fn_exprs = Vec::new();
            let func = arena.function(function);
            let mut fn_roots: Vec<ExprId> = func.return_type.into_iter().collect();
            for &p in &func.parameters {
                let param = arena.variable(p);
                fn_roots.extend(param.declared_type);
                fn_roots.extend(param.initial_value);
            }
            let body = func.body;
            for root in &fn_roots {
                walk::collect_exprs(arena, *root, &mut fn_exprs);
            }
            if let Some(b) = body {
                walk::collect_exprs_in_stmt(arena, b, &mut fn_exprs);
            }
            process_exprs(arena, &fn_exprs, ctx);
            roots.extend(fn_roots);
            roots.extend(fn_exprs);
        }

        ctx.current_origin = module_origin(arena, module);
        decls::resolve_declarations(arena, module, ctx);
        ctx.current_origin = None;

        types::refresh_binary_caches(arena, &roots);
    }
}

fn process_exprs(arena: &mut AstArena, exprs: &[ExprId], ctx: &mut PassContext) {
    for &id in exprs {
        if names::resolve_expr(arena, id, ctx) {
            continue;
        }
        if overloads::resolve_call(arena, id, ctx) {
            continue;
        }
        if meta::resolve_meta(arena, id, ctx) {
            continue;
        }
        fold::fold_expr(arena, id, ctx);
    }
}

/// All modules to resolve this pass, templates excluded.
pub fn gather_modules(arena: &AstArena) -> Vec<ModuleId> {
    let mut out = Vec::new();
    let mut stack: Vec<ModuleId> = arena.root_modules.clone();
    while let Some(m) = stack.pop() {
        if arena.module(m).is_generic() {
            continue;
        }
        out.push(m);
        stack.extend(&arena.module(m).sub_modules);
    }
    out
}

fn module_origin(arena: &AstArena, module: ModuleId) -> Option<(Span, String)> {
    let m = arena.module(module);
    let span = m.specialised_at?;
    let base = m.specialised_from?;
    Some((
        span,
        format!("processor '{}'", arena.name(arena.module(base).name)),
    ))
}

fn function_origin(
    arena: &AstArena,
    function: sonance_ast::ast::FunctionId,
) -> Option<(Span, String)> {
    let f = arena.function(function);
    let call = f.original_call?;
    let base = f.original_generic_function?;
    Some((
        arena.expr(call).span,
        format!("'{}'", arena.name(arena.function(base).name)),
    ))
}

/// Expression roots owned by the module's own declarations (not functions).
fn module_decl_expr_roots(arena: &AstArena, module: ModuleId) -> Vec<ExprId> {
    let m = arena.module(module);
    let mut roots = Vec::new();
    for &v in &m.state_variables {
        let decl = arena.variable(v);
        roots.extend(decl.declared_type);
        roots.extend(decl.initial_value);
    }
    for &e in &m.endpoints {
        let decl = arena.endpoint(e);
        roots.extend(decl.data_types.iter().copied());
        roots.extend(decl.array_size);
    }
    for &s in &m.structs {
        roots.extend(arena.structure(s).members.iter().map(|mm| mm.ty));
    }
    for &u in &m.usings {
        roots.push(arena.using(u).target);
    }
    for &i in &m.instances {
        let decl = arena.instance(i);
        roots.extend(decl.args.iter().copied());
        roots.extend(decl.clock_multiplier);
        roots.extend(decl.clock_divider);
        roots.extend(decl.array_size);
    }
    for &c in &m.connections {
        let decl = arena.connection(c);
        roots.extend(decl.source.endpoint_index);
        roots.extend(decl.dest.endpoint_index);
        roots.extend(decl.delay);
    }
    roots
}
