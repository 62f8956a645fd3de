//! The optimisation pass suite.
//!
//! Every pass is a standalone mutation of the Program; `optimise` runs them
//! in a fixed order. Passes never report errors, they only simplify, and
//! each terminates in bounded iterations on well-formed input.

pub mod blocks;
pub mod inline;

#[cfg(test)]
mod tests;

use crate::function::{Access, Expr, IrFnId, IrVarId, Statement, VarRole};
use crate::program::Program;
use sonance_ast::ast::ModuleKind;
use sonance_ast::foundation::Annotation;
use sonance_ast::types::{StringHandle, Structure, Type, TypeKind};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Run the whole pass sequence once.
pub fn optimise(program: &mut Program) {
    remove_unused_variables(program);
    remove_calls_to_void_functions_without_side_effects(program);
    remove_unused_functions(program);
    remove_unused_processors(program);
    remove_unused_namespaces(program);
    remove_unused_structs(program);
    for report in find_unread_struct_members(program) {
        debug!(
            structure = %report.struct_name,
            members = ?report.unread_members,
            "struct members are never read"
        );
    }
    blocks::optimise_function_blocks(program);
    inline::inline_annotated_functions(program);
    garbage_collect_string_dictionary(program);
}

/// Function ids still referenced by some module.
fn live_functions(program: &Program) -> Vec<IrFnId> {
    program
        .modules
        .iter()
        .flat_map(|m| m.functions.iter().copied())
        .collect()
}

/// Rebuild every variable's read/write counters from the live functions.
pub fn rebuild_use_counts(program: &mut Program) {
    let mut reads = vec![0u32; program.variables.len()];
    let mut writes = vec![0u32; program.variables.len()];
    for f in live_functions(program) {
        program.function(f).visit_exprs(|e, access| {
            if let Expr::Variable(v) = e {
                match access {
                    Access::Read => reads[v.0 as usize] += 1,
                    Access::Write => writes[v.0 as usize] += 1,
                }
            }
        });
    }
    for (i, v) in program.variables.iter_mut().enumerate() {
        v.reads = reads[i];
        v.writes = writes[i];
    }
}

/// Drop dead stores, fold duplicate constants and promote write-once locals.
pub fn remove_unused_variables(program: &mut Program) {
    rebuild_use_counts(program);
    for f in live_functions(program) {
        remove_duplicate_constants(program, f);
    }
    rebuild_use_counts(program);
    for f in live_functions(program) {
        convert_write_once_variables_to_constants(program, f);
    }
    rebuild_use_counts(program);
    for f in live_functions(program) {
        remove_dead_stores(program, f);
    }
}

/// Two function-local constants holding equal sources collapse into one.
fn remove_duplicate_constants(program: &mut Program, f: IrFnId) {
    loop {
        let mut replacement: Option<(IrVarId, IrVarId)> = None;

        'search: for block in &program.function(f).blocks {
            for s in &block.statements {
                if let Statement::Assign {
                    target: Expr::Variable(t),
                    source: Expr::Variable(src),
                } = s
                {
                    if program.variable(*t).role == VarRole::Constant
                        && program.variable(*src).role == VarRole::Constant
                    {
                        replacement = Some((*t, *src));
                        break 'search;
                    }
                }
            }
        }

        let Some((dup, original)) = replacement else {
            return;
        };
        let func = program.function_mut(f);
        for block in &mut func.blocks {
            block.statements.retain(|s| {
                !matches!(
                    s,
                    Statement::Assign {
                        target: Expr::Variable(t),
                        source: Expr::Variable(src),
                    } if *t == dup && *src == original
                )
            });
        }
        func.visit_exprs_mut(|e, access| {
            if access == Access::Read {
                if let Expr::Variable(v) = e {
                    if *v == dup {
                        *e = Expr::Variable(original);
                    }
                }
            }
        });
    }
}

/// Mutable locals with exactly one write become constants.
fn convert_write_once_variables_to_constants(program: &mut Program, f: IrFnId) {
    let mut to_promote: Vec<IrVarId> = Vec::new();
    program.function(f).visit_exprs(|e, access| {
        if access == Access::Write {
            if let Expr::Variable(v) = e {
                to_promote.push(*v);
            }
        }
    });
    for v in to_promote {
        let var = program.variable_mut(v);
        if var.role == VarRole::MutableLocal && var.writes == 1 {
            var.role = VarRole::Constant;
        }
    }
}

/// Assignments to locals nobody reads are dead.
fn remove_dead_stores(program: &mut Program, f: IrFnId) {
    let dead: Vec<bool> = program
        .variables
        .iter()
        .map(|v| v.is_function_local() && v.reads == 0)
        .collect();
    let func = program.function_mut(f);
    for block in &mut func.blocks {
        block.statements.retain(|s| match s {
            Statement::Assign { target, .. } => target
                .root_variable()
                .map(|v| !dead[v.0 as usize])
                .unwrap_or(true),
            _ => true,
        });
        // A call result nobody reads is discarded, not the call itself.
        for s in &mut block.statements {
            if let Statement::Call { target, .. } = s {
                let drop_target = target
                    .as_ref()
                    .and_then(|t| t.root_variable())
                    .map(|v| dead[v.0 as usize])
                    .unwrap_or(false);
                if drop_target {
                    *target = None;
                }
            }
        }
    }
}

/// True if calling this function can touch anything outside its locals.
pub fn function_has_side_effects(program: &Program, f: IrFnId) -> bool {
    fn inner(program: &Program, f: IrFnId, visiting: &mut HashSet<IrFnId>) -> bool {
        if !visiting.insert(f) {
            return false; // recursion: this path adds nothing new
        }
        let func = program.function(f);
        for block in &func.blocks {
            for s in &block.statements {
                if s.is_effectful_shape() {
                    return true;
                }
                match s {
                    Statement::Assign { target, .. } => {
                        if let Some(v) = target.root_variable() {
                            if program.variable(v).is_state() {
                                return true;
                            }
                        }
                    }
                    Statement::Call {
                        target, function, ..
                    } => {
                        if let Some(t) = target {
                            if let Some(v) = t.root_variable() {
                                if program.variable(v).is_state() {
                                    return true;
                                }
                            }
                        }
                        if inner(program, *function, visiting) {
                            return true;
                        }
                    }
                    _ => {}
                }
            }
        }
        let mut callees = Vec::new();
        func.visit_exprs(|e, _| {
            if let Expr::PureCall { function, .. } = e {
                callees.push(*function);
            }
        });
        callees.into_iter().any(|c| inner(program, c, visiting))
    }
    let mut visiting = HashSet::new();
    inner(program, f, &mut visiting)
}

/// Discarded-result calls to effect-free functions are removed.
pub fn remove_calls_to_void_functions_without_side_effects(program: &mut Program) {
    let live = live_functions(program);
    let effectful: HashMap<IrFnId, bool> = live
        .iter()
        .map(|&f| (f, function_has_side_effects(program, f)))
        .collect();
    for f in live {
        let func = program.function_mut(f);
        for block in &mut func.blocks {
            block.statements.retain(|s| match s {
                Statement::Call {
                    target: None,
                    function,
                    ..
                } => *effectful.get(function).unwrap_or(&true),
                _ => true,
            });
        }
    }
}

/// Keep only functions reachable from an exported function or one marked
/// `do_not_optimise`.
pub fn remove_unused_functions(program: &mut Program) {
    let live = live_functions(program);
    let mut keep: HashSet<IrFnId> = HashSet::new();

    let mut roots: Vec<IrFnId> = live
        .iter()
        .copied()
        .filter(|&f| {
            let func = program.function(f);
            func.is_exported || func.annotation.get_bool("do_not_optimise")
        })
        .collect();

    while let Some(f) = roots.pop() {
        if !keep.insert(f) {
            continue;
        }
        let mut called: Vec<IrFnId> = Vec::new();
        let func = program.function(f);
        for block in &func.blocks {
            for s in &block.statements {
                if let Statement::Call { function, .. } = s {
                    called.push(*function);
                }
            }
        }
        func.visit_exprs(|e, _| {
            if let Expr::PureCall { function, .. } = e {
                called.push(*function);
            }
        });
        roots.extend(called);
    }

    for module in &mut program.modules {
        module.functions.retain(|f| keep.contains(f));
    }
}

/// A processor with no functions and no structs left is dead weight.
pub fn remove_unused_processors(program: &mut Program) {
    program.modules.retain(|m| {
        !(m.kind == ModuleKind::Processor && m.functions.is_empty() && m.structs.is_empty())
    });
}

/// Likewise a namespace with no functions, structs or state.
pub fn remove_unused_namespaces(program: &mut Program) {
    program.modules.retain(|m| {
        !(m.kind == ModuleKind::Namespace
            && m.functions.is_empty()
            && m.structs.is_empty()
            && m.state_variables.is_empty())
    });
}

/// Mark every struct reachable from any type in the program, then drop the
/// rest from the module struct lists.
pub fn remove_unused_structs(program: &mut Program) {
    let mut used: HashSet<*const Structure> = HashSet::new();

    fn mark(ty: &Type, used: &mut HashSet<*const Structure>) {
        match &ty.kind {
            TypeKind::Struct(s) => {
                if used.insert(Arc::as_ptr(s)) {
                    for m in &s.members {
                        mark(&m.ty, used);
                    }
                }
            }
            TypeKind::FixedArray { element, .. } | TypeKind::UnsizedArray { element } => {
                mark(element, used);
            }
            _ => {}
        }
    }

    for module in &program.modules {
        for &v in &module.state_variables {
            mark(&program.variable(v).ty, &mut used);
        }
        for e in module.inputs.iter().chain(&module.outputs) {
            for t in &e.data_types {
                mark(t, &mut used);
            }
        }
    }
    for f in live_functions(program) {
        let func = program.function(f);
        mark(&func.return_type, &mut used);
        for &p in &func.parameters {
            mark(&program.variable(p).ty, &mut used);
        }
        func.visit_exprs(|e, _| match e {
            Expr::Binary { ty, .. }
            | Expr::Unary { ty, .. }
            | Expr::PureCall { ty, .. }
            | Expr::Element { ty, .. }
            | Expr::Member { ty, .. } => mark(ty, &mut used),
            Expr::Cast { dest, .. } => mark(dest, &mut used),
            Expr::Constant(v) => mark(v.ty(), &mut used),
            Expr::Variable(_) | Expr::ProcessorProperty(_) => {}
        });
    }

    for module in &mut program.modules {
        module.structs.retain(|s| used.contains(&Arc::as_ptr(s)));
    }
}

/// Report of struct members nobody reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadStructMembers {
    pub module_name: String,
    pub struct_name: String,
    pub unread_members: Vec<String>,
}

/// Find members with a read count of zero across the whole program.
///
/// Reporting only; nothing is deleted.
pub fn find_unread_struct_members(program: &Program) -> Vec<UnreadStructMembers> {
    let mut reads: HashMap<(*const Structure, usize), u32> = HashMap::new();

    for f in live_functions(program) {
        program.function(f).visit_exprs(|e, access| {
            if access != Access::Read {
                return;
            }
            if let Expr::Member { parent, member, .. } = e {
                if let Some(ty) = ir_expr_type(program, parent) {
                    if let Some(s) = ty.struct_ref() {
                        if let Some(index) = s.member_index(member) {
                            *reads.entry((Arc::as_ptr(s), index)).or_insert(0) += 1;
                        }
                    }
                }
            }
        });
    }

    let mut results = Vec::new();
    for module in &program.modules {
        for s in &module.structs {
            let unread: Vec<String> = s
                .members
                .iter()
                .enumerate()
                .filter(|(i, _)| reads.get(&(Arc::as_ptr(s), *i)).copied().unwrap_or(0) == 0)
                .map(|(_, m)| m.name.clone())
                .collect();
            if !unread.is_empty() {
                results.push(UnreadStructMembers {
                    module_name: module.name.clone(),
                    struct_name: s.name.clone(),
                    unread_members: unread,
                });
            }
        }
    }
    results
}

fn ir_expr_type(program: &Program, e: &Expr) -> Option<Type> {
    match e {
        Expr::Constant(v) => Some(v.ty().clone()),
        Expr::Variable(v) => Some(program.variable(*v).ty.clone()),
        Expr::Binary { ty, .. }
        | Expr::Unary { ty, .. }
        | Expr::PureCall { ty, .. }
        | Expr::Element { ty, .. }
        | Expr::Member { ty, .. } => Some(ty.clone()),
        Expr::Cast { dest, .. } => Some(dest.clone()),
        Expr::ProcessorProperty(p) => Some(p.result_type()),
    }
}

/// Drop dictionary entries no live handle refers to.
///
/// Handles live in function expressions and in annotations on modules,
/// endpoints, variables and functions.
pub fn garbage_collect_string_dictionary(program: &mut Program) {
    let mut used: Vec<StringHandle> = Vec::new();

    let note_annotation = |a: &Annotation, used: &mut Vec<StringHandle>| {
        for (_, v) in a.iter() {
            if let Some(h) = v.string_handle() {
                if !used.contains(&h) {
                    used.push(h);
                }
            }
        }
    };

    for f in live_functions(program) {
        program.function(f).visit_exprs(|e, _| {
            if let Expr::Constant(v) = e {
                if let Some(h) = v.string_handle() {
                    if !used.contains(&h) {
                        used.push(h);
                    }
                }
            }
        });
    }
    for module in &program.modules {
        note_annotation(&module.annotation, &mut used);
        for e in module.inputs.iter().chain(&module.outputs) {
            note_annotation(&e.annotation, &mut used);
        }
        for &v in &module.state_variables {
            note_annotation(&program.variable(v).annotation, &mut used);
        }
        for &f in &module.functions {
            note_annotation(&program.function(f).annotation, &mut used);
        }
    }

    program.string_dictionary.retain_handles(&used);
}
