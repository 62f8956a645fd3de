//! Function-call inlining.
//!
//! An inlineable call site is replaced by a clone of the callee: the
//! caller's block is split at the call, the callee's blocks are copied in
//! with parameters renamed to fresh locals seeded from the arguments, and
//! returns become branches to the resume block. A value-returning callee
//! stores into a synthesised local that replaces the call's destination.

use crate::function::{
    Access, Block, Expr, IrFnId, IrFunction, IrVarId, IrVariable, Statement, Terminator, VarRole,
};
use crate::program::Program;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Inline every call to functions annotated `inline`, then drop the bodies
/// that are no longer called.
pub fn inline_annotated_functions(program: &mut Program) {
    let candidates: Vec<IrFnId> = program
        .modules
        .iter()
        .flat_map(|m| m.functions.iter().copied())
        .filter(|&f| program.function(f).annotation.get_bool("inline"))
        .collect();
    for f in candidates {
        if inline_all_calls_to_function(program, f) {
            debug!(name = %program.function(f).name, "inlined all calls");
        }
    }
}

/// True when a call to `callee` may be replaced by its body: the callee has
/// a body, is not (mutually) recursive and is not pinned by
/// `do_not_optimise`.
pub fn can_inline(program: &Program, caller: IrFnId, callee: IrFnId) -> bool {
    if caller == callee {
        return false;
    }
    let f = program.function(callee);
    if f.blocks.is_empty() || f.annotation.get_bool("do_not_optimise") {
        return false;
    }
    !is_recursive(program, callee)
}

fn is_recursive(program: &Program, f: IrFnId) -> bool {
    fn reaches(program: &Program, from: IrFnId, target: IrFnId, seen: &mut HashSet<IrFnId>) -> bool {
        if !seen.insert(from) {
            return false;
        }
        let mut callees = Vec::new();
        for block in &program.function(from).blocks {
            for s in &block.statements {
                if let Statement::Call { function, .. } = s {
                    callees.push(*function);
                }
            }
        }
        program.function(from).visit_exprs(|e, _| {
            if let Expr::PureCall { function, .. } = e {
                callees.push(*function);
            }
        });
        callees
            .into_iter()
            .any(|c| c == target || reaches(program, c, target, seen))
    }
    let mut seen = HashSet::new();
    reaches(program, f, f, &mut seen)
}

/// Inline every call site of `target` across the program. Returns true if
/// anything changed; the function is unregistered from its module once no
/// calls remain.
pub fn inline_all_calls_to_function(program: &mut Program, target: IrFnId) -> bool {
    let callers: Vec<IrFnId> = program
        .modules
        .iter()
        .flat_map(|m| m.functions.iter().copied())
        .collect();
    let mut changed = false;
    for caller in callers {
        loop {
            let Some((block, index)) = find_call_site(program.function(caller), target) else {
                break;
            };
            if !can_inline(program, caller, target) {
                return false;
            }
            inline_call_site(program, caller, block, index, target);
            changed = true;
        }
    }
    if changed {
        for module in &mut program.modules {
            module.functions.retain(|&f| f != target);
        }
    }
    changed
}

fn find_call_site(func: &IrFunction, target: IrFnId) -> Option<(usize, usize)> {
    for (b, block) in func.blocks.iter().enumerate() {
        for (i, s) in block.statements.iter().enumerate() {
            if let Statement::Call { function, .. } = s {
                if *function == target {
                    return Some((b, i));
                }
            }
        }
    }
    None
}

/// Splice one call site.
pub fn inline_call_site(
    program: &mut Program,
    caller: IrFnId,
    block: usize,
    stmt_index: usize,
    callee: IrFnId,
) {
    let callee_fn = program.function(callee).clone();
    let callee_name = callee_fn.name.clone();

    // Take the call apart.
    let (call_target, call_args) = {
        let func = program.function_mut(caller);
        let stmt = func.blocks[block].statements.remove(stmt_index);
        match stmt {
            Statement::Call { target, args, .. } => (target, args),
            _ => unreachable!("call site index must point at a call"),
        }
    };

    // Split the caller's block: everything after the call resumes in a new
    // block that inherits the old terminator.
    let resume_block = {
        let func = program.function_mut(caller);
        let resume = func.blocks.len();
        let trailing: Vec<Statement> = func.blocks[block].statements.split_off(stmt_index);
        let old_terminator = std::mem::replace(
            &mut func.blocks[block].terminator,
            Terminator::Branch(resume),
        );
        let mut b = Block::new(format!("{callee_name}_resume_{resume}"));
        b.statements = trailing;
        b.terminator = old_terminator;
        func.blocks.push(b);
        resume
    };

    // Fresh locals for parameters, seeded from the arguments in the block
    // before the jump into the clone.
    let mut var_map: HashMap<IrVarId, IrVarId> = HashMap::new();
    for (i, &param) in callee_fn.parameters.iter().enumerate() {
        let param_var = program.variable(param).clone();
        let local = program.add_variable(IrVariable::new(
            format!("{callee_name}_{}", param_var.name),
            param_var.ty.remove_reference(),
            VarRole::MutableLocal,
        ));
        var_map.insert(param, local);
        if let Some(arg) = call_args.get(i) {
            program
                .function_mut(caller)
                .blocks[block]
                .statements
                .push(Statement::Assign {
                    target: Expr::Variable(local),
                    source: arg.clone(),
                });
        }
    }

    // A value-returning callee writes a synthesised local that the original
    // destination reads from in the resume block.
    let return_var = if callee_fn.return_type.is_void() {
        None
    } else {
        Some(program.add_variable(IrVariable::new(
            format!("{callee_name}_retval"),
            callee_fn.return_type.clone(),
            VarRole::MutableLocal,
        )))
    };
    if let (Some(ret), Some(dest)) = (return_var, call_target) {
        program.function_mut(caller).blocks[resume_block].statements.insert(
            0,
            Statement::Assign {
                target: dest,
                source: Expr::Variable(ret),
            },
        );
    }

    // Clone the callee's blocks onto the end of the caller.
    let base = program.function(caller).blocks.len();
    let mut cloned: Vec<Block> = Vec::with_capacity(callee_fn.blocks.len());
    for (i, src) in callee_fn.blocks.iter().enumerate() {
        let mut b = Block::new(format!("{callee_name}_inlined_{}", base + i));
        b.statements = src.statements.clone();
        b.terminator = match &src.terminator {
            Terminator::Branch(d) => Terminator::Branch(base + d),
            Terminator::BranchIf {
                condition,
                true_block,
                false_block,
            } => Terminator::BranchIf {
                condition: condition.clone(),
                true_block: base + true_block,
                false_block: base + false_block,
            },
            Terminator::ReturnVoid => Terminator::Branch(resume_block),
            Terminator::ReturnValue(v) => {
                let ret = return_var.expect("value return from a void callee");
                b.statements.push(Statement::Assign {
                    target: Expr::Variable(ret),
                    source: v.clone(),
                });
                Terminator::Branch(resume_block)
            }
        };
        cloned.push(b);
    }

    // Rename parameters and callee locals to fresh caller locals; locals are
    // mapped lazily as they first appear.
    let mut local_map = var_map;
    let mut pending_new: Vec<(IrVarId, IrVariable)> = Vec::new();
    {
        let variables = &program.variables;
        let next_id = variables.len() as u32;
        let mut next = next_id;
        for b in &mut cloned {
            let mut map_var = |e: &mut Expr, _: Access| {
                if let Expr::Variable(v) = e {
                    if let Some(mapped) = local_map.get(v) {
                        *e = Expr::Variable(*mapped);
                    } else if variables[v.0 as usize].is_function_local() {
                        let fresh = IrVarId(next);
                        next += 1;
                        let mut clone_var = variables[v.0 as usize].clone();
                        clone_var.name = format!("{callee_name}_{}", clone_var.name);
                        pending_new.push((fresh, clone_var));
                        local_map.insert(*v, fresh);
                        *e = Expr::Variable(fresh);
                    }
                }
            };
            for s in &mut b.statements {
                s.visit_mut(&mut map_var);
            }
            b.terminator.visit_mut(&mut map_var);
        }
    }
    for (_, v) in pending_new {
        program.variables.push(v);
    }

    // Jump into the clone and stitch it in.
    let func = program.function_mut(caller);
    func.blocks[block].terminator = Terminator::Branch(base);
    func.blocks.extend(cloned);
    func.rebuild_predecessors();
}
