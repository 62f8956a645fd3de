//! Basic-block simplification.
//!
//! Three rewrites run to a fixed point per function: bypass empty or
//! unreachable blocks, delete whole unreachable cycles, and merge a block
//! into its single unconditional predecessor. Block ids are list indexes, so
//! every deletion renumbers the survivors and rewrites the terminators.

use crate::function::{IrFunction, Terminator};
use crate::program::Program;

/// Simplify every function's block list.
pub fn optimise_function_blocks(program: &mut Program) {
    let functions: Vec<_> = program
        .modules
        .iter()
        .flat_map(|m| m.functions.iter().copied())
        .collect();
    for f in functions {
        let func = program.function_mut(f);
        loop {
            func.rebuild_predecessors();
            let changed = eliminate_empty_and_unreachable_blocks(func)
                | eliminate_unreachable_cycles(func)
                | merge_adjacent_blocks(func);
            if !changed {
                break;
            }
        }
    }
}

/// Remove the blocks marked true, renumbering terminator destinations.
///
/// The entry block (index 0) must never be marked.
fn remove_blocks(func: &mut IrFunction, remove: &[bool]) -> bool {
    if !remove.iter().any(|r| *r) {
        return false;
    }
    debug_assert!(!remove[0], "the entry block cannot be removed");

    let mut new_index = vec![usize::MAX; func.blocks.len()];
    let mut next = 0usize;
    for (i, removed) in remove.iter().enumerate() {
        if !removed {
            new_index[i] = next;
            next += 1;
        }
    }

    let mut kept = Vec::with_capacity(next);
    for (i, block) in std::mem::take(&mut func.blocks).into_iter().enumerate() {
        if !remove[i] {
            kept.push(block);
        }
    }
    for block in &mut kept {
        match &mut block.terminator {
            Terminator::Branch(b) => *b = new_index[*b],
            Terminator::BranchIf {
                true_block,
                false_block,
                ..
            } => {
                *true_block = new_index[*true_block];
                *false_block = new_index[*false_block];
            }
            _ => {}
        }
    }
    func.blocks = kept;
    func.rebuild_predecessors();
    true
}

/// Bypass blocks that have no predecessors, or are empty with a single
/// unconditional successor. An empty `return` block whose predecessors all
/// branch unconditionally is folded into each predecessor.
fn eliminate_empty_and_unreachable_blocks(func: &mut IrFunction) -> bool {
    let mut changed = false;
    loop {
        func.rebuild_predecessors();
        let mut remove = vec![false; func.blocks.len()];
        let mut any = false;

        for i in 1..func.blocks.len() {
            if func.blocks[i].predecessors.is_empty() {
                remove[i] = true;
                any = true;
                continue;
            }
            if !func.blocks[i].statements.is_empty() {
                continue;
            }
            match func.blocks[i].terminator.clone() {
                Terminator::Branch(dest) if dest != i => {
                    let preds = func.blocks[i].predecessors.clone();
                    for p in preds {
                        func.blocks[p].terminator.replace_destination(i, dest);
                    }
                    remove[i] = true;
                    any = true;
                }
                Terminator::ReturnVoid => {
                    let preds = func.blocks[i].predecessors.clone();
                    let all_unconditional = preds
                        .iter()
                        .all(|&p| !func.blocks[p].terminator.is_conditional());
                    if all_unconditional {
                        for p in preds {
                            func.blocks[p].terminator = Terminator::ReturnVoid;
                        }
                        remove[i] = true;
                        any = true;
                    }
                }
                _ => {}
            }
            if any {
                break; // renumber before touching anything else
            }
        }

        if !any {
            return changed;
        }
        remove_blocks(func, &remove);
        changed = true;
    }
}

/// Delete every block the entry cannot reach, including closed cycles that
/// predecessor counting alone would keep alive.
fn eliminate_unreachable_cycles(func: &mut IrFunction) -> bool {
    let mut reachable = vec![false; func.blocks.len()];
    let mut stack = vec![0usize];
    while let Some(b) = stack.pop() {
        if reachable[b] {
            continue;
        }
        reachable[b] = true;
        stack.extend(func.blocks[b].terminator.destinations());
    }
    let remove: Vec<bool> = reachable.iter().map(|r| !r).collect();
    remove_blocks(func, &remove)
}

/// A block with exactly one unconditional predecessor merges into it.
fn merge_adjacent_blocks(func: &mut IrFunction) -> bool {
    let mut changed = false;
    loop {
        func.rebuild_predecessors();
        let mut merged = false;

        for i in 1..func.blocks.len() {
            let preds = func.blocks[i].predecessors.clone();
            if preds.len() != 1 {
                continue;
            }
            let p = preds[0];
            if p == i || func.blocks[p].terminator.is_conditional() {
                continue;
            }
            debug_assert_eq!(func.blocks[p].terminator.destinations(), vec![i]);

            let statements = std::mem::take(&mut func.blocks[i].statements);
            let terminator = func.blocks[i].terminator.clone();
            func.blocks[p].statements.extend(statements);
            func.blocks[p].terminator = terminator;

            let mut remove = vec![false; func.blocks.len()];
            remove[i] = true;
            remove_blocks(func, &remove);
            merged = true;
            break;
        }

        if !merged {
            return changed;
        }
        changed = true;
    }
}
