//! AST to IR lowering.
//!
//! Every resolved module becomes an IR module under the synthetic root
//! namespace. Function bodies lower to basic blocks: structured control flow
//! synthesises uniquely named blocks per construct, side-effecting
//! sub-expressions are hoisted into temporaries, `const if` emits only its
//! live arm, and aggregate initialisers expand to per-field writes. Graphs
//! lower their instances and connections into the records the performer
//! wires up at link time.

use crate::function::{
    Block, BlockId, ElementIndex, Expr, IrFnId, IrFunction, IrFunctionKind, IrVarId, IrVariable,
    Statement, Terminator, VarRole,
};
use crate::program::{IrConnection, IrEndpoint, IrProcessorInstance, Module, Program, ROOT_NAMESPACE};
use sonance_ast::ast::{
    AstArena, EndpointId, ExprId, ExprKind, FunctionId, FunctionKind, ModuleId, StmtId, StmtKind,
    VarId,
};
use sonance_ast::types::{binary_op_types, unary_op_type, Type, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Internal lowering failures.
///
/// These indicate constructs the resolver should have rejected or rewritten;
/// reaching one on validated input is a compiler bug.
#[derive(Debug, Error)]
pub enum LowerError {
    #[error("unresolved expression reached lowering: {0}")]
    Unresolved(String),
    #[error("unsupported construct: {0}")]
    Unsupported(String),
    #[error("internal lowering error: {0}")]
    Internal(String),
}

/// Lower a fully resolved compilation into a Program.
pub fn lower_compilation(arena: &AstArena) -> Result<Program, LowerError> {
    let mut program = Program::new();
    program.string_dictionary = arena.strings.clone();
    program.constant_table = arena.constants.clone();

    let modules = gather(arena);
    debug!(count = modules.len(), "lowering modules");

    // First pass: declare modules, state, endpoints and function shells so
    // calls and cross-module references can be resolved by id.
    let mut ctx = LowerContext {
        var_map: HashMap::new(),
        fn_map: HashMap::new(),
        endpoint_map: HashMap::new(),
        module_names: HashMap::new(),
    };

    for &m in &modules {
        declare_module(arena, m, &mut program, &mut ctx)?;
    }

    // Second pass: lower function bodies and graph wiring.
    for (index, &m) in modules.iter().enumerate() {
        lower_module_contents(arena, m, index, &mut program, &ctx)?;
    }

    Ok(program)
}

fn gather(arena: &AstArena) -> Vec<ModuleId> {
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

struct LowerContext {
    var_map: HashMap<VarId, IrVarId>,
    fn_map: HashMap<FunctionId, IrFnId>,
    /// Endpoint -> (is_input, index within the module's list).
    endpoint_map: HashMap<EndpointId, (bool, usize)>,
    module_names: HashMap<ModuleId, String>,
}

fn full_name(arena: &AstArena, module: ModuleId) -> String {
    let mut parts = vec![arena.name(arena.module(module).name).to_string()];
    let mut current = arena.module(module).parent;
    while let Some(p) = current {
        parts.push(arena.name(arena.module(p).name).to_string());
        current = arena.module(p).parent;
    }
    parts.push(ROOT_NAMESPACE.to_string());
    parts.reverse();
    parts.join("::")
}

fn declare_module(
    arena: &AstArena,
    module: ModuleId,
    program: &mut Program,
    ctx: &mut LowerContext,
) -> Result<(), LowerError> {
    let decl = arena.module(module);
    let full = full_name(arena, module);
    ctx.module_names.insert(module, full.clone());

    let mut ir = Module::new(arena.name(decl.name), full, decl.kind);
    ir.annotation = decl.annotation.clone();

    for &e in &decl.endpoints {
        let ep = arena.endpoint(e);
        let Some(types) = ep.resolved_types.clone() else {
            return Err(LowerError::Unresolved(format!(
                "endpoint '{}'",
                arena.name(ep.name)
            )));
        };
        let endpoint = IrEndpoint {
            name: arena.name(ep.name).to_string(),
            kind: ep.kind,
            data_types: types,
            array_size: ep.resolved_array_size,
            annotation: ep.annotation.clone(),
        };
        if ep.is_input() {
            ctx.endpoint_map.insert(e, (true, ir.inputs.len()));
            ir.inputs.push(endpoint);
        } else {
            ctx.endpoint_map.insert(e, (false, ir.outputs.len()));
            ir.outputs.push(endpoint);
        }
    }

    for &v in &decl.state_variables {
        let var = arena.variable(v);
        let Some(ty) = var.resolved_type.clone() else {
            return Err(LowerError::Unresolved(format!(
                "state variable '{}'",
                arena.name(var.name)
            )));
        };
        let role = if var.is_external {
            VarRole::External
        } else {
            VarRole::State
        };
        let mut ir_var = IrVariable::new(arena.name(var.name), ty, role);
        ir_var.annotation = var.annotation.clone();
        let id = program.add_variable(ir_var);
        ctx.var_map.insert(v, id);
        ir.state_variables.push(id);
    }

    for &s in &decl.structs {
        let Some(structure) = arena.structure(s).structure.clone() else {
            return Err(LowerError::Unresolved(format!(
                "struct '{}'",
                arena.name(arena.structure(s).name)
            )));
        };
        ir.structs.push(structure);
    }

    for &f in &decl.functions {
        let func = arena.function(f);
        if func.is_generic() {
            continue;
        }
        let kind = match func.kind {
            FunctionKind::Normal => IrFunctionKind::Normal,
            FunctionKind::Run => IrFunctionKind::Run,
            FunctionKind::Init => IrFunctionKind::Init,
            FunctionKind::Event => IrFunctionKind::Event,
        };
        let Some(return_type) = func.resolved_return_type.clone() else {
            return Err(LowerError::Unresolved(format!(
                "function '{}'",
                arena.name(func.name)
            )));
        };
        let mut parameters = Vec::with_capacity(func.parameters.len());
        for &p in &func.parameters {
            let param = arena.variable(p);
            let Some(ty) = param.resolved_type.clone() else {
                return Err(LowerError::Unresolved(format!(
                    "parameter '{}'",
                    arena.name(param.name)
                )));
            };
            let id = program.add_variable(IrVariable::new(
                arena.name(param.name),
                ty,
                VarRole::Parameter,
            ));
            ctx.var_map.insert(p, id);
            parameters.push(id);
        }
        let mut shell = IrFunction {
            name: arena.name(func.name).to_string(),
            kind,
            return_type,
            parameters,
            blocks: Vec::new(),
            annotation: func.annotation.clone(),
            is_exported: kind != IrFunctionKind::Normal,
        };
        if shell.annotation.get_bool("export") {
            shell.is_exported = true;
        }
        let id = program.add_function(shell);
        ctx.fn_map.insert(f, id);
        ir.functions.push(id);
    }

    program.modules.push(ir);
    Ok(())
}

fn lower_module_contents(
    arena: &AstArena,
    module: ModuleId,
    module_index: usize,
    program: &mut Program,
    ctx: &LowerContext,
) -> Result<(), LowerError> {
    let decl = arena.module(module);

    // Graph wiring.
    for &i in &decl.instances {
        let inst = arena.instance(i);
        let Some(target) = inst.resolved_target else {
            return Err(LowerError::Unresolved(format!(
                "processor instance '{}'",
                arena.name(inst.name)
            )));
        };
        let source_module = ctx
            .module_names
            .get(&target)
            .cloned()
            .ok_or_else(|| LowerError::Internal("instance target not lowered".into()))?;
        program.modules[module_index]
            .instances
            .push(IrProcessorInstance {
                instance_name: arena.name(inst.name).to_string(),
                source_module,
                clock_multiplier: const_i64(arena, inst.clock_multiplier).unwrap_or(1),
                clock_divider: const_i64(arena, inst.clock_divider).unwrap_or(1),
                array_size: inst.resolved_array_size.unwrap_or(1),
            });
    }
    for &c in &decl.connections {
        let conn = arena.connection(c);
        program.modules[module_index]
            .connections
            .push(IrConnection {
                interpolation: conn.interpolation,
                source_instance: conn.source.instance.map(|n| arena.name(n).to_string()),
                source_endpoint: arena.name(conn.source.endpoint).to_string(),
                source_endpoint_index: const_i64(arena, conn.source.endpoint_index)
                    .map(|n| n as u32),
                dest_instance: conn.dest.instance.map(|n| arena.name(n).to_string()),
                dest_endpoint: arena.name(conn.dest.endpoint).to_string(),
                dest_endpoint_index: const_i64(arena, conn.dest.endpoint_index).map(|n| n as u32),
                delay_length: conn.resolved_delay.unwrap_or(0),
            });
    }

    // Function bodies.
    for &f in &decl.functions {
        if arena.function(f).is_generic() {
            continue;
        }
        let ir_fn = ctx.fn_map[&f];
        let blocks = lower_function_body(arena, f, program, ctx)?;
        program.function_mut(ir_fn).blocks = blocks;
    }
    Ok(())
}

fn const_i64(arena: &AstArena, expr: Option<ExprId>) -> Option<i64> {
    match &arena.expr(expr?).kind {
        ExprKind::Constant(v) => v.as_i64(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------

struct BodyLowerer<'a> {
    arena: &'a AstArena,
    program: &'a mut Program,
    ctx: &'a LowerContext,
    blocks: Vec<Block>,
    current: BlockId,
    /// (continue target, break target) per enclosing loop.
    loop_stack: Vec<(BlockId, BlockId)>,
    local_vars: HashMap<VarId, IrVarId>,
    temp_counter: usize,
}

fn lower_function_body(
    arena: &AstArena,
    function: FunctionId,
    program: &mut Program,
    ctx: &LowerContext,
) -> Result<Vec<Block>, LowerError> {
    let mut lowerer = BodyLowerer {
        arena,
        program,
        ctx,
        blocks: vec![Block::new("entry")],
        current: 0,
        loop_stack: Vec::new(),
        local_vars: HashMap::new(),
        temp_counter: 0,
    };
    if let Some(body) = arena.function(function).body {
        lowerer.lower_stmt(body)?;
    }
    Ok(lowerer.blocks)
}

impl<'a> BodyLowerer<'a> {
    fn new_block(&mut self, name: &str) -> BlockId {
        let id = self.blocks.len();
        self.blocks.push(Block::new(format!("{name}_{id}")));
        id
    }

    fn emit(&mut self, statement: Statement) {
        self.blocks[self.current].statements.push(statement);
    }

    fn terminate(&mut self, terminator: Terminator) {
        self.blocks[self.current].terminator = terminator;
    }

    fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    fn make_temp(&mut self, name_hint: &str, ty: Type) -> IrVarId {
        let name = format!("_{name_hint}_{}", self.temp_counter);
        self.temp_counter += 1;
        self.program
            .add_variable(IrVariable::new(name, ty, VarRole::MutableLocal))
    }

    fn lookup_var(&self, v: VarId) -> Result<IrVarId, LowerError> {
        self.local_vars
            .get(&v)
            .or_else(|| self.ctx.var_map.get(&v))
            .copied()
            .ok_or_else(|| LowerError::Internal("variable not declared before use".into()))
    }

    // --- statements -------------------------------------------------------

    fn lower_stmt(&mut self, stmt: StmtId) -> Result<(), LowerError> {
        match self.arena.stmt(stmt).kind.clone() {
            StmtKind::Block { statements, .. } => {
                for s in statements {
                    self.lower_stmt(s)?;
                }
                Ok(())
            }

            StmtKind::Expression(e) => {
                self.lower_effect(e)?;
                Ok(())
            }

            StmtKind::VariableDeclaration(v) => {
                let decl = self.arena.variable(v);
                let ty = decl.resolved_type.clone().ok_or_else(|| {
                    LowerError::Unresolved(format!(
                        "local variable '{}'",
                        self.arena.name(decl.name)
                    ))
                })?;
                let role = if decl.is_constant {
                    VarRole::Constant
                } else {
                    VarRole::MutableLocal
                };
                let name = self.arena.name(decl.name).to_string();
                let init = decl.initial_value;
                let id = self.program.add_variable(IrVariable::new(name, ty.clone(), role));
                self.local_vars.insert(v, id);
                if let Some(init) = init {
                    let value = self.lower_value(init)?;
                    let value = self.coerce(value, &ty);
                    self.emit(Statement::Assign {
                        target: Expr::Variable(id),
                        source: value,
                    });
                }
                Ok(())
            }

            StmtKind::If {
                condition,
                then_branch,
                else_branch,
                is_const,
            } => {
                // A folded condition selects its live arm at compile time.
                if let ExprKind::Constant(v) = &self.arena.expr(condition).kind {
                    let taken = v.as_bool().unwrap_or(false);
                    if taken {
                        return self.lower_stmt(then_branch);
                    }
                    if let Some(e) = else_branch {
                        return self.lower_stmt(e);
                    }
                    return Ok(());
                }
                if is_const {
                    return Err(LowerError::Unresolved(
                        "const if with a non-constant condition".into(),
                    ));
                }

                let cond = self.lower_value(condition)?;
                let true_block = self.new_block("if_true");
                let end_block = self.new_block("if_end");
                let false_block = match else_branch {
                    Some(_) => self.new_block("if_false"),
                    None => end_block,
                };
                self.terminate(Terminator::BranchIf {
                    condition: cond,
                    true_block,
                    false_block,
                });

                self.switch_to(true_block);
                self.lower_stmt(then_branch)?;
                self.terminate(Terminator::Branch(end_block));

                if let Some(e) = else_branch {
                    self.switch_to(false_block);
                    self.lower_stmt(e)?;
                    self.terminate(Terminator::Branch(end_block));
                }

                self.switch_to(end_block);
                Ok(())
            }

            StmtKind::Loop {
                initialiser,
                condition,
                iterator,
                count,
                body,
                is_do_while,
            } => self.lower_loop(initialiser, condition, iterator, count, body, is_do_while),

            StmtKind::Return(value) => {
                match value {
                    Some(v) => {
                        let value = self.lower_value(v)?;
                        self.terminate(Terminator::ReturnValue(value));
                    }
                    None => self.terminate(Terminator::ReturnVoid),
                }
                // Anything after a return in the same source block is dead;
                // give it a block the optimiser will drop.
                let dead = self.new_block("unreachable");
                self.switch_to(dead);
                Ok(())
            }

            StmtKind::Break => {
                let Some(&(_, break_target)) = self.loop_stack.last() else {
                    return Err(LowerError::Unsupported("break outside a loop".into()));
                };
                self.terminate(Terminator::Branch(break_target));
                let dead = self.new_block("unreachable");
                self.switch_to(dead);
                Ok(())
            }

            StmtKind::Continue => {
                let Some(&(continue_target, _)) = self.loop_stack.last() else {
                    return Err(LowerError::Unsupported("continue outside a loop".into()));
                };
                self.terminate(Terminator::Branch(continue_target));
                let dead = self.new_block("unreachable");
                self.switch_to(dead);
                Ok(())
            }

            StmtKind::Noop => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn lower_loop(
        &mut self,
        initialiser: Option<StmtId>,
        condition: Option<ExprId>,
        iterator: Option<StmtId>,
        count: Option<ExprId>,
        body: StmtId,
        is_do_while: bool,
    ) -> Result<(), LowerError> {
        if let Some(init) = initialiser {
            self.lower_stmt(init)?;
        }

        // `loop (n)` synthesises its own counter.
        let counter = match count {
            Some(count_expr) => {
                let count_value = self.lower_value(count_expr)?;
                let counter = self.make_temp("counter", Type::int32());
                self.emit(Statement::Assign {
                    target: Expr::Variable(counter),
                    source: Expr::Constant(Value::from_i32(0)),
                });
                Some((counter, count_value))
            }
            None => None,
        };

        let cond_block = self.new_block("loop_cond");
        let body_block = self.new_block("loop_body");
        let step_block = self.new_block("loop_step");
        let end_block = self.new_block("loop_end");

        self.terminate(Terminator::Branch(if is_do_while {
            body_block
        } else {
            cond_block
        }));

        self.switch_to(cond_block);
        let condition_expr = match (&counter, condition) {
            (Some((counter, count_value)), _) => Expr::Binary {
                op: sonance_ast::types::BinaryOp::LessThan,
                lhs: Box::new(Expr::Variable(*counter)),
                rhs: Box::new(count_value.clone()),
                ty: Type::bool(),
            },
            (None, Some(c)) => self.lower_value(c)?,
            (None, None) => Expr::Constant(Value::from_bool(true)),
        };
        self.terminate(Terminator::BranchIf {
            condition: condition_expr,
            true_block: body_block,
            false_block: end_block,
        });

        self.switch_to(body_block);
        self.loop_stack.push((step_block, end_block));
        self.lower_stmt(body)?;
        self.loop_stack.pop();
        self.terminate(Terminator::Branch(step_block));

        self.switch_to(step_block);
        if let Some(iter) = iterator {
            self.lower_stmt(iter)?;
        }
        if let Some((counter, _)) = &counter {
            self.emit(Statement::Assign {
                target: Expr::Variable(*counter),
                source: Expr::Binary {
                    op: sonance_ast::types::BinaryOp::Add,
                    lhs: Box::new(Expr::Variable(*counter)),
                    rhs: Box::new(Expr::Constant(Value::from_i32(1))),
                    ty: Type::int32(),
                },
            });
        }
        self.terminate(Terminator::Branch(cond_block));

        self.switch_to(end_block);
        Ok(())
    }

    // --- expressions ------------------------------------------------------

    /// Lower an expression evaluated for its effect; results of void calls
    /// are discarded.
    fn lower_effect(&mut self, e: ExprId) -> Result<(), LowerError> {
        match self.arena.expr(e).kind.clone() {
            ExprKind::Assignment { target, value } => {
                let target_ty = self.expr_type(target)?;
                let target = self.lower_value(target)?;
                let value = self.lower_value(value)?;
                let value = self.coerce(value, &target_ty);
                self.emit(Statement::Assign {
                    target,
                    source: value,
                });
                Ok(())
            }
            ExprKind::FunctionCall { function, args } => {
                let ir_fn = self.lower_call_args(function, &args)?;
                self.emit(Statement::Call {
                    target: None,
                    function: ir_fn.0,
                    args: ir_fn.1,
                });
                Ok(())
            }
            ExprKind::WriteToEndpoint { target, value } => self.lower_write(target, value),
            ExprKind::AdvanceClock => {
                self.emit(Statement::AdvanceClock);
                Ok(())
            }
            ExprKind::PreOrPostIncDec { .. } => {
                self.lower_value(e)?;
                Ok(())
            }
            ExprKind::StaticAssertion { .. } => Ok(()), // checked, no runtime form
            ExprKind::Constant(_) => Ok(()),
            _ => {
                self.lower_value(e)?;
                Ok(())
            }
        }
    }

    /// Lower an expression to a pure IR expression, hoisting side effects
    /// into temporaries beforehand.
    fn lower_value(&mut self, e: ExprId) -> Result<Expr, LowerError> {
        match self.arena.expr(e).kind.clone() {
            ExprKind::Constant(v) => Ok(Expr::Constant(v)),

            ExprKind::VariableRef(v) => Ok(Expr::Variable(self.lookup_var(v)?)),

            ExprKind::EndpointRef(endpoint) => self.lower_endpoint_read(endpoint, None),

            ExprKind::Binary { op, lhs, rhs, resolved_types } => {
                let types = match resolved_types {
                    Some(t) => t,
                    None => {
                        let lt = self.expr_type(lhs)?;
                        let rt = self.expr_type(rhs)?;
                        binary_op_types(op, &lt, &rt).ok_or_else(|| {
                            LowerError::Unresolved("untyped binary operator".into())
                        })?
                    }
                };
                let l = self.lower_value(lhs)?;
                let r = self.lower_value(rhs)?;
                Ok(Expr::Binary {
                    op,
                    lhs: Box::new(self.coerce(l, &types.operand)),
                    rhs: Box::new(self.coerce(r, &types.operand)),
                    ty: types.result,
                })
            }

            ExprKind::Unary { op, operand } => {
                let ty = self.expr_type(e)?;
                let source = self.lower_value(operand)?;
                Ok(Expr::Unary {
                    op,
                    source: Box::new(source),
                    ty,
                })
            }

            ExprKind::Ternary {
                condition,
                true_value,
                false_value,
            } => {
                let ty = self.expr_type(true_value)?;
                let temp = self.make_temp("select", ty.clone());
                let cond = self.lower_value(condition)?;
                let true_block = self.new_block("select_true");
                let false_block = self.new_block("select_false");
                let end_block = self.new_block("select_end");
                self.terminate(Terminator::BranchIf {
                    condition: cond,
                    true_block,
                    false_block,
                });

                self.switch_to(true_block);
                let tv = self.lower_value(true_value)?;
                let tv = self.coerce(tv, &ty);
                self.emit(Statement::Assign {
                    target: Expr::Variable(temp),
                    source: tv,
                });
                self.terminate(Terminator::Branch(end_block));

                self.switch_to(false_block);
                let fv = self.lower_value(false_value)?;
                let fv = self.coerce(fv, &ty);
                self.emit(Statement::Assign {
                    target: Expr::Variable(temp),
                    source: fv,
                });
                self.terminate(Terminator::Branch(end_block));

                self.switch_to(end_block);
                Ok(Expr::Variable(temp))
            }

            ExprKind::Assignment { target, value } => {
                let target_ty = self.expr_type(target)?;
                let t = self.lower_value(target)?;
                let v = self.lower_value(value)?;
                let v = self.coerce(v, &target_ty);
                self.emit(Statement::Assign {
                    target: t.clone(),
                    source: v,
                });
                Ok(t)
            }

            ExprKind::PreOrPostIncDec {
                target,
                is_increment,
                is_post,
            } => {
                let ty = self.expr_type(target)?;
                let t = self.lower_value(target)?;
                let op = if is_increment {
                    sonance_ast::types::BinaryOp::Add
                } else {
                    sonance_ast::types::BinaryOp::Subtract
                };
                let stepped = Expr::Binary {
                    op,
                    lhs: Box::new(t.clone()),
                    rhs: Box::new(Expr::Constant(Value::from_i32(1))),
                    ty: ty.clone(),
                };
                if is_post {
                    let temp = self.make_temp("post", ty.clone());
                    self.emit(Statement::Assign {
                        target: Expr::Variable(temp),
                        source: t.clone(),
                    });
                    self.emit(Statement::Assign {
                        target: t,
                        source: stepped,
                    });
                    Ok(Expr::Variable(temp))
                } else {
                    self.emit(Statement::Assign {
                        target: t.clone(),
                        source: stepped,
                    });
                    Ok(t)
                }
            }

            ExprKind::FunctionCall { function, args } => {
                let ret = self
                    .arena
                    .function(function)
                    .resolved_return_type
                    .clone()
                    .ok_or_else(|| LowerError::Unresolved("call return type".into()))?;
                let (ir_fn, args) = self.lower_call_args(function, &args)?;
                if ret.is_void() {
                    return Err(LowerError::Unsupported(
                        "a void call cannot be used as a value".into(),
                    ));
                }
                let temp = self.make_temp("call", ret);
                self.emit(Statement::Call {
                    target: Some(Expr::Variable(temp)),
                    function: ir_fn,
                    args,
                });
                Ok(Expr::Variable(temp))
            }

            ExprKind::TypeCast { dest, source } => {
                // Aggregate construction expands to per-field writes.
                if let ExprKind::CommaList(items) = self.arena.expr(source).kind.clone() {
                    return self.lower_aggregate(&dest, &items);
                }
                let inner = self.lower_value(source)?;
                Ok(Expr::Cast {
                    dest,
                    source: Box::new(inner),
                })
            }

            ExprKind::ArrayElement { parent, start, end } => {
                // Reads from endpoint gangs pick their slot here.
                if let ExprKind::EndpointRef(endpoint) = self.arena.expr(parent).kind {
                    let index = self.lower_value(start)?;
                    return self.lower_endpoint_read(endpoint, Some(index));
                }
                let parent_ty = self.expr_type(parent)?;
                let ty = self.expr_type(e)?;
                let p = self.lower_value(parent)?;
                let index = match (constant_index(self.arena, start), end) {
                    (Some(s), None) => ElementIndex::Fixed {
                        start: s,
                        end: s + 1,
                    },
                    (Some(s), Some(end_expr)) => {
                        let e2 = constant_index(self.arena, end_expr).ok_or_else(|| {
                            LowerError::Unsupported("slices need constant bounds".into())
                        })?;
                        ElementIndex::Fixed { start: s, end: e2 }
                    }
                    (None, None) => {
                        let idx = self.lower_value(start)?;
                        let idx = self.wrap_dynamic_index(idx, &parent_ty);
                        ElementIndex::Dynamic(Box::new(idx))
                    }
                    (None, Some(_)) => {
                        return Err(LowerError::Unsupported(
                            "slices need constant bounds".into(),
                        ))
                    }
                };
                Ok(Expr::Element {
                    parent: Box::new(p),
                    index,
                    ty,
                })
            }

            ExprKind::StructMember { parent, member } => {
                let ty = self.expr_type(e)?;
                let p = self.lower_value(parent)?;
                Ok(Expr::Member {
                    parent: Box::new(p),
                    member: self.arena.name(member).to_string(),
                    ty,
                })
            }

            ExprKind::ProcessorProperty(p) => Ok(Expr::ProcessorProperty(p.into())),

            ExprKind::WriteToEndpoint { target, value } => {
                self.lower_write(target, value)?;
                Err(LowerError::Unsupported(
                    "an endpoint write has no value".into(),
                ))
            }

            ExprKind::CommaList(_) => Err(LowerError::Unresolved(
                "a bare list has no value; it must be cast to an aggregate type".into(),
            )),

            other => Err(LowerError::Unresolved(format!(
                "expression was not resolved: {other:?}"
            ))),
        }
    }

    fn lower_call_args(
        &mut self,
        function: FunctionId,
        args: &[ExprId],
    ) -> Result<(IrFnId, Vec<Expr>), LowerError> {
        let ir_fn = *self
            .ctx
            .fn_map
            .get(&function)
            .ok_or_else(|| LowerError::Internal("call to a function that was not lowered".into()))?;
        let param_types: Vec<Type> = self
            .arena
            .function(function)
            .parameters
            .iter()
            .filter_map(|&p| self.arena.variable(p).resolved_type.clone())
            .collect();
        let mut lowered = Vec::with_capacity(args.len());
        for (i, &a) in args.iter().enumerate() {
            let v = self.lower_value(a)?;
            match param_types.get(i) {
                Some(ty) => lowered.push(self.coerce(v, &ty.remove_reference())),
                None => lowered.push(v),
            }
        }
        Ok((ir_fn, lowered))
    }

    fn lower_endpoint_read(
        &mut self,
        endpoint: EndpointId,
        element: Option<Expr>,
    ) -> Result<Expr, LowerError> {
        let decl = self.arena.endpoint(endpoint);
        if decl.is_output() {
            return Err(LowerError::Unsupported("outputs cannot be read".into()));
        }
        let &(is_input, index) = self
            .ctx
            .endpoint_map
            .get(&endpoint)
            .ok_or_else(|| LowerError::Internal("endpoint was not lowered".into()))?;
        debug_assert!(is_input);
        let Some(types) = &decl.resolved_types else {
            return Err(LowerError::Unresolved("endpoint type".into()));
        };
        let single = types
            .first()
            .cloned()
            .ok_or_else(|| LowerError::Unresolved("endpoint type".into()))?;
        // Gangs read the whole frame array; a subscript then picks the slot.
        let element_ty = single.clone();
        let frame_ty = match decl.resolved_array_size {
            Some(n) => Type::fixed_array(single, n),
            None => single,
        };
        let temp = self.make_temp("read", frame_ty.clone());
        self.emit(Statement::ReadStream {
            target: Expr::Variable(temp),
            input: index,
        });
        match element {
            Some(idx) => {
                let idx = self.wrap_dynamic_index(idx, &frame_ty);
                Ok(Expr::Element {
                    parent: Box::new(Expr::Variable(temp)),
                    index: ElementIndex::Dynamic(Box::new(idx)),
                    ty: element_ty,
                })
            }
            None => Ok(Expr::Variable(temp)),
        }
    }

    fn lower_write(&mut self, target: ExprId, value: ExprId) -> Result<(), LowerError> {
        // The target may address one slot of an endpoint gang.
        let (endpoint, element) = match self.arena.expr(target).kind.clone() {
            ExprKind::EndpointRef(e) => (e, None),
            ExprKind::ArrayElement { parent, start, .. } => {
                match self.arena.expr(parent).kind {
                    ExprKind::EndpointRef(e) => {
                        let idx = self.lower_value(start)?;
                        (e, Some(idx))
                    }
                    _ => {
                        return Err(LowerError::Unsupported(
                            "the target of '<-' must be an output endpoint".into(),
                        ))
                    }
                }
            }
            _ => {
                return Err(LowerError::Unsupported(
                    "the target of '<-' must be an output endpoint".into(),
                ))
            }
        };
        let &(is_input, index) = self
            .ctx
            .endpoint_map
            .get(&endpoint)
            .ok_or_else(|| LowerError::Internal("endpoint was not lowered".into()))?;
        if is_input {
            return Err(LowerError::Unsupported("inputs cannot be written".into()));
        }
        let value_ty = self
            .arena
            .endpoint(endpoint)
            .resolved_types
            .as_ref()
            .and_then(|t| t.first().cloned());
        let v = self.lower_value(value)?;
        let v = match value_ty {
            Some(ty) => self.coerce(v, &ty),
            None => v,
        };
        self.emit(Statement::WriteStream {
            output: index,
            element,
            value: v,
        });
        Ok(())
    }

    /// Expand `Type(a, b, c)` into per-field writes of a fresh local.
    fn lower_aggregate(&mut self, dest: &Type, items: &[ExprId]) -> Result<Expr, LowerError> {
        let temp = self.make_temp("agg", dest.clone());
        for (i, &item) in items.iter().enumerate() {
            let value = self.lower_value(item)?;
            let (target, member_ty) = if let Some(s) = dest.struct_ref() {
                let member = s
                    .members
                    .get(i)
                    .ok_or_else(|| LowerError::Internal("aggregate arity mismatch".into()))?;
                (
                    Expr::Member {
                        parent: Box::new(Expr::Variable(temp)),
                        member: member.name.clone(),
                        ty: member.ty.clone(),
                    },
                    member.ty.clone(),
                )
            } else {
                let element_ty = dest
                    .element_type()
                    .ok_or_else(|| LowerError::Internal("aggregate over a scalar".into()))?;
                (
                    Expr::Element {
                        parent: Box::new(Expr::Variable(temp)),
                        index: ElementIndex::Fixed {
                            start: i as u32,
                            end: i as u32 + 1,
                        },
                        ty: element_ty.clone(),
                    },
                    element_ty,
                )
            };
            let value = self.coerce(value, &member_ty);
            self.emit(Statement::Assign {
                target,
                source: value,
            });
        }
        Ok(Expr::Variable(temp))
    }

    /// Insert a cast when the value's type differs from what is needed.
    fn coerce(&mut self, value: Expr, wanted: &Type) -> Expr {
        let current = self.type_of_ir(&value);
        match current {
            Some(t)
                if t.is_equal(
                    wanted,
                    sonance_ast::types::EqualityFlags::IGNORE_CONST_AND_REF,
                ) =>
            {
                value
            }
            _ => {
                if wanted.is_void() {
                    return value;
                }
                match &value {
                    Expr::Constant(v) => match v.try_cast_to(&wanted.remove_reference().remove_const()) {
                        Some(cast) => Expr::Constant(cast),
                        None => Expr::Cast {
                            dest: wanted.remove_reference().remove_const(),
                            source: Box::new(value),
                        },
                    },
                    _ => Expr::Cast {
                        dest: wanted.remove_reference().remove_const(),
                        source: Box::new(value),
                    },
                }
            }
        }
    }

    /// Dynamic subscripts honour the bounded-int policy of the index type;
    /// a plain integer index wraps into range.
    fn wrap_dynamic_index(&mut self, index: Expr, parent_ty: &Type) -> Expr {
        let Some(size) = parent_ty.array_or_vector_size() else {
            return index;
        };
        match self.type_of_ir(&index) {
            Some(t) if t.is_bounded_int() && t.bounded_int_limit() == Some(size) => index,
            _ => Expr::Cast {
                dest: Type::bounded(sonance_ast::types::BoundedIntMode::Wrap, size),
                source: Box::new(index),
            },
        }
    }

    /// Best-effort type of an already lowered expression.
    fn type_of_ir(&self, e: &Expr) -> Option<Type> {
        match e {
            Expr::Constant(v) => Some(v.ty().clone()),
            Expr::Variable(v) => Some(self.program.variable(*v).ty.clone()),
            Expr::Binary { ty, .. }
            | Expr::Unary { ty, .. }
            | Expr::PureCall { ty, .. }
            | Expr::Element { ty, .. }
            | Expr::Member { ty, .. } => Some(ty.clone()),
            Expr::Cast { dest, .. } => Some(dest.clone()),
            Expr::ProcessorProperty(p) => Some(p.result_type()),
        }
    }

    fn expr_type(&self, e: ExprId) -> Result<Type, LowerError> {
        ast_result_type(self.arena, e)
            .ok_or_else(|| LowerError::Unresolved("expression has no type".into()))
    }
}

fn constant_index(arena: &AstArena, e: ExprId) -> Option<u32> {
    match &arena.expr(e).kind {
        ExprKind::Constant(v) if v.ty().is_integer() => {
            v.as_i64().filter(|n| *n >= 0).map(|n| n as u32)
        }
        _ => None,
    }
}

/// Result-type computation mirroring the resolver's view of the AST.
fn ast_result_type(arena: &AstArena, id: ExprId) -> Option<Type> {
    match &arena.expr(id).kind {
        ExprKind::Constant(v) => Some(v.ty().clone()),
        ExprKind::VariableRef(v) => arena.variable(*v).resolved_type.clone(),
        ExprKind::EndpointRef(e) => {
            let decl = arena.endpoint(*e);
            let single = decl.resolved_types.as_ref()?.first()?.clone();
            Some(match decl.resolved_array_size {
                Some(n) => Type::fixed_array(single, n),
                None => single,
            })
        }
        ExprKind::Binary {
            op,
            lhs,
            rhs,
            resolved_types,
        } => match resolved_types {
            Some(t) => Some(t.result.clone()),
            None => {
                let lt = ast_result_type(arena, *lhs)?;
                let rt = ast_result_type(arena, *rhs)?;
                Some(binary_op_types(*op, &lt, &rt)?.result)
            }
        },
        ExprKind::Unary { op, operand } => {
            unary_op_type(*op, &ast_result_type(arena, *operand)?)
        }
        ExprKind::Ternary { true_value, .. } => ast_result_type(arena, *true_value),
        ExprKind::Assignment { target, .. } => ast_result_type(arena, *target),
        ExprKind::PreOrPostIncDec { target, .. } => ast_result_type(arena, *target),
        ExprKind::FunctionCall { function, .. } => {
            arena.function(*function).resolved_return_type.clone()
        }
        ExprKind::TypeCast { dest, .. } => Some(dest.clone()),
        ExprKind::ArrayElement { parent, start, end } => {
            let parent_ty = ast_result_type(arena, *parent)?;
            match end {
                None => {
                    if parent_ty.is_primitive() {
                        Some(parent_ty)
                    } else {
                        parent_ty.element_type()
                    }
                }
                Some(end) => {
                    let s = constant_index(arena, *start)?;
                    let e = constant_index(arena, *end)?;
                    (e > s).then(|| parent_ty.with_array_size(e - s))
                }
            }
        }
        ExprKind::StructMember { parent, member } => {
            let parent_ty = ast_result_type(arena, *parent)?;
            let s = parent_ty.struct_ref()?;
            let index = s.member_index(arena.name(*member))?;
            Some(s.member_type(index).clone())
        }
        ExprKind::ProcessorProperty(p) => Some(p.result_type()),
        _ => None,
    }
}
