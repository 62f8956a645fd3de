//! Post-resolution semantic checks.

use crate::resolve::fold::constant_of;
use crate::resolve::gather_modules;
use crate::resolve::types::result_type;
use sonance_ast::ast::{
    walk, AstArena, EndpointId, EndpointKind, ExprId, ExprKind, FunctionId, FunctionKind,
    ModuleId, StmtId, VarId,
};
use sonance_ast::types::{
    can_silently_cast_to, choose_cast_target, BinaryOp, CastTargetChoice, EqualityFlags, Type,
    MAX_PACKED_OBJECT_SIZE,
};
use sonance_ast::{CompileError, ErrorKind};

/// Largest endpoint gang.
pub const MAX_ENDPOINT_ARRAY_SIZE: u32 = 256;
/// Largest processor instance gang.
pub const MAX_PROCESSOR_ARRAY_SIZE: u32 = 256;
/// Longest connection delay line, in frames.
pub const MAX_DELAY_LENGTH: i64 = 1024 * 256;
/// Largest clock multiplier or divider.
pub const MAX_CLOCK_RATIO: i64 = 512;

pub fn check(arena: &AstArena, errors: &mut Vec<CompileError>) {
    for module in gather_modules(arena) {
        check_module(arena, module, errors);
    }
}

fn check_module(arena: &AstArena, module: ModuleId, errors: &mut Vec<CompileError>) {
    let m = arena.module(module);

    for &v in &m.state_variables {
        check_variable(arena, v, false, errors);
    }
    for &s in &m.structs {
        check_struct(arena, s, errors);
    }
    for &e in &m.endpoints {
        check_endpoint(arena, e, errors);
    }
    for &i in &m.instances {
        check_instance(arena, i, errors);
    }
    for &c in &m.connections {
        check_connection_delay(arena, c, errors);
    }
    check_function_signatures(arena, module, errors);
    for &f in &m.functions {
        check_function(arena, module, f, errors);
    }
}

fn check_variable(
    arena: &AstArena,
    var: VarId,
    is_parameter: bool,
    errors: &mut Vec<CompileError>,
) {
    let decl = arena.variable(var);
    let Some(ty) = &decl.resolved_type else {
        return; // resolution already reported this
    };
    let name = arena.name(decl.name);

    if ty.is_void() {
        errors.push(CompileError::new(
            if is_parameter {
                ErrorKind::ParameterCannotBeVoid
            } else {
                ErrorKind::VariableCannotBeVoid
            },
            decl.span,
            format!("'{name}' cannot have type void"),
        ));
        return;
    }
    if ty.packed_size() > MAX_PACKED_OBJECT_SIZE {
        errors.push(CompileError::new(
            ErrorKind::TypeTooBig,
            decl.span,
            format!(
                "the type of '{name}' is {} bytes, the limit is {}",
                ty.packed_size(),
                MAX_PACKED_OBJECT_SIZE
            ),
        ));
    }
    if is_multidimensional(ty) {
        errors.push(CompileError::new(
            ErrorKind::MultidimensionalArray,
            decl.span,
            "multidimensional arrays are not supported",
        ));
    }

    // Initialiser compatibility, including constant narrowing.
    if let (Some(init), false) = (decl.initial_value, decl.declared_type.is_none()) {
        if let Some(init_ty) = result_type(arena, init) {
            let fits_by_value = constant_of(arena, init)
                .map(|v| v.can_silently_cast_to(ty))
                .unwrap_or(false);
            if !can_silently_cast_to(ty, &init_ty) && !fits_by_value {
                errors.push(CompileError::new(
                    ErrorKind::CannotImplicitlyCast,
                    decl.span,
                    format!(
                        "cannot implicitly convert '{}' to '{}'",
                        init_ty.description(),
                        ty.description()
                    ),
                ));
            }
        }
    }
}

fn is_multidimensional(ty: &Type) -> bool {
    if ty.is_array() {
        if let Some(element) = ty.element_type() {
            return element.is_array() || is_multidimensional(&element);
        }
    }
    false
}

fn check_struct(arena: &AstArena, s: sonance_ast::ast::StructId, errors: &mut Vec<CompileError>) {
    let decl = arena.structure(s);
    let Some(structure) = &decl.structure else {
        return;
    };
    for member in &structure.members {
        if member.ty.is_const {
            errors.push(CompileError::new(
                ErrorKind::MemberCannotBeConst,
                decl.span,
                format!("member '{}' cannot be const", member.name),
            ));
        }
        if is_multidimensional(&member.ty) {
            errors.push(CompileError::new(
                ErrorKind::MultidimensionalArray,
                decl.span,
                "multidimensional arrays are not supported",
            ));
        }
    }
}

fn check_endpoint(arena: &AstArena, e: EndpointId, errors: &mut Vec<CompileError>) {
    let decl = arena.endpoint(e);
    let name = arena.name(decl.name);

    if let Some(n) = decl.resolved_array_size {
        if n == 0 || n > MAX_ENDPOINT_ARRAY_SIZE {
            errors.push(CompileError::new(
                ErrorKind::IllegalEndpointArraySize,
                decl.span,
                format!("endpoint array size must be 1 to {MAX_ENDPOINT_ARRAY_SIZE}"),
            ));
        }
    }

    let Some(types) = &decl.resolved_types else {
        return;
    };

    match decl.kind {
        EndpointKind::Stream => {
            if types.len() != 1 {
                errors.push(CompileError::new(
                    ErrorKind::IllegalTypeForEndpoint,
                    decl.span,
                    format!("stream endpoint '{name}' must have exactly one type"),
                ));
            }
            if let Some(ty) = types.first() {
                let ok = ty.is_primitive() && !ty.is_void() && !ty.is_bool() || ty.is_vector();
                if !ok {
                    errors.push(CompileError::new(
                        ErrorKind::IllegalTypeForEndpoint,
                        decl.span,
                        format!(
                            "'{}' is not a valid stream type for '{name}'",
                            ty.description()
                        ),
                    ));
                }
            }
        }
        EndpointKind::Value => {
            if types.len() != 1 {
                errors.push(CompileError::new(
                    ErrorKind::IllegalTypeForEndpoint,
                    decl.span,
                    format!("value endpoint '{name}' must have exactly one type"),
                ));
            }
        }
        EndpointKind::Event => {
            // Payload types must be distinct, a 1-wide vector counting as
            // its scalar.
            for (i, a) in types.iter().enumerate() {
                for b in &types[i + 1..] {
                    if a.is_equal(b, EqualityFlags::DUCK) {
                        errors.push(CompileError::new(
                            ErrorKind::DuplicateTypesInEndpointList,
                            decl.span,
                            format!(
                                "event endpoint '{name}' lists '{}' more than once",
                                a.description()
                            ),
                        ));
                    }
                }
            }
        }
    }
}

fn check_instance(
    arena: &AstArena,
    i: sonance_ast::ast::InstanceId,
    errors: &mut Vec<CompileError>,
) {
    let decl = arena.instance(i);
    if let Some(n) = decl.resolved_array_size {
        if n == 0 || n > MAX_PROCESSOR_ARRAY_SIZE {
            errors.push(CompileError::new(
                ErrorKind::IllegalProcessorArraySize,
                decl.span,
                format!("processor array size must be 1 to {MAX_PROCESSOR_ARRAY_SIZE}"),
            ));
        }
    }
    for ratio in [decl.clock_multiplier, decl.clock_divider].into_iter().flatten() {
        match constant_of(arena, ratio).and_then(|v| {
            if v.ty().is_primitive_integer() {
                v.as_i64()
            } else {
                None
            }
        }) {
            None => {
                errors.push(CompileError::new(
                    ErrorKind::RatioMustBeInteger,
                    decl.span,
                    "clock ratios must be integer constants",
                ));
            }
            Some(n) if n < 1 || n > MAX_CLOCK_RATIO => {
                errors.push(CompileError::new(
                    ErrorKind::RatioOutOfRange,
                    decl.span,
                    format!("clock ratios must be 1 to {MAX_CLOCK_RATIO}"),
                ));
            }
            Some(n) if n & (n - 1) != 0 => {
                errors.push(CompileError::new(
                    ErrorKind::RatioMustBePowerOf2,
                    decl.span,
                    "clock ratios must be powers of 2",
                ));
            }
            Some(_) => {}
        }
    }
}

fn check_connection_delay(
    arena: &AstArena,
    c: sonance_ast::ast::ConnectionId,
    errors: &mut Vec<CompileError>,
) {
    let decl = arena.connection(c);
    if let Some(delay) = decl.resolved_delay {
        if delay < 1 {
            errors.push(CompileError::new(
                ErrorKind::DelayLineTooShort,
                decl.span,
                "delay lines must be at least 1 frame long",
            ));
        } else if delay > MAX_DELAY_LENGTH {
            errors.push(CompileError::new(
                ErrorKind::DelayLineTooLong,
                decl.span,
                format!("delay lines cannot exceed {MAX_DELAY_LENGTH} frames"),
            ));
        }
    }
}

/// Two non-generic functions may not share a name and parameter-type list.
fn check_function_signatures(arena: &AstArena, module: ModuleId, errors: &mut Vec<CompileError>) {
    let m = arena.module(module);
    let signatures: Vec<(FunctionId, String)> = m
        .functions
        .iter()
        .filter(|&&f| !arena.function(f).is_generic())
        .map(|&f| {
            let func = arena.function(f);
            let params: Vec<String> = func
                .parameters
                .iter()
                .filter_map(|&p| arena.variable(p).resolved_type.clone())
                .map(|t| t.remove_reference().remove_const().mangled_name())
                .collect();
            (f, format!("{}({})", arena.name(func.name), params.join(",")))
        })
        .collect();

    for (i, (f, sig)) in signatures.iter().enumerate() {
        for (other, other_sig) in &signatures[i + 1..] {
            if sig == other_sig {
                errors.push(
                    CompileError::new(
                        ErrorKind::DuplicateFunction,
                        arena.function(*other).span,
                        format!(
                            "'{}' is already defined with the same parameters",
                            arena.name(arena.function(*f).name)
                        ),
                    )
                    .with_label(arena.function(*f).span, "first defined here"),
                );
            }
        }
    }
}

fn check_function(
    arena: &AstArena,
    module: ModuleId,
    f: FunctionId,
    errors: &mut Vec<CompileError>,
) {
    let func = arena.function(f);
    if func.is_generic() {
        return;
    }

    for &p in &func.parameters {
        check_variable(arena, p, true, errors);
    }

    if func.kind == FunctionKind::Event {
        check_event_function(arena, module, f, errors);
    }

    let Some(body) = func.body else {
        return;
    };
    let mut stack = vec![body];
    while let Some(stmt) = stack.pop() {
        check_statement(arena, stmt, errors);
        stack.extend(walk::stmt_child_stmts(arena, stmt));
    }
    check_break_continue(arena, body, 0, errors);
}

/// `break` and `continue` are only meaningful inside a loop.
fn check_break_continue(
    arena: &AstArena,
    stmt: StmtId,
    loop_depth: usize,
    errors: &mut Vec<CompileError>,
) {
    use sonance_ast::ast::StmtKind;
    match &arena.stmt(stmt).kind {
        StmtKind::Break if loop_depth == 0 => {
            errors.push(CompileError::new(
                ErrorKind::BreakOutsideLoop,
                arena.stmt(stmt).span,
                "break must be inside a loop",
            ));
        }
        StmtKind::Continue if loop_depth == 0 => {
            errors.push(CompileError::new(
                ErrorKind::ContinueOutsideLoop,
                arena.stmt(stmt).span,
                "continue must be inside a loop",
            ));
        }
        StmtKind::Loop { .. } => {
            for child in walk::stmt_child_stmts(arena, stmt) {
                check_break_continue(arena, child, loop_depth + 1, errors);
            }
        }
        _ => {
            for child in walk::stmt_child_stmts(arena, stmt) {
                check_break_continue(arena, child, loop_depth, errors);
            }
        }
    }
}

/// Event handlers are named after an input event endpoint and take either
/// `(payload)` or, for endpoint gangs, `(index, payload)`.
fn check_event_function(
    arena: &AstArena,
    module: ModuleId,
    f: FunctionId,
    errors: &mut Vec<CompileError>,
) {
    let func = arena.function(f);
    let name = arena.name(func.name).to_string();

    let endpoint = arena.module(module).endpoints.iter().copied().find(|&e| {
        let d = arena.endpoint(e);
        d.is_input() && d.kind == EndpointKind::Event && arena.name(d.name) == name
    });
    let Some(endpoint) = endpoint else {
        errors.push(CompileError::new(
            ErrorKind::NoSuchInputEvent,
            func.span,
            format!("there is no input event endpoint called '{name}'"),
        ));
        return;
    };
    let decl = arena.endpoint(endpoint);
    let Some(event_types) = decl.resolved_types.clone() else {
        return;
    };

    let payload_param = match func.parameters.len() {
        1 => Some(func.parameters[0]),
        2 => {
            let index_ty = arena.variable(func.parameters[0]).resolved_type.clone();
            if decl.resolved_array_size.is_none()
                || !index_ty.map(|t| t.is_integer()).unwrap_or(false)
            {
                errors.push(CompileError::new(
                    ErrorKind::EventFunctionInvalidArguments,
                    func.span,
                    format!("'{name}' must take (index, payload) for an endpoint array"),
                ));
                None
            } else {
                Some(func.parameters[1])
            }
        }
        0 if event_types.iter().any(|t| t.is_void()) => None,
        _ => {
            errors.push(CompileError::new(
                ErrorKind::EventFunctionInvalidArguments,
                func.span,
                format!("'{name}' must take a payload argument"),
            ));
            None
        }
    };

    if let Some(p) = payload_param {
        if let Some(ty) = &arena.variable(p).resolved_type {
            let bare = ty.remove_reference().remove_const();
            let matches_one = event_types
                .iter()
                .any(|t| t.is_equal(&bare, EqualityFlags::DUCK));
            if !matches_one {
                errors.push(CompileError::new(
                    ErrorKind::EventFunctionInvalidType,
                    func.span,
                    format!(
                        "'{name}' takes '{}', which is not one of the endpoint's types",
                        bare.description()
                    ),
                ));
            }
        }
    }
}

fn check_statement(arena: &AstArena, stmt: StmtId, errors: &mut Vec<CompileError>) {
    for root in walk::stmt_child_exprs(arena, stmt) {
        let mut exprs = Vec::new();
        walk::collect_exprs(arena, root, &mut exprs);
        check_inc_dec_collisions(arena, &exprs, errors);
        for id in exprs {
            check_expr(arena, id, errors);
        }
    }
}

fn check_expr(arena: &AstArena, id: ExprId, errors: &mut Vec<CompileError>) {
    let span = arena.expr(id).span;
    match &arena.expr(id).kind {
        ExprKind::StaticAssertion { condition, message } => {
            match constant_of(arena, *condition).and_then(|v| v.as_bool()) {
                Some(true) => {}
                Some(false) => {
                    let text = message
                        .clone()
                        .unwrap_or_else(|| "static assertion failed".to_string());
                    errors.push(CompileError::new(
                        ErrorKind::StaticAssertionFailure,
                        span,
                        text,
                    ));
                }
                None => {
                    errors.push(CompileError::new(
                        ErrorKind::ExpectedConstant,
                        span,
                        "static assertion conditions must be compile-time constants",
                    ));
                }
            }
        }

        ExprKind::WriteToEndpoint { target, value } => {
            check_endpoint_write(arena, span, *target, *value, errors);
        }

        ExprKind::EndpointRef(e) => {
            // A bare output reference is only legal as a write target.
            let decl = arena.endpoint(*e);
            if decl.is_output() && !is_write_target(arena, id) {
                errors.push(CompileError::new(
                    ErrorKind::CannotReadFromOutput,
                    span,
                    format!(
                        "output '{}' cannot be read",
                        arena.name(decl.name)
                    ),
                ));
            }
        }

        ExprKind::Binary { op, lhs, rhs, .. } if op.is_comparison() => {
            check_provable_comparison(arena, span, *op, *lhs, *rhs, errors);
        }

        ExprKind::ArrayElement {
            start,
            end: Some(end),
            ..
        } => {
            let both_const = constant_of(arena, *start).is_some() && constant_of(arena, *end).is_some();
            if !both_const {
                errors.push(CompileError::new(
                    ErrorKind::NotYetImplemented,
                    span,
                    "slices with non-constant bounds are not supported",
                ));
            }
        }

        _ => {}
    }
}

/// Find whether an endpoint reference is (part of) the target of a write.
fn is_write_target(arena: &AstArena, endpoint_ref: ExprId) -> bool {
    for expr in &arena.exprs {
        if let ExprKind::WriteToEndpoint { target, .. } = &expr.kind {
            let mut t = *target;
            loop {
                if t == endpoint_ref {
                    return true;
                }
                match &arena.expr(t).kind {
                    ExprKind::ArrayElement { parent, .. } => t = *parent,
                    _ => break,
                }
            }
        }
    }
    false
}

fn check_endpoint_write(
    arena: &AstArena,
    span: sonance_ast::foundation::Span,
    target: ExprId,
    value: ExprId,
    errors: &mut Vec<CompileError>,
) {
    // The target is an endpoint ref, possibly behind an array subscript.
    let mut t = target;
    let endpoint = loop {
        match &arena.expr(t).kind {
            ExprKind::EndpointRef(e) => break Some(*e),
            ExprKind::ArrayElement { parent, .. } => t = *parent,
            _ => break None,
        }
    };
    let Some(endpoint) = endpoint else {
        errors.push(CompileError::new(
            ErrorKind::ExpectedValue,
            span,
            "the target of '<-' must be an output endpoint",
        ));
        return;
    };
    let decl = arena.endpoint(endpoint);
    if decl.is_input() {
        errors.push(CompileError::new(
            ErrorKind::CannotWriteToInput,
            span,
            format!("input '{}' cannot be written", arena.name(decl.name)),
        ));
        return;
    }
    let Some(candidates) = decl.resolved_types.clone() else {
        return;
    };
    let Some(value_ty) = result_type(arena, value) else {
        return;
    };
    let fits_by_value = constant_of(arena, value)
        .map(|v| candidates.iter().any(|c| v.can_silently_cast_to(c)))
        .unwrap_or(false);
    match choose_cast_target(&candidates, &value_ty) {
        CastTargetChoice::Unique(_) => {}
        CastTargetChoice::NonePossible if fits_by_value => {}
        CastTargetChoice::NonePossible => {
            errors.push(CompileError::new(
                ErrorKind::CannotImplicitlyCast,
                span,
                format!(
                    "cannot implicitly convert '{}' to any type of endpoint '{}'",
                    value_ty.description(),
                    arena.name(decl.name)
                ),
            ));
        }
        CastTargetChoice::Ambiguous(_) => {
            errors.push(CompileError::new(
                ErrorKind::AmbiguousCast,
                span,
                format!(
                    "'{}' matches more than one type of endpoint '{}'",
                    value_ty.description(),
                    arena.name(decl.name)
                ),
            ));
        }
    }
}

/// Comparing a bounded-int against a constant outside its range is always
/// true or always false, which is a provable mistake.
fn check_provable_comparison(
    arena: &AstArena,
    span: sonance_ast::foundation::Span,
    op: BinaryOp,
    lhs: ExprId,
    rhs: ExprId,
    errors: &mut Vec<CompileError>,
) {
    let (range, constant, flipped) = match (
        result_type(arena, lhs).filter(|t| t.is_bounded_int()),
        constant_of(arena, rhs).and_then(|v| v.as_i64()),
        result_type(arena, rhs).filter(|t| t.is_bounded_int()),
        constant_of(arena, lhs).and_then(|v| v.as_i64()),
    ) {
        (Some(ty), Some(c), _, _) => (ty, c, false),
        (_, _, Some(ty), Some(c)) => (ty, c, true),
        _ => return,
    };
    let limit = range.bounded_int_limit().unwrap_or(0) as i64;
    let (lo, hi) = (0i64, limit - 1);

    // Normalise to `bounded <op> constant`.
    let op = if flipped {
        match op {
            BinaryOp::LessThan => BinaryOp::GreaterThan,
            BinaryOp::LessThanOrEqual => BinaryOp::GreaterThanOrEqual,
            BinaryOp::GreaterThan => BinaryOp::LessThan,
            BinaryOp::GreaterThanOrEqual => BinaryOp::LessThanOrEqual,
            other => other,
        }
    } else {
        op
    };

    let verdict = match op {
        BinaryOp::LessThan => {
            if hi < constant {
                Some(true)
            } else if lo >= constant {
                Some(false)
            } else {
                None
            }
        }
        BinaryOp::LessThanOrEqual => {
            if hi <= constant {
                Some(true)
            } else if lo > constant {
                Some(false)
            } else {
                None
            }
        }
        BinaryOp::GreaterThan => {
            if lo > constant {
                Some(true)
            } else if hi <= constant {
                Some(false)
            } else {
                None
            }
        }
        BinaryOp::GreaterThanOrEqual => {
            if lo >= constant {
                Some(true)
            } else if hi < constant {
                Some(false)
            } else {
                None
            }
        }
        BinaryOp::Equals => {
            if constant < lo || constant > hi {
                Some(false)
            } else {
                None
            }
        }
        BinaryOp::NotEquals => {
            if constant < lo || constant > hi {
                Some(true)
            } else {
                None
            }
        }
        _ => None,
    };

    match verdict {
        Some(true) => errors.push(CompileError::new(
            ErrorKind::ComparisonAlwaysTrue,
            span,
            format!(
                "this comparison is always true: the range is {lo} to {hi}, the constant is {constant}"
            ),
        )),
        Some(false) => errors.push(CompileError::new(
            ErrorKind::ComparisonAlwaysFalse,
            span,
            format!(
                "this comparison is always false: the range is {lo} to {hi}, the constant is {constant}"
            ),
        )),
        None => {}
    }
}

/// A variable may not be read and pre/post-incremented in one statement.
fn check_inc_dec_collisions(
    arena: &AstArena,
    statement_exprs: &[ExprId],
    errors: &mut Vec<CompileError>,
) {
    let mut inc_dec_targets: Vec<(VarId, ExprId)> = Vec::new();
    for &id in statement_exprs {
        if let ExprKind::PreOrPostIncDec { target, .. } = &arena.expr(id).kind {
            if let Some(v) = root_variable(arena, *target) {
                inc_dec_targets.push((v, *target));
            }
        }
    }
    if inc_dec_targets.is_empty() {
        return;
    }
    for &id in statement_exprs {
        if let ExprKind::VariableRef(v) = &arena.expr(id).kind {
            for &(target_var, target_expr) in &inc_dec_targets {
                // The operand of the ++/-- itself does not collide.
                if *v == target_var && id != target_expr && !is_beneath(arena, target_expr, id) {
                    errors.push(CompileError::new(
                        ErrorKind::PreIncDecCollision,
                        arena.expr(id).span,
                        "a variable cannot be modified by '++' or '--' and used again in the same statement",
                    ));
                    return;
                }
            }
        }
    }
}

fn root_variable(arena: &AstArena, mut id: ExprId) -> Option<VarId> {
    loop {
        match &arena.expr(id).kind {
            ExprKind::VariableRef(v) => return Some(*v),
            ExprKind::ArrayElement { parent, .. }
            | ExprKind::StructMember { parent, .. } => id = *parent,
            _ => return None,
        }
    }
}

fn is_beneath(arena: &AstArena, root: ExprId, needle: ExprId) -> bool {
    if root == needle {
        return true;
    }
    walk::expr_children(&arena.expr(root).kind)
        .into_iter()
        .any(|c| is_beneath(arena, c, needle))
}
