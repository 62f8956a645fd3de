//! Text rendering of a lowered program.
//!
//! Used for debugging dumps, tests and the program hash; the output is
//! deterministic for a given program.

use crate::function::{
    Block, ElementIndex, Expr, IrFunction, Statement, Terminator,
};
use crate::program::{Module, Program};

pub fn print_program(program: &Program) -> String {
    let mut out = String::new();
    for module in &program.modules {
        print_module(program, module, &mut out);
    }
    out
}

fn print_module(program: &Program, module: &Module, out: &mut String) {
    let kind = match module.kind {
        sonance_ast::ast::ModuleKind::Namespace => "namespace",
        sonance_ast::ast::ModuleKind::Processor => "processor",
        sonance_ast::ast::ModuleKind::Graph => "graph",
    };
    out.push_str(&format!("{kind} {}\n", module.full_name));

    for e in &module.inputs {
        out.push_str(&format!(
            "  input {:?} {} {}\n",
            e.kind,
            e.name,
            e.data_types
                .iter()
                .map(|t| t.description())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    for e in &module.outputs {
        out.push_str(&format!(
            "  output {:?} {} {}\n",
            e.kind,
            e.name,
            e.data_types
                .iter()
                .map(|t| t.description())
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    for i in &module.instances {
        out.push_str(&format!(
            "  node {} = {} * {} / {} [{}]\n",
            i.instance_name, i.source_module, i.clock_multiplier, i.clock_divider, i.array_size
        ));
    }
    for c in &module.connections {
        out.push_str(&format!(
            "  connection {}{} -> [{}] -> {}{}\n",
            end_name(&c.source_instance, &c.source_endpoint),
            index_suffix(&c.source_endpoint_index),
            c.delay_length,
            end_name(&c.dest_instance, &c.dest_endpoint),
            index_suffix(&c.dest_endpoint_index),
        ));
    }
    for &v in &module.state_variables {
        let var = program.variable(v);
        out.push_str(&format!(
            "  state {} : {}\n",
            var.name,
            var.ty.description()
        ));
    }
    for s in &module.structs {
        out.push_str(&format!("  struct {}\n", s.name));
        for m in &s.members {
            out.push_str(&format!("    {} : {}\n", m.name, m.ty.description()));
        }
    }
    for &f in &module.functions {
        print_function(program, program.function(f), out);
    }
    out.push('\n');
}

fn end_name(instance: &Option<String>, endpoint: &str) -> String {
    match instance {
        Some(i) => format!("{i}.{endpoint}"),
        None => endpoint.to_string(),
    }
}

fn index_suffix(index: &Option<u32>) -> String {
    match index {
        Some(i) => format!("[{i}]"),
        None => String::new(),
    }
}

fn print_function(program: &Program, f: &IrFunction, out: &mut String) {
    let params: Vec<String> = f
        .parameters
        .iter()
        .map(|&p| {
            let v = program.variable(p);
            format!("{} : {}", v.name, v.ty.description())
        })
        .collect();
    out.push_str(&format!(
        "  fn {} ({}) -> {}\n",
        f.name,
        params.join(", "),
        f.return_type.description()
    ));
    for (i, b) in f.blocks.iter().enumerate() {
        print_block(program, i, b, out);
    }
}

fn print_block(program: &Program, index: usize, b: &Block, out: &mut String) {
    out.push_str(&format!("  @{}({}):\n", index, b.name));
    for s in &b.statements {
        out.push_str(&format!("    {}\n", print_statement(program, s)));
    }
    out.push_str(&format!("    {}\n", print_terminator(program, &b.terminator)));
}

fn print_statement(program: &Program, s: &Statement) -> String {
    match s {
        Statement::Assign { target, source } => format!(
            "{} = {}",
            print_expr(program, target),
            print_expr(program, source)
        ),
        Statement::Call {
            target,
            function,
            args,
        } => {
            let args: Vec<String> = args.iter().map(|a| print_expr(program, a)).collect();
            let call = format!("call {} ({})", program.function(*function).name, args.join(", "));
            match target {
                Some(t) => format!("{} = {}", print_expr(program, t), call),
                None => call,
            }
        }
        Statement::ReadStream { target, input } => {
            format!("{} = read in#{input}", print_expr(program, target))
        }
        Statement::WriteStream {
            output,
            element,
            value,
        } => match element {
            Some(e) => format!(
                "write out#{output}[{}] {}",
                print_expr(program, e),
                print_expr(program, value)
            ),
            None => format!("write out#{output} {}", print_expr(program, value)),
        },
        Statement::AdvanceClock => "advance".to_string(),
    }
}

fn print_terminator(program: &Program, t: &Terminator) -> String {
    match t {
        Terminator::Branch(b) => format!("branch @{b}"),
        Terminator::BranchIf {
            condition,
            true_block,
            false_block,
        } => format!(
            "branch_if {} ? @{true_block} : @{false_block}",
            print_expr(program, condition)
        ),
        Terminator::ReturnVoid => "return".to_string(),
        Terminator::ReturnValue(v) => format!("return {}", print_expr(program, v)),
    }
}

fn print_expr(program: &Program, e: &Expr) -> String {
    match e {
        Expr::Constant(v) => program.describe_value(v),
        Expr::Variable(v) => {
            let var = program.variable(*v);
            if var.name.is_empty() {
                format!("%{}", v.0)
            } else {
                format!("%{}", var.name)
            }
        }
        Expr::Binary { op, lhs, rhs, .. } => format!(
            "({} {} {})",
            print_expr(program, lhs),
            op.symbol(),
            print_expr(program, rhs)
        ),
        Expr::Unary { op, source, .. } => {
            format!("{}{}", op.symbol(), print_expr(program, source))
        }
        Expr::Cast { dest, source } => format!(
            "cast<{}> ({})",
            dest.description(),
            print_expr(program, source)
        ),
        Expr::PureCall { function, args, .. } => {
            let args: Vec<String> = args.iter().map(|a| print_expr(program, a)).collect();
            format!("{} ({})", program.function(*function).name, args.join(", "))
        }
        Expr::Element { parent, index, .. } => match index {
            ElementIndex::Fixed { start, end } if *end == start + 1 => {
                format!("{}[{start}]", print_expr(program, parent))
            }
            ElementIndex::Fixed { start, end } => {
                format!("{}[{start}:{end}]", print_expr(program, parent))
            }
            ElementIndex::Dynamic(i) => {
                format!("{}[{}]", print_expr(program, parent), print_expr(program, i))
            }
        },
        Expr::Member { parent, member, .. } => {
            format!("{}.{member}", print_expr(program, parent))
        }
        Expr::ProcessorProperty(p) => format!("processor.{}", p.name()),
    }
}
