// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Lowered program representation for the Sonance audio DSL
//!
//! The resolved AST lowers into a Program of modules whose functions are
//! linear sequences of basic blocks. A downstream performer executes the
//! Program; the optimiser in this crate simplifies it first.

pub mod function;
pub mod lower;
pub mod optimise;
pub mod printer;
pub mod program;

pub use function::{
    Access, Block, BlockId, ElementIndex, Expr, IrFnId, IrFunction, IrFunctionKind, IrVarId,
    IrVariable, Statement, Terminator, VarRole,
};
pub use lower::{lower_compilation, LowerError};
pub use program::{
    EndpointDetails, IrConnection, IrEndpoint, IrProcessorInstance, Module, ParameterProperties,
    Program, ROOT_NAMESPACE,
};
