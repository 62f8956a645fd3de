//! Statement nodes.

use super::{ExprId, ScopeId, StmtId, VarId};
use crate::foundation::Span;

#[derive(Debug, Clone)]
pub struct Stmt {
    pub span: Span,
    pub scope: ScopeId,
    pub kind: StmtKind,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    /// `{ ... }`; opens its own scope for local declarations.
    Block {
        body_scope: ScopeId,
        statements: Vec<StmtId>,
    },
    /// Expression evaluated for its effect (assignments, calls, writes).
    Expression(ExprId),
    If {
        condition: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
        /// `const if`: the condition must fold and the dead arm is dropped
        /// during lowering.
        is_const: bool,
    },
    /// All loop forms. `while (c)` has only a condition; `for` adds
    /// initialiser and iterator; `loop (n)` has a count; `do ... while` sets
    /// `is_do_while`.
    Loop {
        initialiser: Option<StmtId>,
        condition: Option<ExprId>,
        iterator: Option<StmtId>,
        count: Option<ExprId>,
        body: StmtId,
        is_do_while: bool,
    },
    Return(Option<ExprId>),
    Break,
    Continue,
    Noop,
    VariableDeclaration(VarId),
}

impl Stmt {
    pub fn new(span: Span, scope: ScopeId, kind: StmtKind) -> Self {
        Self { span, scope, kind }
    }
}
