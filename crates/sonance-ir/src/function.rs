//! Functions, blocks, statements and expressions of the lowered form.
//!
//! A function is an ordered list of basic blocks; each block is a straight
//! line of statements ended by exactly one terminator. Expressions are owned
//! trees, small enough to clone when the inliner duplicates a callee.

use serde::{Deserialize, Serialize};
use sonance_ast::ast::ProcessorPropertyKind;
use sonance_ast::foundation::Annotation;
use sonance_ast::types::{BinaryOp, Type, UnaryOp, Value};

/// Id of a variable in the program-wide variable arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IrVarId(pub u32);

/// Id of a function in the program-wide function arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IrFnId(pub u32);

/// Index of a block within one function.
pub type BlockId = usize;

/// What a variable is to the function that touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarRole {
    /// Module state, alive across frames.
    State,
    /// Function-local, assigned freely.
    MutableLocal,
    /// Function-local with a single defining write.
    Constant,
    Parameter,
    /// State supplied by the host before linking.
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrVariable {
    pub name: String,
    pub ty: Type,
    pub role: VarRole,
    pub annotation: Annotation,
    /// Read/write counts, rebuilt on demand by the optimiser.
    pub reads: u32,
    pub writes: u32,
}

impl IrVariable {
    pub fn new(name: impl Into<String>, ty: Type, role: VarRole) -> Self {
        Self {
            name: name.into(),
            ty,
            role,
            annotation: Annotation::new(),
            reads: 0,
            writes: 0,
        }
    }

    pub fn is_state(&self) -> bool {
        matches!(self.role, VarRole::State | VarRole::External)
    }

    pub fn is_function_local(&self) -> bool {
        matches!(self.role, VarRole::MutableLocal | VarRole::Constant)
    }
}

/// What kind of special function this is to its processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IrFunctionKind {
    Normal,
    Run,
    Init,
    Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrFunction {
    pub name: String,
    pub kind: IrFunctionKind,
    pub return_type: Type,
    pub parameters: Vec<IrVarId>,
    pub blocks: Vec<Block>,
    pub annotation: Annotation,
    /// Exported functions are roots for dead-code removal.
    pub is_exported: bool,
}

impl IrFunction {
    /// Rebuild every block's predecessor list.
    pub fn rebuild_predecessors(&mut self) {
        for b in &mut self.blocks {
            b.predecessors.clear();
        }
        for i in 0..self.blocks.len() {
            for dest in self.blocks[i].terminator.destinations() {
                if !self.blocks[dest].predecessors.contains(&i) {
                    self.blocks[dest].predecessors.push(i);
                }
            }
        }
    }

    /// Visit every expression in the function, reads and writes alike.
    pub fn visit_exprs(&self, mut f: impl FnMut(&Expr, Access)) {
        for b in &self.blocks {
            for s in &b.statements {
                s.visit(&mut f);
            }
            b.terminator.visit(&mut f);
        }
    }

    /// Mutable expression visit, used for substitution.
    pub fn visit_exprs_mut(&mut self, mut f: impl FnMut(&mut Expr, Access)) {
        for b in &mut self.blocks {
            for s in &mut b.statements {
                s.visit_mut(&mut f);
            }
            b.terminator.visit_mut(&mut f);
        }
    }
}

/// A basic block: statements plus exactly one terminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub statements: Vec<Statement>,
    pub terminator: Terminator,
    /// Rebuilt on demand; not meaningful after edits until rebuilt.
    pub predecessors: Vec<BlockId>,
}

impl Block {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            statements: Vec::new(),
            terminator: Terminator::ReturnVoid,
            predecessors: Vec::new(),
        }
    }
}

/// Whether a visit sees an expression as a destination or a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Statement {
    Assign {
        target: Expr,
        source: Expr,
    },
    /// A call whose result may be stored or discarded.
    Call {
        target: Option<Expr>,
        function: IrFnId,
        args: Vec<Expr>,
    },
    /// Read the next frame of an input endpoint into `target`.
    ReadStream {
        target: Expr,
        input: usize,
    },
    /// Write a value (or one gang element) to an output endpoint.
    WriteStream {
        output: usize,
        element: Option<Expr>,
        value: Expr,
    },
    AdvanceClock,
}

impl Statement {
    pub fn visit(&self, f: &mut impl FnMut(&Expr, Access)) {
        match self {
            Statement::Assign { target, source } => {
                target.visit(f, Access::Write);
                source.visit(f, Access::Read);
            }
            Statement::Call { target, args, .. } => {
                if let Some(t) = target {
                    t.visit(f, Access::Write);
                }
                for a in args {
                    a.visit(f, Access::Read);
                }
            }
            Statement::ReadStream { target, .. } => target.visit(f, Access::Write),
            Statement::WriteStream { element, value, .. } => {
                if let Some(e) = element {
                    e.visit(f, Access::Read);
                }
                value.visit(f, Access::Read);
            }
            Statement::AdvanceClock => {}
        }
    }

    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Expr, Access)) {
        match self {
            Statement::Assign { target, source } => {
                target.visit_mut(f, Access::Write);
                source.visit_mut(f, Access::Read);
            }
            Statement::Call { target, args, .. } => {
                if let Some(t) = target {
                    t.visit_mut(f, Access::Write);
                }
                for a in args {
                    a.visit_mut(f, Access::Read);
                }
            }
            Statement::ReadStream { target, .. } => target.visit_mut(f, Access::Write),
            Statement::WriteStream { element, value, .. } => {
                if let Some(e) = element {
                    e.visit_mut(f, Access::Read);
                }
                value.visit_mut(f, Access::Read);
            }
            Statement::AdvanceClock => {}
        }
    }

    /// Streams, clock advances and calls into effectful functions touch the
    /// world outside the function.
    pub fn is_effectful_shape(&self) -> bool {
        matches!(
            self,
            Statement::ReadStream { .. } | Statement::WriteStream { .. } | Statement::AdvanceClock
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Terminator {
    Branch(BlockId),
    BranchIf {
        condition: Expr,
        true_block: BlockId,
        false_block: BlockId,
    },
    ReturnVoid,
    ReturnValue(Expr),
}

impl Terminator {
    pub fn destinations(&self) -> Vec<BlockId> {
        match self {
            Terminator::Branch(b) => vec![*b],
            Terminator::BranchIf {
                true_block,
                false_block,
                ..
            } => vec![*true_block, *false_block],
            Terminator::ReturnVoid | Terminator::ReturnValue(_) => Vec::new(),
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, Terminator::BranchIf { .. })
    }

    pub fn is_return(&self) -> bool {
        matches!(self, Terminator::ReturnVoid | Terminator::ReturnValue(_))
    }

    /// Redirect every edge to `from` so it points at `to`.
    pub fn replace_destination(&mut self, from: BlockId, to: BlockId) {
        match self {
            Terminator::Branch(b) => {
                if *b == from {
                    *b = to;
                }
            }
            Terminator::BranchIf {
                true_block,
                false_block,
                ..
            } => {
                if *true_block == from {
                    *true_block = to;
                }
                if *false_block == from {
                    *false_block = to;
                }
            }
            _ => {}
        }
    }

    pub fn visit(&self, f: &mut impl FnMut(&Expr, Access)) {
        match self {
            Terminator::BranchIf { condition, .. } => condition.visit(f, Access::Read),
            Terminator::ReturnValue(v) => v.visit(f, Access::Read),
            _ => {}
        }
    }

    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Expr, Access)) {
        match self {
            Terminator::BranchIf { condition, .. } => condition.visit_mut(f, Access::Read),
            Terminator::ReturnValue(v) => v.visit_mut(f, Access::Read),
            _ => {}
        }
    }
}

/// Index into an array or vector element access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ElementIndex {
    /// `[start, end)`; a single element has `end == start + 1`.
    Fixed { start: u32, end: u32 },
    Dynamic(Box<Expr>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Constant(Value),
    Variable(IrVarId),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        ty: Type,
    },
    Unary {
        op: UnaryOp,
        source: Box<Expr>,
        ty: Type,
    },
    Cast {
        dest: Type,
        source: Box<Expr>,
    },
    /// Call to a side-effect-free function, usable inside expressions.
    PureCall {
        function: IrFnId,
        args: Vec<Expr>,
        ty: Type,
    },
    Element {
        parent: Box<Expr>,
        index: ElementIndex,
        ty: Type,
    },
    Member {
        parent: Box<Expr>,
        member: String,
        ty: Type,
    },
    ProcessorProperty(SerializableProperty),
}

/// `ProcessorPropertyKind` mirrored locally so the IR stays serialisable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerializableProperty {
    Period,
    Frequency,
    Id,
    Session,
}

impl From<ProcessorPropertyKind> for SerializableProperty {
    fn from(p: ProcessorPropertyKind) -> Self {
        match p {
            ProcessorPropertyKind::Period => Self::Period,
            ProcessorPropertyKind::Frequency => Self::Frequency,
            ProcessorPropertyKind::Id => Self::Id,
            ProcessorPropertyKind::Session => Self::Session,
        }
    }
}

impl SerializableProperty {
    pub fn result_type(self) -> Type {
        match self {
            Self::Period | Self::Frequency => Type::float64(),
            Self::Id | Self::Session => Type::int32(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Period => "period",
            Self::Frequency => "frequency",
            Self::Id => "id",
            Self::Session => "session",
        }
    }
}

impl Expr {
    /// The variable at the root of an lvalue chain, if any.
    pub fn root_variable(&self) -> Option<IrVarId> {
        match self {
            Expr::Variable(v) => Some(*v),
            Expr::Element { parent, .. } | Expr::Member { parent, .. } => parent.root_variable(),
            _ => None,
        }
    }

    /// The constant this expression is, if it is one.
    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Expr::Constant(v) => Some(v),
            _ => None,
        }
    }

    pub fn visit(&self, f: &mut impl FnMut(&Expr, Access), access: Access) {
        match self {
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit(f, Access::Read);
                rhs.visit(f, Access::Read);
            }
            Expr::Unary { source, .. } | Expr::Cast { source, .. } => {
                source.visit(f, Access::Read);
            }
            Expr::PureCall { args, .. } => {
                for a in args {
                    a.visit(f, Access::Read);
                }
            }
            Expr::Element { parent, index, .. } => {
                if let ElementIndex::Dynamic(i) = index {
                    i.visit(f, Access::Read);
                }
                parent.visit(f, access);
            }
            Expr::Member { parent, .. } => parent.visit(f, access),
            Expr::Constant(_) | Expr::Variable(_) | Expr::ProcessorProperty(_) => {}
        }
        f(self, access);
    }

    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Expr, Access), access: Access) {
        match self {
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit_mut(f, Access::Read);
                rhs.visit_mut(f, Access::Read);
            }
            Expr::Unary { source, .. } | Expr::Cast { source, .. } => {
                source.visit_mut(f, Access::Read);
            }
            Expr::PureCall { args, .. } => {
                for a in args {
                    a.visit_mut(f, Access::Read);
                }
            }
            Expr::Element { parent, index, .. } => {
                if let ElementIndex::Dynamic(i) = index {
                    i.visit_mut(f, Access::Read);
                }
                parent.visit_mut(f, access);
            }
            Expr::Member { parent, .. } => parent.visit_mut(f, access),
            Expr::Constant(_) | Expr::Variable(_) | Expr::ProcessorProperty(_) => {}
        }
        f(self, access);
    }
}
