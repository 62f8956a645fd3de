//! Compile-time diagnostics.
//!
//! Every failure in the pipeline surfaces as a [`CompileError`]: a kind, a
//! severity, a primary span and a message, plus optional secondary labels and
//! notes. Errors accumulate into a [`CompileMessageList`] that the caller
//! drains; the first error aborts compilation.

use crate::foundation::{SourceMap, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub span: Span,
    pub message: String,
    /// Related code locations ("first declared here", call sites, ...)
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
}

/// Category of diagnostic, named after what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    // Name resolution
    UnresolvedSymbol,
    AmbiguousSymbol,
    DuplicateName,
    DuplicateFunction,

    // Casting
    CannotCast,
    CannotImplicitlyCast,
    AmbiguousCast,

    // Types and declarations
    ExpectedValue,
    ExpectedType,
    ExpectedConstant,
    VariableCannotBeVoid,
    ParameterCannotBeVoid,
    MemberCannotBeConst,
    TypeContainsItself,
    RecursiveTypes,
    TypeTooBig,
    CannotTakeSizeOfType,
    WrongNumberOfArgsForAggregate,
    IllegalArraySize,
    NonIntegerArraySize,
    NonConstArraySize,
    IndexOutOfRange,
    MultidimensionalArray,

    // Processors and graphs
    ProcessorNeedsOutput,
    ProcessorNeedsRunFunction,
    MultipleRunFunctions,
    FunctionMustBeVoid,
    FunctionHasParams,
    RecursiveGraph,
    FeedbackInGraph,
    DelayLineTooShort,
    DelayLineTooLong,
    DelayLineNotInteger,
    RatioMustBeInteger,
    RatioMustBePowerOf2,
    RatioOutOfRange,
    IllegalProcessorArraySize,
    IllegalEndpointArraySize,

    // Endpoints and events
    IllegalTypeForEndpoint,
    DuplicateTypesInEndpointList,
    EventFunctionInvalidType,
    EventFunctionInvalidArguments,
    NoSuchInputEvent,
    CannotReadFromOutput,
    CannotWriteToInput,

    // Statements and expressions
    StaticAssertionFailure,
    PreIncDecCollision,
    ComparisonAlwaysTrue,
    ComparisonAlwaysFalse,
    BreakOutsideLoop,
    ContinueOutsideLoop,
    DuplicateAnnotationKey,

    // Resolution machinery
    ResolutionDidNotConverge,
    NotYetImplemented,
    Internal,
}

impl ErrorKind {
    /// Short lower-case description used in rendered diagnostics.
    pub fn description(self) -> &'static str {
        use ErrorKind::*;
        match self {
            UnresolvedSymbol => "unresolved symbol",
            AmbiguousSymbol => "ambiguous symbol",
            DuplicateName => "duplicate name",
            DuplicateFunction => "duplicate function",
            CannotCast => "cannot cast",
            CannotImplicitlyCast => "cannot implicitly cast",
            AmbiguousCast => "ambiguous cast",
            ExpectedValue => "expected a value",
            ExpectedType => "expected a type",
            ExpectedConstant => "expected a constant",
            VariableCannotBeVoid => "variable cannot be void",
            ParameterCannotBeVoid => "parameter cannot be void",
            MemberCannotBeConst => "member cannot be const",
            TypeContainsItself => "type contains itself",
            RecursiveTypes => "recursive types",
            TypeTooBig => "type too big",
            CannotTakeSizeOfType => "cannot take size of type",
            WrongNumberOfArgsForAggregate => "wrong number of arguments for aggregate",
            IllegalArraySize => "illegal array size",
            NonIntegerArraySize => "non-integer array size",
            NonConstArraySize => "array size must be constant",
            IndexOutOfRange => "index out of range",
            MultidimensionalArray => "multidimensional arrays are not supported",
            ProcessorNeedsOutput => "processor needs an output",
            ProcessorNeedsRunFunction => "processor needs a run function",
            MultipleRunFunctions => "multiple run functions",
            FunctionMustBeVoid => "function must return void",
            FunctionHasParams => "function must not have parameters",
            RecursiveGraph => "recursive graph",
            FeedbackInGraph => "feedback cycle in graph",
            DelayLineTooShort => "delay line too short",
            DelayLineTooLong => "delay line too long",
            DelayLineNotInteger => "delay length must be an integer constant",
            RatioMustBeInteger => "clock ratio must be an integer",
            RatioMustBePowerOf2 => "clock ratio must be a power of 2",
            RatioOutOfRange => "clock ratio out of range",
            IllegalProcessorArraySize => "illegal processor array size",
            IllegalEndpointArraySize => "illegal endpoint array size",
            IllegalTypeForEndpoint => "illegal type for endpoint",
            DuplicateTypesInEndpointList => "duplicate types in endpoint list",
            EventFunctionInvalidType => "event function has an invalid type",
            EventFunctionInvalidArguments => "event function has invalid arguments",
            NoSuchInputEvent => "no such input event",
            CannotReadFromOutput => "cannot read from an output",
            CannotWriteToInput => "cannot write to an input",
            StaticAssertionFailure => "static assertion failure",
            PreIncDecCollision => "pre/post increment collides with another use",
            ComparisonAlwaysTrue => "comparison is always true",
            ComparisonAlwaysFalse => "comparison is always false",
            BreakOutsideLoop => "break must be inside a loop",
            ContinueOutsideLoop => "continue must be inside a loop",
            DuplicateAnnotationKey => "duplicate annotation key",
            ResolutionDidNotConverge => "resolution did not converge",
            NotYetImplemented => "not yet implemented",
            Internal => "internal compiler error",
        }
    }
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

/// Secondary labelled span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

impl CompileError {
    pub fn new(kind: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            span,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn warning(kind: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::new(kind, span, message)
        }
    }

    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label {
            span,
            message: message.into(),
        });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Prefix the message with the call site that triggered it, so failures
    /// inside a specialised function read like a call stack.
    pub fn prepend_call_site(mut self, span: Span, call_description: &str) -> Self {
        self.labels.insert(
            0,
            Label {
                span,
                message: format!("while compiling the call to {call_description}"),
            },
        );
        self
    }

    /// Render as `path:line:col: severity: message`.
    pub fn format(&self, sources: &SourceMap) -> String {
        let (line, col) = sources.line_col(&self.span);
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        format!(
            "{}:{}:{}: {}: {}",
            sources.file_path(&self.span).display(),
            line,
            col,
            severity,
            self.message
        )
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)
    }
}

/// Accumulator for the diagnostics of one compilation.
#[derive(Debug, Clone, Default)]
pub struct CompileMessageList {
    pub messages: Vec<CompileError>,
}

impl CompileMessageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: CompileError) {
        self.messages.push(error);
    }

    pub fn has_errors(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.severity == Severity::Error)
    }

    pub fn into_messages(self) -> Vec<CompileError> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_rendering() {
        let mut sources = SourceMap::new();
        let id = sources.add_file("gain.sdsp".into(), "processor Gain {}\n".to_string());
        let err = CompileError::new(
            ErrorKind::ProcessorNeedsOutput,
            Span::new(id, 0, 9, 1),
            "processor 'Gain' must declare at least one output",
        );
        assert_eq!(
            err.format(&sources),
            "gain.sdsp:1:1: error: processor 'Gain' must declare at least one output"
        );
    }

    #[test]
    fn test_call_site_prefixing() {
        let err = CompileError::new(ErrorKind::CannotCast, Span::none(), "no cast")
            .prepend_call_site(Span::none(), "lerp(float, float)");
        assert_eq!(err.labels.len(), 1);
        assert!(err.labels[0].message.contains("lerp"));
    }

    #[test]
    fn test_message_list_error_detection() {
        let mut list = CompileMessageList::new();
        list.add(CompileError::warning(
            ErrorKind::ComparisonAlwaysTrue,
            Span::none(),
            "always true",
        ));
        assert!(!list.has_errors());
        list.add(CompileError::new(ErrorKind::Internal, Span::none(), "boom"));
        assert!(list.has_errors());
    }
}
