// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! AST, type system and value model for the Sonance audio DSL
//!
//! This crate holds everything the front-end passes operate on: source
//! tracking, interned identifiers, the closed type/value model, the AST node
//! arena with its scope tree, and the diagnostic types shared by the whole
//! pipeline.

pub mod ast;
pub mod error;
pub mod foundation;
pub mod types;

pub use error::{CompileError, CompileMessageList, ErrorKind, Severity};
pub use foundation::{Annotation, Ident, IdentPool, Path, SourceMap, Span};
pub use types::{PrimitiveType, Type, Value};
