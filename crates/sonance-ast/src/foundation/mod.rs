//! Shared foundation types: source tracking, identifiers, annotations.

pub mod annotation;
pub mod ident;
pub mod span;

pub use annotation::Annotation;
pub use ident::{Ident, IdentPool, Path};
pub use span::{SourceFile, SourceMap, Span};
