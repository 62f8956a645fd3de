// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Resolution and validation for the Sonance audio DSL
//!
//! This crate takes the parsed AST and drives it to a fully resolved state:
//! names bound, types computed, overloads picked, generics and parameterised
//! processors specialised, constants folded. Validation runs structural
//! checks before resolution and semantic checks after it.

pub mod resolve;
pub mod validate;

#[cfg(test)]
mod tests;

pub use resolve::{resolve_compilation, ResolverOptions};
pub use validate::{validate_post_resolution, validate_pre_resolution};
