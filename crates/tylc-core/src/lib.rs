//! Shared types consumed by both the linker and the optimizer: the typed
//! AST (`ast`) and the source-location type every node carries (`span`).
//!
//! Everything upstream of this crate — lexer, parser, type checker, macro
//! expander — is treated as an external collaborator. This crate only
//! defines the interface, not the front end.

pub mod ast;
pub mod span;

pub use span::SourceLocation;
