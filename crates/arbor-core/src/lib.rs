//! Core data model for the Arbor compiler.
//!
//! This crate holds everything the compiler front-end and the target
//! code-builder agree on:
//!
//! - [`span`]: source positions for diagnostics
//! - [`error`]: structured compile errors and the code-builder's typed
//!   failure surface
//! - [`types`]: the semantic type model (types, signatures, candidate
//!   chains, the query-runtime protocol)
//! - [`symbol`]: symbols, package tables and the import-layer product
//! - [`value`]: constant values pushed into the target IR

pub mod error;
pub mod span;
pub mod symbol;
pub mod types;
pub mod value;

pub use error::{BuildError, CompileError, ErrorKind};
pub use span::Span;
pub use symbol::{ModuleEnv, Package, Symbol, SymbolKind};
pub use types::{
    Candidate, Field, Method, SigFlags, Signature, StructDef, Type, TypeId, assignable,
    query_member, substitute,
};
pub use value::Value;
