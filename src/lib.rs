//! Arbor: a type-directed expression-and-call compiler.
//!
//! Arbor rewrites a syntactically rich surface language - command-style
//! calls with optional and keyword arguments, lambda literals,
//! error-propagation operators, type-eliding composite literals, and a
//! declarative tree-query sublanguage - onto a conventionally typed
//! base language, by compiling each expression node into constructs of
//! a typed target IR through an opaque code-builder API.
//!
//! The workspace splits into:
//! - [`arbor_core`]: spans, structured errors, the semantic type model
//! - [`arbor_syntax`]: the surface expression tree the parser produces
//! - [`arbor_compiler`]: the compiler core - overload candidate
//!   resolution with checkpointed rollback, generic instantiation,
//!   lambda compilation, composite literals, query selectors and
//!   error-wrap operators
//!
//! This crate re-exports the pieces embedders typically need.

pub use arbor_compiler::{
    CodeBuilder, Context, ExprCompiler, ExprInfo, Ir, IrBuilder, MemoryRecorder, Receiver,
    Recorder,
};
pub use arbor_core::{
    BuildError, Candidate, CompileError, ErrorKind, Field, Method, ModuleEnv, Package, SigFlags,
    Signature, Span, StructDef, Symbol, SymbolKind, Type, Value,
};
pub use arbor_syntax as syntax;
